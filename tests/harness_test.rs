//! Run the programs under harness/test, checking the molded result
//! of each against its `; expect:` line
use rebind::eval::{machine::vm::Machine, settings::EvalSettings};
use std::fs;

const EXPECT: &str = "; expect: ";

/// Evaluate a harness file on a fresh machine and compare
fn run_test(filename: &str) {
    let path = format!("harness/test/{filename}");
    let text = fs::read_to_string(&path).unwrap();
    let expected = text
        .lines()
        .find_map(|l| l.strip_prefix(EXPECT))
        .unwrap_or_else(|| panic!("{path} has no expectation"));

    let mut machine = Machine::new(EvalSettings::default()).unwrap();
    let value = machine.do_source(&text).unwrap();
    assert_eq!(machine.mold(&value).unwrap(), expected, "in {path}");
}

#[test]
pub fn test_harness_001() {
    run_test("001_funcs.reb");
}

#[test]
pub fn test_harness_002() {
    run_test("002_objects.reb");
}

#[test]
pub fn test_harness_003() {
    run_test("003_self_reference.reb");
}

#[test]
pub fn test_harness_004() {
    run_test("004_trap.reb");
}

#[test]
pub fn test_harness_005() {
    run_test("005_charsets.reb");
}

#[test]
pub fn test_harness_006() {
    run_test("006_overlay.reb");
}

#[test]
pub fn test_harness_007() {
    run_test("007_quoting.reb");
}

/// Programs that must fail with the given error id
#[test]
pub fn test_failures() {
    let cases = [
        ("undefined-word", "not-bound"),
        ("f: func [] [f] f", "stack-overflow"),
        ("append [] ~null~", "type-mismatch"),
        ("o1: object [a: 1] o2: object [a: 2] do in [o1 o2] [a]", "ambiguous-binding"),
    ];
    for (source, id) in cases {
        let mut machine = Machine::new(EvalSettings {
            max_depth: 200,
            ..Default::default()
        })
        .unwrap();
        let err = machine.do_source(source).unwrap_err();
        assert_eq!(err.id(), id, "for {source}");
    }
}

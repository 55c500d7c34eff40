//! Word resolution through virtual binding chains
use rebind::eval::{
    error::ExecutionError,
    machine::{
        bind::{self, Chain},
        vm::Machine,
    },
    memory::{
        cell::Cell,
        context::{self, make_varlist, ContextKind},
    },
    settings::EvalSettings,
};

fn machine() -> Machine {
    Machine::new(EvalSettings::default()).unwrap()
}

/// The first cell of freshly loaded code
fn first_word(m: &mut Machine, text: &str) -> Cell {
    let block = m.load(text).unwrap();
    m.heap().cells(block).unwrap()[0]
}

#[test]
pub fn test_non_defining_overlays_do_not_move_a_word() {
    let mut m = machine();
    m.do_source("x: 10").unwrap();
    let word = first_word(&mut m, "x");

    let (p, q) = (m.intern("p"), m.intern("q"));
    let o1 = make_varlist(m.heap_mut(), ContextKind::Object, &[p], &[Cell::integer(1)]).unwrap();
    let o2 = make_varlist(m.heap_mut(), ContextKind::Object, &[q], &[Cell::integer(2)]).unwrap();

    let direct = bind::resolve(m.heap(), m.symbols(), &word, Chain::empty()).unwrap();

    let inner = Chain::empty().push_overlay(m.heap_mut(), &[o1]).unwrap();
    let outer = inner.push_overlay(m.heap_mut(), &[o2]).unwrap();
    let wrapped = bind::resolve(m.heap(), m.symbols(), &word, outer).unwrap();

    assert_eq!(direct, wrapped);
    assert_eq!(
        context::read(m.heap(), wrapped).unwrap(),
        Cell::integer(10)
    );
}

#[test]
pub fn test_defining_overlay_shadows_module() {
    let mut m = machine();
    m.do_source("x: 10").unwrap();
    let word = first_word(&mut m, "x");

    let x = m.intern("x");
    let o = make_varlist(m.heap_mut(), ContextKind::Object, &[x], &[Cell::integer(99)]).unwrap();
    let chain = Chain::empty().push_use(m.heap_mut(), o).unwrap();

    assert_eq!(
        bind::fetch(m.heap(), m.symbols(), &word, chain).unwrap(),
        Cell::integer(99)
    );
    assert_eq!(
        bind::fetch(m.heap(), m.symbols(), &word, Chain::empty()).unwrap(),
        Cell::integer(10)
    );
}

#[test]
pub fn test_sibling_definitions_are_ambiguous() {
    let mut m = machine();
    let word = first_word(&mut m, "x");

    let x = m.intern("x");
    let o1 = make_varlist(m.heap_mut(), ContextKind::Object, &[x], &[Cell::integer(1)]).unwrap();
    let o2 = make_varlist(m.heap_mut(), ContextKind::Object, &[x], &[Cell::integer(2)]).unwrap();
    let chain = Chain::empty().push_overlay(m.heap_mut(), &[o1, o2]).unwrap();

    assert!(matches!(
        bind::resolve(m.heap(), m.symbols(), &word, chain),
        Err(ExecutionError::AmbiguousBinding(name)) if name == "x"
    ));
}

#[test]
pub fn test_lib_words_visible_from_user() {
    let mut m = machine();
    let word = first_word(&mut m, "append");
    let loc = bind::resolve(m.heap(), m.symbols(), &word, Chain::empty()).unwrap();
    assert!(context::read(m.heap(), loc).unwrap().action_ref().is_some());
}

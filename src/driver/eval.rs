//! Load sources and evaluate them on a machine
use crate::{
    driver::{
        config,
        error::RebindError,
        options::{Input, RebindOptions},
    },
    eval::machine::{metrics::ThreadOccupation, vm::Machine},
};
use codespan_reporting::{
    diagnostic::Diagnostic,
    files::SimpleFiles,
    term::{
        self,
        termcolor::{ColorChoice, NoColor, StandardStream},
    },
};
use log::{debug, info};

use std::{fs, io::Write, time::Instant};

use super::statistics::Statistics;

/// Evaluate every input in turn on one machine, printing the molded
/// result of the last
pub fn run(opt: &RebindOptions) -> Result<Statistics, RebindError> {
    let mut stats = Statistics::default();
    let mut executor = Executor::default();
    executor.execute(opt, &mut stats)?;
    Ok(stats)
}

pub struct Executor<'a> {
    /// Access to source text for error reporting
    files: SimpleFiles<String, String>,

    /// Overriden output stream
    out: Option<Box<dyn Write + 'a>>,

    /// Error stream
    err: Option<Box<dyn Write + 'a>>,
}

impl<'a> Default for Executor<'a> {
    fn default() -> Self {
        Executor {
            files: SimpleFiles::new(),
            out: None,
            err: None,
        }
    }
}

impl<'a> Executor<'a> {
    /// Provide override streams to capture the output to stdout and stderr
    pub fn capture_output(&mut self, out: Box<dyn Write + 'a>, err: Box<dyn Write + 'a>) {
        self.out = Some(out);
        self.err = Some(err);
    }

    /// Run all inputs, diagnosing any failure to the error stream
    pub fn execute(
        &mut self,
        opt: &RebindOptions,
        stats: &mut Statistics,
    ) -> Result<(), RebindError> {
        let mut current = None;
        let result = self.try_execute(opt, stats, &mut current);
        if let Err(e) = &result {
            let diagnostic = e.to_diagnostic(current);
            self.diagnose(&diagnostic);
        }
        result
    }

    fn try_execute(
        &mut self,
        opt: &RebindOptions,
        stats: &mut Statistics,
        current: &mut Option<usize>,
    ) -> Result<(), RebindError> {
        let settings = opt.settings.apply(config::load_settings(opt.config.as_deref())?);
        debug!("settings: {:?}", settings);

        let t = Instant::now();
        let mut machine = Machine::new(settings)?;
        stats.timings_mut().record("initialise", t.elapsed());

        let mut last = None;
        for input in opt.inputs() {
            let text = match &input {
                Input::File(path) => fs::read_to_string(path)
                    .map_err(|_| RebindError::FileCouldNotBeRead(path.display().to_string()))?,
                Input::Cli(text) => text.clone(),
            };
            *current = Some(self.files.add(input.to_string(), text.clone()));
            info!("evaluating {}", input);

            let t = Instant::now();
            let result = machine.do_source(&text);
            stats.timings_mut().record("execute", t.elapsed());
            last = Some(result?);
        }

        let metrics = machine.metrics();
        let heap = machine.heap_stats();
        stats.set_ticks(metrics.ticks());
        stats.set_allocs(heap.allocated);
        stats.set_max_stack(metrics.max_stack());
        stats.set_collections(metrics.collections(), metrics.swept());
        stats.set_live_stubs(heap.live);
        for occupation in [
            ThreadOccupation::CollectorMark,
            ThreadOccupation::CollectorSweep,
        ] {
            stats
                .timings_mut()
                .record(occupation.name(), machine.clock().total(occupation));
        }

        if let Some(value) = last {
            let text = machine.mold(&value)?;
            match &mut self.out {
                Some(out) => writeln!(out, "{}", text)?,
                None => println!("{}", text),
            }
        }
        Ok(())
    }

    /// Print a diagnostic to the error stream
    fn diagnose(&mut self, diag: &Diagnostic<usize>) {
        let config = term::Config::default();
        let emitted = match self.err {
            None => term::emit(
                &mut StandardStream::stderr(ColorChoice::Auto),
                &config,
                &self.files,
                diag,
            ),
            Some(ref mut err) => {
                term::emit(&mut NoColor::new(err.as_mut()), &config, &self.files, diag)
            }
        };
        if let Err(e) = emitted {
            eprintln!("{}: {}", diag.message, e);
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};
    use structopt::StructOpt;

    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    fn execute(args: Vec<&str>) -> (Result<(), RebindError>, String, String) {
        let opt = RebindOptions::from_iter(args);
        let (out, err) = (Capture::default(), Capture::default());
        let mut executor = Executor::default();
        executor.capture_output(Box::new(out.clone()), Box::new(err.clone()));
        let mut stats = Statistics::default();
        let result = executor.execute(&opt, &mut stats);
        (result, out.text(), err.text())
    }

    #[test]
    pub fn test_prints_last_value() {
        let (result, out, _) = execute(vec![
            "rebind",
            "-c",
            "/dev/null",
            "-e",
            "x: 20 add x 1",
        ]);
        assert!(result.is_ok());
        assert_eq!(out, "21\n");
    }

    #[test]
    pub fn test_scan_error_is_diagnosed() {
        let (result, out, err) = execute(vec!["rebind", "-c", "/dev/null", "-e", "[1 2"]);
        assert!(matches!(result, Err(RebindError::Execution(_))));
        assert!(out.is_empty());
        assert!(err.contains("[cli]"));
    }

    #[test]
    pub fn test_allocs_count_every_stub() {
        let allocs = |text: &str| {
            let opt = RebindOptions::from_iter(vec!["rebind", "-c", "/dev/null", "-e", text]);
            let mut executor = Executor::default();
            executor.capture_output(Box::new(Capture::default()), Box::new(Capture::default()));
            let mut stats = Statistics::default();
            executor.execute(&opt, &mut stats).unwrap();
            stats.allocs()
        };
        let baseline = allocs("1");
        assert!(baseline > 0);
        // varlist and keylist of the object, plus the pack
        assert!(allocs("o: object [a: 1] p: pack [2 3] 1") >= baseline + 3);
    }
}

//! Evaluator settings
//!
//! Settings come from defaults, then an optional configuration file,
//! then command line flags, each overriding the last.

use serde::Deserialize;
use structopt::StructOpt;

/// Settings to control evaluation and collection
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, rename_all = "kebab-case")]
pub struct EvalSettings {
    /// Log every machine step
    pub trace_steps: bool,
    /// Log the heap before and after each sweep
    pub dump_heap: bool,
    /// Maximum number of live stubs
    pub heap_limit: Option<usize>,
    /// Stubs allocated between collections when there is no limit
    pub gc_ballast: Option<usize>,
    /// Steps between checks of the collection policy
    pub gc_check_frequency: u64,
    /// Maximum depth of the continuation stack
    pub max_depth: usize,
    /// Give up after this many steps
    pub step_limit: Option<usize>,
}

impl Default for EvalSettings {
    fn default() -> Self {
        EvalSettings {
            trace_steps: false,
            dump_heap: false,
            heap_limit: None,
            gc_ballast: None,
            gc_check_frequency: 500,
            max_depth: 10_000,
            step_limit: None,
        }
    }
}

/// Command line overrides for `EvalSettings`
#[derive(StructOpt, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Trace steps during execution
    #[structopt(long = "trace-steps")]
    pub trace_steps: bool,
    /// Dump the heap at each collection
    #[structopt(long = "dump-heap")]
    pub dump_heap: bool,
    /// Limit on live stubs
    #[structopt(long = "heap-limit")]
    pub heap_limit: Option<usize>,
    /// Allocations between collections
    #[structopt(long = "gc-ballast")]
    pub gc_ballast: Option<usize>,
    /// Steps between collection policy checks
    #[structopt(long = "gc-check-frequency")]
    pub gc_check_frequency: Option<u64>,
    /// Continuation stack limit
    #[structopt(long = "max-depth")]
    pub max_depth: Option<usize>,
    /// Step limit
    #[structopt(long = "step-limit")]
    pub step_limit: Option<usize>,
}

impl SettingsArgs {
    /// Override `settings` with whatever was given on the command line
    pub fn apply(&self, mut settings: EvalSettings) -> EvalSettings {
        settings.trace_steps |= self.trace_steps;
        settings.dump_heap |= self.dump_heap;
        settings.heap_limit = self.heap_limit.or(settings.heap_limit);
        settings.gc_ballast = self.gc_ballast.or(settings.gc_ballast);
        if let Some(freq) = self.gc_check_frequency {
            settings.gc_check_frequency = freq;
        }
        if let Some(depth) = self.max_depth {
            settings.max_depth = depth;
        }
        settings.step_limit = self.step_limit.or(settings.step_limit);
        settings
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_file_values_override_defaults() {
        let settings: EvalSettings = toml::from_str("max-depth = 50\ntrace-steps = true").unwrap();
        assert_eq!(settings.max_depth, 50);
        assert!(settings.trace_steps);
        assert_eq!(settings.gc_check_frequency, 500);
    }

    #[test]
    pub fn test_args_override_file() {
        let file = EvalSettings {
            max_depth: 50,
            heap_limit: Some(100),
            ..Default::default()
        };
        let args = SettingsArgs::from_iter(vec!["rebind", "--max-depth", "20"]);
        let merged = args.apply(file);
        assert_eq!(merged.max_depth, 20);
        assert_eq!(merged.heap_limit, Some(100));
    }
}

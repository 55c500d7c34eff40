//! Capture and report statistics for a run

use std::{fmt::Display, time::Duration};

use indexmap::IndexMap;

#[derive(Default, Debug)]
pub struct Timings {
    timings: IndexMap<String, Duration>,
}

impl Timings {
    pub fn record<T: AsRef<str>>(&mut self, name: T, elapsed: Duration) {
        *self
            .timings
            .entry(name.as_ref().to_string())
            .or_default() += elapsed;
    }

    pub fn merge(&mut self, other: Timings) {
        for (k, v) in other.timings {
            self.record(k, v);
        }
    }
}

impl Display for Timings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self.timings.keys().map(|k| k.len()).max().unwrap_or(0) + 1;

        for (k, v) in &self.timings {
            writeln!(f, "{:width$}: {:14.9}s", k, v.as_secs_f64(), width = width)?;
        }
        Ok(())
    }
}

/// The statistics captured during a run
#[derive(Default, Debug)]
pub struct Statistics {
    machine_ticks: u64,
    machine_allocs: u64,
    machine_max_stack: usize,
    collections: u64,
    swept: u64,
    live_stubs: usize,
    timings: Timings,
}

impl Statistics {
    pub fn set_ticks(&mut self, ticks: u64) {
        self.machine_ticks = ticks;
    }

    pub fn set_allocs(&mut self, allocs: u64) {
        self.machine_allocs = allocs;
    }

    pub fn set_max_stack(&mut self, max_stack: usize) {
        self.machine_max_stack = max_stack;
    }

    pub fn set_collections(&mut self, collections: u64, swept: u64) {
        self.collections = collections;
        self.swept = swept;
    }

    pub fn set_live_stubs(&mut self, live: usize) {
        self.live_stubs = live;
    }

    pub fn ticks(&self) -> u64 {
        self.machine_ticks
    }

    pub fn allocs(&self) -> u64 {
        self.machine_allocs
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    pub fn timings_mut(&mut self) -> &mut Timings {
        &mut self.timings
    }

    pub fn merge(&mut self, other: Statistics) {
        self.machine_ticks += other.machine_ticks;
        self.machine_allocs += other.machine_allocs;
        self.machine_max_stack = self.machine_max_stack.max(other.machine_max_stack);
        self.collections += other.collections;
        self.swept += other.swept;
        self.live_stubs = other.live_stubs;
        self.timings.merge(other.timings);
    }
}

impl Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Machine Ticks  : {:10}", self.machine_ticks)?;
        writeln!(f, "Machine Allocs : {:10}", self.machine_allocs)?;
        writeln!(f, "Max Stack      : {:10}", self.machine_max_stack)?;
        writeln!(f, "Collections    : {:10}", self.collections)?;
        writeln!(f, "Stubs Swept    : {:10}", self.swept)?;
        writeln!(f, "Live Stubs     : {:10}", self.live_stubs)?;
        writeln!(f)?;
        writeln!(f, "{}", self.timings)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_merge_accumulates() {
        let mut a = Statistics::default();
        a.set_ticks(10);
        a.timings_mut().record("load", Duration::from_millis(2));
        let mut b = Statistics::default();
        b.set_ticks(5);
        b.set_collections(2, 40);
        b.timings_mut().record("load", Duration::from_millis(3));
        a.merge(b);
        assert_eq!(a.ticks(), 15);
        assert_eq!(a.collections(), 2);
        assert!(format!("{}", a).contains("load"));
    }
}

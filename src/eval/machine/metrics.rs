//! Machine metrics

use std::cmp::max;
use std::time::{Duration, Instant};

use indexmap::IndexMap;

/// Record some metrics as we execute code
#[derive(Default)]
pub struct Metrics {
    ticks: u64,
    max_stack: usize,
    collections: u64,
    swept: u64,
}

impl Metrics {
    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn stack(&mut self, size: usize) {
        self.max_stack = max(self.max_stack, size);
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    pub fn collection(&mut self, swept: usize) {
        self.collections += 1;
        self.swept += swept as u64;
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }

    pub fn swept(&self) -> u64 {
        self.swept
    }
}

/// What the thread is doing, for the time split
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThreadOccupation {
    Initialisation,
    Mutator,
    CollectorMark,
    CollectorSweep,
}

impl ThreadOccupation {
    pub fn name(self) -> &'static str {
        match self {
            ThreadOccupation::Initialisation => "initialisation",
            ThreadOccupation::Mutator => "mutator",
            ThreadOccupation::CollectorMark => "collector-mark",
            ThreadOccupation::CollectorSweep => "collector-sweep",
        }
    }
}

/// Accumulates elapsed time per occupation
pub struct Clock {
    current: Option<(ThreadOccupation, Instant)>,
    totals: IndexMap<ThreadOccupation, Duration>,
}

impl Default for Clock {
    fn default() -> Self {
        Clock {
            current: None,
            totals: IndexMap::new(),
        }
    }
}

impl Clock {
    /// Start timing a new occupation, closing the current one
    pub fn switch(&mut self, occupation: ThreadOccupation) {
        let now = Instant::now();
        self.close(now);
        self.current = Some((occupation, now));
    }

    /// Stop timing altogether
    pub fn stop(&mut self) {
        self.close(Instant::now());
        self.current = None;
    }

    fn close(&mut self, now: Instant) {
        if let Some((occupation, since)) = self.current.take() {
            *self.totals.entry(occupation).or_default() += now - since;
        }
    }

    pub fn total(&self, occupation: ThreadOccupation) -> Duration {
        self.totals.get(&occupation).copied().unwrap_or_default()
    }

    /// Totals in order of first occurrence
    pub fn report(&self) -> impl Iterator<Item = (&'static str, Duration)> + '_ {
        self.totals.iter().map(|(k, v)| (k.name(), *v))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_clock_accumulates_by_occupation() {
        let mut clock = Clock::default();
        clock.switch(ThreadOccupation::Mutator);
        clock.switch(ThreadOccupation::CollectorMark);
        clock.switch(ThreadOccupation::Mutator);
        clock.stop();
        let names: Vec<_> = clock.report().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["mutator", "collector-mark"]);
    }

    #[test]
    pub fn test_metrics() {
        let mut metrics = Metrics::default();
        metrics.tick();
        metrics.stack(3);
        metrics.stack(1);
        metrics.collection(4);
        assert_eq!(metrics.ticks(), 1);
        assert_eq!(metrics.max_stack(), 3);
        assert_eq!(metrics.swept(), 4);
    }
}

//! The six-level verbosity counter from spec §4.9 / §6.
//!
//! The original increments a global counter with each `-v` and compares it
//! against named thresholds (`RLD_VERBOSE_INFO`, `RLD_VERBOSE_TRACE`, ...)
//! before logging. Here the counter maps onto a small set of named levels
//! and call sites are expected to check `Verbosity::enables` the same way,
//! rather than always formatting through `log`'s own filter -- some of the
//! messages gated here (symbol-trace, file-trace) are per-item and would be
//! too noisy to leave to a blanket `RUST_LOG` level.

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Quiet = 0,
    Info = 1,
    Details = 2,
    Trace = 3,
    SymbolTrace = 4,
    FileTrace = 5,
    FullDebug = 6,
}

impl Level {
    fn from_count(n: u8) -> Level {
        match n.min(6) {
            0 => Level::Quiet,
            1 => Level::Info,
            2 => Level::Details,
            3 => Level::Trace,
            4 => Level::SymbolTrace,
            5 => Level::FileTrace,
            _ => Level::FullDebug,
        }
    }
}

/// A per-invocation verbosity counter, 0..=6.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbosity(u8);

impl Verbosity {
    pub fn new(count: u8) -> Self {
        Verbosity(count.min(6))
    }

    pub fn increment(&mut self) {
        if self.0 < 6 {
            self.0 += 1;
        }
    }

    pub fn count(&self) -> u8 {
        self.0
    }

    pub fn level(&self) -> Level {
        Level::from_count(self.0)
    }

    /// True once the counter has reached at least `threshold`.
    pub fn enables(&self, threshold: Level) -> bool {
        self.level() >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saturates_at_six() {
        let mut v = Verbosity::new(0);
        for _ in 0..10 {
            v.increment();
        }
        assert_eq!(v.count(), 6);
        assert_eq!(v.level(), Level::FullDebug);
    }

    #[test]
    fn thresholds_are_monotonic() {
        let v = Verbosity::new(3);
        assert!(v.enables(Level::Info));
        assert!(v.enables(Level::Trace));
        assert!(!v.enables(Level::SymbolTrace));
    }
}

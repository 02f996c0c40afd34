use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Process-wide, one-shot cooperative cancellation token. Every worker
/// polls `is_set` at least once per processed row; any worker that returns
/// an error (other than `Cancelled` itself) sets it before propagating.
#[derive(Clone, Default)]
pub struct QuitFlag(Arc<AtomicBool>);

impl QuitFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    #[inline]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Installs a Ctrl-C handler that sets this flag exactly once. Mirrors
    /// the teacher's `PrettyTrace::new().ctrlc().on()` shutdown hook, using
    /// `ctrlc` directly since we have no use for pretty_trace's backtrace
    /// pretty-printing.
    pub fn install_ctrlc_handler(&self) -> Result<(), ctrlc::Error> {
        let flag = self.clone();
        ctrlc::set_handler(move || flag.set())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_is_observed_through_clones() {
        let flag = QuitFlag::new();
        let clone = flag.clone();
        assert!(!clone.is_set());
        flag.set();
        assert!(clone.is_set());
    }
}

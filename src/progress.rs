//! `ProgressReporter`, spec §4.9: a background task that prints an
//! updating percentage to stderr at bounded intervals from a shared,
//! atomically-read row counter.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

const TICK: Duration = Duration::from_millis(500);

/// Incremented once per SEQ row processed, across every join worker.
#[derive(Clone, Default)]
pub struct RowCounter(Arc<AtomicU64>);

impl RowCounter {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    #[inline]
    pub fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Spawns a background thread that renders `counter` against `total` on an
/// `indicatif` bar on stderr, once per tick, until `finish` is called.
pub struct ProgressReporter {
    handle: Option<thread::JoinHandle<()>>,
    stop: Arc<std::sync::atomic::AtomicBool>,
}

impl ProgressReporter {
    pub fn start(counter: RowCounter, total: u64) -> Self {
        let stop = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let stop_for_thread = stop.clone();

        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{percent}% ({pos}/{len}) {elapsed_precise}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let handle = thread::spawn(move || {
            while !stop_for_thread.load(Ordering::Relaxed) {
                bar.set_position(counter.get().min(total));
                thread::sleep(TICK);
            }
            bar.set_position(counter.get().min(total));
            bar.finish_and_clear();
        });

        ProgressReporter { handle: Some(handle), stop }
    }

    pub fn finish(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates_across_clones() {
        let counter = RowCounter::new();
        let clone = counter.clone();
        counter.increment();
        clone.increment();
        assert_eq!(counter.get(), 2);
    }

    #[test]
    fn reporter_stops_cleanly_on_finish() {
        let counter = RowCounter::new();
        let reporter = ProgressReporter::start(counter.clone(), 10);
        counter.increment();
        reporter.finish();
    }
}

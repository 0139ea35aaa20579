//! Progress snapshots broadcast while the tree is built.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;

/// Files collected between two broadcasts.
const PROGRESS_INTERVAL: u64 = 1000;

/// Counters of a scan in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanProgress {
    pub files: u64,
    pub dirs: u64,
    /// Bytes of all collected files.
    pub bytes: u64,
    /// Links and special files passed over.
    pub skipped: u64,
    /// Entries left out because they could not be read.
    pub unreadable: u64,
    /// Directory most recently entered.
    pub current_dir: PathBuf,
    pub elapsed: Duration,
    /// Set on the final snapshot only.
    pub done: bool,
}

/// Accumulates a [`ScanProgress`] and sends it every
/// `PROGRESS_INTERVAL` files. Nobody listening is fine.
pub(crate) struct ProgressReporter<'a> {
    tx: &'a broadcast::Sender<ScanProgress>,
    started: Instant,
    state: ScanProgress,
}

impl<'a> ProgressReporter<'a> {
    pub fn new(tx: &'a broadcast::Sender<ScanProgress>) -> Self {
        Self {
            tx,
            started: Instant::now(),
            state: ScanProgress::default(),
        }
    }

    pub fn enter_dir(&mut self, path: PathBuf) {
        self.state.dirs += 1;
        self.state.current_dir = path;
    }

    pub fn file(&mut self, size: u64) {
        self.state.files += 1;
        self.state.bytes += size;
        if self.state.files % PROGRESS_INTERVAL == 0 {
            self.send();
        }
    }

    pub fn skipped(&mut self) {
        self.state.skipped += 1;
    }

    pub fn unreadable(&mut self) {
        self.state.unreadable += 1;
    }

    /// Send the closing snapshot.
    pub fn finish(mut self) -> ScanProgress {
        self.state.done = true;
        self.send();
        self.state
    }

    fn send(&mut self) {
        self.state.elapsed = self.started.elapsed();
        let _ = self.tx.send(self.state.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_and_final_snapshot() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut reporter = ProgressReporter::new(&tx);
        reporter.enter_dir(PathBuf::from("/a"));
        reporter.file(10);
        reporter.file(5);
        reporter.skipped();
        reporter.unreadable();

        let last = reporter.finish();
        assert_eq!((last.files, last.dirs, last.bytes), (2, 1, 15));
        assert_eq!((last.skipped, last.unreadable), (1, 1));
        assert_eq!(last.current_dir, PathBuf::from("/a"));

        let sent = rx.try_recv().unwrap();
        assert!(sent.done);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_every_interval() {
        let (tx, mut rx) = broadcast::channel(8);
        let mut reporter = ProgressReporter::new(&tx);
        for _ in 0..PROGRESS_INTERVAL * 2 {
            reporter.file(1);
        }

        let first = rx.try_recv().unwrap();
        assert_eq!(first.files, PROGRESS_INTERVAL);
        assert!(!first.done);
        assert_eq!(rx.try_recv().unwrap().files, PROGRESS_INTERVAL * 2);
    }
}

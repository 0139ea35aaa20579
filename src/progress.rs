//! Terminal progress for the scan and hashing phases.
//!
//! Each display drains a broadcast receiver on its own thread and clears
//! its bar once the sending side is dropped.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::{self, error::RecvError};

use ddff_analyze::{HashProgress, HashStage};
use ddff_scan::ScanProgress;

use crate::format_size;

const TICK: Duration = Duration::from_millis(120);

/// A running progress display.
pub struct ProgressDisplay {
    handle: JoinHandle<()>,
}

impl ProgressDisplay {
    /// Spinner with running scan counters.
    pub fn scan(mut rx: broadcast::Receiver<ScanProgress>) -> Self {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        bar.set_message("Scanning");
        bar.enable_steady_tick(TICK);

        let handle = thread::spawn(move || {
            while let Some(progress) = next(&mut rx) {
                bar.set_message(scan_message(&progress));
                if progress.done {
                    break;
                }
            }
            bar.finish_and_clear();
        });
        Self { handle }
    }

    /// Bar over the eligible files of the current hashing stage.
    pub fn hashing(mut rx: broadcast::Receiver<HashProgress>) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {msg:<14} [{bar:40.cyan/blue}] {pos}/{len}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
        );
        bar.enable_steady_tick(TICK);

        let handle = thread::spawn(move || {
            while let Some(progress) = next(&mut rx) {
                bar.set_message(stage_label(progress.stage));
                bar.set_length(progress.total_files);
                bar.set_position(progress.files_hashed + progress.failures);
            }
            bar.finish_and_clear();
        });
        Self { handle }
    }

    /// Wait for the display to clear. The sender must be gone by now.
    pub fn finish(self) {
        let _ = self.handle.join();
    }
}

/// Next snapshot, skipping over lag. `None` once every sender is dropped.
fn next<T: Clone>(rx: &mut broadcast::Receiver<T>) -> Option<T> {
    loop {
        match rx.blocking_recv() {
            Ok(value) => return Some(value),
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => return None,
        }
    }
}

fn scan_message(progress: &ScanProgress) -> String {
    let mut message = format!(
        "{} files in {} directories ({})",
        progress.files,
        progress.dirs,
        format_size(progress.bytes)
    );
    if progress.unreadable > 0 {
        message.push_str(&format!(", {} unreadable", progress.unreadable));
    }
    message
}

fn stage_label(stage: HashStage) -> &'static str {
    match stage {
        HashStage::Partial => "Partial hashes",
        HashStage::Full => "Full hashes",
    }
}

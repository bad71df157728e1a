//! Progress reporting capability injected into the orchestrator.

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;

use crate::model::TransferKind;

pub trait ProgressSink: Send + Sync {
    /// Begin a new bar for `total` bytes. `label` carries display-only context
    /// such as the range index.
    fn start(&self, kind: TransferKind, total: u64, label: &str);

    /// `speed` is the cumulative average in MB/sec since the phase started.
    fn update(&self, consumed: u64, speed: Option<f64>);

    fn stop(&self);
}

/// Sink for headless runs and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn start(&self, _kind: TransferKind, _total: u64, _label: &str) {}
    fn update(&self, _consumed: u64, _speed: Option<f64>) {}
    fn stop(&self) {}
}

/// indicatif bar on stderr, one bar per phase.
#[derive(Default)]
pub struct ConsoleProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix} {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes:>12}/{total_bytes:<12} ETA: {eta:>4} {msg}")
            .map(|s| s.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
    }
}

impl ProgressSink for ConsoleProgress {
    fn start(&self, kind: TransferKind, total: u64, label: &str) {
        let pb = ProgressBar::with_draw_target(Some(total), ProgressDrawTarget::stderr_with_hz(5));
        pb.set_style(Self::style());
        let prefix = match kind {
            TransferKind::Download => "Downloading",
            TransferKind::Upload => "Uploading",
        };
        if label.is_empty() {
            pb.set_prefix(prefix);
        } else {
            pb.set_prefix(format!("{} {}", prefix, label));
        }
        if kind == TransferKind::Download {
            pb.set_message("Speed: N/A");
        }

        if let Ok(mut slot) = self.bar.lock() {
            if let Some(previous) = slot.replace(pb) {
                previous.abandon();
            }
        }
    }

    fn update(&self, consumed: u64, speed: Option<f64>) {
        if let Ok(slot) = self.bar.lock() {
            if let Some(pb) = slot.as_ref() {
                pb.set_position(consumed);
                if let Some(speed) = speed {
                    pb.set_message(format!("Speed: {:.2} MB/sec", speed));
                }
            }
        }
    }

    fn stop(&self) {
        if let Ok(mut slot) = self.bar.lock() {
            if let Some(pb) = slot.take() {
                pb.finish();
            }
        }
    }
}

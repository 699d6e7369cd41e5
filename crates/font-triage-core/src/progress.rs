use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Long-running phases that report incremental progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Build,
    Scan,
    Classify,
    Apply,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Build => "build",
            Phase::Scan => "scan",
            Phase::Classify => "classify",
            Phase::Apply => "apply",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent<'a> {
    pub phase: Phase,
    pub processed_count: usize,
    pub total_count: usize,
    pub current_label: &'a str,
}

/// Trait for reporting progress of builds, scans, classification and apply.
///
/// CLI implements with indicatif. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    fn on_phase_start(&self, _phase: Phase, _total: usize) {}
    fn on_progress(&self, _event: &ProgressEvent<'_>) {}
    fn on_phase_complete(&self, _phase: Phase, _processed: usize, _duration_secs: f64) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}

/// Shared cancellation flag. Checked between items, never mid-item.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }
}

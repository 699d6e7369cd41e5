use font_triage_core::{Phase, ProgressEvent, ProgressReporter};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// CLI progress reporter using indicatif progress bars.
///
/// Every phase knows its total up front, so each gets a bar; an empty
/// phase still shows a spinner until it completes.
pub struct CliReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl CliReporter {
    pub fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        // A poisoned bar only affects display.
        self.bar.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_bar(&self, pb: ProgressBar) {
        let mut guard = self.slot();
        if let Some(old) = guard.take() {
            old.finish_and_clear();
        }
        *guard = Some(pb);
    }

    fn finish_bar(&self) {
        if let Some(pb) = self.slot().take() {
            pb.finish_and_clear();
        }
    }
}

fn verb(phase: Phase) -> &'static str {
    match phase {
        Phase::Build => "Indexing",
        Phase::Scan => "Scanning",
        Phase::Classify => "Classifying",
        Phase::Apply => "Applying",
    }
}

fn bar_style(phase: Phase) -> ProgressStyle {
    let template = format!(
        "  {{spinner:.cyan}} {} [{{bar:30.cyan/dim}}] {{pos}}/{{len}} ({{eta}} remaining) {{wide_msg:.dim}}",
        verb(phase)
    );
    ProgressStyle::with_template(&template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━╸─")
        .tick_chars(TICK_CHARS)
}

impl ProgressReporter for CliReporter {
    fn on_phase_start(&self, phase: Phase, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(bar_style(phase));
        pb.enable_steady_tick(Duration::from_millis(80));
        self.set_bar(pb);
    }

    fn on_progress(&self, event: &ProgressEvent<'_>) {
        let guard = self.slot();
        if let Some(pb) = guard.as_ref() {
            // Parallel phases report out of order; never move backwards.
            if pb.position() < event.processed_count as u64 {
                pb.set_position(event.processed_count as u64);
            }
            pb.set_message(event.current_label.to_string());
        }
    }

    fn on_phase_complete(&self, phase: Phase, processed: usize, duration_secs: f64) {
        self.finish_bar();
        eprintln!(
            "  \x1b[32m✓\x1b[0m {} complete: {} items in {:.2}s",
            verb(phase),
            processed,
            duration_secs
        );
    }
}

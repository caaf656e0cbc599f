//! Terminal progress for engine operations

use fwmigrate_core::flash::Progress;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::time::Duration;

const BAR_TEMPLATE: &str =
    "{prefix:>12.bold} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}";
const SPINNER_TEMPLATE: &str = "{prefix:>12.bold} {spinner:.green} {bytes} ({bytes_per_sec}) {msg}";

/// Style for a phase, a bar when the size is known and a spinner otherwise
fn phase_style(sized: bool) -> ProgressStyle {
    let styled = if sized {
        ProgressStyle::with_template(BAR_TEMPLATE).map(|s| s.progress_chars("#>-"))
    } else {
        ProgressStyle::with_template(SPINNER_TEMPLATE)
    };
    styled.unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// Shows one line per engine phase (copy, download, maneuver step)
pub struct IndicatifProgress {
    multi: MultiProgress,
    active: Option<(ProgressBar, &'static str)>,
}

impl IndicatifProgress {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            active: None,
        }
    }

    /// Leave an unfinished phase on screen where it stopped
    fn abandon_active(&mut self) {
        if let Some((pb, label)) = self.active.take() {
            pb.abandon_with_message(format!("{} interrupted", label));
        }
    }
}

impl Default for IndicatifProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for IndicatifProgress {
    fn begin(&mut self, label: &'static str, total_bytes: Option<u64>) {
        self.abandon_active();

        let pb = match total_bytes {
            Some(total) => ProgressBar::new(total),
            None => {
                let pb = ProgressBar::new_spinner();
                pb.enable_steady_tick(Duration::from_millis(100));
                pb
            }
        };
        pb.set_style(phase_style(total_bytes.is_some()));
        pb.set_prefix(label);
        self.active = Some((self.multi.add(pb), label));
    }

    fn advance(&mut self, done_bytes: u64) {
        if let Some((pb, _)) = &self.active {
            pb.set_position(done_bytes);
        }
    }

    fn finish(&mut self) {
        if let Some((pb, label)) = self.active.take() {
            log::debug!("{} finished after {} bytes", label, pb.position());
            pb.finish();
        }
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        self.abandon_active();
    }
}

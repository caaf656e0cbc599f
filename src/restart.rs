//! Restart primitive of the host
//!
//! The CLI runs against flash images, so there is nothing to reboot. The
//! scheduled restart is logged and remembered so the command can report it.

use fwmigrate_core::swap::Restart;

/// Records the restart the engine asked for
#[derive(Debug, Default)]
pub struct LogRestart {
    scheduled: Option<u32>,
}

impl LogRestart {
    /// Delay of the last scheduled restart, if any
    pub fn scheduled(&self) -> Option<u32> {
        self.scheduled
    }
}

impl Restart for LogRestart {
    fn schedule_restart(&mut self, delay_ms: u32) {
        log::info!("device restart scheduled in {} ms", delay_ms);
        self.scheduled = Some(delay_ms);
    }
}

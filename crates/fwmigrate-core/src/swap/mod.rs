//! Slot-swap orchestration
//!
//! The orchestrator sequences [`BlockCopier`](crate::flash::BlockCopier) runs
//! and a single boot-configuration commit. It implements two protocols:
//!
//! - legacy mirroring ([`SlotSwapOrchestrator::mirror_if_needed`]): a device
//!   still executing from slot 0 copies its firmware and filesystem into
//!   slot 1, then switches the boot configuration over
//! - the self-overwrite maneuver ([`SlotSwapOrchestrator::self_overwrite`]):
//!   moves a staged image over the region that holds the bootloader and the
//!   boot-configuration block, in an order that keeps the device bootable
//!
//! Both protocols schedule a restart only after they have fully succeeded.

mod mirror;
mod overwrite;

pub use mirror::*;
pub use overwrite::*;

use crate::boot::{BootConfig, BootConfigStore};
use crate::error::Result;
use crate::flash::FlashDevice;

/// Delay between a successful swap and the restart
pub const RESTART_DELAY_MS: u32 = 20_000;

/// Restart primitive of the host
pub trait Restart {
    /// Arrange for the device to restart after `delay_ms`
    ///
    /// Fire-and-forget: the orchestrator does not wait for it.
    fn schedule_restart(&mut self, delay_ms: u32);
}

impl<R: Restart + ?Sized> Restart for &mut R {
    fn schedule_restart(&mut self, delay_ms: u32) {
        (**self).schedule_restart(delay_ms)
    }
}

/// Tunables of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorOptions {
    /// Delay passed to [`Restart::schedule_restart`]
    pub restart_delay_ms: u32,
    /// Read back every copied region before committing to it
    pub verify: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            restart_delay_ms: RESTART_DELAY_MS,
            verify: false,
        }
    }
}

/// Drives the slot-swap protocols against one device
pub struct SlotSwapOrchestrator<'a, D: FlashDevice + ?Sized, S, R> {
    device: &'a mut D,
    store: S,
    restart: R,
    config: BootConfig,
    options: OrchestratorOptions,
}

impl<'a, D, S, R> SlotSwapOrchestrator<'a, D, S, R>
where
    D: FlashDevice + ?Sized,
    S: BootConfigStore,
    R: Restart,
{
    /// Load the boot configuration once and log it
    pub fn new(
        device: &'a mut D,
        mut store: S,
        restart: R,
        options: OrchestratorOptions,
    ) -> Result<Self> {
        let config = store.load()?;
        log_boot_config(&config);
        Ok(Self {
            device,
            store,
            restart,
            config,
            options,
        })
    }

    /// Boot configuration as last loaded or committed
    pub fn boot_config(&self) -> &BootConfig {
        &self.config
    }

    /// Options in effect
    pub fn options(&self) -> &OrchestratorOptions {
        &self.options
    }

    /// Get mutable access to the underlying device
    ///
    /// Used to stage a download before running the self-overwrite maneuver.
    pub fn device_mut(&mut self) -> &mut D {
        self.device
    }

    fn schedule_restart(&mut self) {
        log::info!("restarting in {} ms", self.options.restart_delay_ms);
        self.restart.schedule_restart(self.options.restart_delay_ms);
    }
}

fn log_boot_config(config: &BootConfig) {
    log::info!("current slot:       {}", config.current_slot);
    log::info!("previous slot:      {}", config.previous_slot);
    log::info!("firmware updated:   {}", config.firmware_updated);
    log::info!("first boot:         {}", config.first_boot);
    for slot in 0..crate::boot::SLOT_COUNT {
        log::info!(
            "slot {}: firmware 0x{:08X} ({} bytes), fs 0x{:08X} ({} bytes)",
            slot,
            config.firmware_addr[slot],
            config.firmware_size[slot],
            config.fs_addr[slot],
            config.fs_size[slot]
        );
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::Restart;
    use std::vec::Vec;

    /// Records every scheduled restart
    #[derive(Debug, Default)]
    pub struct RecordingRestart {
        pub scheduled: Vec<u32>,
    }

    impl Restart for RecordingRestart {
        fn schedule_restart(&mut self, delay_ms: u32) {
            self.scheduled.push(delay_ms);
        }
    }
}

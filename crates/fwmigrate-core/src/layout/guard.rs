//! Active image overwrite guard

use crate::error::{Error, Result};

/// Runtime check that keeps writes below the executing firmware image
///
/// The staging region always sits below the running image, so the guard only
/// needs the image's base address: a block whose start address is at or above
/// it is rejected, anything strictly below is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverwriteGuard {
    active_base: u32,
}

impl OverwriteGuard {
    /// Create a guard for an image executing from `active_base`
    pub const fn new(active_base: u32) -> Self {
        Self { active_base }
    }

    /// A guard that never triggers
    pub const fn disabled() -> Self {
        Self::new(u32::MAX)
    }

    /// Base address of the protected image
    pub fn active_base(&self) -> u32 {
        self.active_base
    }

    /// Check whether a block starting at `block_start` may be written
    pub fn permits(&self, block_start: u32) -> bool {
        block_start < self.active_base
    }

    /// Fail with `OverwriteGuardTriggered` if `block_start` is protected
    pub fn check(&self, block_start: u32) -> Result<()> {
        if self.permits(block_start) {
            Ok(())
        } else {
            log::error!(
                "write to 0x{:08X} would overwrite active program at 0x{:08X}",
                block_start,
                self.active_base
            );
            Err(Error::OverwriteGuardTriggered {
                addr: block_start,
                limit: self.active_base,
            })
        }
    }
}

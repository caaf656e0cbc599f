//! CLI command implementations
//!
//! Every command operates on a raw flash image file emulating the device.
//! The image is loaded into a [`DummyFlash`], the engine runs against it and
//! the result is written back, also when the engine failed halfway: a
//! partially written image is exactly what the device would be left with.

pub mod copy;
pub mod init;
pub mod mirror;
mod progress;
pub mod status;
pub mod update;

pub use progress::IndicatifProgress;

use std::path::Path;

use fwmigrate_core::flash::FlashDevice;
use fwmigrate_dummy::DummyFlash;

use crate::config::Config;
use crate::error::Result;

/// Load the flash image, checking its size against the config if one is set
pub(crate) fn open_image(config: &Config, path: &Path) -> Result<DummyFlash> {
    let flash = match config.flash.size {
        Some(size) => DummyFlash::load_sized(path, size)?,
        None => DummyFlash::load(path)?,
    };
    println!(
        "Flash image: {} ({} KiB)",
        path.display(),
        flash.size() / 1024
    );
    Ok(flash)
}

/// Write the image back and hand through the outcome of the operation
pub(crate) fn save_image<T>(flash: &DummyFlash, path: &Path, outcome: Result<T>) -> Result<T> {
    if let Err(e) = flash.save(path) {
        // The operation's own error takes precedence
        if outcome.is_err() {
            log::error!("could not save {}: {}", path.display(), e);
        }
        return outcome.and(Err(e.into()));
    }
    outcome
}

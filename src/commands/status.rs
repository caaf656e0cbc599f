//! Status command implementation

use fwmigrate_core::boot::{BootConfig, BootConfigStore, SLOT_COUNT};
use fwmigrate_core::flash::FlashDevice;
use fwmigrate_dummy::DummyFlash;

use crate::cli::TargetArgs;
use crate::config::Config;
use crate::error::Result;
use crate::store::FileBootConfigStore;

/// Run the status command
pub fn run_status(config: &Config, args: &TargetArgs) -> Result<BootConfig> {
    let path = config.boot_config_file(args.boot_config.as_deref())?;
    let boot = FileBootConfigStore::new(&path)
        .load()
        .map_err(fwmigrate_core::Error::from)?;

    println!("Boot configuration: {}", path.display());
    println!("  Current slot:     {}", boot.current_slot);
    println!("  Previous slot:    {}", boot.previous_slot);
    println!("  Firmware updated: {}", boot.firmware_updated);
    println!("  First boot:       {}", boot.first_boot);
    println!();

    // The image is optional here; without one only the layout is shown
    let flash_size = match config.image(args.image.as_deref()) {
        Ok(image) => Some(DummyFlash::load(&image)?.size()),
        Err(_) => None,
    };

    println!("{:<6} {:<10} {:<24} {:<24}", "Slot", "", "Firmware", "Filesystem");
    for slot in 0..SLOT_COUNT as u8 {
        let fw = boot.firmware_region(slot).map_err(fwmigrate_core::Error::from)?;
        let fs = boot.fs_region(slot).map_err(fwmigrate_core::Error::from)?;
        let marker = if slot == boot.current_slot { "(active)" } else { "" };
        println!(
            "{:<6} {:<10} {:<24} {:<24}",
            slot,
            marker,
            fw.to_string(),
            fs.to_string()
        );

        if let Some(size) = flash_size {
            for (name, region) in [("firmware", fw), ("filesystem", fs)] {
                if region.end() > size as u64 {
                    println!(
                        "  warning: slot {} {} ends past the flash ({} bytes)",
                        slot, name, size
                    );
                }
            }
        }
    }

    if let Some(size) = flash_size {
        println!();
        println!("Flash size: {} KiB", size / 1024);
    }
    Ok(boot)
}

//! Init command implementation
//!
//! Creates an erased flash image and a boot configuration record so the other
//! commands have something to work on.

use fwmigrate_core::boot::{BootConfig, BootConfigStore};
use fwmigrate_core::flash::ERASE_UNIT;
use fwmigrate_dummy::{check_size, DummyConfig, DummyFlash};

use crate::cli::InitArgs;
use crate::config::{Config, DEFAULT_FLASH_SIZE};
use crate::error::{CliError, Result};
use crate::store::FileBootConfigStore;

/// Space reserved below slot 0 for the bootloader and boot-configuration blocks
const BOOT_AREA: u32 = 2 * ERASE_UNIT;

/// Default layout: the flash split in quarters
///
/// ```text
/// 0x0000     bootloader, boot configuration
/// 0x2000     slot 0 firmware
/// 1/4 + 2000 slot 1 firmware
/// 2/4        slot 0 filesystem
/// 3/4        slot 1 filesystem
/// ```
pub fn default_layout(size: u32) -> Result<BootConfig> {
    let quarter = size / 4;
    if quarter % ERASE_UNIT != 0 || quarter <= BOOT_AREA {
        return Err(CliError::InvalidSetting {
            name: "size",
            message: format!(
                "0x{:X} cannot be split into four erase-unit aligned quarters larger than 0x{:X}",
                size, BOOT_AREA
            ),
        });
    }
    Ok(BootConfig {
        current_slot: 0,
        previous_slot: 0,
        firmware_addr: [BOOT_AREA, quarter + BOOT_AREA],
        firmware_size: [quarter - BOOT_AREA, quarter - BOOT_AREA],
        fs_addr: [2 * quarter, 3 * quarter],
        fs_size: [quarter, quarter],
        firmware_updated: false,
        first_boot: true,
    })
}

/// Run the init command
pub fn run_init(config: &Config, args: &InitArgs) -> Result<BootConfig> {
    let image = config.image(args.target.image.as_deref())?;
    let boot_path = config.boot_config_file(args.target.boot_config.as_deref())?;
    let size = check_size(
        args.size
            .or(config.flash.size)
            .unwrap_or(DEFAULT_FLASH_SIZE) as usize,
    )?;

    if !args.force {
        for path in [&image, &boot_path] {
            if path.exists() {
                return Err(CliError::AlreadyExists(path.clone()));
            }
        }
    }

    let boot = match config.boot.initial {
        Some(initial) => initial,
        None => default_layout(size)?,
    };

    DummyFlash::new(DummyConfig { size }).save(&image)?;
    FileBootConfigStore::new(&boot_path)
        .commit(&boot)
        .map_err(fwmigrate_core::Error::from)?;

    println!("Created {} ({} KiB, erased)", image.display(), size / 1024);
    println!("Created {}", boot_path.display());
    Ok(boot)
}

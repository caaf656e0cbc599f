//! Mirror command implementation

use fwmigrate_core::swap::{
    MirrorOutcome, OrchestratorOptions, SlotSwapOrchestrator, RESTART_DELAY_MS,
};

use super::{open_image, save_image, IndicatifProgress};
use crate::cli::MirrorArgs;
use crate::config::Config;
use crate::error::Result;
use crate::restart::LogRestart;
use crate::store::FileBootConfigStore;

/// Run the mirror command
pub fn run_mirror(config: &Config, args: &MirrorArgs) -> Result<MirrorOutcome> {
    let image = config.image(args.target.image.as_deref())?;
    let store =
        FileBootConfigStore::new(config.boot_config_file(args.target.boot_config.as_deref())?);
    let options = OrchestratorOptions {
        restart_delay_ms: args
            .restart_delay
            .or(config.update.restart_delay_ms)
            .unwrap_or(RESTART_DELAY_MS),
        verify: args.verify || config.update.verify.unwrap_or(false),
    };

    let mut flash = open_image(config, &image)?;
    let mut restart = LogRestart::default();
    let mut progress = IndicatifProgress::new();

    let outcome: Result<MirrorOutcome> = SlotSwapOrchestrator::new(&mut flash, store, &mut restart, options)
        .and_then(|mut orchestrator| orchestrator.mirror_if_needed_with_progress(&mut progress))
        .map_err(Into::into);

    match outcome {
        Ok(MirrorOutcome::NotNeeded { current_slot }) => {
            println!("Running from slot {}, nothing to mirror", current_slot);
            Ok(MirrorOutcome::NotNeeded { current_slot })
        }
        outcome => {
            let outcome = save_image(&flash, &image, outcome)?;
            println!("Slot 0 mirrored into slot 1, now booting slot 1");
            if let Some(delay) = restart.scheduled() {
                println!("Restart scheduled in {} ms", delay);
            }
            Ok(outcome)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::TargetArgs;
    use crate::error::CliError;
    use fwmigrate_core::boot::{BootConfig, BootConfigStore};
    use fwmigrate_dummy::{DummyConfig, DummyFlash};
    use std::path::Path;

    const SIZE: u32 = 64 * 1024;

    fn layout() -> BootConfig {
        BootConfig {
            current_slot: 0,
            previous_slot: 0,
            firmware_addr: [0x2000, 0x6000],
            firmware_size: [0x3000, 0x3000],
            fs_addr: [0xA000, 0xC000],
            fs_size: [0x1800, 0x1800],
            firmware_updated: false,
            first_boot: false,
        }
    }

    fn setup(dir: &Path, boot: &BootConfig) -> (MirrorArgs, Vec<u8>) {
        let mut data = vec![0xFFu8; SIZE as usize];
        for (i, b) in data[0x2000..0x5000].iter_mut().enumerate() {
            *b = (i * 7 % 256) as u8;
        }
        for (i, b) in data[0xA000..0xB800].iter_mut().enumerate() {
            *b = (i % 13) as u8;
        }
        DummyFlash::with_data(DummyConfig { size: SIZE }, &data)
            .save(dir.join("flash.bin"))
            .unwrap();
        FileBootConfigStore::new(dir.join("boot.cfg"))
            .write(boot)
            .unwrap();

        let args = MirrorArgs {
            target: TargetArgs {
                image: Some(dir.join("flash.bin")),
                boot_config: Some(dir.join("boot.cfg")),
            },
            verify: true,
            restart_delay: Some(100),
        };
        (args, data)
    }

    #[test]
    fn test_mirror_from_slot_zero() {
        let dir = tempfile::tempdir().unwrap();
        let (args, data) = setup(dir.path(), &layout());

        let outcome = run_mirror(&Config::default(), &args).unwrap();
        assert_eq!(outcome, MirrorOutcome::Mirrored);

        let flash = DummyFlash::load(dir.path().join("flash.bin")).unwrap();
        assert_eq!(&flash.data()[0x6000..0x9000], &data[0x2000..0x5000]);
        assert_eq!(&flash.data()[0xC000..0xD800], &data[0xA000..0xB800]);

        let stored = FileBootConfigStore::new(dir.path().join("boot.cfg"))
            .load()
            .unwrap();
        assert_eq!(stored.current_slot, 1);
        assert_eq!(stored.previous_slot, 0);
        assert!(stored.firmware_updated);
        assert!(stored.first_boot);
    }

    #[test]
    fn test_mirror_not_needed_leaves_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut boot = layout();
        boot.current_slot = 1;
        let (args, data) = setup(dir.path(), &boot);

        assert_eq!(
            run_mirror(&Config::default(), &args).unwrap(),
            MirrorOutcome::NotNeeded { current_slot: 1 }
        );
        let flash = DummyFlash::load(dir.path().join("flash.bin")).unwrap();
        assert_eq!(flash.data(), &data[..]);
        let stored = FileBootConfigStore::new(dir.path().join("boot.cfg"))
            .load()
            .unwrap();
        assert_eq!(stored, boot);
    }

    #[test]
    fn test_mirror_with_missing_boot_config() {
        let dir = tempfile::tempdir().unwrap();
        let (mut args, _) = setup(dir.path(), &layout());
        args.target.boot_config = Some(dir.path().join("nope.cfg"));

        assert!(matches!(
            run_mirror(&Config::default(), &args),
            Err(CliError::Engine(fwmigrate_core::Error::BootConfig(_)))
        ));
    }
}

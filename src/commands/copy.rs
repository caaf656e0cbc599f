//! Copy command implementation

use fwmigrate_core::flash::BlockCopier;

use super::{open_image, save_image, IndicatifProgress};
use crate::cli::CopyArgs;
use crate::config::Config;
use crate::error::Result;

/// Run the copy command
pub fn run_copy(config: &Config, args: &CopyArgs) -> Result<()> {
    let image = config.image(args.image.as_deref())?;
    let mut flash = open_image(config, &image)?;

    let outcome = {
        let mut copier = BlockCopier::new(&mut flash);
        let mut progress = IndicatifProgress::new();
        copier
            .copy_with_progress(args.src, args.dest, args.len, &mut progress)
            .and_then(|stats| {
                if args.verify {
                    copier.verify(args.src, args.dest, args.len)?;
                    println!("Verified {} bytes", args.len);
                }
                Ok(stats)
            })
            .map_err(Into::into)
    };
    let stats = save_image(&flash, &image, outcome)?;

    println!(
        "Copied {} bytes from 0x{:08X} to 0x{:08X} ({} blocks erased)",
        stats.bytes_copied, args.src, args.dest, stats.blocks_erased
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CliError;
    use fwmigrate_core::layout::LayoutError;
    use fwmigrate_dummy::{DummyConfig, DummyFlash};
    use std::path::PathBuf;

    fn args(image: PathBuf, src: u32, dest: u32, len: u32) -> CopyArgs {
        CopyArgs {
            image: Some(image),
            src,
            dest,
            len,
            verify: true,
        }
    }

    #[test]
    fn test_copy_updates_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.bin");
        let mut initial = vec![0xFFu8; 64 * 1024];
        for (i, b) in initial[0x1000..0x3800].iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        DummyFlash::with_data(DummyConfig { size: 64 * 1024 }, &initial)
            .save(&path)
            .unwrap();

        run_copy(&Config::default(), &args(path.clone(), 0x1000, 0x8000, 0x2800)).unwrap();

        let flash = DummyFlash::load(&path).unwrap();
        assert_eq!(&flash.data()[0x8000..0xA800], &initial[0x1000..0x3800]);
        assert!(flash.data()[0xA800..0xB000].iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn test_copy_rejects_overlap_without_touching_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.bin");
        DummyFlash::new(DummyConfig { size: 64 * 1024 })
            .save(&path)
            .unwrap();

        let err = run_copy(&Config::default(), &args(path.clone(), 0x1000, 0x2000, 0x2000))
            .unwrap_err();
        assert!(matches!(
            err,
            CliError::Engine(fwmigrate_core::Error::Layout(LayoutError::Overlap))
        ));
        assert!(DummyFlash::load(&path)
            .unwrap()
            .data()
            .iter()
            .all(|&b| b == 0xFF));
    }

    #[test]
    fn test_copy_checks_configured_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.bin");
        DummyFlash::new(DummyConfig { size: 64 * 1024 })
            .save(&path)
            .unwrap();
        let config = Config::from_toml_str("[flash]\nsize = \"0x20000\"\n").unwrap();

        assert!(matches!(
            run_copy(&config, &args(path, 0, 0x8000, 0x1000)),
            Err(CliError::Image(_))
        ));
    }
}

//! fwmigrate-dummy - In-memory NOR flash emulator
//!
//! This crate provides a [`FlashDevice`] that emulates a NOR flash part in
//! memory. It is used by the `fwmigrate` CLI to run the engine against raw
//! image files, and by tests that need an operation log or injected faults.
//!
//! The emulation follows NOR rules: an erase sets a whole erase unit to 0xFF
//! and programming can only clear bits, so writing to a block that was not
//! erased first shows up as corrupted data instead of silently succeeding.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(feature = "std")]
mod error;

#[cfg(feature = "std")]
pub use error::DummyError;

#[cfg(feature = "alloc")]
use alloc::vec;
#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use fwmigrate_core::error::{Error, FlashIoFailure, Result};
use fwmigrate_core::flash::{is_aligned, FlashDevice, ERASED_VALUE, ERASE_UNIT};

/// Configuration for the dummy flash
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Flash size in bytes
    pub size: u32,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            size: 4 * 1024 * 1024,
        }
    }
}

/// A flash primitive call recorded by [`DummyFlash`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    /// Erase of a block index
    Erase(u32),
    /// Read of (address, length)
    Read(u32, u32),
    /// Write of (address, length)
    Write(u32, u32),
}

impl FlashOp {
    /// Check for an erase or a write
    pub fn is_mutation(&self) -> bool {
        !matches!(self, FlashOp::Read(..))
    }
}

/// Dummy flash device
///
/// Emulates a NOR flash part in memory for testing purposes. Primitive calls
/// are only logged after [`record_ops`](Self::record_ops) enabled it.
#[cfg(feature = "alloc")]
pub struct DummyFlash {
    config: DummyConfig,
    data: Vec<u8>,
    ops: Option<Vec<FlashOp>>,
    /// Erase and write calls attempted, failed ones included
    mutations: usize,
    /// Erase and write calls that succeeded
    completed: usize,
    fail_at: Option<usize>,
}

#[cfg(feature = "alloc")]
impl DummyFlash {
    /// Create a new, fully erased dummy flash
    pub fn new(config: DummyConfig) -> Self {
        let data = vec![ERASED_VALUE; config.size as usize];
        Self {
            config,
            data,
            ops: None,
            mutations: 0,
            completed: 0,
            fail_at: None,
        }
    }

    /// Create a dummy flash with pre-filled data
    pub fn with_data(config: DummyConfig, initial_data: &[u8]) -> Self {
        let mut flash = Self::new(config);
        let len = core::cmp::min(initial_data.len(), flash.data.len());
        flash.data[..len].copy_from_slice(&initial_data[..len]);
        flash
    }

    /// Get a reference to the flash data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get a mutable reference to the flash data
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Get the configuration
    pub fn config(&self) -> &DummyConfig {
        &self.config
    }

    /// Start or stop logging primitive calls
    ///
    /// Stopping drops the log recorded so far.
    pub fn record_ops(&mut self, enabled: bool) {
        match (enabled, self.ops.is_some()) {
            (true, false) => self.ops = Some(Vec::new()),
            (false, true) => self.ops = None,
            _ => {}
        }
    }

    /// Primitive calls logged since recording was enabled or last cleared
    pub fn ops(&self) -> &[FlashOp] {
        self.ops.as_deref().unwrap_or(&[])
    }

    /// Forget the recorded operations
    pub fn clear_ops(&mut self) {
        if let Some(ops) = &mut self.ops {
            ops.clear();
        }
    }

    /// Number of erase and write calls that succeeded so far
    pub fn mutation_count(&self) -> usize {
        self.completed
    }

    fn log_op(&mut self, op: FlashOp) {
        if op.is_mutation() {
            self.completed += 1;
        }
        if let Some(ops) = &mut self.ops {
            ops.push(op);
        }
    }

    /// Make the `n`th erase or write from now on (zero based) fail once
    ///
    /// The failing call leaves the flash contents untouched, which models a
    /// power cut right before the operation.
    pub fn fail_nth_mutation(&mut self, n: usize) {
        self.fail_at = Some(self.mutations + n);
    }

    fn should_fail(&mut self) -> bool {
        let index = self.mutations;
        self.mutations += 1;
        if self.fail_at == Some(index) {
            self.fail_at = None;
            log::debug!("dummy: injecting fault at mutation {}", index);
            true
        } else {
            false
        }
    }

    fn range(&self, addr: u32, len: usize) -> Result<core::ops::Range<usize>> {
        let start = addr as usize;
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(Error::FlashIo(FlashIoFailure::OutOfBounds {
                addr,
                len: len as u32,
            })),
        }
    }
}

#[cfg(feature = "std")]
impl DummyFlash {
    /// Load flash contents from a raw image file
    ///
    /// The flash size is the file size, which must be a non-zero multiple of
    /// the erase unit.
    pub fn load(path: impl AsRef<std::path::Path>) -> core::result::Result<Self, DummyError> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| DummyError::Load {
            path: path.to_path_buf(),
            source,
        })?;

        let size = check_size(data.len())?;
        log::debug!("dummy: loaded {} bytes from {}", size, path.display());
        Ok(Self::with_data(DummyConfig { size }, &data))
    }

    /// Load a raw image file and check it has `expected` bytes
    pub fn load_sized(
        path: impl AsRef<std::path::Path>,
        expected: u32,
    ) -> core::result::Result<Self, DummyError> {
        let flash = Self::load(path)?;
        if flash.config.size != expected {
            return Err(DummyError::SizeMismatch {
                expected: expected as usize,
                actual: flash.config.size as usize,
            });
        }
        Ok(flash)
    }

    /// Write the flash contents to a raw image file
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> core::result::Result<(), DummyError> {
        let path = path.as_ref();
        std::fs::write(path, &self.data).map_err(|source| DummyError::Save {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("dummy: saved {} bytes to {}", self.data.len(), path.display());
        Ok(())
    }
}

/// Validate an emulated flash size
#[cfg(feature = "std")]
pub fn check_size(size: usize) -> core::result::Result<u32, DummyError> {
    match u32::try_from(size) {
        Ok(s) if s != 0 && is_aligned(s) => Ok(s),
        _ => Err(DummyError::InvalidSize(size)),
    }
}

#[cfg(feature = "alloc")]
impl FlashDevice for DummyFlash {
    fn size(&self) -> u32 {
        self.config.size
    }

    fn erase_block(&mut self, block: u32) -> Result<()> {
        let addr = block
            .checked_mul(ERASE_UNIT)
            .ok_or(Error::FlashIo(FlashIoFailure::Erase { block }))?;
        let range = self.range(addr, ERASE_UNIT as usize)?;
        if self.should_fail() {
            return Err(Error::FlashIo(FlashIoFailure::Erase { block }));
        }
        self.log_op(FlashOp::Erase(block));
        // Erase sets all bytes to 0xFF
        self.data[range].fill(ERASED_VALUE);
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let range = self.range(addr, buf.len())?;
        self.log_op(FlashOp::Read(addr, buf.len() as u32));
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        if !is_aligned(addr) {
            return Err(Error::AlignmentViolation { addr });
        }
        let range = self.range(addr, data.len())?;
        if self.should_fail() {
            return Err(Error::FlashIo(FlashIoFailure::Write {
                addr,
                len: data.len() as u32,
            }));
        }
        self.log_op(FlashOp::Write(addr, data.len() as u32));
        // Flash programming: can only change 1 -> 0
        for (dst, &src) in self.data[range].iter_mut().zip(data) {
            *dst &= src;
        }
        Ok(())
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use fwmigrate_core::boot::{BootConfig, RamStore};
    use fwmigrate_core::flash::BlockCopier;
    use fwmigrate_core::layout::OverwriteGuard;
    use fwmigrate_core::swap::{OrchestratorOptions, OverwritePlan, Restart, SlotSwapOrchestrator};

    struct NoRestart;

    impl Restart for NoRestart {
        fn schedule_restart(&mut self, _delay_ms: u32) {}
    }

    fn small() -> DummyConfig {
        DummyConfig { size: 64 * 1024 }
    }

    #[test]
    fn test_read_write() {
        let mut flash = DummyFlash::new(small());

        let data = [0x12, 0x34, 0x56, 0x78];
        flash.write(0x1000, &data).unwrap();

        let mut buf = [0u8; 4];
        flash.read(0x1000, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn test_program_only_clears_bits() {
        let mut flash = DummyFlash::new(small());

        flash.write(0, &[0x0F]).unwrap();
        flash.write(0, &[0xF0]).unwrap();
        assert_eq!(flash.data()[0], 0x00);

        flash.erase_block(0).unwrap();
        assert!(flash.data()[..ERASE_UNIT as usize].iter().all(|&b| b == 0xFF));
        flash.write(0, &[0xF0]).unwrap();
        assert_eq!(flash.data()[0], 0xF0);
    }

    #[test]
    fn test_alignment_and_bounds() {
        let mut flash = DummyFlash::new(small());
        flash.record_ops(true);
        assert_eq!(
            flash.write(0x10, &[0]),
            Err(Error::AlignmentViolation { addr: 0x10 })
        );
        assert_eq!(
            flash.erase_block(16),
            Err(Error::FlashIo(FlashIoFailure::OutOfBounds {
                addr: 0x10000,
                len: ERASE_UNIT
            }))
        );
        let mut buf = [0u8; 8];
        assert!(flash.read(0xFFFC, &mut buf).is_err());
        assert!(flash.ops().is_empty());
    }

    #[test]
    fn test_fault_injection_is_one_shot() {
        let mut flash = DummyFlash::new(small());
        flash.fail_nth_mutation(1);

        flash.erase_block(0).unwrap();
        assert_eq!(
            flash.write(0, &[0x00; 16]),
            Err(Error::FlashIo(FlashIoFailure::Write { addr: 0, len: 16 }))
        );
        assert_eq!(flash.data()[0], 0xFF);
        flash.write(0, &[0x00; 16]).unwrap();
        assert_eq!(flash.mutation_count(), 2);
    }

    #[test]
    fn test_op_log_is_opt_in() {
        let mut flash = DummyFlash::new(small());
        let mut buf = [0u8; 16];

        flash.erase_block(0).unwrap();
        flash.read(0, &mut buf).unwrap();
        assert!(flash.ops().is_empty());
        assert_eq!(flash.mutation_count(), 1);

        flash.record_ops(true);
        flash.write(0, &[0xA5; 16]).unwrap();
        flash.read(0, &mut buf).unwrap();
        assert_eq!(flash.ops(), &[FlashOp::Write(0, 16), FlashOp::Read(0, 16)]);
        assert_eq!(flash.mutation_count(), 2);

        flash.clear_ops();
        assert!(flash.ops().is_empty());
        flash.erase_block(1).unwrap();
        flash.record_ops(false);
        assert!(flash.ops().is_empty());
        assert_eq!(flash.mutation_count(), 3);
    }

    #[test]
    fn test_save_and_load_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flash.bin");

        let mut flash = DummyFlash::new(small());
        flash.erase_block(3).unwrap();
        flash.write(0x3000, b"fwmigrate").unwrap();
        flash.save(&path).unwrap();

        let loaded = DummyFlash::load(&path).unwrap();
        assert_eq!(loaded.config().size, 64 * 1024);
        assert_eq!(&loaded.data()[0x3000..0x3009], b"fwmigrate");
        assert!(loaded.ops().is_empty());

        assert!(matches!(
            DummyFlash::load_sized(&path, 128 * 1024),
            Err(DummyError::SizeMismatch {
                expected: 131072,
                actual: 65536
            })
        ));
    }

    #[test]
    fn test_load_rejects_bad_images() {
        let dir = tempfile::tempdir().unwrap();

        let odd = dir.path().join("odd.bin");
        std::fs::write(&odd, [0u8; 100]).unwrap();
        assert!(matches!(
            DummyFlash::load(&odd),
            Err(DummyError::InvalidSize(100))
        ));

        assert!(matches!(
            DummyFlash::load(dir.path().join("missing.bin")),
            Err(DummyError::Load { .. })
        ));
    }

    #[test]
    fn test_block_copier_on_emulator() {
        let image: Vec<u8> = (0..10_000u32).map(|i| (i % 256) as u8).collect();
        let mut flash = DummyFlash::with_data(small(), &image);
        flash.record_ops(true);

        BlockCopier::new(&mut flash)
            .copy(0, 0x8000, image.len() as u32)
            .unwrap();

        assert_eq!(&flash.data()[0x8000..0x8000 + image.len()], &image[..]);
        let erases = flash
            .ops()
            .iter()
            .filter(|op| matches!(op, FlashOp::Erase(_)))
            .count();
        assert_eq!(erases, 3);
    }

    #[test]
    fn test_self_overwrite_survives_power_cut() {
        // 4-block image staged at 0x8000, boot config in its second block
        let image: Vec<u8> = (0..4 * ERASE_UNIT).map(|i| (i / 3) as u8).collect();
        let mut initial = vec![0x5Au8; 0x8000];
        initial.extend_from_slice(&image);

        let guard = OverwriteGuard::new(0xC000);
        let plan = OverwritePlan::new(0x8000, image.len() as u32, 0, ERASE_UNIT, guard).unwrap();
        let run = |flash: &mut DummyFlash| -> Result<()> {
            SlotSwapOrchestrator::new(
                flash,
                RamStore::new(&BootConfig::default()),
                NoRestart,
                OrchestratorOptions::default(),
            )?
            .self_overwrite(&plan)
        };

        let mut flash = DummyFlash::with_data(small(), &initial);
        flash.fail_nth_mutation(9);
        assert!(run(&mut flash).is_err());
        run(&mut flash).unwrap();

        assert_eq!(&flash.data()[..image.len()], &image[..]);
    }
}

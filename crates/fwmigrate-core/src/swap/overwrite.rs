//! Self-overwrite maneuver
//!
//! A staged image has to replace the region that starts with the bootloader
//! block and contains the boot-configuration block at a fixed offset. Both
//! blocks are first parked in two scratch blocks right behind the final
//! region, then the body is copied, and the parked blocks are moved into
//! place last: boot configuration first, bootloader at the very end.
//!
//! ```text
//!  staged image               final region               scratch
//!  +----+------+----+------+  +----+------+----+------+  +-----+-----+
//!  | BL | body | BC | tail |  | BL | body | BC | tail |  | BL' | BC' |
//!  +----+------+----+------+  +----+------+----+------+  +-----+-----+
//!
//!  1. staged BL   -> BL'        4. staged tail -> tail
//!  2. staged BC   -> BC'        5. BC'         -> BC
//!  3. staged body -> body       6. BL'         -> BL
//! ```
//!
//! The staged image is never written, so an interrupted run can simply be
//! repeated from the start and produces the same final contents.

use core::fmt;

use crate::boot::BootConfigStore;
use crate::error::Result;
use crate::flash::{ensure_aligned, BlockCopier, FlashDevice, NoProgress, Progress, ERASE_UNIT};
use crate::layout::{LayoutError, OverwriteGuard, Region};
use crate::stream::TransferSummary;

use super::{Restart, SlotSwapOrchestrator};

/// Number of copies in the maneuver
pub const STEP_COUNT: usize = 6;

/// Stage of the maneuver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Staged bootloader block to the first scratch block
    ParkBootloader,
    /// Staged boot-configuration block to the second scratch block
    ParkBootConfig,
    /// Everything between bootloader and boot configuration
    CopyBody,
    /// Everything after the boot-configuration block
    CopyTail,
    /// Parked boot-configuration block into place
    PlaceBootConfig,
    /// Parked bootloader block into place
    PlaceBootloader,
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ParkBootloader => "park bootloader",
            Self::ParkBootConfig => "park boot config",
            Self::CopyBody => "copy body",
            Self::CopyTail => "copy tail",
            Self::PlaceBootConfig => "place boot config",
            Self::PlaceBootloader => "place bootloader",
        };
        f.write_str(s)
    }
}

/// One block copy of the maneuver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyStep {
    /// What this copy does
    pub kind: StepKind,
    /// Source address
    pub src: u32,
    /// Destination address
    pub dest: u32,
    /// Number of bytes
    pub len: u32,
}

/// A validated self-overwrite layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverwritePlan {
    staged: Region,
    final_base: u32,
    boot_config_offset: u32,
    scratch_base: u32,
}

impl OverwritePlan {
    /// Build a plan for moving `image_len` bytes staged at `staged_base` to
    /// `final_base`
    ///
    /// `boot_config_offset` is the offset of the boot-configuration block
    /// inside the image. The whole write extent, scratch blocks included,
    /// is checked against `guard` here so a rejected plan never touches flash.
    pub fn new(
        staged_base: u32,
        image_len: u32,
        final_base: u32,
        boot_config_offset: u32,
        guard: OverwriteGuard,
    ) -> Result<Self> {
        ensure_aligned(staged_base)?;
        ensure_aligned(final_base)?;
        ensure_aligned(boot_config_offset)?;

        if image_len == 0 {
            return Err(LayoutError::EmptyRegion.into());
        }
        // The boot-config block shares nothing with the bootloader block
        if boot_config_offset < ERASE_UNIT {
            return Err(LayoutError::Overlap.into());
        }
        if (boot_config_offset as u64 + ERASE_UNIT as u64) > image_len as u64 {
            return Err(LayoutError::BootConfigOutsideImage.into());
        }

        let staged = Region::new(staged_base, image_len);
        let target = Region::new(final_base, image_len);
        if staged.end() > u32::MAX as u64 || target.end() > u32::MAX as u64 {
            return Err(LayoutError::OutOfBounds.into());
        }

        let last_block = target.last_block().ok_or(LayoutError::EmptyRegion)?;
        let scratch_base = last_block
            .checked_add(1)
            .and_then(|b| b.checked_mul(ERASE_UNIT))
            .filter(|base| base.checked_add(2 * ERASE_UNIT).is_some())
            .ok_or(LayoutError::OutOfBounds)?;
        let scratch = Region::new(scratch_base, 2 * ERASE_UNIT);

        if staged.overlaps(&target) || staged.overlaps(&scratch) {
            log::error!(
                "staged image {} overlaps final region {} or scratch {}",
                staged,
                target,
                scratch
            );
            return Err(LayoutError::Overlap.into());
        }

        // Highest block the maneuver writes is the second scratch block
        guard.check(scratch_base + ERASE_UNIT)?;

        Ok(Self {
            staged,
            final_base,
            boot_config_offset,
            scratch_base,
        })
    }

    /// Plan for a finished download
    pub fn from_transfer(
        transfer: &TransferSummary,
        final_base: u32,
        boot_config_offset: u32,
        guard: OverwriteGuard,
    ) -> Result<Self> {
        Self::new(
            transfer.dest_base,
            transfer.bytes_received,
            final_base,
            boot_config_offset,
            guard,
        )
    }

    /// Where the image is staged
    pub fn staged(&self) -> Region {
        self.staged
    }

    /// Where the image ends up
    pub fn target(&self) -> Region {
        Region::new(self.final_base, self.staged.len)
    }

    /// The two scratch blocks
    pub fn scratch(&self) -> Region {
        Region::new(self.scratch_base, 2 * ERASE_UNIT)
    }

    /// Every range the maneuver writes, from the final base to the end of
    /// the scratch blocks
    pub fn write_extent(&self) -> Region {
        Region::new(
            self.final_base,
            self.scratch_base + 2 * ERASE_UNIT - self.final_base,
        )
    }

    /// The copies in execution order
    pub fn steps(&self) -> [CopyStep; STEP_COUNT] {
        let staged = self.staged.start;
        let bco = self.boot_config_offset;
        let tail = bco + ERASE_UNIT;
        let scratch_bl = self.scratch_base;
        let scratch_bc = self.scratch_base + ERASE_UNIT;

        [
            CopyStep {
                kind: StepKind::ParkBootloader,
                src: staged,
                dest: scratch_bl,
                len: ERASE_UNIT,
            },
            CopyStep {
                kind: StepKind::ParkBootConfig,
                src: staged + bco,
                dest: scratch_bc,
                len: ERASE_UNIT,
            },
            CopyStep {
                kind: StepKind::CopyBody,
                src: staged + ERASE_UNIT,
                dest: self.final_base + ERASE_UNIT,
                len: bco - ERASE_UNIT,
            },
            CopyStep {
                kind: StepKind::CopyTail,
                src: staged + tail,
                dest: self.final_base + tail,
                len: self.staged.len - tail,
            },
            CopyStep {
                kind: StepKind::PlaceBootConfig,
                src: scratch_bc,
                dest: self.final_base + bco,
                len: ERASE_UNIT,
            },
            CopyStep {
                kind: StepKind::PlaceBootloader,
                src: scratch_bl,
                dest: self.final_base,
                len: ERASE_UNIT,
            },
        ]
    }
}

impl<D, S, R> SlotSwapOrchestrator<'_, D, S, R>
where
    D: FlashDevice + ?Sized,
    S: BootConfigStore,
    R: Restart,
{
    /// Move a staged image over the bootloader region
    ///
    /// Any failure aborts immediately and skips the restart. Because the
    /// staged image is left intact, calling this again with the same plan
    /// completes the job.
    pub fn self_overwrite(&mut self, plan: &OverwritePlan) -> Result<()> {
        self.self_overwrite_with_progress(plan, &mut NoProgress)
    }

    /// Same as [`self_overwrite`](Self::self_overwrite), reporting copy progress
    pub fn self_overwrite_with_progress<P: Progress + ?Sized>(
        &mut self,
        plan: &OverwritePlan,
        progress: &mut P,
    ) -> Result<()> {
        let device_size = self.device.size() as u64;
        if plan.staged().end() > device_size || plan.write_extent().end() > device_size {
            log::error!(
                "self-overwrite needs flash up to 0x{:08X}, device has 0x{:08X}",
                plan.write_extent().end().max(plan.staged().end()),
                device_size
            );
            return Err(LayoutError::OutOfBounds.into());
        }

        log::info!(
            "self-overwrite: {} -> 0x{:08X}, scratch {}",
            plan.staged(),
            plan.target().start,
            plan.scratch()
        );

        let mut copier = BlockCopier::new(&mut *self.device);
        for (i, step) in plan.steps().iter().enumerate() {
            log::info!(
                "step {}/{}: {} (0x{:08X} -> 0x{:08X}, {} bytes)",
                i + 1,
                STEP_COUNT,
                step.kind,
                step.src,
                step.dest,
                step.len
            );
            copier.copy_with_progress(step.src, step.dest, step.len, progress)?;
        }

        if self.options.verify {
            copier.verify(plan.staged().start, plan.target().start, plan.staged().len)?;
            log::info!("final image verified");
        }

        log::info!("self-overwrite complete");
        self.schedule_restart();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boot::{BootConfig, RamStore};
    use crate::error::Error;
    use crate::mock::{FlashOp, MockFlash};
    use crate::swap::testutil::RecordingRestart;
    use crate::swap::OrchestratorOptions;
    use std::vec;
    use std::vec::Vec;

    const EU: u32 = ERASE_UNIT;
    const FLASH_SIZE: usize = 256 * 1024;

    // Final region at 0, boot config at 0x3000, image of 5.5 blocks staged
    // at 0x20000, running app at 0x30000
    const STAGED: u32 = 0x20000;
    const IMAGE_LEN: u32 = 5 * EU + 0x800;
    const BCO: u32 = 0x3000;
    const ACTIVE: u32 = 0x30000;

    fn image() -> Vec<u8> {
        (0..IMAGE_LEN as usize)
            .map(|i| ((i / 7) as u8).wrapping_add((i >> 12) as u8 * 40))
            .collect()
    }

    /// Flash holding an old bootloader/image at 0 and the new one staged
    fn device() -> MockFlash {
        let old = vec![0x11u8; IMAGE_LEN as usize];
        MockFlash::with_contents(FLASH_SIZE, &[(0, &old), (STAGED, &image())])
    }

    fn plan() -> OverwritePlan {
        OverwritePlan::new(STAGED, IMAGE_LEN, 0, BCO, OverwriteGuard::new(ACTIVE)).unwrap()
    }

    fn run(flash: &mut MockFlash, restart: &mut RecordingRestart) -> Result<()> {
        SlotSwapOrchestrator::new(
            flash,
            RamStore::new(&BootConfig::default()),
            restart,
            OrchestratorOptions {
                verify: true,
                ..Default::default()
            },
        )?
        .self_overwrite(&plan())
    }

    #[test]
    fn test_plan_steps() {
        let steps = plan().steps();
        // Last block of the final region is 5, scratch is blocks 6 and 7
        assert_eq!(plan().scratch(), Region::new(0x6000, 0x2000));
        let expect = [
            (StepKind::ParkBootloader, STAGED, 0x6000, EU),
            (StepKind::ParkBootConfig, STAGED + BCO, 0x7000, EU),
            (StepKind::CopyBody, STAGED + EU, EU, BCO - EU),
            (StepKind::CopyTail, STAGED + BCO + EU, BCO + EU, IMAGE_LEN - BCO - EU),
            (StepKind::PlaceBootConfig, 0x7000, BCO, EU),
            (StepKind::PlaceBootloader, 0x6000, 0, EU),
        ];
        for (step, (kind, src, dest, len)) in steps.iter().zip(expect) {
            assert_eq!(*step, CopyStep { kind, src, dest, len });
        }
    }

    #[test]
    fn test_self_overwrite_installs_image_and_restarts() {
        let mut flash = device();
        let mut restart = RecordingRestart::default();

        run(&mut flash, &mut restart).unwrap();

        assert_eq!(&flash.memory()[..IMAGE_LEN as usize], &image()[..]);
        // Staged copy untouched
        let staged = &flash.memory()[STAGED as usize..(STAGED + IMAGE_LEN) as usize];
        assert_eq!(staged, &image()[..]);
        assert_eq!(restart.scheduled, [20_000]);
    }

    #[test]
    fn test_bootloader_block_written_last_and_boot_config_before_it() {
        let mut flash = device();
        run(&mut flash, &mut RecordingRestart::default()).unwrap();

        let mutations = flash.mutations();
        let erase_pos = |block: u32| {
            mutations
                .iter()
                .rposition(|op| *op == FlashOp::Erase(block))
                .unwrap()
        };
        let n = mutations.len();
        assert_eq!(mutations[n - 2..], [FlashOp::Erase(0), FlashOp::Write(0, EU)]);
        assert!(erase_pos(BCO / EU) < erase_pos(0));
        // Scratch blocks are filled before anything in the final region moves
        assert!(erase_pos(6) < erase_pos(1));
        assert!(erase_pos(7) < erase_pos(1));
        // The bootloader block is erased exactly once
        assert_eq!(
            mutations.iter().filter(|op| **op == FlashOp::Erase(0)).count(),
            1
        );
    }

    #[test]
    fn test_interruption_at_every_step_is_recoverable() {
        let mut reference = device();
        run(&mut reference, &mut RecordingRestart::default()).unwrap();
        let total = reference.mutations().len();
        assert_eq!(total, 2 * (6 + 2));

        for fail_at in 0..total {
            let mut flash = device();
            flash.fail_mutation(fail_at);
            let mut restart = RecordingRestart::default();

            let result = run(&mut flash, &mut restart);
            assert!(matches!(result, Err(Error::FlashIo(_))), "fail_at {}", fail_at);
            assert!(restart.scheduled.is_empty());
            assert_eq!(
                &flash.memory()[STAGED as usize..(STAGED + IMAGE_LEN) as usize],
                &image()[..],
                "staged image damaged at fail_at {}",
                fail_at
            );

            run(&mut flash, &mut restart).unwrap();
            assert_eq!(flash.memory(), reference.memory(), "fail_at {}", fail_at);
            assert_eq!(restart.scheduled, [20_000]);
        }
    }

    #[test]
    fn test_guard_rejects_plan_before_touching_flash() {
        // Scratch blocks 6 and 7 end at 0x8000; the app starts at 0x7000
        assert_eq!(
            OverwritePlan::new(STAGED, IMAGE_LEN, 0, BCO, OverwriteGuard::new(0x7000)),
            Err(Error::OverwriteGuardTriggered {
                addr: 0x7000,
                limit: 0x7000
            })
        );
        assert!(OverwritePlan::new(STAGED, IMAGE_LEN, 0, BCO, OverwriteGuard::new(0x8000)).is_ok());
    }

    #[test]
    fn test_plan_rejects_bad_layouts() {
        let guard = OverwriteGuard::disabled();
        assert_eq!(
            OverwritePlan::new(STAGED + 4, IMAGE_LEN, 0, BCO, guard),
            Err(Error::AlignmentViolation { addr: STAGED + 4 })
        );
        assert_eq!(
            OverwritePlan::new(STAGED, 0, 0, BCO, guard),
            Err(Error::Layout(LayoutError::EmptyRegion))
        );
        assert_eq!(
            OverwritePlan::new(STAGED, IMAGE_LEN, 0, 0, guard),
            Err(Error::Layout(LayoutError::Overlap))
        );
        assert_eq!(
            OverwritePlan::new(STAGED, 4 * EU - 1, 0, BCO, guard),
            Err(Error::Layout(LayoutError::BootConfigOutsideImage))
        );
        // Staged image sitting on the scratch blocks
        assert_eq!(
            OverwritePlan::new(0x7000, IMAGE_LEN, 0, BCO, guard),
            Err(Error::Layout(LayoutError::Overlap))
        );
        // Staged image overlapping the final region
        assert_eq!(
            OverwritePlan::new(0x2000, IMAGE_LEN, 0, BCO, guard),
            Err(Error::Layout(LayoutError::Overlap))
        );
    }

    #[test]
    fn test_plan_that_does_not_fit_device() {
        let plan =
            OverwritePlan::new(0x3E000, 4 * EU, 0, BCO, OverwriteGuard::disabled()).unwrap();
        let mut flash = device();
        let result = SlotSwapOrchestrator::new(
            &mut flash,
            RamStore::new(&BootConfig::default()),
            RecordingRestart::default(),
            OrchestratorOptions::default(),
        )
        .unwrap()
        .self_overwrite(&plan);
        assert_eq!(result, Err(Error::Layout(LayoutError::OutOfBounds)));
        assert!(flash.ops().is_empty());
    }

    #[test]
    fn test_plan_from_transfer() {
        let summary = TransferSummary {
            dest_base: STAGED,
            bytes_received: IMAGE_LEN,
            blocks_written: 6,
        };
        assert_eq!(
            OverwritePlan::from_transfer(&summary, 0, BCO, OverwriteGuard::new(ACTIVE)),
            Ok(plan())
        );
    }

    #[test]
    fn test_image_without_body_or_tail() {
        // Boot config directly after the bootloader and last in the image
        let data: Vec<u8> = (0..2 * EU as usize).map(|i| (i % 13) as u8).collect();
        let mut flash = MockFlash::with_contents(FLASH_SIZE, &[(STAGED, &data)]);
        let plan = OverwritePlan::new(STAGED, 2 * EU, 0, EU, OverwriteGuard::new(ACTIVE)).unwrap();
        assert_eq!(plan.steps()[2].len, 0);
        assert_eq!(plan.steps()[3].len, 0);

        SlotSwapOrchestrator::new(
            &mut flash,
            RamStore::new(&BootConfig::default()),
            RecordingRestart::default(),
            OrchestratorOptions::default(),
        )
        .unwrap()
        .self_overwrite(&plan)
        .unwrap();

        assert_eq!(&flash.memory()[..2 * EU as usize], &data[..]);
    }
}

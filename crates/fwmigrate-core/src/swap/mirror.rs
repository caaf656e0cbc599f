//! Legacy slot mirroring

use crate::boot::BootConfigStore;
use crate::error::Result;
use crate::flash::{
    ensure_aligned, ensure_in_bounds, BlockCopier, FlashDevice, NoProgress, Progress,
};
use crate::layout::{LayoutError, Region};

use super::{Restart, SlotSwapOrchestrator};

/// Result of [`SlotSwapOrchestrator::mirror_if_needed`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorOutcome {
    /// Slot 0 was copied into slot 1 and the boot configuration switched
    Mirrored,
    /// The device is not executing from slot 0
    NotNeeded {
        /// Slot the device is executing from
        current_slot: u8,
    },
}

/// One source/destination pair of the mirror
#[derive(Debug, Clone, Copy)]
struct Transfer {
    label: &'static str,
    src: Region,
    dest: Region,
}

impl<D, S, R> SlotSwapOrchestrator<'_, D, S, R>
where
    D: FlashDevice + ?Sized,
    S: BootConfigStore,
    R: Restart,
{
    /// Mirror slot 0 into slot 1 if the device still executes from slot 0
    ///
    /// The firmware region and then the filesystem region of slot 0 are copied
    /// to slot 1 using slot 0's sizes. The boot configuration is committed only
    /// after both copies (and their verification, if enabled) succeeded, so an
    /// interruption at any earlier point leaves the old configuration in place
    /// and the mirror simply runs again on the next boot.
    pub fn mirror_if_needed(&mut self) -> Result<MirrorOutcome> {
        self.mirror_if_needed_with_progress(&mut NoProgress)
    }

    /// Same as [`mirror_if_needed`](Self::mirror_if_needed), reporting copy progress
    pub fn mirror_if_needed_with_progress<P: Progress + ?Sized>(
        &mut self,
        progress: &mut P,
    ) -> Result<MirrorOutcome> {
        if self.config.current_slot != 0 {
            log::info!(
                "booted from slot {}, nothing to mirror",
                self.config.current_slot
            );
            return Ok(MirrorOutcome::NotNeeded {
                current_slot: self.config.current_slot,
            });
        }

        log::info!("booted from slot 0, copying to slot 1");
        let transfers = self.plan_mirror()?;

        let mut copier = BlockCopier::new(&mut *self.device);
        for t in &transfers {
            log::info!("mirroring {}: {} -> 0x{:08X}", t.label, t.src, t.dest.start);
            copier.copy_with_progress(t.src.start, t.dest.start, t.src.len, progress)?;
        }
        if self.options.verify {
            for t in &transfers {
                copier.verify(t.src.start, t.dest.start, t.src.len)?;
                log::info!("{} copy verified", t.label);
            }
        }

        let mut next = self.config;
        next.switch_to_mirror();
        self.store.commit(&next)?;
        self.config = next;
        log::info!("boot config switched to slot 1");

        self.schedule_restart();
        Ok(MirrorOutcome::Mirrored)
    }

    /// Validate the mirror layout before any flash is touched
    fn plan_mirror(&self) -> Result<[Transfer; 2]> {
        let config = &self.config;
        let fw_src = config.firmware_region(0)?;
        let fs_src = config.fs_region(0)?;

        let transfers = [
            Transfer {
                label: "firmware",
                src: fw_src,
                dest: Region::new(config.firmware_addr[1], fw_src.len),
            },
            Transfer {
                label: "filesystem",
                src: fs_src,
                dest: Region::new(config.fs_addr[1], fs_src.len),
            },
        ];

        for t in &transfers {
            ensure_aligned(t.src.start)?;
            ensure_aligned(t.dest.start)?;
            ensure_in_bounds(&*self.device, t.src.start, t.src.len)?;
            ensure_in_bounds(&*self.device, t.dest.start, t.dest.len)?;
        }

        // A destination must not clobber any source, nor the other destination
        let [fw, fs] = transfers;
        let clash = fw.dest.overlaps(&fw.src)
            || fw.dest.overlaps(&fs.src)
            || fs.dest.overlaps(&fw.src)
            || fs.dest.overlaps(&fs.src)
            || fw.dest.overlaps(&fs.dest);
        if clash {
            log::error!("slot 1 overlaps slot 0, refusing to mirror");
            return Err(LayoutError::Overlap.into());
        }

        Ok(transfers)
    }
}

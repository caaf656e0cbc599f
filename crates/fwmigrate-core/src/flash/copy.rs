//! Raw block copy between two flash ranges

#[cfg(feature = "alloc")]
use alloc::vec::Vec;

use crate::error::{Error, Result};
use crate::layout::{LayoutError, Region};

use super::device::{block_index, ensure_aligned, ensure_in_bounds, FlashDevice, ERASE_UNIT};

/// Progress callback for long running flash operations
///
/// All methods have empty default implementations.
pub trait Progress {
    /// Called once before the operation starts
    fn begin(&mut self, _label: &'static str, _total_bytes: Option<u64>) {}

    /// Called after every committed chunk with the running byte count
    fn advance(&mut self, _done_bytes: u64) {}

    /// Called once when the operation is complete
    fn finish(&mut self) {}
}

/// No-op progress reporter
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// Statistics from a copy operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Number of destination blocks erased
    pub blocks_erased: u32,
    /// Number of bytes copied
    pub bytes_copied: u32,
}

/// Copies flash ranges one erase unit at a time
///
/// For every erase unit of the destination the copier erases the block, reads
/// the matching source chunk into its scratch buffer and writes it back out.
/// The final chunk may be shorter than an erase unit.
///
/// Any erase, read or write failure aborts the copy immediately. Blocks that
/// were already copied stay copied, so a failed copy leaves the destination
/// partially written and the caller must treat it as fatal.
pub struct BlockCopier<'d, D: FlashDevice + ?Sized> {
    device: &'d mut D,
}

impl<'d, D: FlashDevice + ?Sized> BlockCopier<'d, D> {
    /// Create a copier operating on `device`
    pub fn new(device: &'d mut D) -> Self {
        Self { device }
    }

    /// Get mutable access to the underlying device
    pub fn device_mut(&mut self) -> &mut D {
        self.device
    }

    /// Copy `len` bytes from `src` to `dest`
    ///
    /// Both addresses must be erase-unit aligned. The scratch buffer is
    /// allocated for the duration of the call.
    #[cfg(feature = "alloc")]
    pub fn copy(&mut self, src: u32, dest: u32, len: u32) -> Result<CopyStats> {
        self.copy_with_progress(src, dest, len, &mut NoProgress)
    }

    /// Copy `len` bytes from `src` to `dest`, reporting progress
    #[cfg(feature = "alloc")]
    pub fn copy_with_progress<P: Progress + ?Sized>(
        &mut self,
        src: u32,
        dest: u32,
        len: u32,
        progress: &mut P,
    ) -> Result<CopyStats> {
        let mut scratch = scratch_buffer(ERASE_UNIT as usize)?;
        self.copy_with_buffer(src, dest, len, &mut scratch, progress)
    }

    /// Copy using a caller-provided scratch buffer of at least one erase unit
    pub fn copy_with_buffer<P: Progress + ?Sized>(
        &mut self,
        src: u32,
        dest: u32,
        len: u32,
        scratch: &mut [u8],
        progress: &mut P,
    ) -> Result<CopyStats> {
        log::debug!(
            "block_copy start: cp {} bytes from 0x{:08X} to 0x{:08X}",
            len,
            src,
            dest
        );

        ensure_aligned(src)?;
        ensure_aligned(dest)?;
        if scratch.len() < ERASE_UNIT as usize {
            return Err(Error::ResourceExhausted);
        }
        ensure_in_bounds(&*self.device, src, len)?;
        ensure_in_bounds(&*self.device, dest, len)?;
        check_copy_direction(src, dest, len)?;

        let mut stats = CopyStats::default();
        progress.begin("Copying", Some(len as u64));

        let mut offset = 0u32;
        while offset < len {
            let chunk = core::cmp::min(ERASE_UNIT, len - offset);
            let buf = &mut scratch[..chunk as usize];

            self.device.erase_block(block_index(dest + offset))?;
            stats.blocks_erased += 1;

            self.device.read(src + offset, buf)?;
            self.device.write(dest + offset, buf)?;

            offset += chunk;
            stats.bytes_copied = offset;
            progress.advance(offset as u64);
        }

        progress.finish();
        log::debug!("block_copy done ({} blocks)", stats.blocks_erased);
        Ok(stats)
    }

    /// Compare `len` bytes at `dest` against `src`
    ///
    /// Returns `VerifyMismatch` with the destination address of the first
    /// differing byte.
    #[cfg(feature = "alloc")]
    pub fn verify(&mut self, src: u32, dest: u32, len: u32) -> Result<()> {
        let mut want = scratch_buffer(ERASE_UNIT as usize)?;
        let mut have = scratch_buffer(ERASE_UNIT as usize)?;

        let mut offset = 0u32;
        while offset < len {
            let chunk = core::cmp::min(ERASE_UNIT, len - offset) as usize;
            self.device.read(src + offset, &mut want[..chunk])?;
            self.device.read(dest + offset, &mut have[..chunk])?;

            if let Some(pos) = want[..chunk]
                .iter()
                .zip(have[..chunk].iter())
                .position(|(w, h)| w != h)
            {
                let addr = dest + offset + pos as u32;
                log::error!("verify failed at 0x{:08X}", addr);
                return Err(Error::VerifyMismatch { addr });
            }

            offset += chunk as u32;
        }

        Ok(())
    }
}

/// A forward block copy is only safe when the destination does not start
/// inside the not-yet-read part of the source.
fn check_copy_direction(src: u32, dest: u32, len: u32) -> Result<()> {
    if len == 0 {
        return Ok(());
    }
    let src_region = Region::new(src, len);
    let dest_region = Region::new(dest, len);
    if dest >= src && src_region.overlaps(&dest_region) {
        return Err(LayoutError::Overlap.into());
    }
    Ok(())
}

#[cfg(feature = "alloc")]
fn scratch_buffer(len: usize) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len)
        .map_err(|_| Error::ResourceExhausted)?;
    buf.resize(len, 0);
    Ok(buf)
}

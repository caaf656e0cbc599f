//! Flash device trait
//!
//! This module provides the `FlashDevice` trait that abstracts the raw flash
//! primitives of the target: block erase, read and write. Every call is
//! synchronous and runs to completion or failure; the engine never issues two
//! operations concurrently.

use crate::error::{Error, FlashIoFailure, Result};

/// Size of one erase unit in bytes
///
/// Erase and write operations must start on a multiple of this size.
pub const ERASE_UNIT: u32 = 4096;

/// The erased value for flash memory (all bits set)
pub const ERASED_VALUE: u8 = 0xFF;

/// Raw flash primitives consumed by the engine
///
/// Implementations are block addressed for erase and byte addressed for read
/// and write. Any error returned is treated as fatal by the caller.
///
/// # Example
///
/// ```ignore
/// use fwmigrate_core::flash::{FlashDevice, ERASE_UNIT};
///
/// fn read_first_block<D: FlashDevice>(device: &mut D) -> Result<[u8; 4096]> {
///     let mut buf = [0u8; ERASE_UNIT as usize];
///     device.read(0, &mut buf)?;
///     Ok(buf)
/// }
/// ```
pub trait FlashDevice {
    /// Get the total flash size in bytes
    fn size(&self) -> u32;

    /// Erase one erase unit
    ///
    /// # Arguments
    /// * `block` - Index of the erase unit (`addr / ERASE_UNIT`)
    fn erase_block(&mut self, block: u32) -> Result<()>;

    /// Read flash contents into the provided buffer
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()>;

    /// Write data to flash
    ///
    /// `addr` must be erase-unit aligned and the target must have been erased.
    /// `data` may be shorter than one erase unit.
    fn write(&mut self, addr: u32, data: &[u8]) -> Result<()>;

    /// Check if a range is valid for this device
    fn is_valid_range(&self, addr: u32, len: usize) -> bool {
        // Use u64 arithmetic to avoid truncation when len > u32::MAX
        let end = addr as u64 + len as u64;
        end <= self.size() as u64
    }
}

impl<D: FlashDevice + ?Sized> FlashDevice for &mut D {
    fn size(&self) -> u32 {
        (**self).size()
    }

    fn erase_block(&mut self, block: u32) -> Result<()> {
        (**self).erase_block(block)
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        (**self).read(addr, buf)
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        (**self).write(addr, data)
    }
}

/// Check whether an address sits on an erase-unit boundary
#[inline]
pub fn is_aligned(addr: u32) -> bool {
    addr.is_multiple_of(ERASE_UNIT)
}

/// Fail with `AlignmentViolation` unless `addr` is erase-unit aligned
pub fn ensure_aligned(addr: u32) -> Result<()> {
    if is_aligned(addr) {
        Ok(())
    } else {
        Err(Error::AlignmentViolation { addr })
    }
}

/// Index of the erase unit containing `addr`
#[inline]
pub fn block_index(addr: u32) -> u32 {
    addr / ERASE_UNIT
}

/// Start address of erase unit `block`
#[inline]
pub fn block_addr(block: u32) -> u32 {
    block * ERASE_UNIT
}

/// Fail with an out-of-bounds flash error unless the range fits the device
pub fn ensure_in_bounds<D: FlashDevice + ?Sized>(device: &D, addr: u32, len: u32) -> Result<()> {
    if device.is_valid_range(addr, len as usize) {
        Ok(())
    } else {
        Err(Error::FlashIo(FlashIoFailure::OutOfBounds { addr, len }))
    }
}

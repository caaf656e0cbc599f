//! Layout types
//!
//! Core types for flash ranges that work in no_std environments.

use core::fmt;

use crate::flash::{block_index, is_aligned, ERASE_UNIT};

/// A contiguous range of the flash address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    /// Start address (inclusive)
    pub start: u32,
    /// Length in bytes
    pub len: u32,
}

impl Region {
    /// Create a new region
    pub const fn new(start: u32, len: u32) -> Self {
        Self { start, len }
    }

    /// End address (exclusive), computed without overflow
    pub fn end(&self) -> u64 {
        self.start as u64 + self.len as u64
    }

    /// Check if this region has no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if an address is within this region
    pub fn contains(&self, addr: u32) -> bool {
        addr >= self.start && (addr as u64) < self.end()
    }

    /// Check if this region overlaps with another
    ///
    /// Empty regions never overlap anything.
    pub fn overlaps(&self, other: &Region) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        (self.start as u64) < other.end() && (other.start as u64) < self.end()
    }

    /// Check if the region starts on an erase-unit boundary
    pub fn is_aligned(&self) -> bool {
        is_aligned(self.start)
    }

    /// Number of erase units touched by this region
    pub fn block_count(&self) -> u32 {
        if self.is_empty() {
            return 0;
        }
        let last = ((self.end() - 1) / ERASE_UNIT as u64) as u32;
        last - block_index(self.start) + 1
    }

    /// Index of the last erase unit touched by this region
    ///
    /// Returns `None` for an empty region.
    pub fn last_block(&self) -> Option<u32> {
        if self.is_empty() {
            None
        } else {
            Some(((self.end() - 1) / ERASE_UNIT as u64) as u32)
        }
    }

    /// The same region grown to whole erase units
    pub fn erase_extent(&self) -> Region {
        Region::new(self.start, self.block_count() * ERASE_UNIT)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:08X} - 0x{:08X} ({} bytes)",
            self.start,
            self.end(),
            self.len
        )
    }
}

/// Errors that can occur when validating a layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutError {
    /// Two ranges that must be disjoint overlap
    Overlap,
    /// A range extends beyond the flash device
    OutOfBounds,
    /// The boot-configuration block does not lie inside the staged image
    BootConfigOutsideImage,
    /// A region that must hold data is empty
    EmptyRegion,
}

impl fmt::Display for LayoutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overlap => write!(f, "overlapping flash regions"),
            Self::OutOfBounds => write!(f, "region extends beyond flash size"),
            Self::BootConfigOutsideImage => {
                write!(f, "boot-config block lies outside the staged image")
            }
            Self::EmptyRegion => write!(f, "region is empty"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for LayoutError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_contains() {
        let r = Region::new(0x1000, 0x1000);
        assert!(r.contains(0x1000));
        assert!(r.contains(0x1FFF));
        assert!(!r.contains(0x2000));
        assert!(!r.contains(0x0FFF));
    }

    #[test]
    fn test_region_overlaps() {
        let a = Region::new(0x0000, 0x2000);
        let b = Region::new(0x1000, 0x2000);
        let c = Region::new(0x2000, 0x1000);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c));
        assert!(!Region::new(0x1000, 0).overlaps(&a));
    }

    #[test]
    fn test_region_blocks() {
        assert_eq!(Region::new(0, 0).block_count(), 0);
        assert_eq!(Region::new(0, 1).block_count(), 1);
        assert_eq!(Region::new(0, 4096).block_count(), 1);
        assert_eq!(Region::new(0, 4097).block_count(), 2);
        assert_eq!(Region::new(0x3000, 4097).last_block(), Some(4));
        assert_eq!(Region::new(0x3000, 10).erase_extent(), Region::new(0x3000, 4096));
    }

    #[test]
    fn test_region_end_does_not_overflow() {
        let r = Region::new(u32::MAX - 1, 16);
        assert_eq!(r.end(), u32::MAX as u64 + 15);
    }
}

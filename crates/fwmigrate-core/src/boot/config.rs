//! Boot configuration record and its binary encoding
//!
//! The record is laid out little-endian:
//!
//! | offset | size | field                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 1    | magic (`0xE1`)                         |
//! | 1      | 1    | version                                |
//! | 2      | 1    | current slot                           |
//! | 3      | 1    | previous slot                          |
//! | 4      | 1    | flags                                  |
//! | 5      | 3    | reserved                               |
//! | 8      | 8    | firmware base address, slot 0 and 1    |
//! | 16     | 8    | firmware size, slot 0 and 1            |
//! | 24     | 8    | filesystem base address, slot 0 and 1  |
//! | 32     | 8    | filesystem size, slot 0 and 1          |
//! | 40     | 1    | checksum                               |

use core::fmt;

use bitflags::bitflags;

use crate::layout::Region;

/// Number of firmware slots
pub const SLOT_COUNT: usize = 2;

/// Record magic byte
const MAGIC: u8 = 0xE1;

/// Current record version
const VERSION: u8 = 0x01;

/// Seed for the XOR checksum
const CHECKSUM_INIT: u8 = 0xEF;

const FIELDS_OFFSET: usize = 8;
const CHECKSUM_OFFSET: usize = 40;

bitflags! {
    /// Flag byte of the encoded record
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BootFlags: u8 {
        /// A new firmware was installed and has not been confirmed yet
        const FIRMWARE_UPDATED = 1 << 0;
        /// The next boot is the first one from the current slot
        const FIRST_BOOT = 1 << 1;
    }
}

/// Errors that can occur when loading or committing a boot configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootConfigError {
    /// Record is shorter than `BootConfig::RECORD_LEN`
    Truncated,
    /// Magic byte mismatch
    BadMagic(u8),
    /// Record version not understood
    UnsupportedVersion(u8),
    /// Checksum mismatch
    BadChecksum,
    /// A slot index is out of range
    InvalidSlot(u8),
    /// The backing store could not be read
    LoadFailed,
    /// The backing store refused the new record
    CommitFailed,
}

impl fmt::Display for BootConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "boot config record truncated"),
            Self::BadMagic(m) => write!(f, "boot config has bad magic 0x{:02X}", m),
            Self::UnsupportedVersion(v) => write!(f, "unsupported boot config version {}", v),
            Self::BadChecksum => write!(f, "boot config checksum mismatch"),
            Self::InvalidSlot(s) => write!(f, "invalid slot index {}", s),
            Self::LoadFailed => write!(f, "failed to load boot config"),
            Self::CommitFailed => write!(f, "failed to commit boot config"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for BootConfigError {}

/// Slot pointers and flags consumed by the bootloader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BootConfig {
    /// Slot the bootloader starts
    pub current_slot: u8,
    /// Slot that was active before the last switch
    pub previous_slot: u8,
    /// Firmware base address per slot
    pub firmware_addr: [u32; SLOT_COUNT],
    /// Firmware size per slot
    pub firmware_size: [u32; SLOT_COUNT],
    /// Filesystem base address per slot
    pub fs_addr: [u32; SLOT_COUNT],
    /// Filesystem size per slot
    pub fs_size: [u32; SLOT_COUNT],
    /// A new firmware was installed
    pub firmware_updated: bool,
    /// The next boot is the first one from the current slot
    pub first_boot: bool,
}

impl BootConfig {
    /// Length of the encoded record
    pub const RECORD_LEN: usize = 41;

    /// Check that both slot indices name an existing slot
    pub fn validate(&self) -> Result<(), BootConfigError> {
        for slot in [self.current_slot, self.previous_slot] {
            if slot as usize >= SLOT_COUNT {
                return Err(BootConfigError::InvalidSlot(slot));
            }
        }
        Ok(())
    }

    /// Firmware region of `slot`
    pub fn firmware_region(&self, slot: u8) -> Result<Region, BootConfigError> {
        let i = slot_index(slot)?;
        Ok(Region::new(self.firmware_addr[i], self.firmware_size[i]))
    }

    /// Filesystem region of `slot`
    pub fn fs_region(&self, slot: u8) -> Result<Region, BootConfigError> {
        let i = slot_index(slot)?;
        Ok(Region::new(self.fs_addr[i], self.fs_size[i]))
    }

    /// Firmware region of the slot the device is executing from
    pub fn active_firmware(&self) -> Result<Region, BootConfigError> {
        self.firmware_region(self.current_slot)
    }

    /// Point the bootloader at slot 1 after slot 0 has been mirrored into it
    pub fn switch_to_mirror(&mut self) {
        self.current_slot = 1;
        self.previous_slot = 0;
        self.firmware_updated = true;
        self.first_boot = true;
    }

    fn flags(&self) -> BootFlags {
        let mut flags = BootFlags::empty();
        flags.set(BootFlags::FIRMWARE_UPDATED, self.firmware_updated);
        flags.set(BootFlags::FIRST_BOOT, self.first_boot);
        flags
    }

    /// Encode into the fixed-size binary record
    pub fn encode(&self) -> [u8; Self::RECORD_LEN] {
        let mut out = [0u8; Self::RECORD_LEN];
        out[0] = MAGIC;
        out[1] = VERSION;
        out[2] = self.current_slot;
        out[3] = self.previous_slot;
        out[4] = self.flags().bits();

        let words = self
            .firmware_addr
            .iter()
            .chain(self.firmware_size.iter())
            .chain(self.fs_addr.iter())
            .chain(self.fs_size.iter());
        for (i, word) in words.enumerate() {
            let at = FIELDS_OFFSET + i * 4;
            out[at..at + 4].copy_from_slice(&word.to_le_bytes());
        }

        out[CHECKSUM_OFFSET] = checksum(&out[..CHECKSUM_OFFSET]);
        out
    }

    /// Decode a binary record
    pub fn decode(data: &[u8]) -> Result<Self, BootConfigError> {
        if data.len() < Self::RECORD_LEN {
            return Err(BootConfigError::Truncated);
        }
        if data[0] != MAGIC {
            return Err(BootConfigError::BadMagic(data[0]));
        }
        if data[1] != VERSION {
            return Err(BootConfigError::UnsupportedVersion(data[1]));
        }
        if checksum(&data[..CHECKSUM_OFFSET]) != data[CHECKSUM_OFFSET] {
            return Err(BootConfigError::BadChecksum);
        }

        let word = |i: usize| {
            let at = FIELDS_OFFSET + i * 4;
            u32::from_le_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
        };
        let flags = BootFlags::from_bits_truncate(data[4]);

        let config = Self {
            current_slot: data[2],
            previous_slot: data[3],
            firmware_addr: [word(0), word(1)],
            firmware_size: [word(2), word(3)],
            fs_addr: [word(4), word(5)],
            fs_size: [word(6), word(7)],
            firmware_updated: flags.contains(BootFlags::FIRMWARE_UPDATED),
            first_boot: flags.contains(BootFlags::FIRST_BOOT),
        };
        config.validate()?;
        Ok(config)
    }
}

fn slot_index(slot: u8) -> Result<usize, BootConfigError> {
    if (slot as usize) < SLOT_COUNT {
        Ok(slot as usize)
    } else {
        Err(BootConfigError::InvalidSlot(slot))
    }
}

fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(CHECKSUM_INIT, |acc, b| acc ^ b)
}

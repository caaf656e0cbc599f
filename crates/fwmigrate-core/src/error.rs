//! Error types for fwmigrate-core
//!
//! This module provides a no_std compatible error type shared by the block
//! copier, the streaming writer and the slot-swap orchestrator. Every variant
//! is fatal for the operation that produced it: nothing in the engine retries.

use core::fmt;

use crate::boot::BootConfigError;
use crate::layout::LayoutError;

/// Details about a failed flash primitive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashIoFailure {
    /// Erasing a block failed
    Erase {
        /// Index of the erase unit
        block: u32,
    },
    /// Reading a range failed
    Read {
        /// Start address of the read
        addr: u32,
        /// Number of bytes requested
        len: u32,
    },
    /// Writing a range failed
    Write {
        /// Start address of the write
        addr: u32,
        /// Number of bytes written
        len: u32,
    },
    /// The range lies outside the flash device
    OutOfBounds {
        /// Start address of the access
        addr: u32,
        /// Length of the access
        len: u32,
    },
}

/// Details about a failed transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// The server answered with a status other than 200 or 3xx
    Status(u16),
    /// A 3xx reply carried no `Location` header
    MissingLocation,
    /// The redirect target or the initial URL could not be used
    MalformedLocation,
    /// The redirect chain exceeded the configured number of hops
    TooManyRedirects,
    /// The connection closed before a 200 reply was recorded
    PrematureClose,
    /// Events arrived out of order (body before reply, second reply)
    UnexpectedEvent,
    /// No network event arrived within the read timeout
    Timeout,
    /// The connection could not be opened
    ConnectFailed,
    /// The transport failed while receiving
    Io,
}

/// Core error type - no_std compatible, Copy for efficiency
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An erase or write address is not a multiple of the erase unit
    AlignmentViolation {
        /// The offending address
        addr: u32,
    },
    /// A scratch buffer could not be allocated
    ResourceExhausted,
    /// A flash primitive failed
    FlashIo(FlashIoFailure),
    /// A write would reach into the firmware image that is currently executing
    OverwriteGuardTriggered {
        /// First address the write would have touched
        addr: u32,
        /// Base address of the executing image
        limit: u32,
    },
    /// The download could not be completed
    Transport(TransportFailure),
    /// The slot or staging layout is inconsistent
    Layout(LayoutError),
    /// The boot configuration could not be loaded or committed
    BootConfig(BootConfigError),
    /// Readback after a copy did not match the source
    VerifyMismatch {
        /// Destination address of the first mismatching byte
        addr: u32,
    },
}

impl From<LayoutError> for Error {
    fn from(e: LayoutError) -> Self {
        Self::Layout(e)
    }
}

impl From<BootConfigError> for Error {
    fn from(e: BootConfigError) -> Self {
        Self::BootConfig(e)
    }
}

impl From<TransportFailure> for Error {
    fn from(e: TransportFailure) -> Self {
        Self::Transport(e)
    }
}

impl fmt::Display for FlashIoFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Erase { block } => write!(f, "erase of block {} failed", block),
            Self::Read { addr, len } => {
                write!(f, "read of {} bytes at 0x{:08X} failed", len, addr)
            }
            Self::Write { addr, len } => {
                write!(f, "write of {} bytes at 0x{:08X} failed", len, addr)
            }
            Self::OutOfBounds { addr, len } => {
                write!(f, "{} bytes at 0x{:08X} lie outside the flash", len, addr)
            }
        }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "unexpected HTTP status {}", code),
            Self::MissingLocation => write!(f, "redirect without Location header"),
            Self::MalformedLocation => write!(f, "malformed redirect target"),
            Self::TooManyRedirects => write!(f, "too many redirects"),
            Self::PrematureClose => write!(f, "connection closed before a reply was received"),
            Self::UnexpectedEvent => write!(f, "unexpected transport event"),
            Self::Timeout => write!(f, "transfer timed out"),
            Self::ConnectFailed => write!(f, "connection failed"),
            Self::Io => write!(f, "transport I/O error"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlignmentViolation { addr } => {
                write!(f, "address 0x{:08X} is not erase-unit aligned", addr)
            }
            Self::ResourceExhausted => write!(f, "out of memory"),
            Self::FlashIo(failure) => write!(f, "flash I/O error: {}", failure),
            Self::OverwriteGuardTriggered { addr, limit } => write!(
                f,
                "write at 0x{:08X} would overwrite active program (starts at 0x{:08X})",
                addr, limit
            ),
            Self::Transport(failure) => write!(f, "transfer failed: {}", failure),
            Self::Layout(e) => write!(f, "{}", e),
            Self::BootConfig(e) => write!(f, "{}", e),
            Self::VerifyMismatch { addr } => write!(f, "verify failed at 0x{:08X}", addr),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

/// Result type alias using the core Error type
pub type Result<T> = core::result::Result<T, Error>;

//! fwmigrate-core - In-place firmware migration engine
//!
//! This crate moves firmware images around a dual-slot (A/B) flash device
//! using only erase-unit sized erase/write primitives. It is designed to be
//! `no_std` compatible so the same engine can run on the device itself.
//!
//! The engine is built from three pieces:
//!
//! - [`flash::BlockCopier`] - relocates one flash range to another, one
//!   erase unit at a time, through a bounded scratch buffer
//! - [`stream::StreamingFlashWriter`] - rebuffers arbitrarily sized network
//!   chunks into erase-unit blocks and commits them as soon as they fill
//! - [`swap::SlotSwapOrchestrator`] - mirrors a legacy slot into its twin and
//!   performs the self-overwrite maneuver that replaces the bootloader and
//!   boot-configuration blocks in place
//!
//! # Features
//!
//! - `alloc` - heap-allocated copy scratch buffer (enabled by default)
//! - `std` - `std::error::Error` impls and serde support for [`boot::BootConfig`]
//!
//! # Example
//!
//! ```ignore
//! use fwmigrate_core::swap::{OrchestratorOptions, SlotSwapOrchestrator};
//!
//! let mut orchestrator =
//!     SlotSwapOrchestrator::new(&mut flash, &mut store, &mut restart, OrchestratorOptions::default())?;
//! orchestrator.mirror_if_needed()?;
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

pub mod boot;
pub mod error;
pub mod flash;
pub mod layout;
pub mod stream;
pub mod swap;

#[cfg(test)]
mod mock;

pub use error::{Error, Result};

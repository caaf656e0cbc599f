//! Boot configuration
//!
//! The boot configuration records which slot the bootloader starts and where
//! each slot's firmware and filesystem live. It is loaded once, mutated in
//! memory by the orchestrator and committed back as a single record through a
//! [`BootConfigStore`].

mod config;
mod store;

pub use config::*;
pub use store::*;

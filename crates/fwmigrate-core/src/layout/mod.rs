//! Flash layout support
//!
//! This module describes ranges of the flat flash address space and the
//! [`OverwriteGuard`] that keeps writes away from the firmware image the
//! device is currently executing.

mod guard;
mod types;

pub use guard::*;
pub use types::*;

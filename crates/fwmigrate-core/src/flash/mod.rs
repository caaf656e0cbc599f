//! Flash access and raw block copying
//!
//! This module provides the [`FlashDevice`] trait the engine drives, the
//! erase-unit arithmetic shared by every component, and the
//! [`BlockCopier`] used to relocate one flash range onto another.

mod copy;
mod device;

pub use copy::*;
pub use device::*;

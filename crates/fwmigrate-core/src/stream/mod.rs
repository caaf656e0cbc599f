//! Streaming download into flash
//!
//! [`StreamingFlashWriter`] is the pure state machine, [`download`] drives it
//! from a [`Transport`] and follows redirects.

mod download;
mod transport;
mod writer;

pub use download::*;
pub use transport::*;
pub use writer::*;

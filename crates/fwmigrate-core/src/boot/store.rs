//! Boot configuration persistence

use super::{BootConfig, BootConfigError};

/// Persistent store for the boot configuration record
///
/// `commit` must be atomic: a reader never observes a half-written record,
/// only the previous or the new one.
pub trait BootConfigStore {
    /// Load the currently committed record
    fn load(&mut self) -> Result<BootConfig, BootConfigError>;

    /// Replace the committed record
    fn commit(&mut self, config: &BootConfig) -> Result<(), BootConfigError>;
}

impl<S: BootConfigStore + ?Sized> BootConfigStore for &mut S {
    fn load(&mut self) -> Result<BootConfig, BootConfigError> {
        (**self).load()
    }

    fn commit(&mut self, config: &BootConfig) -> Result<(), BootConfigError> {
        (**self).commit(config)
    }
}

/// A store that keeps the encoded record in RAM
///
/// Useful on targets where the record lives in a memory-mapped buffer that is
/// persisted elsewhere, and for tests. Each commit replaces the whole record.
#[derive(Debug, Clone)]
pub struct RamStore {
    record: [u8; BootConfig::RECORD_LEN],
    commits: u32,
}

impl RamStore {
    /// Create a store holding `config`
    pub fn new(config: &BootConfig) -> Self {
        Self {
            record: config.encode(),
            commits: 0,
        }
    }

    /// Number of successful commits since creation
    pub fn commits(&self) -> u32 {
        self.commits
    }

    /// The raw encoded record
    pub fn record(&self) -> &[u8; BootConfig::RECORD_LEN] {
        &self.record
    }
}

impl BootConfigStore for RamStore {
    fn load(&mut self) -> Result<BootConfig, BootConfigError> {
        BootConfig::decode(&self.record)
    }

    fn commit(&mut self, config: &BootConfig) -> Result<(), BootConfigError> {
        config.validate()?;
        self.record = config.encode();
        self.commits += 1;
        Ok(())
    }
}

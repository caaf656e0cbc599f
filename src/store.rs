//! File-backed boot configuration store
//!
//! The record is kept in its binary encoding. A commit writes the new record
//! to a temporary file next to the target and renames it over the old one, so
//! a reader only ever sees the previous or the new record.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use fwmigrate_core::boot::{BootConfig, BootConfigError, BootConfigStore};
use tempfile::NamedTempFile;

/// Boot configuration stored in a file
#[derive(Debug, Clone)]
pub struct FileBootConfigStore {
    path: PathBuf,
}

impl FileBootConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `config` atomically
    pub fn write(&self, config: &BootConfig) -> std::io::Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&config.encode())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }
}

impl BootConfigStore for FileBootConfigStore {
    fn load(&mut self) -> Result<BootConfig, BootConfigError> {
        let data = fs::read(&self.path).map_err(|e| {
            log::error!("cannot read {}: {}", self.path.display(), e);
            BootConfigError::LoadFailed
        })?;
        BootConfig::decode(&data)
    }

    fn commit(&mut self, config: &BootConfig) -> Result<(), BootConfigError> {
        config.validate()?;
        self.write(config).map_err(|e| {
            log::error!("cannot write {}: {}", self.path.display(), e);
            BootConfigError::CommitFailed
        })?;
        log::debug!("committed boot config to {}", self.path.display());
        Ok(())
    }
}

//! TOML configuration file
//!
//! All keys are optional; command-line flags take precedence over the file.
//! Addresses and sizes may be TOML integers or strings in hex (`"0x1000"`)
//! or decimal:
//!
//! ```toml
//! [flash]
//! image = "flash.bin"
//! size = "0x400000"
//!
//! [boot]
//! config_file = "rboot.cfg"
//! boot_config_addr = 0x1000
//!
//! [update]
//! url = "http://updates.example/fw/latest.bin"
//! staging_addr = "0x82000"
//! read_timeout_secs = 30
//! max_redirects = 5
//! restart_delay_ms = 20000
//! verify = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use fwmigrate_core::boot::BootConfig;
use serde::Deserialize;

use crate::error::{CliError, Result};

/// Size of a freshly created flash image
pub const DEFAULT_FLASH_SIZE: u32 = 4 * 1024 * 1024;

/// Offset of the boot-configuration block inside a bootable image
pub const DEFAULT_BOOT_CONFIG_ADDR: u32 = 0x1000;

/// Read timeout of the HTTP transport
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Top-level config file structure
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub flash: FlashSection,
    pub boot: BootSection,
    pub update: UpdateSection,
}

/// `[flash]` section
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FlashSection {
    /// Raw flash image the engine operates on
    pub image: Option<PathBuf>,
    /// Size of the flash image: `init` creates images of this size and the
    /// other commands refuse to open an image of any other size
    #[serde(deserialize_with = "deserialize_opt_hex_u32")]
    pub size: Option<u32>,
}

/// `[boot]` section
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BootSection {
    /// File holding the encoded boot configuration record
    pub config_file: Option<PathBuf>,
    /// Offset of the boot-configuration block inside an update image
    #[serde(deserialize_with = "deserialize_opt_hex_u32")]
    pub boot_config_addr: Option<u32>,
    /// Boot configuration written by `init`
    pub initial: Option<BootConfig>,
}

/// `[update]` section
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateSection {
    /// Where to download the new image from
    pub url: Option<String>,
    /// Flash address the download is staged at
    #[serde(deserialize_with = "deserialize_opt_hex_u32")]
    pub staging_addr: Option<u32>,
    /// Base of the running image, defaults to the current slot's firmware
    #[serde(deserialize_with = "deserialize_opt_hex_u32")]
    pub active_base: Option<u32>,
    /// Where the staged image is moved to
    #[serde(deserialize_with = "deserialize_opt_hex_u32")]
    pub final_base: Option<u32>,
    pub read_timeout_secs: Option<u64>,
    pub max_redirects: Option<u8>,
    pub restart_delay_ms: Option<u32>,
    pub verify: Option<bool>,
}

impl Config {
    /// Load the config file, or an empty config if no path was given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = fs::read_to_string(path).map_err(|source| CliError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&content).map_err(|source| CliError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Parse a config from a TOML string
    pub fn from_toml_str(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Flash image path, command line first
    pub fn image(&self, cli: Option<&Path>) -> Result<PathBuf> {
        cli.map(Path::to_path_buf)
            .or_else(|| self.flash.image.clone())
            .ok_or(CliError::MissingSetting("flash image (--image or [flash] image)"))
    }

    /// Boot configuration file path, command line first
    pub fn boot_config_file(&self, cli: Option<&Path>) -> Result<PathBuf> {
        cli.map(Path::to_path_buf)
            .or_else(|| self.boot.config_file.clone())
            .ok_or(CliError::MissingSetting(
                "boot config file (--boot-config or [boot] config_file)",
            ))
    }
}

/// Deserialize an optional u32 that can be hex (0x...) or decimal
fn deserialize_opt_hex_u32<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    // Try to deserialize as a number first, then as a string
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum HexOrInt {
        Int(u32),
        Str(String),
    }

    match HexOrInt::deserialize(deserializer)? {
        HexOrInt::Int(n) => Ok(Some(n)),
        HexOrInt::Str(s) => parse_number(&s).map(Some).map_err(serde::de::Error::custom),
    }
}

/// Parse a number that can be hex (0x...) or decimal
pub fn parse_number(s: &str) -> std::result::Result<u32, String> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("invalid hex: {}", e))
    } else {
        s.parse().map_err(|e| format!("invalid number: {}", e))
    }
}

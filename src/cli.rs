//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parse a string as a hex or decimal u32
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u32>().map_err(|e| format!("Invalid number: {}", e))
    }
}

#[derive(Parser)]
#[command(name = "fwmigrate")]
#[command(author, version, about = "In-place A/B firmware migration", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (TOML format)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Flash image and boot configuration shared across commands
#[derive(clap::Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Raw flash image file
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Boot configuration record file
    #[arg(short, long)]
    pub boot_config: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct MirrorArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Read back both regions before switching slots
    #[arg(long)]
    pub verify: bool,

    /// Restart delay in milliseconds
    #[arg(long)]
    pub restart_delay: Option<u32>,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct UpdateArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// URL of the new image
    #[arg(short, long)]
    pub url: Option<String>,

    /// Flash address the download is staged at (hex or decimal)
    #[arg(long, value_parser = parse_hex_u32)]
    pub staging_addr: Option<u32>,

    /// Base of the running image (default: current slot's firmware)
    #[arg(long, value_parser = parse_hex_u32)]
    pub active_base: Option<u32>,

    /// Where the new image ends up (default: 0)
    #[arg(long, value_parser = parse_hex_u32)]
    pub final_base: Option<u32>,

    /// Offset of the boot-configuration block inside the image
    #[arg(long, value_parser = parse_hex_u32)]
    pub boot_config_addr: Option<u32>,

    /// Give up when no data arrives for this many seconds
    #[arg(long)]
    pub read_timeout: Option<u64>,

    /// Maximum number of redirects to follow
    #[arg(long)]
    pub max_redirects: Option<u8>,

    /// Restart delay in milliseconds
    #[arg(long)]
    pub restart_delay: Option<u32>,

    /// Read back the final image before restarting
    #[arg(long)]
    pub verify: bool,
}

#[derive(clap::Args, Debug, Clone)]
pub struct CopyArgs {
    /// Raw flash image file
    #[arg(short, long)]
    pub image: Option<PathBuf>,

    /// Source address (hex or decimal, erase-unit aligned)
    #[arg(long, value_parser = parse_hex_u32)]
    pub src: u32,

    /// Destination address (hex or decimal, erase-unit aligned)
    #[arg(long, value_parser = parse_hex_u32)]
    pub dest: u32,

    /// Number of bytes to copy (hex or decimal)
    #[arg(long, value_parser = parse_hex_u32)]
    pub len: u32,

    /// Compare source and destination afterwards
    #[arg(long)]
    pub verify: bool,
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct InitArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Flash size in bytes (hex or decimal)
    #[arg(long, value_parser = parse_hex_u32)]
    pub size: Option<u32>,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Mirror slot 0 into slot 1 if the device still runs from slot 0
    Mirror(MirrorArgs),

    /// Download a new image and move it over the bootloader region
    Update(UpdateArgs),

    /// Copy a flash range one erase unit at a time
    Copy(CopyArgs),

    /// Show the boot configuration and slot layout
    Status(TargetArgs),

    /// Create an erased flash image and a boot configuration record
    Init(InitArgs),
}

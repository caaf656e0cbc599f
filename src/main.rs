//! fwmigrate - In-place A/B firmware migration
//!
//! Drives the `fwmigrate-core` engine against a raw flash image file:
//!
//! - **mirror** - copy slot 0 into slot 1 and switch the boot configuration
//! - **update** - download a new image over HTTP into a staging area, then
//!   move it over the bootloader region with the self-overwrite maneuver
//! - **copy** - relocate a flash range one erase unit at a time
//! - **status** / **init** - inspect or create the image and boot record
//!
//! Settings come from the command line first, then the TOML config file.

mod cli;
mod commands;
mod config;
mod error;
mod restart;
mod store;
mod transport;

use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when `-c` is not given
const DEFAULT_CONFIG_FILE: &str = "fwmigrate.toml";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    let config = match Config::load(config_path(cli.config.as_deref()).as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Mirror(args) => {
            commands::mirror::run_mirror(&config, &args)?;
        }
        Commands::Update(args) => {
            commands::update::run_update(&config, &args)?;
        }
        Commands::Copy(args) => {
            commands::copy::run_copy(&config, &args)?;
        }
        Commands::Status(args) => {
            commands::status::run_status(&config, &args)?;
        }
        Commands::Init(args) => {
            commands::init::run_init(&config, &args)?;
        }
    }

    Ok(())
}

/// The config file named on the command line, or the default one if present
fn config_path(cli: Option<&Path>) -> Option<PathBuf> {
    match cli {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default.is_file() {
                log::debug!("using {}", default.display());
                Some(default)
            } else {
                None
            }
        }
    }
}

//! Update command implementation
//!
//! Downloads a new image into the staging area and moves it over the
//! bootloader region with the self-overwrite maneuver.

use std::time::Duration;

use fwmigrate_core::layout::OverwriteGuard;
use fwmigrate_core::stream::{download, DownloadOptions, TransferSummary, DEFAULT_MAX_REDIRECTS};
use fwmigrate_core::swap::{
    OrchestratorOptions, OverwritePlan, SlotSwapOrchestrator, RESTART_DELAY_MS,
};

use super::{open_image, save_image, IndicatifProgress};
use crate::cli::UpdateArgs;
use crate::config::{Config, DEFAULT_BOOT_CONFIG_ADDR, DEFAULT_READ_TIMEOUT_SECS};
use crate::error::{CliError, Result};
use crate::restart::LogRestart;
use crate::store::FileBootConfigStore;
use crate::transport::HttpTransport;

/// Update settings after merging the command line, config file and defaults
#[derive(Debug, Clone, PartialEq, Eq)]
struct UpdateSettings {
    url: String,
    staging_addr: u32,
    /// `None` means the current slot's firmware base
    active_base: Option<u32>,
    final_base: u32,
    boot_config_addr: u32,
    read_timeout: Duration,
    max_redirects: u8,
    options: OrchestratorOptions,
}

impl UpdateSettings {
    fn resolve(config: &Config, args: &UpdateArgs) -> Result<Self> {
        let url = args
            .url
            .clone()
            .or_else(|| config.update.url.clone())
            .ok_or(CliError::MissingSetting("update URL (--url or [update] url)"))?;
        let staging_addr = args
            .staging_addr
            .or(config.update.staging_addr)
            .ok_or(CliError::MissingSetting(
                "staging address (--staging-addr or [update] staging_addr)",
            ))?;
        let read_timeout = args
            .read_timeout
            .or(config.update.read_timeout_secs)
            .unwrap_or(DEFAULT_READ_TIMEOUT_SECS);
        if read_timeout == 0 {
            return Err(CliError::InvalidSetting {
                name: "read_timeout",
                message: "must be at least one second".into(),
            });
        }

        Ok(Self {
            url,
            staging_addr,
            active_base: args.active_base.or(config.update.active_base),
            final_base: args.final_base.or(config.update.final_base).unwrap_or(0),
            boot_config_addr: args
                .boot_config_addr
                .or(config.boot.boot_config_addr)
                .unwrap_or(DEFAULT_BOOT_CONFIG_ADDR),
            read_timeout: Duration::from_secs(read_timeout),
            max_redirects: args
                .max_redirects
                .or(config.update.max_redirects)
                .unwrap_or(DEFAULT_MAX_REDIRECTS),
            options: OrchestratorOptions {
                restart_delay_ms: args
                    .restart_delay
                    .or(config.update.restart_delay_ms)
                    .unwrap_or(RESTART_DELAY_MS),
                verify: args.verify || config.update.verify.unwrap_or(false),
            },
        })
    }
}

/// Run the update command
pub fn run_update(config: &Config, args: &UpdateArgs) -> Result<OverwritePlan> {
    let settings = UpdateSettings::resolve(config, args)?;
    let image = config.image(args.target.image.as_deref())?;
    let store =
        FileBootConfigStore::new(config.boot_config_file(args.target.boot_config.as_deref())?);
    let transport = HttpTransport::new(settings.read_timeout)?;

    let mut flash = open_image(config, &image)?;
    let mut restart = LogRestart::default();
    let mut progress = IndicatifProgress::new();

    let outcome: Result<(TransferSummary, OverwritePlan)> =
        SlotSwapOrchestrator::new(&mut flash, store, &mut restart, settings.options)
            .and_then(|mut orchestrator| {
                let active_base = match settings.active_base {
                    Some(base) => base,
                    None => orchestrator.boot_config().active_firmware()?.start,
                };
                let guard = OverwriteGuard::new(active_base);
                let download_options = DownloadOptions {
                    dest_base: settings.staging_addr,
                    guard,
                    max_redirects: settings.max_redirects,
                };

                let summary = download(
                    orchestrator.device_mut(),
                    transport,
                    &settings.url,
                    &download_options,
                    &mut progress,
                )?;
                log::info!(
                    "staged {} bytes in {} blocks at {}",
                    summary.bytes_received,
                    summary.blocks_written,
                    summary.region()
                );

                let plan = OverwritePlan::from_transfer(
                    &summary,
                    settings.final_base,
                    settings.boot_config_addr,
                    guard,
                )?;
                orchestrator.self_overwrite_with_progress(&plan, &mut progress)?;
                Ok((summary, plan))
            })
            .map_err(Into::into);

    let (summary, plan) = save_image(&flash, &image, outcome)?;
    println!(
        "Downloaded {} bytes from {}",
        summary.bytes_received, settings.url
    );
    println!("Installed image at {}", plan.target());
    if let Some(delay) = restart.scheduled() {
        println!("Restart scheduled in {} ms", delay);
    }
    Ok(plan)
}

//! Download driver: pumps transport events into a [`StreamingFlashWriter`]

use crate::error::{Error, Result, TransportFailure};
use crate::flash::{FlashDevice, Progress};
use crate::layout::OverwriteGuard;

use super::transport::{parse_url, resolve_location, Transport, Url};
use super::writer::{Step, StreamingFlashWriter, TransferSummary, WriterState};

/// Redirect hops followed before giving up
pub const DEFAULT_MAX_REDIRECTS: u8 = 5;

/// Parameters of a download
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Erase-unit aligned flash address the payload is written to
    pub dest_base: u32,
    /// Guard protecting the running image
    pub guard: OverwriteGuard,
    /// Maximum number of redirects to follow
    pub max_redirects: u8,
}

impl DownloadOptions {
    /// Options for a download into `dest_base` below an image at `active_base`
    pub fn new(dest_base: u32, active_base: u32) -> Self {
        Self {
            dest_base,
            guard: OverwriteGuard::new(active_base),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}

/// Download `url` into flash
///
/// Every 3xx reply closes the current connection and reconnects to the
/// resolved `Location` with a fresh transfer state. Nothing is written to
/// flash until a 200 reply has been received. The connection is always closed
/// before returning.
pub fn download<D, T, P>(
    device: &mut D,
    mut transport: T,
    url: &str,
    options: &DownloadOptions,
    progress: &mut P,
) -> Result<TransferSummary>
where
    D: FlashDevice + ?Sized,
    T: Transport,
    P: Progress + ?Sized,
{
    let mut url = parse_url(url)?;
    let mut writer = StreamingFlashWriter::new(device, options.dest_base, options.guard)?;

    log::info!("downloading {} to 0x{:08X}", url, options.dest_base);

    if let Err(e) = pump(&mut writer, &mut transport, &mut url, options, progress) {
        writer.fail(e);
    }
    transport.close();

    let outcome = writer.outcome();
    if outcome.is_ok() {
        progress.finish();
    }
    outcome
}

fn pump<D, T, P>(
    writer: &mut StreamingFlashWriter<'_, D>,
    transport: &mut T,
    url: &mut Url,
    options: &DownloadOptions,
    progress: &mut P,
) -> Result<()>
where
    D: FlashDevice + ?Sized,
    T: Transport,
    P: Progress + ?Sized,
{
    let mut hops = 0u8;
    let mut started = false;

    transport.connect(url)?;

    loop {
        let event = transport.next_event().map_err(Error::from)?;
        match writer.on_event(event) {
            Step::Continue => {
                if !started && writer.state() == WriterState::Receiving {
                    progress.begin("Downloading", writer.expected_len().map(u64::from));
                    started = true;
                }
                progress.advance(writer.bytes_received() as u64);
            }
            Step::Redirect(location) => {
                transport.close();
                hops += 1;
                if hops > options.max_redirects {
                    log::error!("giving up after {} redirects", options.max_redirects);
                    return Err(TransportFailure::TooManyRedirects.into());
                }
                *url = resolve_location(url, &location)?;
                log::debug!("following redirect {} to {}", hops, url);
                writer.restart();
                transport.connect(url)?;
            }
            Step::Finished => return Ok(()),
        }
    }
}

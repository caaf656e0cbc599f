//! Streaming flash writer
//!
//! Network chunk boundaries have nothing to do with erase-unit boundaries, so
//! the writer decouples "bytes arrived" from "bytes committed": incoming bytes
//! are appended to a single erase-unit sized buffer, and every time that
//! buffer fills up its block is erased and written in one go. The trailing
//! partial block is written when the transfer closes successfully.
//!
//! The writer is a state machine driven by [`TransportEvent`]s:
//!
//! ```text
//! Connecting --200--> Receiving --close--> FlushingFinal --> Done
//!     |                   |                      |
//!     +--3xx--> (redirect, fresh state)          +--------> Failed
//!     +--other/close/error---------------------------------> Failed
//! ```

use crate::error::{Error, FlashIoFailure, Result, TransportFailure};
use crate::flash::{ensure_aligned, FlashDevice, ERASE_UNIT};
use crate::layout::{OverwriteGuard, Region};

use super::transport::{TransportEvent, Url};

/// State of a [`StreamingFlashWriter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Waiting for the reply; no flash I/O yet
    Connecting,
    /// Reply 200 recorded, body chunks are being committed
    Receiving,
    /// Transport closed, trailing block being written
    FlushingFinal,
    /// All bytes are on flash
    Done,
    /// The transfer was aborted
    Failed(Error),
}

impl WriterState {
    /// Check for `Done` or `Failed`
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }
}

/// What the driver has to do after an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Wait for the next event
    Continue,
    /// Close this connection and reconnect to the given `Location`
    Redirect(Url),
    /// The writer reached a terminal state; close the connection
    Finished,
}

/// Result of a successful transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSummary {
    /// First flash address of the payload
    pub dest_base: u32,
    /// Payload length in bytes
    pub bytes_received: u32,
    /// Number of erase+write pairs issued
    pub blocks_written: u32,
}

impl TransferSummary {
    /// Flash range holding the payload
    pub fn region(&self) -> Region {
        Region::new(self.dest_base, self.bytes_received)
    }
}

/// The block currently being assembled
struct ChunkBuffer {
    data: [u8; ERASE_UNIT as usize],
}

/// Bookkeeping for one download attempt
struct TransferState {
    dest_base: u32,
    bytes_received: u32,
    current_block: u32,
    space_left: u32,
    expected_len: Option<u32>,
    blocks_written: u32,
}

impl TransferState {
    fn new(dest_base: u32) -> Self {
        Self {
            dest_base,
            bytes_received: 0,
            current_block: dest_base / ERASE_UNIT,
            space_left: ERASE_UNIT,
            expected_len: None,
            blocks_written: 0,
        }
    }

    /// Bytes of the buffer that hold payload
    fn filled(&self) -> usize {
        (ERASE_UNIT - self.space_left) as usize
    }
}

/// Rebuffers a download into erase-unit blocks and commits them to flash
///
/// One writer owns exactly one [`ChunkBuffer`] and one transfer state for its
/// whole lifetime. Blocks are written strictly in ascending order and each
/// block is erased immediately before its single write.
pub struct StreamingFlashWriter<'d, D: FlashDevice + ?Sized> {
    device: &'d mut D,
    guard: OverwriteGuard,
    buffer: ChunkBuffer,
    transfer: TransferState,
    state: WriterState,
}

impl<'d, D: FlashDevice + ?Sized> StreamingFlashWriter<'d, D> {
    /// Create a writer that stages the payload at `dest_base`
    ///
    /// `dest_base` must be erase-unit aligned.
    pub fn new(device: &'d mut D, dest_base: u32, guard: OverwriteGuard) -> Result<Self> {
        ensure_aligned(dest_base)?;
        Ok(Self {
            device,
            guard,
            buffer: ChunkBuffer {
                data: [0; ERASE_UNIT as usize],
            },
            transfer: TransferState::new(dest_base),
            state: WriterState::Connecting,
        })
    }

    /// Current state
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Bytes accepted so far
    pub fn bytes_received(&self) -> u32 {
        self.transfer.bytes_received
    }

    /// Payload length announced by the reply, if any
    pub fn expected_len(&self) -> Option<u32> {
        self.transfer.expected_len
    }

    /// Start over with a fresh transfer state, e.g. after a redirect
    pub fn restart(&mut self) {
        self.transfer = TransferState::new(self.transfer.dest_base);
        self.state = WriterState::Connecting;
    }

    /// Abort the transfer with `error`
    ///
    /// Has no effect once the writer is in a terminal state.
    pub fn fail(&mut self, error: Error) {
        if self.state.is_terminal() {
            return;
        }
        log::error!(
            "transfer failed after {} bytes: {}",
            self.transfer.bytes_received,
            error
        );
        self.state = WriterState::Failed(error);
    }

    /// Outcome of a finished transfer
    pub fn outcome(&self) -> Result<TransferSummary> {
        match self.state {
            WriterState::Done => Ok(TransferSummary {
                dest_base: self.transfer.dest_base,
                bytes_received: self.transfer.bytes_received,
                blocks_written: self.transfer.blocks_written,
            }),
            WriterState::Failed(e) => Err(e),
            _ => Err(Error::Transport(TransportFailure::PrematureClose)),
        }
    }

    /// Feed one transport event through the state machine
    pub fn on_event(&mut self, event: TransportEvent<'_>) -> Step {
        if self.state.is_terminal() {
            return Step::Finished;
        }

        let result = match event {
            TransportEvent::Reply {
                status,
                location,
                content_length,
            } => self.on_reply(status, location, content_length),
            TransportEvent::Chunk(data) => self.on_chunk(data).map(|_| Step::Continue),
            TransportEvent::Close => self.on_close().map(|_| Step::Finished),
        };

        match result {
            Ok(step) => step,
            Err(e) => {
                self.fail(e);
                Step::Finished
            }
        }
    }

    fn on_reply(
        &mut self,
        status: u16,
        location: Option<&str>,
        content_length: Option<u32>,
    ) -> Result<Step> {
        if self.state != WriterState::Connecting {
            return Err(TransportFailure::UnexpectedEvent.into());
        }

        match status {
            200 => {
                // The very first block must already be writable
                self.guard.check(self.transfer.dest_base)?;
                self.transfer.expected_len = content_length;
                self.state = WriterState::Receiving;
                log::info!(
                    "receiving payload into 0x{:08X}{}",
                    self.transfer.dest_base,
                    if content_length.is_some() { "" } else { " (length unknown)" }
                );
                Ok(Step::Continue)
            }
            300..=399 => {
                let location = location.ok_or(TransportFailure::MissingLocation)?;
                let mut url = Url::new();
                url.push_str(location.trim())
                    .map_err(|_| TransportFailure::MalformedLocation)?;
                log::info!("HTTP {} redirect to {}", status, url);
                Ok(Step::Redirect(url))
            }
            other => Err(TransportFailure::Status(other).into()),
        }
    }

    fn on_chunk(&mut self, mut data: &[u8]) -> Result<()> {
        if self.state != WriterState::Receiving {
            return Err(TransportFailure::UnexpectedEvent.into());
        }

        while !data.is_empty() {
            let filled = self.transfer.filled();
            let take = core::cmp::min(data.len(), self.transfer.space_left as usize);

            self.buffer.data[filled..filled + take].copy_from_slice(&data[..take]);
            self.transfer.space_left -= take as u32;
            self.transfer.bytes_received = self
                .transfer
                .bytes_received
                .checked_add(take as u32)
                .ok_or(Error::FlashIo(FlashIoFailure::OutOfBounds {
                    addr: self.transfer.dest_base,
                    len: u32::MAX,
                }))?;
            data = &data[take..];

            if self.transfer.space_left == 0 {
                self.commit_full_block()?;
            }
        }

        Ok(())
    }

    /// Write the completed buffer to the current block and advance
    fn commit_full_block(&mut self) -> Result<()> {
        let block = self.transfer.current_block;
        let next = block + 1;

        // The write pointer must not walk into the running image
        let next_start = next.checked_mul(ERASE_UNIT).unwrap_or(u32::MAX);
        self.guard.check(next_start)?;

        self.device.erase_block(block)?;
        self.device.write(block * ERASE_UNIT, &self.buffer.data)?;
        log::debug!("flushed block {} (0x{:08X})", block, block * ERASE_UNIT);

        self.transfer.blocks_written += 1;
        self.transfer.current_block = next;
        self.transfer.space_left = ERASE_UNIT;
        Ok(())
    }

    fn on_close(&mut self) -> Result<()> {
        if self.state != WriterState::Receiving {
            return Err(TransportFailure::PrematureClose.into());
        }
        if let Some(expected) = self.transfer.expected_len {
            if expected != self.transfer.bytes_received {
                log::error!(
                    "connection closed after {} of {} bytes",
                    self.transfer.bytes_received,
                    expected
                );
                return Err(TransportFailure::PrematureClose.into());
            }
        }

        self.state = WriterState::FlushingFinal;
        self.flush_final()?;
        self.state = WriterState::Done;
        log::info!(
            "transfer complete: {} bytes in {} blocks",
            self.transfer.bytes_received,
            self.transfer.blocks_written
        );
        Ok(())
    }

    /// Write the valid prefix of a partially filled buffer
    fn flush_final(&mut self) -> Result<()> {
        let valid = self.transfer.filled();
        if valid == 0 {
            return Ok(());
        }

        let block = self.transfer.current_block;
        self.device.erase_block(block)?;
        self.device
            .write(block * ERASE_UNIT, &self.buffer.data[..valid])?;
        log::debug!("flushed final {} bytes to block {}", valid, block);

        self.transfer.blocks_written += 1;
        Ok(())
    }
}

//! Recording NOR flash mock shared by the unit tests

use std::vec;
use std::vec::Vec;

use crate::error::{Error, FlashIoFailure, Result};
use crate::flash::{is_aligned, FlashDevice, ERASED_VALUE, ERASE_UNIT};

/// A flash operation as seen by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashOp {
    /// Erase of a block index
    Erase(u32),
    /// Read of (address, length)
    Read(u32, u32),
    /// Write of (address, length)
    Write(u32, u32),
}

impl FlashOp {
    pub fn is_read(&self) -> bool {
        matches!(self, FlashOp::Read(..))
    }
}

/// A mock flash that simulates NOR behaviour for testing
///
/// - Memory starts as all 0xFF (erased state)
/// - Erase sets a block to 0xFF
/// - Write can only clear bits, so a write without a prior erase shows up
///   as corrupted data
/// - Erase and write addresses must be erase-unit aligned
/// - A single erase or write can be made to fail
pub struct MockFlash {
    memory: Vec<u8>,
    ops: Vec<FlashOp>,
    mutations: usize,
    fail_at: Option<usize>,
}

impl MockFlash {
    pub fn new(size: usize) -> Self {
        Self {
            memory: vec![ERASED_VALUE; size],
            ops: Vec::new(),
            mutations: 0,
            fail_at: None,
        }
    }

    /// Initialize memory with specific contents
    pub fn with_contents(size: usize, contents: &[(u32, &[u8])]) -> Self {
        let mut mock = Self::new(size);
        for (addr, data) in contents {
            let addr = *addr as usize;
            mock.memory[addr..addr + data.len()].copy_from_slice(data);
        }
        mock
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    pub fn ops(&self) -> Vec<FlashOp> {
        self.ops.clone()
    }

    /// Erase and write operations only
    pub fn mutations(&self) -> Vec<FlashOp> {
        self.ops.iter().copied().filter(|op| !op.is_read()).collect()
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Make the `n`th erase/write from now on (zero based) fail once
    pub fn fail_mutation(&mut self, n: usize) {
        self.fail_at = Some(self.mutations + n);
    }

    fn should_fail(&mut self) -> bool {
        let index = self.mutations;
        self.mutations += 1;
        if self.fail_at == Some(index) {
            self.fail_at = None;
            true
        } else {
            false
        }
    }
}

impl FlashDevice for MockFlash {
    fn size(&self) -> u32 {
        self.memory.len() as u32
    }

    fn erase_block(&mut self, block: u32) -> Result<()> {
        let start = (block * ERASE_UNIT) as usize;
        let end = start + ERASE_UNIT as usize;
        if end > self.memory.len() {
            return Err(Error::FlashIo(FlashIoFailure::OutOfBounds {
                addr: start as u32,
                len: ERASE_UNIT,
            }));
        }
        if self.should_fail() {
            return Err(Error::FlashIo(FlashIoFailure::Erase { block }));
        }
        self.ops.push(FlashOp::Erase(block));
        self.memory[start..end].fill(ERASED_VALUE);
        Ok(())
    }

    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        let start = addr as usize;
        if start + buf.len() > self.memory.len() {
            return Err(Error::FlashIo(FlashIoFailure::OutOfBounds {
                addr,
                len: buf.len() as u32,
            }));
        }
        self.ops.push(FlashOp::Read(addr, buf.len() as u32));
        buf.copy_from_slice(&self.memory[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        if !is_aligned(addr) {
            return Err(Error::AlignmentViolation { addr });
        }
        let start = addr as usize;
        if start + data.len() > self.memory.len() {
            return Err(Error::FlashIo(FlashIoFailure::OutOfBounds {
                addr,
                len: data.len() as u32,
            }));
        }
        if self.should_fail() {
            return Err(Error::FlashIo(FlashIoFailure::Write {
                addr,
                len: data.len() as u32,
            }));
        }
        self.ops.push(FlashOp::Write(addr, data.len() as u32));
        // Flash programming: can only change 1 -> 0
        for (dst, &src) in self.memory[start..start + data.len()].iter_mut().zip(data) {
            *dst &= src;
        }
        Ok(())
    }
}

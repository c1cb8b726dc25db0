// self mods

// use other mods
use core::any::Any;

use alloc::vec::Vec;
use spin::Mutex;

// use self mods
use crate::configs::BLOCK_BYTE_SIZE;
use crate::{OFSError, Result};

pub trait BlockDevice: Send + Sync + Any {
    /// Get the total count of the blocks in the device
    fn total_block_count(&self) -> usize;

    /// Read a block of bytes from device,
    /// the length of the buffer must be same with [`crate::configs::BLOCK_BYTE_SIZE`]
    ///
    /// # Arguments
    /// * id: the unique identifier of the block
    /// * buffer: the buffer which will store the block byte data
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(OFSError::BlockOutOfBounds(id))
    fn read_block(&self, id: usize, buffer: &mut [u8]) -> Result<()>;

    /// Write a block of bytes to device,
    /// the length of the buffer must be same with [`crate::configs::BLOCK_BYTE_SIZE`]
    ///
    /// # Arguments
    /// * id: the unique identifier of the block
    /// * buffer: the buffer which will be read and the data will be written to device
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(OFSError::BlockOutOfBounds(id))
    fn write_block(&self, id: usize, buffer: &[u8]) -> Result<()>;
}

/// A block device which is impl [`BlockDevice`] and stores every block in memory.
/// It is the only device shipped with the crate and is what the tests mount.
pub struct MemoryBlockDevice {
    block_count: usize,
    data: Mutex<Vec<u8>>,
}
impl MemoryBlockDevice {
    /// Create a new memory block device with the given count of zeroed blocks
    pub fn new(block_count: usize) -> Self {
        Self {
            block_count,
            data: Mutex::new(vec![0; BLOCK_BYTE_SIZE * block_count]),
        }
    }
}
impl BlockDevice for MemoryBlockDevice {
    fn total_block_count(&self) -> usize {
        self.block_count
    }

    fn read_block(&self, id: usize, buffer: &mut [u8]) -> Result<()> {
        assert!(buffer.len() == BLOCK_BYTE_SIZE);
        if id >= self.block_count {
            return Err(OFSError::BlockOutOfBounds(id));
        }
        let start_offset = id * BLOCK_BYTE_SIZE;
        let src = self.data.lock();
        buffer.copy_from_slice(&src[start_offset..start_offset + BLOCK_BYTE_SIZE]);
        Ok(())
    }

    fn write_block(&self, id: usize, buffer: &[u8]) -> Result<()> {
        assert!(buffer.len() == BLOCK_BYTE_SIZE);
        if id >= self.block_count {
            return Err(OFSError::BlockOutOfBounds(id));
        }
        let start_offset = id * BLOCK_BYTE_SIZE;
        let mut dst = self.data.lock();
        dst[start_offset..start_offset + BLOCK_BYTE_SIZE].copy_from_slice(buffer);
        Ok(())
    }
}

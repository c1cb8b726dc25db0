// self mods

// use other mods
use alloc::sync::Arc;

// use self mods
use super::BlockDevice;
use crate::configs::BLOCK_BYTE_SIZE;
use crate::{OFSError, Result};

/// An owned buffer holding exactly one block of bytes,
/// which can be viewed as any of the fixed on-disk record types.
/// There is no cache layer behind it: loading reads the device once,
/// storing writes the device once, and nothing happens in between.
///
/// The buffer is 8-byte aligned so that every `#[repr(C)]` record type
/// used by the layout can be reinterpreted in place.
#[repr(C, align(8))]
pub struct BlockBuffer {
    bytes: [u8; BLOCK_BYTE_SIZE],
}
impl BlockBuffer {
    /// Create a new all-zero block buffer
    pub fn zeroed() -> Self {
        Self {
            bytes: [0; BLOCK_BYTE_SIZE],
        }
    }

    /// Create a new block buffer and read the block bytes immediately
    ///
    /// # Arguments
    /// * device: the dynamic device to be used
    /// * id: the block id of the device
    ///
    /// # Returns
    /// * Ok(BlockBuffer)
    /// * Err(OFSError::BlockOutOfBounds(id))
    pub fn load(device: &Arc<dyn BlockDevice>, id: usize) -> Result<Self> {
        let mut buffer = Self::zeroed();
        device.read_block(id, &mut buffer.bytes)?;
        Ok(buffer)
    }

    /// Write the block bytes back to the device
    ///
    /// # Arguments
    /// * device: the dynamic device to be used
    /// * id: the block id of the device
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(OFSError::BlockOutOfBounds(id))
    pub fn store(&self, device: &Arc<dyn BlockDevice>, id: usize) -> Result<()> {
        device.write_block(id, &self.bytes)
    }

    /// Get the address of the buffered data in memory
    fn addr_of_offset(&self, offset: usize) -> usize {
        &self.bytes[offset] as *const _ as usize
    }

    fn get_ref<T>(&self, offset: usize) -> &T
    where
        T: Sized,
    {
        let addr = self.addr_of_offset(offset);
        unsafe { &*(addr as *const T) }
    }

    fn get_mut<T>(&mut self, offset: usize) -> &mut T
    where
        T: Sized,
    {
        let addr = self.addr_of_offset(offset);
        unsafe { &mut *(addr as *mut T) }
    }

    /// Read data from the buffer as the reference of the <T> and return the result of the closure.
    /// Be careful, the value handed to the closure isn't a copy, but the bytes in place.
    ///
    /// # Arguments
    /// * offset: the offset of the buffered bytes which start from zero
    /// * f: the closure function which receives the reference of the data
    ///
    /// # Returns
    /// * Ok(the result of the closure)
    /// * Err(OFSError::DataOutOfBounds)
    pub fn read<T, V>(&self, offset: usize, f: impl FnOnce(&T) -> V) -> Result<V> {
        if (offset + core::mem::size_of::<T>()) <= BLOCK_BYTE_SIZE {
            Ok(f(self.get_ref(offset)))
        } else {
            Err(OFSError::DataOutOfBounds)
        }
    }

    /// Read data from the buffer as the mutable reference of the <T> and return the result of the closure
    ///
    /// # Arguments
    /// * offset: the offset of the buffered bytes which start from zero
    /// * f: the closure function which receives the mutable reference of the data
    ///
    /// # Returns
    /// * Ok(the result of the closure)
    /// * Err(OFSError::DataOutOfBounds)
    pub fn modify<T, V>(&mut self, offset: usize, f: impl FnOnce(&mut T) -> V) -> Result<V> {
        if (offset + core::mem::size_of::<T>()) <= BLOCK_BYTE_SIZE {
            Ok(f(self.get_mut(offset)))
        } else {
            Err(OFSError::DataOutOfBounds)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::device::MemoryBlockDevice;
    use super::*;

    #[test]
    fn test_block_buffer_load() {
        let device: Arc<dyn BlockDevice> = Arc::new(MemoryBlockDevice::new(4));
        assert!(BlockBuffer::load(&device, 0).is_ok());
        assert!(BlockBuffer::load(&device, 3).is_ok());
        assert!(BlockBuffer::load(&device, 4).is_err_and(|e| e.is_blockoutofbounds()));
    }

    #[test]
    fn test_block_buffer_read_and_modify() {
        let device: Arc<dyn BlockDevice> = Arc::new(MemoryBlockDevice::new(4));
        let mut buffer = BlockBuffer::load(&device, 0).unwrap();
        assert!(buffer.read(0, |v: &u8| *v == 0).is_ok_and(|v| v));
        assert!(buffer.modify(0, |v: &mut u8| *v = 1).is_ok());
        assert!(buffer.read(0, |v: &u8| *v == 1).is_ok_and(|v| v));

        buffer.store(&device, 0).unwrap();
        let buffer = BlockBuffer::load(&device, 0).unwrap();
        assert!(buffer.read(0, |v: &u8| *v == 1).is_ok_and(|v| v));
    }

    #[test]
    fn test_block_buffer_out_of_bounds() {
        let mut buffer = BlockBuffer::zeroed();
        assert!(buffer.read(BLOCK_BYTE_SIZE - 1, |_: &u8| ()).is_ok());
        assert!(buffer
            .read(BLOCK_BYTE_SIZE, |_: &u8| ())
            .is_err_and(|e| e.is_dataoutofbounds()));
        assert!(buffer
            .modify(BLOCK_BYTE_SIZE - 3, |_: &mut u32| ())
            .is_err_and(|e| e.is_dataoutofbounds()));
    }

    #[test]
    fn test_block_buffer_alignment() {
        let buffer = BlockBuffer::zeroed();
        assert_eq!(0, buffer.addr_of_offset(0) % 8);
    }
}

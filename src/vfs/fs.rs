// self mods

// use other mods
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

// use self mods
use super::FreeBlockMap;
use crate::block::{BlockBuffer, BlockDevice};
use crate::configs::{BLOCK_BYTE_SIZE, INODE_AREA_DIVISOR};
use crate::layout::{
    DataBlock, DiskInode, HopLevel, IndirectBlock, SuperBlock, DIRECT_LEAF_BLOCK_COUNT,
    DISK_INODE_BYTE_SIZE, MAX_INODE_BYTE_SIZE, PER_BLOCK_DISK_INODE_COUNT,
};
use crate::{OFSError, Result};

/// The main struct of the file system.
///
/// Files are anonymous and addressed by their one-based inode number only,
/// there is no directory layer on top. The handle borrows the block device
/// for its whole lifetime and never closes it. Every mutating operation
/// writes straight through to the device, so after any call returns there is
/// no dirty state left in memory besides the free block map, which is always
/// recomputed on mount.
pub struct OutpostFileSystem {
    device: Arc<dyn BlockDevice>,
    super_block: SuperBlock,
    free_map: Option<FreeBlockMap>,
}
// volume lifecycle
impl OutpostFileSystem {
    /// Create a new file system handle over a block device.
    /// The super block is read and cached immediately, even if the device
    /// was never formatted, in which case it simply will not validate.
    ///
    /// # Arguments
    /// * device: the dynamic device to be used
    ///
    /// # Returns
    /// * Ok(OutpostFileSystem)
    /// * Err(BlockOutOfBounds(block id))
    pub fn new(device: &Arc<dyn BlockDevice>) -> Result<Self> {
        let buffer = BlockBuffer::load(device, 0)?;
        let super_block = buffer.read(0, |super_block: &SuperBlock| *super_block)?;
        Ok(Self {
            device: Arc::clone(device),
            super_block,
            free_map: None,
        })
    }

    #[inline(always)]
    pub fn is_mounted(&self) -> bool {
        self.free_map.is_some()
    }

    /// Write a brand new empty volume onto the device:
    /// one tenth of the blocks (rounded up) become the inode area,
    /// every disk inode starts out invalid and the super block is written
    /// last. The volume is NOT mounted afterwards.
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(AlreadyMounted | NoEnoughBlocks | DataOutOfBounds | BlockOutOfBounds(block id))
    pub fn format(&mut self) -> Result<()> {
        if self.is_mounted() {
            return Err(OFSError::AlreadyMounted);
        }
        let total_blocks = self.device.total_block_count();
        let inode_area_blocks = (total_blocks + INODE_AREA_DIVISOR - 1) / INODE_AREA_DIVISOR;
        if total_blocks <= inode_area_blocks {
            log::error!("device of {} blocks is too small to format", total_blocks);
            return Err(OFSError::NoEnoughBlocks);
        }
        let disk_inodes = inode_area_blocks * PER_BLOCK_DISK_INODE_COUNT;
        let zeroed = BlockBuffer::zeroed();
        for block_id in 1..=inode_area_blocks {
            zeroed.store(&self.device, block_id)?;
        }
        let mut buffer = BlockBuffer::zeroed();
        buffer.modify(0, |super_block: &mut SuperBlock| {
            super_block.initialize(
                total_blocks as u32,
                inode_area_blocks as u32,
                disk_inodes as u32,
            )
        })?;
        buffer.store(&self.device, 0)?;
        self.super_block = buffer.read(0, |super_block: &SuperBlock| *super_block)?;
        Ok(())
    }

    /// Read the super block, check its magic number and rebuild the free
    /// block map from the footprints of the valid disk inodes: every non-zero
    /// direct block id, every referenced indirect block and every non-zero
    /// block id inside it is marked as used.
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(AlreadyMounted | NotValidMagic | DataOutOfBounds | BlockOutOfBounds(block id))
    pub fn mount(&mut self) -> Result<()> {
        if self.is_mounted() {
            return Err(OFSError::AlreadyMounted);
        }
        let buffer = BlockBuffer::load(&self.device, 0)?;
        let super_block = buffer.read(0, |super_block: &SuperBlock| *super_block)?;
        if !super_block.is_valid() {
            log::error!("block device does not hold a valid file system");
            return Err(OFSError::NotValidMagic);
        }
        let total_blocks = super_block.total_blocks() as usize;
        let inode_area_blocks = super_block.inode_area_blocks() as usize;
        let mut free_map = FreeBlockMap::new(total_blocks, inode_area_blocks);
        for block_offset in 0..inode_area_blocks {
            let inode_buffer = BlockBuffer::load(&self.device, 1 + block_offset)?;
            for index in 0..PER_BLOCK_DISK_INODE_COUNT {
                let inode = inode_buffer
                    .read(index * DISK_INODE_BYTE_SIZE, |inode: &DiskInode| {
                        inode.clone()
                    })?;
                if !inode.is_valid() {
                    continue;
                }
                for k in 0..DIRECT_LEAF_BLOCK_COUNT {
                    if inode.direct(k) != 0 {
                        free_map.mark_used(inode.direct(k) as usize);
                    }
                }
                if inode.indirect1() != 0 {
                    free_map.mark_used(inode.indirect1() as usize);
                    let indirect = BlockBuffer::load(&self.device, inode.indirect1() as usize)?;
                    indirect.read(0, |block: &IndirectBlock| {
                        for &block_id in block.iter() {
                            if block_id != 0 {
                                free_map.mark_used(block_id as usize);
                            }
                        }
                    })?;
                }
            }
        }
        log::debug!(
            "mounted volume: {} blocks, {} inode blocks, {} inodes",
            total_blocks,
            inode_area_blocks,
            super_block.disk_inodes()
        );
        self.super_block = super_block;
        self.free_map = Some(free_map);
        Ok(())
    }

    /// Drop the free block map and leave the mounted state.
    /// Every mutation was already written through, so there is nothing to flush.
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(NotMounted)
    pub fn unmount(&mut self) -> Result<()> {
        if self.free_map.take().is_some() {
            Ok(())
        } else {
            Err(OFSError::NotMounted)
        }
    }
}
// inode table and allocator
impl OutpostFileSystem {
    fn inumber_is_valid(&self, inumber: usize) -> bool {
        inumber >= 1 && inumber <= self.super_block.disk_inodes() as usize
    }

    /// Read the block containing a disk inode and a copy of the inode itself,
    /// so the caller can rewrite the inode and persist the whole block in one write
    fn read_inode(&self, inumber: usize) -> Result<(BlockBuffer, DiskInode)> {
        let (block_id, offset) = DiskInode::cal_position(inumber);
        let buffer = BlockBuffer::load(&self.device, block_id)?;
        let inode = buffer.read(offset, |inode: &DiskInode| inode.clone())?;
        Ok((buffer, inode))
    }

    /// Put the inode back into its containing block and write the block to the device
    fn write_inode(
        &self,
        inumber: usize,
        buffer: &mut BlockBuffer,
        inode: &DiskInode,
    ) -> Result<()> {
        let (block_id, offset) = DiskInode::cal_position(inumber);
        buffer.modify(offset, |target: &mut DiskInode| *target = inode.clone())?;
        buffer.store(&self.device, block_id)
    }

    /// Scan the inode area for the first invalid disk inode. The inode is
    /// initialized inside the returned block buffer but nothing is written
    /// to the device until the caller stores the buffer.
    ///
    /// # Returns
    /// * Ok(Some((inumber, block buffer holding the initialized inode)))
    /// * Ok(None): every disk inode is in use
    /// * Err(DataOutOfBounds | BlockOutOfBounds(block id))
    fn find_free_inode(&self) -> Result<Option<(usize, BlockBuffer)>> {
        let inode_area_blocks = self.super_block.inode_area_blocks() as usize;
        let disk_inodes = self.super_block.disk_inodes() as usize;
        for block_offset in 0..inode_area_blocks {
            let mut buffer = BlockBuffer::load(&self.device, 1 + block_offset)?;
            for index in 0..PER_BLOCK_DISK_INODE_COUNT {
                let inumber = block_offset * PER_BLOCK_DISK_INODE_COUNT + index + 1;
                if inumber > disk_inodes {
                    return Ok(None);
                }
                let offset = index * DISK_INODE_BYTE_SIZE;
                let valid = buffer.read(offset, |inode: &DiskInode| inode.is_valid())?;
                if !valid {
                    buffer.modify(offset, |inode: &mut DiskInode| inode.initialize())?;
                    return Ok(Some((inumber, buffer)));
                }
            }
        }
        Ok(None)
    }

    /// Find the physical block id behind a leaf block index of the file.
    /// The indirect block is loaded through the caller's local buffer, so a
    /// whole read call touches it at most once no matter how many leaves it
    /// resolves.
    ///
    /// # Returns
    /// * Ok(block id): zero means the leaf was never allocated
    /// * Err(DataOutOfBounds | BlockOutOfBounds(block id))
    fn leaf_block_id(
        &self,
        inode: &DiskInode,
        leaf_index: usize,
        indirect: &mut Option<BlockBuffer>,
    ) -> Result<usize> {
        match HopLevel::cal_from(leaf_index)? {
            HopLevel::Direct(index) => Ok(inode.direct(index) as usize),
            HopLevel::Indirect1(index) => {
                if inode.indirect1() == 0 {
                    return Ok(0);
                }
                if indirect.is_none() {
                    *indirect = Some(BlockBuffer::load(&self.device, inode.indirect1() as usize)?);
                }
                indirect
                    .as_ref()
                    .unwrap()
                    .read(0, |block: &IndirectBlock| block[index] as usize)
            }
        }
    }
}
// file operations
impl OutpostFileSystem {
    /// Allocate the first free disk inode as a fresh empty file.
    ///
    /// # Returns
    /// * Ok(inumber)
    /// * Err(NotMounted | InodeAreaExhausted | DataOutOfBounds | BlockOutOfBounds(block id))
    pub fn create(&mut self) -> Result<usize> {
        if !self.is_mounted() {
            return Err(OFSError::NotMounted);
        }
        match self.find_free_inode()? {
            Some((inumber, buffer)) => {
                let (block_id, _) = DiskInode::cal_position(inumber);
                buffer.store(&self.device, block_id)?;
                Ok(inumber)
            }
            None => {
                log::warn!("no free inode left in the inode area");
                Err(OFSError::InodeAreaExhausted)
            }
        }
    }

    /// Give a file back to the volume: every direct block, every block the
    /// indirect block points to and the indirect block itself return to the
    /// free map, then the inode is invalidated on the device. The data block
    /// contents are not scrubbed.
    ///
    /// # Arguments
    /// * inumber: the one-based number of the disk inode
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(NotMounted | InumberOutOfRange(inumber) | InodeNotValid(inumber) | DataOutOfBounds | BlockOutOfBounds(block id))
    pub fn delete(&mut self, inumber: usize) -> Result<()> {
        if !self.is_mounted() {
            return Err(OFSError::NotMounted);
        }
        if !self.inumber_is_valid(inumber) {
            return Err(OFSError::InumberOutOfRange(inumber));
        }
        let (mut buffer, mut inode) = self.read_inode(inumber)?;
        if !inode.is_valid() {
            return Err(OFSError::InodeNotValid(inumber));
        }
        let device = Arc::clone(&self.device);
        let free_map = self.free_map.as_mut().unwrap();
        for k in 0..DIRECT_LEAF_BLOCK_COUNT {
            if inode.direct(k) != 0 {
                free_map.dealloc(inode.direct(k) as usize);
            }
        }
        if inode.indirect1() != 0 {
            let indirect = BlockBuffer::load(&device, inode.indirect1() as usize)?;
            indirect.read(0, |block: &IndirectBlock| {
                for &block_id in block.iter() {
                    if block_id != 0 {
                        free_map.dealloc(block_id as usize);
                    }
                }
            })?;
            free_map.dealloc(inode.indirect1() as usize);
        }
        inode.set_invalid();
        self.write_inode(inumber, &mut buffer, &inode)
    }

    /// Get the byte size of a file.
    ///
    /// # Arguments
    /// * inumber: the one-based number of the disk inode
    ///
    /// # Returns
    /// * Ok(byte size)
    /// * Err(NotMounted | InumberOutOfRange(inumber) | InodeNotValid(inumber) | DataOutOfBounds | BlockOutOfBounds(block id))
    pub fn size(&self, inumber: usize) -> Result<u32> {
        if !self.is_mounted() {
            return Err(OFSError::NotMounted);
        }
        if !self.inumber_is_valid(inumber) {
            return Err(OFSError::InumberOutOfRange(inumber));
        }
        let (_, inode) = self.read_inode(inumber)?;
        if !inode.is_valid() {
            return Err(OFSError::InodeNotValid(inumber));
        }
        Ok(inode.byte_size())
    }

    /// Read file bytes starting from the given offset into the buffer.
    /// Reading stops at the end of the file, so fewer bytes than the buffer
    /// holds may come back. The start offset must be strictly inside the file.
    ///
    /// # Arguments
    /// * inumber: the one-based number of the disk inode
    /// * buffer: mutable reference to the buffer which the bytes will be written to
    /// * start_offset: the byte offset into the file where reading begins
    ///
    /// # Returns
    /// * Ok(the count of the bytes read)
    /// * Err(NotMounted | InumberOutOfRange(inumber) | InodeNotValid(inumber) | DataOutOfBounds | BlockOutOfBounds(block id))
    pub fn read_at(&self, inumber: usize, buffer: &mut [u8], start_offset: usize) -> Result<usize> {
        if !self.is_mounted() {
            return Err(OFSError::NotMounted);
        }
        if !self.inumber_is_valid(inumber) {
            return Err(OFSError::InumberOutOfRange(inumber));
        }
        let (_, inode) = self.read_inode(inumber)?;
        if !inode.is_valid() {
            return Err(OFSError::InodeNotValid(inumber));
        }
        let byte_size = inode.byte_size() as usize;
        if start_offset >= byte_size {
            return Err(OFSError::DataOutOfBounds);
        }
        let effective = buffer.len().min(byte_size - start_offset);
        let mut indirect: Option<BlockBuffer> = None;
        let mut read_byte_size = 0;
        while read_byte_size < effective {
            let position = start_offset + read_byte_size;
            let leaf_index = position / BLOCK_BYTE_SIZE;
            let block_offset = position % BLOCK_BYTE_SIZE;
            let span = (effective - read_byte_size).min(BLOCK_BYTE_SIZE - block_offset);
            let block_id = self.leaf_block_id(&inode, leaf_index, &mut indirect)?;
            if block_id == 0 {
                return Err(OFSError::DataOutOfBounds);
            }
            let data = BlockBuffer::load(&self.device, block_id)?;
            data.read(0, |block: &DataBlock| {
                buffer[read_byte_size..read_byte_size + span]
                    .copy_from_slice(&block[block_offset..block_offset + span]);
            })?;
            read_byte_size += span;
        }
        Ok(read_byte_size)
    }

    /// Write the buffer into the file starting from the given offset,
    /// allocating data blocks and the indirect block on demand. Appending at
    /// the exact end of the file is allowed, leaving a hole past it is not.
    ///
    /// When the free map runs dry mid-way the call stops early: whatever was
    /// already written stays on the device, the inode and the indirect block
    /// are flushed to match, and the short byte count comes back as Ok. The
    /// indirect block is read and written at most once per call.
    ///
    /// # Arguments
    /// * inumber: the one-based number of the disk inode
    /// * buffer: reference to the buffer which will be read
    /// * start_offset: the byte offset into the file where writing begins
    ///
    /// # Returns
    /// * Ok(the count of the bytes written, may be smaller than the buffer)
    /// * Err(NotMounted | InumberOutOfRange(inumber) | InodeNotValid(inumber) | DataOutOfBounds | BlockOutOfBounds(block id))
    pub fn write_at(&mut self, inumber: usize, buffer: &[u8], start_offset: usize) -> Result<usize> {
        if !self.is_mounted() {
            return Err(OFSError::NotMounted);
        }
        if !self.inumber_is_valid(inumber) {
            return Err(OFSError::InumberOutOfRange(inumber));
        }
        let (mut inode_buffer, mut inode) = self.read_inode(inumber)?;
        if !inode.is_valid() {
            return Err(OFSError::InodeNotValid(inumber));
        }
        let byte_size = inode.byte_size() as usize;
        if start_offset > byte_size {
            return Err(OFSError::DataOutOfBounds);
        }
        let device = Arc::clone(&self.device);
        let free_map = self.free_map.as_mut().unwrap();
        let effective = buffer.len().min(MAX_INODE_BYTE_SIZE - start_offset);
        let mut indirect: Option<(usize, BlockBuffer)> = None;
        let mut indirect_dirty = false;
        let mut written_byte_size = 0;
        'copy: while written_byte_size < effective {
            let position = start_offset + written_byte_size;
            let leaf_index = position / BLOCK_BYTE_SIZE;
            let block_offset = position % BLOCK_BYTE_SIZE;
            let span = (effective - written_byte_size).min(BLOCK_BYTE_SIZE - block_offset);
            let (block_id, fresh) = match HopLevel::cal_from(leaf_index)? {
                HopLevel::Direct(index) => {
                    let block_id = inode.direct(index) as usize;
                    if block_id != 0 {
                        (block_id, false)
                    } else {
                        match free_map.alloc() {
                            Some(new_id) => {
                                inode.set_direct(index, new_id as u32);
                                (new_id, true)
                            }
                            None => break 'copy,
                        }
                    }
                }
                HopLevel::Indirect1(index) => {
                    if inode.indirect1() == 0 {
                        match free_map.alloc() {
                            Some(new_id) => {
                                inode.set_indirect1(new_id as u32);
                                indirect = Some((new_id, BlockBuffer::zeroed()));
                                indirect_dirty = true;
                            }
                            None => break 'copy,
                        }
                    } else if indirect.is_none() {
                        let indirect_id = inode.indirect1() as usize;
                        indirect = Some((indirect_id, BlockBuffer::load(&device, indirect_id)?));
                    }
                    let (_, indirect_buffer) = indirect.as_mut().unwrap();
                    let block_id =
                        indirect_buffer.read(0, |block: &IndirectBlock| block[index] as usize)?;
                    if block_id != 0 {
                        (block_id, false)
                    } else {
                        match free_map.alloc() {
                            Some(new_id) => {
                                indirect_buffer.modify(0, |block: &mut IndirectBlock| {
                                    block[index] = new_id as u32
                                })?;
                                indirect_dirty = true;
                                (new_id, true)
                            }
                            None => break 'copy,
                        }
                    }
                }
            };
            let mut data = if fresh || span == BLOCK_BYTE_SIZE {
                BlockBuffer::zeroed()
            } else {
                BlockBuffer::load(&device, block_id)?
            };
            data.modify(0, |block: &mut DataBlock| {
                block[block_offset..block_offset + span]
                    .copy_from_slice(&buffer[written_byte_size..written_byte_size + span]);
            })?;
            data.store(&device, block_id)?;
            written_byte_size += span;
        }
        if written_byte_size < effective {
            log::warn!(
                "data blocks exhausted, short write of {} bytes",
                written_byte_size
            );
        }
        if start_offset + written_byte_size > byte_size {
            inode.set_byte_size((start_offset + written_byte_size) as u32);
        }
        if indirect_dirty {
            let (indirect_id, indirect_buffer) = indirect.as_ref().unwrap();
            indirect_buffer.store(&device, *indirect_id)?;
        }
        self.write_inode(inumber, &mut inode_buffer, &inode)?;
        Ok(written_byte_size)
    }
}
// diagnostics
impl OutpostFileSystem {
    /// Count the blocks which are currently free for allocation
    ///
    /// # Returns
    /// * Ok(free block count)
    /// * Err(NotMounted)
    pub fn free_block_count(&self) -> Result<usize> {
        self.free_map
            .as_ref()
            .map(|free_map| free_map.free_block_count())
            .ok_or(OFSError::NotMounted)
    }

    /// Check whether a single block is free for allocation
    ///
    /// # Returns
    /// * Ok(true | false)
    /// * Err(NotMounted | BlockOutOfBounds(block id))
    pub fn is_block_free(&self, block_id: usize) -> Result<bool> {
        let free_map = self.free_map.as_ref().ok_or(OFSError::NotMounted)?;
        free_map
            .is_free(block_id)
            .ok_or(OFSError::BlockOutOfBounds(block_id))
    }

    /// Write a human readable dump of the volume into the writer: the super
    /// block geometry followed by one stanza per valid inode. Works on an
    /// unmounted handle. When the magic number does not match, only the
    /// invalid-magic line is printed and the inode walk is skipped.
    ///
    /// # Arguments
    /// * writer: where the dump text goes
    ///
    /// # Returns
    /// * Ok(())
    /// * Err(WriteFmtError(error) | DataOutOfBounds | BlockOutOfBounds(block id))
    pub fn dump<W: fmt::Write>(&self, writer: &mut W) -> Result<()> {
        let buffer = BlockBuffer::load(&self.device, 0)?;
        let super_block = buffer.read(0, |super_block: &SuperBlock| *super_block)?;
        writeln!(writer, "superblock:")?;
        if !super_block.is_valid() {
            writeln!(writer, "    magic number is invalid!")?;
            return Ok(());
        }
        writeln!(writer, "    magic number is valid")?;
        writeln!(writer, "    {} blocks", super_block.total_blocks())?;
        writeln!(writer, "    {} inode blocks", super_block.inode_area_blocks())?;
        writeln!(writer, "    {} inodes", super_block.disk_inodes())?;
        for block_offset in 0..super_block.inode_area_blocks() as usize {
            let inode_buffer = BlockBuffer::load(&self.device, 1 + block_offset)?;
            for index in 0..PER_BLOCK_DISK_INODE_COUNT {
                let inode = inode_buffer
                    .read(index * DISK_INODE_BYTE_SIZE, |inode: &DiskInode| {
                        inode.clone()
                    })?;
                if !inode.is_valid() {
                    continue;
                }
                let inumber = block_offset * PER_BLOCK_DISK_INODE_COUNT + index + 1;
                writeln!(writer, "inode {}:", inumber)?;
                writeln!(writer, "    size: {} bytes", inode.byte_size())?;
                write!(writer, "    direct blocks:")?;
                for k in 0..DIRECT_LEAF_BLOCK_COUNT {
                    if inode.direct(k) != 0 {
                        write!(writer, " {}", inode.direct(k))?;
                    }
                }
                writeln!(writer)?;
                if inode.indirect1() == 0 {
                    writeln!(writer, "    indirect block: -")?;
                    writeln!(writer, "    indirect data blocks: -")?;
                    continue;
                }
                writeln!(writer, "    indirect block: {}", inode.indirect1())?;
                write!(writer, "    indirect data blocks:")?;
                let indirect = BlockBuffer::load(&self.device, inode.indirect1() as usize)?;
                let leaf_ids: Vec<u32> = indirect.read(0, |block: &IndirectBlock| {
                    block.iter().copied().filter(|id| *id != 0).collect()
                })?;
                for block_id in leaf_ids {
                    write!(writer, " {}", block_id)?;
                }
                writeln!(writer)?;
            }
        }
        Ok(())
    }
}

//! A minimal on-disk image carrying the inode table and attribute blocks.
//!
//! The image exists to exercise the attribute engine end to end: block 0
//! holds the superblock, block 1 the inode table, and everything above
//! `s_next_free` is handed out by the bump allocator. Filesystem blocks
//! are larger than the driver's I/O unit, so every read and write spans a
//! run of driver blocks.
use crate::xattr_lib::error::{XattrError, XattrResult};
use crate::xattr_lib::{AttrNode, BlockCache};
use disk_driver::DiskDriver;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::mem::size_of;
use zerocopy::{AsBytes, FromBytes};

/// "RXAT" little-endian.
pub const IMAGE_MAGIC: u32 = 0x5441_5852;
pub const IMAGE_BLOCK_SIZE: usize = 4096;
/// Superblock and inode table.
const RESERVED_BLOCKS: u32 = 2;
const INODE_TABLE_BLOCK: u32 = 1;

#[repr(C)]
#[derive(Debug, Default, Copy, Clone, AsBytes, FromBytes)]
pub struct ImageSuper {
    /* 00 */ pub s_magic: u32,
    /* 04 */ pub s_block_size: u32,
    /* 08 */ pub s_blocks_count: u32,
    /* 0c */ pub s_next_free: u32,
    /* 10 */ pub s_inodes_count: u32,
    /* 14 */ pub s_reserved: [u32; 3],
}

/// Fixed 16 byte inode, just enough state to hang attributes off.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes)]
pub struct Inode {
    /* 00 */ pub i_mode: u16,
    /* 02 */ pub i_links_count: u16,
    /* 04 */ pub i_flags: u32,
    /* 08 | attribute block, 0 when none */ pub i_file_acl: u32,
    /* 0c */ pub i_reserved: u32,
}

pub const INODE_SIZE: usize = size_of::<Inode>();

impl AttrNode for Inode {
    fn attr_block(&self) -> u32 {
        self.i_file_acl
    }
    fn set_attr_block(&mut self, blkno: u32) {
        self.i_file_acl = blkno;
    }
}

struct CachedBlock {
    data: Vec<u8>,
    dirty: bool,
}

/// The image over an arbitrary disk driver.
pub struct ImageFs<T: DiskDriver> {
    pub driver: T,
    super_block: ImageSuper,
    blocks: HashMap<u32, CachedBlock>,
}

impl<T: DiskDriver> ImageFs<T> {
    pub fn new(driver: T) -> Self {
        Self {
            driver,
            super_block: ImageSuper::default(),
            blocks: HashMap::new(),
        }
    }

    fn units_per_block(&self) -> usize {
        IMAGE_BLOCK_SIZE / self.driver.ddriver_block_size()
    }

    fn read_fs_block(&mut self, blkno: u32) -> XattrResult<Vec<u8>> {
        let unit = self.driver.ddriver_block_size();
        let per = self.units_per_block();
        let mut data = vec![0u8; IMAGE_BLOCK_SIZE];
        for i in 0..per {
            let at = blkno as u64 * per as u64 + i as u64;
            self.driver
                .ddriver_read_block(at, &mut data[i * unit..(i + 1) * unit])?;
        }
        Ok(data)
    }

    fn write_fs_block(&mut self, blkno: u32, data: &[u8]) -> XattrResult<()> {
        let unit = self.driver.ddriver_block_size();
        let per = self.units_per_block();
        for i in 0..per {
            let at = blkno as u64 * per as u64 + i as u64;
            self.driver
                .ddriver_write_block(at, &data[i * unit..(i + 1) * unit])?;
        }
        Ok(())
    }

    /// Lay down a fresh image: superblock, zeroed inode table, empty data
    /// area.
    pub fn format(&mut self, path: &str) -> XattrResult<()> {
        self.driver.ddriver_open(path)?;
        let layout = self.driver.ddriver_info().consts.layout_size as usize;
        let blocks_count = (layout / IMAGE_BLOCK_SIZE) as u32;
        if blocks_count <= RESERVED_BLOCKS {
            return Err(XattrError::Io("device too small to format".to_string()));
        }
        self.super_block = ImageSuper {
            s_magic: IMAGE_MAGIC,
            s_block_size: IMAGE_BLOCK_SIZE as u32,
            s_blocks_count: blocks_count,
            s_next_free: RESERVED_BLOCKS,
            s_inodes_count: (IMAGE_BLOCK_SIZE / INODE_SIZE) as u32,
            s_reserved: [0; 3],
        };
        self.write_super()?;
        self.write_fs_block(INODE_TABLE_BLOCK, &vec![0u8; IMAGE_BLOCK_SIZE])?;
        self.driver.ddriver_flush()?;
        info!(
            "formatted image: {} blocks of {} bytes, {} inodes",
            blocks_count, IMAGE_BLOCK_SIZE, self.super_block.s_inodes_count
        );
        Ok(())
    }

    /// Open an existing image and read the superblock back.
    pub fn open(&mut self, path: &str) -> XattrResult<()> {
        self.driver.ddriver_open(path)?;
        let block = self.read_fs_block(0)?;
        let super_block = ImageSuper::read_from(&block[..size_of::<ImageSuper>()])
            .ok_or(XattrError::Corrupt("short superblock"))?;
        if super_block.s_magic != IMAGE_MAGIC {
            warn!("superblock magic {:#x} does not match", super_block.s_magic);
            return Err(XattrError::Corrupt("bad superblock magic"));
        }
        if super_block.s_block_size as usize != IMAGE_BLOCK_SIZE {
            return Err(XattrError::Corrupt("unexpected block size"));
        }
        self.super_block = super_block;
        debug!(
            "opened image: {} blocks, next free {}",
            super_block.s_blocks_count, super_block.s_next_free
        );
        Ok(())
    }

    fn write_super(&mut self) -> XattrResult<()> {
        let mut block = vec![0u8; IMAGE_BLOCK_SIZE];
        block[..size_of::<ImageSuper>()].copy_from_slice(self.super_block.as_bytes());
        self.write_fs_block(0, &block)
    }

    pub fn get_inode(&mut self, ino: u32) -> XattrResult<Inode> {
        if ino >= self.super_block.s_inodes_count {
            return Err(XattrError::InvalidRequest);
        }
        let table = self.fetch_block(INODE_TABLE_BLOCK)?;
        let at = ino as usize * INODE_SIZE;
        Inode::read_from(&table[at..at + INODE_SIZE])
            .ok_or(XattrError::Corrupt("short inode table"))
    }

    pub fn set_inode(&mut self, ino: u32, inode: &Inode) -> XattrResult<()> {
        if ino >= self.super_block.s_inodes_count {
            return Err(XattrError::InvalidRequest);
        }
        let table = self.fetch_block(INODE_TABLE_BLOCK)?;
        let at = ino as usize * INODE_SIZE;
        table[at..at + INODE_SIZE].copy_from_slice(inode.as_bytes());
        self.mark_dirty(INODE_TABLE_BLOCK);
        Ok(())
    }

    /// Write every dirty block and the superblock back to the driver.
    pub fn flush(&mut self) -> XattrResult<()> {
        let dirty: Vec<u32> = self
            .blocks
            .iter()
            .filter(|(_, c)| c.dirty)
            .map(|(b, _)| *b)
            .collect();
        for blkno in dirty {
            if let Some(item) = self.blocks.remove(&blkno) {
                self.write_fs_block(blkno, &item.data)?;
                self.blocks.insert(
                    blkno,
                    CachedBlock {
                        data: item.data,
                        dirty: false,
                    },
                );
            }
        }
        self.write_super()?;
        self.driver.ddriver_flush()?;
        Ok(())
    }

    pub fn close(&mut self) -> XattrResult<()> {
        self.flush()?;
        self.driver.ddriver_close()?;
        Ok(())
    }
}

impl<T: DiskDriver> BlockCache for ImageFs<T> {
    fn block_size(&self) -> usize {
        IMAGE_BLOCK_SIZE
    }

    fn fetch_block(&mut self, blkno: u32) -> XattrResult<&mut [u8]> {
        if blkno == 0 || blkno >= self.super_block.s_blocks_count {
            return Err(XattrError::Io(format!("block {} out of range", blkno)));
        }
        if !self.blocks.contains_key(&blkno) {
            let data = self.read_fs_block(blkno)?;
            self.blocks.insert(blkno, CachedBlock { data, dirty: false });
        }
        match self.blocks.get_mut(&blkno) {
            Some(item) => Ok(item.data.as_mut_slice()),
            None => Err(XattrError::Io("block cache miss".to_string())),
        }
    }

    fn allocate_block(&mut self, _goal: u32) -> XattrResult<u32> {
        let blkno = self.super_block.s_next_free;
        if blkno >= self.super_block.s_blocks_count {
            return Err(XattrError::Io("no free blocks left".to_string()));
        }
        self.super_block.s_next_free += 1;
        self.blocks.insert(
            blkno,
            CachedBlock {
                data: vec![0u8; IMAGE_BLOCK_SIZE],
                dirty: true,
            },
        );
        debug!("allocated block {}", blkno);
        Ok(blkno)
    }

    fn mark_dirty(&mut self, blkno: u32) {
        if let Some(item) = self.blocks.get_mut(&blkno) {
            item.dirty = true;
        }
    }
}

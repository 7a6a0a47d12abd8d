use anyhow::{anyhow, Result};

#[derive(Default, Debug, Copy, Clone)]
pub struct DiskStats {
    pub read_cnt: u32,
    pub write_cnt: u32,
    pub flush_cnt: u32,
}

#[derive(Debug, Copy, Clone)]
pub struct DiskConst {
    /// Total device size in bytes
    pub layout_size: u32,
    /// Smallest read/write unit in bytes, must be a power of two
    pub iounit_size: u32,
}

#[derive(Default, Copy, Debug, Clone)]
pub struct DiskInfo {
    pub stats: DiskStats,
    pub consts: DiskConst,
}

impl DiskConst {
    pub fn disk_block_count(&self) -> usize {
        (self.layout_size / self.iounit_size) as usize
    }
}

impl Default for DiskConst {
    fn default() -> Self {
        Self {
            layout_size: 4 * 0x400 * 0x400,
            iounit_size: 512,
        }
    }
}

/// DiskDriver abstract interface.
///
/// Addressing is by block number; the block size is the device io unit and
/// the smallest transfer size. Implementations may buffer writes until
/// `ddriver_flush`.
pub trait DiskDriver {
    /// Open device
    fn ddriver_open(&mut self, path: &str) -> Result<()>;
    /// Close device, flushing outstanding writes
    fn ddriver_close(&mut self) -> Result<()>;
    /// Device block size in bytes
    fn ddriver_block_size(&self) -> usize;
    /// Device size in blocks
    fn ddriver_block_count(&self) -> usize;
    /// Read one block. `buf` must be exactly one block long.
    fn ddriver_read_block(&mut self, blkno: u64, buf: &mut [u8]) -> Result<()>;
    /// Write one block. `buf` must be exactly one block long.
    fn ddriver_write_block(&mut self, blkno: u64, buf: &[u8]) -> Result<()>;
    /// Push all buffered writes down to the device
    fn ddriver_flush(&mut self) -> Result<()>;
    /// Read device info and stats
    fn ddriver_info(&self) -> DiskInfo;
}

pub(crate) fn check_block(consts: &DiskConst, blkno: u64, len: usize) -> Result<()> {
    if len != consts.iounit_size as usize {
        return Err(anyhow!(
            "buffer is {} bytes, device unit is {}",
            len,
            consts.iounit_size
        ));
    }
    if blkno >= (consts.layout_size / consts.iounit_size) as u64 {
        return Err(anyhow!("block {} out of device range", blkno));
    }
    Ok(())
}

pub mod memory;
pub mod file;
pub mod cache;

pub use cache::CacheDiskDriver;
pub use file::FileDiskDriver;
pub use memory::MemoryDiskDriver;

#[allow(dead_code)]
pub(crate) fn driver_tester(driver: &mut dyn DiskDriver, path: &str) -> Result<()> {
    driver.ddriver_open(path)?;
    let unit = driver.ddriver_block_size();
    let count = driver.ddriver_block_count();
    assert!(count >= 2);
    let write_data = [0x55u8].repeat(unit);
    driver.ddriver_write_block(1, &write_data)?;
    let mut read_data = [0u8].repeat(unit);
    driver.ddriver_read_block(1, &mut read_data)?;
    assert_eq!(read_data, write_data);
    driver.ddriver_read_block(0, &mut read_data)?;
    assert_eq!(read_data, [0u8].repeat(unit));
    driver.ddriver_close()?;
    Ok(())
}

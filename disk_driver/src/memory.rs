use crate::{check_block, DiskConst, DiskDriver, DiskInfo};
use anyhow::Result;
use log::debug;

const MEM_DISK_SIZE: usize = 4 * 0x400 * 0x400;
const MEM_DISK_UNIT: usize = 512;

/// Volatile in-memory device, used by tests and the unit-test harness of the
/// layers above.
pub struct MemoryDiskDriver {
    info: DiskInfo,
    mem: Vec<u8>,
}

impl MemoryDiskDriver {
    pub fn new() -> Self {
        Self::with_geometry(MEM_DISK_SIZE, MEM_DISK_UNIT)
    }

    pub fn with_geometry(size: usize, unit: usize) -> Self {
        assert!(unit.is_power_of_two() && size % unit == 0);
        Self {
            info: DiskInfo {
                stats: Default::default(),
                consts: DiskConst {
                    layout_size: size as u32,
                    iounit_size: unit as u32,
                },
            },
            mem: vec![0u8; size],
        }
    }

    fn block_slice(&mut self, blkno: u64) -> &mut [u8] {
        let unit = self.info.consts.iounit_size as usize;
        let start = blkno as usize * unit;
        &mut self.mem[start..start + unit]
    }
}

impl Default for MemoryDiskDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskDriver for MemoryDiskDriver {
    fn ddriver_open(&mut self, path: &str) -> Result<()> {
        debug!("MemDrv open: {}", path);
        Ok(())
    }

    fn ddriver_close(&mut self) -> Result<()> {
        Ok(())
    }

    fn ddriver_block_size(&self) -> usize {
        self.info.consts.iounit_size as usize
    }

    fn ddriver_block_count(&self) -> usize {
        self.info.consts.disk_block_count()
    }

    fn ddriver_read_block(&mut self, blkno: u64, buf: &mut [u8]) -> Result<()> {
        check_block(&self.info.consts, blkno, buf.len())?;
        buf.copy_from_slice(self.block_slice(blkno));
        self.info.stats.read_cnt += 1;
        Ok(())
    }

    fn ddriver_write_block(&mut self, blkno: u64, buf: &[u8]) -> Result<()> {
        check_block(&self.info.consts, blkno, buf.len())?;
        self.block_slice(blkno).copy_from_slice(buf);
        self.info.stats.write_cnt += 1;
        Ok(())
    }

    fn ddriver_flush(&mut self) -> Result<()> {
        self.info.stats.flush_cnt += 1;
        Ok(())
    }

    fn ddriver_info(&self) -> DiskInfo {
        self.info
    }
}

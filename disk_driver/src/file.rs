use crate::{check_block, DiskConst, DiskDriver, DiskInfo};
use anyhow::{anyhow, Result};
use log::{debug, info};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};

const FILE_DISK_SIZE: usize = 4 * 0x400 * 0x400;
const FILE_DISK_UNIT: usize = 512;

/// Device backed by a regular file. The file is created (and extended to the
/// device size) on first open.
pub struct FileDiskDriver {
    info: DiskInfo,
    file: Option<File>,
}

impl FileDiskDriver {
    pub fn new() -> Self {
        Self::with_geometry(FILE_DISK_SIZE, FILE_DISK_UNIT)
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
            file: None,
        }
    }

    fn file(&mut self) -> Result<&mut File> {
        self.file.as_mut().ok_or_else(|| anyhow!("device not open"))
    }

    fn seek_to(&mut self, blkno: u64) -> Result<()> {
        let unit = self.info.consts.iounit_size as u64;
        self.file()?.seek(SeekFrom::Start(blkno * unit))?;
        Ok(())
    }
}

impl Default for FileDiskDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskDriver for FileDiskDriver {
    fn ddriver_open(&mut self, path: &str) -> Result<()> {
        debug!("FileDrv open: {}", path);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.metadata()?.len();
        if len < self.info.consts.layout_size as u64 {
            info!(
                "extend {} from {} to {} bytes",
                path, len, self.info.consts.layout_size
            );
            file.set_len(self.info.consts.layout_size as u64)?;
        }
        file.seek(SeekFrom::Start(0))?;
        self.file = Some(file);
        Ok(())
    }

    fn ddriver_close(&mut self) -> Result<()> {
        self.ddriver_flush()?;
        self.file = None;
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
        self.seek_to(blkno)?;
        self.file()?.read_exact(buf)?;
        self.info.stats.read_cnt += 1;
        Ok(())
    }

    fn ddriver_write_block(&mut self, blkno: u64, buf: &[u8]) -> Result<()> {
        check_block(&self.info.consts, blkno, buf.len())?;
        self.seek_to(blkno)?;
        self.file()?.write_all(buf)?;
        self.info.stats.write_cnt += 1;
        Ok(())
    }

    fn ddriver_flush(&mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.sync_data()?;
        }
        self.info.stats.flush_cnt += 1;
        Ok(())
    }

    fn ddriver_info(&self) -> DiskInfo {
        self.info
    }
}

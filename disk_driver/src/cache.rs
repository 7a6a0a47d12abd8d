use crate::{DiskDriver, DiskInfo};
use anyhow::Result;
use log::debug;
use lru::LruCache;
use std::num::NonZeroUsize;

#[derive(Debug, Clone)]
struct CacheItem {
    dirty: bool,
    data: Vec<u8>,
}

/// Write-back LRU block cache stacked on another driver.
///
/// Reads fill the cache; writes stay in the cache until the item is evicted,
/// the cache is flushed, or the device is closed. Eviction writes back dirty
/// items only.
pub struct CacheDiskDriver<T: DiskDriver> {
    inner: T,
    cache: LruCache<u64, CacheItem>,
}

impl<T: DiskDriver> CacheDiskDriver<T> {
    pub fn new(inner: T, size: usize) -> Self {
        let cache = LruCache::new(NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN));
        debug!("cache init, {} slots", size);
        Self { inner, cache }
    }

    fn write_back_item(&mut self, replaced: Option<(u64, CacheItem)>) -> Result<()> {
        if let Some((blkno, item)) = replaced {
            if item.dirty {
                debug!("cache write back block {}", blkno);
                self.inner.ddriver_write_block(blkno, &item.data)?;
            }
        }
        Ok(())
    }
}

impl<T: DiskDriver> DiskDriver for CacheDiskDriver<T> {
    fn ddriver_open(&mut self, path: &str) -> Result<()> {
        self.cache.clear();
        self.inner.ddriver_open(path)
    }

    fn ddriver_close(&mut self) -> Result<()> {
        self.ddriver_flush()?;
        self.inner.ddriver_close()
    }

    fn ddriver_block_size(&self) -> usize {
        self.inner.ddriver_block_size()
    }

    fn ddriver_block_count(&self) -> usize {
        self.inner.ddriver_block_count()
    }

    fn ddriver_read_block(&mut self, blkno: u64, buf: &mut [u8]) -> Result<()> {
        if let Some(item) = self.cache.get(&blkno) {
            buf.copy_from_slice(&item.data);
            return Ok(());
        }
        self.inner.ddriver_read_block(blkno, buf)?;
        let replaced = self.cache.push(
            blkno,
            CacheItem {
                dirty: false,
                data: buf.to_vec(),
            },
        );
        self.write_back_item(replaced)
    }

    fn ddriver_write_block(&mut self, blkno: u64, buf: &[u8]) -> Result<()> {
        if let Some(item) = self.cache.get_mut(&blkno) {
            item.data.copy_from_slice(buf);
            item.dirty = true;
            return Ok(());
        }
        // no need to read first, the whole block is overwritten
        let replaced = self.cache.push(
            blkno,
            CacheItem {
                dirty: true,
                data: buf.to_vec(),
            },
        );
        self.write_back_item(replaced)
    }

    fn ddriver_flush(&mut self) -> Result<()> {
        debug!("flush cached blocks");
        for (blkno, item) in self.cache.iter_mut() {
            if item.dirty {
                self.inner.ddriver_write_block(*blkno, &item.data)?;
                item.dirty = false;
            }
        }
        self.inner.ddriver_flush()
    }

    fn ddriver_info(&self) -> DiskInfo {
        self.inner.ddriver_info()
    }
}

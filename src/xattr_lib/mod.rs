//! Extended attributes stored in a single ext2-style block per node.
//!
//! The engine is generic over two collaborators: a [`BlockCache`] that hands
//! out block-sized buffers, and an [`AttrNode`] that remembers which block
//! (if any) holds the node's attributes. [`Xattrs`] layers the list, get and
//! set operations on top of them.
pub mod block;
pub mod desc;
pub mod error;
pub mod fs;
pub mod hash;
pub mod mutate;
pub mod prefix;
pub mod utils;

pub use error::{XattrError, XattrResult};
pub use hash::{NoHash, XattrHash};

use crate::xattr_lib::desc::*;
use log::debug;
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Source of block-sized buffers keyed by block number. Block number 0 is
/// reserved to mean "no block".
pub trait BlockCache {
    fn block_size(&self) -> usize;
    fn fetch_block(&mut self, blkno: u32) -> XattrResult<&mut [u8]>;
    fn allocate_block(&mut self, goal: u32) -> XattrResult<u32>;
    fn mark_dirty(&mut self, blkno: u32);
}

impl<C: BlockCache + ?Sized> BlockCache for &mut C {
    fn block_size(&self) -> usize {
        (**self).block_size()
    }
    fn fetch_block(&mut self, blkno: u32) -> XattrResult<&mut [u8]> {
        (**self).fetch_block(blkno)
    }
    fn allocate_block(&mut self, goal: u32) -> XattrResult<u32> {
        (**self).allocate_block(goal)
    }
    fn mark_dirty(&mut self, blkno: u32) {
        (**self).mark_dirty(blkno)
    }
}

/// A node that can point at one attribute block.
pub trait AttrNode {
    /// Current attribute block, 0 when none is attached.
    fn attr_block(&self) -> u32;
    fn set_attr_block(&mut self, blkno: u32);
}

/// Behavior of [`Xattrs::set`] when the attribute does or does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(i32)]
pub enum SetFlags {
    /// Create or replace, whichever applies.
    None = 0,
    /// Fail with `Exists` if the attribute is already present.
    Create = 1,
    /// Fail with `NoAttr` if the attribute is absent.
    Replace = 2,
}

/// The attribute engine over a block cache and a hash policy.
pub struct Xattrs<C: BlockCache, H: XattrHash = NoHash> {
    cache: C,
    hash: H,
}

impl<C: BlockCache> Xattrs<C> {
    pub fn new(cache: C) -> Self {
        Self {
            cache,
            hash: NoHash,
        }
    }
}

impl<C: BlockCache, H: XattrHash> Xattrs<C, H> {
    pub fn with_hash(cache: C, hash: H) -> Self {
        Self { cache, hash }
    }

    pub fn cache_mut(&mut self) -> &mut C {
        &mut self.cache
    }

    pub fn into_cache(self) -> C {
        self.cache
    }

    /// Write the NUL-separated full names of the node's attributes into
    /// `buffer`, or with `buffer = None` just report the byte count needed.
    ///
    /// When the buffer runs out mid-list the names already copied are left
    /// in place and `Range` is returned.
    pub fn list(
        &mut self,
        node: &impl AttrNode,
        mut buffer: Option<&mut [u8]>,
        len: &mut usize,
    ) -> XattrResult<()> {
        let blkno = node.attr_block();
        if blkno == 0 {
            *len = 0;
            return Ok(());
        }
        let block = self.cache.fetch_block(blkno)?;
        block::validate(block)?;

        let mut total = 0usize;
        for item in block::entries(block) {
            let (offset, entry) = item?;
            let prefix = prefix::prefix_of(entry.e_name_index)?;
            let name = entry.name_at(block, offset);
            let full = prefix.len() + name.len() + 1;
            if let Some(buf) = buffer.as_deref_mut() {
                if total + full > buf.len() {
                    return Err(XattrError::Range);
                }
                buf[total..total + prefix.len()].copy_from_slice(prefix.as_bytes());
                buf[total + prefix.len()..total + prefix.len() + name.len()]
                    .copy_from_slice(name);
                buf[total + full - 1] = 0;
            }
            total += full;
        }
        *len = total;
        Ok(())
    }

    /// Copy the value of `name` into `buffer`, or with `buffer = None` just
    /// report its size.
    pub fn get(
        &mut self,
        node: &impl AttrNode,
        name: &str,
        buffer: Option<&mut [u8]>,
        len: &mut usize,
    ) -> XattrResult<()> {
        let (index, suffix) = prefix::split_name(name)?;
        let blkno = node.attr_block();
        if blkno == 0 {
            return Err(XattrError::NoAttr);
        }
        let block = self.cache.fetch_block(blkno)?;
        block::validate(block)?;
        let (_, entry) = block::find(block, index, suffix.as_bytes())?.ok_or(XattrError::NoAttr)?;
        let value = entry.value_at(block);
        if let Some(buf) = buffer {
            if buf.len() < value.len() {
                return Err(XattrError::Range);
            }
            buf[..value.len()].copy_from_slice(value);
        }
        *len = value.len();
        Ok(())
    }

    /// Create, replace or remove (`value = None`) the attribute `name`.
    ///
    /// The attribute block is allocated on first use and attached to the
    /// node only after the write has succeeded.
    pub fn set(
        &mut self,
        node: &mut impl AttrNode,
        name: &str,
        value: Option<&[u8]>,
        flags: SetFlags,
    ) -> XattrResult<()> {
        let (index, suffix) = prefix::split_name(name)?;
        if suffix.len() > u8::MAX as usize {
            return Err(XattrError::Range);
        }
        if value.is_none() && flags != SetFlags::None {
            return Err(XattrError::InvalidRequest);
        }
        if self.cache.block_size() > XATTR_MAX_BLOCK_SIZE {
            return Err(XattrError::InvalidRequest);
        }
        let vhash = match value {
            Some(v) => self.hash.entry_hash(index, suffix.as_bytes(), v),
            None => 0,
        };

        let mut blkno = node.attr_block();
        let fresh = blkno == 0;
        if fresh {
            let v = match (value, flags) {
                (None, _) | (Some(_), SetFlags::Replace) => return Err(XattrError::NoAttr),
                (Some(v), _) => v,
            };
            // an empty block can only fit so much; bail before allocating
            let room = self.cache.block_size() - XATTR_HEADER_SIZE - XATTR_PAD;
            if entry_size(suffix.len()) + xattr_align(v.len()) > room {
                return Err(XattrError::Range);
            }
            blkno = self.cache.allocate_block(0)?;
            debug!("allocated xattr block {} for node", blkno);
        }

        let block = self.cache.fetch_block(blkno)?;
        if fresh {
            block::init_block(block);
        } else {
            block::validate(block)?;
        }

        let scan = block::scan(block, index, suffix.as_bytes())?;
        debug!(
            "set {}: found={} location={} rest={}",
            name, scan.found, scan.location, scan.rest
        );
        match (value, scan.found, flags) {
            (Some(_), true, SetFlags::Create) => return Err(XattrError::Exists),
            (Some(_), false, SetFlags::Replace) | (None, false, _) => {
                return Err(XattrError::NoAttr)
            }
            (Some(v), false, _) => {
                mutate::entry_create(block, &scan, index, suffix.as_bytes(), v, vhash)?
            }
            (Some(v), true, _) => mutate::entry_replace(block, &scan, scan.location, v, vhash)?,
            (None, true, _) => mutate::entry_remove(block, &scan, scan.location)?,
        }

        let mut header = XattrBlockHeader::read_at(block)?;
        header.h_hash = self.hash.block_hash(block);
        header.write_at(block);
        self.cache.mark_dirty(blkno);
        if fresh {
            node.set_attr_block(blkno);
        }
        Ok(())
    }
}

//! On-disk format of the extended-attribute block.
//!
//! The layout follows the ext2 extended-attribute block: a fixed header at
//! offset 0, variable-length entry records packed upward right after it, a
//! 4-byte zero word terminating the entry list, and attribute values packed
//! downward from the end of the block. All multibyte fields are little
//! endian.
use crate::xattr_lib::error::{XattrError, XattrResult};
use std::mem::size_of;
use zerocopy::{AsBytes, FromBytes};

/* Magic value in attribute blocks */
pub const XATTR_BLOCK_MAGIC: u32 = 0xEA020000;

/* Maximum number of references to one attribute block */
pub const XATTR_REFCOUNT_MAX: u32 = 1024;

/* Entry alignment in the attribute block */
pub const XATTR_PAD: usize = 4;
pub const XATTR_ROUND: usize = XATTR_PAD - 1;

/* Largest block size mutations accept: value offsets are 16 bit, and a
   zero-size value's offset is the low-water mark, which starts at
   block_size */
pub const XATTR_MAX_BLOCK_SIZE: usize = u16::MAX as usize + 1 - XATTR_PAD;

/// Byte count rounded up to the nearest multiple of 4.
pub const fn xattr_align(x: usize) -> usize {
    (x + XATTR_ROUND) & !XATTR_ROUND
}

/// Attribute block header.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes)]
#[repr(C)]
pub struct XattrBlockHeader {
    pub h_magic: u32,           /* magic number for identification */
    pub h_refcount: u32,        /* reference count */
    pub h_blocks: u32,          /* number of disk blocks used, always 1 */
    pub h_hash: u32,            /* hash value of all attributes */
    pub h_reserved: [u32; 4],   /* zero right now */
}

pub const XATTR_HEADER_SIZE: usize = size_of::<XattrBlockHeader>();

/// Fixed part of an attribute entry; `e_name_len` raw suffix bytes follow,
/// then zero padding up to [`entry_size`].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, AsBytes, FromBytes)]
#[repr(C)]
pub struct XattrEntry {
    pub e_name_len: u8,     /* length of name suffix, prefix excluded */
    pub e_name_index: u8,   /* namespace index */
    pub e_value_offs: u16,  /* offset of value from block start */
    pub e_value_block: u32, /* block holding the value, always 0 */
    pub e_value_size: u32,  /* size of attribute value in bytes */
    pub e_hash: u32,        /* hash value of name and value */
}

pub const XATTR_ENTRY_FIXED: usize = size_of::<XattrEntry>();

/// Aligned size of an entry record, name suffix included.
pub const fn entry_size(name_len: usize) -> usize {
    xattr_align(XATTR_ENTRY_FIXED + name_len)
}

/// Offset of the first entry.
pub const fn first_entry() -> usize {
    XATTR_HEADER_SIZE
}

/// Offset of the entry after the one at `offset`.
pub fn next_entry(offset: usize, entry: &XattrEntry) -> usize {
    offset + entry_size(entry.e_name_len as usize)
}

/// Whether `offset` holds the end-of-list word. Running off the end of the
/// buffer also terminates the walk; [`XattrEntry::read_at`] reports that case
/// as corruption when an entry is actually expected there.
pub fn is_last_entry(block: &[u8], offset: usize) -> bool {
    match block.get(offset..offset + XATTR_PAD) {
        Some(word) => word == [0u8; XATTR_PAD],
        None => true,
    }
}

impl XattrBlockHeader {
    pub fn read_at(block: &[u8]) -> XattrResult<Self> {
        Self::read_from(
            block
                .get(..XATTR_HEADER_SIZE)
                .ok_or(XattrError::Corrupt("block shorter than header"))?,
        )
        .ok_or(XattrError::Corrupt("unreadable header"))
    }

    pub fn write_at(&self, block: &mut [u8]) {
        block[..XATTR_HEADER_SIZE].copy_from_slice(self.as_bytes());
    }
}

impl XattrEntry {
    /// Decode the fixed entry part at `offset`, with bounds and reserved
    /// field checks.
    pub fn read_at(block: &[u8], offset: usize) -> XattrResult<Self> {
        let raw = block
            .get(offset..offset + XATTR_ENTRY_FIXED)
            .ok_or(XattrError::Corrupt("entry past end of block"))?;
        let entry = Self::read_from(raw).ok_or(XattrError::Corrupt("unreadable entry"))?;
        let end = offset + entry_size(entry.e_name_len as usize);
        if end + XATTR_PAD > block.len() {
            return Err(XattrError::Corrupt("entry name past end of block"));
        }
        if entry.e_value_block != 0 {
            // reserved for a multi-block extension this format never grew
            return Err(XattrError::Corrupt("non-zero value block"));
        }
        let offs = entry.e_value_offs as usize;
        if offs + xattr_align(entry.e_value_size as usize) > block.len() || offs < XATTR_HEADER_SIZE
        {
            return Err(XattrError::Corrupt("value out of block range"));
        }
        Ok(entry)
    }

    pub fn write_at(&self, block: &mut [u8], offset: usize) {
        block[offset..offset + XATTR_ENTRY_FIXED].copy_from_slice(self.as_bytes());
    }

    /// Name suffix bytes of the entry at `offset`.
    pub fn name_at<'a>(&self, block: &'a [u8], offset: usize) -> &'a [u8] {
        let start = offset + XATTR_ENTRY_FIXED;
        &block[start..start + self.e_name_len as usize]
    }

    /// Value bytes of the entry (unaligned size).
    pub fn value_at<'a>(&self, block: &'a [u8]) -> &'a [u8] {
        let start = self.e_value_offs as usize;
        &block[start..start + self.e_value_size as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn struct_sizes() {
        assert_eq!(XATTR_HEADER_SIZE, 32);
        assert_eq!(XATTR_ENTRY_FIXED, 16);
    }

    #[test]
    fn alignment() {
        assert_eq!(xattr_align(0), 0);
        assert_eq!(xattr_align(1), 4);
        assert_eq!(xattr_align(4), 4);
        assert_eq!(xattr_align(7), 8);
        assert_eq!(entry_size(7), 24);
        assert_eq!(entry_size(0), 16);
    }

    #[test]
    fn cursor_walk() {
        let mut block = vec![0u8; 256];
        let entry = XattrEntry {
            e_name_len: 3,
            e_name_index: 1,
            e_value_offs: 252,
            e_value_block: 0,
            e_value_size: 4,
            e_hash: 0,
        };
        entry.write_at(&mut block, first_entry());
        block[first_entry() + XATTR_ENTRY_FIXED..first_entry() + XATTR_ENTRY_FIXED + 3]
            .copy_from_slice(b"abc");
        assert!(!is_last_entry(&block, first_entry()));
        let read = XattrEntry::read_at(&block, first_entry()).unwrap();
        assert_eq!(read, entry);
        assert_eq!(read.name_at(&block, first_entry()), b"abc");
        let next = next_entry(first_entry(), &read);
        assert_eq!(next, first_entry() + 20);
        assert!(is_last_entry(&block, next));
    }

    #[test]
    fn reserved_value_block_is_corruption() {
        let mut block = vec![0u8; 256];
        let entry = XattrEntry {
            e_name_len: 1,
            e_name_index: 1,
            e_value_offs: 252,
            e_value_block: 2,
            e_value_size: 0,
            e_hash: 0,
        };
        entry.write_at(&mut block, first_entry());
        assert!(matches!(
            XattrEntry::read_at(&block, first_entry()),
            Err(XattrError::Corrupt(_))
        ));
    }

    #[test]
    fn truncated_entry_is_corruption() {
        let mut block = vec![0u8; 64];
        let entry = XattrEntry {
            e_name_len: 40,
            e_name_index: 1,
            e_value_offs: 60,
            e_value_block: 0,
            e_value_size: 0,
            e_hash: 0,
        };
        entry.write_at(&mut block, first_entry());
        assert!(matches!(
            XattrEntry::read_at(&block, first_entry()),
            Err(XattrError::Corrupt(_))
        ));
    }
}

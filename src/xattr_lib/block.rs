//! Lookup and accounting over one attribute block.
//!
//! Entries are kept sorted by `(namespace index, name suffix)`, so a single
//! pass both finds an exact match and, short of one, the offset where a new
//! entry belongs. The same pass tallies the free bytes left between the
//! entry region and the value region; the mutators consume that tally.
use crate::xattr_lib::desc::*;
use crate::xattr_lib::error::{XattrError, XattrResult};
use std::cmp::Ordering;

/// Stamp a freshly allocated, zeroed block with a valid empty header.
pub fn init_block(block: &mut [u8]) {
    block.fill(0);
    let header = XattrBlockHeader {
        h_magic: XATTR_BLOCK_MAGIC,
        h_refcount: 1,
        h_blocks: 1,
        ..Default::default()
    };
    header.write_at(block);
}

/// Check magic and block count before touching anything else.
pub fn validate(block: &[u8]) -> XattrResult<XattrBlockHeader> {
    let header = XattrBlockHeader::read_at(block)?;
    if header.h_magic != XATTR_BLOCK_MAGIC {
        return Err(XattrError::Corrupt("bad magic"));
    }
    if header.h_blocks != 1 {
        return Err(XattrError::Corrupt("block count is not 1"));
    }
    Ok(header)
}

/// Iterator over `(offset, entry)` pairs, ending at the terminator word.
pub struct EntryWalk<'a> {
    block: &'a [u8],
    offset: usize,
}

pub fn entries(block: &[u8]) -> EntryWalk<'_> {
    EntryWalk {
        block,
        offset: first_entry(),
    }
}

impl<'a> Iterator for EntryWalk<'a> {
    type Item = XattrResult<(usize, XattrEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if is_last_entry(self.block, self.offset) {
            return None;
        }
        match XattrEntry::read_at(self.block, self.offset) {
            Ok(entry) => {
                let offset = self.offset;
                self.offset = next_entry(offset, &entry);
                Some(Ok((offset, entry)))
            }
            Err(e) => {
                // stop the walk, a broken entry makes the tail unreachable
                self.offset = self.block.len();
                Some(Err(e))
            }
        }
    }
}

/// Ordering of a requested `(index, name)` key against a stored entry.
fn compare(index: u8, name: &[u8], block: &[u8], offset: usize, entry: &XattrEntry) -> Ordering {
    (index, name).cmp(&(entry.e_name_index, entry.name_at(block, offset)))
}

/// Result of a write-side scan.
#[derive(Debug, Clone, Copy)]
pub struct Scan {
    /// Exact match found at `location`.
    pub found: bool,
    /// Matched entry, or the offset a new entry must be inserted at.
    pub location: usize,
    /// Offset of the end-of-list word.
    pub last: usize,
    /// Free bytes between the entry region (terminator included) and the
    /// value region.
    pub rest: usize,
    /// Lowest value offset in use; the block length when no values exist.
    pub value_low: usize,
}

/// Walk the whole entry list for a set operation: locate the match or the
/// insertion point keeping canonical order, and account the free space.
pub fn scan(block: &[u8], index: u8, name: &[u8]) -> XattrResult<Scan> {
    let mut found = false;
    let mut match_at = 0usize;
    let mut insert_at: Option<usize> = None;
    let mut value_low = block.len();
    let mut used_values = 0usize;
    let mut last = first_entry();

    for item in entries(block) {
        let (offset, entry) = item?;
        if !found {
            match compare(index, name, block, offset, &entry) {
                Ordering::Equal => {
                    found = true;
                    match_at = offset;
                }
                Ordering::Less => {
                    if insert_at.is_none() {
                        insert_at = Some(offset);
                    }
                }
                Ordering::Greater => {}
            }
        }
        used_values += xattr_align(entry.e_value_size as usize);
        if entry.e_value_size > 0 {
            value_low = value_low.min(entry.e_value_offs as usize);
        }
        last = next_entry(offset, &entry);
    }

    let used_entries = last - XATTR_HEADER_SIZE + XATTR_PAD;
    let rest = block
        .len()
        .checked_sub(XATTR_HEADER_SIZE)
        .and_then(|r| r.checked_sub(used_values))
        .and_then(|r| r.checked_sub(used_entries))
        .ok_or(XattrError::Corrupt("negative free space"))?;

    let location = if found {
        match_at
    } else {
        insert_at.unwrap_or(last)
    };
    Ok(Scan {
        found,
        location,
        last,
        rest,
        value_low,
    })
}

/// Read-side lookup: stop at the match or at the first entry sorting after
/// the requested key.
pub fn find(block: &[u8], index: u8, name: &[u8]) -> XattrResult<Option<(usize, XattrEntry)>> {
    for item in entries(block) {
        let (offset, entry) = item?;
        match compare(index, name, block, offset, &entry) {
            Ordering::Equal => return Ok(Some((offset, entry))),
            Ordering::Less => return Ok(None),
            Ordering::Greater => {}
        }
    }
    Ok(None)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Block image taken from an ext2 filesystem where
    /// `user.key_123=val_123` and `user.key_456=val_456` were set by another
    /// implementation; hash fields carry its (unreproduced) values.
    pub(crate) fn fixture_block() -> Vec<u8> {
        let mut block = vec![0u8; 4096];
        let header = XattrBlockHeader {
            h_magic: XATTR_BLOCK_MAGIC,
            h_refcount: 1,
            h_blocks: 1,
            h_hash: 1137397806,
            ..Default::default()
        };
        header.write_at(&mut block);
        let mut offset = first_entry();
        for (name, value, offs, hash) in [
            (b"key_123", b"val_123", 4088u16, 1828335412u32),
            (b"key_456", b"val_456", 4080u16, 1828666580u32),
        ] {
            let entry = XattrEntry {
                e_name_len: name.len() as u8,
                e_name_index: 1,
                e_value_offs: offs,
                e_value_block: 0,
                e_value_size: value.len() as u32,
                e_hash: hash,
            };
            entry.write_at(&mut block, offset);
            block[offset + XATTR_ENTRY_FIXED..offset + XATTR_ENTRY_FIXED + name.len()]
                .copy_from_slice(name);
            block[offs as usize..offs as usize + value.len()].copy_from_slice(value);
            offset = next_entry(offset, &entry);
        }
        block
    }

    #[test]
    fn validate_fixture() {
        let block = fixture_block();
        let header = validate(&block).unwrap();
        assert_eq!(header.h_hash, 1137397806);
    }

    #[test]
    fn validate_rejects_bad_magic() {
        let mut block = fixture_block();
        // 0xEA, the only non-zero byte of the little-endian magic
        block[3] = 0;
        assert!(matches!(validate(&block), Err(XattrError::Corrupt(_))));
    }

    #[test]
    fn validate_rejects_block_count() {
        let mut block = fixture_block();
        let mut header = XattrBlockHeader::read_at(&block).unwrap();
        header.h_blocks = 2;
        header.write_at(&mut block);
        assert!(matches!(validate(&block), Err(XattrError::Corrupt(_))));
    }

    #[test]
    fn walk_fixture() {
        let block = fixture_block();
        let list: Vec<_> = entries(&block).collect::<XattrResult<_>>().unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].0, 32);
        assert_eq!(list[1].0, 56);
        assert_eq!(list[0].1.name_at(&block, list[0].0), b"key_123");
        assert_eq!(list[1].1.e_hash, 1828666580);
        assert_eq!(list[1].1.value_at(&block), b"val_456");
    }

    #[test]
    fn find_exact_and_miss() {
        let block = fixture_block();
        let (offset, entry) = find(&block, 1, b"key_456").unwrap().unwrap();
        assert_eq!(offset, 56);
        assert_eq!(entry.e_value_offs, 4080);
        assert!(find(&block, 1, b"key_321").unwrap().is_none());
        assert!(find(&block, 7, b"key_123").unwrap().is_none());
    }

    #[test]
    fn scan_accounting() {
        let block = fixture_block();
        let scan = scan(&block, 1, b"key_456").unwrap();
        assert!(scan.found);
        assert_eq!(scan.location, 56);
        assert_eq!(scan.last, 80);
        assert_eq!(scan.value_low, 4080);
        // 4096 - 32 header - 2*8 values - 48 entries - 4 terminator
        assert_eq!(scan.rest, 4096 - 32 - 16 - 48 - 4);
    }

    #[test]
    fn scan_insertion_points() {
        let block = fixture_block();
        // sorts before both entries
        let scan_front = scan(&block, 1, b"aaa").unwrap();
        assert!(!scan_front.found);
        assert_eq!(scan_front.location, 32);
        // sorts between the two
        let scan_mid = scan(&block, 1, b"key_300").unwrap();
        assert!(!scan_mid.found);
        assert_eq!(scan_mid.location, 56);
        // sorts after both, and gnu (7) sorts after user (1)
        let scan_end = scan(&block, 1, b"zzz").unwrap();
        assert!(!scan_end.found);
        assert_eq!(scan_end.location, 80);
        let scan_gnu = scan(&block, 7, b"aaa").unwrap();
        assert_eq!(scan_gnu.location, 80);
    }

    #[test]
    fn scan_empty_block() {
        let mut block = vec![0u8; 4096];
        init_block(&mut block);
        let scan = scan(&block, 1, b"name").unwrap();
        assert!(!scan.found);
        assert_eq!(scan.location, 32);
        assert_eq!(scan.last, 32);
        assert_eq!(scan.value_low, 4096);
        assert_eq!(scan.rest, 4096 - 32 - 4);
    }

    #[test]
    fn scan_overfull_block_is_corruption() {
        let mut block = fixture_block();
        let mut entry = XattrEntry::read_at(&block, 32).unwrap();
        // 4008 + the 8-byte second value + 52 entry-region bytes claims
        // more than the 4064 bytes past the header
        entry.e_value_size = 4008;
        entry.e_value_offs = 64;
        entry.write_at(&mut block, 32);
        assert!(matches!(
            scan(&block, 1, b"key_123"),
            Err(XattrError::Corrupt(_))
        ));
    }
}

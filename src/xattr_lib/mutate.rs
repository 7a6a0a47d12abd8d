//! In-place mutation of one attribute block.
//!
//! All three operations keep the block's layout invariants: entries packed
//! upward from the header in canonical order, values packed downward from
//! the block end, every unused byte zero. A failed operation leaves the
//! block byte-identical to its state on entry.
use crate::xattr_lib::block::Scan;
use crate::xattr_lib::desc::*;
use crate::xattr_lib::error::{XattrError, XattrResult};

/// Insert a new entry at `scan.location` with its value packed below
/// `scan.value_low`. The caller has already established that no entry with
/// this key exists and computed the entry hash.
pub fn entry_create(
    block: &mut [u8],
    scan: &Scan,
    index: u8,
    name: &[u8],
    value: &[u8],
    hash: u32,
) -> XattrResult<()> {
    let esize = entry_size(name.len());
    let vsize = xattr_align(value.len());
    if esize + vsize > scan.rest {
        return Err(XattrError::Range);
    }

    // open a gap in the entry region; the bytes past the old terminator are
    // zero, so the terminator lands shifted along with the tail
    block.copy_within(scan.location..scan.last, scan.location + esize);

    let offs = scan.value_low - vsize;
    let entry = XattrEntry {
        e_name_len: name.len() as u8,
        e_name_index: index,
        e_value_offs: offs as u16,
        e_value_block: 0,
        e_value_size: value.len() as u32,
        e_hash: hash,
    };
    entry.write_at(block, scan.location);
    let name_at = scan.location + XATTR_ENTRY_FIXED;
    block[name_at..name_at + name.len()].copy_from_slice(name);
    block[name_at + name.len()..scan.location + esize].fill(0);
    block[offs..offs + value.len()].copy_from_slice(value);
    block[offs + value.len()..offs + vsize].fill(0);
    Ok(())
}

/// Drop the entry at `offset`, closing both the entry gap and the value gap
/// and re-pointing every surviving entry whose value sat below the removed
/// one.
pub fn entry_remove(block: &mut [u8], scan: &Scan, offset: usize) -> XattrResult<()> {
    let entry = XattrEntry::read_at(block, offset)?;
    let vsize = xattr_align(entry.e_value_size as usize);
    let offs = entry.e_value_offs as usize;

    if vsize > 0 {
        block.copy_within(scan.value_low..offs, scan.value_low + vsize);
        block[scan.value_low..scan.value_low + vsize].fill(0);
        fixup_offsets(block, offset, offs, vsize as u16)?;
    }

    let esize = entry_size(entry.e_name_len as usize);
    block.copy_within(offset + esize..scan.last, offset);
    block[scan.last - esize..scan.last].fill(0);
    Ok(())
}

/// Swap the value of the entry at `offset` for `value`. When the aligned
/// sizes match the old bytes are overwritten in place; otherwise the value
/// region is repacked around the new size.
pub fn entry_replace(
    block: &mut [u8],
    scan: &Scan,
    offset: usize,
    value: &[u8],
    hash: u32,
) -> XattrResult<()> {
    let mut entry = XattrEntry::read_at(block, offset)?;
    let old_vsize = xattr_align(entry.e_value_size as usize);
    let new_vsize = xattr_align(value.len());

    let offs = if new_vsize == old_vsize {
        entry.e_value_offs as usize
    } else {
        if new_vsize > old_vsize && new_vsize - old_vsize > scan.rest {
            return Err(XattrError::Range);
        }
        let offs = entry.e_value_offs as usize;
        block.copy_within(scan.value_low..offs, scan.value_low + old_vsize);
        block[scan.value_low..scan.value_low + old_vsize].fill(0);
        fixup_offsets(block, offset, offs, old_vsize as u16)?;
        scan.value_low + old_vsize - new_vsize
    };

    entry.e_value_offs = offs as u16;
    entry.e_value_size = value.len() as u32;
    entry.e_hash = hash;
    entry.write_at(block, offset);
    block[offs..offs + value.len()].copy_from_slice(value);
    block[offs + value.len()..offs + new_vsize].fill(0);
    Ok(())
}

/// After values in `[value_low, removed_offs)` moved up by `shift`, re-point
/// the entries referencing them. The entry at `skip` is the one being
/// removed or replaced and is left alone.
fn fixup_offsets(block: &mut [u8], skip: usize, removed_offs: usize, shift: u16) -> XattrResult<()> {
    let mut offset = first_entry();
    while !is_last_entry(block, offset) {
        let mut entry = XattrEntry::read_at(block, offset)?;
        let next = next_entry(offset, &entry);
        if offset != skip && entry.e_value_size > 0 && (entry.e_value_offs as usize) < removed_offs
        {
            entry.e_value_offs += shift;
            entry.write_at(block, offset);
        }
        offset = next;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xattr_lib::block::{scan, tests::fixture_block};

    fn check_layout(block: &[u8], expect: &[(&[u8], &[u8])]) {
        let mut offset = first_entry();
        let mut low = block.len();
        for (name, value) in expect {
            let entry = XattrEntry::read_at(block, offset).unwrap();
            assert_eq!(entry.name_at(block, offset), *name);
            assert_eq!(entry.value_at(block), *value);
            if entry.e_value_size > 0 {
                low = low.min(entry.e_value_offs as usize);
            }
            offset = next_entry(offset, &entry);
        }
        assert!(is_last_entry(block, offset));
        // everything between the terminator and the lowest value is zero
        assert!(block[offset + XATTR_PAD..low].iter().all(|b| *b == 0));
    }

    #[test]
    fn create_in_order() {
        let mut block = fixture_block();
        let s = scan(&block, 1, b"key_300").unwrap();
        entry_create(&mut block, &s, 1, b"key_300", b"middle!!", 7).unwrap();
        check_layout(
            &block,
            &[
                (b"key_123", b"val_123"),
                (b"key_300", b"middle!!"),
                (b"key_456", b"val_456"),
            ],
        );
        let entry = XattrEntry::read_at(&block, 56).unwrap();
        assert_eq!(entry.e_value_offs, 4072);
        assert_eq!(entry.e_hash, 7);
    }

    #[test]
    fn create_empty_value() {
        let mut block = fixture_block();
        let s = scan(&block, 7, b"translator").unwrap();
        entry_create(&mut block, &s, 7, b"translator", b"", 0).unwrap();
        check_layout(
            &block,
            &[
                (b"key_123", b"val_123"),
                (b"key_456", b"val_456"),
                (b"translator", b""),
            ],
        );
    }

    #[test]
    fn create_without_room() {
        let mut block = fixture_block();
        let before = block.clone();
        let s = scan(&block, 1, b"big").unwrap();
        let huge = vec![0xabu8; s.rest];
        assert!(matches!(
            entry_create(&mut block, &s, 1, b"big", &huge, 0),
            Err(XattrError::Range)
        ));
        assert_eq!(block, before);
    }

    #[test]
    fn remove_first_repacks_values() {
        let mut block = fixture_block();
        let s = scan(&block, 1, b"key_123").unwrap();
        assert!(s.found);
        entry_remove(&mut block, &s, s.location).unwrap();
        check_layout(&block, &[(b"key_456", b"val_456")]);
        // the surviving value moved up into the vacated slot
        let entry = XattrEntry::read_at(&block, 32).unwrap();
        assert_eq!(entry.e_value_offs, 4088);
    }

    #[test]
    fn remove_last_keeps_other_offsets() {
        let mut block = fixture_block();
        let s = scan(&block, 1, b"key_456").unwrap();
        entry_remove(&mut block, &s, s.location).unwrap();
        check_layout(&block, &[(b"key_123", b"val_123")]);
        let entry = XattrEntry::read_at(&block, 32).unwrap();
        assert_eq!(entry.e_value_offs, 4088);
    }

    #[test]
    fn remove_last_entry_leaves_empty_block() {
        let mut block = fixture_block();
        let s = scan(&block, 1, b"key_123").unwrap();
        entry_remove(&mut block, &s, s.location).unwrap();
        let s = scan(&block, 1, b"key_456").unwrap();
        entry_remove(&mut block, &s, s.location).unwrap();
        check_layout(&block, &[]);
        assert_eq!(scan(&block, 1, b"x").unwrap().rest, 4096 - 32 - 4);
    }

    #[test]
    fn replace_same_aligned_size_in_place() {
        let mut block = fixture_block();
        let s = scan(&block, 1, b"key_123").unwrap();
        entry_replace(&mut block, &s, s.location, b"new_1", 9).unwrap();
        check_layout(&block, &[(b"key_123", b"new_1"), (b"key_456", b"val_456")]);
        let entry = XattrEntry::read_at(&block, 32).unwrap();
        assert_eq!(entry.e_value_offs, 4088);
        assert_eq!(entry.e_value_size, 5);
        // other entry untouched
        assert_eq!(XattrEntry::read_at(&block, 56).unwrap().e_value_offs, 4080);
    }

    #[test]
    fn replace_grow_repacks() {
        let mut block = fixture_block();
        let s = scan(&block, 1, b"key_456").unwrap();
        entry_replace(&mut block, &s, s.location, b"a_longer_value", 9).unwrap();
        check_layout(
            &block,
            &[(b"key_123", b"val_123"), (b"key_456", b"a_longer_value")],
        );
        let first = XattrEntry::read_at(&block, 32).unwrap();
        let second = XattrEntry::read_at(&block, 56).unwrap();
        // key_123's value slid up into key_456's old slot
        assert_eq!(first.e_value_offs, 4088);
        assert_eq!(second.e_value_offs, 4072);
    }

    #[test]
    fn replace_shrink_repacks() {
        let mut block = fixture_block();
        let s = scan(&block, 1, b"key_123").unwrap();
        entry_replace(&mut block, &s, s.location, b"v", 9).unwrap();
        check_layout(&block, &[(b"key_123", b"v"), (b"key_456", b"val_456")]);
        let first = XattrEntry::read_at(&block, 32).unwrap();
        let second = XattrEntry::read_at(&block, 56).unwrap();
        // key_456's value slid up past the freed slot
        assert_eq!(second.e_value_offs, 4088);
        assert_eq!(first.e_value_offs, 4084);
    }

    #[test]
    fn replace_grow_to_exact_fit() {
        let mut block = fixture_block();
        let s = scan(&block, 1, b"key_123").unwrap();
        // old aligned size 8, so rest + 8 grows by exactly rest
        let exact = vec![0x22u8; s.rest + 8];
        entry_replace(&mut block, &s, s.location, &exact, 0).unwrap();
        check_layout(
            &block,
            &[(b"key_123", exact.as_slice()), (b"key_456", b"val_456")],
        );
        assert_eq!(scan(&block, 1, b"x").unwrap().rest, 0);
    }

    #[test]
    fn replace_grow_without_room() {
        let mut block = fixture_block();
        let before = block.clone();
        let s = scan(&block, 1, b"key_123").unwrap();
        // one alignment step past the exact fit
        let huge = vec![0x11u8; s.rest + 12];
        assert!(matches!(
            entry_replace(&mut block, &s, s.location, &huge, 0),
            Err(XattrError::Range)
        ));
        assert_eq!(block, before);
    }
}

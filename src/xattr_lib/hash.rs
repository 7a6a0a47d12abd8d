//! Hash fields of the attribute block.
//!
//! The format reserves a per-entry and a per-block hash word, and blocks
//! written by other implementations carry non-zero values there, but the
//! algorithm is not pinned by any behavior available to this engine. The
//! hash is therefore injectable; [`NoHash`] writes zeroes, which readers of
//! this engine never verify. Read-only operations leave all stored hashes in
//! foreign blocks alone, and mutations leave unrelated entries' per-entry
//! hashes in place, but every mutation recomputes the block-level hash with
//! the configured implementation.
pub trait XattrHash {
    /// Hash of one attribute: namespace index, name suffix and value.
    fn entry_hash(&self, name_index: u8, name: &[u8], value: &[u8]) -> u32;
    /// Aggregate hash over the whole block, recomputed after a mutation.
    fn block_hash(&self, block: &[u8]) -> u32;
}

/// Placeholder hash: all fields written as zero.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoHash;

impl XattrHash for NoHash {
    fn entry_hash(&self, _name_index: u8, _name: &[u8], _value: &[u8]) -> u32 {
        0
    }

    fn block_hash(&self, _block: &[u8]) -> u32 {
        0
    }
}

//! Namespace codec.
//!
//! Attribute name prefixes are stored as small numbers on disk. The table is
//! fixed; a full name with no matching prefix, or a stored index outside the
//! table, is reported as namespace-unsupported.
use crate::xattr_lib::error::{XattrError, XattrResult};

pub struct XattrPrefix {
    pub index: u8,
    pub prefix: &'static str,
}

/* Prefixes are represented as numbers when stored on disk. */
pub const XATTR_PREFIXES: [XattrPrefix; 2] = [
    XattrPrefix {
        index: 1,
        prefix: "user.",
    },
    XattrPrefix {
        index: 7,
        prefix: "gnu.",
    },
];

/// Split a full attribute name into its namespace index and name suffix,
/// taking the longest matching table prefix.
pub fn split_name(full_name: &str) -> XattrResult<(u8, &str)> {
    let mut best: Option<&XattrPrefix> = None;
    for p in XATTR_PREFIXES.iter() {
        if full_name.starts_with(p.prefix)
            && best.map_or(true, |b| p.prefix.len() > b.prefix.len())
        {
            best = Some(p);
        }
    }
    best.map(|p| (p.index, &full_name[p.prefix.len()..]))
        .ok_or(XattrError::NotSupported)
}

/// Reconstruct the name prefix for a stored namespace index.
pub fn prefix_of(index: u8) -> XattrResult<&'static str> {
    XATTR_PREFIXES
        .iter()
        .find(|p| p.index == index)
        .map(|p| p.prefix)
        .ok_or(XattrError::NotSupported)
}

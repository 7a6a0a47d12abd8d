pub use disk_driver;

pub mod xattr_lib;

pub use xattr_lib::fs::{ImageFs, Inode};
pub use xattr_lib::{AttrNode, BlockCache, SetFlags, XattrError, XattrResult, Xattrs};

//! Status taxonomy of the attribute engine.
//!
//! Every operation returns one of these statuses explicitly; the RPC-facing
//! caller translates them into its wire error codes, for which [`errno`]
//! provides the conventional mapping.
//!
//! [`errno`]: XattrError::errno
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XattrError {
    /// Name prefix not recognized, on a request name or on a stored entry.
    #[error("attribute namespace not supported")]
    NotSupported,
    /// Bad magic, block count != 1, or inconsistent internal accounting.
    /// Surfaced verbatim, never auto-repaired.
    #[error("invalid extended attribute block: {0}")]
    Corrupt(&'static str),
    /// No attribute block at all, or no entry matching the name.
    #[error("no such attribute")]
    NoAttr,
    /// Destination buffer too small, or no room left in the block.
    #[error("insufficient space")]
    Range,
    /// CREATE requested for an existing attribute.
    #[error("attribute already exists")]
    Exists,
    /// Delete (null value) combined with CREATE or REPLACE.
    #[error("invalid flags for request")]
    InvalidRequest,
    /// Failure in the disk or cache layer underneath.
    #[error("i/o error: {0}")]
    Io(String),
}

pub type XattrResult<T> = Result<T, XattrError>;

impl XattrError {
    /// The errno an RPC layer would report for this status.
    pub fn errno(&self) -> i32 {
        match self {
            XattrError::NotSupported => libc::EOPNOTSUPP,
            XattrError::Corrupt(_) => libc::EIO,
            XattrError::NoAttr => libc::ENODATA,
            XattrError::Range => libc::ERANGE,
            XattrError::Exists => libc::EEXIST,
            XattrError::InvalidRequest => libc::EINVAL,
            XattrError::Io(_) => libc::EIO,
        }
    }
}

impl From<anyhow::Error> for XattrError {
    fn from(err: anyhow::Error) -> Self {
        XattrError::Io(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(XattrError::NotSupported.errno(), libc::EOPNOTSUPP);
        assert_eq!(XattrError::Corrupt("x").errno(), libc::EIO);
        assert_eq!(XattrError::NoAttr.errno(), libc::ENODATA);
        assert_eq!(XattrError::Range.errno(), libc::ERANGE);
        assert_eq!(XattrError::Exists.errno(), libc::EEXIST);
        assert_eq!(XattrError::InvalidRequest.errno(), libc::EINVAL);
    }
}

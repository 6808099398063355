//! Error taxonomy (see spec §7): path-not-found, storage-failure,
//! invalid-state and unsupported faults, each with a defined errno
//! mapping for the FUSE bridge.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    /// A component on a resolution path does not exist.
    #[error("no such entry")]
    NotFound,

    /// The key-value engine returned a non-OK result. Fatal: callers are
    /// expected to log the diagnostic and terminate.
    #[error("storage failure: {0}")]
    Storage(String),

    /// An on-disk record had unexpected shape at init time. Fatal.
    #[error("invalid on-disk state: {0}")]
    InvalidState(String),

    /// Logical block index beyond the double-indirect limit.
    #[error("file too large")]
    FileTooLarge,

    /// Filename longer than 240 bytes (including terminator).
    #[error("name too long")]
    NameTooLong,

    /// Attempted to create an entry that already exists in its parent.
    #[error("entry already exists")]
    AlreadyExists,

    /// Attempted to resolve through a non-directory path component.
    #[error("not a directory")]
    NotADirectory,
}

impl FsError {
    /// Negative errno as the bridge/core operations return it. Returns
    /// `None` for faults spec §7 defines as fatal (storage failures and
    /// invalid on-disk state): those must propagate and terminate the
    /// process rather than surface to a caller as an error code.
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::Storage(_) => libc::EIO,
            FsError::InvalidState(_) => libc::EIO,
            FsError::FileTooLarge => libc::EFBIG,
            FsError::NameTooLong => libc::ENAMETOOLONG,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::NotADirectory => libc::ENOTDIR,
        }
    }

    /// Whether this error is one spec §7 calls fatal: the process should
    /// log the diagnostic and terminate rather than let the bridge
    /// surface an errno.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FsError::Storage(_) | FsError::InvalidState(_))
    }
}

pub type FsResult<T> = Result<T, FsError>;

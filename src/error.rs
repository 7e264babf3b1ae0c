//! Error types returned by the compound file engine.

use thiserror::Error;

/// Errors that can be returned by any operation on a [`crate::CompoundFile`], [`crate::Storage`]
/// or [`crate::Stream`].
///
/// These map onto the `HRESULT`-style error codes of the underlying storage model, without
/// carrying any Windows-specific baggage.
#[derive(Debug, Error)]
pub enum CfbError {
    /// A required argument was missing or malformed (empty name, zero-length buffer where one was
    /// expected, ...).
    #[error("invalid argument")]
    InvalidArg,

    /// A name exceeds the 31 UTF-16 code unit limit (32 including the terminating NUL).
    #[error("name exceeds the maximum length of 31 UTF-16 code units")]
    InvalidName,

    /// No storage or stream with the requested name exists in the current directory.
    #[error("file not found")]
    FileNotFound,

    /// An element with that name already exists and the caller did not request creation.
    #[error("file already exists")]
    FileAlreadyExists,

    /// An allocation failed.
    #[error("insufficient memory")]
    InsufficientMemory,

    /// The file header is truncated, has a bad magic number, or otherwise fails validation.
    #[error("invalid compound file header")]
    InvalidHeader,

    /// The file is a pre-release (beta) compound file, identified by its legacy magic number.
    #[error("old (beta) compound file format is not supported")]
    OldFormat,

    /// Corruption was detected while walking a block or property chain: an out-of-range pointer,
    /// a chain that does not terminate, or similar.
    ///
    /// This is always fatal to the operation in progress; no repair is attempted.
    #[error("compound file is corrupted: {0}")]
    Corruption(String),

    /// The requested functionality is intentionally unimplemented (`Commit`, `Revert`, `CopyTo`,
    /// `MoveElementTo`, `SetElementTimes`, `SetStateBits`, ...).
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// An I/O error occurred while talking to the host file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias for results returned by this crate.
pub type CfbResult<T> = Result<T, CfbError>;

//! Error taxonomy shared by every layer of the engine.
//!
//! Kept panic-free in the same spirit as this codebase's parsing layers:
//! a caller should never see an `unwrap`-induced panic bubble out of a
//! public method. `AddressOutOfRange` is the one variant that represents a
//! genuine internal bug (a translation the index should never have been
//! asked to perform); it optionally carries a backtrace, gated the same way
//! the rest of this codebase gates its `backtrace` feature.

use std::path::PathBuf;

/// The result type used throughout the engine.
pub type Result<T> = std::result::Result<T, BufferError>;

/// The cause of a page-load failure, attached to `BufferError::LoadFailure`
/// and to the `Reason` carried by a `MissingDataRange`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde1", derive(serde::Serialize, serde::Deserialize))]
pub enum LoadFailureReason {
    FileDeleted,
    FileTruncated,
    PermissionDenied,
    StorageFailure,
    DataCorruption,
}

impl std::fmt::Display for LoadFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LoadFailureReason::FileDeleted => "file deleted",
            LoadFailureReason::FileTruncated => "file truncated",
            LoadFailureReason::PermissionDenied => "permission denied",
            LoadFailureReason::StorageFailure => "storage failure",
            LoadFailureReason::DataCorruption => "data corruption",
        };
        f.write_str(s)
    }
}

/// A captured call-site for an internal/programmer-error variant, mirroring
/// this codebase's `InternalError { msg, file, line, backtrace }` pattern.
#[derive(Debug)]
pub struct InternalContext {
    pub msg: String,
    pub file: &'static str,
    pub line: u32,
    #[cfg(feature = "backtrace")]
    pub backtrace: backtrace::Backtrace,
}

impl std::fmt::Display for InternalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}:{})", self.msg, self.file, self.line)
    }
}

/// Builds an [`InternalContext`] at the call site, capturing a backtrace
/// when the `backtrace` feature is enabled.
#[macro_export]
macro_rules! internal_context {
    ($msg:expr) => {
        $crate::error::InternalContext {
            msg: $msg.to_string(),
            file: file!(),
            line: line!(),
            #[cfg(feature = "backtrace")]
            backtrace: backtrace::Backtrace::new(),
        }
    };
}

/// Every error the engine's public API can return.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// A negative/out-of-range argument was passed to a mutation: an insert
    /// position past the end of the buffer, or a delete range with
    /// `start > end`.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal address-translation failure. Reaching this variant means
    /// the address index's partition invariant was violated; that is a
    /// programmer error in this crate, not a caller mistake.
    #[error("address out of range: {0}")]
    AddressOutOfRange(InternalContext),

    /// `saveFile` was called without a filename and the buffer has never
    /// been associated with one.
    #[error("no filename to save to")]
    NoFilename,

    /// `saveFile` targeted the original path while the buffer is detached
    /// and `force_partial_save` was not set.
    #[error("refusing to save detached buffer to original path {0:?} without forcing")]
    DetachedSave(PathBuf),

    /// A page could not be loaded from its original file or from the
    /// storage back-end.
    #[error("failed to load page {page_key:?}: {reason}")]
    LoadFailure {
        page_key: String,
        reason: LoadFailureReason,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A dirty page could not be written back to the storage back-end
    /// during eviction or explicit save-back.
    #[error("failed to save page {page_key:?} to storage")]
    StorageSaveFailure {
        page_key: String,
        #[source]
        source: std::io::Error,
    },

    /// A `BufferConfig` could not be loaded from its source document.
    /// Synchronous and not a suspension point: it can only happen before
    /// any buffer exists.
    #[error("failed to load configuration: {0}")]
    ConfigError(String),
}

impl BufferError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        BufferError::InvalidArgument(msg.into())
    }
}

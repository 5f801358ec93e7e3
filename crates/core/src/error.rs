//! Error types for the Spanvault engine
//!
//! One taxonomy for the whole system, used by the durability and engine
//! crates alike. We use `thiserror` for `Display` and `Error` impls.
//!
//! Volume exhaustion is deliberately NOT an error: the segment writer
//! reports it as a normal outcome (`WriteOutcome::VolumeFull`) because it is
//! the expected trigger for advancing the chain to the next volume.

use crate::hash::ContentHash;
use crate::types::VolumeId;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Spanvault operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the Spanvault engine
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (file copy, catalog or journal access)
    ///
    /// Surfaced to the caller; the affected file is retried on the next
    /// resume rather than automatically in-run.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Content hash mismatch after a completed write
    ///
    /// The destination file is left in place for the operator to inspect;
    /// no transaction is recorded for it.
    #[error("integrity failure for {path}: expected {expected}, found {actual}")]
    Integrity {
        /// Destination file that failed verification
        path: PathBuf,
        /// Digest of the source bytes
        expected: ContentHash,
        /// Digest actually read back from the destination
        actual: ContentHash,
    },

    /// Malformed volume catalog; fatal for the affected volume
    #[error("catalog corruption: {0}")]
    CatalogCorruption(String),

    /// Malformed run journal; fatal for the run
    #[error("journal corruption: {0}")]
    JournalCorruption(String),

    /// Chain operation attempted out of order
    ///
    /// Indicates a logic bug or operator error (e.g. a reused chain uuid),
    /// never an environmental condition. Fatal, not retried.
    #[error("sequence violation: {0}")]
    SequenceViolation(String),

    /// Resume attempted on a different host than the one that wrote the journal
    #[error("host mismatch: journal written on '{journal_host}', running on '{current_host}'")]
    HostMismatch {
        /// Host recorded in the journal header
        journal_host: String,
        /// Host performing the resume
        current_host: String,
    },

    /// Resume expected a specific volume but a different one was supplied
    #[error("volume mismatch: resume expects volume {expected}, found {found}")]
    VolumeMismatch {
        /// Volume the open segment was being written to
        expected: VolumeId,
        /// Volume actually mounted
        found: VolumeId,
    },

    /// Directory has no volume catalog
    #[error("no volume catalog found at {0}")]
    UninitializedVolume(PathBuf),

    /// Directory already holds a volume catalog and reuse was not allowed
    #[error("volume already initialized at {0}")]
    AlreadyInitialized(PathBuf),
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

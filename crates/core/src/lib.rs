//! Core types for the Spanvault backup engine
//!
//! This crate defines the foundational types shared by every layer:
//! - ChainId / VolumeId: identity for backup chains and volumes
//! - Segment / FileTransaction: the persisted chain records
//! - ContentHash: BLAKE3 content digest used for copy verification
//! - Error: the error taxonomy for the whole engine

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod hash;
pub mod segment;
pub mod types;

pub use error::{Error, Result};
pub use hash::{hash_bytes, hash_file, ContentHash, StreamingHasher};
pub use segment::{FileTransaction, Segment, VolumeInfo};
pub use types::{ChainId, Timestamp, VolumeId, RECORD_VERSION};

//! Chain records: segments, file transactions, volume identity
//!
//! A chain is realized as independent, order-tagged records rather than
//! linked structures: segments are keyed by `(chain_id, sequence_number)`
//! and carry no cross-references. The reconstruction planner rebuilds the
//! chain on demand from whatever volumes are present.

use crate::hash::ContentHash;
use crate::types::{ChainId, Timestamp, VolumeId, RECORD_VERSION};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Record of one successfully copied and verified file
///
/// Immutable once created. `dest_path` is relative to the root of the
/// volume the file landed on (starting with the host namespace folder), so
/// records stay valid wherever the volume is later mounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTransaction {
    /// Absolute path of the source file on the originating host
    pub source_path: PathBuf,
    /// Path of the copy, relative to the volume root
    pub dest_path: PathBuf,
    /// When the copy was verified
    pub timestamp: Timestamp,
    /// Size of the file in bytes
    pub size: u64,
    /// Digest of the source bytes, reconfirmed against the destination
    pub content_hash: ContentHash,
    /// Record format version
    pub version: u32,
}

/// One contiguous portion of a chain as stored on one volume
///
/// A segment is created when a run starts or when the active volume is
/// exhausted, and sealed (made immutable in a volume catalog) when the
/// volume fills or the run completes. At most one segment per chain is ever
/// open at a time; the chain sequencer owns it until sealing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Chain this segment belongs to
    pub chain_id: ChainId,
    /// Position within the chain; assigned strictly increasing from 0
    pub sequence_number: u64,
    /// When this segment was opened
    pub timestamp: Timestamp,
    /// Host that produced the segment
    pub host: String,
    /// Optional operator-supplied name for the backup
    pub name: Option<String>,
    /// Optional operator-supplied comment
    pub comment: Option<String>,
    /// Record format version
    pub version: u32,
    /// Directories the backup was asked to cover
    pub backup_dirs: Vec<PathBuf>,
    /// Files committed to this segment, in copy order
    pub files: Vec<FileTransaction>,
    /// True only on the terminal segment of a complete chain
    pub is_final: bool,
}

impl Segment {
    /// Open the first segment of a fresh chain (sequence 0)
    pub fn open_chain(
        chain_id: ChainId,
        backup_dirs: Vec<PathBuf>,
        host: String,
        name: Option<String>,
        comment: Option<String>,
    ) -> Self {
        Self {
            chain_id,
            sequence_number: 0,
            timestamp: Utc::now(),
            host,
            name,
            comment,
            version: RECORD_VERSION,
            backup_dirs,
            files: Vec::new(),
            is_final: false,
        }
    }

    /// Open the successor of a sealed segment
    ///
    /// Copies chain identity and metadata, increments the sequence number,
    /// clears the file list, and resets `is_final`.
    pub fn successor(&self) -> Self {
        Self {
            chain_id: self.chain_id,
            sequence_number: self.sequence_number + 1,
            timestamp: Utc::now(),
            host: self.host.clone(),
            name: self.name.clone(),
            comment: self.comment.clone(),
            version: RECORD_VERSION,
            backup_dirs: self.backup_dirs.clone(),
            files: Vec::new(),
            is_final: false,
        }
    }

    /// Append a committed file transaction
    pub fn record(&mut self, transaction: FileTransaction) {
        self.files.push(transaction);
    }

    /// Whether a destination path is already committed in this segment
    pub fn has_dest(&self, dest_path: &std::path::Path) -> bool {
        self.files.iter().any(|t| t.dest_path == dest_path)
    }

    /// Content equivalence, ignoring timestamps
    ///
    /// A segment rebuilt from the journal carries fresh timestamps, so
    /// idempotence checks compare identity and content only: chain,
    /// sequence, finality, and the ordered (dest, hash) list.
    pub fn same_content(&self, other: &Segment) -> bool {
        self.chain_id == other.chain_id
            && self.sequence_number == other.sequence_number
            && self.is_final == other.is_final
            && self.files.len() == other.files.len()
            && self
                .files
                .iter()
                .zip(other.files.iter())
                .all(|(a, b)| a.dest_path == b.dest_path && a.content_hash == b.content_hash)
    }

    /// Total bytes committed to this segment
    pub fn bytes(&self) -> u64 {
        self.files.iter().map(|t| t.size).sum()
    }
}

/// Identity record of one volume, persisted in its catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Volume identity, assigned at initialization
    pub volume_id: VolumeId,
    /// Record format version
    pub version: u32,
}

impl VolumeInfo {
    /// Identity record for a freshly initialized volume
    pub fn new(volume_id: VolumeId) -> Self {
        Self {
            volume_id,
            version: RECORD_VERSION,
        }
    }
}

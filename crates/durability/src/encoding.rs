//! Journal entry encoding and decoding
//!
//! Entries are framed with a length prefix and a CRC32 checksum so the
//! journal can be replayed after any interruption:
//!
//! ```text
//! [length: u32][type: u8][payload: bytes][crc32: u32]
//! ```
//!
//! - **length**: size of type + payload + crc (NOT including length itself)
//! - **type**: entry type tag (1=Header, 2=FileCommitted, 3=SegmentSealed)
//! - **payload**: bincode-serialized [`JournalEntry`]
//! - **crc32**: checksum over \[type\]\[payload\]
//!
//! A truncated frame at the end of the file is a normal consequence of a
//! crash mid-append and is distinguished from mid-file corruption: the
//! decoder returns `Ok(None)` for the former and `JournalCorruption` for
//! the latter.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use spanvault_core::{ChainId, Error, FileTransaction, Result, Segment, Timestamp, VolumeId};
use uuid::Uuid;

/// Entry type tags, part of the on-disk format
const TYPE_HEADER: u8 = 1;
const TYPE_FILE_COMMITTED: u8 = 2;
const TYPE_SEGMENT_SEALED: u8 = 3;

/// One record in the run journal
///
/// The journal is append-only: a record is written only after the event it
/// describes is durable (a file verified on a volume, a segment sealed into
/// a catalog), and it is never edited or removed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JournalEntry {
    /// First record of every journal, identifying the run
    Header {
        /// Identity of this journal (one per backup invocation)
        journal_id: Uuid,
        /// Record format version
        version: u32,
        /// Host performing the backup
        host: String,
        /// When the run started
        timestamp: Timestamp,
    },

    /// A file was copied, verified, and belongs to the open segment
    ///
    /// This is the resume checkpoint: on restart, any source listed here is
    /// skipped rather than copied again.
    FileCommitted {
        /// Chain being written
        chain_id: ChainId,
        /// Open segment the file belongs to
        sequence_number: u64,
        /// The verified copy record
        transaction: FileTransaction,
        /// Volume the file landed on
        volume_id: VolumeId,
    },

    /// A segment was durably sealed into a volume catalog
    SegmentSealed {
        /// The sealed, now-immutable segment record
        segment: Segment,
        /// Volume whose catalog holds it
        volume_id: VolumeId,
    },
}

impl JournalEntry {
    fn type_tag(&self) -> u8 {
        match self {
            JournalEntry::Header { .. } => TYPE_HEADER,
            JournalEntry::FileCommitted { .. } => TYPE_FILE_COMMITTED,
            JournalEntry::SegmentSealed { .. } => TYPE_SEGMENT_SEALED,
        }
    }
}

/// Encode a journal entry to bytes ready for appending
pub fn encode_entry(entry: &JournalEntry) -> Result<Vec<u8>> {
    let type_tag = entry.type_tag();
    let payload = bincode::serialize(entry)?;

    // total = type(1) + payload + crc(4)
    let total_len = 1 + payload.len() + 4;

    let mut buf = Vec::with_capacity(4 + total_len);
    buf.extend_from_slice(&(total_len as u32).to_le_bytes());
    buf.push(type_tag);
    buf.extend_from_slice(&payload);

    let mut hasher = Hasher::new();
    hasher.update(&[type_tag]);
    hasher.update(&payload);
    buf.extend_from_slice(&hasher.finalize().to_le_bytes());

    Ok(buf)
}

/// Decode one journal entry from the front of `buf`
///
/// Returns the entry and the number of bytes consumed, `Ok(None)` if the
/// buffer holds only an incomplete frame (a truncated tail after a crash),
/// or `JournalCorruption` if the frame is malformed mid-file.
pub fn decode_entry(buf: &[u8], offset: u64) -> Result<Option<(JournalEntry, usize)>> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let total_len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;

    // Minimum valid frame: type(1) + crc(4)
    if total_len < 5 {
        return Err(Error::JournalCorruption(format!(
            "offset {}: invalid frame length {} (minimum is 5)",
            offset, total_len
        )));
    }
    if buf.len() < 4 + total_len {
        return Ok(None);
    }

    let type_tag = buf[4];
    let payload = &buf[5..4 + total_len - 4];
    let crc_bytes = &buf[4 + total_len - 4..4 + total_len];
    let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

    let mut hasher = Hasher::new();
    hasher.update(&[type_tag]);
    hasher.update(payload);
    if hasher.finalize() != stored_crc {
        return Err(Error::JournalCorruption(format!(
            "offset {}: CRC mismatch",
            offset
        )));
    }

    let entry: JournalEntry = bincode::deserialize(payload).map_err(|e| {
        Error::JournalCorruption(format!("offset {}: undecodable payload: {}", offset, e))
    })?;

    if entry.type_tag() != type_tag {
        return Err(Error::JournalCorruption(format!(
            "offset {}: type tag {} does not match payload",
            offset, type_tag
        )));
    }

    Ok(Some((entry, 4 + total_len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;
    use spanvault_core::hash::hash_bytes;
    use spanvault_core::RECORD_VERSION;
    use std::path::PathBuf;

    fn header(host: &str) -> JournalEntry {
        JournalEntry::Header {
            journal_id: Uuid::new_v4(),
            version: RECORD_VERSION,
            host: host.to_string(),
            timestamp: Utc::now(),
        }
    }

    fn file_committed() -> JournalEntry {
        JournalEntry::FileCommitted {
            chain_id: ChainId::new(),
            sequence_number: 3,
            transaction: FileTransaction {
                source_path: PathBuf::from("/data/a.bin"),
                dest_path: PathBuf::from("host-a/data/a.bin"),
                timestamp: Utc::now(),
                size: 128,
                content_hash: hash_bytes(b"payload"),
                version: RECORD_VERSION,
            },
            volume_id: VolumeId::new(),
        }
    }

    #[test]
    fn test_roundtrip_header() {
        let entry = header("host-a");
        let bytes = encode_entry(&entry).unwrap();
        let (decoded, consumed) = decode_entry(&bytes, 0).unwrap().unwrap();
        assert_eq!(decoded, entry);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_roundtrip_file_committed() {
        let entry = file_committed();
        let bytes = encode_entry(&entry).unwrap();
        let (decoded, _) = decode_entry(&bytes, 0).unwrap().unwrap();
        assert_eq!(decoded, entry);
    }

    #[test]
    fn test_truncated_frame_is_incomplete_not_corrupt() {
        let bytes = encode_entry(&header("host-a")).unwrap();
        for cut in [0, 1, 3, bytes.len() - 1] {
            assert!(decode_entry(&bytes[..cut], 0).unwrap().is_none());
        }
    }

    #[test]
    fn test_bit_flip_is_corruption() {
        let mut bytes = encode_entry(&file_committed()).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        let result = decode_entry(&bytes, 0);
        assert!(matches!(result, Err(Error::JournalCorruption(_))));
    }

    #[test]
    fn test_zero_length_frame_is_corruption() {
        let bytes = [0u8, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(matches!(
            decode_entry(&bytes, 0),
            Err(Error::JournalCorruption(_))
        ));
    }

    #[test]
    fn test_consecutive_frames_decode_in_sequence() {
        let a = header("host-a");
        let b = file_committed();
        let mut buf = encode_entry(&a).unwrap();
        buf.extend(encode_entry(&b).unwrap());

        let (first, used) = decode_entry(&buf, 0).unwrap().unwrap();
        let (second, _) = decode_entry(&buf[used..], used as u64).unwrap().unwrap();
        assert_eq!(first, a);
        assert_eq!(second, b);
    }

    proptest! {
        #[test]
        fn prop_header_roundtrip(host in "[a-z0-9.-]{1,40}") {
            let entry = header(&host);
            let bytes = encode_entry(&entry).unwrap();
            let (decoded, consumed) = decode_entry(&bytes, 0).unwrap().unwrap();
            prop_assert_eq!(decoded, entry);
            prop_assert_eq!(consumed, bytes.len());
        }
    }
}

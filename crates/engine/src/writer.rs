//! Segment writer: verified streaming copy onto the active volume
//!
//! The writer has no pre-flight capacity check on purpose: free-space
//! queries are unreliable across the filesystems volumes may carry, so
//! exhaustion is always discovered by attempting the write and observing
//! the failure. A full volume is a normal outcome, not an error — the
//! partial destination is removed, nothing is recorded, and the session
//! advances the chain to the next volume.
//!
//! Every successful copy is verified by re-reading the destination and
//! comparing digests before anything is recorded, and the journal append
//! is durable before the call returns. A crash at any point therefore
//! leaves only discardable work.

use chrono::Utc;
use spanvault_core::{
    hash::{hash_file, StreamingHasher},
    Error, FileTransaction, Result, Segment, RECORD_VERSION,
};
use spanvault_durability::{RunJournal, Volume};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{debug, info, warn};

/// Copy buffer size; large enough to keep spinning media streaming
const COPY_BUFFER: usize = 1 << 20;

#[cfg(unix)]
const VOLUME_FULL_CODES: &[i32] = &[28]; // ENOSPC
#[cfg(windows)]
const VOLUME_FULL_CODES: &[i32] = &[39, 112]; // ERROR_HANDLE_DISK_FULL, ERROR_DISK_FULL
#[cfg(not(any(unix, windows)))]
const VOLUME_FULL_CODES: &[i32] = &[];

fn is_volume_full(err: &io::Error) -> bool {
    err.raw_os_error()
        .is_some_and(|code| VOLUME_FULL_CODES.contains(&code))
}

fn synthesized_full() -> io::Error {
    #[cfg(unix)]
    return io::Error::from_raw_os_error(28);
    #[cfg(windows)]
    return io::Error::from_raw_os_error(112);
    #[cfg(not(any(unix, windows)))]
    return io::Error::new(io::ErrorKind::Other, "volume full");
}

/// Result of one write attempt
#[derive(Debug)]
pub enum WriteOutcome {
    /// The file is on the volume, verified, and journaled
    Written(FileTransaction),
    /// The volume is exhausted; nothing was recorded
    VolumeFull,
}

/// Copies files into the open segment on the active volume
pub struct SegmentWriter {
    /// Corruption hook between write and verification, for integrity tests
    #[cfg(test)]
    pub(crate) post_write_fault: Option<Box<dyn Fn(&Path)>>,
}

impl SegmentWriter {
    /// Create a writer
    pub fn new() -> Self {
        Self {
            #[cfg(test)]
            post_write_fault: None,
        }
    }

    /// Copy `source` into `segment` on `volume`
    ///
    /// On success the transaction is appended to the segment AND durably
    /// journaled before this returns. On `VolumeFull` the segment, journal
    /// and destination are all unchanged. An existing destination with
    /// matching content is adopted without re-copying.
    pub fn write_file(
        &self,
        segment: &mut Segment,
        journal: &mut RunJournal,
        volume: &Volume,
        source: &Path,
    ) -> Result<WriteOutcome> {
        let (dest_rel, dest_abs) = volume.dest_for(&segment.host, source)?;

        // A destination can already exist after a crash between copy and
        // journal append, or from an earlier unrelated run. Matching
        // content is adopted; anything else is overwritten below.
        if dest_abs.exists() {
            let source_hash = hash_file(source)?;
            let existing = hash_file(&dest_abs)?;
            if existing == source_hash {
                info!(
                    source = %source.display(),
                    dest = %dest_rel.display(),
                    "destination already holds matching content; adopting"
                );
                let size = std::fs::metadata(&dest_abs)?.len();
                let transaction = FileTransaction {
                    source_path: source.to_path_buf(),
                    dest_path: dest_rel,
                    timestamp: Utc::now(),
                    size,
                    content_hash: source_hash,
                    version: RECORD_VERSION,
                };
                journal.append_file_committed(
                    segment.chain_id,
                    segment.sequence_number,
                    &transaction,
                    volume.id(),
                )?;
                segment.record(transaction.clone());
                return Ok(WriteOutcome::Written(transaction));
            }
            debug!(dest = %dest_rel.display(), "destination exists with different content; overwriting");
        }

        if let Some(parent) = dest_abs.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                if is_volume_full(&e) {
                    return Ok(WriteOutcome::VolumeFull);
                }
                return Err(e.into());
            }
        }

        let mut charged = 0u64;
        let copy_result = self.copy_streaming(source, &dest_abs, volume, &mut charged);
        let (bytes_copied, streamed_hash) = match copy_result {
            Ok(ok) => ok,
            Err(e) if is_volume_full(&e) => {
                // Remove the partial file so the volume is left exactly as
                // it was before the attempt.
                warn!(
                    source = %source.display(),
                    volume = %volume.id(),
                    "volume exhausted mid-copy; removing partial destination"
                );
                let _ = std::fs::remove_file(&dest_abs);
                volume.refund(charged);
                return Ok(WriteOutcome::VolumeFull);
            }
            Err(e) => {
                volume.refund(charged);
                return Err(e.into());
            }
        };

        #[cfg(test)]
        if let Some(fault) = &self.post_write_fault {
            fault(&dest_abs);
        }

        // Independent reconfirmation: re-read what actually hit the disk.
        let dest_hash = hash_file(&dest_abs)?;
        if dest_hash != streamed_hash {
            return Err(Error::Integrity {
                path: dest_abs,
                expected: streamed_hash,
                actual: dest_hash,
            });
        }

        let transaction = FileTransaction {
            source_path: source.to_path_buf(),
            dest_path: dest_rel,
            timestamp: Utc::now(),
            size: bytes_copied,
            content_hash: streamed_hash,
            version: RECORD_VERSION,
        };
        journal.append_file_committed(
            segment.chain_id,
            segment.sequence_number,
            &transaction,
            volume.id(),
        )?;
        segment.record(transaction.clone());

        info!(
            source = %source.display(),
            dest = %transaction.dest_path.display(),
            bytes = bytes_copied,
            chain = %segment.chain_id,
            sequence = segment.sequence_number,
            "file committed"
        );

        Ok(WriteOutcome::Written(transaction))
    }

    /// Stream source to destination, hashing in flight
    ///
    /// Returns bytes copied and the digest of what was written. The
    /// simulated-capacity gate is consulted per chunk and reports
    /// exhaustion through the same error path a real device uses.
    fn copy_streaming(
        &self,
        source: &Path,
        dest_abs: &Path,
        volume: &Volume,
        charged: &mut u64,
    ) -> io::Result<(u64, spanvault_core::ContentHash)> {
        let mut reader = File::open(source)?;
        let mut writer = File::create(dest_abs)?;
        let mut hasher = StreamingHasher::new();
        let mut buffer = vec![0u8; COPY_BUFFER];
        let mut copied = 0u64;

        loop {
            let n = reader.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            if !volume.try_charge(n as u64) {
                return Err(synthesized_full());
            }
            *charged += n as u64;
            writer.write_all(&buffer[..n])?;
            hasher.update(&buffer[..n]);
            copied += n as u64;
        }

        writer.sync_all()?;
        Ok((copied, hasher.finalize()))
    }
}

impl Default for SegmentWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spanvault_core::hash::hash_bytes;
    use spanvault_core::ChainId;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct Fixture {
        _source_dir: TempDir,
        _volume_dir: TempDir,
        journal_dir: TempDir,
        volume: Volume,
        journal: RunJournal,
        segment: Segment,
        source: PathBuf,
    }

    fn fixture(payload: &[u8]) -> Fixture {
        let source_dir = tempfile::tempdir().unwrap();
        let volume_dir = tempfile::tempdir().unwrap();
        let journal_dir = tempfile::tempdir().unwrap();

        let source = source_dir.path().join("file.bin");
        std::fs::write(&source, payload).unwrap();
        let source = source.canonicalize().unwrap();

        let volume = Volume::init(volume_dir.path(), true).unwrap();
        let journal = RunJournal::create_in(journal_dir.path(), "host-a").unwrap();
        let segment = Segment::open_chain(
            ChainId::new(),
            vec![source_dir.path().to_path_buf()],
            "host-a".to_string(),
            None,
            None,
        );

        Fixture {
            _source_dir: source_dir,
            _volume_dir: volume_dir,
            journal_dir,
            volume,
            journal,
            segment,
            source,
        }
    }

    #[test]
    fn test_write_records_and_journals() {
        let mut fx = fixture(b"hello volume");
        let writer = SegmentWriter::new();

        let outcome = writer
            .write_file(&mut fx.segment, &mut fx.journal, &fx.volume, &fx.source)
            .unwrap();

        let WriteOutcome::Written(txn) = outcome else {
            panic!("expected Written");
        };
        assert_eq!(txn.size, 12);
        assert_eq!(txn.content_hash, hash_bytes(b"hello volume"));
        assert_eq!(fx.segment.files.len(), 1);
        assert_eq!(fx.journal.entries().len(), 1);

        // Copy landed under the host namespace
        let on_volume = fx.volume.root().join(&txn.dest_path);
        assert_eq!(std::fs::read(on_volume).unwrap(), b"hello volume");
        assert!(txn.dest_path.starts_with("host-a"));
    }

    #[test]
    fn test_volume_full_leaves_no_trace() {
        let mut fx = fixture(&[0xAB; 4096]);
        fx.volume.set_simulated_capacity(1024);
        let writer = SegmentWriter::new();

        let outcome = writer
            .write_file(&mut fx.segment, &mut fx.journal, &fx.volume, &fx.source)
            .unwrap();

        assert!(matches!(outcome, WriteOutcome::VolumeFull));
        assert!(fx.segment.files.is_empty());
        assert!(fx.journal.entries().is_empty());

        let (_, dest_abs) = fx.volume.dest_for("host-a", &fx.source).unwrap();
        assert!(!dest_abs.exists(), "partial destination must be removed");
    }

    #[test]
    fn test_corrupted_destination_is_integrity_error() {
        let mut fx = fixture(b"authentic bytes");
        let mut writer = SegmentWriter::new();
        writer.post_write_fault = Some(Box::new(|dest: &Path| {
            std::fs::write(dest, b"tampered bytes!").unwrap();
        }));

        let result = writer.write_file(&mut fx.segment, &mut fx.journal, &fx.volume, &fx.source);

        assert!(matches!(result, Err(Error::Integrity { .. })));
        assert!(fx.segment.files.is_empty(), "no transaction may be recorded");
        assert!(fx.journal.entries().is_empty(), "no journal checkpoint may exist");
    }

    #[test]
    fn test_existing_matching_destination_adopted() {
        let mut fx = fixture(b"already here");
        let writer = SegmentWriter::new();

        // Pre-place the exact content at the destination
        let (_, dest_abs) = fx.volume.dest_for("host-a", &fx.source).unwrap();
        std::fs::create_dir_all(dest_abs.parent().unwrap()).unwrap();
        std::fs::write(&dest_abs, b"already here").unwrap();

        let outcome = writer
            .write_file(&mut fx.segment, &mut fx.journal, &fx.volume, &fx.source)
            .unwrap();

        assert!(matches!(outcome, WriteOutcome::Written(_)));
        assert_eq!(fx.segment.files.len(), 1);
        assert_eq!(fx.journal.entries().len(), 1);
    }

    #[test]
    fn test_existing_stale_destination_overwritten() {
        let mut fx = fixture(b"fresh content");
        let writer = SegmentWriter::new();

        let (_, dest_abs) = fx.volume.dest_for("host-a", &fx.source).unwrap();
        std::fs::create_dir_all(dest_abs.parent().unwrap()).unwrap();
        std::fs::write(&dest_abs, b"stale partial junk").unwrap();

        let outcome = writer
            .write_file(&mut fx.segment, &mut fx.journal, &fx.volume, &fx.source)
            .unwrap();

        assert!(matches!(outcome, WriteOutcome::Written(_)));
        assert_eq!(std::fs::read(&dest_abs).unwrap(), b"fresh content");
    }

    #[test]
    fn test_relative_source_rejected() {
        let mut fx = fixture(b"x");
        let writer = SegmentWriter::new();
        let result = writer.write_file(
            &mut fx.segment,
            &mut fx.journal,
            &fx.volume,
            Path::new("relative/path.bin"),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_journal_checkpoint_is_durable() {
        let mut fx = fixture(b"checkpointed");
        let writer = SegmentWriter::new();
        writer
            .write_file(&mut fx.segment, &mut fx.journal, &fx.volume, &fx.source)
            .unwrap();

        // Reopen the journal cold and find the commit
        let path = fx.journal.path().to_path_buf();
        drop(fx.journal);
        let reopened = RunJournal::open(&path).unwrap();
        assert_eq!(reopened.entries().len(), 1);
        let _keep = &fx.journal_dir;
    }
}

//! Run journal: the append-only resume checkpoint log
//!
//! One journal exists per backup invocation, stored on the machine doing
//! the backup (never on a target volume). Every append is fsynced before
//! the operation it records is allowed to report success, so the journal is
//! always at or behind reality, never ahead of it. Restore does not use the
//! journal at all; reconstruction depends only on volume catalogs.
//!
//! Replay rules:
//! - the first record must be a `Header`
//! - a truncated frame at the tail is a crash artifact: it is discarded
//!   (the file is trimmed back to the last whole record) and replay
//!   continues from a consistent state
//! - anything else undecodable is `JournalCorruption`, fatal for the run

use crate::encoding::{decode_entry, encode_entry, JournalEntry};
use chrono::Utc;
use spanvault_core::{
    ChainId, Error, FileTransaction, Result, Segment, Timestamp, VolumeId, RECORD_VERSION,
};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Prefix of journal file names created by [`RunJournal::create_in`]
pub const JOURNAL_FILE_PREFIX: &str = "spanvault-log-";
/// Suffix of journal file names created by [`RunJournal::create_in`]
pub const JOURNAL_FILE_SUFFIX: &str = ".journal";

/// Append-only journal for one backup run
pub struct RunJournal {
    path: PathBuf,
    file: File,
    journal_id: Uuid,
    host: String,
    started_at: Timestamp,
    /// Replayed plus appended records, header excluded
    entries: Vec<JournalEntry>,
}

impl RunJournal {
    /// Create a fresh journal in `dir`, named after its own new uuid
    pub fn create_in(dir: &Path, host: &str) -> Result<Self> {
        let journal_id = Uuid::new_v4();
        let path = dir.join(format!(
            "{}{}{}",
            JOURNAL_FILE_PREFIX, journal_id, JOURNAL_FILE_SUFFIX
        ));
        let mut file = OpenOptions::new()
            .create_new(true)
            .append(true)
            .read(true)
            .open(&path)?;

        let started_at = Utc::now();
        let header = JournalEntry::Header {
            journal_id,
            version: RECORD_VERSION,
            host: host.to_string(),
            timestamp: started_at,
        };
        let encoded = encode_entry(&header)?;
        file.write_all(&encoded)?;
        file.sync_all()?;

        info!(path = %path.display(), journal_id = %journal_id, host, "created run journal");

        Ok(Self {
            path,
            file,
            journal_id,
            host: host.to_string(),
            started_at,
            entries: Vec::new(),
        })
    }

    /// Open an existing journal and replay it
    pub fn open(path: &Path) -> Result<Self> {
        let mut reader = File::open(path)?;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;

        let mut offset = 0usize;
        let mut records = Vec::new();
        while offset < buf.len() {
            match decode_entry(&buf[offset..], offset as u64)? {
                Some((entry, consumed)) => {
                    records.push(entry);
                    offset += consumed;
                }
                None => break,
            }
        }

        let valid_len = offset as u64;
        let mut header_iter = records.into_iter();
        let (journal_id, host, started_at) = match header_iter.next() {
            Some(JournalEntry::Header {
                journal_id,
                host,
                timestamp,
                ..
            }) => (journal_id, host, timestamp),
            Some(_) => {
                return Err(Error::JournalCorruption(
                    "first record is not a header".to_string(),
                ))
            }
            None => {
                return Err(Error::JournalCorruption(
                    "journal holds no complete records".to_string(),
                ))
            }
        };
        let entries: Vec<JournalEntry> = header_iter.collect();

        let file = OpenOptions::new().append(true).read(true).open(path)?;
        if valid_len < buf.len() as u64 {
            // Crash mid-append left a partial frame; trim back to the last
            // whole record so future appends stay decodable.
            warn!(
                path = %path.display(),
                discarded = buf.len() as u64 - valid_len,
                "discarding partial trailing record"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        info!(
            path = %path.display(),
            journal_id = %journal_id,
            host,
            records = entries.len(),
            "opened run journal"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            journal_id,
            host,
            started_at,
            entries,
        })
    }

    /// Path of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Identity of this journal
    pub fn journal_id(&self) -> Uuid {
        self.journal_id
    }

    /// Host recorded in the header
    pub fn host(&self) -> &str {
        &self.host
    }

    /// When the run started
    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    /// All replayed and appended records, header excluded
    pub fn entries(&self) -> &[JournalEntry] {
        &self.entries
    }

    /// Chains this journal has records for, in first-seen order
    pub fn chains(&self) -> Vec<ChainId> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            let chain = match entry {
                JournalEntry::FileCommitted { chain_id, .. } => *chain_id,
                JournalEntry::SegmentSealed { segment, .. } => segment.chain_id,
                JournalEntry::Header { .. } => continue,
            };
            if !seen.contains(&chain) {
                seen.push(chain);
            }
        }
        seen
    }

    /// Record a verified file copy belonging to the open segment
    ///
    /// Durable before return; this is the checkpoint that makes the copy
    /// skippable on resume.
    pub fn append_file_committed(
        &mut self,
        chain_id: ChainId,
        sequence_number: u64,
        transaction: &FileTransaction,
        volume_id: VolumeId,
    ) -> Result<()> {
        debug!(
            chain = %chain_id,
            sequence = sequence_number,
            dest = %transaction.dest_path.display(),
            "journal: file committed"
        );
        self.append(JournalEntry::FileCommitted {
            chain_id,
            sequence_number,
            transaction: transaction.clone(),
            volume_id,
        })
    }

    /// Record that a segment was sealed into a volume catalog
    pub fn append_segment_sealed(&mut self, segment: &Segment, volume_id: VolumeId) -> Result<()> {
        debug!(
            chain = %segment.chain_id,
            sequence = segment.sequence_number,
            volume = %volume_id,
            is_final = segment.is_final,
            "journal: segment sealed"
        );
        self.append(JournalEntry::SegmentSealed {
            segment: segment.clone(),
            volume_id,
        })
    }

    fn append(&mut self, entry: JournalEntry) -> Result<()> {
        let encoded = encode_entry(&entry)?;
        self.file.write_all(&encoded)?;
        self.file.sync_all()?;
        self.entries.push(entry);
        Ok(())
    }

    /// Compute where a resumed run should pick up for `chain`
    ///
    /// Returns `None` if the journal holds no records for the chain (a
    /// fresh start). Otherwise the resume point carries the open segment's
    /// sequence number, its already-committed transactions, the volume it
    /// was being written to, and the source sets to skip.
    pub fn resume_point(&self, chain: ChainId) -> Option<ResumePoint> {
        let mut last_sealed: Option<&Segment> = None;
        let mut finalized = false;

        for entry in &self.entries {
            if let JournalEntry::SegmentSealed { segment, .. } = entry {
                if segment.chain_id != chain {
                    continue;
                }
                finalized |= segment.is_final;
                let newer = last_sealed
                    .map(|s| segment.sequence_number > s.sequence_number)
                    .unwrap_or(true);
                if newer {
                    last_sealed = Some(segment);
                }
            }
        }

        let sealed_high = last_sealed.map(|s| s.sequence_number);
        let open_sequence = sealed_high.map(|s| s + 1).unwrap_or(0);

        // Commits for the open sequence. A forced re-target after a lost
        // volume can leave commits for the same sequence on two volumes;
        // the volume of the latest commit is authoritative.
        let mut open_commits: Vec<(&FileTransaction, VolumeId)> = Vec::new();
        let mut touched = false;
        for entry in &self.entries {
            if let JournalEntry::FileCommitted {
                chain_id,
                sequence_number,
                transaction,
                volume_id,
            } = entry
            {
                if *chain_id != chain {
                    continue;
                }
                touched = true;
                if *sequence_number == open_sequence {
                    open_commits.push((transaction, *volume_id));
                }
            }
        }

        if !touched && last_sealed.is_none() {
            return None;
        }

        let open_volume = open_commits.last().map(|(_, v)| *v);
        let open_files: Vec<FileTransaction> = open_commits
            .iter()
            .filter(|(_, v)| Some(*v) == open_volume)
            .map(|(t, _)| (*t).clone())
            .collect();
        let open_sources = open_files
            .iter()
            .map(|t| t.source_path.clone())
            .collect::<HashSet<_>>();

        let mut sealed_sources = HashSet::new();
        for entry in &self.entries {
            if let JournalEntry::SegmentSealed { segment, .. } = entry {
                if segment.chain_id == chain {
                    sealed_sources.extend(segment.files.iter().map(|t| t.source_path.clone()));
                }
            }
        }

        Some(ResumePoint {
            chain_id: chain,
            finalized,
            open_sequence,
            open_volume,
            open_files,
            last_sealed: last_sealed.cloned(),
            sealed_sources,
            open_sources,
        })
    }
}

/// Where a resumed run picks up, derived from journal replay
#[derive(Debug, Clone)]
pub struct ResumePoint {
    /// Chain being resumed
    pub chain_id: ChainId,
    /// True if the chain's final segment was already sealed; nothing to do
    pub finalized: bool,
    /// Sequence number of the segment that was open when the run stopped
    pub open_sequence: u64,
    /// Volume the open segment was being written to, if any file landed
    pub open_volume: Option<VolumeId>,
    /// Transactions already committed in the open segment
    pub open_files: Vec<FileTransaction>,
    /// Highest sealed segment, used as the metadata template for reopening
    pub last_sealed: Option<Segment>,
    /// Sources fully covered by sealed segments; always skipped
    pub sealed_sources: HashSet<PathBuf>,
    /// Sources committed in the open segment; skipped unless the open
    /// segment is re-targeted onto a new volume
    pub open_sources: HashSet<PathBuf>,
}

//! Backup session: one run of the engine, fresh or resumed
//!
//! All run state — sequencer, journal, active volume, skip sets — is
//! threaded through this one object; there are no globals. The run loop
//! is the whole protocol:
//!
//! ```text
//! for each source file:
//!     skip if already committed (journal says so)
//!     write onto the active volume
//!     on VolumeFull: seal segment -> journal -> advance -> next volume
//! at end of enumeration: finalize -> seal terminal segment
//! ```
//!
//! When the operator has no next volume the session pauses: the journal
//! already holds everything a later invocation needs, so pausing is just
//! returning `PausedAwaitingVolume`.

use crate::sequencer::ChainSequencer;
use crate::writer::{SegmentWriter, WriteOutcome};
use spanvault_core::{ChainId, Error, Result};
use spanvault_durability::{RunJournal, Volume, VolumeProvider};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Operator-facing knobs for a run
#[derive(Debug, Default)]
pub struct BackupOptions {
    /// Optional name stored in every segment of the chain
    pub name: Option<String>,
    /// Optional comment stored in every segment of the chain
    pub comment: Option<String>,
    /// Allow resuming a journal written by a different host
    pub allow_host_mismatch: bool,
    /// On resume, abandon the open segment's committed files and restart
    /// the segment on a newly presented volume (the journal's target
    /// volume is lost or unavailable)
    pub retarget_open_segment: bool,
}

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Source enumeration exhausted; the chain is complete
    Completed {
        /// The finished chain
        chain_id: ChainId,
        /// Number of segments in the chain
        segments: u64,
        /// Files copied by this invocation (skipped files not counted)
        files_copied: u64,
    },
    /// Out of volumes with work remaining; resume with the journal
    PausedAwaitingVolume {
        /// Chain mid-flight
        chain_id: ChainId,
        /// Sequence number of the segment awaiting a volume
        sequence_number: u64,
    },
}

/// One backup run
pub struct BackupSession<P: VolumeProvider> {
    sequencer: ChainSequencer,
    writer: SegmentWriter,
    journal: RunJournal,
    provider: P,
    active: Option<Volume>,
    skip_sources: HashSet<PathBuf>,
    /// Volume the resumed open segment must land on, checked once
    expected_volume: Option<spanvault_core::VolumeId>,
    files_copied: u64,
}

impl<P: VolumeProvider> BackupSession<P> {
    /// Start a fresh run: new journal, new chain
    pub fn begin(
        journal_dir: &Path,
        backup_dirs: Vec<PathBuf>,
        host: &str,
        provider: P,
        options: BackupOptions,
    ) -> Result<Self> {
        let journal = RunJournal::create_in(journal_dir, host)?;
        let sequencer = ChainSequencer::begin_fresh(
            backup_dirs,
            host.to_string(),
            options.name,
            options.comment,
        );

        Ok(Self {
            sequencer,
            writer: SegmentWriter::new(),
            journal,
            provider,
            active: None,
            skip_sources: HashSet::new(),
            expected_volume: None,
            files_copied: 0,
        })
    }

    /// Resume a run from an existing journal
    ///
    /// Refuses a journal written by a different host unless the option
    /// allows it. Sources the journal already accounts for are skipped;
    /// the open segment continues on its original volume, or restarts on a
    /// new one when `retarget_open_segment` is set.
    pub fn resume(
        journal_path: &Path,
        backup_dirs: Vec<PathBuf>,
        host: &str,
        provider: P,
        options: BackupOptions,
    ) -> Result<Self> {
        let journal = RunJournal::open(journal_path)?;

        if journal.host() != host && !options.allow_host_mismatch {
            return Err(Error::HostMismatch {
                journal_host: journal.host().to_string(),
                current_host: host.to_string(),
            });
        }

        let chains = journal.chains();
        let chain = match chains.as_slice() {
            [] => {
                // Journal was created but nothing committed before the
                // interruption; the run effectively starts fresh.
                info!("journal holds no commits; starting a fresh chain");
                let sequencer = ChainSequencer::begin_fresh(
                    backup_dirs,
                    host.to_string(),
                    options.name,
                    options.comment,
                );
                return Ok(Self {
                    sequencer,
                    writer: SegmentWriter::new(),
                    journal,
                    provider,
                    active: None,
                    skip_sources: HashSet::new(),
                    expected_volume: None,
                    files_copied: 0,
                });
            }
            [chain] => *chain,
            _ => {
                return Err(Error::JournalCorruption(format!(
                    "journal references {} chains; expected one",
                    chains.len()
                )))
            }
        };

        // chains() returned it, so the resume point exists
        let resume = journal
            .resume_point(chain)
            .ok_or_else(|| Error::JournalCorruption("chain vanished during replay".to_string()))?;

        let keep_open_files = !options.retarget_open_segment;
        let mut skip_sources = resume.sealed_sources.clone();
        if keep_open_files {
            skip_sources.extend(resume.open_sources.iter().cloned());
        }
        let expected_volume = if keep_open_files {
            resume.open_volume
        } else {
            None
        };

        let sequencer =
            ChainSequencer::resume_from(&resume, backup_dirs, host.to_string(), keep_open_files);

        info!(
            chain = %chain,
            skipping = skip_sources.len(),
            retargeted = options.retarget_open_segment,
            "resuming backup run"
        );

        Ok(Self {
            sequencer,
            writer: SegmentWriter::new(),
            journal,
            provider,
            active: None,
            skip_sources,
            expected_volume,
            files_copied: 0,
        })
    }

    /// Chain this session is writing
    pub fn chain_id(&self) -> ChainId {
        self.sequencer.chain_id()
    }

    /// Path of the run journal, for resume hints
    pub fn journal_path(&self) -> &Path {
        self.journal.path()
    }

    /// Drive the run over the enumerated source files
    ///
    /// `sources` must be absolute paths. The enumeration itself is the
    /// caller's concern; the session only decides what to do with each
    /// entry.
    pub fn run<I>(&mut self, sources: I) -> Result<RunOutcome>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        if self.sequencer.is_finalized() {
            // Resume of a chain whose terminal segment is already sealed.
            return Ok(self.completed());
        }

        for source in sources {
            if self.skip_sources.contains(&source) {
                debug!(source = %source.display(), "already committed; skipping");
                continue;
            }

            loop {
                if !self.ensure_volume()? {
                    return Ok(self.paused()?);
                }

                let volume = self.active.as_ref().expect("volume ensured above");
                let segment = self.sequencer.open_mut()?;
                match self
                    .writer
                    .write_file(segment, &mut self.journal, volume, &source)?
                {
                    WriteOutcome::Written(_) => {
                        self.files_copied += 1;
                        self.skip_sources.insert(source.clone());
                        break;
                    }
                    WriteOutcome::VolumeFull => {
                        self.roll_volume()?;
                    }
                }
            }
        }

        // Enumeration exhausted: the open segment becomes the terminal one.
        // Sealing it still needs a volume (the one we have been writing
        // to, or a fresh one if we paused and resumed onto nothing yet).
        if !self.ensure_volume()? {
            return Ok(self.paused()?);
        }

        let terminal = self.sequencer.finalize()?;
        let volume = self.active.as_mut().expect("volume ensured above");
        volume.seal(&terminal)?;
        self.journal.append_segment_sealed(&terminal, volume.id())?;

        info!(
            chain = %terminal.chain_id,
            segments = terminal.sequence_number + 1,
            files_copied = self.files_copied,
            "backup complete"
        );

        Ok(RunOutcome::Completed {
            chain_id: terminal.chain_id,
            segments: terminal.sequence_number + 1,
            files_copied: self.files_copied,
        })
    }

    /// Seal the exhausted segment and advance the chain past it
    fn roll_volume(&mut self) -> Result<()> {
        let sealed = self.sequencer.detach_open()?;
        let volume = self.active.as_mut().ok_or_else(|| {
            Error::SequenceViolation("volume exhausted with no active volume".to_string())
        })?;

        volume.seal(&sealed)?;
        self.journal.append_segment_sealed(&sealed, volume.id())?;

        info!(
            chain = %sealed.chain_id,
            sequence = sealed.sequence_number,
            volume = %volume.id(),
            files = sealed.files.len(),
            "volume exhausted; segment sealed"
        );

        self.sequencer.advance_segment(&sealed)?;
        self.active = None;
        Ok(())
    }

    /// Make sure a volume is mounted as the write target
    ///
    /// Returns false when the provider has nothing to offer, which pauses
    /// the run.
    fn ensure_volume(&mut self) -> Result<bool> {
        if self.active.is_some() {
            return Ok(true);
        }
        let Some(volume) = self.provider.next_volume() else {
            return Ok(false);
        };
        let volume = volume?;

        // A resumed open segment has files on one specific volume; writing
        // its remainder anywhere else would split the segment.
        if let Some(expected) = self.expected_volume.take() {
            if volume.id() != expected {
                return Err(Error::VolumeMismatch {
                    expected,
                    found: volume.id(),
                });
            }
        }

        info!(volume = %volume.id(), root = %volume.root().display(), "active volume");
        self.active = Some(volume);
        Ok(true)
    }

    fn paused(&self) -> Result<RunOutcome> {
        let sequence_number = self.sequencer.open()?.sequence_number;
        info!(
            chain = %self.chain_id(),
            sequence = sequence_number,
            journal = %self.journal.path().display(),
            "no volume available; pausing"
        );
        Ok(RunOutcome::PausedAwaitingVolume {
            chain_id: self.chain_id(),
            sequence_number,
        })
    }

    fn completed(&self) -> RunOutcome {
        RunOutcome::Completed {
            chain_id: self.chain_id(),
            segments: self
                .journal
                .resume_point(self.chain_id())
                .map(|rp| rp.open_sequence)
                .unwrap_or(0),
            files_copied: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spanvault_durability::VolumeQueue;
    use tempfile::TempDir;

    struct World {
        _dirs: Vec<TempDir>,
        sources: Vec<PathBuf>,
        volume_roots: Vec<PathBuf>,
        journal_dir: PathBuf,
        backup_dir: PathBuf,
    }

    /// A source tree with three small files and `volumes` empty volumes
    fn world(volumes: usize) -> World {
        let source_dir = tempfile::tempdir().unwrap();
        let journal_dir = tempfile::tempdir().unwrap();

        let mut sources = Vec::new();
        for (name, payload) in [
            ("a.bin", b"aaaaaaaaaa".as_slice()),
            ("b.bin", b"bbbbbbbbbbbbbbbbbbbb".as_slice()),
            ("c.bin", b"cccccc".as_slice()),
        ] {
            let path = source_dir.path().join(name);
            std::fs::write(&path, payload).unwrap();
            sources.push(path.canonicalize().unwrap());
        }

        let mut dirs = vec![];
        let mut volume_roots = Vec::new();
        for _ in 0..volumes {
            let dir = tempfile::tempdir().unwrap();
            volume_roots.push(dir.path().to_path_buf());
            dirs.push(dir);
        }

        let journal_path = journal_dir.path().to_path_buf();
        let backup_dir = source_dir.path().to_path_buf();
        dirs.push(source_dir);
        dirs.push(journal_dir);

        World {
            _dirs: dirs,
            sources,
            volume_roots,
            journal_dir: journal_path,
            backup_dir,
        }
    }

    #[test]
    fn test_single_volume_run_completes() {
        let world = world(1);
        let provider = VolumeQueue::new(world.volume_roots.clone());

        let mut session = BackupSession::begin(
            &world.journal_dir,
            vec![world.backup_dir.clone()],
            "host-a",
            provider,
            BackupOptions::default(),
        )
        .unwrap();

        let outcome = session.run(world.sources.clone()).unwrap();
        let RunOutcome::Completed {
            segments,
            files_copied,
            ..
        } = outcome
        else {
            panic!("expected Completed");
        };
        assert_eq!(segments, 1);
        assert_eq!(files_copied, 3);

        let volume = Volume::open(&world.volume_roots[0]).unwrap();
        let sealed = volume.segments_for(session.chain_id());
        assert_eq!(sealed.len(), 1);
        assert!(sealed[0].is_final);
        assert_eq!(sealed[0].files.len(), 3);
    }

    #[test]
    fn test_no_volumes_pauses_immediately() {
        let world = world(0);
        let provider = VolumeQueue::new(Vec::<PathBuf>::new());

        let mut session = BackupSession::begin(
            &world.journal_dir,
            vec![world.backup_dir.clone()],
            "host-a",
            provider,
            BackupOptions::default(),
        )
        .unwrap();

        let outcome = session.run(world.sources.clone()).unwrap();
        assert!(matches!(
            outcome,
            RunOutcome::PausedAwaitingVolume {
                sequence_number: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_duplicate_enumeration_entries_written_once() {
        let world = world(1);
        let provider = VolumeQueue::new(world.volume_roots.clone());

        let mut session = BackupSession::begin(
            &world.journal_dir,
            vec![world.backup_dir.clone()],
            "host-a",
            provider,
            BackupOptions::default(),
        )
        .unwrap();

        // The same file enumerated twice (overlapping backup dirs)
        let mut sources = world.sources.clone();
        sources.push(world.sources[0].clone());

        let outcome = session.run(sources).unwrap();
        let RunOutcome::Completed { files_copied, .. } = outcome else {
            panic!("expected Completed");
        };
        assert_eq!(files_copied, 3);

        let volume = Volume::open(&world.volume_roots[0]).unwrap();
        let sealed = volume.segments_for(session.chain_id());
        assert_eq!(sealed[0].files.len(), 3);
    }

    #[test]
    fn test_resume_host_mismatch_refused() {
        let world = world(1);
        let provider = VolumeQueue::new(world.volume_roots.clone());
        let session = BackupSession::begin(
            &world.journal_dir,
            vec![world.backup_dir.clone()],
            "host-a",
            provider,
            BackupOptions::default(),
        )
        .unwrap();
        let journal_path = session.journal_path().to_path_buf();
        drop(session);

        let result = BackupSession::resume(
            &journal_path,
            vec![world.backup_dir.clone()],
            "host-b",
            VolumeQueue::new(world.volume_roots.clone()),
            BackupOptions::default(),
        );
        assert!(matches!(result, Err(Error::HostMismatch { .. })));

        let allowed = BackupSession::resume(
            &journal_path,
            vec![world.backup_dir.clone()],
            "host-b",
            VolumeQueue::new(world.volume_roots.clone()),
            BackupOptions {
                allow_host_mismatch: true,
                ..Default::default()
            },
        );
        assert!(allowed.is_ok());
    }
}

//! Chain sequencer: chain identity and segment lifecycle
//!
//! The sequencer owns the one mutable piece of chain state: the open
//! segment. Everything else about a chain lives in sealed records. The
//! lifecycle it enforces:
//!
//! ```text
//! begin ──► open(0) ──advance──► open(1) ──advance──► ... ──finalize──► done
//! ```
//!
//! Advancing happens only on volume exhaustion; finalizing happens only
//! when source enumeration is exhausted. Any call out of order is a
//! `SequenceViolation` — a logic bug, fatal, never retried.

use spanvault_core::{ChainId, Error, Result, Segment};
use spanvault_durability::ResumePoint;
use std::path::PathBuf;
use tracing::{debug, info};

/// Sequencer for one backup chain
pub struct ChainSequencer {
    chain_id: ChainId,
    open: Option<Segment>,
    finalized: bool,
}

impl ChainSequencer {
    /// Start a fresh chain: new uuid, open segment at sequence 0
    pub fn begin_fresh(
        backup_dirs: Vec<PathBuf>,
        host: String,
        name: Option<String>,
        comment: Option<String>,
    ) -> Self {
        let chain_id = ChainId::new();
        let open = Segment::open_chain(chain_id, backup_dirs, host, name, comment);
        info!(chain = %chain_id, "began fresh chain");
        Self {
            chain_id,
            open: Some(open),
            finalized: false,
        }
    }

    /// Reopen sequencing at a journal resume point
    ///
    /// The open segment is rebuilt at the resume point's sequence number.
    /// With `keep_open_files` the transactions already committed to it are
    /// restored (the matching volume is expected back); without, the
    /// segment restarts empty so it can be re-targeted onto a new volume.
    ///
    /// A finalized resume point yields a sequencer with nothing open and
    /// nothing left to do.
    pub fn resume_from(
        resume: &ResumePoint,
        backup_dirs: Vec<PathBuf>,
        host: String,
        keep_open_files: bool,
    ) -> Self {
        if resume.finalized {
            info!(chain = %resume.chain_id, "chain already finalized; nothing to resume");
            return Self {
                chain_id: resume.chain_id,
                open: None,
                finalized: true,
            };
        }

        let mut open = match &resume.last_sealed {
            Some(sealed) => sealed.successor(),
            None => Segment::open_chain(resume.chain_id, backup_dirs, host, None, None),
        };
        debug_assert_eq!(open.sequence_number, resume.open_sequence);
        if keep_open_files {
            open.files = resume.open_files.clone();
        }

        info!(
            chain = %resume.chain_id,
            sequence = open.sequence_number,
            committed = open.files.len(),
            "resumed chain sequencing"
        );

        Self {
            chain_id: resume.chain_id,
            open: Some(open),
            finalized: false,
        }
    }

    /// Chain identity
    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Whether the chain's terminal segment has been produced
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// The open segment
    pub fn open(&self) -> Result<&Segment> {
        self.open
            .as_ref()
            .ok_or_else(|| Error::SequenceViolation("no open segment".to_string()))
    }

    /// The open segment, mutably
    pub fn open_mut(&mut self) -> Result<&mut Segment> {
        self.open
            .as_mut()
            .ok_or_else(|| Error::SequenceViolation("no open segment".to_string()))
    }

    /// Detach the open segment so the caller can seal it
    ///
    /// The chain has no open segment until [`advance_segment`] or
    /// [`finalize`] runs.
    ///
    /// [`advance_segment`]: ChainSequencer::advance_segment
    /// [`finalize`]: ChainSequencer::finalize
    pub fn detach_open(&mut self) -> Result<Segment> {
        if self.finalized {
            return Err(Error::SequenceViolation(
                "detach after chain was finalized".to_string(),
            ));
        }
        self.open
            .take()
            .ok_or_else(|| Error::SequenceViolation("no open segment to detach".to_string()))
    }

    /// Open the successor of a just-sealed segment
    ///
    /// Called only on volume exhaustion, after the sealed predecessor is
    /// durably in a catalog. Copies chain identity, increments the
    /// sequence number, clears the file list.
    pub fn advance_segment(&mut self, sealed: &Segment) -> Result<&mut Segment> {
        if self.finalized {
            return Err(Error::SequenceViolation(
                "advance after chain was finalized".to_string(),
            ));
        }
        if self.open.is_some() {
            return Err(Error::SequenceViolation(
                "advance while a segment is still open".to_string(),
            ));
        }
        if sealed.chain_id != self.chain_id {
            return Err(Error::SequenceViolation(format!(
                "advance with a segment of chain {} on chain {}",
                sealed.chain_id, self.chain_id
            )));
        }
        if sealed.is_final {
            return Err(Error::SequenceViolation(
                "advance past the final segment".to_string(),
            ));
        }

        let next = sealed.successor();
        debug!(chain = %self.chain_id, sequence = next.sequence_number, "advanced to next segment");
        Ok(self.open.insert(next))
    }

    /// Mark the open segment terminal and detach it for sealing
    ///
    /// Called only when source enumeration is exhausted, never because a
    /// volume filled.
    pub fn finalize(&mut self) -> Result<Segment> {
        if self.finalized {
            return Err(Error::SequenceViolation(
                "finalize after chain was finalized".to_string(),
            ));
        }
        let mut last = self
            .open
            .take()
            .ok_or_else(|| Error::SequenceViolation("finalize with no open segment".to_string()))?;
        last.is_final = true;
        self.finalized = true;
        info!(
            chain = %self.chain_id,
            sequence = last.sequence_number,
            "finalized chain"
        );
        Ok(last)
    }
}

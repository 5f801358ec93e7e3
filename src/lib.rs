//! Spanvault — backup-chain orchestration across removable volumes
//!
//! Spanvault backs up a directory tree too large for one disk across a
//! sequence of independently-mountable volumes, relying on no filesystem
//! feature beyond basic file storage. A backup is a *chain*: a totally
//! ordered sequence of *segments*, one per volume visited, all sharing one
//! uuid. Each volume carries a self-describing catalog of the segments
//! sealed onto it, and a run-local journal makes interrupted runs
//! resumable without re-copying completed files.
//!
//! # Quick start
//!
//! ```ignore
//! use spanvault::{BackupOptions, BackupSession, RunOutcome, VolumeQueue};
//!
//! let provider = VolumeQueue::new(["/mnt/vol-a", "/mnt/vol-b"]);
//! let mut session = BackupSession::begin(
//!     ".".as_ref(),
//!     vec!["/data".into()],
//!     "my-host",
//!     provider,
//!     BackupOptions::default(),
//! )?;
//!
//! match session.run(sources)? {
//!     RunOutcome::Completed { chain_id, .. } => println!("done: {chain_id}"),
//!     RunOutcome::PausedAwaitingVolume { .. } => {
//!         println!("attach another volume and resume with {}", session.journal_path().display())
//!     }
//! }
//! ```
//!
//! Restores need only the volumes themselves, in any order, on any
//! machine: [`plan_restore`] decides whether an attached subset suffices
//! (naming the exact missing segments when it does not) and
//! [`execute_restore`] applies the plan with per-file hash verification.

// Re-export the public API of the member crates
pub use spanvault_core::{
    hash_bytes, hash_file, ChainId, ContentHash, Error, FileTransaction, Result, Segment,
    Timestamp, VolumeId, VolumeInfo,
};
pub use spanvault_durability::{
    MountedVolumes, ResumePoint, RunJournal, Volume, VolumeCatalog, VolumeProvider, VolumeQueue,
    CATALOG_FILE_NAME,
};
pub use spanvault_engine::{
    execute_restore, plan_available, plan_restore, BackupOptions, BackupSession, ChainSequencer,
    PlanOutcome, RestorePlan, RestoreReport, RestoreStep, RunOutcome, SegmentWriter, WriteOutcome,
};

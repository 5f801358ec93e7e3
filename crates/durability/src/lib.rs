//! Durability layer for Spanvault
//!
//! This crate handles everything that touches disk:
//!
//! - Run journal: append-only, CRC-framed log of commit records, one per
//!   backup invocation, used exclusively for resume
//! - Volume catalog: single-file store at a well-known path on each volume,
//!   holding every segment ever sealed onto that volume
//! - Volume: a mounted catalog plus the root directory files are copied
//!   into, with a simulated-capacity gate for exhaustion testing
//!
//! The two persisted structures have different shapes on purpose. The
//! journal is an append-only log because every committed file is a resume
//! checkpoint that must never be rewritten. The catalog is a whole-document
//! atomic replace because sealing must make an entire segment record appear
//! at once or not at all.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod encoding;
pub mod journal;
pub mod volume;

pub use catalog::{VolumeCatalog, CATALOG_FILE_NAME, CATALOG_FORMAT_VERSION};
pub use encoding::JournalEntry;
pub use journal::{ResumePoint, RunJournal, JOURNAL_FILE_PREFIX, JOURNAL_FILE_SUFFIX};
pub use volume::{host_relative_dest, MountedVolumes, Volume, VolumeProvider, VolumeQueue};

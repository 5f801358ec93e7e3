//! Backup-chain orchestration engine
//!
//! The moving parts, in the order a run uses them:
//!
//! - [`ChainSequencer`]: owns chain identity and the single open segment;
//!   assigns monotonic sequence numbers and marks the terminal segment
//! - [`SegmentWriter`]: streams files onto the active volume, discovers
//!   exhaustion by observing the failed write, verifies every copy by
//!   re-reading it, and checkpoints each success in the run journal
//! - [`BackupSession`]: threads sequencer, writer, journal and active
//!   volume through one run; pauses (resumably) when the operator has no
//!   more volumes to offer
//! - [`plan_restore`]: decides, from whatever volumes happen to be
//!   attached, whether a chain can be reconstructed and in what order
//! - [`execute_restore`]: applies a plan, verifying content hashes on the
//!   way back out
//!
//! The engine is single-threaded and sequential by design: exactly one
//! volume is the active write target at any instant, matching the physical
//! constraint that only one removable volume is mounted for writing.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod planner;
pub mod restore;
pub mod sequencer;
pub mod session;
pub mod writer;

pub use planner::{plan_available, plan_restore, PlanOutcome, RestorePlan, RestoreStep};
pub use restore::{execute_restore, RestoreReport};
pub use sequencer::ChainSequencer;
pub use session::{BackupOptions, BackupSession, RunOutcome};
pub use writer::{SegmentWriter, WriteOutcome};

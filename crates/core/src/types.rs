//! Identity types for chains and volumes
//!
//! A backup chain and the volumes it spans are identified by independent
//! UUID namespaces. The newtypes below keep the two from being mixed up at
//! compile time: a `ChainId` never names a volume and vice versa.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Timestamp type used in all persisted records
pub type Timestamp = DateTime<Utc>;

/// Record format version stamped into segments and file transactions
///
/// Part of the on-disk format. Bump only with a migration path.
pub const RECORD_VERSION: u32 = 1;

/// Unique identifier for a backup chain
///
/// A chain is the full ordered sequence of segments produced by one logical
/// backup operation, possibly spanning many volumes. Every segment of the
/// chain carries this id; it is the only link between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChainId(Uuid);

impl ChainId {
    /// Allocate a fresh random chain id (UUID v4)
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from a string representation
    ///
    /// Accepts standard UUID format. Returns `None` if the string is not a
    /// valid UUID.
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ChainId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a volume
///
/// Assigned when a volume is first initialized and persisted in the volume's
/// catalog. Distinct from chain ids: one volume holds segments of any number
/// of chains, and one chain spans any number of volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VolumeId(Uuid);

impl VolumeId {
    /// Allocate a fresh random volume id (UUID v4)
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Parse from a string representation
    pub fn from_string(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }

    /// Underlying UUID
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for VolumeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

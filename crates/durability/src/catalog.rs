//! Per-volume catalog: the durable record of sealed segments
//!
//! Each volume carries one catalog file at a fixed, well-known name at its
//! root. The catalog holds the volume's identity and every segment ever
//! sealed onto it, across any number of chains. Restore depends on nothing
//! else: a volume plus its catalog is self-describing wherever it is later
//! mounted.
//!
//! ## File format
//!
//! ```text
//! [magic: u32][format version: u32][bincode document][crc32: u32]
//! ```
//!
//! The CRC covers magic, version and document. The file is always replaced
//! atomically (temp file + fsync + rename), so a crash during `seal` leaves
//! either the previous catalog or the new one — never a partial segment
//! record.

use crc32fast::Hasher;
use spanvault_core::{ChainId, Error, Result, Segment, VolumeId, VolumeInfo};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Well-known catalog file name at every volume root
pub const CATALOG_FILE_NAME: &str = "spanvault.catalog";

/// Catalog file magic: "SVCT"
pub const CATALOG_MAGIC: u32 = 0x5356_4354;

/// Current catalog format version
pub const CATALOG_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct CatalogDocument {
    info: VolumeInfo,
    segments: Vec<Segment>,
}

/// The catalog of one volume
pub struct VolumeCatalog {
    path: PathBuf,
    doc: CatalogDocument,
}

impl VolumeCatalog {
    /// Create a new catalog file for a freshly initialized volume
    ///
    /// Fails if `path` already exists.
    pub fn create(path: &Path, volume_id: VolumeId) -> Result<Self> {
        if path.exists() {
            return Err(Error::AlreadyInitialized(path.to_path_buf()));
        }
        let catalog = Self {
            path: path.to_path_buf(),
            doc: CatalogDocument {
                info: VolumeInfo::new(volume_id),
                segments: Vec::new(),
            },
        };
        catalog.persist()?;
        info!(path = %path.display(), volume = %volume_id, "created volume catalog");
        Ok(catalog)
    }

    /// Load an existing catalog, verifying magic, version and checksum
    pub fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::UninitializedVolume(path.to_path_buf()),
            _ => Error::Io(e),
        })?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        if bytes.len() < 12 {
            return Err(Error::CatalogCorruption(format!(
                "{}: file too short ({} bytes)",
                path.display(),
                bytes.len()
            )));
        }

        let magic = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != CATALOG_MAGIC {
            return Err(Error::CatalogCorruption(format!(
                "{}: bad magic {:#010x}",
                path.display(),
                magic
            )));
        }

        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != CATALOG_FORMAT_VERSION {
            return Err(Error::CatalogCorruption(format!(
                "{}: unsupported format version {}",
                path.display(),
                version
            )));
        }

        let body = &bytes[..bytes.len() - 4];
        let crc_bytes = &bytes[bytes.len() - 4..];
        let stored_crc =
            u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let mut hasher = Hasher::new();
        hasher.update(body);
        if hasher.finalize() != stored_crc {
            return Err(Error::CatalogCorruption(format!(
                "{}: CRC mismatch",
                path.display()
            )));
        }

        let doc: CatalogDocument = bincode::deserialize(&body[8..]).map_err(|e| {
            Error::CatalogCorruption(format!("{}: undecodable document: {}", path.display(), e))
        })?;

        debug!(
            path = %path.display(),
            volume = %doc.info.volume_id,
            segments = doc.segments.len(),
            "loaded volume catalog"
        );

        Ok(Self {
            path: path.to_path_buf(),
            doc,
        })
    }

    /// Identity of the volume this catalog belongs to
    pub fn volume_id(&self) -> VolumeId {
        self.doc.info.volume_id
    }

    /// The volume's identity record
    pub fn info(&self) -> VolumeInfo {
        self.doc.info
    }

    /// Path of the catalog file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seal a segment into this catalog, atomically
    ///
    /// Re-sealing an identical record is a no-op: a crash between catalog
    /// write and journal append makes the resumed run seal the same segment
    /// again. A record that collides on `(chain, sequence)` with different
    /// content means a reused chain uuid from an unrelated run, which is a
    /// sequence violation, not something to merge.
    pub fn seal(&mut self, segment: &Segment) -> Result<()> {
        if let Some(existing) = self
            .doc
            .segments
            .iter()
            .find(|s| s.chain_id == segment.chain_id && s.sequence_number == segment.sequence_number)
        {
            if existing.same_content(segment) {
                debug!(
                    chain = %segment.chain_id,
                    sequence = segment.sequence_number,
                    "segment already sealed; seal is idempotent"
                );
                return Ok(());
            }
            return Err(Error::SequenceViolation(format!(
                "volume {} already holds a different segment {} of chain {}",
                self.volume_id(),
                segment.sequence_number,
                segment.chain_id
            )));
        }

        self.doc.segments.push(segment.clone());
        self.persist()?;

        info!(
            chain = %segment.chain_id,
            sequence = segment.sequence_number,
            files = segment.files.len(),
            is_final = segment.is_final,
            volume = %self.volume_id(),
            "sealed segment into catalog"
        );
        Ok(())
    }

    /// Sealed segments, optionally filtered by chain, ascending by
    /// `(chain, sequence_number)`
    pub fn list_segments(&self, chain: Option<ChainId>) -> Vec<&Segment> {
        let mut segments: Vec<&Segment> = self
            .doc
            .segments
            .iter()
            .filter(|s| chain.map(|c| s.chain_id == c).unwrap_or(true))
            .collect();
        segments.sort_by_key(|s| (s.chain_id, s.sequence_number));
        segments
    }

    /// Whether a specific segment of a chain is sealed here
    pub fn contains(&self, chain: ChainId, sequence_number: u64) -> bool {
        self.doc
            .segments
            .iter()
            .any(|s| s.chain_id == chain && s.sequence_number == sequence_number)
    }

    /// Chains with at least one segment on this volume
    pub fn chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = Vec::new();
        for segment in &self.doc.segments {
            if !chains.contains(&segment.chain_id) {
                chains.push(segment.chain_id);
            }
        }
        chains
    }

    /// Atomic whole-file replace: temp file, fsync, rename, fsync dir
    fn persist(&self) -> Result<()> {
        let payload = bincode::serialize(&self.doc)?;

        let mut body = Vec::with_capacity(8 + payload.len() + 4);
        body.extend_from_slice(&CATALOG_MAGIC.to_le_bytes());
        body.extend_from_slice(&CATALOG_FORMAT_VERSION.to_le_bytes());
        body.extend_from_slice(&payload);

        let mut hasher = Hasher::new();
        hasher.update(&body);
        body.extend_from_slice(&hasher.finalize().to_le_bytes());

        let tmp_path = self.path.with_extension("catalog.tmp");
        {
            let mut tmp = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            tmp.write_all(&body)?;
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        #[cfg(unix)]
        if let Some(parent) = self.path.parent() {
            File::open(parent)?.sync_all()?;
        }

        Ok(())
    }
}

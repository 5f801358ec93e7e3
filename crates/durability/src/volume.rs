//! A mounted volume: root directory plus catalog
//!
//! Files are stored under a namespace keyed by originating host name
//! (`<root>/<host>/<source path relativized>`), so volumes shared between
//! hosts never collide on destination paths.
//!
//! The volume also carries a simulated-capacity gate used by the
//! exhaustion test harness: real exhaustion is only ever discovered by a
//! failed write (there is no pre-flight free-space check), and the gate
//! lets tests produce that same failure deterministically on any
//! filesystem.

use crate::catalog::{VolumeCatalog, CATALOG_FILE_NAME};
use spanvault_core::{ChainId, Error, Result, Segment, VolumeId};
use std::collections::VecDeque;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// One mountable storage target
pub struct Volume {
    root: PathBuf,
    catalog: VolumeCatalog,
    /// Simulated capacity in bytes; `u64::MAX` means unlimited
    capacity: AtomicU64,
    /// Bytes charged against the simulated capacity
    charged: AtomicU64,
}

impl Volume {
    /// Initialize a volume at `root`
    ///
    /// If a catalog already exists it is reused, unless `reuse` is false in
    /// which case initialization fails. A new catalog gets a fresh volume
    /// uuid.
    pub fn init(root: &Path, reuse: bool) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("volume root {} is not a directory", root.display()),
            )));
        }

        let catalog_path = root.join(CATALOG_FILE_NAME);
        let catalog = if catalog_path.exists() {
            if !reuse {
                return Err(Error::AlreadyInitialized(root.to_path_buf()));
            }
            VolumeCatalog::load(&catalog_path)?
        } else {
            VolumeCatalog::create(&catalog_path, VolumeId::new())?
        };

        info!(root = %root.display(), volume = %catalog.volume_id(), "volume ready");

        Ok(Self {
            root: root.to_path_buf(),
            catalog,
            capacity: AtomicU64::new(u64::MAX),
            charged: AtomicU64::new(0),
        })
    }

    /// Open an already-initialized volume; fails if no catalog is present
    pub fn open(root: &Path) -> Result<Self> {
        let catalog = VolumeCatalog::load(&root.join(CATALOG_FILE_NAME))?;
        Ok(Self {
            root: root.to_path_buf(),
            catalog,
            capacity: AtomicU64::new(u64::MAX),
            charged: AtomicU64::new(0),
        })
    }

    /// Volume identity, from the catalog
    pub fn id(&self) -> VolumeId {
        self.catalog.volume_id()
    }

    /// Root directory of the volume
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The volume's catalog
    pub fn catalog(&self) -> &VolumeCatalog {
        &self.catalog
    }

    /// Seal a segment into this volume's catalog
    pub fn seal(&mut self, segment: &Segment) -> Result<()> {
        self.catalog.seal(segment)
    }

    /// Sealed segments of one chain, ascending by sequence number
    pub fn segments_for(&self, chain: ChainId) -> Vec<Segment> {
        self.catalog
            .list_segments(Some(chain))
            .into_iter()
            .cloned()
            .collect()
    }

    /// Absolute destination for a source file on this volume
    ///
    /// Returns both the volume-relative path (what gets persisted in the
    /// transaction record) and the absolute path to write to.
    pub fn dest_for(&self, host: &str, source: &Path) -> Result<(PathBuf, PathBuf)> {
        let relative = host_relative_dest(host, source)?;
        let absolute = self.root.join(&relative);
        Ok((relative, absolute))
    }

    // --- simulated capacity, for the exhaustion test harness ---

    /// Limit this volume to `bytes` of file data
    ///
    /// Writes beyond the limit fail exactly like a full device. Only used
    /// by tests and demos; real volumes report exhaustion on their own.
    pub fn set_simulated_capacity(&self, bytes: u64) {
        self.capacity.store(bytes, Ordering::SeqCst);
    }

    /// Try to charge `bytes` against the simulated capacity
    ///
    /// Always succeeds on an unlimited volume.
    pub fn try_charge(&self, bytes: u64) -> bool {
        if self.capacity.load(Ordering::SeqCst) == u64::MAX {
            return true;
        }
        let mut used = self.charged.load(Ordering::SeqCst);
        loop {
            let next = used.saturating_add(bytes);
            if next > self.capacity.load(Ordering::SeqCst) {
                return false;
            }
            match self.charged.compare_exchange(
                used,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(current) => used = current,
            }
        }
    }

    /// Return bytes charged for a write that was rolled back
    pub fn refund(&self, bytes: u64) {
        let mut used = self.charged.load(Ordering::SeqCst);
        loop {
            let next = used.saturating_sub(bytes);
            match self.charged.compare_exchange(
                used,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return,
                Err(current) => used = current,
            }
        }
    }
}

/// Source of volumes, supplied by the operator layer
///
/// The engine never discovers volumes on its own: mounting and path
/// resolution live outside the core. The one question it asks is "what is
/// the next volume?", and only when the active one is exhausted. `None`
/// pauses the run (no spin-wait); the journal makes it resumable.
pub trait VolumeProvider {
    /// The next volume to write to, or `None` to pause the run
    fn next_volume(&mut self) -> Option<Result<Volume>>;
}

/// A fixed, ordered queue of volume roots, initialized on demand
///
/// The common case for the CLI: volumes are listed on the command line and
/// each is initialized (reusing any existing catalog) when its turn comes.
#[derive(Debug, Default)]
pub struct VolumeQueue {
    roots: VecDeque<PathBuf>,
}

impl VolumeQueue {
    /// Build a queue from volume roots in the order they should be used
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        Self {
            roots: roots.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of volumes still queued
    pub fn remaining(&self) -> usize {
        self.roots.len()
    }
}

impl VolumeProvider for VolumeQueue {
    fn next_volume(&mut self) -> Option<Result<Volume>> {
        let root = self.roots.pop_front()?;
        Some(Volume::init(&root, true))
    }
}

/// Already-opened volumes handed out in order
///
/// Used by test harnesses that need to configure volumes (capacity limits,
/// pre-seeded catalogs) before the session sees them.
#[derive(Default)]
pub struct MountedVolumes {
    volumes: VecDeque<Volume>,
}

impl MountedVolumes {
    /// Queue volumes in the order they should be offered
    pub fn new<I>(volumes: I) -> Self
    where
        I: IntoIterator<Item = Volume>,
    {
        Self {
            volumes: volumes.into_iter().collect(),
        }
    }
}

impl VolumeProvider for MountedVolumes {
    fn next_volume(&mut self) -> Option<Result<Volume>> {
        self.volumes.pop_front().map(Ok)
    }
}

/// Volume-relative destination path for a source file
///
/// The absolute source path is namespaced under the originating host:
/// `/data/photos/a.jpg` backed up from `host-a` lands at
/// `host-a/data/photos/a.jpg`. Root and drive-prefix components are
/// dropped; the rest of the structure is preserved.
pub fn host_relative_dest(host: &str, source: &Path) -> Result<PathBuf> {
    if !source.is_absolute() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("source path must be absolute: {}", source.display()),
        )));
    }

    let mut dest = PathBuf::from(host);
    for component in source.components() {
        match component {
            Component::RootDir | Component::Prefix(_) => continue,
            Component::CurDir => continue,
            Component::Normal(part) => dest.push(part),
            Component::ParentDir => {
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("source path must not contain '..': {}", source.display()),
                )))
            }
        }
    }
    Ok(dest)
}

//! Restore executor: apply a plan back onto the local filesystem
//!
//! Segments are applied in ascending sequence order; within a segment the
//! file order is immaterial because destinations are disjoint by path.
//! Every file is hashed while being copied off the volume and the digest
//! is compared against the transaction record, so silent bit rot on a
//! stored volume surfaces as an integrity failure rather than a corrupt
//! restore.

use crate::planner::RestorePlan;
use spanvault_core::{
    hash::StreamingHasher, Error, FileTransaction, Result,
};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};

const COPY_BUFFER: usize = 1 << 20;

/// What a restore accomplished
#[derive(Debug, Default)]
pub struct RestoreReport {
    /// Files written to the output root
    pub files_restored: u64,
    /// Bytes written to the output root
    pub bytes_restored: u64,
    /// Files skipped in best-effort mode, with the reason
    pub skipped: Vec<(PathBuf, String)>,
}

/// Apply `plan` under `output_root`
///
/// The original absolute source structure is recreated beneath the output
/// root. With `best_effort` a file that fails verification is skipped and
/// reported; otherwise the first failure aborts the restore.
pub fn execute_restore(
    plan: &RestorePlan,
    output_root: &Path,
    best_effort: bool,
) -> Result<RestoreReport> {
    let mut report = RestoreReport::default();

    for step in &plan.steps {
        info!(
            chain = %plan.chain_id,
            sequence = step.segment.sequence_number,
            volume = %step.volume_id,
            files = step.segment.files.len(),
            "applying segment"
        );

        for transaction in &step.segment.files {
            match restore_one(transaction, &step.volume_root, output_root) {
                Ok(bytes) => {
                    report.files_restored += 1;
                    report.bytes_restored += bytes;
                }
                Err(e) if best_effort => {
                    warn!(
                        source = %transaction.source_path.display(),
                        error = %e,
                        "skipping file in best-effort restore"
                    );
                    report
                        .skipped
                        .push((transaction.source_path.clone(), e.to_string()));
                }
                Err(e) => return Err(e),
            }
        }
    }

    info!(
        chain = %plan.chain_id,
        files = report.files_restored,
        bytes = report.bytes_restored,
        skipped = report.skipped.len(),
        "restore finished"
    );

    Ok(report)
}

/// Copy one transaction off its volume, verifying the content hash
fn restore_one(
    transaction: &FileTransaction,
    volume_root: &Path,
    output_root: &Path,
) -> Result<u64> {
    let stored = volume_root.join(&transaction.dest_path);
    let target = output_root.join(strip_root(&transaction.source_path));

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut reader = File::open(&stored)?;
    let mut writer = File::create(&target)?;
    let mut hasher = StreamingHasher::new();
    let mut buffer = vec![0u8; COPY_BUFFER];
    let mut copied = 0u64;

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        writer.write_all(&buffer[..n])?;
        copied += n as u64;
    }
    writer.sync_all()?;
    drop(writer);

    let actual = hasher.finalize();
    if actual != transaction.content_hash {
        // Do not leave a corrupt file masquerading as restored data.
        let _ = std::fs::remove_file(&target);
        return Err(Error::Integrity {
            path: stored,
            expected: transaction.content_hash,
            actual,
        });
    }

    Ok(copied)
}

/// Drop root and drive-prefix components so an absolute source path can be
/// recreated beneath the output root
fn strip_root(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .collect()
}

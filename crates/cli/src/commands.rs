//! Subcommand implementations
//!
//! Everything the engine treats as an external service lives here: source
//! enumeration (walkdir), hostname discovery, and operator-facing output.

use spanvault_core::ChainId;
use spanvault_durability::{Volume, VolumeQueue};
use spanvault_engine::{
    execute_restore, plan_available, plan_restore, BackupOptions, BackupSession, PlanOutcome,
    RunOutcome,
};
use std::path::{Path, PathBuf};
use tracing::debug;

type CmdResult = Result<(), String>;

/// Arguments for the `backup` subcommand
pub struct BackupArgs {
    pub backup_paths: Vec<PathBuf>,
    pub volumes: Vec<PathBuf>,
    pub resume_log: Option<PathBuf>,
    pub journal_dir: PathBuf,
    pub name: Option<String>,
    pub comment: Option<String>,
    pub allow_host_mismatch: bool,
    pub force_new_volume: bool,
}

/// `spanvault init <dir>`
pub fn init(dir: &Path, fresh: bool) -> CmdResult {
    let volume = Volume::init(dir, !fresh).map_err(|e| e.to_string())?;
    println!("volume {} ready at {}", volume.id(), dir.display());
    Ok(())
}

/// `spanvault backup -b <path>.. -s <volume>..`
pub fn backup(args: BackupArgs) -> CmdResult {
    let host = hostname();
    let sources = enumerate_sources(&args.backup_paths)?;
    println!("{} files to consider from {} path(s)", sources.len(), args.backup_paths.len());

    let backup_dirs: Vec<PathBuf> = args
        .backup_paths
        .iter()
        .map(|p| p.canonicalize().map_err(|e| format!("{}: {}", p.display(), e)))
        .collect::<Result<_, _>>()?;

    let provider = VolumeQueue::new(args.volumes.clone());
    let options = BackupOptions {
        name: args.name,
        comment: args.comment,
        allow_host_mismatch: args.allow_host_mismatch,
        retarget_open_segment: args.force_new_volume,
    };

    let mut session = match &args.resume_log {
        Some(journal_path) => {
            BackupSession::resume(journal_path, backup_dirs, &host, provider, options)
                .map_err(|e| e.to_string())?
        }
        None => BackupSession::begin(&args.journal_dir, backup_dirs, &host, provider, options)
            .map_err(|e| e.to_string())?,
    };

    let journal_path = session.journal_path().to_path_buf();
    let outcome = session.run(sources).map_err(|e| e.to_string())?;

    match outcome {
        RunOutcome::Completed {
            chain_id,
            segments,
            files_copied,
        } => {
            println!(
                "backup complete: chain {} ({} segment(s), {} file(s) copied this run)",
                chain_id, segments, files_copied
            );
        }
        RunOutcome::PausedAwaitingVolume {
            chain_id,
            sequence_number,
        } => {
            println!(
                "no more volumes left; chain {} paused at segment {}",
                chain_id, sequence_number
            );
            println!("attach another volume and resume using:");
            println!(
                "  spanvault backup --resume-using {} -b ... -s <new volume>",
                journal_path.display()
            );
        }
    }
    Ok(())
}

/// `spanvault plan <chain> -s <volume>..`
pub fn plan(chain: &str, volume_roots: &[PathBuf]) -> CmdResult {
    let chain = parse_chain(chain)?;
    let volumes = open_volumes(volume_roots)?;

    match plan_restore(chain, &volumes).map_err(|e| e.to_string())? {
        PlanOutcome::Ready(plan) => {
            println!(
                "chain {} is restorable: {} segment(s), {} file(s), {} byte(s)",
                chain,
                plan.steps.len(),
                plan.file_count(),
                plan.byte_count()
            );
            for step in &plan.steps {
                println!(
                    "  segment {:>4}  volume {}  {} file(s){}",
                    step.segment.sequence_number,
                    step.volume_id,
                    step.segment.files.len(),
                    if step.segment.is_final { "  [final]" } else { "" }
                );
            }
        }
        PlanOutcome::Incomplete { missing, hints, .. } => {
            println!("chain {} is NOT restorable from the attached volumes", chain);
            if !missing.is_empty() {
                println!(
                    "  missing segment(s): {}",
                    missing
                        .iter()
                        .map(u64::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
            for hint in hints {
                println!("  note: {}", hint);
            }
        }
    }
    Ok(())
}

/// `spanvault restore <chain> -s <volume>.. -o <dir>`
pub fn restore(chain: &str, volume_roots: &[PathBuf], output: &Path, partial: bool) -> CmdResult {
    let chain = parse_chain(chain)?;
    let volumes = open_volumes(volume_roots)?;

    let plan = match plan_restore(chain, &volumes).map_err(|e| e.to_string())? {
        PlanOutcome::Ready(plan) => plan,
        PlanOutcome::Incomplete { missing, hints, .. } => {
            if !partial {
                let mut message = format!(
                    "chain {} is incomplete (missing segment(s): {})",
                    chain,
                    missing
                        .iter()
                        .map(u64::to_string)
                        .collect::<Vec<_>>()
                        .join(", ")
                );
                for hint in hints {
                    message.push_str(&format!("\n  note: {}", hint));
                }
                message.push_str("\n  re-run with --partial for a best-effort restore");
                return Err(message);
            }
            println!(
                "chain {} is incomplete; restoring available segments only",
                chain
            );
            plan_available(chain, &volumes).map_err(|e| e.to_string())?
        }
    };

    std::fs::create_dir_all(output).map_err(|e| e.to_string())?;
    let report = execute_restore(&plan, output, partial).map_err(|e| e.to_string())?;

    println!(
        "restored {} file(s), {} byte(s) into {}",
        report.files_restored,
        report.bytes_restored,
        output.display()
    );
    for (path, reason) in &report.skipped {
        println!("  skipped {}: {}", path.display(), reason);
    }
    Ok(())
}

/// `spanvault show <volume>`
pub fn show(root: &Path) -> CmdResult {
    let volume = Volume::open(root).map_err(|e| e.to_string())?;
    println!("volume {} at {}", volume.id(), root.display());

    let catalog = volume.catalog();
    let chains = catalog.chains();
    if chains.is_empty() {
        println!("  no sealed segments");
        return Ok(());
    }
    for chain in chains {
        println!("  chain {}", chain);
        for segment in catalog.list_segments(Some(chain)) {
            println!(
                "    segment {:>4}  {}  {} file(s), {} byte(s){}",
                segment.sequence_number,
                segment.timestamp.format("%Y-%m-%d %H:%M:%S"),
                segment.files.len(),
                segment.bytes(),
                if segment.is_final { "  [final]" } else { "" }
            );
        }
    }
    Ok(())
}

/// Enumerate source files beneath the given paths
///
/// Directories are walked depth-first in sorted order so a resumed run
/// sees the same sequence as the interrupted one. Plain files are taken
/// as-is. All results are canonical absolute paths.
fn enumerate_sources(paths: &[PathBuf]) -> Result<Vec<PathBuf>, String> {
    let mut sources = Vec::new();
    for path in paths {
        let path = path
            .canonicalize()
            .map_err(|e| format!("{}: {}", path.display(), e))?;
        if path.is_file() {
            sources.push(path);
            continue;
        }
        for entry in walkdir::WalkDir::new(&path)
            .sort_by_file_name()
            .into_iter()
        {
            let entry = entry.map_err(|e| e.to_string())?;
            if entry.file_type().is_file() {
                debug!(path = %entry.path().display(), "enumerated source");
                sources.push(entry.path().to_path_buf());
            }
        }
    }
    Ok(sources)
}

fn open_volumes(roots: &[PathBuf]) -> Result<Vec<Volume>, String> {
    roots
        .iter()
        .map(|root| Volume::open(root).map_err(|e| e.to_string()))
        .collect()
}

fn parse_chain(s: &str) -> Result<ChainId, String> {
    ChainId::from_string(s).ok_or_else(|| format!("'{}' is not a valid chain uuid", s))
}

fn hostname() -> String {
    gethostname::gethostname().to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enumerate_sources_sorted_and_absolute() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("sub/c.txt"), b"c").unwrap();

        let sources = enumerate_sources(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(sources.len(), 3);
        assert!(sources.iter().all(|p| p.is_absolute()));

        let names: Vec<String> = sources
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn test_enumerate_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("only.txt");
        std::fs::write(&file, b"x").unwrap();

        let sources = enumerate_sources(&[file.clone()]).unwrap();
        assert_eq!(sources.len(), 1);
    }

    #[test]
    fn test_parse_chain_rejects_garbage() {
        assert!(parse_chain("nope").is_err());
    }
}

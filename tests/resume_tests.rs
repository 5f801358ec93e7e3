//! Resume tests
//!
//! Interrupting a run and resuming it must produce exactly the transaction
//! set an uninterrupted run would have produced: no file copied twice, no
//! file lost, whether the interruption was running out of volumes or a
//! mid-segment failure.

use spanvault::{
    BackupOptions, BackupSession, MountedVolumes, RunOutcome, Volume,
};
use std::collections::HashMap;
use std::path::PathBuf;
use tempfile::TempDir;

const FILE_SIZE: usize = 1000;

fn sources(dir: &TempDir, count: u8) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for i in 0..count {
        let path = dir.path().join(format!("file-{}.bin", i));
        std::fs::write(&path, vec![i; FILE_SIZE]).unwrap();
        paths.push(path.canonicalize().unwrap());
    }
    paths
}

/// Every committed transaction across all volumes, keyed by dest path
fn all_transactions(volume_dirs: &[&TempDir], chain: spanvault::ChainId) -> HashMap<PathBuf, u64> {
    let mut by_dest = HashMap::new();
    for dir in volume_dirs {
        let volume = Volume::open(dir.path()).unwrap();
        for segment in volume.segments_for(chain) {
            for txn in &segment.files {
                let previous = by_dest.insert(txn.dest_path.clone(), txn.size);
                assert!(
                    previous.is_none(),
                    "dest {} recorded twice",
                    txn.dest_path.display()
                );
            }
        }
    }
    by_dest
}

#[test]
fn test_pause_then_resume_equals_uninterrupted_run() {
    let source_dir = tempfile::tempdir().unwrap();
    let journal_dir = tempfile::tempdir().unwrap();
    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let sources = sources(&source_dir, 4);

    // First invocation has only the small volume A: two files land, then
    // the run pauses out of volumes.
    let vol_a = Volume::init(dir_a.path(), true).unwrap();
    vol_a.set_simulated_capacity(2 * FILE_SIZE as u64 + 500);

    let mut session = BackupSession::begin(
        journal_dir.path(),
        vec![source_dir.path().to_path_buf()],
        "host-a",
        MountedVolumes::new([vol_a]),
        BackupOptions::default(),
    )
    .unwrap();
    let chain = session.chain_id();
    let journal_path = session.journal_path().to_path_buf();

    let outcome = session.run(sources.clone()).unwrap();
    let RunOutcome::PausedAwaitingVolume {
        chain_id,
        sequence_number,
    } = outcome
    else {
        panic!("expected PausedAwaitingVolume");
    };
    assert_eq!(chain_id, chain);
    assert_eq!(sequence_number, 1);
    drop(session);

    // Second invocation resumes from the journal with volume B attached.
    let vol_b = Volume::init(dir_b.path(), true).unwrap();
    let mut resumed = BackupSession::resume(
        &journal_path,
        vec![source_dir.path().to_path_buf()],
        "host-a",
        MountedVolumes::new([vol_b]),
        BackupOptions::default(),
    )
    .unwrap();
    assert_eq!(resumed.chain_id(), chain);

    let outcome = resumed.run(sources.clone()).unwrap();
    let RunOutcome::Completed {
        segments,
        files_copied,
        ..
    } = outcome
    else {
        panic!("expected Completed");
    };
    assert_eq!(segments, 2);
    assert_eq!(files_copied, 2, "only the unfinished files are copied");

    // Same final transaction set as an uninterrupted run: all four
    // sources, each exactly once.
    let by_dest = all_transactions(&[&dir_a, &dir_b], chain);
    assert_eq!(by_dest.len(), 4);
    assert!(by_dest.values().all(|&size| size == FILE_SIZE as u64));
}

#[test]
fn test_resume_of_completed_chain_is_idempotent() {
    let source_dir = tempfile::tempdir().unwrap();
    let journal_dir = tempfile::tempdir().unwrap();
    let dir_a = tempfile::tempdir().unwrap();
    let sources = sources(&source_dir, 2);

    let vol_a = Volume::init(dir_a.path(), true).unwrap();
    let mut session = BackupSession::begin(
        journal_dir.path(),
        vec![source_dir.path().to_path_buf()],
        "host-a",
        MountedVolumes::new([vol_a]),
        BackupOptions::default(),
    )
    .unwrap();
    let chain = session.chain_id();
    let journal_path = session.journal_path().to_path_buf();
    assert!(matches!(
        session.run(sources.clone()).unwrap(),
        RunOutcome::Completed { .. }
    ));
    drop(session);

    // Resuming a finished run copies nothing and completes immediately,
    // even with no volumes attached.
    let mut resumed = BackupSession::resume(
        &journal_path,
        vec![source_dir.path().to_path_buf()],
        "host-a",
        MountedVolumes::default(),
        BackupOptions::default(),
    )
    .unwrap();
    let outcome = resumed.run(sources).unwrap();
    let RunOutcome::Completed { files_copied, .. } = outcome else {
        panic!("expected Completed");
    };
    assert_eq!(files_copied, 0);

    let by_dest = all_transactions(&[&dir_a], chain);
    assert_eq!(by_dest.len(), 2);
}

#[test]
fn test_mid_segment_interruption_resumes_without_duplicates() {
    let source_dir = tempfile::tempdir().unwrap();
    let journal_dir = tempfile::tempdir().unwrap();
    let dir_a = tempfile::tempdir().unwrap();
    let sources = sources(&source_dir, 4);

    // Interrupt mid-segment: a bogus entry in the enumeration makes the
    // run abort with an I/O error after two files are committed.
    let vol_a = Volume::init(dir_a.path(), true).unwrap();
    let mut session = BackupSession::begin(
        journal_dir.path(),
        vec![source_dir.path().to_path_buf()],
        "host-a",
        MountedVolumes::new([vol_a]),
        BackupOptions::default(),
    )
    .unwrap();
    let chain = session.chain_id();
    let journal_path = session.journal_path().to_path_buf();

    let mut interrupted: Vec<PathBuf> = sources[..2].to_vec();
    interrupted.push(source_dir.path().join("does-not-exist.bin"));
    assert!(session.run(interrupted).is_err());
    drop(session);

    // Resume on the same volume: the open segment continues where it
    // stopped, and only the two remaining files are copied.
    let vol_a_again = Volume::open(dir_a.path()).unwrap();
    let mut resumed = BackupSession::resume(
        &journal_path,
        vec![source_dir.path().to_path_buf()],
        "host-a",
        MountedVolumes::new([vol_a_again]),
        BackupOptions::default(),
    )
    .unwrap();
    let outcome = resumed.run(sources.clone()).unwrap();
    let RunOutcome::Completed {
        segments,
        files_copied,
        ..
    } = outcome
    else {
        panic!("expected Completed");
    };
    assert_eq!(segments, 1);
    assert_eq!(files_copied, 2);

    // One segment, four files, no duplicates
    let by_dest = all_transactions(&[&dir_a], chain);
    assert_eq!(by_dest.len(), 4);

    let volume = Volume::open(dir_a.path()).unwrap();
    let sealed = volume.segments_for(chain);
    assert_eq!(sealed.len(), 1);
    assert!(sealed[0].is_final);
    assert_eq!(sealed[0].files.len(), 4);
}

#[test]
fn test_resume_onto_wrong_volume_is_refused() {
    let source_dir = tempfile::tempdir().unwrap();
    let journal_dir = tempfile::tempdir().unwrap();
    let dir_a = tempfile::tempdir().unwrap();
    let dir_other = tempfile::tempdir().unwrap();
    let sources = sources(&source_dir, 3);

    let vol_a = Volume::init(dir_a.path(), true).unwrap();
    let mut session = BackupSession::begin(
        journal_dir.path(),
        vec![source_dir.path().to_path_buf()],
        "host-a",
        MountedVolumes::new([vol_a]),
        BackupOptions::default(),
    )
    .unwrap();
    let journal_path = session.journal_path().to_path_buf();

    let mut interrupted: Vec<PathBuf> = sources[..1].to_vec();
    interrupted.push(source_dir.path().join("does-not-exist.bin"));
    assert!(session.run(interrupted).is_err());
    drop(session);

    // The open segment lives on volume A; offering a different volume
    // without the retarget override must fail.
    let vol_other = Volume::init(dir_other.path(), true).unwrap();
    let mut resumed = BackupSession::resume(
        &journal_path,
        vec![source_dir.path().to_path_buf()],
        "host-a",
        MountedVolumes::new([vol_other]),
        BackupOptions::default(),
    )
    .unwrap();
    assert!(matches!(
        resumed.run(sources.clone()),
        Err(spanvault::Error::VolumeMismatch { .. })
    ));

    // With the override the open segment restarts on the new volume and
    // the chain still comes out whole there.
    let vol_other = Volume::open(dir_other.path()).unwrap();
    let chain = {
        let mut retargeted = BackupSession::resume(
            &journal_path,
            vec![source_dir.path().to_path_buf()],
            "host-a",
            MountedVolumes::new([vol_other]),
            BackupOptions {
                retarget_open_segment: true,
                ..Default::default()
            },
        )
        .unwrap();
        let outcome = retargeted.run(sources.clone()).unwrap();
        let RunOutcome::Completed { files_copied, .. } = outcome else {
            panic!("expected Completed");
        };
        // All three files land on the new volume, including the one that
        // had already been committed to the lost volume.
        assert_eq!(files_copied, 3);
        retargeted.chain_id()
    };

    let by_dest = all_transactions(&[&dir_other], chain);
    assert_eq!(by_dest.len(), 3);
}

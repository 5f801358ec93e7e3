//! Planner completeness properties
//!
//! For any chain laid out one segment per volume and any subset of those
//! volumes attached, the planner must either produce the fully ordered
//! plan (subset sufficient) or name exactly the sequence numbers that are
//! missing below the highest attached one.

use proptest::prelude::*;
use spanvault::{plan_restore, ChainId, PlanOutcome, Segment, Volume};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tempfile::TempDir;

/// Seal segment `seq` of `chain` onto a fresh volume of its own
fn volume_with_segment(chain: ChainId, seq: u64, is_final: bool) -> (TempDir, Volume) {
    let dir = tempfile::tempdir().unwrap();
    let mut volume = Volume::init(dir.path(), true).unwrap();

    let mut segment = Segment::open_chain(
        chain,
        vec![PathBuf::from("/data")],
        "host-a".to_string(),
        None,
        None,
    );
    segment.sequence_number = seq;
    segment.is_final = is_final;
    volume.seal(&segment).unwrap();

    (dir, volume)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_planner_reports_exact_missing_set(
        total in 1u64..7,
        subset_bits in prop::collection::vec(any::<bool>(), 7),
    ) {
        let chain = ChainId::new();

        // One volume per segment; the last segment is terminal
        let mut keep = Vec::new();
        let mut attached = Vec::new();
        let mut present = BTreeSet::new();
        for seq in 0..total {
            if subset_bits[seq as usize] {
                let (dir, volume) = volume_with_segment(chain, seq, seq + 1 == total);
                keep.push(dir);
                attached.push(volume);
                present.insert(seq);
            }
        }

        let outcome = plan_restore(chain, &attached).unwrap();

        if present.is_empty() {
            let PlanOutcome::Incomplete { missing, .. } = outcome else {
                panic!("no volumes attached but plan is ready");
            };
            prop_assert_eq!(missing, vec![0]);
            return Ok(());
        }

        let max_present = *present.iter().next_back().unwrap();
        let expected_missing: Vec<u64> =
            (0..=max_present).filter(|s| !present.contains(s)).collect();
        let has_final = present.contains(&(total - 1));

        match outcome {
            PlanOutcome::Ready(plan) => {
                prop_assert!(expected_missing.is_empty());
                prop_assert!(has_final);
                let sequences: Vec<u64> = plan
                    .steps
                    .iter()
                    .map(|s| s.segment.sequence_number)
                    .collect();
                let expected: Vec<u64> = (0..total).collect();
                prop_assert_eq!(sequences, expected);
            }
            PlanOutcome::Incomplete { missing, hints, .. } => {
                prop_assert!(!expected_missing.is_empty() || !has_final);
                prop_assert_eq!(&missing, &expected_missing);
                if !has_final {
                    prop_assert!(hints.iter().any(|h| h.contains("no terminal segment")));
                }
            }
        }
    }
}

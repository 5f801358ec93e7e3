//! Reconstruction planner: from a pool of volumes to an ordered plan
//!
//! The planner reads volume catalogs only — never the run journal — so it
//! works on any machine with any subset of volumes attached, in any order.
//! A chain is restorable iff segments `0..=max` are all present and the
//! segment at `max` is the terminal one. Anything less yields the exact
//! missing sequence numbers; a known-incomplete plan is never silently
//! executed.

use spanvault_core::{ChainId, Error, Result, Segment, VolumeId};
use spanvault_durability::Volume;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, warn};

/// One step of a restore: a segment and the volume that holds it
#[derive(Debug, Clone)]
pub struct RestoreStep {
    /// The sealed segment to apply
    pub segment: Segment,
    /// Volume holding the segment's files
    pub volume_id: VolumeId,
    /// Where that volume is currently mounted
    pub volume_root: PathBuf,
}

/// Ordered application plan for one chain
#[derive(Debug, Clone)]
pub struct RestorePlan {
    /// Chain being reconstructed
    pub chain_id: ChainId,
    /// Steps in ascending sequence order
    pub steps: Vec<RestoreStep>,
}

impl RestorePlan {
    /// Total number of files across all steps
    pub fn file_count(&self) -> usize {
        self.steps.iter().map(|s| s.segment.files.len()).sum()
    }

    /// Total bytes across all steps
    pub fn byte_count(&self) -> u64 {
        self.steps.iter().map(|s| s.segment.bytes()).sum()
    }
}

/// Result of planning a restore
#[derive(Debug)]
pub enum PlanOutcome {
    /// Every segment is present; the plan is safe to execute
    Ready(RestorePlan),
    /// The attached volumes cannot reconstruct the chain
    Incomplete {
        /// Chain that was requested
        chain_id: ChainId,
        /// Exact sequence numbers not present
        missing: Vec<u64>,
        /// Human-readable facts about what is wrong
        hints: Vec<String>,
    },
}

/// Decide whether `volumes` suffice to reconstruct `chain`, and how
///
/// Merges every attached catalog, checks contiguity from 0 and the
/// presence of exactly one terminal segment on top. Duplicate copies of a
/// segment on several volumes are fine (the first is used); two different
/// records claiming the same sequence number mean a reused chain uuid and
/// are refused.
pub fn plan_restore(chain: ChainId, volumes: &[Volume]) -> Result<PlanOutcome> {
    let mut by_sequence: BTreeMap<u64, RestoreStep> = BTreeMap::new();

    for volume in volumes {
        for segment in volume.segments_for(chain) {
            let sequence = segment.sequence_number;
            match by_sequence.get(&sequence) {
                None => {
                    by_sequence.insert(
                        sequence,
                        RestoreStep {
                            segment,
                            volume_id: volume.id(),
                            volume_root: volume.root().to_path_buf(),
                        },
                    );
                }
                Some(existing) if existing.segment.same_content(&segment) => {
                    debug!(
                        sequence,
                        volume = %volume.id(),
                        "segment duplicated on another volume; ignoring copy"
                    );
                }
                Some(existing) => {
                    return Err(Error::SequenceViolation(format!(
                        "volumes {} and {} hold different segments {} of chain {}",
                        existing.volume_id,
                        volume.id(),
                        sequence,
                        chain
                    )));
                }
            }
        }
    }

    if by_sequence.is_empty() {
        return Ok(PlanOutcome::Incomplete {
            chain_id: chain,
            missing: vec![0],
            hints: vec![format!(
                "no attached volume holds any segment of chain {}",
                chain
            )],
        });
    }

    let max = *by_sequence.keys().next_back().expect("non-empty map");

    let finals: Vec<u64> = by_sequence
        .values()
        .filter(|s| s.segment.is_final)
        .map(|s| s.segment.sequence_number)
        .collect();
    match finals.as_slice() {
        [] | [_] => {}
        _ => {
            return Err(Error::SequenceViolation(format!(
                "chain {} has {} terminal segments",
                chain,
                finals.len()
            )))
        }
    }
    if let Some(&final_seq) = finals.first() {
        if final_seq != max {
            return Err(Error::SequenceViolation(format!(
                "chain {} continues past its terminal segment {}",
                chain, final_seq
            )));
        }
    }
    let has_final = !finals.is_empty();

    let missing: Vec<u64> = (0..=max).filter(|s| !by_sequence.contains_key(s)).collect();

    if missing.is_empty() && has_final {
        let steps: Vec<RestoreStep> = by_sequence.into_values().collect();
        debug!(chain = %chain, segments = steps.len(), "restore plan ready");
        return Ok(PlanOutcome::Ready(RestorePlan {
            chain_id: chain,
            steps,
        }));
    }

    let mut hints: Vec<String> = missing
        .iter()
        .map(|s| {
            format!(
                "segment {} of chain {} is missing; it may be on a volume that is not attached",
                s, chain
            )
        })
        .collect();
    if !has_final {
        hints.push(format!(
            "no terminal segment found; chain {} continues past sequence {} on a volume that is not attached",
            chain, max
        ));
    }

    warn!(chain = %chain, ?missing, "restore plan incomplete");

    Ok(PlanOutcome::Incomplete {
        chain_id: chain,
        missing,
        hints,
    })
}

/// Best-effort plan over whatever segments are present
///
/// Only for an explicitly requested partial restore: the result may have
/// gaps and no terminal segment. Conflicting duplicate records are still
/// refused.
pub fn plan_available(chain: ChainId, volumes: &[Volume]) -> Result<RestorePlan> {
    match plan_restore(chain, volumes)? {
        PlanOutcome::Ready(plan) => Ok(plan),
        PlanOutcome::Incomplete { .. } => {
            let mut by_sequence: BTreeMap<u64, RestoreStep> = BTreeMap::new();
            for volume in volumes {
                for segment in volume.segments_for(chain) {
                    by_sequence
                        .entry(segment.sequence_number)
                        .or_insert_with(|| RestoreStep {
                            segment,
                            volume_id: volume.id(),
                            volume_root: volume.root().to_path_buf(),
                        });
                }
            }
            Ok(RestorePlan {
                chain_id: chain,
                steps: by_sequence.into_values().collect(),
            })
        }
    }
}

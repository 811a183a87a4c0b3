//! Deterministic apply engine.
//!
//! Turns a list of [`EditOp`]s plus the original IR into a new IR, with a
//! single well-defined result regardless of the order ops were produced:
//! ops are grouped by block, overlapping proposals are resolved by the
//! conflict policy, and survivors are spliced in descending offset order so
//! earlier (leftward) splices never invalidate later offsets.
//!
//! This stage performs no content judgment. It is pure: applying an empty
//! op list returns the IR unchanged, and every non-surviving op lands in
//! the rejected ledger rather than being silently dropped.

use crate::anchor::AnchorError;
use crate::editop::EditOp;
use crate::ir::{BlockId, DocumentIr};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Confidence gap above which the higher-confidence op wins an overlap;
/// at or below it the earliest-proposed op wins.
pub const CONFIDENCE_MARGIN: f64 = 0.1;

#[derive(Error, Debug)]
pub enum ApplyError {
    #[error("op '{op_id}' references unknown block '{block_id}'")]
    UnknownBlock { op_id: String, block_id: BlockId },

    /// A stale or unresolvable anchor is an internal consistency bug and is
    /// always surfaced, never skipped.
    #[error("op '{op_id}': {source}")]
    StaleAnchor {
        op_id: String,
        #[source]
        source: AnchorError,
    },

    #[error("op '{op_id}' is malformed: {source}")]
    InvalidOp {
        op_id: String,
        #[source]
        source: crate::editop::EditOpError,
    },
}

/// Why an op lost conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// The winner's confidence exceeded the loser's by more than the margin.
    LowerConfidence,
    /// Confidences were within the margin; the earlier proposal won.
    LaterProposal,
}

/// Record of an op rejected by overlap resolution. Kept for the review
/// report; the op itself is discarded, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReject {
    pub op: EditOp,
    pub winner_id: String,
    pub reason: ConflictReason,
}

/// Result of one apply pass: the new IR plus the two ledgers.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub ir: DocumentIr,
    /// Ops that were spliced in, in application order per block.
    pub applied: Vec<EditOp>,
    /// Ops that lost conflict resolution.
    pub rejected: Vec<ConflictReject>,
}

/// Apply `ops` to `ir`, returning a new IR and the applied/rejected ledgers.
pub fn apply_ops(ir: &DocumentIr, ops: Vec<EditOp>) -> Result<ApplyOutcome, ApplyError> {
    let mut out = ir.clone();

    if ops.is_empty() {
        return Ok(ApplyOutcome {
            ir: out,
            applied: Vec::new(),
            rejected: Vec::new(),
        });
    }

    for op in &ops {
        op.validate().map_err(|source| ApplyError::InvalidOp {
            op_id: op.id.clone(),
            source,
        })?;
    }

    // Group by block. BTreeMap keeps block iteration deterministic even for
    // ops referencing blocks in arbitrary order.
    let mut by_block: BTreeMap<BlockId, Vec<EditOp>> = BTreeMap::new();
    for op in ops {
        by_block.entry(op.anchor.block_id.clone()).or_default().push(op);
    }

    let mut applied = Vec::new();
    let mut rejected = Vec::new();

    for (block_id, block_ops) in by_block {
        let block = out
            .block_mut(&block_id)
            .ok_or_else(|| ApplyError::UnknownBlock {
                op_id: block_ops[0].id.clone(),
                block_id: block_id.clone(),
            })?;

        // All anchors must target the block's current snapshot.
        for op in &block_ops {
            if op.anchor.snapshot != block.snapshot {
                return Err(ApplyError::StaleAnchor {
                    op_id: op.id.clone(),
                    source: AnchorError::Stale {
                        block_id: block_id.clone(),
                    },
                });
            }
        }

        let (mut survivors, conflicts) = resolve_conflicts(block_ops);
        rejected.extend(conflicts);

        // Descending start order keeps every remaining offset valid as we
        // splice from the right.
        survivors.sort_by(|a, b| b.anchor.start.cmp(&a.anchor.start));

        // Every survivor must resolve against the unmutated block: bounds,
        // char boundaries, and before-text. Anchor fields are plain data
        // (deserializable, public), so a span is never trusted blindly.
        for op in &survivors {
            op.anchor
                .resolve_expecting(block, &op.before)
                .map_err(|source| ApplyError::StaleAnchor {
                    op_id: op.id.clone(),
                    source,
                })?;
        }

        let mut text = block.text.clone();
        for op in &survivors {
            text.replace_range(op.anchor.start..op.anchor.end, &op.new_text);
        }

        block.set_text(text);
        applied.extend(survivors);
    }

    Ok(ApplyOutcome {
        ir: out,
        applied,
        rejected,
    })
}

/// Resolve overlaps within one block's ops.
///
/// Ops are considered in proposal order (`seq` ascending). A candidate that
/// overlaps an already-accepted op must beat it by more than
/// [`CONFIDENCE_MARGIN`] to evict it; otherwise the candidate is rejected.
/// This yields exactly one survivor and one `ConflictReject` per overlapping
/// pair, independent of input ordering.
fn resolve_conflicts(mut ops: Vec<EditOp>) -> (Vec<EditOp>, Vec<ConflictReject>) {
    ops.sort_by_key(|op| op.seq);

    let mut accepted: Vec<EditOp> = Vec::with_capacity(ops.len());
    let mut rejects = Vec::new();

    'candidates: for op in ops {
        let mut evict = Vec::new();
        for (idx, existing) in accepted.iter().enumerate() {
            if !op.anchor.overlaps(&existing.anchor) {
                continue;
            }
            if op.confidence - existing.confidence > CONFIDENCE_MARGIN {
                evict.push(idx);
            } else {
                let reason = if existing.confidence - op.confidence > CONFIDENCE_MARGIN {
                    ConflictReason::LowerConfidence
                } else {
                    ConflictReason::LaterProposal
                };
                rejects.push(ConflictReject {
                    winner_id: existing.id.clone(),
                    reason,
                    op,
                });
                continue 'candidates;
            }
        }
        // Candidate beats everything it overlaps: evict the incumbents.
        for idx in evict.into_iter().rev() {
            let loser = accepted.remove(idx);
            rejects.push(ConflictReject {
                op: loser,
                winner_id: op.id.clone(),
                reason: ConflictReason::LowerConfidence,
            });
        }
        accepted.push(op);
    }

    (accepted, rejects)
}

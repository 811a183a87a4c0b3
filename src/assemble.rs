//! Assembly of validated rewrites into a new IR.
//!
//! Chunks are merged back in document order. Each chunk's final text is
//! chosen from its rewrite status, validation decision, and the flagged
//! policy; block ids and ordering are preserved. A rewritten multi-block
//! chunk collapses into its first block. The acronym tracker is threaded
//! through so post-assembly state reflects what the final text defines.

use crate::acronyms::AcronymTracker;
use crate::chunk_validate::{ChunkDecision, ChunkValidation, FlaggedPolicy};
use crate::ir::{BlockId, DocumentIr};
use crate::rewrite::{ChunkRewrite, RewriteStatus};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Why a chunk's final text is what it is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Accepted rewrite landed.
    RewriteAccepted,
    /// Flagged; policy said take the rewrite.
    RewriteFlaggedAccepted,
    /// Flagged; policy said keep the original.
    OriginalFlagged,
    /// Validator rejected the rewrite.
    OriginalRejected,
    /// No candidate existed (skip, failure, timeout, deadline).
    OriginalNoCandidate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResolution {
    pub chunk_id: String,
    pub resolution: Resolution,
    pub detail: String,
}

#[derive(Debug)]
pub struct AssemblyOutput {
    pub ir: DocumentIr,
    pub resolutions: Vec<ChunkResolution>,
}

impl AssemblyOutput {
    pub fn rewrites_used(&self) -> usize {
        self.resolutions
            .iter()
            .filter(|r| {
                matches!(
                    r.resolution,
                    Resolution::RewriteAccepted | Resolution::RewriteFlaggedAccepted
                )
            })
            .count()
    }
}

/// Merge chunk results into a new IR.
///
/// `results` and `validations` are keyed by chunk id; chunk ids sort in
/// document order, so iteration order is document order. Blocks not covered
/// by any chunk pass through untouched.
pub fn assemble(
    original: &DocumentIr,
    results: &BTreeMap<String, ChunkRewrite>,
    validations: &BTreeMap<String, ChunkValidation>,
    policy: FlaggedPolicy,
    tracker: &mut AcronymTracker,
) -> AssemblyOutput {
    let mut ir = original.clone();
    let mut resolutions = Vec::new();
    let mut collapsed: BTreeSet<BlockId> = BTreeSet::new();

    for (chunk_id, result) in results {
        let (final_text, resolution, detail) = resolve(result, validations.get(chunk_id), policy);

        tracker.scan_existing(&final_text);

        let use_rewrite = matches!(
            resolution,
            Resolution::RewriteAccepted | Resolution::RewriteFlaggedAccepted
        );
        if use_rewrite {
            let block_ids = &result.chunk.block_ids;
            if let Some(first) = block_ids.first() {
                if let Some(block) = ir.block_mut(first) {
                    block.set_text(final_text);
                }
                for later in &block_ids[1..] {
                    collapsed.insert(later.clone());
                }
            }
        }

        debug!(chunk = %chunk_id, resolution = ?resolution, "chunk resolved");
        resolutions.push(ChunkResolution {
            chunk_id: chunk_id.clone(),
            resolution,
            detail,
        });
    }

    if !collapsed.is_empty() {
        ir.blocks.retain(|b| !collapsed.contains(&b.id));
    }

    AssemblyOutput { ir, resolutions }
}

fn resolve(
    result: &ChunkRewrite,
    validation: Option<&ChunkValidation>,
    policy: FlaggedPolicy,
) -> (String, Resolution, String) {
    let response = match (&result.status, &result.response) {
        (RewriteStatus::Rewritten { .. }, Some(response)) => response,
        (status, _) => {
            return (
                result.chunk.text.clone(),
                Resolution::OriginalNoCandidate,
                format!("{status:?}"),
            )
        }
    };

    match validation.map(|v| v.decision) {
        Some(ChunkDecision::Accepted) => (
            response.text.clone(),
            Resolution::RewriteAccepted,
            response.summary.clone(),
        ),
        Some(ChunkDecision::Rejected) => {
            let failed: Vec<&str> = validation
                .into_iter()
                .flat_map(|v| v.failed_checks())
                .map(|c| c.name)
                .collect();
            (
                result.chunk.text.clone(),
                Resolution::OriginalRejected,
                format!("failed checks: {}", failed.join(", ")),
            )
        }
        Some(ChunkDecision::Flagged) => match policy {
            FlaggedPolicy::AcceptRewrite => (
                response.text.clone(),
                Resolution::RewriteFlaggedAccepted,
                format!("flagged, policy {policy}"),
            ),
            FlaggedPolicy::KeepOriginal => (
                result.chunk.text.clone(),
                Resolution::OriginalFlagged,
                format!("flagged, policy {policy}"),
            ),
        },
        // No validation record means the candidate was never vetted; the
        // original stands.
        None => (
            result.chunk.text.clone(),
            Resolution::OriginalNoCandidate,
            "no validation record".to_string(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk_validate::{validate_chunk, ValidatorSettings};
    use crate::chunker::Chunk;
    use crate::ir::{Block, BlockKind};
    use crate::rewrite::RewriteResponse;

    fn doc() -> DocumentIr {
        DocumentIr {
            title: "T".to_string(),
            blocks: vec![
                Block::new("p1", BlockKind::Paragraph, "First paragraph with 42% data."),
                Block::new("p2", BlockKind::Paragraph, "Second paragraph body text."),
                Block::new("p3", BlockKind::Paragraph, "Third paragraph body text."),
            ],
            metadata: Default::default(),
        }
    }

    fn chunk_for(ir: &DocumentIr, ids: &[&str], ordinal: usize) -> Chunk {
        let blocks: Vec<_> = ids
            .iter()
            .map(|id| ir.block(&BlockId::new(*id)).unwrap())
            .collect();
        let text = blocks
            .iter()
            .map(|b| b.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        Chunk {
            id: format!("chunk-{ordinal:04}"),
            block_ids: blocks.iter().map(|b| b.id.clone()).collect(),
            word_count: text.split_whitespace().count(),
            text,
            context_before: String::new(),
            context_after: String::new(),
            section_title: None,
            rewritable: true,
            protected_terms: Vec::new(),
        }
    }

    fn rewritten(chunk: Chunk, text: &str) -> ChunkRewrite {
        ChunkRewrite {
            chunk,
            response: Some(RewriteResponse {
                text: text.to_string(),
                confidence: 0.9,
                summary: "tightened".to_string(),
            }),
            status: RewriteStatus::Rewritten { retried: false },
        }
    }

    fn validated(chunk: &Chunk, result: &ChunkRewrite) -> ChunkValidation {
        validate_chunk(
            chunk,
            result.candidate_text(),
            &ValidatorSettings::default(),
            &[],
            &[],
        )
    }

    #[test]
    fn accepted_rewrites_land_and_untouched_blocks_pass_through() {
        let ir = doc();
        let c0 = chunk_for(&ir, &["p1"], 0);
        let c1 = chunk_for(&ir, &["p2"], 1);

        // c0 keeps the 42%; c1's candidate is fine too.
        let r0 = rewritten(c0.clone(), "First paragraph, tightened, with 42% data.");
        let r1 = rewritten(c1.clone(), "Second paragraph body text only.");

        let mut results = BTreeMap::new();
        let mut validations = BTreeMap::new();
        validations.insert(c0.id.clone(), validated(&c0, &r0));
        validations.insert(c1.id.clone(), validated(&c1, &r1));
        results.insert(c0.id.clone(), r0);
        results.insert(c1.id.clone(), r1);

        let mut tracker = AcronymTracker::new();
        let out = assemble(&ir, &results, &validations, FlaggedPolicy::KeepOriginal, &mut tracker);

        assert_eq!(out.rewrites_used(), 2);
        assert_eq!(
            out.ir.block(&BlockId::new("p1")).unwrap().text,
            "First paragraph, tightened, with 42% data."
        );
        // Untouched block passes through.
        assert_eq!(
            out.ir.block(&BlockId::new("p3")).unwrap().text,
            "Third paragraph body text."
        );
    }

    #[test]
    fn rejected_rewrite_keeps_original_text() {
        let ir = doc();
        let c0 = chunk_for(&ir, &["p1"], 0);
        // Candidate drops the 42%, a hard failure.
        let r0 = rewritten(c0.clone(), "First paragraph with most data removed.");
        let v0 = validated(&c0, &r0);
        assert_eq!(v0.decision, ChunkDecision::Rejected);

        let mut results = BTreeMap::new();
        let mut validations = BTreeMap::new();
        validations.insert(c0.id.clone(), v0);
        results.insert(c0.id.clone(), r0);

        let mut tracker = AcronymTracker::new();
        let out = assemble(&ir, &results, &validations, FlaggedPolicy::AcceptRewrite, &mut tracker);

        assert_eq!(out.rewrites_used(), 0);
        assert_eq!(
            out.ir.block(&BlockId::new("p1")).unwrap().text,
            "First paragraph with 42% data."
        );
        assert!(matches!(
            out.resolutions[0].resolution,
            Resolution::OriginalRejected
        ));
    }

    #[test]
    fn flagged_policy_decides() {
        let ir = doc();
        let c0 = chunk_for(&ir, &["p2"], 0);
        // Very short candidate: soft length failure only.
        let r0 = rewritten(c0.clone(), "Shorter.");
        let v0 = validated(&c0, &r0);
        assert_eq!(v0.decision, ChunkDecision::Flagged);

        let mut results = BTreeMap::new();
        let mut validations = BTreeMap::new();
        validations.insert(c0.id.clone(), v0);
        results.insert(c0.id.clone(), r0);

        let mut tracker = AcronymTracker::new();
        let keep = assemble(
            &ir,
            &results,
            &validations,
            FlaggedPolicy::KeepOriginal,
            &mut tracker,
        );
        assert_eq!(
            keep.ir.block(&BlockId::new("p2")).unwrap().text,
            "Second paragraph body text."
        );

        let mut tracker = AcronymTracker::new();
        let accept = assemble(
            &ir,
            &results,
            &validations,
            FlaggedPolicy::AcceptRewrite,
            &mut tracker,
        );
        assert_eq!(accept.ir.block(&BlockId::new("p2")).unwrap().text, "Shorter.");
    }

    #[test]
    fn multi_block_chunk_collapses_into_first_block() {
        let ir = doc();
        let c0 = chunk_for(&ir, &["p2", "p3"], 0);
        let r0 = rewritten(
            c0.clone(),
            "Second and third paragraphs merged into one tighter paragraph.",
        );
        let v0 = validated(&c0, &r0);

        let mut results = BTreeMap::new();
        let mut validations = BTreeMap::new();
        validations.insert(c0.id.clone(), v0);
        results.insert(c0.id.clone(), r0);

        let mut tracker = AcronymTracker::new();
        let out = assemble(&ir, &results, &validations, FlaggedPolicy::KeepOriginal, &mut tracker);

        assert!(out.ir.block(&BlockId::new("p3")).is_none());
        assert_eq!(
            out.ir.block(&BlockId::new("p2")).unwrap().text,
            "Second and third paragraphs merged into one tighter paragraph."
        );
        assert_eq!(out.ir.blocks.len(), 2);
    }

    #[test]
    fn failed_rewrite_keeps_original_with_no_candidate() {
        let ir = doc();
        let c0 = chunk_for(&ir, &["p1"], 0);
        let r0 = ChunkRewrite {
            chunk: c0.clone(),
            response: None,
            status: RewriteStatus::Failed {
                error: "backend down".to_string(),
            },
        };

        let mut results = BTreeMap::new();
        results.insert(c0.id.clone(), r0);

        let mut tracker = AcronymTracker::new();
        let out = assemble(
            &ir,
            &results,
            &BTreeMap::new(),
            FlaggedPolicy::AcceptRewrite,
            &mut tracker,
        );
        assert_eq!(
            out.ir.block(&BlockId::new("p1")).unwrap().text,
            "First paragraph with 42% data."
        );
        assert!(matches!(
            out.resolutions[0].resolution,
            Resolution::OriginalNoCandidate
        ));
    }

    #[test]
    fn tracker_sees_expansions_in_final_text() {
        let ir = DocumentIr {
            title: String::new(),
            blocks: vec![Block::new("p1", BlockKind::Paragraph, "MEC is used heavily.")],
            metadata: Default::default(),
        };
        let c0 = chunk_for(&ir, &["p1"], 0);
        let r0 = rewritten(c0.clone(), "Multi-access Edge Computing (MEC) is used heavily.");
        let v0 = validated(&c0, &r0);

        let mut results = BTreeMap::new();
        let mut validations = BTreeMap::new();
        validations.insert(c0.id.clone(), v0);
        results.insert(c0.id.clone(), r0);

        let mut tracker = AcronymTracker::new();
        let _ = assemble(&ir, &results, &validations, FlaggedPolicy::KeepOriginal, &mut tracker);
        assert!(tracker.defined().contains("MEC"));
    }
}

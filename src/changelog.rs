//! Run changelog.
//!
//! Every run emits a structured record of what changed and why: applied and
//! rejected ops, detector findings, chunk resolutions, and the verification
//! outcome. Serialized as JSON for tooling and rendered as text for review.

use crate::apply::{ApplyOutcome, ConflictReject};
use crate::assemble::ChunkResolution;
use crate::editop::{EditOp, EditSource, RiskTier};
use crate::ir::Finding;
use crate::verify::VerificationReport;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedEntry {
    pub op_id: String,
    pub rule_id: String,
    pub block_id: String,
    pub before: String,
    pub after: String,
    pub rationale: String,
    pub source: EditSource,
    #[serde(default)]
    pub risk_tier: RiskTier,
    pub confidence: f64,
}

impl AppliedEntry {
    fn from_op(op: &EditOp) -> Self {
        Self {
            op_id: op.id.clone(),
            rule_id: op.rule_id.clone(),
            block_id: op.anchor.block_id.to_string(),
            before: op.before.clone(),
            after: op.new_text.clone(),
            rationale: op.rationale.clone(),
            source: op.source,
            risk_tier: op.risk_tier,
            confidence: op.confidence,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectedEntry {
    pub op_id: String,
    pub rule_id: String,
    pub block_id: String,
    pub winner_id: String,
    pub reason: String,
}

impl RejectedEntry {
    fn from_reject(reject: &ConflictReject) -> Self {
        Self {
            op_id: reject.op.id.clone(),
            rule_id: reject.op.rule_id.clone(),
            block_id: reject.op.anchor.block_id.to_string(),
            winner_id: reject.winner_id.clone(),
            reason: format!("{:?}", reject.reason),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    pub blocks: usize,
    pub ops_proposed: usize,
    pub ops_applied: usize,
    pub ops_rejected: usize,
    pub chunks_total: usize,
    pub rewrites_used: usize,
}

/// The full run record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Changelog {
    pub mode: String,
    pub input: String,
    pub stats: RunStats,
    pub applied: Vec<AppliedEntry>,
    pub rejected: Vec<RejectedEntry>,
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification: Option<VerificationReport>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chunk_resolutions: Vec<ChunkResolution>,
}

impl Changelog {
    pub fn new(mode: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            mode: mode.into(),
            input: input.into(),
            stats: RunStats::default(),
            applied: Vec::new(),
            rejected: Vec::new(),
            findings: Vec::new(),
            verification: None,
            chunk_resolutions: Vec::new(),
        }
    }

    /// Fold an apply outcome into the log.
    pub fn record_apply(&mut self, proposed: usize, outcome: &ApplyOutcome) {
        self.stats.ops_proposed += proposed;
        self.stats.ops_applied += outcome.applied.len();
        self.stats.ops_rejected += outcome.rejected.len();
        self.applied
            .extend(outcome.applied.iter().map(AppliedEntry::from_op));
        self.rejected
            .extend(outcome.rejected.iter().map(RejectedEntry::from_reject));
    }

    pub fn record_chunks(&mut self, resolutions: &[ChunkResolution], rewrites_used: usize) {
        self.stats.chunks_total += resolutions.len();
        self.stats.rewrites_used += rewrites_used;
        self.chunk_resolutions.extend(resolutions.iter().cloned());
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Reviewer-facing text rendering.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Run mode: {}", self.mode);
        let _ = writeln!(out, "Input: {}", self.input);
        let _ = writeln!(
            out,
            "Ops: {} proposed, {} applied, {} rejected",
            self.stats.ops_proposed, self.stats.ops_applied, self.stats.ops_rejected
        );
        if self.stats.chunks_total > 0 {
            let _ = writeln!(
                out,
                "Chunks: {} total, {} rewrites landed",
                self.stats.chunks_total, self.stats.rewrites_used
            );
        }

        if !self.applied.is_empty() {
            let _ = writeln!(out, "\nApplied edits:");
            for entry in &self.applied {
                let _ = writeln!(
                    out,
                    "  [{}] {} in {}: {:?} -> {:?}",
                    entry.rule_id, entry.op_id, entry.block_id, entry.before, entry.after
                );
                if !entry.rationale.is_empty() {
                    let _ = writeln!(out, "      {}", entry.rationale);
                }
                if entry.risk_tier != RiskTier::Low {
                    let _ = writeln!(out, "      risk: {}", entry.risk_tier);
                }
            }
        }

        if !self.rejected.is_empty() {
            let _ = writeln!(out, "\nRejected (conflicts):");
            for entry in &self.rejected {
                let _ = writeln!(
                    out,
                    "  [{}] {} lost to {} ({})",
                    entry.rule_id, entry.op_id, entry.winner_id, entry.reason
                );
            }
        }

        if !self.findings.is_empty() {
            let _ = writeln!(out, "\nFindings:");
            for finding in &self.findings {
                let _ = writeln!(
                    out,
                    "  {:?} {}: {}",
                    finding.severity, finding.rule_id, finding.message
                );
            }
        }

        if !self.chunk_resolutions.is_empty() {
            let _ = writeln!(out, "\nChunk resolutions:");
            for res in &self.chunk_resolutions {
                let _ = writeln!(
                    out,
                    "  {} {:?}: {}",
                    res.chunk_id, res.resolution, res.detail
                );
            }
        }

        if let Some(report) = &self.verification {
            let _ = writeln!(out, "\nVerification:");
            let _ = write!(out, "{report}");
        }

        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::apply_ops;
    use crate::editop::EditOp;
    use crate::ir::{Block, BlockKind, DocumentIr};

    fn sample_log() -> Changelog {
        let ir = DocumentIr {
            title: String::new(),
            blocks: vec![Block::new(
                "p1",
                BlockKind::Paragraph,
                "We utilize edge caching in order to cut latency.",
            )],
            metadata: Default::default(),
        };
        let op = EditOp::replace_span(
            &ir.blocks[0],
            3,
            10,
            "use",
            "wordy.utilize",
            "Prefer 'use'.",
            EditSource::Rule,
            0.95,
            0,
        )
        .unwrap();
        let outcome = apply_ops(&ir, vec![op]).unwrap();

        let mut log = Changelog::new("safe", "guide.txt");
        log.record_apply(1, &outcome);
        log
    }

    #[test]
    fn json_round_trips() {
        let log = sample_log();
        let json = log.to_json().unwrap();
        let back: Changelog = serde_json::from_str(&json).unwrap();
        assert_eq!(back.stats.ops_applied, 1);
        assert_eq!(back.applied[0].rule_id, "wordy.utilize");
    }

    #[test]
    fn text_rendering_names_rule_and_texts() {
        let text = sample_log().render_text();
        assert!(text.contains("wordy.utilize"));
        assert!(text.contains("\"utilize\""));
        assert!(text.contains("\"use\""));
        assert!(text.contains("1 applied"));
    }

    #[test]
    fn risk_tier_survives_into_the_log() {
        let ir = DocumentIr {
            title: String::new(),
            blocks: vec![Block::new(
                "p1",
                BlockKind::Paragraph,
                "It should be noted that the cache helps.",
            )],
            metadata: Default::default(),
        };
        let op = EditOp::delete_span(
            &ir.blocks[0],
            0,
            "It should be noted that ".len(),
            "hedge.opener",
            "Throat-clearing opener.",
            EditSource::Rule,
            0.95,
            0,
        )
        .unwrap()
        .with_risk_tier(RiskTier::High);
        let outcome = apply_ops(&ir, vec![op]).unwrap();

        let mut log = Changelog::new("safe", "guide.txt");
        log.record_apply(1, &outcome);
        assert_eq!(log.applied[0].risk_tier, RiskTier::High);
        assert!(log.render_text().contains("risk: high"));

        let back: Changelog = serde_json::from_str(&log.to_json().unwrap()).unwrap();
        assert_eq!(back.applied[0].risk_tier, RiskTier::High);
    }

    #[test]
    fn stats_accumulate_across_records() {
        let mut log = sample_log();
        let other = sample_log();
        log.record_apply(
            other.stats.ops_proposed,
            &ApplyOutcome {
                ir: DocumentIr::default(),
                applied: Vec::new(),
                rejected: Vec::new(),
            },
        );
        assert_eq!(log.stats.ops_proposed, 2);
        assert_eq!(log.stats.ops_applied, 1);
    }
}

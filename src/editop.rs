//! The atomic proposed change.
//!
//! All surgical edits compile down to a single primitive: [`EditOp`], an
//! anchored insert/replace/delete with a recorded before-text. Intelligence
//! lives in proposal (rules, rewrite source), not in application.

use crate::anchor::Anchor;
use crate::ir::Block;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// What the op does to its anchored span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    /// Insert `new_text` at `anchor.start`; the anchor span must be empty.
    Insert,
    /// Replace the anchored span with `new_text`.
    Replace,
    /// Remove the anchored span; `new_text` must be empty.
    Delete,
}

/// Where a proposal came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditSource {
    Rule,
    Llm,
    Manual,
}

/// Reviewer-facing risk classification, set by the proposing rule and
/// carried through to the changelog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    #[default]
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskTier::Low => f.write_str("low"),
            RiskTier::Medium => f.write_str("medium"),
            RiskTier::High => f.write_str("high"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditOpError {
    #[error("{kind:?} op requires non-empty new_text")]
    MissingNewText { kind: OpKind },

    #[error("delete op must have empty new_text")]
    DeleteWithNewText,

    #[error("insert op must have an empty anchor span, got [{start}, {end})")]
    InsertWithSpan { start: usize, end: usize },

    #[error("invalid anchor: {0}")]
    Anchor(#[from] crate::anchor::AnchorError),
}

/// One proposed textual change. Immutable once created; a rejected or
/// superseded op is discarded, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[must_use = "an EditOp does nothing until passed to the apply engine"]
pub struct EditOp {
    pub id: String,
    pub anchor: Anchor,
    pub kind: OpKind,
    /// Replacement text; empty for deletes.
    pub new_text: String,
    /// Text the anchor covered at proposal time, verified again at apply.
    pub before: String,
    pub rationale: String,
    pub rule_id: String,
    pub source: EditSource,
    /// Risk tier of the proposing rule; `Low` for ops with no rule behind
    /// them.
    #[serde(default)]
    pub risk_tier: RiskTier,
    /// Proposer confidence in [0, 1].
    pub confidence: f64,
    /// Proposal ordinal; the earliest-proposed op wins confidence ties.
    pub seq: u64,
}

impl EditOp {
    /// Build a replace op over a span of `block`'s current text.
    pub fn replace_span(
        block: &Block,
        start: usize,
        end: usize,
        new_text: impl Into<String>,
        rule_id: impl Into<String>,
        rationale: impl Into<String>,
        source: EditSource,
        confidence: f64,
        seq: u64,
    ) -> Result<Self, EditOpError> {
        let anchor = Anchor::to_span(block, start, end)?;
        let new_text = new_text.into();
        if new_text.is_empty() {
            return Err(EditOpError::MissingNewText {
                kind: OpKind::Replace,
            });
        }
        let before = block.text[start..end].to_string();
        Ok(Self::finish(
            anchor,
            OpKind::Replace,
            new_text,
            before,
            rule_id.into(),
            rationale.into(),
            source,
            confidence,
            seq,
        ))
    }

    /// Build a delete op over a span of `block`'s current text.
    pub fn delete_span(
        block: &Block,
        start: usize,
        end: usize,
        rule_id: impl Into<String>,
        rationale: impl Into<String>,
        source: EditSource,
        confidence: f64,
        seq: u64,
    ) -> Result<Self, EditOpError> {
        let anchor = Anchor::to_span(block, start, end)?;
        let before = block.text[start..end].to_string();
        Ok(Self::finish(
            anchor,
            OpKind::Delete,
            String::new(),
            before,
            rule_id.into(),
            rationale.into(),
            source,
            confidence,
            seq,
        ))
    }

    /// Build an insert op at an offset of `block`'s current text.
    pub fn insert_at(
        block: &Block,
        offset: usize,
        new_text: impl Into<String>,
        rule_id: impl Into<String>,
        rationale: impl Into<String>,
        source: EditSource,
        confidence: f64,
        seq: u64,
    ) -> Result<Self, EditOpError> {
        let anchor = Anchor::to_span(block, offset, offset)?;
        let new_text = new_text.into();
        if new_text.is_empty() {
            return Err(EditOpError::MissingNewText {
                kind: OpKind::Insert,
            });
        }
        Ok(Self::finish(
            anchor,
            OpKind::Insert,
            new_text,
            String::new(),
            rule_id.into(),
            rationale.into(),
            source,
            confidence,
            seq,
        ))
    }

    /// Build a whole-block replacement (used by the rewrite-proposal path).
    pub fn replace_block(
        block: &Block,
        new_text: impl Into<String>,
        rule_id: impl Into<String>,
        rationale: impl Into<String>,
        source: EditSource,
        confidence: f64,
        seq: u64,
    ) -> Result<Self, EditOpError> {
        Self::replace_span(
            block,
            0,
            block.text.len(),
            new_text,
            rule_id,
            rationale,
            source,
            confidence,
            seq,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        anchor: Anchor,
        kind: OpKind,
        new_text: String,
        before: String,
        rule_id: String,
        rationale: String,
        source: EditSource,
        confidence: f64,
        seq: u64,
    ) -> Self {
        let id = op_id(&rule_id, &anchor, seq);
        Self {
            id,
            anchor,
            kind,
            new_text,
            before,
            rationale,
            rule_id,
            source,
            risk_tier: RiskTier::default(),
            confidence: confidence.clamp(0.0, 1.0),
            seq,
        }
    }

    /// Attach the proposing rule's risk tier.
    pub fn with_risk_tier(mut self, risk_tier: RiskTier) -> Self {
        self.risk_tier = risk_tier;
        self
    }

    /// Validate structural invariants (field combinations, anchor shape).
    pub fn validate(&self) -> Result<(), EditOpError> {
        match self.kind {
            OpKind::Insert => {
                if self.new_text.is_empty() {
                    return Err(EditOpError::MissingNewText { kind: OpKind::Insert });
                }
                if !self.anchor.is_empty() {
                    return Err(EditOpError::InsertWithSpan {
                        start: self.anchor.start,
                        end: self.anchor.end,
                    });
                }
            }
            OpKind::Replace => {
                if self.new_text.is_empty() {
                    return Err(EditOpError::MissingNewText {
                        kind: OpKind::Replace,
                    });
                }
            }
            OpKind::Delete => {
                if !self.new_text.is_empty() {
                    return Err(EditOpError::DeleteWithNewText);
                }
            }
        }
        Ok(())
    }

    /// Whether the op declares a structural change (block added/removed),
    /// which relaxes the verifier's inventory equality check. Span edits
    /// never do; reserved for future block-level operations.
    pub fn declares_structural_change(&self) -> bool {
        false
    }
}

/// Deterministic op id from rule, anchor, and proposal ordinal.
fn op_id(rule_id: &str, anchor: &Anchor, seq: u64) -> String {
    let payload = format!(
        "{rule_id}|{}|{}|{}|{seq}",
        anchor.block_id, anchor.start, anchor.end
    );
    format!("{:016x}", xxh3_64(payload.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BlockKind;

    fn block() -> Block {
        Block::new("p1", BlockKind::Paragraph, "The quick brown fox")
    }

    #[test]
    fn replace_records_before_text() {
        let b = block();
        let op = EditOp::replace_span(
            &b, 4, 9, "slow", "rule.speed", "test", EditSource::Rule, 1.0, 0,
        )
        .unwrap();
        assert_eq!(op.before, "quick");
        assert_eq!(op.kind, OpKind::Replace);
        op.validate().unwrap();
    }

    #[test]
    fn replace_rejects_empty_new_text() {
        let b = block();
        let err = EditOp::replace_span(&b, 4, 9, "", "r", "t", EditSource::Rule, 1.0, 0)
            .unwrap_err();
        assert!(matches!(err, EditOpError::MissingNewText { .. }));
    }

    #[test]
    fn delete_has_empty_new_text() {
        let b = block();
        let op = EditOp::delete_span(&b, 3, 9, "r", "t", EditSource::Rule, 1.0, 0).unwrap();
        assert!(op.new_text.is_empty());
        op.validate().unwrap();
    }

    #[test]
    fn insert_requires_empty_span() {
        let b = block();
        let op = EditOp::insert_at(&b, 4, "very ", "r", "t", EditSource::Manual, 1.0, 0).unwrap();
        assert!(op.anchor.is_empty());
        op.validate().unwrap();
    }

    #[test]
    fn ids_are_deterministic_and_distinct() {
        let b = block();
        let a = EditOp::replace_span(&b, 4, 9, "slow", "r", "t", EditSource::Rule, 1.0, 0).unwrap();
        let a2 =
            EditOp::replace_span(&b, 4, 9, "slow", "r", "t", EditSource::Rule, 1.0, 0).unwrap();
        let c = EditOp::replace_span(&b, 4, 9, "slow", "r", "t", EditSource::Rule, 1.0, 1).unwrap();
        assert_eq!(a.id, a2.id);
        assert_ne!(a.id, c.id);
    }

    #[test]
    fn confidence_is_clamped() {
        let b = block();
        let op = EditOp::replace_span(&b, 4, 9, "slow", "r", "t", EditSource::Llm, 1.7, 0).unwrap();
        assert_eq!(op.confidence, 1.0);
    }
}

//! Stable addressing of text spans inside the IR.
//!
//! An [`Anchor`] records a byte span of a block's text together with the
//! snapshot token the span was computed against. Anchors stay resolvable
//! after edits to *other* blocks; within the same block they remain valid
//! only while the block's snapshot token is unchanged, which the apply
//! engine guarantees by splicing in descending offset order.

use crate::ir::{Block, BlockId, SnapshotToken};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A reference to a span of text inside one block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anchor {
    pub block_id: BlockId,
    /// Starting byte offset (inclusive), relative to the block text at
    /// proposal time.
    pub start: usize,
    /// Ending byte offset (exclusive).
    pub end: usize,
    pub snapshot: SnapshotToken,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnchorError {
    #[error("stale anchor for block '{block_id}': block was mutated since proposal")]
    Stale { block_id: BlockId },

    #[error("invalid span [{start}, {end}) in block '{block_id}' of length {len}")]
    OutOfBounds {
        block_id: BlockId,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("span [{start}, {end}) in block '{block_id}' is not on char boundaries")]
    NotCharBoundary {
        block_id: BlockId,
        start: usize,
        end: usize,
    },

    #[error(
        "before-text mismatch in block '{block_id}': expected {expected:?}, \
         found {found:?} (similarity {similarity:.2})"
    )]
    BeforeMismatch {
        block_id: BlockId,
        expected: String,
        found: String,
        /// Normalized Levenshtein similarity between expected and found,
        /// included so conflict reports can distinguish near-misses from
        /// wholesale drift.
        similarity: f64,
    },
}

impl Anchor {
    /// Anchor a span of `block`'s current text.
    pub fn to_span(block: &Block, start: usize, end: usize) -> Result<Self, AnchorError> {
        let anchor = Self {
            block_id: block.id.clone(),
            start,
            end,
            snapshot: block.snapshot,
        };
        anchor.check_bounds(&block.text)?;
        Ok(anchor)
    }

    /// Anchor the whole of `block`'s current text.
    pub fn whole_block(block: &Block) -> Self {
        Self {
            block_id: block.id.clone(),
            start: 0,
            end: block.text.len(),
            snapshot: block.snapshot,
        }
    }

    fn check_bounds(&self, text: &str) -> Result<(), AnchorError> {
        if self.start > self.end || self.end > text.len() {
            return Err(AnchorError::OutOfBounds {
                block_id: self.block_id.clone(),
                start: self.start,
                end: self.end,
                len: text.len(),
            });
        }
        if !text.is_char_boundary(self.start) || !text.is_char_boundary(self.end) {
            return Err(AnchorError::NotCharBoundary {
                block_id: self.block_id.clone(),
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    /// Resolve this anchor against a block, returning the covered text.
    ///
    /// Fails with [`AnchorError::Stale`] when the block's snapshot token no
    /// longer matches the token the anchor was proposed against.
    pub fn resolve<'a>(&self, block: &'a Block) -> Result<&'a str, AnchorError> {
        if block.snapshot != self.snapshot {
            return Err(AnchorError::Stale {
                block_id: self.block_id.clone(),
            });
        }
        self.check_bounds(&block.text)?;
        Ok(&block.text[self.start..self.end])
    }

    /// Resolve and additionally verify the covered text equals `expected`.
    ///
    /// A mismatch with a matching snapshot token indicates a proposal bug;
    /// the error carries a similarity score for diagnostics.
    pub fn resolve_expecting<'a>(
        &self,
        block: &'a Block,
        expected: &str,
    ) -> Result<&'a str, AnchorError> {
        let found = self.resolve(block)?;
        if found != expected {
            return Err(AnchorError::BeforeMismatch {
                block_id: self.block_id.clone(),
                expected: expected.to_string(),
                found: found.to_string(),
                similarity: strsim::normalized_levenshtein(expected, found),
            });
        }
        Ok(found)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether two anchors on the same block have intersecting `[start, end)`
    /// ranges. Anchors on different blocks never overlap.
    pub fn overlaps(&self, other: &Anchor) -> bool {
        self.block_id == other.block_id && self.start < other.end && other.start < self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BlockKind;

    fn block() -> Block {
        Block::new("p1", BlockKind::Paragraph, "The quick brown fox")
    }

    #[test]
    fn resolve_returns_span_text() {
        let b = block();
        let anchor = Anchor::to_span(&b, 4, 9).unwrap();
        assert_eq!(anchor.resolve(&b).unwrap(), "quick");
    }

    #[test]
    fn resolve_fails_on_stale_snapshot() {
        let mut b = block();
        let anchor = Anchor::to_span(&b, 4, 9).unwrap();
        b.set_text("The slow brown fox".to_string());
        assert!(matches!(anchor.resolve(&b), Err(AnchorError::Stale { .. })));
    }

    #[test]
    fn to_span_rejects_out_of_bounds() {
        let b = block();
        assert!(matches!(
            Anchor::to_span(&b, 4, 100),
            Err(AnchorError::OutOfBounds { .. })
        ));
        assert!(matches!(
            Anchor::to_span(&b, 9, 4),
            Err(AnchorError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn to_span_rejects_split_char_boundary() {
        let b = Block::new("p1", BlockKind::Paragraph, "naïve approach");
        // Offset 3 lands inside the two-byte 'ï'.
        assert!(matches!(
            Anchor::to_span(&b, 0, 3),
            Err(AnchorError::NotCharBoundary { .. })
        ));
    }

    #[test]
    fn resolve_expecting_reports_similarity() {
        let b = block();
        let anchor = Anchor::to_span(&b, 4, 9).unwrap();
        let err = anchor.resolve_expecting(&b, "quack").unwrap_err();
        match err {
            AnchorError::BeforeMismatch { similarity, .. } => {
                assert!(similarity > 0.5);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn overlap_detection() {
        let b = block();
        let a1 = Anchor::to_span(&b, 0, 9).unwrap();
        let a2 = Anchor::to_span(&b, 4, 15).unwrap();
        let a3 = Anchor::to_span(&b, 9, 15).unwrap();
        assert!(a1.overlaps(&a2));
        assert!(!a1.overlaps(&a3));
    }
}

//! Document intermediate representation.
//!
//! The IR is an ordered sequence of [`Block`]s, each carrying a stable
//! identifier, a kind, a text payload, and a snapshot token identifying the
//! current version of its text. The IR is the single mutable artifact passed
//! stage to stage; every stage that changes it returns a new value.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use xxhash_rust::xxh3::xxh3_64;

/// Stable identifier for a block, assigned at parse time and preserved
/// across edits so downstream serialization remains addressable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockId(pub String);

impl BlockId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structural kind of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Paragraph,
    Heading,
    TableCell,
    Caption,
    ListItem,
}

impl BlockKind {
    /// Whether this kind carries prose that the holistic path may rewrite.
    pub fn is_prose(self) -> bool {
        matches!(self, BlockKind::Paragraph | BlockKind::ListItem)
    }
}

/// Version token for a block's text. Anchors proposed against one token are
/// invalid once the block has been mutated and re-tokenized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SnapshotToken(pub u64);

impl SnapshotToken {
    pub fn of(text: &str) -> Self {
        Self(xxh3_64(text.as_bytes()))
    }
}

/// One block of the document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    pub text: String,
    /// Heading level (1-based) when `kind` is `Heading`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading_level: Option<u8>,
    /// Nesting depth (1-based) when `kind` is `ListItem`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_depth: Option<u8>,
    pub snapshot: SnapshotToken,
}

impl Block {
    pub fn new(id: impl Into<String>, kind: BlockKind, text: impl Into<String>) -> Self {
        let text = text.into();
        let snapshot = SnapshotToken::of(&text);
        Self {
            id: BlockId::new(id),
            kind,
            text,
            heading_level: None,
            list_depth: None,
            snapshot,
        }
    }

    pub fn heading(id: impl Into<String>, level: u8, text: impl Into<String>) -> Self {
        let mut block = Self::new(id, BlockKind::Heading, text);
        block.heading_level = Some(level);
        block
    }

    /// Replace the block's text and refresh its snapshot token.
    pub fn set_text(&mut self, text: String) {
        self.snapshot = SnapshotToken::of(&text);
        self.text = text;
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// The document intermediate representation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentIr {
    #[serde(default)]
    pub title: String,
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DocumentIr {
    pub fn block(&self, id: &BlockId) -> Option<&Block> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    pub fn block_mut(&mut self, id: &BlockId) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| &b.id == id)
    }

    /// Full text of the document, blocks joined by blank lines. Used for
    /// redline generation and protected-term counting.
    pub fn full_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            out.push_str(&block.text);
        }
        out
    }

    pub fn inventory(&self) -> StructureInventory {
        StructureInventory::of(self)
    }
}

/// Pre/post structural counts used by the verifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureInventory {
    /// Heading count per level (level -> count).
    pub headings: BTreeMap<u8, usize>,
    pub paragraph_count: usize,
    pub table_cell_count: usize,
    pub caption_count: usize,
    pub list_item_count: usize,
}

impl StructureInventory {
    pub fn of(ir: &DocumentIr) -> Self {
        let mut inv = Self::default();
        for block in &ir.blocks {
            match block.kind {
                BlockKind::Heading => {
                    let level = block.heading_level.unwrap_or(1);
                    *inv.headings.entry(level).or_insert(0) += 1;
                }
                BlockKind::Paragraph => inv.paragraph_count += 1,
                BlockKind::TableCell => inv.table_cell_count += 1,
                BlockKind::Caption => inv.caption_count += 1,
                BlockKind::ListItem => inv.list_item_count += 1,
            }
        }
        inv
    }
}

/// Severity of a detector finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// A detector's report of a style or structure issue. Read-only input to
/// proposal; never mutated downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    pub severity: Severity,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<BlockId>,
    /// Byte span within the block's text, when the finding is span-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub span: Option<(usize, usize)>,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_ir() -> DocumentIr {
        DocumentIr {
            title: "Sample".to_string(),
            blocks: vec![
                Block::heading("h1", 1, "Overview"),
                Block::new("p1", BlockKind::Paragraph, "First paragraph."),
                Block::heading("h2", 2, "Details"),
                Block::new("p2", BlockKind::Paragraph, "Second paragraph."),
                Block::new("c1", BlockKind::Caption, "Figure 1: Topology"),
            ],
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn snapshot_token_tracks_text() {
        let mut block = Block::new("b1", BlockKind::Paragraph, "hello world");
        let original = block.snapshot;
        block.set_text("hello there".to_string());
        assert_ne!(block.snapshot, original);
        assert_eq!(block.snapshot, SnapshotToken::of("hello there"));
    }

    #[test]
    fn inventory_counts_by_kind_and_level() {
        let inv = sample_ir().inventory();
        assert_eq!(inv.headings.get(&1), Some(&1));
        assert_eq!(inv.headings.get(&2), Some(&1));
        assert_eq!(inv.paragraph_count, 2);
        assert_eq!(inv.caption_count, 1);
    }

    #[test]
    fn full_text_joins_blocks() {
        let ir = sample_ir();
        let text = ir.full_text();
        assert!(text.contains("Overview\n\nFirst paragraph."));
    }

    #[test]
    fn block_lookup_by_id() {
        let ir = sample_ir();
        assert!(ir.block(&BlockId::new("p2")).is_some());
        assert!(ir.block(&BlockId::new("missing")).is_none());
    }
}

//! Chunking for the holistic rewrite path.
//!
//! A chunk is the unit of rewrite: one or more contiguous prose blocks plus
//! surrounding context that goes to the rewrite source as prompt material
//! only. Strategies differ in how they group blocks; all of them preserve
//! block order and never split a block.

use crate::ir::{Block, BlockId, BlockKind, DocumentIr};
use std::collections::BTreeSet;

/// Blocks shorter than this are kept verbatim, not rewritten.
pub const MIN_REWRITE_WORDS: usize = 20;
/// Word budget per adaptive chunk.
pub const CHUNK_WORD_BUDGET: usize = 200;
/// Words of surrounding text supplied as context.
pub const CONTEXT_WORDS: usize = 100;

/// One unit of rewrite work.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub id: String,
    pub block_ids: Vec<BlockId>,
    /// The rewritable text, blocks joined by blank lines.
    pub text: String,
    /// Preceding document text, prompt-only.
    pub context_before: String,
    /// Following document text, prompt-only.
    pub context_after: String,
    /// Nearest enclosing heading, if any.
    pub section_title: Option<String>,
    pub word_count: usize,
    /// False for chunks below the rewrite threshold; they pass through
    /// the coordinator untouched.
    pub rewritable: bool,
    /// Protected terms that occur in this chunk's text.
    pub protected_terms: Vec<String>,
}

/// How a document is split into chunks.
pub trait ChunkStrategy {
    fn name(&self) -> &str;

    fn split(&self, ir: &DocumentIr, protected_terms: &BTreeSet<String>) -> Vec<Chunk>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Paragraph,
    Section,
    Adaptive,
}

impl Strategy {
    pub fn as_strategy(&self) -> Box<dyn ChunkStrategy + Send + Sync> {
        match self {
            Strategy::Paragraph => Box::new(ParagraphChunker),
            Strategy::Section => Box::new(SectionChunker),
            Strategy::Adaptive => Box::new(AdaptiveChunker::default()),
        }
    }
}

/// One chunk per prose block.
#[derive(Debug, Default)]
pub struct ParagraphChunker;

impl ChunkStrategy for ParagraphChunker {
    fn name(&self) -> &str {
        "paragraph"
    }

    fn split(&self, ir: &DocumentIr, protected_terms: &BTreeSet<String>) -> Vec<Chunk> {
        let prose = prose_indices(ir);
        prose
            .iter()
            .enumerate()
            .map(|(n, &idx)| build_chunk(ir, &[idx], n, protected_terms))
            .collect()
    }
}

/// One chunk per heading-delimited run of prose blocks.
#[derive(Debug, Default)]
pub struct SectionChunker;

impl ChunkStrategy for SectionChunker {
    fn name(&self) -> &str {
        "section"
    }

    fn split(&self, ir: &DocumentIr, protected_terms: &BTreeSet<String>) -> Vec<Chunk> {
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();

        for (idx, block) in ir.blocks.iter().enumerate() {
            if block.kind == BlockKind::Heading {
                if !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
            } else if block.kind.is_prose() {
                current.push(idx);
            }
        }
        if !current.is_empty() {
            groups.push(current);
        }

        groups
            .iter()
            .enumerate()
            .map(|(n, indices)| build_chunk(ir, indices, n, protected_terms))
            .collect()
    }
}

/// Word-budget merge: contiguous prose blocks accumulate until the budget
/// is reached. An over-budget block starts its own chunk; blocks are never
/// split. Headings flush the running group.
#[derive(Debug)]
pub struct AdaptiveChunker {
    pub word_budget: usize,
}

impl Default for AdaptiveChunker {
    fn default() -> Self {
        Self {
            word_budget: CHUNK_WORD_BUDGET,
        }
    }
}

impl ChunkStrategy for AdaptiveChunker {
    fn name(&self) -> &str {
        "adaptive"
    }

    fn split(&self, ir: &DocumentIr, protected_terms: &BTreeSet<String>) -> Vec<Chunk> {
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut current_words = 0usize;

        for (idx, block) in ir.blocks.iter().enumerate() {
            if block.kind == BlockKind::Heading {
                if !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                    current_words = 0;
                }
                continue;
            }
            if !block.kind.is_prose() {
                continue;
            }

            let words = block.word_count();
            if words >= self.word_budget {
                // Over-budget block: flush, then emit it alone.
                if !current.is_empty() {
                    groups.push(std::mem::take(&mut current));
                }
                groups.push(vec![idx]);
                current_words = 0;
                continue;
            }
            if current_words + words > self.word_budget && !current.is_empty() {
                groups.push(std::mem::take(&mut current));
                current_words = 0;
            }
            current.push(idx);
            current_words += words;
        }
        if !current.is_empty() {
            groups.push(current);
        }

        groups
            .iter()
            .enumerate()
            .map(|(n, indices)| build_chunk(ir, indices, n, protected_terms))
            .collect()
    }
}

fn prose_indices(ir: &DocumentIr) -> Vec<usize> {
    ir.blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.kind.is_prose())
        .map(|(idx, _)| idx)
        .collect()
}

fn build_chunk(
    ir: &DocumentIr,
    indices: &[usize],
    ordinal: usize,
    protected_terms: &BTreeSet<String>,
) -> Chunk {
    let blocks: Vec<&Block> = indices.iter().map(|&i| &ir.blocks[i]).collect();
    let text = blocks
        .iter()
        .map(|b| b.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    let word_count: usize = blocks.iter().map(|b| b.word_count()).sum();

    let first = indices[0];
    let last = *indices.last().unwrap_or(&first);

    let lowered = text.to_lowercase();
    let terms = protected_terms
        .iter()
        .filter(|t| lowered.contains(&t.to_lowercase()))
        .cloned()
        .collect();

    Chunk {
        id: format!("chunk-{ordinal:04}"),
        block_ids: blocks.iter().map(|b| b.id.clone()).collect(),
        text,
        context_before: context_window(ir, first, true),
        context_after: context_window(ir, last, false),
        section_title: section_title(ir, first),
        word_count,
        rewritable: word_count >= MIN_REWRITE_WORDS,
        protected_terms: terms,
    }
}

/// Up to [`CONTEXT_WORDS`] words of document text before/after an index.
fn context_window(ir: &DocumentIr, idx: usize, before: bool) -> String {
    let mut words: Vec<String> = Vec::new();

    if before {
        for block in ir.blocks[..idx].iter().rev() {
            let mut block_words: Vec<String> =
                block.text.split_whitespace().map(str::to_string).collect();
            block_words.reverse();
            for w in block_words {
                if words.len() >= CONTEXT_WORDS {
                    break;
                }
                words.push(w);
            }
            if words.len() >= CONTEXT_WORDS {
                break;
            }
        }
        words.reverse();
    } else {
        for block in ir.blocks.iter().skip(idx + 1) {
            for w in block.text.split_whitespace() {
                if words.len() >= CONTEXT_WORDS {
                    break;
                }
                words.push(w.to_string());
            }
            if words.len() >= CONTEXT_WORDS {
                break;
            }
        }
    }

    words.join(" ")
}

fn section_title(ir: &DocumentIr, idx: usize) -> Option<String> {
    ir.blocks[..idx]
        .iter()
        .rev()
        .find(|b| b.kind == BlockKind::Heading)
        .map(|b| b.text.clone())
}

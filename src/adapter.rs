//! Document parsing and serialization.
//!
//! [`DocumentAdapter`] is the seam between the engine and concrete document
//! formats. The built-in [`TextAdapter`] handles a markdown-flavored plain
//! text form used by the CLI and tests; richer formats implement the same
//! trait externally.

use crate::ir::{Block, BlockKind, DocumentIr};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("input is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),

    #[error("document is empty")]
    Empty,

    #[error("heading at block {index} has no text after '#' markers")]
    EmptyHeading { index: usize },
}

/// Parses bytes into an IR and serializes an IR back to bytes.
pub trait DocumentAdapter {
    fn parse(&self, input: &[u8]) -> Result<DocumentIr, ParseError>;

    fn serialize(&self, ir: &DocumentIr) -> Vec<u8>;
}

static HEADING_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.*)$").unwrap());
static CAPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:Figure|Table)\s+\d+(?:[-.]\d+)?[.:]\s").unwrap());
static LIST_ITEM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\s*)[-*]\s+(.*)$").unwrap());

/// Markdown-flavored plain text: `#` headings, blank-line separated
/// paragraphs, `-`/`*` list items, `Figure N:`/`Table N:` captions. The
/// first level-1 heading becomes the document title.
#[derive(Debug, Default)]
pub struct TextAdapter;

impl DocumentAdapter for TextAdapter {
    fn parse(&self, input: &[u8]) -> Result<DocumentIr, ParseError> {
        let text = std::str::from_utf8(input)?;
        if text.trim().is_empty() {
            return Err(ParseError::Empty);
        }

        let mut ir = DocumentIr::default();
        let mut index = 0usize;

        for raw in text.split("\n\n") {
            let segment = raw.trim();
            if segment.is_empty() {
                continue;
            }

            if let Some(caps) = HEADING_RE.captures(segment) {
                let level = caps[1].len() as u8;
                let title = caps[2].trim();
                if title.is_empty() {
                    return Err(ParseError::EmptyHeading { index });
                }
                if level == 1 && ir.title.is_empty() {
                    ir.title = title.to_string();
                }
                ir.blocks
                    .push(Block::heading(format!("b{index:04}"), level, title));
                index += 1;
                continue;
            }

            // A run of list items becomes one block per item.
            if segment.lines().all(|l| LIST_ITEM_RE.is_match(l)) {
                for line in segment.lines() {
                    if let Some(caps) = LIST_ITEM_RE.captures(line) {
                        let depth = (caps[1].len() / 2) as u8 + 1;
                        let mut block =
                            Block::new(format!("b{index:04}"), BlockKind::ListItem, &caps[2]);
                        block.list_depth = Some(depth);
                        ir.blocks.push(block);
                        index += 1;
                    }
                }
                continue;
            }

            let kind = if CAPTION_RE.is_match(segment) {
                BlockKind::Caption
            } else {
                BlockKind::Paragraph
            };
            // Unwrap hard line breaks within a paragraph.
            let flowed = segment
                .lines()
                .map(str::trim)
                .collect::<Vec<_>>()
                .join(" ");
            ir.blocks.push(Block::new(format!("b{index:04}"), kind, flowed));
            index += 1;
        }

        if ir.blocks.is_empty() {
            return Err(ParseError::Empty);
        }
        Ok(ir)
    }

    fn serialize(&self, ir: &DocumentIr) -> Vec<u8> {
        let mut out = String::new();
        for block in &ir.blocks {
            if !out.is_empty() {
                out.push_str("\n\n");
            }
            match block.kind {
                BlockKind::Heading => {
                    let level = block.heading_level.unwrap_or(1) as usize;
                    out.push_str(&"#".repeat(level.clamp(1, 6)));
                    out.push(' ');
                    out.push_str(&block.text);
                }
                BlockKind::ListItem => {
                    let depth = block.list_depth.unwrap_or(1).saturating_sub(1) as usize;
                    out.push_str(&"  ".repeat(depth));
                    out.push_str("- ");
                    out.push_str(&block.text);
                }
                _ => out.push_str(&block.text),
            }
        }
        out.push('\n');
        out.into_bytes()
    }
}

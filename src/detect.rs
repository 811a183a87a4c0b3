//! Style detectors.
//!
//! A [`Detector`] reads the IR and emits [`Finding`]s; it never mutates the
//! document. The built-in [`RegexDetector`] covers the pattern-expressible
//! house-style checks; model-backed detectors plug in behind the same trait.

use crate::ir::{BlockKind, DocumentIr, Finding, Severity};
use crate::rules::LintSettings;
use once_cell::sync::Lazy;
use regex::Regex;

/// Read-only style analysis over a document.
pub trait Detector {
    fn name(&self) -> &str;

    fn lint(&self, ir: &DocumentIr, settings: &LintSettings) -> Vec<Finding>;
}

static CAPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(Figure|Table)\s+\d+-\d+[.:]\s+\S").unwrap());

static THROAT_CLEARING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(it should be noted that|it is important to note that|it is worth noting that|needless to say|as previously mentioned)\b",
    )
    .unwrap()
});

static SENTENCE_SPLIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]+\s+").unwrap());

/// Pattern-based house-style detector.
#[derive(Debug, Default)]
pub struct RegexDetector;

impl Detector for RegexDetector {
    fn name(&self) -> &str {
        "regex"
    }

    fn lint(&self, ir: &DocumentIr, settings: &LintSettings) -> Vec<Finding> {
        let mut findings = Vec::new();

        check_title(ir, settings, &mut findings);
        check_required_sections(ir, settings, &mut findings);

        for block in &ir.blocks {
            match block.kind {
                BlockKind::Caption => check_caption(block, &mut findings),
                kind if kind.is_prose() => {
                    check_throat_clearing(block, &mut findings);
                    check_long_sentences(block, settings, &mut findings);
                }
                _ => {}
            }
        }

        findings
    }
}

fn check_title(ir: &DocumentIr, settings: &LintSettings, findings: &mut Vec<Finding>) {
    let words = ir.title.split_whitespace().count();
    if words > settings.title_max_words {
        findings.push(Finding {
            rule_id: "lint.title_length".to_string(),
            severity: Severity::Warning,
            category: "structure".to_string(),
            block_id: None,
            span: None,
            message: format!(
                "title has {words} words, limit is {}",
                settings.title_max_words
            ),
        });
    }
}

fn check_required_sections(ir: &DocumentIr, settings: &LintSettings, findings: &mut Vec<Finding>) {
    for required in &settings.required_sections {
        let want = required.to_lowercase();
        let present = ir.blocks.iter().any(|b| {
            b.kind == BlockKind::Heading && b.text.to_lowercase().contains(&want)
        });
        if !present {
            findings.push(Finding {
                rule_id: "lint.required_section".to_string(),
                severity: Severity::Critical,
                category: "structure".to_string(),
                block_id: None,
                span: None,
                message: format!("required section '{required}' not found"),
            });
        }
    }
}

fn check_caption(block: &crate::ir::Block, findings: &mut Vec<Finding>) {
    if !CAPTION_RE.is_match(&block.text) {
        findings.push(Finding {
            rule_id: "lint.caption_format".to_string(),
            severity: Severity::Warning,
            category: "structure".to_string(),
            block_id: Some(block.id.clone()),
            span: None,
            message: format!(
                "caption does not match 'Figure N-N. Text' format: {:?}",
                truncate(&block.text, 60)
            ),
        });
    }
}

fn check_throat_clearing(block: &crate::ir::Block, findings: &mut Vec<Finding>) {
    if let Some(m) = THROAT_CLEARING_RE.find(&block.text) {
        findings.push(Finding {
            rule_id: "lint.throat_clearing".to_string(),
            severity: Severity::Info,
            category: "clarity".to_string(),
            block_id: Some(block.id.clone()),
            span: Some((m.start(), m.end())),
            message: format!("paragraph opens with filler: {:?}", m.as_str()),
        });
    }
}

fn check_long_sentences(
    block: &crate::ir::Block,
    settings: &LintSettings,
    findings: &mut Vec<Finding>,
) {
    for sentence in SENTENCE_SPLIT_RE.split(&block.text) {
        let words = sentence.split_whitespace().count();
        if words > settings.max_sentence_words {
            findings.push(Finding {
                rule_id: "lint.long_sentence".to_string(),
                severity: Severity::Warning,
                category: "clarity".to_string(),
                block_id: Some(block.id.clone()),
                span: None,
                message: format!(
                    "sentence has {words} words, limit is {}: {:?}",
                    settings.max_sentence_words,
                    truncate(sentence, 60)
                ),
            });
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Findings with `Severity::Critical` or above in `after` that have no
/// counterpart rule in `before`. Used as the style guardrail on rewrites.
pub fn new_high_severity<'a>(before: &[Finding], after: &'a [Finding]) -> Vec<&'a Finding> {
    after
        .iter()
        .filter(|f| f.severity >= Severity::Critical)
        .filter(|f| {
            !before
                .iter()
                .any(|b| b.rule_id == f.rule_id && b.block_id == f.block_id)
        })
        .collect()
}

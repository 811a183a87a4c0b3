//! Rule-driven proposal.
//!
//! Compiles each replacement rule to a regex, scans every block, and emits
//! one anchored [`EditOp`] per match. Proposal never mutates the IR; the
//! apply engine is the only writer.

use crate::editop::{EditOp, EditOpError, EditSource};
use crate::ir::{BlockKind, DocumentIr};
use crate::rules::{ReplacementRule, RulePack};
use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Confidence attached to ordinary rule matches. Deterministic rules sit at
/// the top of the scale so they win conflicts against model proposals.
const RULE_CONFIDENCE: f64 = 0.95;
/// Confidence for rules marked `requires_review`.
const REVIEW_CONFIDENCE: f64 = 0.6;

#[derive(Error, Debug)]
pub enum ProposeError {
    #[error("rule '{rule_id}' has an unusable search pattern: {source}")]
    Pattern {
        rule_id: String,
        source: regex::Error,
    },

    #[error("rule '{rule_id}' produced an invalid op: {source}")]
    Op {
        rule_id: String,
        source: EditOpError,
    },
}

/// Propose ops for every rule match in the document.
///
/// `seq` numbers are assigned in block order then match order, so two runs
/// over the same IR and pack yield identical proposals.
pub fn propose_from_rules(ir: &DocumentIr, pack: &RulePack) -> Result<Vec<EditOp>, ProposeError> {
    let compiled: Vec<(Regex, &ReplacementRule)> = pack
        .rules
        .iter()
        .map(|rule| {
            compile_rule(rule).map(|re| (re, rule)).map_err(|source| {
                ProposeError::Pattern {
                    rule_id: rule.id.clone(),
                    source,
                }
            })
        })
        .collect::<Result<_, _>>()?;

    let mut ops = Vec::new();
    let mut seq: u64 = 0;

    for block in &ir.blocks {
        if block.kind == BlockKind::Heading {
            continue;
        }
        let shielded = protected_spans(&block.text, pack);
        for (re, rule) in &compiled {
            for m in re.find_iter(&block.text) {
                if m.as_str() == rule.replace {
                    continue;
                }
                if shielded.iter().any(|&(s, e)| m.start() < e && s < m.end()) {
                    continue;
                }
                let confidence = if rule.requires_review {
                    REVIEW_CONFIDENCE
                } else {
                    RULE_CONFIDENCE
                };
                let op = if rule.replace.is_empty() {
                    EditOp::delete_span(
                        block,
                        m.start(),
                        m.end(),
                        &rule.id,
                        &rule.rationale,
                        EditSource::Rule,
                        confidence,
                        seq,
                    )
                } else {
                    EditOp::replace_span(
                        block,
                        m.start(),
                        m.end(),
                        &rule.replace,
                        &rule.id,
                        &rule.rationale,
                        EditSource::Rule,
                        confidence,
                        seq,
                    )
                }
                .map_err(|source| ProposeError::Op {
                    rule_id: rule.id.clone(),
                    source,
                })?
                .with_risk_tier(rule.risk_tier);
                seq += 1;
                ops.push(op);
            }
        }
    }

    debug!(proposals = ops.len(), rules = pack.rules.len(), "rule scan complete");
    Ok(ops)
}

/// Byte ranges of protected-term occurrences; rule matches inside them are
/// never proposed.
fn protected_spans(text: &str, pack: &RulePack) -> Vec<(usize, usize)> {
    let lowered = text.to_lowercase();
    let mut spans = Vec::new();
    for term in &pack.protected_terms {
        let needle = term.to_lowercase();
        if needle.is_empty() {
            continue;
        }
        let mut from = 0;
        while let Some(pos) = lowered[from..].find(&needle) {
            let start = from + pos;
            spans.push((start, start + needle.len()));
            from = start + needle.len();
        }
    }
    spans
}

fn compile_rule(rule: &ReplacementRule) -> Result<Regex, regex::Error> {
    let mut pattern = String::new();
    if rule.case_insensitive {
        pattern.push_str("(?i)");
    }
    if rule.whole_word {
        pattern.push_str(r"\b");
    }
    pattern.push_str(&regex::escape(&rule.search));
    if rule.whole_word {
        pattern.push_str(r"\b");
    }
    Regex::new(&pattern)
}

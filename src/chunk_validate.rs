//! Per-chunk validation of candidate rewrites.
//!
//! Hard checks (numbers, citations, protected terms) reject the candidate
//! outright; soft checks (length, style guardrail) flag it for the caller's
//! policy to resolve. The decision is a pure function of check results, so
//! the same inputs always produce the same decision.

use crate::chunker::Chunk;
use crate::ir::Finding;
use crate::scan;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What to do with a flagged (soft-fail only) rewrite. There is no default
/// on purpose: the caller decides, every run, whether flagged candidates
/// land or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlaggedPolicy {
    KeepOriginal,
    AcceptRewrite,
}

impl fmt::Display for FlaggedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlaggedPolicy::KeepOriginal => f.write_str("keep-original"),
            FlaggedPolicy::AcceptRewrite => f.write_str("accept-rewrite"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidatorSettings {
    /// Minimum candidate length as a fraction of the original.
    pub min_length_ratio: f64,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            min_length_ratio: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkCheck {
    pub name: &'static str,
    pub passed: bool,
    /// Hard failures reject; soft failures flag.
    pub hard: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkDecision {
    Accepted,
    Rejected,
    Flagged,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChunkValidation {
    pub chunk_id: String,
    pub decision: ChunkDecision,
    pub checks: Vec<ChunkCheck>,
}

impl ChunkValidation {
    pub fn failed_checks(&self) -> impl Iterator<Item = &ChunkCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    /// True when the only failures are the style guardrail, which is what
    /// permits the coordinator's single re-attempt.
    pub fn only_style_guardrail_failed(&self) -> bool {
        let mut any = false;
        for check in self.failed_checks() {
            if check.name != "style_guardrail" {
                return false;
            }
            any = true;
        }
        any
    }
}

/// Validate `candidate` as a replacement for `chunk.text`.
///
/// `findings_before`/`findings_after` are detector runs over the original
/// and candidate text; only new high-severity findings count against the
/// candidate.
pub fn validate_chunk(
    chunk: &Chunk,
    candidate: &str,
    settings: &ValidatorSettings,
    findings_before: &[Finding],
    findings_after: &[Finding],
) -> ChunkValidation {
    let mut checks = Vec::new();
    let original = &chunk.text;

    let missing_numbers = scan::missing_tokens(
        &scan::numeric_tokens(original),
        &scan::numeric_tokens(candidate),
    );
    checks.push(ChunkCheck {
        name: "numbers_preserved",
        passed: missing_numbers.is_empty(),
        hard: true,
        detail: if missing_numbers.is_empty() {
            "all numeric tokens preserved".to_string()
        } else {
            format!("missing: {}", missing_numbers.join(", "))
        },
    });

    let missing_citations = scan::missing_tokens(
        &scan::citation_tokens(original),
        &scan::citation_tokens(candidate),
    );
    checks.push(ChunkCheck {
        name: "citations_preserved",
        passed: missing_citations.is_empty(),
        hard: true,
        detail: if missing_citations.is_empty() {
            "all citations preserved".to_string()
        } else {
            format!("missing: {}", missing_citations.join(", "))
        },
    });

    let mut lost_terms = Vec::new();
    for term in &chunk.protected_terms {
        let pre = scan::term_count(original, term);
        let post = scan::term_count(candidate, term);
        if post < pre {
            lost_terms.push(format!("'{term}' ({pre} -> {post})"));
        }
    }
    checks.push(ChunkCheck {
        name: "terms_preserved",
        passed: lost_terms.is_empty(),
        hard: true,
        detail: if lost_terms.is_empty() {
            format!("{} protected terms intact", chunk.protected_terms.len())
        } else {
            lost_terms.join(", ")
        },
    });

    let min_len = (original.len() as f64 * settings.min_length_ratio) as usize;
    let length_ok = candidate.len() >= min_len;
    checks.push(ChunkCheck {
        name: "length_reasonable",
        passed: length_ok,
        hard: false,
        detail: format!(
            "candidate {} bytes, minimum {} ({}% of original)",
            candidate.len(),
            min_len,
            (settings.min_length_ratio * 100.0) as usize
        ),
    });

    let new_findings = crate::detect::new_high_severity(findings_before, findings_after);
    checks.push(ChunkCheck {
        name: "style_guardrail",
        passed: new_findings.is_empty(),
        hard: false,
        detail: if new_findings.is_empty() {
            "no new high-severity findings".to_string()
        } else {
            format!(
                "new findings: {}",
                new_findings
                    .iter()
                    .map(|f| f.rule_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )
        },
    });

    ChunkValidation {
        chunk_id: chunk.id.clone(),
        decision: decide(&checks),
        checks,
    }
}

/// Pure decision from check results: hard fail rejects, soft-only fail
/// flags, otherwise accepted.
fn decide(checks: &[ChunkCheck]) -> ChunkDecision {
    if checks.iter().any(|c| c.hard && !c.passed) {
        ChunkDecision::Rejected
    } else if checks.iter().any(|c| !c.passed) {
        ChunkDecision::Flagged
    } else {
        ChunkDecision::Accepted
    }
}

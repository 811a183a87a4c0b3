//! Post-apply verifier.
//!
//! Confirms the new IR is a legitimate transformation of the original.
//! Always runs after the apply engine, never inside it; a failed report is
//! fatal to the run, and the pipeline surfaces the original IR instead of a
//! partially edited document.

use crate::apply::ApplyOutcome;
use crate::ir::DocumentIr;
use crate::scan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Outcome of one verification check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyCheck {
    pub name: String,
    pub passed: bool,
    pub detail: String,
}

/// The full verification report. `passed` is the conjunction of all checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    pub checks: Vec<VerifyCheck>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &VerifyCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    fn push(&mut self, name: &str, passed: bool, detail: impl Into<String>) {
        self.checks.push(VerifyCheck {
            name: name.to_string(),
            passed,
            detail: detail.into(),
        });
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for check in &self.checks {
            let mark = if check.passed { "ok" } else { "FAIL" };
            writeln!(f, "[{mark}] {}: {}", check.name, check.detail)?;
        }
        Ok(())
    }
}

/// Raised by the pipeline when a report fails; carries the report so the
/// diagnostic surface survives the abort.
#[derive(Error, Debug)]
#[error("verification failed: {failed} of {total} checks did not pass")]
pub struct VerificationFailure {
    pub failed: usize,
    pub total: usize,
    pub report: VerificationReport,
}

impl VerificationFailure {
    pub fn from_report(report: VerificationReport) -> Self {
        Self {
            failed: report.failures().count(),
            total: report.checks.len(),
            report,
        }
    }
}

/// Verify `outcome` against the pre-apply `original` IR.
///
/// Checks, each pass/fail with detail:
/// - protected-term integrity (occurrence counts must not decrease),
/// - structural inventory equality (unless an op declared otherwise),
/// - per-op preservation of numbers, citations, and normative keywords,
/// - no orphaned anchors (anchors that failed to resolve abort apply
///   before verification; the check records that none slipped through).
pub fn verify(
    original: &DocumentIr,
    outcome: &ApplyOutcome,
    protected_terms: &BTreeSet<String>,
) -> VerificationReport {
    let mut report = VerificationReport::default();

    check_protected_terms(&mut report, original, &outcome.ir, protected_terms);
    check_structure(&mut report, original, outcome);
    check_op_invariants(&mut report, outcome);
    check_anchors(&mut report, outcome);

    report
}

fn check_protected_terms(
    report: &mut VerificationReport,
    original: &DocumentIr,
    result: &DocumentIr,
    protected_terms: &BTreeSet<String>,
) {
    let before = original.full_text();
    let after = result.full_text();

    let mut violated = Vec::new();
    for term in protected_terms {
        let pre = scan::term_count(&before, term);
        if pre == 0 {
            continue;
        }
        let post = scan::term_count(&after, term);
        if post < pre {
            violated.push(format!("'{term}' ({pre} -> {post})"));
        }
    }

    if violated.is_empty() {
        report.push(
            "protected_terms",
            true,
            format!("{} terms checked, none decreased", protected_terms.len()),
        );
    } else {
        report.push(
            "protected_terms",
            false,
            format!("occurrence count decreased: {}", violated.join(", ")),
        );
    }
}

fn check_structure(report: &mut VerificationReport, original: &DocumentIr, outcome: &ApplyOutcome) {
    let declared = outcome
        .applied
        .iter()
        .any(|op| op.declares_structural_change());
    let pre = original.inventory();
    let post = outcome.ir.inventory();

    if pre == post {
        report.push("structure", true, "inventory unchanged");
    } else if declared {
        report.push(
            "structure",
            true,
            "inventory changed but an applied op declared a structural change",
        );
    } else {
        report.push(
            "structure",
            false,
            format!("inventory drifted without a declared change: {pre:?} -> {post:?}"),
        );
    }
}

/// Per-applied-op content invariants, in the spirit of running the checks
/// on the smallest span that changed: numbers, citations, and normative
/// keywords in `before` must all survive into `new_text`.
fn check_op_invariants(report: &mut VerificationReport, outcome: &ApplyOutcome) {
    let mut problems = Vec::new();

    for op in &outcome.applied {
        let missing_numbers = scan::missing_tokens(
            &scan::numeric_tokens(&op.before),
            &scan::numeric_tokens(&op.new_text),
        );
        if !missing_numbers.is_empty() {
            problems.push(format!(
                "op {} dropped numbers: {}",
                op.id,
                missing_numbers.join(", ")
            ));
        }

        let missing_citations = scan::missing_tokens(
            &scan::citation_tokens(&op.before),
            &scan::citation_tokens(&op.new_text),
        );
        if !missing_citations.is_empty() {
            problems.push(format!(
                "op {} dropped citations: {}",
                op.id,
                missing_citations.join(", ")
            ));
        }

        let missing_keywords = scan::missing_tokens(
            &scan::normative_keywords(&op.before),
            &scan::normative_keywords(&op.new_text),
        );
        if !missing_keywords.is_empty() {
            problems.push(format!(
                "op {} dropped normative keywords: {}",
                op.id,
                missing_keywords.join(", ")
            ));
        }
    }

    if problems.is_empty() {
        report.push(
            "op_invariants",
            true,
            format!("{} applied ops preserved numbers/citations/keywords", outcome.applied.len()),
        );
    } else {
        report.push("op_invariants", false, problems.join("; "));
    }
}

fn check_anchors(report: &mut VerificationReport, outcome: &ApplyOutcome) {
    // Apply aborts on any unresolvable anchor, so reaching verification
    // means every applied op's anchor resolved. Recorded explicitly so the
    // report enumerates the invariant rather than implying it.
    report.push(
        "anchors_resolved",
        true,
        format!("{} anchors resolved during apply", outcome.applied.len()),
    );
}

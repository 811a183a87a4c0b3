//! End-to-end surgical editing scenarios: parse, propose, apply, verify.

use prose_patcher::adapter::{DocumentAdapter, TextAdapter};
use prose_patcher::apply::{apply_ops, ApplyError, ConflictReason};
use prose_patcher::editop::{EditOp, EditSource};
use prose_patcher::ir::BlockId;
use prose_patcher::pipeline::{self, Mode, PipelineConfig, PipelineError};
use prose_patcher::rules;
use prose_patcher::verify::verify;
use std::collections::BTreeSet;

const GUIDE: &str = "\
# Edge Deployment Guide

## Performance

The implementation of the utilization of edge caching reduces latency.
Figure 1 shows a 42% improvement over the baseline configuration.

## Operations

Operators SHALL monitor queue depth in order to catch saturation early.
";

fn parse(text: &str) -> prose_patcher::ir::DocumentIr {
    TextAdapter.parse(text.as_bytes()).unwrap()
}

#[tokio::test]
async fn safe_run_rewrites_wordy_phrase_and_keeps_facts() {
    let ir = parse(GUIDE);
    let config = PipelineConfig::new(Mode::Safe, rules::default_pack());
    let run = pipeline::run(&ir, &config, None).await.unwrap();

    let text = run.ir.full_text();
    assert!(text.contains("The use of edge caching reduces latency."));
    assert!(text.contains("42%"));
    assert!(text.contains("Figure 1"));
    assert!(text.contains("SHALL"));
    // "in order to" -> "to"
    assert!(text.contains("queue depth to catch saturation early"));
    assert!(run.changelog.verification.as_ref().unwrap().passed());
}

#[tokio::test]
async fn safe_run_is_idempotent() {
    let ir = parse(GUIDE);
    let config = PipelineConfig::new(Mode::Safe, rules::default_pack());
    let first = pipeline::run(&ir, &config, None).await.unwrap();
    let second = pipeline::run(&first.ir, &config, None).await.unwrap();
    assert_eq!(first.ir, second.ir);
    assert_eq!(second.changelog.stats.ops_applied, 0);
}

#[tokio::test]
async fn serialization_round_trips_after_editing() {
    let ir = parse(GUIDE);
    let config = PipelineConfig::new(Mode::Safe, rules::default_pack());
    let run = pipeline::run(&ir, &config, None).await.unwrap();

    let bytes = TextAdapter.serialize(&run.ir);
    let reparsed = TextAdapter.parse(&bytes).unwrap();
    assert_eq!(run.ir.blocks.len(), reparsed.blocks.len());
}

#[test]
fn overlapping_ops_keep_higher_confidence_and_record_reject() {
    let ir = parse("Paragraph with enough text to carve two overlapping spans from safely.");
    let block = &ir.blocks[0];

    let strong = EditOp::replace_span(
        block, 10, 20, "STRONG", "rule.a", "", EditSource::Rule, 0.9, 0,
    )
    .unwrap();
    let weak = EditOp::replace_span(
        block, 15, 25, "WEAK", "rule.b", "", EditSource::Llm, 0.6, 1,
    )
    .unwrap();
    let strong_id = strong.id.clone();

    let outcome = apply_ops(&ir, vec![weak, strong]).unwrap();
    assert_eq!(outcome.applied.len(), 1);
    assert_eq!(outcome.applied[0].id, strong_id);
    assert_eq!(outcome.rejected.len(), 1);
    assert_eq!(outcome.rejected[0].winner_id, strong_id);
    assert_eq!(outcome.rejected[0].reason, ConflictReason::LowerConfidence);
    assert!(outcome.ir.blocks[0].text.contains("STRONG"));
    assert!(!outcome.ir.blocks[0].text.contains("WEAK"));
}

#[test]
fn stale_anchor_is_fatal() {
    let mut ir = parse("Original paragraph text that will change before apply runs.");
    let op = EditOp::replace_span(
        &ir.blocks[0], 0, 8, "Modified", "rule.x", "", EditSource::Rule, 1.0, 0,
    )
    .unwrap();

    // Mutate the block after proposal; the snapshot token no longer matches.
    let id = ir.blocks[0].id.clone();
    ir.block_mut(&id).unwrap().set_text("Entirely different text now.".to_string());

    let err = apply_ops(&ir, vec![op]).unwrap_err();
    assert!(matches!(err, ApplyError::StaleAnchor { .. }));
}

#[test]
fn verification_catches_dropped_percentage() {
    let ir = parse("Throughput improved 42% after the cache warmed fully up.");
    let block = &ir.blocks[0];
    let op = EditOp::replace_span(
        block,
        0,
        block.text.len(),
        "Throughput improved substantially after the cache warmed fully up.",
        "rewrite.block",
        "",
        EditSource::Llm,
        0.9,
        0,
    )
    .unwrap();

    let outcome = apply_ops(&ir, vec![op]).unwrap();
    let report = verify(&ir, &outcome, &BTreeSet::new());
    assert!(!report.passed());
}

#[tokio::test]
async fn rules_cannot_touch_protected_terms() {
    let ir = parse("# T\n\nThe Digital Twin Consortium publishes the capabilities model today.");
    let mut pack = rules::default_pack();
    // A rule that would abbreviate a protected term; proposal shields it.
    let hostile = rules::load_from_str(
        r#"
        [[rules]]
        id = "bad.shorten"
        search = "Digital Twin Consortium"
        replace = "DTC"
        "#,
    )
    .unwrap();
    pack.merge(hostile);

    let config = PipelineConfig::new(Mode::Safe, pack);
    let run = pipeline::run(&ir, &config, None).await.unwrap();
    assert!(run.ir.full_text().contains("Digital Twin Consortium"));
    assert_eq!(run.changelog.stats.ops_applied, 0);
}

#[tokio::test]
async fn number_dropping_rule_fails_the_run() {
    let ir = parse("# T\n\nLatency fell 42% after the cache warmed.");
    let mut pack = rules::default_pack();
    pack.merge(
        rules::load_from_str(
            r#"
            [[rules]]
            id = "bad.vague"
            search = "42%"
            replace = "substantially"
            "#,
        )
        .unwrap(),
    );

    let config = PipelineConfig::new(Mode::Safe, pack);
    let err = pipeline::run(&ir, &config, None).await.unwrap_err();
    assert!(matches!(err, PipelineError::Verification(_)));
}

#[tokio::test]
async fn confidence_threshold_filters_weak_ops() {
    let ir = parse("# T\n\nWe might leverage the cache more aggressively in this path.");
    let mut pack = rules::default_pack();
    pack.merge(
        rules::load_from_str(
            r#"
            [[rules]]
            id = "review.leverage"
            search = "leverage"
            replace = "use"
            requires_review = true
            "#,
        )
        .unwrap(),
    );

    let mut config = PipelineConfig::new(Mode::Safe, pack);
    config.confidence_threshold = 0.9;
    let run = pipeline::run(&ir, &config, None).await.unwrap();
    assert!(run.ir.full_text().contains("leverage"));
    assert_eq!(run.changelog.stats.ops_applied, 0);
    assert_eq!(run.changelog.stats.ops_proposed, 1);
}

#[tokio::test]
async fn block_ids_survive_editing() {
    let ir = parse(GUIDE);
    let ids: Vec<BlockId> = ir.blocks.iter().map(|b| b.id.clone()).collect();

    let config = PipelineConfig::new(Mode::Safe, rules::default_pack());
    let run = pipeline::run(&ir, &config, None).await.unwrap();
    let after: Vec<BlockId> = run.ir.blocks.iter().map(|b| b.id.clone()).collect();
    assert_eq!(ids, after);
}

//! End-to-end holistic pipeline scenarios with a scripted rewrite source.

use async_trait::async_trait;
use prose_patcher::adapter::{DocumentAdapter, TextAdapter};
use prose_patcher::chunk_validate::FlaggedPolicy;
use prose_patcher::chunker::Strategy;
use prose_patcher::pipeline::{self, Mode, PipelineConfig};
use prose_patcher::rewrite::{
    RewriteRequest, RewriteResponse, RewriteSource, RewriteSourceError,
};
use prose_patcher::rules;
use std::collections::HashMap;
use std::sync::Arc;

/// Maps exact chunk text to scripted replacement text. Unknown chunks echo.
struct ScriptedSource {
    replies: HashMap<String, String>,
}

impl ScriptedSource {
    fn new(pairs: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            replies: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        })
    }
}

#[async_trait]
impl RewriteSource for ScriptedSource {
    async fn rewrite(&self, request: RewriteRequest) -> Result<RewriteResponse, RewriteSourceError> {
        let text = self
            .replies
            .get(&request.text)
            .cloned()
            .unwrap_or_else(|| request.text.clone());
        Ok(RewriteResponse {
            text,
            confidence: 0.85,
            summary: "scripted".to_string(),
        })
    }
}

const FIGURE_PARA: &str = "Figure 1 shows the measured results of the deployment where \
latency dropped by 42% once the Multi-access Edge Computing nodes were placed closer \
to the radio sites in the field.";

fn doc_with_figure_para() -> prose_patcher::ir::DocumentIr {
    let text = format!("# Results\n\n{FIGURE_PARA}\n");
    TextAdapter.parse(text.as_bytes()).unwrap()
}

fn holistic_config(policy: FlaggedPolicy) -> PipelineConfig {
    let mut config = PipelineConfig::new(Mode::Holistic, rules::default_pack());
    config.strategy = Strategy::Paragraph;
    config.flagged_policy = Some(policy);
    config
}

#[tokio::test]
async fn faithful_rewrite_is_accepted() {
    let ir = doc_with_figure_para();
    let source = ScriptedSource::new(&[(
        FIGURE_PARA,
        "As Figure 1 shows, latency dropped 42% after the Multi-access Edge Computing \
         nodes moved closer to the radio sites.",
    )]);

    let run = pipeline::run(&ir, &holistic_config(FlaggedPolicy::KeepOriginal), Some(source))
        .await
        .unwrap();

    let text = run.ir.full_text();
    assert!(text.contains("As Figure 1 shows, latency dropped 42%"));
    assert_eq!(run.changelog.stats.rewrites_used, 1);
}

#[tokio::test]
async fn rewrite_dropping_the_number_is_rejected() {
    let ir = doc_with_figure_para();
    let source = ScriptedSource::new(&[(
        FIGURE_PARA,
        "As Figure 1 shows, latency dropped substantially after the Multi-access Edge \
         Computing nodes moved closer to the radio sites.",
    )]);

    let run = pipeline::run(&ir, &holistic_config(FlaggedPolicy::AcceptRewrite), Some(source))
        .await
        .unwrap();

    // Hard failure keeps the original regardless of the flagged policy.
    assert!(run.ir.full_text().contains(FIGURE_PARA));
    assert_eq!(run.changelog.stats.rewrites_used, 0);
}

#[tokio::test]
async fn rewrite_dropping_protected_term_is_rejected() {
    let ir = doc_with_figure_para();
    let source = ScriptedSource::new(&[(
        FIGURE_PARA,
        "As Figure 1 shows, latency dropped 42% after the edge nodes moved closer to \
         the radio sites.",
    )]);

    let run = pipeline::run(&ir, &holistic_config(FlaggedPolicy::AcceptRewrite), Some(source))
        .await
        .unwrap();

    assert!(run.ir.full_text().contains("Multi-access Edge Computing"));
    assert_eq!(run.changelog.stats.rewrites_used, 0);
}

#[tokio::test]
async fn overshort_rewrite_follows_flagged_policy() {
    let ir = doc_with_figure_para();
    let short = "Figure 1: latency dropped 42% (Multi-access Edge Computing).";
    let keep = pipeline::run(
        &ir,
        &holistic_config(FlaggedPolicy::KeepOriginal),
        Some(ScriptedSource::new(&[(FIGURE_PARA, short)])),
    )
    .await
    .unwrap();
    assert!(keep.ir.full_text().contains(FIGURE_PARA));

    let accept = pipeline::run(
        &ir,
        &holistic_config(FlaggedPolicy::AcceptRewrite),
        Some(ScriptedSource::new(&[(FIGURE_PARA, short)])),
    )
    .await
    .unwrap();
    assert!(accept.ir.full_text().contains(short));
}

#[tokio::test]
async fn failing_source_keeps_whole_document() {
    struct FailingSource;

    #[async_trait]
    impl RewriteSource for FailingSource {
        async fn rewrite(
            &self,
            _request: RewriteRequest,
        ) -> Result<RewriteResponse, RewriteSourceError> {
            Err(RewriteSourceError::Unavailable("offline".to_string()))
        }
    }

    let ir = doc_with_figure_para();
    let run = pipeline::run(
        &ir,
        &holistic_config(FlaggedPolicy::AcceptRewrite),
        Some(Arc::new(FailingSource)),
    )
    .await
    .unwrap();

    assert_eq!(run.ir.full_text(), ir.full_text());
    assert_eq!(run.changelog.stats.rewrites_used, 0);
    assert!(run.changelog.stats.chunks_total > 0);
}

#[tokio::test]
async fn holistic_polish_cleans_up_after_assembly() {
    let para = "The teams worked for months on the rollout and the result was good \
with gains across every site in the region and no regressions in the field data.";
    let text = format!("# Rollout\n\n{para}\n");
    let ir = TextAdapter.parse(text.as_bytes()).unwrap();

    // The scripted rewrite introduces a wordy phrase the polish pass removes.
    let source = ScriptedSource::new(&[(
        para,
        "The implementation of the utilization of regional rollouts produced gains \
         across every site with no regressions in the field data.",
    )]);

    let mut config = PipelineConfig::new(Mode::HolisticPolish, rules::default_pack());
    config.strategy = Strategy::Paragraph;
    config.flagged_policy = Some(FlaggedPolicy::AcceptRewrite);

    let run = pipeline::run(&ir, &config, Some(source)).await.unwrap();
    let final_text = run.ir.full_text();
    assert!(final_text.contains("The use of regional rollouts"));
    assert!(!final_text.contains("implementation of the utilization"));
}

//! End-to-end editing pipeline.
//!
//! Four modes over the same building blocks. `safe` proposes from rules and
//! applies surgically; `rewrite` adds model-proposed whole-block ops through
//! the same apply path; `holistic` runs the chunk rewrite pipeline; and
//! `holistic-polish` follows holistic with a safe polish pass over the
//! assembled document. The surgical paths always verify and surface the
//! original document on verification failure.

use crate::acronyms::AcronymTracker;
use crate::apply::{apply_ops, ApplyError};
use crate::assemble::assemble;
use crate::changelog::Changelog;
use crate::chunk_validate::{validate_chunk, ChunkValidation, FlaggedPolicy, ValidatorSettings};
use crate::chunker::{Chunk, Strategy};
use crate::detect::{new_high_severity, Detector, RegexDetector};
use crate::editop::{EditOp, EditSource};
use crate::ir::{Block, BlockKind, DocumentIr, Finding};
use crate::propose::{propose_from_rules, ProposeError};
use crate::rewrite::{
    CoordinatorConfig, Guardrail, RewriteCoordinator, RewriteSource, RewriteStatus,
};
use crate::rules::RulePack;
use crate::verify::{verify, VerificationFailure};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Safe,
    Rewrite,
    Holistic,
    HolisticPolish,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Safe => "safe",
            Mode::Rewrite => "rewrite",
            Mode::Holistic => "holistic",
            Mode::HolisticPolish => "holistic-polish",
        }
    }

    pub fn needs_rewrite_source(&self) -> bool {
        !matches!(self, Mode::Safe)
    }

    pub fn is_holistic(&self) -> bool {
        matches!(self, Mode::Holistic | Mode::HolisticPolish)
    }
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Propose(#[from] ProposeError),

    #[error(transparent)]
    Apply(#[from] ApplyError),

    #[error(transparent)]
    Verification(#[from] VerificationFailure),

    #[error("mode '{0}' requires a rewrite source")]
    MissingRewriteSource(&'static str),

    #[error("holistic modes require an explicit flagged-chunk policy")]
    MissingFlaggedPolicy,
}

pub struct PipelineConfig {
    pub mode: Mode,
    pub pack: RulePack,
    /// Ops below this confidence are dropped before apply.
    pub confidence_threshold: f64,
    pub strategy: Strategy,
    pub coordinator: CoordinatorConfig,
    /// Required for holistic modes; ignored otherwise.
    pub flagged_policy: Option<FlaggedPolicy>,
    pub validator: ValidatorSettings,
    pub input_label: String,
}

impl PipelineConfig {
    pub fn new(mode: Mode, pack: RulePack) -> Self {
        Self {
            mode,
            pack,
            confidence_threshold: 0.7,
            strategy: Strategy::Adaptive,
            coordinator: CoordinatorConfig::default(),
            flagged_policy: None,
            validator: ValidatorSettings::default(),
            input_label: String::new(),
        }
    }
}

/// A finished run: final document plus the full record of how it got there.
#[derive(Debug)]
pub struct PipelineRun {
    pub ir: DocumentIr,
    pub changelog: Changelog,
}

/// Run the configured pipeline over a parsed document.
pub async fn run(
    original: &DocumentIr,
    config: &PipelineConfig,
    source: Option<Arc<dyn RewriteSource>>,
) -> Result<PipelineRun, PipelineError> {
    if config.mode.needs_rewrite_source() && source.is_none() {
        return Err(PipelineError::MissingRewriteSource(config.mode.as_str()));
    }
    if config.mode.is_holistic() && config.flagged_policy.is_none() {
        return Err(PipelineError::MissingFlaggedPolicy);
    }

    let mut log = Changelog::new(config.mode.as_str(), config.input_label.clone());
    let settings = config.pack.lint_settings();
    log.findings = RegexDetector.lint(original, &settings);

    let ir = match config.mode {
        Mode::Safe => run_surgical(original, config, Vec::new(), &mut log)?,
        Mode::Rewrite => {
            let source = source.as_ref().map(Arc::clone).ok_or(
                PipelineError::MissingRewriteSource("rewrite"),
            )?;
            let llm_ops = propose_block_rewrites(original, config, source).await;
            run_surgical(original, config, llm_ops, &mut log)?
        }
        Mode::Holistic | Mode::HolisticPolish => {
            let source = source.as_ref().map(Arc::clone).ok_or(
                PipelineError::MissingRewriteSource("holistic"),
            )?;
            let assembled = run_holistic(original, config, source, &mut log).await?;
            if config.mode == Mode::HolisticPolish {
                info!("holistic assembly done, starting polish pass");
                run_surgical(&assembled, config, Vec::new(), &mut log)?
            } else {
                assembled
            }
        }
    };

    log.stats.blocks = ir.blocks.len();
    Ok(PipelineRun { ir, changelog: log })
}

/// Rules plus any extra ops through propose, apply, verify.
fn run_surgical(
    original: &DocumentIr,
    config: &PipelineConfig,
    extra_ops: Vec<EditOp>,
    log: &mut Changelog,
) -> Result<DocumentIr, PipelineError> {
    let mut ops = propose_from_rules(original, &config.pack)?;
    ops.extend(extra_ops);
    let proposed = ops.len();

    ops.retain(|op| op.confidence >= config.confidence_threshold);
    let dropped = proposed - ops.len();
    if dropped > 0 {
        info!(dropped, threshold = config.confidence_threshold, "low-confidence ops dropped");
    }

    let outcome = apply_ops(original, ops)?;
    log.record_apply(proposed, &outcome);

    let report = verify(original, &outcome, &config.pack.protected_term_set());
    let passed = report.passed();
    log.verification = Some(report.clone());
    if !passed {
        warn!("verification failed, keeping original document");
        return Err(VerificationFailure::from_report(report).into());
    }

    Ok(outcome.ir)
}

/// Model-proposed whole-block replacements, fed through the surgical path.
async fn propose_block_rewrites(
    original: &DocumentIr,
    config: &PipelineConfig,
    source: Arc<dyn RewriteSource>,
) -> Vec<EditOp> {
    let terms = config.pack.protected_term_set();
    let chunks = Strategy::Paragraph.as_strategy().split(original, &terms);
    let coordinator = RewriteCoordinator::new(config.coordinator.clone());
    let results = coordinator.run(chunks, BTreeMap::new(), source).await;

    let mut ops = Vec::new();
    let mut seq = u64::MAX / 2; // keep rewrite seqs after all rule seqs
    for result in results.values() {
        let response = match (&result.status, &result.response) {
            (RewriteStatus::Rewritten { .. }, Some(r)) => r,
            _ => continue,
        };
        if response.text == result.chunk.text {
            continue;
        }
        let block_id = match result.chunk.block_ids.first() {
            Some(id) => id,
            None => continue,
        };
        let block = match original.block(block_id) {
            Some(b) => b,
            None => continue,
        };
        match EditOp::replace_block(
            block,
            &response.text,
            "rewrite.block",
            &response.summary,
            EditSource::Llm,
            response.confidence,
            seq,
        ) {
            Ok(op) => {
                seq += 1;
                ops.push(op);
            }
            Err(error) => warn!(block = %block_id, %error, "skipping invalid rewrite op"),
        }
    }
    ops
}

async fn run_holistic(
    original: &DocumentIr,
    config: &PipelineConfig,
    source: Arc<dyn RewriteSource>,
    log: &mut Changelog,
) -> Result<DocumentIr, PipelineError> {
    let policy = config.flagged_policy.ok_or(PipelineError::MissingFlaggedPolicy)?;
    let terms = config.pack.protected_term_set();
    let settings = config.pack.lint_settings();

    let chunks = config.strategy.as_strategy().split(original, &terms);
    info!(chunks = chunks.len(), strategy = ?config.strategy, "document chunked");

    let mut tracker = AcronymTracker::new();
    tracker.scan_existing(&original.full_text());
    let mut directives = BTreeMap::new();
    for chunk in &chunks {
        let d = tracker.process_chunk(&chunk.text);
        if !d.is_empty() {
            directives.insert(chunk.id.clone(), d.prompt_text());
        }
    }

    let guardrail: Arc<Guardrail> = {
        let settings = settings.clone();
        Arc::new(move |chunk: &Chunk, candidate: &str| {
            let before = lint_text(&chunk.text, &settings);
            let after = lint_text(candidate, &settings);
            new_high_severity(&before, &after).is_empty()
        })
    };

    let coordinator = RewriteCoordinator::new(config.coordinator.clone()).with_guardrail(guardrail);
    let results = coordinator.run(chunks, directives, source).await;

    let mut validations: BTreeMap<String, ChunkValidation> = BTreeMap::new();
    for (chunk_id, result) in &results {
        if !matches!(result.status, RewriteStatus::Rewritten { .. }) {
            continue;
        }
        let candidate = result.candidate_text();
        let before = lint_text(&result.chunk.text, &settings);
        let after = lint_text(candidate, &settings);
        let validation =
            validate_chunk(&result.chunk, candidate, &config.validator, &before, &after);
        validations.insert(chunk_id.clone(), validation);
    }

    let mut assembly_tracker = AcronymTracker::new();
    let output = assemble(original, &results, &validations, policy, &mut assembly_tracker);
    log.record_chunks(&output.resolutions, output.rewrites_used());

    Ok(output.ir)
}

/// Detector findings over free-standing text (chunk or candidate).
fn lint_text(text: &str, settings: &crate::rules::LintSettings) -> Vec<Finding> {
    let doc = DocumentIr {
        title: String::new(),
        blocks: vec![Block::new("chunk", BlockKind::Paragraph, text)],
        metadata: BTreeMap::new(),
    };
    RegexDetector.lint(&doc, settings)
}

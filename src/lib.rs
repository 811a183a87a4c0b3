//! Prose Patcher: deterministic style editing for technical documents.
//!
//! A document editing engine built on anchored span replacement with an
//! async chunk-rewrite pipeline for model-assisted editing.
//!
//! # Architecture
//!
//! All surgical edits compile down to a single primitive: [`EditOp`], an
//! anchored, verified span replacement inside one block of the document IR.
//! Intelligence lives in proposal (rule packs, rewrite sources), not in
//! application.
//!
//! Two paths share the IR:
//!
//! - **Surgical**: detect → propose → apply → verify. Deterministic,
//!   conflict-resolved, idempotent; a failed verification surfaces the
//!   original document.
//! - **Holistic**: chunk → rewrite (bounded concurrency) → validate →
//!   assemble. Per-chunk failures keep the original text and never abort
//!   the batch.
//!
//! # Safety
//!
//! - Every op verifies its recorded before-text before applying
//! - Snapshot tokens invalidate anchors against mutated blocks
//! - Protected terms, numbers, citations, and normative keywords are
//!   checked after every apply
//! - Empty op lists and re-runs are no-ops
//!
//! # Example
//!
//! ```no_run
//! use prose_patcher::adapter::{DocumentAdapter, TextAdapter};
//! use prose_patcher::pipeline::{self, Mode, PipelineConfig};
//! use prose_patcher::rules;
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let ir = TextAdapter.parse(b"# Guide\n\nWe utilize edge caching here today.")?;
//! let config = PipelineConfig::new(Mode::Safe, rules::default_pack());
//! let run = pipeline::run(&ir, &config, None).await?;
//! println!("{}", run.changelog.render_text());
//! # Ok(())
//! # }
//! ```

pub mod acronyms;
pub mod adapter;
pub mod anchor;
pub mod apply;
pub mod assemble;
pub mod changelog;
pub mod chunk_validate;
pub mod chunker;
pub mod detect;
pub mod editop;
pub mod ir;
pub mod pipeline;
pub mod propose;
pub mod redline;
pub mod rewrite;
pub mod rules;
pub mod scan;
pub mod verify;

// Re-exports
pub use adapter::{DocumentAdapter, ParseError, TextAdapter};
pub use anchor::{Anchor, AnchorError};
pub use apply::{apply_ops, ApplyError, ApplyOutcome, ConflictReject};
pub use chunk_validate::{ChunkDecision, ChunkValidation, FlaggedPolicy};
pub use chunker::{Chunk, ChunkStrategy, Strategy};
pub use editop::{EditOp, EditOpError, EditSource, OpKind, RiskTier};
pub use ir::{Block, BlockId, BlockKind, DocumentIr, Finding, Severity, SnapshotToken};
pub use pipeline::{Mode, PipelineConfig, PipelineError, PipelineRun};
pub use rewrite::{
    RewriteCoordinator, RewriteRequest, RewriteResponse, RewriteSource, RewriteSourceError,
};
pub use rules::{RulePack, RulePackError};
pub use verify::{verify, VerificationFailure, VerificationReport};

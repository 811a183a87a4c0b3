//! Rewrite coordination for the holistic path.
//!
//! A [`RewriteSource`] produces candidate text for one chunk; the
//! coordinator fans chunks out under a concurrency bound with a per-request
//! timeout and an optional whole-run deadline. A chunk whose request fails
//! keeps its original text and the failure is recorded; one failure never
//! aborts the batch.

use crate::chunker::Chunk;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};

#[derive(Error, Debug, Clone)]
pub enum RewriteSourceError {
    #[error("rewrite backend error: {0}")]
    Backend(String),

    #[error("rewrite source unavailable: {0}")]
    Unavailable(String),

    #[error("rewrite response was empty")]
    EmptyResponse,
}

/// One rewrite request. Context and directives are prompt material only;
/// `text` is the only part the response replaces.
#[derive(Debug, Clone)]
pub struct RewriteRequest {
    pub chunk_id: String,
    pub text: String,
    pub context_before: String,
    pub context_after: String,
    pub section_title: Option<String>,
    pub protected_terms: Vec<String>,
    pub acronym_directives: String,
    /// Set on the guardrail re-attempt so the source can tighten style.
    pub retry: bool,
}

impl RewriteRequest {
    pub fn for_chunk(chunk: &Chunk, acronym_directives: String) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            text: chunk.text.clone(),
            context_before: chunk.context_before.clone(),
            context_after: chunk.context_after.clone(),
            section_title: chunk.section_title.clone(),
            protected_terms: chunk.protected_terms.clone(),
            acronym_directives,
            retry: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteResponse {
    pub text: String,
    pub confidence: f64,
    pub summary: String,
}

/// Something that can rewrite chunk text. Implementations wrap a model API,
/// a local service, or a scripted stand-in for tests.
#[async_trait]
pub trait RewriteSource: Send + Sync {
    async fn rewrite(&self, request: RewriteRequest) -> Result<RewriteResponse, RewriteSourceError>;
}

/// Returns every chunk unchanged. Stands in for a real backend in dry runs
/// and in tests that exercise the pipeline shape rather than rewrites.
#[derive(Debug, Default)]
pub struct PassthroughSource;

#[async_trait]
impl RewriteSource for PassthroughSource {
    async fn rewrite(&self, request: RewriteRequest) -> Result<RewriteResponse, RewriteSourceError> {
        Ok(RewriteResponse {
            text: request.text,
            confidence: 1.0,
            summary: "passthrough".to_string(),
        })
    }
}

/// Why a chunk kept (or got) its text.
#[derive(Debug, Clone, PartialEq)]
pub enum RewriteStatus {
    /// A candidate rewrite was produced.
    Rewritten { retried: bool },
    /// Chunk was below the rewrite threshold; source never called.
    SkippedShort,
    /// Request failed; original text kept.
    Failed { error: String },
    /// Per-request timeout elapsed; original text kept.
    TimedOut,
    /// Run deadline passed before this chunk was attempted, or while its
    /// request was in flight. In-flight requests are cut off at the
    /// deadline, never allowed to run out their full per-request timeout.
    DeadlineExceeded,
}

/// Coordinator output for one chunk.
#[derive(Debug, Clone)]
pub struct ChunkRewrite {
    pub chunk: Chunk,
    pub response: Option<RewriteResponse>,
    pub status: RewriteStatus,
}

impl ChunkRewrite {
    /// The text assembly should consider: the candidate when one exists,
    /// the original otherwise.
    pub fn candidate_text(&self) -> &str {
        match &self.response {
            Some(r) => &r.text,
            None => &self.chunk.text,
        }
    }
}

/// Returns true when candidate text passes the style guardrail.
pub type Guardrail = dyn Fn(&Chunk, &str) -> bool + Send + Sync;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub run_deadline: Option<Duration>,
    /// Allow one re-attempt when only the style guardrail fails.
    pub retry_on_guardrail: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            request_timeout: Duration::from_secs(60),
            run_deadline: None,
            retry_on_guardrail: true,
        }
    }
}

pub struct RewriteCoordinator {
    config: CoordinatorConfig,
    guardrail: Option<Arc<Guardrail>>,
}

impl RewriteCoordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        Self {
            config,
            guardrail: None,
        }
    }

    pub fn with_guardrail(mut self, guardrail: Arc<Guardrail>) -> Self {
        self.guardrail = Some(guardrail);
        self
    }

    /// Rewrite every rewritable chunk. `directives` supplies per-chunk
    /// acronym prompt text (missing entries mean no directives). Results
    /// are keyed by chunk id, so assembly order never depends on
    /// completion order.
    pub async fn run(
        &self,
        chunks: Vec<Chunk>,
        directives: BTreeMap<String, String>,
        source: Arc<dyn RewriteSource>,
    ) -> BTreeMap<String, ChunkRewrite> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let deadline = self.config.run_deadline.map(|d| Instant::now() + d);
        let mut join_set = JoinSet::new();
        let mut results = BTreeMap::new();

        for chunk in chunks {
            if !chunk.rewritable {
                debug!(chunk = %chunk.id, words = chunk.word_count, "below rewrite threshold");
                results.insert(
                    chunk.id.clone(),
                    ChunkRewrite {
                        chunk,
                        response: None,
                        status: RewriteStatus::SkippedShort,
                    },
                );
                continue;
            }

            let semaphore = Arc::clone(&semaphore);
            let source = Arc::clone(&source);
            let guardrail = self.guardrail.clone();
            let request_timeout = self.config.request_timeout;
            let retry_allowed = self.config.retry_on_guardrail;
            let acronym_directives =
                directives.get(&chunk.id).cloned().unwrap_or_default();

            join_set.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return ChunkRewrite {
                            chunk,
                            response: None,
                            status: RewriteStatus::DeadlineExceeded,
                        }
                    }
                };

                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        warn!(chunk = %chunk.id, "run deadline passed, keeping original");
                        return ChunkRewrite {
                            chunk,
                            response: None,
                            status: RewriteStatus::DeadlineExceeded,
                        };
                    }
                }

                let mut request = RewriteRequest::for_chunk(&chunk, acronym_directives);
                let first = attempt(&*source, request.clone(), request_timeout, deadline).await;

                let (response, status) = match first {
                    Attempt::Ok(response) => {
                        let passes = guardrail
                            .as_ref()
                            .map(|g| g(&chunk, &response.text))
                            .unwrap_or(true);
                        if passes || !retry_allowed {
                            (Some(response), RewriteStatus::Rewritten { retried: false })
                        } else {
                            debug!(chunk = %chunk.id, "guardrail failed, re-attempting once");
                            request.retry = true;
                            match attempt(&*source, request, request_timeout, deadline).await {
                                Attempt::Ok(second) => {
                                    (Some(second), RewriteStatus::Rewritten { retried: true })
                                }
                                // The first response stands; the validator
                                // will flag it downstream.
                                _ => (Some(response), RewriteStatus::Rewritten { retried: true }),
                            }
                        }
                    }
                    Attempt::Err(error) => {
                        warn!(chunk = %chunk.id, %error, "rewrite failed, keeping original");
                        (
                            None,
                            RewriteStatus::Failed {
                                error: error.to_string(),
                            },
                        )
                    }
                    Attempt::TimedOut => {
                        warn!(chunk = %chunk.id, "rewrite timed out, keeping original");
                        (None, RewriteStatus::TimedOut)
                    }
                    Attempt::DeadlineExceeded => {
                        warn!(chunk = %chunk.id, "run deadline cut off in-flight rewrite");
                        (None, RewriteStatus::DeadlineExceeded)
                    }
                };

                ChunkRewrite {
                    chunk,
                    response,
                    status,
                }
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    results.insert(result.chunk.id.clone(), result);
                }
                Err(error) => {
                    // A panicked task loses its chunk's rewrite; the chunk
                    // id is unknown here, assembly falls back to original
                    // text for any chunk missing from the results.
                    warn!(%error, "rewrite task failed to join");
                }
            }
        }

        results
    }
}

enum Attempt {
    Ok(RewriteResponse),
    Err(RewriteSourceError),
    TimedOut,
    DeadlineExceeded,
}

/// One request against the source, bounded by the per-request timeout and,
/// when a run deadline is set, cut off at the deadline if that comes first.
async fn attempt(
    source: &dyn RewriteSource,
    request: RewriteRequest,
    request_timeout: Duration,
    deadline: Option<Instant>,
) -> Attempt {
    let mut expiry = Instant::now() + request_timeout;
    if let Some(deadline) = deadline {
        expiry = expiry.min(deadline);
    }
    match timeout_at(expiry, source.rewrite(request)).await {
        Ok(Ok(response)) if response.text.trim().is_empty() => {
            Attempt::Err(RewriteSourceError::EmptyResponse)
        }
        Ok(Ok(response)) => Attempt::Ok(response),
        Ok(Err(error)) => Attempt::Err(error),
        Err(_) => match deadline {
            Some(deadline) if Instant::now() >= deadline => Attempt::DeadlineExceeded,
            _ => Attempt::TimedOut,
        },
    }
}

//! Indexing pipeline: batching, TTL translation, retry
//!
//! Translates committed entity/edge writes into index operations and
//! submits them through the gateway with at-most-one-outstanding-batch
//! discipline. Failures here never propagate back to the graph write that
//! produced them; the index is a derived, best-effort view.

use crate::error::{IndexError, IndexFailure, IndexResult};
use crate::gateway::IndexGateway;
use crate::op::{DocumentId, DocumentOutcome, EdgeContext, IndexOperation, ResolvedOperation};
use chrono::Utc;
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Instant;
use tangle_core::{ApplicationScope, Entity, GraphConfig};
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Outcome of one batch submission after retries.
///
/// `failed` and `timed_out` are reported, not raised: per-document failures
/// never abort the batch's successes, and an unreachable gateway is a
/// non-fatal warning the caller may act on.
#[derive(Debug, Default, Clone)]
pub struct IndexReport {
    /// Documents confirmed indexed (or deleted)
    pub indexed: Vec<DocumentId>,
    /// Documents rejected even after the retry budget
    pub failed: Vec<IndexFailure>,
    /// Documents whose batch never got a gateway response
    pub timed_out: Vec<DocumentId>,
}

impl IndexReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.timed_out.is_empty()
    }

    /// Escalate a dirty report into the corresponding error, for callers
    /// that treat indexing problems as failures rather than warnings
    pub fn into_result(self) -> IndexResult<Vec<DocumentId>> {
        if !self.failed.is_empty() {
            return Err(IndexError::PartialBatchFailure {
                failures: self.failed,
            });
        }
        if !self.timed_out.is_empty() {
            return Err(IndexError::GatewayTimeout {
                document_ids: self.timed_out,
            });
        }
        Ok(self.indexed)
    }
}

/// Size/time-bounded accumulation window with same-document dedup
struct Batcher {
    pending: Vec<IndexOperation>,
    opened_at: Option<Instant>,
}

impl Batcher {
    fn new() -> Self {
        Self {
            pending: Vec::new(),
            opened_at: None,
        }
    }

    /// Add an operation, deduplicating against the window: an identical
    /// (document, alias, data) submission is dropped, a changed one
    /// replaces the stale entry.
    fn add(&mut self, op: IndexOperation) {
        if let Some(existing) = self.pending.iter_mut().find(|p| {
            p.document_id == op.document_id && p.write_alias == op.write_alias
        }) {
            if *existing != op {
                *existing = op;
            }
            return;
        }
        if self.pending.is_empty() {
            self.opened_at = Some(Instant::now());
        }
        self.pending.push(op);
    }

    fn is_full(&self, batch_size: usize) -> bool {
        self.pending.len() >= batch_size
    }

    fn is_due(&self, timeout: std::time::Duration) -> bool {
        self.opened_at
            .map(|opened| opened.elapsed() >= timeout)
            .unwrap_or(false)
    }

    fn take(&mut self) -> Vec<IndexOperation> {
        self.opened_at = None;
        std::mem::take(&mut self.pending)
    }
}

/// Converts entity/edge state into index operations and drives bulk
/// submission through the gateway
pub struct IndexingPipeline {
    gateway: Arc<dyn IndexGateway>,
    config: GraphConfig,
    batcher: Mutex<Batcher>,
    /// Held across a full submit-and-retry cycle: at most one batch is
    /// outstanding at the gateway at any time
    submission: Mutex<()>,
}

impl IndexingPipeline {
    pub fn new(gateway: Arc<dyn IndexGateway>, config: GraphConfig) -> Self {
        Self {
            gateway,
            config,
            batcher: Mutex::new(Batcher::new()),
            submission: Mutex::new(()),
        }
    }

    /// Build one operation per edge context the entity participates in.
    ///
    /// The document id is a function of scope + entity + context, so an
    /// entity reachable through several edges gets one document per context.
    pub fn build_operations(
        &self,
        scope: &ApplicationScope,
        entity: &Entity,
        contexts: &[EdgeContext],
        write_alias: &str,
    ) -> Vec<IndexOperation> {
        let mut data: BTreeMap<String, serde_json::Value> = entity
            .properties
            .iter()
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect();
        data.insert("entity_id".to_string(), json!(entity.id.uuid.to_string()));
        data.insert("entity_kind".to_string(), json!(entity.id.kind));
        data.insert("entity_version".to_string(), json!(entity.version));

        contexts
            .iter()
            .map(|context| {
                let document_id = DocumentId::new(scope, &entity.id, context);
                let mut op = IndexOperation::upsert(write_alias, document_id, data.clone());
                if let Some(expiration) = entity.expiration {
                    op = op.with_expiration(expiration);
                }
                op
            })
            .collect()
    }

    /// Index one entity write: build its operations and enqueue them
    /// together, so they land in a single batch when possible.
    ///
    /// Returns a report if the window filled and was submitted.
    pub async fn index_entity(
        &self,
        scope: &ApplicationScope,
        entity: &Entity,
        contexts: &[EdgeContext],
        write_alias: &str,
    ) -> IndexResult<Option<IndexReport>> {
        let ops = self.build_operations(scope, entity, contexts, write_alias);
        self.enqueue(ops).await
    }

    /// Add operations to the current window; submits when the window
    /// reaches `batch_size`
    pub async fn enqueue(&self, ops: Vec<IndexOperation>) -> IndexResult<Option<IndexReport>> {
        let batch = {
            let mut batcher = self.batcher.lock().await;
            for op in ops {
                batcher.add(op);
            }
            if batcher.is_full(self.config.batch_size) {
                Some(batcher.take())
            } else {
                None
            }
        };

        match batch {
            Some(batch) => Ok(Some(self.submit(batch).await?)),
            None => Ok(None),
        }
    }

    /// Submit the current window regardless of size
    pub async fn flush(&self) -> IndexResult<IndexReport> {
        let batch = self.batcher.lock().await.take();
        if batch.is_empty() {
            return Ok(IndexReport::default());
        }
        self.submit(batch).await
    }

    /// Submit the current window only if it has been open longer than
    /// `batch_timeout`; callers drive this from a timer
    pub async fn flush_if_due(&self) -> IndexResult<Option<IndexReport>> {
        let batch = {
            let mut batcher = self.batcher.lock().await;
            if batcher.is_due(self.config.batch_timeout()) {
                Some(batcher.take())
            } else {
                None
            }
        };
        match batch {
            Some(batch) if !batch.is_empty() => Ok(Some(self.submit(batch).await?)),
            _ => Ok(None),
        }
    }

    /// One bulk submission with bounded retry.
    ///
    /// Per-document rejections retry only the failed subset; a timeout or
    /// gateway error fails the whole attempt and retries with exponential
    /// backoff. Exhausted documents land in the report, never in `Err`.
    async fn submit(&self, ops: Vec<IndexOperation>) -> IndexResult<IndexReport> {
        let _outstanding = self.submission.lock().await;

        // Relative TTLs are computed at submission time, not at build time
        let now = Utc::now();
        let mut outstanding: Vec<ResolvedOperation> =
            ops.iter().map(|op| op.resolve(now)).collect();

        let mut report = IndexReport::default();
        let mut attempt: u32 = 0;

        loop {
            let response = tokio::time::timeout(
                self.config.batch_timeout(),
                self.gateway.submit_batch(&outstanding),
            )
            .await;

            let results = match response {
                Ok(Ok(results)) => results,
                Ok(Err(e)) => {
                    warn!(error = %e, attempt, "gateway rejected batch");
                    if attempt >= self.config.max_retries {
                        report
                            .timed_out
                            .extend(outstanding.iter().map(|op| op.document_id.clone()));
                        warn!(
                            documents = report.timed_out.len(),
                            "gateway retries exhausted"
                        );
                        break;
                    }
                    tokio::time::sleep(self.config.backoff_for_attempt(attempt)).await;
                    attempt += 1;
                    continue;
                }
                Err(_) => {
                    warn!(attempt, "gateway submission timed out");
                    if attempt >= self.config.max_retries {
                        report
                            .timed_out
                            .extend(outstanding.iter().map(|op| op.document_id.clone()));
                        warn!(
                            documents = report.timed_out.len(),
                            "gateway retries exhausted"
                        );
                        break;
                    }
                    tokio::time::sleep(self.config.backoff_for_attempt(attempt)).await;
                    attempt += 1;
                    continue;
                }
            };

            let mut rejected_reasons: HashMap<DocumentId, String> = HashMap::new();
            for result in results {
                if let DocumentOutcome::Rejected(reason) = result.outcome {
                    rejected_reasons.insert(result.document_id, reason);
                }
            }

            let (rejected, accepted): (Vec<_>, Vec<_>) = outstanding
                .into_iter()
                .partition(|op| rejected_reasons.contains_key(&op.document_id));

            report
                .indexed
                .extend(accepted.into_iter().map(|op| op.document_id));

            if rejected.is_empty() {
                break;
            }

            if attempt >= self.config.max_retries {
                for op in &rejected {
                    let reason = rejected_reasons
                        .get(&op.document_id)
                        .cloned()
                        .unwrap_or_else(|| "unknown".to_string());
                    error!(document = %op.document_id, reason = %reason, "indexing failed");
                    report.failed.push(IndexFailure {
                        document_id: op.document_id.clone(),
                        reason,
                    });
                }
                break;
            }

            // Retry only the failed subset
            debug!(
                retrying = rejected.len(),
                attempt, "retrying rejected documents"
            );
            outstanding = rejected;
            tokio::time::sleep(self.config.backoff_for_attempt(attempt)).await;
            attempt += 1;
        }

        Ok(report)
    }
}

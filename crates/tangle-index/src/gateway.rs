//! Search-index gateway trait and the in-memory test double

use crate::error::{IndexError, IndexResult};
use crate::op::{DocumentId, DocumentResult, OpKind, ResolvedOperation};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;
use std::time::Duration;

/// Narrow boundary to the external search engine.
///
/// The core depends on nothing but this: submit a bulk batch, get one
/// result per document. Wire format and cluster wiring live behind it.
#[async_trait]
pub trait IndexGateway: Send + Sync {
    async fn submit_batch(&self, batch: &[ResolvedOperation]) -> IndexResult<Vec<DocumentResult>>;
}

/// Stored form of one accepted document in the in-memory gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub data: BTreeMap<String, serde_json::Value>,
    pub relative_ttl: Option<Duration>,
}

/// In-memory gateway double with per-document rejection and latency
/// injection, for pipeline tests
pub struct MemoryGateway {
    documents: RwLock<HashMap<(String, DocumentId), StoredDocument>>,
    rejections: RwLock<HashMap<DocumentId, u32>>,
    delay: RwLock<Option<Duration>>,
    batches: AtomicUsize,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            rejections: RwLock::new(HashMap::new()),
            delay: RwLock::new(None),
            batches: AtomicUsize::new(0),
        }
    }

    /// Reject the document on its next `times` submissions
    /// (`u32::MAX` for every submission)
    pub fn reject(&self, document_id: DocumentId, times: u32) {
        if let Ok(mut rejections) = self.rejections.write() {
            rejections.insert(document_id, times);
        }
    }

    /// Delay every subsequent submission, to trip the pipeline timeout
    pub fn set_delay(&self, delay: Option<Duration>) {
        if let Ok(mut slot) = self.delay.write() {
            *slot = delay;
        }
    }

    /// Number of submit_batch calls observed
    pub fn batches_submitted(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    pub fn document(&self, write_alias: &str, document_id: &DocumentId) -> Option<StoredDocument> {
        self.documents
            .read()
            .ok()?
            .get(&(write_alias.to_string(), document_id.clone()))
            .cloned()
    }

    pub fn document_count(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }

    fn should_reject(&self, document_id: &DocumentId) -> IndexResult<bool> {
        let mut rejections = self
            .rejections
            .write()
            .map_err(|e| IndexError::Internal(format!("Lock error: {}", e)))?;
        Ok(match rejections.get_mut(document_id) {
            Some(0) => {
                rejections.remove(document_id);
                false
            }
            Some(remaining) => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                true
            }
            None => false,
        })
    }
}

impl Default for MemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IndexGateway for MemoryGateway {
    async fn submit_batch(&self, batch: &[ResolvedOperation]) -> IndexResult<Vec<DocumentResult>> {
        self.batches.fetch_add(1, Ordering::SeqCst);

        let delay = self.delay.read().ok().and_then(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut results = Vec::with_capacity(batch.len());
        for op in batch {
            if self.should_reject(&op.document_id)? {
                results.push(DocumentResult::rejected(
                    op.document_id.clone(),
                    "rejected by gateway",
                ));
                continue;
            }

            let key = (op.write_alias.clone(), op.document_id.clone());
            let mut documents = self
                .documents
                .write()
                .map_err(|e| IndexError::Internal(format!("Lock error: {}", e)))?;
            match op.kind {
                OpKind::Upsert => {
                    documents.insert(
                        key,
                        StoredDocument {
                            data: op.data.clone(),
                            relative_ttl: op.relative_ttl,
                        },
                    );
                }
                OpKind::Delete => {
                    documents.remove(&key);
                }
            }
            results.push(DocumentResult::accepted(op.document_id.clone()));
        }

        Ok(results)
    }
}

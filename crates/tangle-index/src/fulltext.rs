//! Tantivy-backed index gateway

use async_trait::async_trait;
use std::path::Path;
use std::sync::RwLock;
use tantivy::{
    collector::Count,
    directory::MmapDirectory,
    query::TermQuery,
    schema::{Field, IndexRecordOption, Schema, STORED, STRING, TEXT},
    Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term,
};

use crate::error::{IndexError, IndexResult};
use crate::gateway::IndexGateway;
use crate::op::{DocumentId, DocumentResult, OpKind, ResolvedOperation};

/// Bulk index gateway backed by a local Tantivy index.
///
/// Each submission is one delete-then-add pass per document with a single
/// commit at the end, so a batch becomes visible atomically on reload.
/// Tantivy has no native TTL; the relative TTL is persisted as an absolute
/// `expires_at` field for an external reaper to act on.
pub struct TantivyGateway {
    reader: IndexReader,
    writer: RwLock<IndexWriter>,
    document_id_field: Field,
    write_alias_field: Field,
    body_field: Field,
    data_field: Field,
    expires_at_field: Field,
}

struct GatewayFields {
    schema: Schema,
    document_id: Field,
    write_alias: Field,
    body: Field,
    data: Field,
    expires_at: Field,
}

fn build_schema() -> GatewayFields {
    let mut schema_builder = Schema::builder();
    let document_id = schema_builder.add_text_field("document_id", STRING | STORED);
    let write_alias = schema_builder.add_text_field("write_alias", STRING | STORED);
    let body = schema_builder.add_text_field("body", TEXT);
    let data = schema_builder.add_text_field("data", STORED);
    let expires_at = schema_builder.add_text_field("expires_at", STRING | STORED);
    GatewayFields {
        schema: schema_builder.build(),
        document_id,
        write_alias,
        body,
        data,
        expires_at,
    }
}

impl TantivyGateway {
    pub fn new(index_path: &Path) -> IndexResult<Self> {
        let fields = build_schema();
        let dir =
            MmapDirectory::open(index_path).map_err(|e| IndexError::Index(e.to_string()))?;
        let index = Index::open_or_create(dir, fields.schema.clone())
            .map_err(|e| IndexError::Index(e.to_string()))?;
        Self::with_index(index, fields)
    }

    /// Create an in-RAM index for testing
    pub fn in_memory() -> IndexResult<Self> {
        let fields = build_schema();
        let index = Index::create_in_ram(fields.schema.clone());
        Self::with_index(index, fields)
    }

    fn with_index(index: Index, fields: GatewayFields) -> IndexResult<Self> {
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e: tantivy::TantivyError| IndexError::Index(e.to_string()))?;

        let writer = index
            .writer(50_000_000) // 50MB buffer
            .map_err(|e| IndexError::Index(e.to_string()))?;

        Ok(Self {
            reader,
            writer: RwLock::new(writer),
            document_id_field: fields.document_id,
            write_alias_field: fields.write_alias,
            body_field: fields.body,
            data_field: fields.data,
            expires_at_field: fields.expires_at,
        })
    }

    fn create_document(
        &self,
        op: &ResolvedOperation,
        now: chrono::DateTime<chrono::Utc>,
    ) -> IndexResult<TantivyDocument> {
        let mut doc = TantivyDocument::new();
        doc.add_text(self.document_id_field, op.document_id.as_str());
        doc.add_text(self.write_alias_field, &op.write_alias);

        // All property values flattened into one searchable body
        let body: String = op
            .data
            .values()
            .map(|value| match value.as_str() {
                Some(s) => s.to_string(),
                None => value.to_string(),
            })
            .collect::<Vec<_>>()
            .join(" ");
        doc.add_text(self.body_field, body);

        let data_json = serde_json::to_string(&op.data)?;
        doc.add_text(self.data_field, data_json);

        if let Some(ttl) = op.relative_ttl {
            let expires_at = now
                + chrono::Duration::from_std(ttl)
                    .map_err(|e| IndexError::Index(e.to_string()))?;
            doc.add_text(self.expires_at_field, expires_at.to_rfc3339());
        }

        Ok(doc)
    }

    /// Whether a document is currently visible in the index
    pub fn contains(&self, document_id: &DocumentId) -> IndexResult<bool> {
        let searcher = self.reader.searcher();
        let term = Term::from_field_text(self.document_id_field, document_id.as_str());
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let count = searcher
            .search(&query, &Count)
            .map_err(|e| IndexError::Index(e.to_string()))?;
        Ok(count > 0)
    }

    /// Number of visible documents
    pub fn document_count(&self) -> u64 {
        self.reader.searcher().num_docs()
    }
}

#[async_trait]
impl IndexGateway for TantivyGateway {
    async fn submit_batch(&self, batch: &[ResolvedOperation]) -> IndexResult<Vec<DocumentResult>> {
        let now = chrono::Utc::now();
        let mut results = Vec::with_capacity(batch.len());

        {
            let writer = self
                .writer
                .write()
                .map_err(|e| IndexError::Internal(format!("Lock error: {}", e)))?;

            for op in batch {
                let term =
                    Term::from_field_text(self.document_id_field, op.document_id.as_str());
                writer.delete_term(term);

                match op.kind {
                    OpKind::Delete => {
                        results.push(DocumentResult::accepted(op.document_id.clone()));
                    }
                    OpKind::Upsert => match self.create_document(op, now) {
                        Ok(doc) => match writer.add_document(doc) {
                            Ok(_) => {
                                results.push(DocumentResult::accepted(op.document_id.clone()))
                            }
                            Err(e) => results.push(DocumentResult::rejected(
                                op.document_id.clone(),
                                e.to_string(),
                            )),
                        },
                        Err(e) => results.push(DocumentResult::rejected(
                            op.document_id.clone(),
                            e.to_string(),
                        )),
                    },
                }
            }
        }

        // One commit per batch; an error here fails the whole submission
        // and the pipeline retries it
        self.writer
            .write()
            .map_err(|e| IndexError::Internal(format!("Lock error: {}", e)))?
            .commit()
            .map_err(|e| IndexError::Index(e.to_string()))?;

        self.reader
            .reload()
            .map_err(|e| IndexError::Index(e.to_string()))?;

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::{EdgeContext, IndexOperation};
    use chrono::Utc;
    use std::collections::BTreeMap;
    use tangle_core::{ApplicationScope, Id};

    fn resolved_upsert(n: u64) -> ResolvedOperation {
        let scope = ApplicationScope::new(Id::new("application"));
        let context = EdgeContext::new(Id::new("group"), "member_of");
        let mut data = BTreeMap::new();
        data.insert("n".to_string(), serde_json::json!(n));
        data.insert("name".to_string(), serde_json::json!("ada lovelace"));
        IndexOperation::upsert(
            "idx_write",
            DocumentId::new(&scope, &Id::new("user"), &context),
            data,
        )
        .resolve(Utc::now())
    }

    #[tokio::test]
    async fn test_bulk_upsert_and_delete() {
        let gateway = TantivyGateway::in_memory().unwrap();

        let first = resolved_upsert(1);
        let second = resolved_upsert(2);
        let results = gateway
            .submit_batch(&[first.clone(), second.clone()])
            .await
            .unwrap();
        assert!(results.iter().all(DocumentResult::is_accepted));
        assert_eq!(gateway.document_count(), 2);
        assert!(gateway.contains(&first.document_id).unwrap());

        let delete = ResolvedOperation {
            kind: OpKind::Delete,
            write_alias: first.write_alias.clone(),
            document_id: first.document_id.clone(),
            data: BTreeMap::new(),
            relative_ttl: None,
        };
        gateway.submit_batch(&[delete]).await.unwrap();
        assert!(!gateway.contains(&first.document_id).unwrap());
        assert_eq!(gateway.document_count(), 1);
    }

    #[tokio::test]
    async fn test_resubmission_replaces_document() {
        let gateway = TantivyGateway::in_memory().unwrap();
        let op = resolved_upsert(1);

        gateway.submit_batch(&[op.clone()]).await.unwrap();
        gateway.submit_batch(&[op.clone()]).await.unwrap();

        // Delete-then-add keeps one document per id
        assert_eq!(gateway.document_count(), 1);
    }

    #[tokio::test]
    async fn test_on_disk_index() {
        let dir = tempfile::tempdir().unwrap();
        let gateway = TantivyGateway::new(dir.path()).unwrap();

        let op = resolved_upsert(1);
        gateway.submit_batch(&[op.clone()]).await.unwrap();
        assert!(gateway.contains(&op.document_id).unwrap());
    }
}

//! Tangle Index - Indexing pipeline for the entity graph
//!
//! Converts entity and edge writes into ephemeral index operations,
//! batches them, and pushes them through a narrow gateway to the external
//! search engine. The index is eventually consistent and best-effort:
//! indexing failures are isolated per document and never fail the graph
//! write that produced them.

pub mod error;
pub mod gateway;
pub mod op;
pub mod pipeline;

#[cfg(feature = "tantivy")]
pub mod fulltext;

pub use error::{IndexError, IndexFailure, IndexResult};
pub use gateway::{IndexGateway, MemoryGateway};
pub use op::{
    DocumentId, DocumentOutcome, DocumentResult, EdgeContext, IndexOperation, OpKind,
    ResolvedOperation,
};
pub use pipeline::{IndexReport, IndexingPipeline};

#[cfg(feature = "tantivy")]
pub use fulltext::TantivyGateway;

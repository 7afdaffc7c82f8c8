//! Tangle Store - Edge and entity stores for the versioned entity graph
//!
//! The edge store is a durable log of edge mutations keyed by
//! (source, type, target) with last-writer-wins merge on timestamp; the
//! entity store is append-only versioned. Deletion is mark-based, never
//! physical.

pub mod error;
pub mod memory;
pub mod sweeper;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use memory::{MemoryEdgeStore, MemoryEntityStore};
pub use sweeper::{SweepStats, Sweeper, SweeperHandle};
pub use traits::{EdgeCursor, EdgePage, EdgeStore, EntityStore, WriteOutcome};

//! Background sweeper: edge expiry and the node-delete cascade
//!
//! Entity deletion only queues the affected node; rewriting every edge that
//! references it happens here, off the write path, because edge fan-out can
//! be large.

use crate::error::StoreResult;
use crate::traits::{EdgeStore, EntityStore};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Periodic maintenance task over the edge and entity stores
pub struct Sweeper {
    edge_store: Arc<dyn EdgeStore>,
    entity_store: Arc<dyn EntityStore>,
    interval: std::time::Duration,
}

/// Handle used to stop a running sweeper
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal shutdown and wait for the final sweep to finish
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

impl Sweeper {
    pub fn new(
        edge_store: Arc<dyn EdgeStore>,
        entity_store: Arc<dyn EntityStore>,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            edge_store,
            entity_store,
            interval,
        }
    }

    /// Run one sweep: drain the node-delete queue, then expire edges.
    ///
    /// Both halves are idempotent, so a crash between them loses nothing;
    /// the next sweep redoes the remainder.
    pub async fn sweep_once(&self) -> StoreResult<SweepStats> {
        let mut stats = SweepStats::default();

        for (scope, node) in self.entity_store.drain_deleted_nodes().await? {
            stats.edges_flagged += self.edge_store.mark_node_edges(&scope, &node).await?;
            stats.nodes_cascaded += 1;
        }

        stats.edges_expired = self.edge_store.expire_edges(Utc::now()).await?;

        debug!(
            nodes = stats.nodes_cascaded,
            flagged = stats.edges_flagged,
            expired = stats.edges_expired,
            "sweep complete"
        );
        Ok(stats)
    }

    /// Spawn the sweeper loop on the current runtime
    pub fn start(self) -> SweeperHandle {
        let (shutdown, mut rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(interval_ms = self.interval.as_millis() as u64, "sweeper started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.sweep_once().await {
                            warn!(error = %e, "sweep failed");
                        }
                    }
                    _ = rx.changed() => {
                        // One final sweep so queued cascades are not lost
                        if let Err(e) = self.sweep_once().await {
                            warn!(error = %e, "final sweep failed");
                        }
                        info!("sweeper stopped");
                        break;
                    }
                }
            }
        });
        SweeperHandle { shutdown, task }
    }
}

/// Counts from one sweep pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub nodes_cascaded: usize,
    pub edges_flagged: usize,
    pub edges_expired: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryEdgeStore, MemoryEntityStore};
    use crate::traits::WriteOutcome;
    use tangle_core::{ApplicationScope, Edge, Entity, Id, MarkedEdge};

    #[tokio::test]
    async fn test_sweep_cascades_node_deletes() {
        let edges = Arc::new(MemoryEdgeStore::new());
        let entities = Arc::new(MemoryEntityStore::new());
        let scope = ApplicationScope::new(Id::new("application"));

        let user = Id::new("user");
        let post = Id::new("post");
        entities
            .put_entity(&scope, Entity::new(user.clone()))
            .await
            .unwrap();
        let outcome = edges
            .write_edge(
                &scope,
                MarkedEdge::new(Edge::new(user.clone(), "wrote", post.clone(), 10)),
            )
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Applied);

        entities.delete_entity(&scope, &user).await.unwrap();

        // Flags are not cascaded synchronously with the delete
        let before = edges.scan_edges(&scope, &user).await.unwrap();
        assert!(!before[0].is_source_node_deleted);

        let sweeper = Sweeper::new(
            edges.clone(),
            entities.clone(),
            std::time::Duration::from_secs(60),
        );
        let stats = sweeper.sweep_once().await.unwrap();
        assert_eq!(stats.nodes_cascaded, 1);
        assert_eq!(stats.edges_flagged, 1);

        let after = edges.scan_edges(&scope, &user).await.unwrap();
        assert!(after[0].is_source_node_deleted);
        assert!(!after[0].is_target_node_deleted);
    }

    #[tokio::test]
    async fn test_sweep_expires_edges() {
        let edges = Arc::new(MemoryEdgeStore::new());
        let entities = Arc::new(MemoryEntityStore::new());
        let scope = ApplicationScope::new(Id::new("application"));
        let (a, b) = (Id::new("user"), Id::new("post"));

        edges
            .write_edge(
                &scope,
                MarkedEdge::new(Edge::new(a.clone(), "likes", b.clone(), 1))
                    .with_expiry(std::time::Duration::ZERO),
            )
            .await
            .unwrap();

        let sweeper = Sweeper::new(
            edges.clone(),
            entities,
            std::time::Duration::from_secs(60),
        );
        let stats = sweeper.sweep_once().await.unwrap();
        assert_eq!(stats.edges_expired, 1);

        // Idempotent on re-run
        let again = sweeper.sweep_once().await.unwrap();
        assert_eq!(again.edges_expired, 0);
    }

    #[tokio::test]
    async fn test_sweeper_start_stop() {
        let edges = Arc::new(MemoryEdgeStore::new());
        let entities = Arc::new(MemoryEntityStore::new());
        let sweeper = Sweeper::new(edges, entities, std::time::Duration::from_millis(10));
        let handle = sweeper.start();
        tokio::time::sleep(std::time::Duration::from_millis(30)).await;
        handle.stop().await;
    }
}

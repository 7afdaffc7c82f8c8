//! Tangle Core - Graph model for the versioned entity graph
//!
//! This crate provides the identity and edge model, the versioned entity
//! representation, and the shared configuration and error types.

pub mod config;
pub mod edge;
pub mod entity;
pub mod id;
pub mod limits;

pub use config::GraphConfig;
pub use edge::{Direction, Edge, EdgeKey, MarkedEdge};
pub use entity::Entity;
pub use id::{ApplicationScope, Id};

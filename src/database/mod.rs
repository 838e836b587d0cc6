// Database module
// Vector collections (requirements, descriptions) and the scratch event log

pub mod lancedb;
#[cfg(test)]
pub(crate) mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::lancedb::VectorStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Collection '{0}' does not exist")]
    NotFound(String),

    #[error("Collection '{0}' is empty")]
    EmptyCollection(String),

    #[error("Vector backend error: {0}")]
    Backend(String),
}

/// A text fragment and its embedding, as stored in a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A search hit. `score` is cosine similarity, higher is closer.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    pub id: String,
    pub text: String,
    pub score: f32,
}

/// Tuning for approximate nearest-neighbour search
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchParams {
    /// Candidate list size (HNSW `ef`); larger trades latency for recall
    pub search_breadth: usize,
    pub exact: bool,
}

/// One line of the per-run event log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLogRecord {
    pub uuid: String,
    pub request_id: String,
    pub event_text: String,
    /// Unix seconds
    pub timestamp: i64,
}

/// Nearest-neighbour service holding named collections
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError>;

    /// Every record in the collection, vectors included
    async fn scroll(&self, collection: &str) -> Result<Vec<VectorRecord>, StoreError>;

    /// Closest records to `query`, best first
    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        params: SearchParams,
    ) -> Result<Vec<ScoredRecord>, StoreError>;

    /// Drop the event collection if present and create it empty
    async fn recreate_event_collection(&self, collection: &str) -> Result<(), StoreError>;

    async fn append_event(
        &self,
        collection: &str,
        record: &EventLogRecord,
    ) -> Result<(), StoreError>;
}

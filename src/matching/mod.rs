//! Best-match retrieval between requirement and description collections.
//!
//! [`VectorMatchStore`] wraps a [`VectorIndex`] and adds the semantics the
//! report run relies on: missing and empty collections are distinct errors,
//! an empty search is `None` rather than an error, and event-log writes never
//! fail the caller.


use std::sync::Arc;
use tracing::{debug, warn};

use crate::database::{EventLogRecord, SearchParams, StoreError, VectorIndex, VectorRecord};

/// Top-scoring description for one requirement
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub description_id: String,
    pub description_text: String,
    /// Cosine similarity, higher is closer
    pub similarity_score: f32,
}

pub struct VectorMatchStore {
    index: Arc<dyn VectorIndex>,
}

impl VectorMatchStore {
    #[inline]
    pub fn new(index: Arc<dyn VectorIndex>) -> Self {
        Self { index }
    }

    #[inline]
    pub async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        self.index.collection_exists(collection).await
    }

    /// Fail with `NotFound` unless `collection` exists
    #[inline]
    pub async fn ensure_exists(&self, collection: &str) -> Result<(), StoreError> {
        if self.collection_exists(collection).await? {
            Ok(())
        } else {
            Err(StoreError::NotFound(collection.to_string()))
        }
    }

    /// Every record of `collection`, in storage order.
    ///
    /// `NotFound` when the collection is missing, `EmptyCollection` when it
    /// holds no records.
    #[inline]
    pub async fn list_all(&self, collection: &str) -> Result<Vec<VectorRecord>, StoreError> {
        self.ensure_exists(collection).await?;

        let records = self.index.scroll(collection).await?;
        if records.is_empty() {
            return Err(StoreError::EmptyCollection(collection.to_string()));
        }

        debug!("Loaded {} records from {}", records.len(), collection);
        Ok(records)
    }

    /// Closest record in `candidate_collection`, or `None` if the search
    /// produced no hits
    #[inline]
    pub async fn find_best_match(
        &self,
        query_vector: &[f32],
        candidate_collection: &str,
        params: SearchParams,
    ) -> Result<Option<MatchResult>, StoreError> {
        let hits = self
            .index
            .search(candidate_collection, query_vector, 1, params)
            .await?;

        // Scores are similarities, so the best hit has the highest score
        let best = hits.into_iter().max_by(|a, b| a.score.total_cmp(&b.score));

        Ok(best.map(|hit| MatchResult {
            description_id: hit.id,
            description_text: hit.text,
            similarity_score: hit.score,
        }))
    }

    /// Append to the event log. Failures are logged and reported as `false`.
    #[inline]
    pub async fn log_event(&self, collection: &str, record: &EventLogRecord) -> bool {
        match self.index.append_event(collection, record).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "Failed to log event '{}' for {}: {}",
                    record.event_text, record.request_id, e
                );
                false
            }
        }
    }

    /// Drop and recreate the event log so each run starts empty.
    /// Failures are logged and reported as `false`.
    #[inline]
    pub async fn reset_events(&self, collection: &str) -> bool {
        match self.index.recreate_event_collection(collection).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to reset event collection {}: {}", collection, e);
                false
            }
        }
    }
}

// In-process VectorIndex used by unit tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{EventLogRecord, ScoredRecord, SearchParams, StoreError, VectorIndex, VectorRecord};

#[derive(Default)]
pub(crate) struct MemoryIndex {
    collections: Mutex<HashMap<String, Vec<VectorRecord>>>,
    events: Mutex<HashMap<String, Vec<EventLogRecord>>>,
    /// Searches allowed before every search fails; `usize::MAX` means never
    fail_search_after: AtomicUsize,
    searches: AtomicUsize,
    fail_event_writes: AtomicBool,
    pub(crate) last_params: Mutex<Option<SearchParams>>,
}

impl MemoryIndex {
    pub(crate) fn new() -> Self {
        Self {
            fail_search_after: AtomicUsize::new(usize::MAX),
            ..Self::default()
        }
    }

    pub(crate) fn with_collection(self, name: &str, records: Vec<VectorRecord>) -> Self {
        self.collections
            .lock()
            .expect("collections lock")
            .insert(name.to_string(), records);
        self
    }

    pub(crate) fn failing_search_after(self, successful: usize) -> Self {
        self.fail_search_after.store(successful, Ordering::SeqCst);
        self
    }

    pub(crate) fn failing_event_writes(self) -> Self {
        self.fail_event_writes.store(true, Ordering::SeqCst);
        self
    }

    pub(crate) fn events(&self, collection: &str) -> Vec<EventLogRecord> {
        self.events
            .lock()
            .expect("events lock")
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn search_count(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self
            .collections
            .lock()
            .expect("collections lock")
            .contains_key(collection))
    }

    async fn scroll(&self, collection: &str) -> Result<Vec<VectorRecord>, StoreError> {
        self.collections
            .lock()
            .expect("collections lock")
            .get(collection)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(collection.to_string()))
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        params: SearchParams,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        let done = self.searches.fetch_add(1, Ordering::SeqCst);
        *self.last_params.lock().expect("params lock") = Some(params);
        if done >= self.fail_search_after.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("search backend unavailable".to_string()));
        }

        let records = self.scroll(collection).await?;
        let mut hits: Vec<ScoredRecord> = records
            .into_iter()
            .map(|record| ScoredRecord {
                score: cosine(query, &record.vector),
                id: record.id,
                text: record.text,
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn recreate_event_collection(&self, collection: &str) -> Result<(), StoreError> {
        if self.fail_event_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("event log unavailable".to_string()));
        }
        self.events
            .lock()
            .expect("events lock")
            .insert(collection.to_string(), Vec::new());
        Ok(())
    }

    async fn append_event(
        &self,
        collection: &str,
        record: &EventLogRecord,
    ) -> Result<(), StoreError> {
        if self.fail_event_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("event log unavailable".to_string()));
        }
        self.events
            .lock()
            .expect("events lock")
            .get_mut(collection)
            .ok_or_else(|| StoreError::NotFound(collection.to_string()))?
            .push(record.clone());
        Ok(())
    }
}

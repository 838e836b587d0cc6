
use super::{
    DISTANCE_COLUMN, ID_COLUMN, TEXT_COLUMN, VECTOR_COLUMN, collection_schema, event_log_schema,
};
use crate::config::Config;
use crate::database::{
    EventLogRecord, ScoredRecord, SearchParams, StoreError, VectorIndex, VectorRecord,
};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType, Table,
    index::{Index, vector::IvfHnswSqIndexBuilder},
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Collections smaller than this are searched by flat scan
pub const MIN_INDEXED_ROWS: usize = 256;

const ROWS_PER_PARTITION: usize = 4096;

/// Vector collections backed by LanceDB
pub struct VectorStore {
    connection: Connection,
}

impl VectorStore {
    /// Open (or create) the vector database under the configured base directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, StoreError> {
        Self::open(&config.vector_database_path()).await
    }

    /// Open (or create) a vector database at `db_path`
    #[inline]
    pub async fn open(db_path: &Path) -> Result<Self, StoreError> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            StoreError::Backend(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = db_path.to_string_lossy().to_string();
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to connect to LanceDB: {}", e)))?;

        info!("Vector store opened at {}", uri);
        Ok(Self { connection })
    }

    async fn table_names(&self) -> Result<Vec<String>, StoreError> {
        self.connection
            .table_names()
            .execute()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to list tables: {}", e)))
    }

    async fn open_existing(&self, collection: &str) -> Result<Table, StoreError> {
        if !self.collection_exists(collection).await? {
            return Err(StoreError::NotFound(collection.to_string()));
        }

        self.connection
            .open_table(collection)
            .execute()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to open table {}: {}", collection, e)))
    }

    async fn drop_table_if_exists(&self, collection: &str) -> Result<(), StoreError> {
        if self.table_names().await?.iter().any(|name| name == collection) {
            info!("Dropping existing table {}", collection);
            self.connection.drop_table(collection).await.map_err(|e| {
                StoreError::Backend(format!("Failed to drop table {}: {}", collection, e))
            })?;
        }
        Ok(())
    }

    /// Replace a collection's contents with `records`.
    ///
    /// The table is recreated with the vector dimension of the first record;
    /// every record must share it.
    #[inline]
    pub async fn replace_collection(
        &self,
        collection: &str,
        records: &[VectorRecord],
    ) -> Result<(), StoreError> {
        let vector_dim = records.first().map(|r| r.vector.len()).ok_or_else(|| {
            StoreError::EmptyCollection(collection.to_string())
        })?;

        if let Some(bad) = records.iter().find(|r| r.vector.len() != vector_dim) {
            return Err(StoreError::Backend(format!(
                "Record {} has {} dimensions, expected {}",
                bad.id,
                bad.vector.len(),
                vector_dim
            )));
        }

        self.drop_table_if_exists(collection).await?;

        let schema = collection_schema(vector_dim);
        self.connection
            .create_empty_table(collection, Arc::clone(&schema))
            .execute()
            .await
            .map_err(|e| {
                StoreError::Backend(format!("Failed to create table {}: {}", collection, e))
            })?;

        let batch = Self::collection_batch(records, vector_dim)?;
        let table = self.open_existing(collection).await?;
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table.add(reader).execute().await.map_err(|e| {
            StoreError::Backend(format!("Failed to insert into {}: {}", collection, e))
        })?;

        info!(
            "Stored {} records ({} dimensions) in collection {}",
            records.len(),
            vector_dim,
            collection
        );

        if records.len() >= MIN_INDEXED_ROWS {
            Self::create_vector_index(&table, records.len()).await?;
        } else {
            info!(
                "Collection {} has {} records (< {}), searches use a flat scan",
                collection,
                records.len(),
                MIN_INDEXED_ROWS
            );
        }
        Ok(())
    }

    /// Build the HNSW index that approximate searches (`ef`) run against
    async fn create_vector_index(table: &Table, rows: usize) -> Result<(), StoreError> {
        let partitions = u32::try_from((rows / ROWS_PER_PARTITION).max(1)).unwrap_or(u32::MAX);
        debug!(
            "Creating IVF-HNSW index on {} ({} rows, {} partitions)",
            table.name(),
            rows,
            partitions
        );

        let builder = IvfHnswSqIndexBuilder::default()
            .distance_type(DistanceType::Cosine)
            .num_partitions(partitions);
        table
            .create_index(&[VECTOR_COLUMN], Index::IvfHnswSq(builder))
            .execute()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to create vector index: {}", e)))?;

        info!("Vector index created on {}", table.name());
        Ok(())
    }

    /// Whether `collection` has an index on its vector column
    #[inline]
    pub async fn has_vector_index(&self, collection: &str) -> Result<bool, StoreError> {
        let table = self.open_existing(collection).await?;
        let indices = table
            .list_indices()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to list indices: {}", e)))?;
        Ok(indices
            .iter()
            .any(|index| index.columns.iter().any(|column| column == VECTOR_COLUMN)))
    }

    /// Number of rows in a collection
    #[inline]
    pub async fn count(&self, collection: &str) -> Result<usize, StoreError> {
        let table = self.open_existing(collection).await?;
        table
            .count_rows(None)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to count rows: {}", e)))
    }

    /// Read back the event log, oldest first
    #[inline]
    pub async fn read_events(&self, collection: &str) -> Result<Vec<EventLogRecord>, StoreError> {
        let table = self.open_existing(collection).await?;
        let total = table
            .count_rows(None)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to count rows: {}", e)))?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let batches: Vec<RecordBatch> = table
            .query()
            .limit(total)
            .execute()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to query events: {}", e)))?
            .try_collect()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to read event stream: {}", e)))?;

        let mut events = Vec::with_capacity(total);
        for batch in &batches {
            let uuids = string_column(batch, "uuid")?;
            let request_ids = string_column(batch, "request_id")?;
            let texts = string_column(batch, "event_text")?;
            let timestamps = batch
                .column_by_name("timestamp")
                .and_then(|col| col.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| StoreError::Backend("Missing timestamp column".to_string()))?;

            for row in 0..batch.num_rows() {
                events.push(EventLogRecord {
                    uuid: uuids.value(row).to_string(),
                    request_id: request_ids.value(row).to_string(),
                    event_text: texts.value(row).to_string(),
                    timestamp: timestamps.value(row),
                });
            }
        }

        events.sort_by_key(|event| event.timestamp);
        Ok(events)
    }

    fn collection_batch(
        records: &[VectorRecord],
        vector_dim: usize,
    ) -> Result<RecordBatch, StoreError> {
        let mut flat_values = Vec::with_capacity(records.len() * vector_dim);
        for record in records {
            flat_values.extend_from_slice(&record.vector);
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_dim as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| StoreError::Backend(format!("Failed to create vector array: {}", e)))?;

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let texts: Vec<&str> = records.iter().map(|r| r.text.as_str()).collect();

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(StringArray::from(texts)),
            Arc::new(vector_array),
        ];

        RecordBatch::try_new(collection_schema(vector_dim), arrays)
            .map_err(|e| StoreError::Backend(format!("Failed to create record batch: {}", e)))
    }

    fn parse_records(batch: &RecordBatch) -> Result<Vec<VectorRecord>, StoreError> {
        let ids = string_column(batch, ID_COLUMN)?;
        let texts = string_column(batch, TEXT_COLUMN)?;
        let vectors = batch
            .column_by_name(VECTOR_COLUMN)
            .and_then(|col| col.as_any().downcast_ref::<FixedSizeListArray>())
            .ok_or_else(|| StoreError::Backend("Missing or invalid vector column".to_string()))?;

        let mut records = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let values = vectors.value(row);
            let floats = values
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| StoreError::Backend("Vector items are not f32".to_string()))?;

            records.push(VectorRecord {
                id: ids.value(row).to_string(),
                text: texts.value(row).to_string(),
                vector: floats.values().to_vec(),
            });
        }
        Ok(records)
    }

    fn parse_hits(batch: &RecordBatch) -> Result<Vec<ScoredRecord>, StoreError> {
        let ids = string_column(batch, ID_COLUMN)?;
        let texts = string_column(batch, TEXT_COLUMN)?;
        let distances = batch
            .column_by_name(DISTANCE_COLUMN)
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
            .ok_or_else(|| StoreError::Backend("Missing distance column".to_string()))?;

        Ok((0..batch.num_rows())
            .map(|row| ScoredRecord {
                id: ids.value(row).to_string(),
                text: texts.value(row).to_string(),
                // Cosine distance is 1 - similarity
                score: 1.0 - distances.value(row),
            })
            .collect())
    }

    fn event_batch(record: &EventLogRecord) -> Result<RecordBatch, StoreError> {
        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(vec![record.uuid.as_str()])),
            Arc::new(StringArray::from(vec![record.request_id.as_str()])),
            Arc::new(StringArray::from(vec![record.event_text.as_str()])),
            Arc::new(Int64Array::from(vec![record.timestamp])),
        ];

        RecordBatch::try_new(event_log_schema(), arrays)
            .map_err(|e| StoreError::Backend(format!("Failed to create event batch: {}", e)))
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, StoreError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StoreError::Backend(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| StoreError::Backend(format!("Invalid {} column type", name)))
}

#[async_trait]
impl VectorIndex for VectorStore {
    async fn collection_exists(&self, collection: &str) -> Result<bool, StoreError> {
        Ok(self.table_names().await?.iter().any(|name| name == collection))
    }

    async fn scroll(&self, collection: &str) -> Result<Vec<VectorRecord>, StoreError> {
        let table = self.open_existing(collection).await?;
        let total = table
            .count_rows(None)
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to count rows: {}", e)))?;
        if total == 0 {
            return Ok(Vec::new());
        }

        let mut stream = table
            .query()
            .limit(total)
            .execute()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to scroll {}: {}", collection, e)))?;

        let mut records = Vec::with_capacity(total);
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to read result stream: {}", e)))?
        {
            records.extend(Self::parse_records(&batch)?);
        }

        debug!("Scrolled {} records from {}", records.len(), collection);
        Ok(records)
    }

    async fn search(
        &self,
        collection: &str,
        query: &[f32],
        limit: usize,
        params: SearchParams,
    ) -> Result<Vec<ScoredRecord>, StoreError> {
        let table = self.open_existing(collection).await?;

        let mut vector_query = table
            .vector_search(query)
            .map_err(|e| StoreError::Backend(format!("Failed to create vector search: {}", e)))?
            .column(VECTOR_COLUMN)
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        vector_query = if params.exact {
            vector_query.bypass_vector_index()
        } else {
            vector_query.ef(params.search_breadth)
        };

        let mut stream = vector_query
            .execute()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(Self::parse_hits(&batch)?);
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn recreate_event_collection(&self, collection: &str) -> Result<(), StoreError> {
        self.drop_table_if_exists(collection).await?;
        self.connection
            .create_empty_table(collection, event_log_schema())
            .execute()
            .await
            .map_err(|e| {
                StoreError::Backend(format!("Failed to create table {}: {}", collection, e))
            })?;
        debug!("Event collection {} recreated", collection);
        Ok(())
    }

    async fn append_event(
        &self,
        collection: &str,
        record: &EventLogRecord,
    ) -> Result<(), StoreError> {
        let table = self.open_existing(collection).await?;
        let batch = Self::event_batch(record)?;
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), event_log_schema());
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| StoreError::Backend(format!("Failed to append event: {}", e)))?;
        Ok(())
    }
}

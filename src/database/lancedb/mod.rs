// LanceDB vector database module
// One table per collection; the events table carries no vector column


pub mod vector_store;

use arrow::datatypes::{DataType, Field, Schema};
use std::sync::Arc;

pub use vector_store::VectorStore;

pub(crate) const ID_COLUMN: &str = "id";
pub(crate) const TEXT_COLUMN: &str = "text";
pub(crate) const VECTOR_COLUMN: &str = "vector";
pub(crate) const DISTANCE_COLUMN: &str = "_distance";

/// Schema for requirement and description collections
pub(crate) fn collection_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(ID_COLUMN, DataType::Utf8, false),
        Field::new(TEXT_COLUMN, DataType::Utf8, false),
        Field::new(
            VECTOR_COLUMN,
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
    ]))
}

/// Schema for the scratch event log
pub(crate) fn event_log_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("uuid", DataType::Utf8, false),
        Field::new("request_id", DataType::Utf8, false),
        Field::new("event_text", DataType::Utf8, false),
        Field::new("timestamp", DataType::Int64, false),
    ]))
}

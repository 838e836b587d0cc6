//! Loading requirement and description collections from CSV.
//!
//! The id column may be named `ID` or `Requirement ID`, the text column
//! `Description` or `Sub-requirement Text`. Texts are embedded with Ollama and
//! the target collection is replaced wholesale.


use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::database::{VectorRecord, VectorStore};
use crate::llm::OllamaClient;

pub const ID_COLUMNS: [&str; 2] = ["ID", "Requirement ID"];
pub const TEXT_COLUMNS: [&str; 2] = ["Description", "Sub-requirement Text"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRow {
    pub id: String,
    pub text: String,
}

fn find_column(headers: &csv::StringRecord, candidates: &[&str]) -> Option<usize> {
    candidates
        .iter()
        .find_map(|name| headers.iter().position(|header| header.trim() == *name))
}

/// Read id/text pairs from a CSV file. Rows with empty text are skipped;
/// empty or repeated ids are an error naming every offending row.
#[inline]
pub fn read_rows(csv_path: &Path) -> Result<Vec<SourceRow>> {
    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("Failed to open {}", csv_path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read headers of {}", csv_path.display()))?
        .clone();

    let found = || headers.iter().collect::<Vec<_>>().join(", ");
    let Some(id_col) = find_column(&headers, &ID_COLUMNS) else {
        bail!(
            "No id column in {} (expected one of: {}; found: {})",
            csv_path.display(),
            ID_COLUMNS.join(", "),
            found()
        );
    };
    let Some(text_col) = find_column(&headers, &TEXT_COLUMNS) else {
        bail!(
            "No text column in {} (expected one of: {}; found: {})",
            csv_path.display(),
            TEXT_COLUMNS.join(", "),
            found()
        );
    };

    let mut rows = Vec::new();
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut problems = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| {
            format!("Failed to read row {} of {}", line + 2, csv_path.display())
        })?;

        let id = record.get(id_col).unwrap_or_default().trim();
        let text = record.get(text_col).unwrap_or_default().trim();
        if text.is_empty() {
            warn!("Skipping row {} with empty text (id '{}')", line + 2, id);
            continue;
        }

        if id.is_empty() {
            problems.push(format!("row {} has an empty id", line + 2));
        } else if let Some(first) = first_seen.get(id) {
            problems.push(format!(
                "row {} repeats id '{}' from row {}",
                line + 2,
                id,
                first
            ));
        } else {
            first_seen.insert(id.to_string(), line + 2);
        }

        rows.push(SourceRow {
            id: id.to_string(),
            text: text.to_string(),
        });
    }

    if !problems.is_empty() {
        bail!(
            "Ids in {} must be unique and non-empty: {}",
            csv_path.display(),
            problems.join("; ")
        );
    }

    debug!("Read {} rows from {}", rows.len(), csv_path.display());
    Ok(rows)
}

pub struct CollectionLoader {
    client: OllamaClient,
    store: VectorStore,
    expected_dimension: Option<usize>,
}

impl CollectionLoader {
    #[inline]
    pub fn new(client: OllamaClient, store: VectorStore) -> Self {
        Self {
            client,
            store,
            expected_dimension: None,
        }
    }

    /// Warn when the embedding model returns vectors of another size
    #[inline]
    pub fn with_expected_dimension(mut self, dimension: usize) -> Self {
        self.expected_dimension = Some(dimension);
        self
    }

    /// Embed every row of `csv_path` and replace `collection` with the result.
    /// Returns the number of records stored.
    #[inline]
    pub async fn load_collection(&self, csv_path: &Path, collection: &str) -> Result<usize> {
        let rows = read_rows(csv_path)?;
        if rows.is_empty() {
            bail!("{} has no rows to load", csv_path.display());
        }

        let texts: Vec<String> = rows.iter().map(|row| row.text.clone()).collect();
        let spinner = spinner(format!("Embedding {} texts for {}", texts.len(), collection));

        let client = self.client.clone();
        let embeddings =
            tokio::task::spawn_blocking(move || client.generate_embeddings_batch(&texts))
                .await
                .context("Embedding task panicked")??;
        spinner.finish_and_clear();

        if embeddings.len() != rows.len() {
            bail!(
                "Expected {} embeddings, got {}",
                rows.len(),
                embeddings.len()
            );
        }

        if let (Some(expected), Some(first)) = (self.expected_dimension, embeddings.first()) {
            if first.embedding.len() != expected {
                warn!(
                    "Embedding model returned {} dimensions, configured for {}",
                    first.embedding.len(),
                    expected
                );
            }
        }

        let records: Vec<VectorRecord> = rows
            .into_iter()
            .zip(embeddings)
            .map(|(row, embedding)| VectorRecord {
                id: row.id,
                text: row.text,
                vector: embedding.embedding,
            })
            .collect();

        self.store
            .replace_collection(collection, &records)
            .await
            .with_context(|| format!("Failed to store collection {}", collection))?;

        info!(
            "Loaded {} records from {} into {}",
            records.len(),
            csv_path.display(),
            collection
        );
        Ok(records.len())
    }
}

fn spinner(message: String) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let bar = ProgressBar::new_spinner().with_style(style);
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

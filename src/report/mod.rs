//! Batch compliance report.
//!
//! For every requirement the pipeline retrieves the closest description,
//! asks the judge whether it satisfies the requirement and appends one row.
//! Progress goes to the [`EventBus`] and to the scratch event log. The CSV
//! export is written once, at the end, so an aborted run leaves no file.

pub mod export;

#[cfg(test)]
mod tests;

use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::database::{EventLogRecord, SearchParams, StoreError, VectorRecord};
use crate::events::{EventBus, EventKind};
use crate::judge::{ComplianceJudge, Verdict};
use crate::matching::{MatchResult, VectorMatchStore};

/// Outcome of one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowResult {
    Judged(Verdict),
    /// Retrieval found no candidate description
    NoMatch,
}

impl fmt::Display for RowResult {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Judged(verdict) => verdict.fmt(f),
            Self::NoMatch => f.write_str("no match"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportRow {
    pub requirement_id: String,
    pub requirement_text: String,
    pub description_id: Option<String>,
    pub description_text: Option<String>,
    pub similarity_score: Option<f32>,
    pub result: RowResult,
    pub reason: Option<String>,
}

impl ReportRow {
    fn no_match(requirement: &VectorRecord) -> Self {
        Self {
            requirement_id: requirement.id.clone(),
            requirement_text: requirement.text.clone(),
            description_id: None,
            description_text: None,
            similarity_score: None,
            result: RowResult::NoMatch,
            reason: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Report {
    pub run_id: Uuid,
    pub rows: Vec<ReportRow>,
    pub export_path: PathBuf,
}

impl Report {
    /// Row count per result, for summaries
    #[inline]
    pub fn tally(&self) -> BTreeMap<RowResult, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.result).or_insert(0) += 1;
        }
        counts
    }
}

/// Where a run currently is. Indices count requirements from zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    LoadRequirements,
    Retrieve { index: usize },
    Judge { index: usize },
    Append { index: usize },
    Finalize,
    Done,
    Aborted,
}

/// Step named in errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStage {
    LoadRequirements,
    Retrieve,
    Judge,
    Finalize,
}

impl fmt::Display for RunStage {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::LoadRequirements => "load requirements",
            Self::Retrieve => "retrieve",
            Self::Judge => "judge",
            Self::Finalize => "finalize",
        })
    }
}

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Configuration error during {stage}: {message}")]
    Configuration { stage: RunStage, message: String },

    #[error("Service failure during {stage}{}: {source:#}", for_requirement(.requirement_id.as_deref()))]
    ServiceFailure {
        stage: RunStage,
        requirement_id: Option<String>,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to export report to {}: {source:#}", .path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },
}

fn for_requirement(requirement_id: Option<&str>) -> String {
    requirement_id
        .map(|id| format!(" of requirement {}", id))
        .unwrap_or_default()
}

impl ReportError {
    fn from_store(stage: RunStage, requirement_id: Option<&str>, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) | StoreError::EmptyCollection(_) => Self::Configuration {
                stage,
                message: err.to_string(),
            },
            StoreError::Backend(_) => Self::ServiceFailure {
                stage,
                requirement_id: requirement_id.map(str::to_string),
                source: err.into(),
            },
        }
    }
}

/// Collection names, search tuning and export location for a run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub requirements: String,
    pub descriptions: String,
    pub events: String,
    pub search: SearchParams,
    pub export_path: PathBuf,
}

impl PipelineSettings {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            requirements: config.collections.requirements.clone(),
            descriptions: config.collections.descriptions.clone(),
            events: config.collections.events.clone(),
            search: SearchParams {
                search_breadth: config.search.search_breadth,
                exact: config.search.exact,
            },
            export_path: config.report_output_path(),
        }
    }

    #[inline]
    pub fn with_export_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.export_path = path.into();
        self
    }
}

pub struct ReportPipeline {
    store: VectorMatchStore,
    judge: ComplianceJudge,
    bus: Arc<EventBus>,
    settings: PipelineSettings,
    state: watch::Sender<RunState>,
}

impl ReportPipeline {
    #[inline]
    pub fn new(
        store: VectorMatchStore,
        judge: ComplianceJudge,
        bus: Arc<EventBus>,
        settings: PipelineSettings,
    ) -> Self {
        let (state, _) = watch::channel(RunState::Init);
        Self {
            store,
            judge,
            bus,
            settings,
            state,
        }
    }

    #[inline]
    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    /// Follow state changes while `run` is in progress
    #[inline]
    pub fn subscribe(&self) -> watch::Receiver<RunState> {
        self.state.subscribe()
    }

    #[inline]
    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Judge every requirement and export the report
    #[inline]
    pub async fn run(&self) -> Result<Report, ReportError> {
        match self.run_steps().await {
            Ok(report) => {
                self.set_state(RunState::Done);
                info!(
                    "Report {} finished with {} rows",
                    report.run_id,
                    report.rows.len()
                );
                Ok(report)
            }
            Err(e) => {
                self.set_state(RunState::Aborted);
                error!("Report run {} aborted: {}", self.bus.run_id(), e);
                Err(e)
            }
        }
    }

    async fn run_steps(&self) -> Result<Report, ReportError> {
        self.set_state(RunState::Init);
        self.store.reset_events(&self.settings.events).await;

        let requirements = self.load_requirements().await?;

        let mut rows = Vec::with_capacity(requirements.len());
        for (index, requirement) in requirements.iter().enumerate() {
            let row = self.process(index, requirement).await?;
            self.set_state(RunState::Append { index });
            rows.push(row);
        }

        self.set_state(RunState::Finalize);
        let path = self.settings.export_path.clone();
        export::write_csv(&path, &rows).map_err(|source| ReportError::Export {
            path: path.clone(),
            source,
        })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.log_event("", file_name).await;
        self.bus.emit(EventKind::ReportReady {
            path: path.display().to_string(),
        });

        Ok(Report {
            run_id: self.bus.run_id(),
            rows,
            export_path: path,
        })
    }

    async fn load_requirements(&self) -> Result<Vec<VectorRecord>, ReportError> {
        self.set_state(RunState::LoadRequirements);
        let stage = RunStage::LoadRequirements;
        self.bus.emit(EventKind::Retrieve {
            query: Some(self.settings.requirements.clone()),
            source_count: 0,
        });

        self.store
            .ensure_exists(&self.settings.descriptions)
            .await
            .map_err(|e| ReportError::from_store(stage, None, e))?;
        let requirements = self
            .store
            .list_all(&self.settings.requirements)
            .await
            .map_err(|e| ReportError::from_store(stage, None, e))?;

        info!(
            "Loaded {} requirements from {}",
            requirements.len(),
            self.settings.requirements
        );
        self.bus.emit(EventKind::Retrieve {
            query: Some(self.settings.requirements.clone()),
            source_count: requirements.len(),
        });
        Ok(requirements)
    }

    async fn process(
        &self,
        index: usize,
        requirement: &VectorRecord,
    ) -> Result<ReportRow, ReportError> {
        let requirement_id = requirement.id.clone();

        self.set_state(RunState::Retrieve { index });
        self.log_event(
            &requirement_id,
            format!("Retrieving Context for Requirement {}...", index + 1),
        )
        .await;
        self.bus.emit(EventKind::RetrievalStart {
            requirement_index: index,
            requirement_id: requirement_id.clone(),
        });

        let best = self
            .store
            .find_best_match(
                &requirement.vector,
                &self.settings.descriptions,
                self.settings.search,
            )
            .await
            .map_err(|e| ReportError::from_store(RunStage::Retrieve, Some(&requirement_id), e))?;

        self.bus.emit(EventKind::RetrievalEnd {
            requirement_index: index,
            requirement_id: requirement_id.clone(),
            matched: best.is_some(),
        });

        let Some(best) = best else {
            info!("No matching description for requirement {}", requirement_id);
            return Ok(ReportRow::no_match(requirement));
        };
        debug!(
            "Requirement {} matched {} with similarity {}",
            requirement_id, best.description_id, best.similarity_score
        );

        self.judge_match(index, requirement, best).await
    }

    async fn judge_match(
        &self,
        index: usize,
        requirement: &VectorRecord,
        best: MatchResult,
    ) -> Result<ReportRow, ReportError> {
        let requirement_id = requirement.id.clone();

        self.set_state(RunState::Judge { index });
        self.log_event(
            &requirement_id,
            format!("Reasoning with Context for Requirement {}...", index + 1),
        )
        .await;
        self.bus.emit(EventKind::ReasoningStart {
            requirement_index: index,
            requirement_id: requirement_id.clone(),
        });

        let judgment = self
            .judge
            .judge(&requirement.text, &best.description_text)
            .await
            .map_err(|e| ReportError::ServiceFailure {
                stage: RunStage::Judge,
                requirement_id: Some(requirement_id.clone()),
                source: e.into(),
            })?;

        self.bus.emit(EventKind::ReasoningEnd {
            requirement_index: index,
            requirement_id: requirement_id.clone(),
        });

        Ok(ReportRow {
            requirement_id,
            requirement_text: requirement.text.clone(),
            description_id: Some(best.description_id),
            description_text: Some(best.description_text),
            similarity_score: Some(best.similarity_score),
            result: RowResult::Judged(judgment.verdict),
            reason: Some(judgment.reason),
        })
    }

    async fn log_event(&self, request_id: &str, text: String) {
        let record = EventLogRecord {
            uuid: self.bus.run_id().to_string(),
            request_id: request_id.to_string(),
            event_text: text,
            timestamp: Utc::now().timestamp(),
        };
        self.store.log_event(&self.settings.events, &record).await;
    }

    fn set_state(&self, state: RunState) {
        self.state.send_replace(state);
    }
}

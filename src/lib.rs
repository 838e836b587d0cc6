use thiserror::Error;

pub type Result<T> = std::result::Result<T, ComplianceError>;

#[derive(Error, Debug)]
pub enum ComplianceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Completion error: {0}")]
    Completion(String),

    #[error("Report error: {0}")]
    Report(#[from] report::ReportError),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod commands;
pub mod config;
pub mod database;
pub mod events;
pub mod ingest;
pub mod judge;
pub mod llm;
pub mod matching;
pub mod report;
pub mod stream;
pub mod tools;

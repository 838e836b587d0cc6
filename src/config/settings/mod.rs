#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::llm::ollama::DEFAULT_EMBEDDING_DIMENSION;

/// Prompt used to adjudicate a requirement against a capability description.
///
/// `{requirement_text}` and `{description_text}` are substituted before the
/// prompt is sent to the completion service.
pub const DEFAULT_PROMPT_TEMPLATE: &str = "You are a deeply analytical person who I trust to identify commonalities and differences between a pair of statements. \n\
Statement 1 will represent the Requirement. Statement 2 will represent the Capability. This is the INPUT. You need to deduce whether the Capability can fulfill the Requirement and OUTPUT a Result (possible choices: Yes, No, Partial) and Reason.\n\
Requirement: {requirement_text}\n\
Capability: {description_text}\n\
Strictly follow the format in JSON of the form:\n\
{\n  \"Result\": {\n    \"Result\": \"Yes\"\n  },\n  \"Reason\": {\n    \"Reason\": \"n77 bands are supported by this capability.\"\n  }\n}";

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub ollama: OllamaConfig,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(skip)]
    pub base_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OllamaConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Model used for compliance judgments
    pub model: String,
    /// Model used when loading collections
    pub embedding_model: String,
    pub batch_size: u32,
    pub embedding_dimension: u32,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: "localhost".to_string(),
            port: 11434,
            model: "llama3:latest".to_string(),
            embedding_model: "nomic-embed-text:latest".to_string(),
            batch_size: 16,
            embedding_dimension: DEFAULT_EMBEDDING_DIMENSION,
            timeout_secs: 120,
        }
    }
}

/// Names of the vector collections a report run reads from and writes to
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CollectionsConfig {
    pub requirements: String,
    pub descriptions: String,
    /// Scratch collection, recreated at the start of every run
    pub events: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            requirements: "requirement".to_string(),
            descriptions: "description".to_string(),
            events: "events".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SearchConfig {
    /// Candidate list size for approximate search (HNSW `ef`)
    pub search_breadth: usize,
    /// Bypass the ANN index and scan every candidate
    pub exact: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            search_breadth: 200,
            exact: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ReportConfig {
    /// Export location, relative paths resolve against the base directory
    pub output_file: PathBuf,
    pub prompt_template: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_file: PathBuf::from("reports/Results-LLM.csv"),
            prompt_template: DEFAULT_PROMPT_TEMPLATE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolsConfig {
    pub requirements_compliance: ToolConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ToolConfig {
    pub enabled: bool,
    pub label: String,
    pub description: String,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            label: "requirementsCompliance".to_string(),
            description: "Generate a report based on the requirements and descriptions collections. \
                Notify the user whether the task was successful or unsuccessful."
                .to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found or could not be created")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("Invalid batch size: {0} (must be between 1 and 1000)")]
    InvalidBatchSize(u32),
    #[error("Invalid model name: {0} (cannot be empty)")]
    InvalidModel(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid embedding dimension: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid request timeout: {0} (must be between 1 and 600 seconds)")]
    InvalidTimeout(u64),
    #[error("Invalid collection name: '{0}' (cannot be empty)")]
    InvalidCollectionName(String),
    #[error("Collection '{0}' is configured for more than one role")]
    DuplicateCollection(String),
    #[error("Invalid search breadth: {0} (must be between 1 and 10000)")]
    InvalidSearchBreadth(usize),
    #[error("Prompt template is missing the {0} placeholder")]
    MissingPromptPlaceholder(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl Config {
    /// Default configuration directory (`~/.compliance-report`)
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".compliance-report"))
            .or_else(|| dirs::data_dir().map(|data| data.join("compliance-report")))
            .ok_or(ConfigError::DirectoryError)
    }

    /// Load from the default configuration directory
    #[inline]
    pub fn load_default() -> Result<Self> {
        let config_dir = Self::config_dir().context("Failed to determine config directory")?;
        Self::load(config_dir)
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(config_dir: P) -> Result<Self> {
        let config_path = config_dir.as_ref().join("config.toml");

        if !config_path.exists() {
            return Ok(Self {
                base_dir: config_dir.as_ref().to_path_buf(),
                ..Self::default()
            });
        }

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;
        config.base_dir = config_dir.as_ref().to_path_buf();

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn save(&self) -> Result<()> {
        self.validate()
            .context("Configuration validation failed before saving")?;

        let config_dir = self.get_base_dir();

        fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        let config_path = self.config_file_path();
        let content = toml::to_string_pretty(self).context("Failed to serialize config to TOML")?;

        fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {}", config_path.display()))?;

        Ok(())
    }

    /// Get the base directory for the application
    #[inline]
    pub fn get_base_dir(&self) -> &Path {
        &self.base_dir
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ollama.validate()?;
        self.collections.validate()?;
        self.search.validate()?;
        self.report.validate()?;
        Ok(())
    }

    #[inline]
    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        self.ollama.ollama_url()
    }

    #[inline]
    pub fn config_file_path(&self) -> PathBuf {
        self.get_base_dir().join("config.toml")
    }

    /// Get the path for the vector database directory
    #[inline]
    pub fn vector_database_path(&self) -> PathBuf {
        self.get_base_dir().join("vectors")
    }

    /// Where the report export is written
    #[inline]
    pub fn report_output_path(&self) -> PathBuf {
        if self.report.output_file.is_absolute() {
            self.report.output_file.clone()
        } else {
            self.get_base_dir().join(&self.report.output_file)
        }
    }
}

impl OllamaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidUrl(format!(
                "{}://{}:{}",
                self.protocol, self.host, self.port
            )));
        }

        self.ollama_url()?;

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        if self.model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.model.clone()));
        }

        if self.embedding_model.trim().is_empty() {
            return Err(ConfigError::InvalidModel(self.embedding_model.clone()));
        }

        if self.batch_size == 0 || self.batch_size > 1000 {
            return Err(ConfigError::InvalidBatchSize(self.batch_size));
        }

        if !(64..=4096).contains(&self.embedding_dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(
                self.embedding_dimension,
            ));
        }

        if !(1..=600).contains(&self.timeout_secs) {
            return Err(ConfigError::InvalidTimeout(self.timeout_secs));
        }

        Ok(())
    }

    pub fn ollama_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}:{}", self.protocol, self.host, self.port);
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }
}

impl CollectionsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let names = [&self.requirements, &self.descriptions, &self.events];
        for name in names {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidCollectionName(name.clone()));
            }
        }

        // The events collection is dropped at run start, so it must never alias a source
        if self.requirements == self.descriptions {
            return Err(ConfigError::DuplicateCollection(self.requirements.clone()));
        }
        if self.events == self.requirements || self.events == self.descriptions {
            return Err(ConfigError::DuplicateCollection(self.events.clone()));
        }

        Ok(())
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=10_000).contains(&self.search_breadth) {
            return Err(ConfigError::InvalidSearchBreadth(self.search_breadth));
        }
        Ok(())
    }
}

impl ReportConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for placeholder in ["{requirement_text}", "{description_text}"] {
            if !self.prompt_template.contains(placeholder) {
                return Err(ConfigError::MissingPromptPlaceholder(placeholder));
            }
        }
        Ok(())
    }
}

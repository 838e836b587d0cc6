//! Tool invocation
//!
//! Capabilities an agent can call by name. Each call publishes a
//! `FunctionCall` event before it runs and an `AgentStep` event with the
//! output afterwards, so a live client sees both.

pub mod report;


use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::database::VectorIndex;
use crate::events::{EventBus, EventKind};
use crate::llm::CompletionService;

pub use report::{REPORT_TOOL_NAME, ReportTool};

/// Tool definition as shown to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolMetadata {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Result of a single tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_name: String,
    pub raw_input: Value,
    pub output: Value,
    pub is_error: bool,
}

impl ToolOutput {
    #[inline]
    pub fn success(tool_name: &str, raw_input: Value, output: impl Into<Value>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            raw_input,
            output: output.into(),
            is_error: false,
        }
    }

    #[inline]
    pub fn error(tool_name: &str, raw_input: Value, output: impl Into<Value>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            raw_input,
            output: output.into(),
            is_error: true,
        }
    }

    /// Output as display text
    #[inline]
    pub fn text(&self) -> String {
        match &self.output {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn metadata(&self) -> ToolMetadata;

    /// Run the tool. `bus` is the caller's run, for tools that publish progress.
    async fn call(&self, input: Value, bus: Arc<EventBus>) -> Result<ToolOutput>;
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Tool '{0}' is not registered")]
    NotFound(String),
}

#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every tool enabled in `config`
    #[inline]
    pub fn from_config(
        config: &Config,
        index: Arc<dyn VectorIndex>,
        service: Arc<dyn CompletionService>,
    ) -> Self {
        let mut registry = Self::new();

        let compliance = &config.tools.requirements_compliance;
        if compliance.enabled {
            registry.register(Arc::new(ReportTool::from_config(config, index, service)));
        } else {
            debug!("Tool '{}' is disabled", compliance.label);
        }

        registry
    }

    /// Add a tool, replacing any tool with the same name
    #[inline]
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.metadata().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!("Replaced existing tool '{}'", name);
        }
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tool definitions, sorted by name
    #[inline]
    pub fn list(&self) -> Vec<ToolMetadata> {
        self.tools.values().map(|tool| tool.metadata()).collect()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Call a tool by name. A failing tool is reported as an error output,
    /// not as `Err`.
    #[inline]
    pub async fn invoke(
        &self,
        name: &str,
        input: Value,
        bus: &Arc<EventBus>,
    ) -> Result<ToolOutput, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;

        bus.emit(EventKind::FunctionCall {
            tool: name.to_string(),
            arguments: input.clone(),
        });
        info!("Calling tool {}", name);

        let output = match tool.call(input.clone(), Arc::clone(bus)).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Tool {} failed: {:#}", name, e);
                ToolOutput::error(name, input, json!(format!("Error: {:#}", e)))
            }
        };

        bus.emit(EventKind::AgentStep {
            output: Some(output.clone()),
        });
        Ok(output)
    }
}

// Report generation tool
// Runs a full compliance report and answers with where it was saved

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;

use super::{Tool, ToolMetadata, ToolOutput};
use crate::config::Config;
use crate::database::VectorIndex;
use crate::events::EventBus;
use crate::judge::ComplianceJudge;
use crate::llm::CompletionService;
use crate::matching::VectorMatchStore;
use crate::report::{PipelineSettings, ReportPipeline};

pub const REPORT_TOOL_NAME: &str = "generate_report_tool";

pub struct ReportTool {
    index: Arc<dyn VectorIndex>,
    service: Arc<dyn CompletionService>,
    prompt_template: String,
    settings: PipelineSettings,
    description: String,
}

impl ReportTool {
    #[inline]
    pub fn new(
        index: Arc<dyn VectorIndex>,
        service: Arc<dyn CompletionService>,
        prompt_template: impl Into<String>,
        settings: PipelineSettings,
        description: impl Into<String>,
    ) -> Self {
        Self {
            index,
            service,
            prompt_template: prompt_template.into(),
            settings,
            description: description.into(),
        }
    }

    #[inline]
    pub fn from_config(
        config: &Config,
        index: Arc<dyn VectorIndex>,
        service: Arc<dyn CompletionService>,
    ) -> Self {
        Self::new(
            index,
            service,
            config.report.prompt_template.clone(),
            PipelineSettings::from_config(config),
            config.tools.requirements_compliance.description.clone(),
        )
    }

    fn pipeline(&self, input: &Value, bus: Arc<EventBus>) -> ReportPipeline {
        let mut settings = self.settings.clone();
        if let Some(path) = input.get("output_file").and_then(Value::as_str) {
            settings = settings.with_export_path(PathBuf::from(path));
        }

        ReportPipeline::new(
            VectorMatchStore::new(Arc::clone(&self.index)),
            ComplianceJudge::new(Arc::clone(&self.service), self.prompt_template.clone()),
            bus,
            settings,
        )
    }
}

#[async_trait]
impl Tool for ReportTool {
    #[inline]
    fn metadata(&self) -> ToolMetadata {
        ToolMetadata {
            name: REPORT_TOOL_NAME.to_string(),
            description: self.description.clone(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "output_file": {
                        "type": "string",
                        "description": "Optional: where to save the report"
                    }
                },
                "additionalProperties": true
            }),
        }
    }

    #[inline]
    async fn call(&self, input: Value, bus: Arc<EventBus>) -> Result<ToolOutput> {
        let pipeline = self.pipeline(&input, bus);

        match pipeline.run().await {
            Ok(report) => Ok(ToolOutput::success(
                REPORT_TOOL_NAME,
                input,
                format!(
                    "Report between requirements and descriptions was generated and saved to {}.",
                    report.export_path.display()
                ),
            )),
            Err(e) => {
                error!("Error generating report: {}", e);
                Ok(ToolOutput::error(
                    REPORT_TOOL_NAME,
                    input,
                    format!("Error generating report: {}", e),
                ))
            }
        }
    }
}

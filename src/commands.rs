use anyhow::{Context, Result};
use console::style;
use futures::StreamExt;
use futures::future::ready;
use futures::stream::{self, BoxStream};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tokio::task::AbortHandle;
use tracing::{info, warn};

use crate::config::Config;
use crate::database::{VectorIndex, VectorStore};
use crate::events::EventBus;
use crate::ingest::CollectionLoader;
use crate::judge::ComplianceJudge;
use crate::llm::{CompletionService, OllamaClient};
use crate::matching::VectorMatchStore;
use crate::report::{PipelineSettings, Report, ReportPipeline};
use crate::stream::{PumpOutcome, StreamMerger, pump};
use crate::tools::{REPORT_TOOL_NAME, ToolRegistry};

const SUMMARY_PROMPT: &str = "A requirements compliance tool just finished with this result:\n\
{result}\n\
Tell the user in one or two sentences what happened and where to find the report.";

fn ollama_client(config: &Config) -> Result<OllamaClient> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    if let Err(e) = client.health_check() {
        warn!("Ollama health check failed: {:#}", e);
    }
    Ok(client)
}

async fn vector_store(config: &Config) -> Result<Arc<VectorStore>> {
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector database")?;
    Ok(Arc::new(store))
}

/// Write the effective configuration to `config.toml`, creating it with
/// defaults when missing
#[inline]
pub fn write_config(config: &Config) -> Result<()> {
    config.save()?;
    eprintln!(
        "{} {}",
        style("✓ Configuration saved to").green(),
        config.config_file_path().display()
    );
    Ok(())
}

/// Embed a CSV file into a collection
#[inline]
pub async fn load_collection(config: &Config, csv_path: &Path, collection: &str) -> Result<()> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let store = VectorStore::new(config)
        .await
        .context("Failed to open vector database")?;

    let loader = CollectionLoader::new(client, store)
        .with_expected_dimension(config.ollama.embedding_dimension as usize);
    let count = loader.load_collection(csv_path, collection).await?;

    println!(
        "Loaded {} records from {} into collection '{}'",
        count,
        csv_path.display(),
        collection
    );
    Ok(())
}

/// Run a report and print a summary
#[inline]
pub async fn generate_report(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let client = ollama_client(config)?;
    let store = vector_store(config).await?;

    let mut settings = PipelineSettings::from_config(config);
    if let Some(output) = output {
        settings = settings.with_export_path(output);
    }

    let bus = Arc::new(EventBus::new());
    let pipeline = ReportPipeline::new(
        VectorMatchStore::new(store),
        ComplianceJudge::new(Arc::new(client), config.report.prompt_template.clone()),
        bus,
        settings,
    );

    let report = pipeline.run().await?;
    print_summary(&report);
    Ok(())
}

fn print_summary(report: &Report) {
    println!(
        "{}",
        style(format!("Report {} ({} rows)", report.run_id, report.rows.len())).bold()
    );
    for (result, count) in report.tally() {
        println!("  {:<10} {}", result.to_string(), count);
    }
    println!("Saved to {}", report.export_path.display());
}

/// Run the report tool and stream its progress and a model-written summary
/// to stdout as data-stream frames
#[inline]
pub async fn generate_report_live(config: &Config, output: Option<PathBuf>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    match stream_report(config, output, &mut stdout).await? {
        PumpOutcome::Completed { frames } => info!("Streamed {} frames", frames),
        PumpOutcome::Disconnected { frames } => {
            warn!("Output closed after {} frames", frames)
        }
    }
    Ok(())
}

/// Aborts the task when dropped
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Run the report tool and write its frames to `writer`.
///
/// If the writer fails the merged stream is cancelled, and the report run is
/// aborted with it: no export is written after the client has gone.
#[inline]
pub async fn stream_report<W>(
    config: &Config,
    output: Option<PathBuf>,
    writer: &mut W,
) -> Result<PumpOutcome>
where
    W: AsyncWrite + Unpin,
{
    let client = ollama_client(config)?;
    let store = vector_store(config).await?;

    let registry = ToolRegistry::from_config(
        config,
        store as Arc<dyn VectorIndex>,
        Arc::new(client.clone()) as Arc<dyn CompletionService>,
    );
    if registry.get(REPORT_TOOL_NAME).is_none() {
        anyhow::bail!(
            "The '{}' tool is disabled in the configuration",
            config.tools.requirements_compliance.label
        );
    }

    let bus = Arc::new(EventBus::new());
    let input = match output {
        Some(path) => json!({ "output_file": path.display().to_string() }),
        None => json!({}),
    };

    let tool_bus = Arc::clone(&bus);
    let tool_run = tokio::spawn(async move {
        registry
            .invoke(REPORT_TOOL_NAME, input, &tool_bus)
            .await
            .map(|output| (output.text(), output.is_error))
    });

    let tokens = stream::once(async move {
        let _abort = AbortOnDrop(tool_run.abort_handle());
        match tool_run.await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => (format!("Error: {}", e), true),
            Err(e) => (format!("Error: report task failed: {}", e), true),
        }
    })
    .flat_map(move |(message, is_error)| summary_tokens(&client, message, is_error));

    let merged = StreamMerger::new(bus).merge(tokens)?;
    Ok(pump(merged, writer).await)
}

/// The tool message, followed by the model's summary of it unless the tool failed
fn summary_tokens(
    client: &OllamaClient,
    message: String,
    is_error: bool,
) -> BoxStream<'static, String> {
    let lead = stream::once(ready(format!("{}\n\n", message)));
    if is_error {
        return lead.boxed();
    }

    let prompt = SUMMARY_PROMPT.replace("{result}", &message);
    let summary = client
        .stream_completion(&prompt)
        .filter_map(|token| {
            ready(match token {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!("Summary stream failed: {:#}", e);
                    None
                }
            })
        });
    lead.chain(summary).boxed()
}

/// List the tools enabled by the configuration
#[inline]
pub async fn list_tools(config: &Config) -> Result<()> {
    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let store = vector_store(config).await?;
    let registry = ToolRegistry::from_config(config, store, Arc::new(client));

    let tool_config = &config.tools.requirements_compliance;
    if registry.is_empty() {
        println!("No tools are enabled.");
        println!(
            "Set [tools.requirements_compliance] enabled = true in {}",
            config.config_file_path().display()
        );
        return Ok(());
    }

    for tool in registry.list() {
        println!("{} ({})", style(&tool.name).bold(), tool_config.label);
        println!("   {}", tool.description);
    }
    Ok(())
}

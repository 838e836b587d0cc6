use anyhow::Result;
use console::style;

use super::Config;

/// Print the effective configuration to stderr
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    eprintln!("{}", style("📋 Current Configuration").bold().cyan());
    eprintln!();

    eprintln!("{}", style("Ollama Settings:").bold().yellow());
    eprintln!("  Host: {}", style(&config.ollama.host).cyan());
    eprintln!("  Port: {}", style(config.ollama.port).cyan());
    eprintln!("  Judgment Model: {}", style(&config.ollama.model).cyan());
    eprintln!(
        "  Embedding Model: {}",
        style(&config.ollama.embedding_model).cyan()
    );
    eprintln!("  Batch Size: {}", style(config.ollama.batch_size).cyan());
    eprintln!("  Timeout: {}s", style(config.ollama.timeout_secs).cyan());
    match config.ollama_url() {
        Ok(url) => eprintln!("  Ollama URL: {}", style(url).cyan()),
        Err(e) => eprintln!("  Ollama URL: {} ({})", style("Invalid").red(), e),
    }

    eprintln!();
    eprintln!("{}", style("Collections:").bold().yellow());
    eprintln!(
        "  Requirements: {}",
        style(&config.collections.requirements).cyan()
    );
    eprintln!(
        "  Descriptions: {}",
        style(&config.collections.descriptions).cyan()
    );
    eprintln!("  Events: {}", style(&config.collections.events).cyan());

    eprintln!();
    eprintln!("{}", style("Search:").bold().yellow());
    eprintln!(
        "  Search Breadth: {}",
        style(config.search.search_breadth).cyan()
    );
    eprintln!("  Exact: {}", style(config.search.exact).cyan());

    eprintln!();
    eprintln!("{}", style("Report:").bold().yellow());
    eprintln!(
        "  Output: {}",
        style(config.report_output_path().display()).cyan()
    );
    let tool = &config.tools.requirements_compliance;
    let enabled = if tool.enabled {
        style("enabled").green()
    } else {
        style("disabled").red()
    };
    eprintln!("  Tool {}: {}", style(&tool.label).cyan(), enabled);

    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );

    Ok(())
}

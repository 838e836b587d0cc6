use clap::{Parser, Subcommand};
use compliance_report::Result;
use compliance_report::commands::{
    generate_report, generate_report_live, list_tools, load_collection, write_config,
};
use compliance_report::config::{Config, show_config};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "compliance-report")]
#[command(about = "Checks requirements against capability descriptions with a local LLM")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save the configuration file, or print it
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed a CSV file into a vector collection
    Load {
        /// CSV with an ID/Requirement ID column and a Description/Sub-requirement Text column
        csv: PathBuf,
        /// Target collection, e.g. "requirement" or "description"
        #[arg(long)]
        collection: String,
    },
    /// Judge every requirement against its closest description
    Report {
        /// Override the export path from the configuration
        #[arg(long)]
        output: Option<PathBuf>,
        /// Stream progress events and a summary to stdout
        #[arg(long)]
        live: bool,
    },
    /// List enabled tools
    Tools,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load_default()?;

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config)?;
            } else {
                write_config(&config)?;
            }
        }
        Commands::Load { csv, collection } => {
            load_collection(&config, &csv, &collection).await?;
        }
        Commands::Report { output, live } => {
            if live {
                generate_report_live(&config, output).await?;
            } else {
                generate_report(&config, output).await?;
            }
        }
        Commands::Tools => {
            list_tools(&config).await?;
        }
    }

    Ok(())
}

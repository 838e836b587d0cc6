// Configuration management module
// TOML settings plus the `config --show` printer

pub mod display;
pub mod settings;


pub use display::show_config;
pub use settings::{
    CollectionsConfig, Config, ConfigError, DEFAULT_PROMPT_TEMPLATE, OllamaConfig, ReportConfig,
    SearchConfig, ToolConfig, ToolsConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}

use super::*;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.embedding_model, "nomic-embed-text:latest");
    assert_eq!(config.ollama.batch_size, 16);
    assert_eq!(config.collections.requirements, "requirement");
    assert_eq!(config.collections.descriptions, "description");
    assert_eq!(config.collections.events, "events");
    assert_eq!(config.search.search_breadth, 200);
    assert!(!config.search.exact);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.timeout_secs = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.search.search_breadth = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn events_collection_cannot_alias_a_source() {
    let mut config = Config::default();
    config.collections.events = config.collections.requirements.clone();

    let result = config.validate();
    assert!(matches!(result, Err(ConfigError::DuplicateCollection(name)) if name == "requirement"));

    let mut config = Config::default();
    config.collections.descriptions = config.collections.requirements.clone();
    assert!(config.validate().is_err());
}

#[test]
fn prompt_template_needs_both_placeholders() {
    let mut config = Config::default();
    config.report.prompt_template = "Requirement: {requirement_text}".to_string();

    let result = config.validate();
    assert!(matches!(
        result,
        Err(ConfigError::MissingPromptPlaceholder("{description_text}"))
    ));
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn https_url_generation() {
    let mut config = Config::default();
    config.ollama.protocol = "https".to_string();
    config.ollama.host = "secure.example.com".to_string();
    config.ollama.port = 443;

    let url = config
        .ollama_url()
        .expect("should generate https url successfully");
    assert_eq!(url.as_str(), "https://secure.example.com/");
}

#[test]
fn toml_serialization() {
    let config = Config::default();
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn load_missing_config_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("should load defaults");
    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(
        config.report_output_path(),
        temp_dir.path().join("reports/Results-LLM.csv")
    );
}

#[test]
fn save_then_load() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    config.search.search_breadth = 64;
    config.collections.events = "run_log".to_string();
    config.tools.requirements_compliance.enabled = false;

    config.save().expect("should save config");
    let loaded = Config::load(temp_dir.path()).expect("should load saved config");

    assert_eq!(loaded, config);
}

#[test]
fn absolute_output_file_is_kept() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let absolute = temp_dir.path().join("elsewhere").join("report.csv");
    let mut config = Config {
        base_dir: PathBuf::from("/unused"),
        ..Config::default()
    };
    config.report.output_file = absolute.clone();

    assert_eq!(config.report_output_path(), absolute);
}

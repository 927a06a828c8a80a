use ar_core::config::{Config, ConfigError, ProviderKind};
use tempfile::TempDir;

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.log_level, "info");
    assert_eq!(cfg.general.log_format, "pretty");
    assert_eq!(cfg.provider.kind, ProviderKind::OpenAi);
    assert_eq!(cfg.provider.model, "gpt-4o-mini");
    assert_eq!(cfg.provider.max_tokens, 4000);
    assert!((cfg.provider.temperature - 0.2).abs() < f32::EPSILON);
    assert_eq!(cfg.pipeline.chat_word_threshold, 4);
    assert_eq!(cfg.pipeline.planner_context_chars, 2000);
    assert!(cfg.pipeline.backup_enabled);
    assert!(!cfg.pipeline.dry_run);
    assert!(cfg.pipeline.excluded_dirs.iter().any(|d| d == ".git"));
    assert!(cfg.pipeline.excluded_dirs.iter().any(|d| d == "node_modules"));
    assert!(cfg.crew.enabled);
    assert!(cfg.crew.model.is_none());
    cfg.validate().expect("defaults validate");
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("gpt-4o-mini"));
    assert!(toml_str.contains("kind = \"openai\""));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.provider.model, cfg.provider.model);
    assert_eq!(parsed.pipeline.excluded_dirs, cfg.pipeline.excluded_dirs);
    assert_eq!(parsed.crew.enabled, cfg.crew.enabled);
    parsed.validate().expect("config validates");
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[provider]
kind = "anthropic"
model = "claude-sonnet"

[pipeline]
dry_run = true
"#;
    let cfg: Config = toml::from_str(partial).expect("parse partial");
    assert_eq!(cfg.provider.kind, ProviderKind::Anthropic);
    assert_eq!(cfg.provider.model, "claude-sonnet");
    assert!(cfg.pipeline.dry_run);
    // defaults should fill in the rest
    assert_eq!(cfg.provider.max_tokens, 4000);
    assert!(cfg.pipeline.backup_enabled);
    assert_eq!(cfg.general.log_level, "info");
    assert!(cfg.crew.enabled);
}

#[test]
fn load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[crew]\nenabled = false\nmodel = \"gpt-4o\"\n").unwrap();

    let cfg = Config::load_from(&path).expect("load");
    assert!(!cfg.crew.enabled);
    assert_eq!(cfg.crew.model.as_deref(), Some("gpt-4o"));
}

#[test]
fn load_from_missing_file_is_io_error() {
    let dir = TempDir::new().unwrap();
    let err = Config::load_from(dir.path().join("nope.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn load_from_malformed_file_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[provider\nmodel = ").unwrap();
    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn validation_rejects_bad_values() {
    let mut cfg = Config::default();
    cfg.general.log_format = "xml".into();
    assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

    let mut cfg = Config::default();
    cfg.provider.temperature = 3.5;
    assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

    let mut cfg = Config::default();
    cfg.provider.model = "  ".into();
    assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));

    let mut cfg = Config::default();
    cfg.provider.kind = ProviderKind::Local;
    assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    cfg.provider.base_url = Some("http://localhost:8000".into());
    cfg.validate().expect("local with base_url validates");

    let mut cfg = Config::default();
    cfg.pipeline.planner_context_chars = 0;
    assert!(cfg.to_toml().is_err());
}

#[test]
fn explicit_key_env_is_used() {
    let mut cfg = Config::default();
    cfg.provider.api_key_env = Some("AR_TEST_KEY_THAT_IS_NEVER_SET".into());
    assert!(cfg.provider.api_key().is_none());
}

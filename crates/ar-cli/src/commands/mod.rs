pub mod diff;
pub mod gen_tests;
pub mod restore;
pub mod run;
pub mod stream;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use ar_agents::Coordinator;
use ar_core::config::Config;
use ar_intelligence::build_provider;

/// Command-line switches layered over the loaded config.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overrides {
    pub no_backup: bool,
    pub dry_run: bool,
}

/// Load config from `path` (or the default location), apply overrides and
/// initialise logging.
pub fn load_config(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(p) => Config::load_from(p)
            .with_context(|| format!("failed to load config from {}", p.display()))?,
        None => Config::load().context("failed to load config")?,
    };
    if overrides.no_backup {
        config.pipeline.backup_enabled = false;
    }
    if overrides.dry_run {
        config.pipeline.dry_run = true;
    }

    ar_telemetry::logging::init_from_config("auto-refactor", &config.general);
    Ok(config)
}

pub fn coordinator(config: &Config) -> anyhow::Result<Arc<Coordinator>> {
    let provider = build_provider(&config.provider).context("failed to set up LLM provider")?;
    let coordinator = Coordinator::from_config(config, provider)?;
    Ok(Arc::new(coordinator))
}

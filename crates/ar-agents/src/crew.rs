//! Crew delegation: the first strategy tried for any non-trivial request.
//!
//! A [`CrewDelegate`] receives the instruction, the target path, a progress
//! callback and the conversation history, and either produces a final report
//! or fails so the coordinator can fall back to its plan chain.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use ar_core::artifacts::extract_code_block;
use ar_core::file_ops::{self, DEFAULT_EXCLUDED_DIRS};
use ar_intelligence::llm::{LlmConfig, LlmError, LlmMessage, LlmProvider};
use async_trait::async_trait;
use thiserror::Error;
use tracing::{info, warn};

use crate::agent::{Agent, AgentRole};
use crate::prompts::{Persona, CREW_ENGINEER, CREW_REVIEW_TASK, CREW_WRITER};

// ---------------------------------------------------------------------------
// Errors / progress
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CrewError {
    #[error("crew unavailable: {0}")]
    Unavailable(String),
    #[error("crew task failed: {0}")]
    Provider(#[from] LlmError),
}

/// Progress notifications relayed while a crew runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrewProgress {
    AgentActive(String),
    PhaseComplete,
}

impl fmt::Display for CrewProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrewProgress::AgentActive(agent) => write!(f, "{agent} is active..."),
            CrewProgress::PhaseComplete => f.write_str("Phase complete."),
        }
    }
}

/// Callback receiving crew progress. Must not block.
pub type ProgressFn<'a> = &'a (dyn Fn(CrewProgress) + Send + Sync);

/// No-op progress sink for callers that do not relay progress.
pub fn ignore_progress(_: CrewProgress) {}

#[async_trait]
pub trait CrewDelegate: Send + Sync {
    async fn run(
        &self,
        instruction: &str,
        context_path: &str,
        progress: ProgressFn<'_>,
        history: &[LlmMessage],
    ) -> Result<String, CrewError>;
}

/// `- ROLE: <first 200 chars>...` per turn, under a heading. Empty when
/// there is no history.
pub fn summarize_history(history: &[LlmMessage]) -> String {
    if history.is_empty() {
        return String::new();
    }
    let lines: Vec<String> = history
        .iter()
        .map(|m| {
            let head: String = m.content.chars().take(200).collect();
            format!("- {}: {head}...", m.role.to_string().to_uppercase())
        })
        .collect();
    format!("\nCONVERSATION HISTORY:\n{}", lines.join("\n"))
}

// ===========================================================================
// DisabledCrew
// ===========================================================================

/// Always fails, sending every request down the fallback path.
#[derive(Debug, Default)]
pub struct DisabledCrew;

#[async_trait]
impl CrewDelegate for DisabledCrew {
    async fn run(
        &self,
        _instruction: &str,
        _context_path: &str,
        _progress: ProgressFn<'_>,
        _history: &[LlmMessage],
    ) -> Result<String, CrewError> {
        Err(CrewError::Unavailable("crew delegation is disabled".into()))
    }
}

// ===========================================================================
// LlmCrew
// ===========================================================================

/// Two-task crew: an engineer refactors with the target's contents in hand,
/// then a communicator verifies and writes the final report. When the target
/// is a single file and both tasks succeed, the engineer's code is written
/// back to it.
pub struct LlmCrew {
    engineer: Agent,
    writer: Agent,
    backup_enabled: bool,
    dry_run: bool,
}

impl LlmCrew {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            engineer: Agent::new(AgentRole::Refactor, provider.clone(), config.clone()),
            writer: Agent::new(AgentRole::Reporting, provider, config),
            backup_enabled: true,
            dry_run: false,
        }
    }

    pub fn with_backup(mut self, enabled: bool) -> Self {
        self.backup_enabled = enabled;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// What the crew's file tools would show for `context_path`: file
    /// contents for a file, a listing for a directory, nothing otherwise.
    fn inspect(context_path: &str) -> String {
        if context_path.is_empty() {
            return String::new();
        }
        let path = Path::new(context_path);
        if path.is_file() {
            match file_ops::read_file(path) {
                Ok(content) => format!("--- {context_path} ---\n{content}\n"),
                Err(e) => e.to_string(),
            }
        } else if path.is_dir() {
            let listing: Vec<String> = file_ops::list_files(path, DEFAULT_EXCLUDED_DIRS, None)
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            format!("Files under {context_path}:\n{}\n", listing.join("\n"))
        } else {
            String::new()
        }
    }

    async fn run_task(
        agent: &Agent,
        persona: &Persona,
        description: &str,
        progress: ProgressFn<'_>,
    ) -> Result<String, CrewError> {
        progress(CrewProgress::AgentActive(persona.role.to_string()));
        let out = agent.try_ask(&persona.system_prompt(), description, &[]).await?;
        progress(CrewProgress::PhaseComplete);
        Ok(out)
    }

    fn write_back(&self, context_path: &str, refactor_output: &str) {
        let path = Path::new(context_path);
        if context_path.is_empty() || !path.is_file() {
            return;
        }
        let Some(code) = extract_code_block(refactor_output) else {
            return;
        };
        if self.dry_run {
            info!(path = %context_path, "dry run: crew changes not written");
            return;
        }
        match file_ops::write_file_safely(path, &code, self.backup_enabled) {
            Ok(report) => info!(path = %context_path, backup = ?report.backup, "crew wrote refactored code"),
            Err(e) => warn!(path = %context_path, error = %e, "crew write-back failed"),
        }
    }
}

#[async_trait]
impl CrewDelegate for LlmCrew {
    async fn run(
        &self,
        instruction: &str,
        context_path: &str,
        progress: ProgressFn<'_>,
        history: &[LlmMessage],
    ) -> Result<String, CrewError> {
        let path_desc = if context_path.is_empty() {
            "provided".to_string()
        } else {
            format!("at {context_path}")
        };

        let refactor_task = format!(
            "{}\n\nAnalyze and immediately refactor the code for: {instruction}. Use context {path_desc}. \
             Provide the full optimized code and a summary of what you did.\n\n{}",
            summarize_history(history),
            Self::inspect(context_path),
        );
        let refactored =
            Self::run_task(&self.engineer, &CREW_ENGINEER, &refactor_task, progress).await?;

        let review_task = format!("{CREW_REVIEW_TASK}\n\nPrevious task output:\n{refactored}");
        let report = Self::run_task(&self.writer, &CREW_WRITER, &review_task, progress).await?;

        // Only a completed chain touches the target.
        self.write_back(context_path, &refactored);
        Ok(report)
    }
}

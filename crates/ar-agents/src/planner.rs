//! Planner agent, plan parsing and task routing.
//!
//! Planner output is untrusted text. [`parse_plan`] takes the span from the
//! first `[` to the last `]`, deserializes it leniently, and falls back to
//! [`default_plan`] on any failure or an empty list.

use std::borrow::Cow;
use std::sync::Arc;

use ar_intelligence::llm::{LlmConfig, LlmProvider};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, warn};

use crate::agent::{Agent, AgentRole};
use crate::prompts::{self, render};

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// One planned step. Priority is advisory and never reorders execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanTask {
    #[serde(default, deserialize_with = "lenient_string")]
    pub agent: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(default, deserialize_with = "lenient_priority")]
    pub priority: Option<u8>,
}

impl PlanTask {
    pub fn new(agent: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            description: description.into(),
            priority: None,
        }
    }

    pub fn route(&self) -> TaskRoute {
        TaskRoute::from_agent_field(&self.agent)
    }
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn lenient_priority<'de, D: Deserializer<'de>>(d: D) -> Result<Option<u8>, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(value
        .as_u64()
        .filter(|p| (1..=5).contains(p))
        .and_then(|p| u8::try_from(p).ok()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanSource {
    Planner,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub tasks: Vec<PlanTask>,
    pub source: PlanSource,
}

impl Plan {
    /// A lone task whose agent is exactly `chat` (any case): its output is
    /// returned as the report directly. Names that merely contain "chat"
    /// still dispatch to the chat agent but get a final report.
    pub fn is_chat_only(&self) -> bool {
        self.tasks.len() == 1 && self.tasks[0].agent.to_lowercase() == "chat"
    }
}

/// Analysis, Refactor, QA, TestGen, Doc. Final reporting happens after the
/// plan runs.
pub fn default_plan() -> Plan {
    Plan {
        tasks: vec![
            PlanTask::new("Analysis", "Analyze provided code."),
            PlanTask::new("Refactor", "Apply refactorings."),
            PlanTask::new("QA", "Review changes."),
            PlanTask::new("TestGen", "Generate unit tests."),
            PlanTask::new("Doc", "Generate documentation."),
        ],
        source: PlanSource::Default,
    }
}

/// Parse raw planner output, tolerating prose or markdown around the array.
pub fn parse_plan(raw: &str) -> Plan {
    let span = match (raw.find('['), raw.rfind(']')) {
        (Some(start), Some(end)) if start < end => &raw[start..=end],
        _ => {
            warn!("planner output has no JSON array; using default plan");
            return default_plan();
        }
    };

    match serde_json::from_str::<Vec<PlanTask>>(span) {
        Ok(tasks) if !tasks.is_empty() => {
            debug!(tasks = tasks.len(), "plan parsed");
            Plan {
                tasks,
                source: PlanSource::Planner,
            }
        }
        Ok(_) => {
            warn!("planner returned an empty plan; using default plan");
            default_plan()
        }
        Err(e) => {
            warn!(error = %e, "failed to parse plan; using default plan");
            default_plan()
        }
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Where a task is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskRoute {
    Analysis,
    Refactor,
    Qa,
    TestGen,
    Doc,
    Reporting,
    Chat,
    /// Carries the lowercased agent field.
    Unknown(String),
}

impl TaskRoute {
    /// Case-insensitive substring match, first hit wins, in the order
    /// analysis, refactor, qa, testgen/test, doc, reporting, chat.
    pub fn from_agent_field(agent: &str) -> Self {
        let name = agent.to_lowercase();
        if name.contains("analysis") {
            TaskRoute::Analysis
        } else if name.contains("refactor") {
            TaskRoute::Refactor
        } else if name.contains("qa") {
            TaskRoute::Qa
        } else if name.contains("testgen") || name.contains("test") {
            TaskRoute::TestGen
        } else if name.contains("doc") {
            TaskRoute::Doc
        } else if name.contains("reporting") {
            TaskRoute::Reporting
        } else if name.contains("chat") {
            TaskRoute::Chat
        } else {
            TaskRoute::Unknown(name)
        }
    }

}

// ===========================================================================
// PlannerAgent
// ===========================================================================

pub struct PlannerAgent {
    agent: Agent,
    context_budget: usize,
}

impl PlannerAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            agent: Agent::new(AgentRole::Planner, provider, config),
            context_budget: 2000,
        }
    }

    /// Character budget for the codebase context embedded in the prompt.
    pub fn with_context_budget(mut self, chars: usize) -> Self {
        self.context_budget = chars;
        self
    }

    pub async fn run(&self, instruction: &str, codebase_context: &str) -> String {
        let context = truncate_context(codebase_context, self.context_budget);
        let system = render(prompts::PLANNER_SYSTEM_PROMPT, &[("context", &context)]);
        self.agent
            .ask(&system, &format!("User Request: {instruction}"), &[])
            .await
    }
}

/// First `budget` characters of `context`, with `...` appended when cut.
pub fn truncate_context(context: &str, budget: usize) -> Cow<'_, str> {
    match context.char_indices().nth(budget) {
        Some((idx, _)) => Cow::Owned(format!("{}...", &context[..idx])),
        None => Cow::Borrowed(context),
    }
}

//! Agent core shared by every role.
//!
//! An [`Agent`] frames a conversation (one system turn, caller history, the
//! current user turn) and forwards it to the injected provider. Provider
//! failures never escape: they become `"Error: <cause>"` text.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

use ar_intelligence::llm::{LlmConfig, LlmError, LlmMessage, LlmProvider, LlmRole};
use futures_util::{stream, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Fragments of one streamed reply. Failures are already rendered as
/// `"Error: ..."` fragments.
pub type FragmentStream = Pin<Box<dyn Stream<Item = String> + Send>>;

// ---------------------------------------------------------------------------
// AgentRole
// ---------------------------------------------------------------------------

/// Closed set of roles. The canonical name is what planner output is matched
/// against; the description only frames prompts and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Chat,
    Analysis,
    Planner,
    Refactor,
    Qa,
    TestGen,
    Doc,
    Reporting,
}

impl AgentRole {
    pub fn name(&self) -> &'static str {
        match self {
            AgentRole::Chat => "Chat",
            AgentRole::Analysis => "Analysis",
            AgentRole::Planner => "Planner",
            AgentRole::Refactor => "Refactor",
            AgentRole::Qa => "QA",
            AgentRole::TestGen => "TestGen",
            AgentRole::Doc => "Doc",
            AgentRole::Reporting => "Reporting",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            AgentRole::Chat => "Friendly AI Assistant",
            AgentRole::Analysis => "Senior Code Reviewer",
            AgentRole::Planner => "Technical Architect",
            AgentRole::Refactor => "Expert Software Engineer",
            AgentRole::Qa => "Quality Assurance Lead",
            AgentRole::TestGen => "Test Engineer",
            AgentRole::Doc => "Technical Writer",
            AgentRole::Reporting => "Technical Project Manager",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct Agent {
    role: AgentRole,
    provider: Arc<dyn LlmProvider>,
    config: LlmConfig,
}

impl Agent {
    pub fn new(role: AgentRole, provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            role,
            provider,
            config,
        }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Build `[system, history..., user]`. System turns inside `history` are
    /// dropped so the conversation holds exactly one, first.
    pub fn conversation(system: &str, history: &[LlmMessage], user: &str) -> Vec<LlmMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(LlmMessage::system(system));
        messages.extend(
            history
                .iter()
                .filter(|m| m.role != LlmRole::System)
                .cloned(),
        );
        messages.push(LlmMessage::user(user));
        messages
    }

    /// Blocking completion that reports provider failures to the caller.
    pub async fn try_ask(
        &self,
        system: &str,
        user: &str,
        history: &[LlmMessage],
    ) -> Result<String, LlmError> {
        let messages = Self::conversation(system, history, user);
        debug!(role = %self.role, turns = messages.len(), "sending completion");
        let resp = self.provider.complete(&messages, &self.config).await?;
        Ok(resp.content)
    }

    /// Blocking completion; failures come back as `"Error: <cause>"`.
    pub async fn ask(&self, system: &str, user: &str, history: &[LlmMessage]) -> String {
        match self.try_ask(system, user, history).await {
            Ok(text) => text,
            Err(e) => {
                warn!(role = %self.role, error = %e, "completion failed");
                format!("Error: {e}")
            }
        }
    }

    /// Streaming completion. Providers without streaming degrade to a single
    /// fragment holding the blocking result.
    pub async fn ask_stream(
        &self,
        system: &str,
        user: &str,
        history: &[LlmMessage],
    ) -> FragmentStream {
        let messages = Self::conversation(system, history, user);
        match self.provider.stream(&messages, &self.config).await {
            Ok(inner) => {
                let role = self.role;
                Box::pin(inner.map(move |item| match item {
                    Ok(fragment) => fragment,
                    Err(e) => {
                        warn!(role = %role, error = %e, "stream interrupted");
                        format!("Error: {e}")
                    }
                }))
            }
            Err(LlmError::Unsupported(reason)) => {
                debug!(role = %self.role, %reason, "streaming unsupported; using blocking completion");
                let text = self.ask(system, user, history).await;
                Box::pin(stream::iter([text]))
            }
            Err(e) => {
                warn!(role = %self.role, error = %e, "stream failed to start");
                Box::pin(stream::iter([format!("Error: {e}")]))
            }
        }
    }
}

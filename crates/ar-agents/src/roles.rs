use std::fmt;
use std::sync::Arc;

use ar_core::language::LanguageProfile;
use ar_intelligence::llm::{LlmConfig, LlmMessage, LlmProvider};
use serde::{Deserialize, Serialize};

use crate::agent::{Agent, AgentRole, FragmentStream};
use crate::prompts::{self, render};

// ---------------------------------------------------------------------------
// Task parameters
// ---------------------------------------------------------------------------

/// Documentation subtype requested from the doc agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    #[default]
    Docstring,
    Module,
    Architecture,
    Api,
    Readme,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Docstring => "docstring",
            DocType::Module => "module",
            DocType::Architecture => "architecture",
            DocType::Api => "api",
            DocType::Readme => "readme",
        }
    }

    /// Pick a subtype from a task description. Checked in order
    /// architecture, readme, api; anything else is a docstring request.
    pub fn from_description(description: &str) -> Self {
        let d = description.to_lowercase();
        if d.contains("architecture") {
            DocType::Architecture
        } else if d.contains("readme") {
            DocType::Readme
        } else if d.contains("api") {
            DocType::Api
        } else {
            DocType::Docstring
        }
    }
}

impl fmt::Display for DocType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestType {
    #[default]
    Unit,
    Integration,
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestType::Unit => f.write_str("unit"),
            TestType::Integration => f.write_str("integration"),
        }
    }
}

fn framework_for(language: &str) -> &'static str {
    let profile = LanguageProfile::for_language(language);
    if profile.is_generic() {
        "the idiomatic framework for the language"
    } else {
        profile.test_framework
    }
}

// ===========================================================================
// ChatAgent: free-form conversation
// ===========================================================================

pub struct ChatAgent {
    agent: Agent,
}

impl ChatAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            agent: Agent::new(AgentRole::Chat, provider, config),
        }
    }

    fn user_prompt(instruction: &str, context: &str) -> String {
        format!("User Message: {instruction}\n\nContext (if any): {context}")
    }

    pub async fn run(&self, instruction: &str, context: &str, history: &[LlmMessage]) -> String {
        self.agent
            .ask(
                prompts::CHAT_SYSTEM_PROMPT,
                &Self::user_prompt(instruction, context),
                history,
            )
            .await
    }

    pub async fn run_stream(
        &self,
        instruction: &str,
        context: &str,
        history: &[LlmMessage],
    ) -> FragmentStream {
        self.agent
            .ask_stream(
                prompts::CHAT_SYSTEM_PROMPT,
                &Self::user_prompt(instruction, context),
                history,
            )
            .await
    }
}

// ===========================================================================
// AnalysisAgent: structured findings report
// ===========================================================================

pub struct AnalysisAgent {
    agent: Agent,
}

impl AnalysisAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            agent: Agent::new(AgentRole::Analysis, provider, config),
        }
    }

    pub async fn run(&self, files_content: &str) -> String {
        self.agent
            .ask(
                prompts::ANALYSIS_SYSTEM_PROMPT,
                &format!("Code for analysis:\n\n{files_content}"),
                &[],
            )
            .await
    }
}

// ===========================================================================
// RefactorAgent: one fenced block with the full modified code
// ===========================================================================

pub struct RefactorAgent {
    agent: Agent,
}

impl RefactorAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            agent: Agent::new(AgentRole::Refactor, provider, config),
        }
    }

    pub fn system_prompt(language: &str) -> String {
        let conventions = prompts::conventions_line(&LanguageProfile::for_language(language));
        render(
            prompts::REFACTOR_SYSTEM_PROMPT,
            &[("language", language), ("conventions", &conventions)],
        )
    }

    fn user_prompt(code: &str, instruction: &str) -> String {
        format!("Original Code:\n\n{code}\n\nInstruction: {instruction}")
    }

    pub async fn run(
        &self,
        code: &str,
        instruction: &str,
        language: &str,
        history: &[LlmMessage],
    ) -> String {
        self.agent
            .ask(
                &Self::system_prompt(language),
                &Self::user_prompt(code, instruction),
                history,
            )
            .await
    }

    pub async fn run_stream(
        &self,
        code: &str,
        instruction: &str,
        language: &str,
        history: &[LlmMessage],
    ) -> FragmentStream {
        self.agent
            .ask_stream(
                &Self::system_prompt(language),
                &Self::user_prompt(code, instruction),
                history,
            )
            .await
    }
}

// ===========================================================================
// QaAgent: verdict report comparing original and refactored code
// ===========================================================================

pub struct QaAgent {
    agent: Agent,
}

impl QaAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            agent: Agent::new(AgentRole::Qa, provider, config),
        }
    }

    pub async fn run(&self, original: &str, refactored: &str, language: &str) -> String {
        let system = render(prompts::QA_SYSTEM_PROMPT, &[("language", language)]);
        self.agent
            .ask(
                &system,
                &format!("Original:\n{original}\n\nRefactored:\n{refactored}"),
                &[],
            )
            .await
    }
}

// ===========================================================================
// TestGenAgent: test code in one fenced block
// ===========================================================================

pub struct TestGenAgent {
    agent: Agent,
}

impl TestGenAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            agent: Agent::new(AgentRole::TestGen, provider, config),
        }
    }

    pub async fn run(&self, code: &str, language: &str, test_type: TestType) -> String {
        let test_type = test_type.to_string();
        let system = render(
            prompts::TESTGEN_SYSTEM_PROMPT,
            &[
                ("language", language),
                ("test_type", &test_type),
                ("framework", framework_for(language)),
            ],
        );
        self.agent
            .ask(
                &system,
                &format!("Generate {test_type} tests for this code:\n\n{code}"),
                &[],
            )
            .await
    }

    /// Full suite: happy path, edge cases, error handling, integration.
    pub async fn generate_suite(&self, code: &str, language: &str) -> String {
        let system = render(
            prompts::TEST_SUITE_SYSTEM_PROMPT,
            &[("language", language), ("framework", framework_for(language))],
        );
        self.agent
            .ask(
                &system,
                &format!("Generate a comprehensive test suite for:\n\n{code}"),
                &[],
            )
            .await
    }
}

// ===========================================================================
// DocAgent
// ===========================================================================

pub struct DocAgent {
    agent: Agent,
}

impl DocAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            agent: Agent::new(AgentRole::Doc, provider, config),
        }
    }

    pub async fn run(&self, code: &str, doc_type: DocType, language: &str) -> String {
        let system = render(
            prompts::DOC_SYSTEM_PROMPT,
            &[("language", language), ("doc_type", doc_type.as_str())],
        );
        self.agent
            .ask(
                &system,
                &format!("Generate {doc_type} documentation for:\n\n{code}"),
                &[],
            )
            .await
    }
}

// ===========================================================================
// ReportingAgent: final synthesis over accumulated results
// ===========================================================================

pub struct ReportingAgent {
    agent: Agent,
}

impl ReportingAgent {
    pub fn new(provider: Arc<dyn LlmProvider>, config: LlmConfig) -> Self {
        Self {
            agent: Agent::new(AgentRole::Reporting, provider, config),
        }
    }

    pub async fn run(&self, raw_changes: &str) -> String {
        self.agent
            .ask(
                prompts::REPORTING_SYSTEM_PROMPT,
                &format!("Changes made:\n\n{raw_changes}"),
                &[],
            )
            .await
    }

    pub async fn run_stream(&self, raw_changes: &str) -> FragmentStream {
        self.agent
            .ask_stream(
                prompts::REPORTING_SYSTEM_PROMPT,
                &format!("Changes made:\n\n{raw_changes}"),
                &[],
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ar_intelligence::llm::{LlmRole, MockProvider};
    use futures_util::StreamExt;

    fn mock() -> Arc<MockProvider> {
        Arc::new(MockProvider::new())
    }

    #[test]
    fn doc_type_follows_description_precedence() {
        assert_eq!(
            DocType::from_description("Describe the Architecture and the API"),
            DocType::Architecture
        );
        assert_eq!(DocType::from_description("write a README"), DocType::Readme);
        assert_eq!(DocType::from_description("document the api"), DocType::Api);
        assert_eq!(DocType::from_description("Generate docs"), DocType::Docstring);
    }

    #[tokio::test]
    async fn refactor_prompt_carries_language_and_instruction() {
        let m = mock();
        let agent = RefactorAgent::new(m.clone(), LlmConfig::default());
        let history = vec![LlmMessage::user("before"), LlmMessage::assistant("ok")];
        agent.run("x=1", "rename x", "python", &history).await;

        let (messages, _) = &m.captured_requests()[0];
        assert_eq!(messages.len(), 4);
        assert!(messages[0].content.contains("Language: python"));
        assert!(messages[0].content.contains("PEP 8"));
        assert_eq!(
            messages[3].content,
            "Original Code:\n\nx=1\n\nInstruction: rename x"
        );
    }

    #[tokio::test]
    async fn qa_receives_both_versions_without_history() {
        let m = mock();
        QaAgent::new(m.clone(), LlmConfig::default())
            .run("old()", "new()", "go")
            .await;
        let (messages, _) = &m.captured_requests()[0];
        assert_eq!(messages.len(), 2);
        assert!(messages[0].content.contains("Language: go"));
        assert_eq!(messages[1].content, "Original:\nold()\n\nRefactored:\nnew()");
    }

    #[tokio::test]
    async fn testgen_uses_language_framework() {
        let m = mock();
        let agent = TestGenAgent::new(m.clone(), LlmConfig::default());
        agent.run("fn f() {}", "rust", TestType::Unit).await;
        agent.generate_suite("def f(): pass", "python").await;

        let captured = m.captured_requests();
        assert!(captured[0].0[0].content.contains("Test framework: cargo test"));
        assert!(captured[0].0[1].content.starts_with("Generate unit tests"));
        assert!(captured[1].0[0].content.contains("Happy path tests"));
        assert!(captured[1].0[0].content.contains("pytest"));
    }

    #[tokio::test]
    async fn doc_agent_names_subtype_in_both_prompts() {
        let m = mock();
        DocAgent::new(m.clone(), LlmConfig::default())
            .run("code", DocType::Readme, "python")
            .await;
        let (messages, _) = &m.captured_requests()[0];
        assert!(messages[0].content.contains("Request type: readme"));
        assert!(messages[1].content.starts_with("Generate readme documentation"));
    }

    #[tokio::test]
    async fn chat_forwards_history_and_streams() {
        let m = Arc::new(MockProvider::new().with_stream(["Hel", "lo"]));
        let chat = ChatAgent::new(m.clone(), LlmConfig::default());
        let history = vec![LlmMessage::assistant("prior")];
        let out: Vec<String> = chat.run_stream("hi", "", &history).await.collect().await;
        assert_eq!(out.concat(), "Hello");

        let (messages, _) = &m.captured_requests()[0];
        assert_eq!(messages[1].role, LlmRole::Assistant);
        assert_eq!(messages[2].content, "User Message: hi\n\nContext (if any): ");
    }

    #[tokio::test]
    async fn reporting_stream_falls_back_to_blocking() {
        let m = Arc::new(MockProvider::new().with_text("summary"));
        let out: Vec<String> = ReportingAgent::new(m, LlmConfig::default())
            .run_stream("=== ANALYSIS ===\nfine\n")
            .await
            .collect()
            .await;
        assert_eq!(out, vec!["summary"]);
    }
}

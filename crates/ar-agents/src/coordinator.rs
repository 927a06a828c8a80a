//! Coordinator -- turns an instruction plus an optional target path into a
//! report, choosing between a chat fast path, crew delegation and the
//! planner-driven agent chain.
//!
//! Blocking mode ([`Coordinator::execute`]) returns an [`ExecutionOutcome`].
//! Streaming mode ([`Coordinator::execute_stream`]) yields [`StreamEvent`]s
//! whose `Display` form is the wire format (`[STEP] ...`, `[START_REPORT]`,
//! raw chunks, `[FINAL_CODE]`).

use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use ar_core::artifacts::{change_summary, extract_code_block, unified_diff};
use ar_core::config::{Config, ConfigError, PipelineConfig};
use ar_core::file_ops::{self, FileOpError};
use ar_core::language::{detect_language, test_file_name, DEFAULT_LANGUAGE};
use ar_intelligence::llm::{LlmConfig, LlmMessage, LlmProvider};
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::crew::{ignore_progress, CrewDelegate, CrewProgress, DisabledCrew, LlmCrew};
use crate::planner::{parse_plan, Plan, PlanTask, PlannerAgent, TaskRoute};
use crate::roles::{
    AnalysisAgent, ChatAgent, DocAgent, DocType, QaAgent, RefactorAgent, ReportingAgent,
    TestGenAgent, TestType,
};

/// Write status recorded when dry-run suppresses persistence.
pub const DRY_RUN_STATUS: &str = "dry run: changes not written";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Construction failures. Execution itself never fails.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Request / outcome types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ExecutionRequest {
    /// Empty means "no target".
    pub target_path: String,
    pub instruction: String,
    pub history: Vec<LlmMessage>,
}

impl ExecutionRequest {
    pub fn new(target_path: impl Into<String>, instruction: impl Into<String>) -> Self {
        Self {
            target_path: target_path.into(),
            instruction: instruction.into(),
            history: Vec::new(),
        }
    }

    pub fn with_history(mut self, history: Vec<LlmMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn has_target(&self) -> bool {
        !self.target_path.is_empty()
    }

    fn word_count(&self) -> usize {
        self.instruction.split_whitespace().count()
    }
}

/// Which strategy produced the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    FastChat,
    Crew,
    Pipeline,
}

#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub route: Route,
    /// User-facing text.
    pub report: String,
    /// Present on the pipeline route only.
    pub plan: Option<Plan>,
    pub results: Vec<String>,
    pub write_status: Option<String>,
}

impl ExecutionOutcome {
    fn direct(route: Route, report: String) -> Self {
        Self {
            route,
            report,
            plan: None,
            results: Vec::new(),
            write_status: None,
        }
    }
}

/// One streaming event. `Display` renders the wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Step(String),
    ReportStart,
    Chunk(String),
    FinalCode(String),
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamEvent::Step(text) => write!(f, "[STEP] {text}\n"),
            StreamEvent::ReportStart => f.write_str("[START_REPORT]\n"),
            StreamEvent::Chunk(text) => f.write_str(text),
            StreamEvent::FinalCode(code) => write!(f, "\n[FINAL_CODE]\n{code}"),
        }
    }
}

pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// A generated test suite for one source file.
#[derive(Debug, Clone)]
pub struct GeneratedTests {
    pub language: &'static str,
    /// Raw agent output.
    pub response: String,
    /// The fenced block from `response`, if any.
    pub test_code: Option<String>,
    /// Conventional test file path beside the source.
    pub test_path: PathBuf,
}

// ---------------------------------------------------------------------------
// PipelineState
// ---------------------------------------------------------------------------

/// Per-request state threaded through the plan.
#[derive(Debug, Clone)]
pub struct PipelineState {
    original_code: String,
    current_code_state: String,
    results: Vec<String>,
    refactored_code: Option<String>,
}

impl PipelineState {
    pub fn new(original_code: String) -> Self {
        Self {
            current_code_state: original_code.clone(),
            original_code,
            results: Vec::new(),
            refactored_code: None,
        }
    }

    pub fn original_code(&self) -> &str {
        &self.original_code
    }

    pub fn current_code(&self) -> &str {
        &self.current_code_state
    }

    pub fn refactored_code(&self) -> Option<&str> {
        self.refactored_code.as_deref()
    }

    pub fn results(&self) -> &[String] {
        &self.results
    }

    pub fn push_result(&mut self, block: String) {
        self.results.push(block);
    }

    pub fn joined_results(&self) -> String {
        self.results.join("\n")
    }

    /// Record a refactor response. When it holds a fenced block, that block
    /// becomes the current code and, if both versions are non-empty, the
    /// result carries a diff labeled `label` and a change summary.
    pub fn apply_refactor(&mut self, response: &str, label: &str) {
        let Some(code) = extract_code_block(response) else {
            debug!("refactor response has no code block");
            self.push_result(format!("=== REFACTORING ===\n{response}\n"));
            return;
        };

        self.current_code_state = code.clone();
        let block = if !self.original_code.is_empty() && !code.is_empty() {
            let diff = unified_diff(&self.original_code, &code, label);
            let summary = change_summary(&self.original_code, &code);
            format!(
                "=== REFACTORING ===\n{response}\n\n=== DIFF ===\n{diff}\n\n=== SUMMARY ===\n{summary}\n"
            )
        } else {
            format!("=== REFACTORING ===\n{response}\n")
        };
        self.refactored_code = Some(code);
        self.push_result(block);
    }

    fn into_results(self) -> Vec<String> {
        self.results
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

pub struct Coordinator {
    chat: ChatAgent,
    analysis: AnalysisAgent,
    planner: PlannerAgent,
    refactor: RefactorAgent,
    qa: QaAgent,
    test_gen: TestGenAgent,
    doc: DocAgent,
    reporting: ReportingAgent,
    crew: Arc<dyn CrewDelegate>,
    pipeline: PipelineConfig,
}

impl Coordinator {
    /// Coordinator with default pipeline settings and an [`LlmCrew`] on the
    /// same provider.
    pub fn new(provider: Arc<dyn LlmProvider>, llm: LlmConfig) -> Self {
        let pipeline = PipelineConfig::default();
        let crew = LlmCrew::new(provider.clone(), llm.clone());
        Self {
            chat: ChatAgent::new(provider.clone(), llm.clone()),
            analysis: AnalysisAgent::new(provider.clone(), llm.clone()),
            planner: PlannerAgent::new(provider.clone(), llm.clone())
                .with_context_budget(pipeline.planner_context_chars),
            refactor: RefactorAgent::new(provider.clone(), llm.clone()),
            qa: QaAgent::new(provider.clone(), llm.clone()),
            test_gen: TestGenAgent::new(provider.clone(), llm.clone()),
            doc: DocAgent::new(provider.clone(), llm.clone()),
            reporting: ReportingAgent::new(provider, llm),
            crew: Arc::new(crew),
            pipeline,
        }
    }

    /// Build from validated configuration. `crew.enabled = false` selects
    /// [`DisabledCrew`]; `crew.model` overrides the crew's model.
    pub fn from_config(
        config: &Config,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let llm = LlmConfig::from(&config.provider);

        let crew: Arc<dyn CrewDelegate> = if config.crew.enabled {
            let mut crew_llm = llm.clone();
            if let Some(ref model) = config.crew.model {
                crew_llm.model = model.clone();
            }
            Arc::new(
                LlmCrew::new(provider.clone(), crew_llm)
                    .with_backup(config.pipeline.backup_enabled)
                    .with_dry_run(config.pipeline.dry_run),
            )
        } else {
            Arc::new(DisabledCrew)
        };

        Ok(Self::new(provider, llm)
            .with_pipeline_config(config.pipeline.clone())
            .with_crew(crew))
    }

    pub fn with_crew(mut self, crew: Arc<dyn CrewDelegate>) -> Self {
        self.crew = crew;
        self
    }

    pub fn with_pipeline_config(mut self, pipeline: PipelineConfig) -> Self {
        self.planner = self
            .planner
            .with_context_budget(pipeline.planner_context_chars);
        self.pipeline = pipeline;
        self
    }

    pub fn pipeline_config(&self) -> &PipelineConfig {
        &self.pipeline
    }

    // -----------------------------------------------------------------------
    // Blocking mode
    // -----------------------------------------------------------------------

    pub async fn execute(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        let request_id = Uuid::new_v4();
        self.execute_inner(request)
            .instrument(info_span!("execute", %request_id))
            .await
    }

    async fn execute_inner(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        info!(
            target_path = %request.target_path,
            instruction = %request.instruction,
            "starting request"
        );

        if !request.has_target() && request.word_count() < self.pipeline.chat_word_threshold {
            debug!("short instruction without target; chat fast path");
            let report = self
                .chat
                .run(&request.instruction, "", &request.history)
                .await;
            return ExecutionOutcome::direct(Route::FastChat, report);
        }

        match self
            .crew
            .run(
                &request.instruction,
                &request.target_path,
                &ignore_progress,
                &request.history,
            )
            .await
        {
            Ok(report) => {
                info!("crew delegation succeeded");
                return ExecutionOutcome::direct(Route::Crew, report);
            }
            Err(e) => warn!(error = %e, "crew delegation failed; falling back to plan chain"),
        }

        self.run_pipeline(request).await
    }

    async fn run_pipeline(&self, request: &ExecutionRequest) -> ExecutionOutcome {
        let files = self.gather_files(&request.target_path);
        let language = files
            .first()
            .map(|f| detect_language(f))
            .unwrap_or(DEFAULT_LANGUAGE);
        info!(language, files = files.len(), "context gathered");

        let context = build_context(&files);
        let label = files
            .first()
            .map(|f| f.display().to_string())
            .unwrap_or_else(|| "code".to_string());

        let raw_plan = self.planner.run(&request.instruction, &context).await;
        let plan = parse_plan(&raw_plan);
        info!(tasks = plan.tasks.len(), source = ?plan.source, "plan ready");

        let mut state = PipelineState::new(context);
        for task in &plan.tasks {
            self.dispatch(task, &mut state, language, &request.instruction, &label)
                .await;
        }

        let report = if plan.is_chat_only() {
            state.results().first().cloned().unwrap_or_default()
        } else {
            info!("generating final report");
            self.reporting.run(&state.joined_results()).await
        };

        let write_status = self.persist(&state, &files);
        ExecutionOutcome {
            route: Route::Pipeline,
            report,
            plan: Some(plan),
            results: state.into_results(),
            write_status,
        }
    }

    async fn dispatch(
        &self,
        task: &PlanTask,
        state: &mut PipelineState,
        language: &str,
        instruction: &str,
        label: &str,
    ) {
        let route = task.route();
        info!(agent = %task.agent, route = ?route, description = %task.description, "executing task");

        match route {
            TaskRoute::Analysis => {
                let res = self.analysis.run(state.current_code()).await;
                state.push_result(format!("=== ANALYSIS ===\n{res}\n"));
            }
            TaskRoute::Refactor => {
                let res = self
                    .refactor
                    .run(state.current_code(), &task.description, language, &[])
                    .await;
                state.apply_refactor(&res, label);
            }
            TaskRoute::Qa => {
                let res = self
                    .qa
                    .run(state.original_code(), state.current_code(), language)
                    .await;
                state.push_result(format!("=== QA REVIEW ===\n{res}\n"));
            }
            TaskRoute::TestGen => {
                let res = self
                    .test_gen
                    .run(state.current_code(), language, TestType::Unit)
                    .await;
                state.push_result(format!("=== TEST GENERATION ===\n{res}\n"));
            }
            TaskRoute::Doc => {
                let doc_type = DocType::from_description(&task.description);
                let res = self.doc.run(state.current_code(), doc_type, language).await;
                state.push_result(format!("=== DOCUMENTATION ({doc_type}) ===\n{res}\n"));
            }
            TaskRoute::Reporting => {
                let res = self.reporting.run(&state.joined_results()).await;
                state.push_result(format!("=== REPORT ===\n{res}\n"));
            }
            TaskRoute::Chat => {
                let res = self.chat.run(instruction, state.current_code(), &[]).await;
                state.push_result(res);
            }
            TaskRoute::Unknown(name) => {
                warn!(agent = %name, "no agent matches task");
                state.push_result(format!("Unknown agent: {name}"));
            }
        }
    }

    /// File target: itself. Directory: recursive listing minus excluded
    /// directory names. Anything else: nothing.
    fn gather_files(&self, target_path: &str) -> Vec<PathBuf> {
        if target_path.is_empty() {
            return Vec::new();
        }
        let path = Path::new(target_path);
        if path.is_file() {
            vec![path.to_path_buf()]
        } else if path.is_dir() {
            file_ops::list_files(path, &self.pipeline.excluded_dirs, None)
        } else {
            debug!(target_path, "target does not exist; no context gathered");
            Vec::new()
        }
    }

    fn persist(&self, state: &PipelineState, files: &[PathBuf]) -> Option<String> {
        let code = state.refactored_code().filter(|c| !c.is_empty())?;
        let target = files.first()?;

        if self.pipeline.dry_run {
            info!(path = %target.display(), "dry run; skipping write-back");
            return Some(DRY_RUN_STATUS.to_string());
        }

        let status = match file_ops::write_file_safely(target, code, self.pipeline.backup_enabled) {
            Ok(report) => report.to_string(),
            Err(e) => {
                warn!(path = %target.display(), error = %e, "write-back failed");
                e.to_string()
            }
        };
        info!(status = %status, "write-back finished");
        Some(status)
    }

    // -----------------------------------------------------------------------
    // Test suite generation
    // -----------------------------------------------------------------------

    /// Generate a full suite (happy path, edge cases, error handling,
    /// integration) for one source file. Nothing is written.
    pub async fn generate_tests(&self, source: &Path) -> Result<GeneratedTests, FileOpError> {
        let code = file_ops::read_file(source)?;
        let language = detect_language(source);
        info!(path = %source.display(), language, "generating test suite");

        let response = self.test_gen.generate_suite(&code, language).await;
        Ok(GeneratedTests {
            language,
            test_code: extract_code_block(&response),
            test_path: source.with_file_name(test_file_name(source, language)),
            response,
        })
    }

    // -----------------------------------------------------------------------
    // Streaming mode
    // -----------------------------------------------------------------------

    /// Start a streaming execution. The driver runs on its own task; dropping
    /// the returned stream stops emission but not cleanup.
    pub fn execute_stream(self: Arc<Self>, request: ExecutionRequest) -> EventStream {
        let (tx, rx) = flume::unbounded();
        let request_id = Uuid::new_v4();
        let span = info_span!("execute_stream", %request_id);

        tokio::spawn(
            async move {
                let mut out = Emitter { tx, open: true };
                self.drive_stream(request, &mut out).await;
            }
            .instrument(span),
        );

        Box::pin(rx.into_stream())
    }

    async fn drive_stream(&self, request: ExecutionRequest, out: &mut Emitter) {
        info!(target_path = %request.target_path, "starting streaming request");
        if !request.has_target() {
            self.stream_chat(&request, out).await;
        } else if Path::new(&request.target_path).is_file() {
            self.stream_single_file(&request, out).await;
        } else {
            self.stream_crew(request, out).await;
        }
    }

    async fn stream_chat(&self, request: &ExecutionRequest, out: &mut Emitter) {
        out.emit(StreamEvent::ReportStart).await;
        let mut chunks = self
            .chat
            .run_stream(&request.instruction, "", &request.history)
            .await;
        while let Some(chunk) = chunks.next().await {
            if !out.emit(StreamEvent::Chunk(chunk)).await {
                return;
            }
        }
    }

    async fn stream_single_file(&self, request: &ExecutionRequest, out: &mut Emitter) {
        let path = Path::new(&request.target_path);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| request.target_path.clone());
        out.emit(StreamEvent::Step(format!(
            "Rapidly analyzing and refactoring {name}..."
        )))
        .await;

        let content = file_ops::read_file(path).unwrap_or_else(|e| e.to_string());
        out.emit(StreamEvent::ReportStart).await;

        let mut chunks = self
            .refactor
            .run_stream(
                &content,
                &request.instruction,
                detect_language(path),
                &request.history,
            )
            .await;
        let mut full_response = String::new();
        while let Some(chunk) = chunks.next().await {
            full_response.push_str(&chunk);
            if !out.emit(StreamEvent::Chunk(chunk)).await {
                return;
            }
        }

        if let Some(code) = extract_code_block(&full_response) {
            out.emit(StreamEvent::FinalCode(code)).await;
        }
    }

    async fn stream_crew(&self, request: ExecutionRequest, out: &mut Emitter) {
        out.emit(StreamEvent::Step(
            "Complex task detected. Assembling Expert Crew...".into(),
        ))
        .await;

        let (tx, rx) = flume::unbounded::<CrewMessage>();
        let crew = Arc::clone(&self.crew);
        let ExecutionRequest {
            target_path,
            instruction,
            history,
        } = request;
        let crew_target = target_path.clone();

        let worker = tokio::spawn(
            async move {
                let progress_tx = tx.clone();
                let relay = move |p: CrewProgress| {
                    let _ = progress_tx.send(CrewMessage::Progress(p));
                };
                let message = match crew.run(&instruction, &crew_target, &relay, &history).await {
                    Ok(report) => CrewMessage::Finished(report),
                    Err(e) => CrewMessage::Failed(e.to_string()),
                };
                let _ = tx.send(message);
                let _ = tx.send(CrewMessage::Done);
            }
            .in_current_span(),
        );

        let mut settled = false;
        while let Ok(message) = rx.recv_async().await {
            match message {
                CrewMessage::Done => break,
                CrewMessage::Progress(p) => {
                    out.emit(StreamEvent::Step(p.to_string())).await;
                }
                CrewMessage::Finished(report) => {
                    settled = true;
                    out.emit(StreamEvent::ReportStart).await;
                    out.emit(StreamEvent::Chunk(report)).await;
                    let path = Path::new(&target_path);
                    if path.is_file() {
                        if let Ok(code) = file_ops::read_file(path) {
                            out.emit(StreamEvent::FinalCode(code)).await;
                        }
                    }
                }
                CrewMessage::Failed(e) => {
                    settled = true;
                    warn!(error = %e, "crew failed during streaming request");
                    emit_crew_error(out, &e).await;
                }
            }
        }

        if let Err(e) = worker.await {
            warn!(error = %e, "crew worker did not finish cleanly");
            if !settled {
                emit_crew_error(out, &e.to_string()).await;
            }
        }
    }
}

/// Context blob: `--- <path> ---\n<content>\n\n` per existing file. Read
/// failures contribute their diagnostic text instead of content.
pub fn build_context(files: &[PathBuf]) -> String {
    let mut context = String::new();
    for file in files.iter().filter(|f| f.exists()) {
        let content = file_ops::read_file(file).unwrap_or_else(|e| e.to_string());
        context.push_str(&format!("--- {} ---\n{}\n\n", file.display(), content));
    }
    context
}

// ---------------------------------------------------------------------------
// Streaming plumbing
// ---------------------------------------------------------------------------

/// Messages from the crew worker, ended by `Done`.
enum CrewMessage {
    Progress(CrewProgress),
    Finished(String),
    Failed(String),
    Done,
}

/// Sends events until the consumer goes away, then silently drops them.
struct Emitter {
    tx: flume::Sender<StreamEvent>,
    open: bool,
}

impl Emitter {
    /// Returns whether the consumer is still listening.
    async fn emit(&mut self, event: StreamEvent) -> bool {
        if self.open && self.tx.send_async(event).await.is_err() {
            debug!("stream consumer went away");
            self.open = false;
        }
        self.open
    }
}

async fn emit_crew_error(out: &mut Emitter, error: &str) {
    out.emit(StreamEvent::Step(format!("Error: {error}"))).await;
    out.emit(StreamEvent::ReportStart).await;
    out.emit(StreamEvent::Chunk(format!("I encountered an error: {error}")))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_rendering_of_events() {
        assert_eq!(StreamEvent::Step("go".into()).to_string(), "[STEP] go\n");
        assert_eq!(StreamEvent::ReportStart.to_string(), "[START_REPORT]\n");
        assert_eq!(StreamEvent::Chunk("raw".into()).to_string(), "raw");
        assert_eq!(
            StreamEvent::FinalCode("x = 1".into()).to_string(),
            "\n[FINAL_CODE]\nx = 1"
        );
    }

    #[test]
    fn refactor_with_block_updates_state_and_adds_diff() {
        let mut state = PipelineState::new("x=1\n".into());
        state.apply_refactor("Done:\n```python\nx = 1\n```", "calc.py");

        assert_eq!(state.current_code(), "x = 1");
        assert_eq!(state.refactored_code(), Some("x = 1"));
        assert_eq!(state.original_code(), "x=1\n");
        let block = &state.results()[0];
        assert!(block.starts_with("=== REFACTORING ===\nDone:"));
        assert!(block.contains("=== DIFF ===\n--- a/calc.py"));
        assert!(block.contains("=== SUMMARY ===\nadditions: 1, deletions: 1"));
    }

    #[test]
    fn refactor_without_block_leaves_code_untouched() {
        let mut state = PipelineState::new("orig".into());
        state.apply_refactor("I would rather not.", "code");
        assert_eq!(state.current_code(), "orig");
        assert!(state.refactored_code().is_none());
        assert_eq!(state.results(), ["=== REFACTORING ===\nI would rather not.\n"]);
    }

    #[test]
    fn refactor_of_empty_context_skips_diff() {
        let mut state = PipelineState::new(String::new());
        state.apply_refactor("```\nprint(1)\n```", "code");
        assert_eq!(state.refactored_code(), Some("print(1)"));
        assert!(!state.results()[0].contains("=== DIFF ==="));
    }

    #[test]
    fn later_refactor_without_block_keeps_earlier_code() {
        let mut state = PipelineState::new("a".into());
        state.apply_refactor("```\nb\n```", "code");
        state.apply_refactor("no code this time", "code");
        assert_eq!(state.current_code(), "b");
        assert_eq!(state.refactored_code(), Some("b"));
        assert_eq!(state.results().len(), 2);
    }

    #[test]
    fn request_word_count_and_target() {
        let req = ExecutionRequest::new("", "  hi   there  ");
        assert!(!req.has_target());
        assert_eq!(req.word_count(), 2);
        assert!(ExecutionRequest::new("src", "x").has_target());
    }
}

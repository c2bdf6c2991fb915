//! Agent orchestration
//!
//! One user request in tool mode goes through two steps:
//!
//! 1. [`Agent::prepare_tool_turn`] recalls similar lessons, builds the prompt,
//!    asks the model and parses its reply.
//! 2. [`Agent::resolve_tool_turn`] validates the call, asks for consent, runs
//!    the tool and records everything in the transcript.
//!
//! The split lets the REPL show a spinner around the slow part and print the
//! requested call before the confirmation prompt.

use crate::config::AgentConfig;
use crate::conversation::Transcript;
use crate::logging::SystemLogger;
use crate::memory::{Lesson, LessonStore, MemoryError, ScoredLesson};
use crate::parser::{self, ParseError, ParsedReply};
use crate::providers::{EmbeddingProvider, LlmProvider, ProviderError};
use crate::safety::{self, ConsentHandler, Severity};
use crate::tools::{canonical_tool_name, ToolRegistry};
use thiserror::Error;

pub const TOOL_SYSTEM_PROMPT: &str = r#"You are an expert assistant. Your job is to analyse the user's request and answer WITHOUT EXCEPTION in the JSON format below. Do not use ANY other format, text or explanation.

# REQUIRED OUTPUT FORMAT
Your answer must ONLY and ALWAYS have this nested structure:
{"type":"tool_call","tool_call":{"tool_name":"TOOL_NAME","params":{"PARAM_NAME":"VALUE"}}}

# COMMON MISTAKE (DO NOT DO THIS!)
Do NOT use a flat structure like the one below. It is WRONG:
```json
{
  "type": "tool_call",
  "tool_name": "run_shell_command",
  "params": {}
}
```

# CORRECT STRUCTURE
`tool_name` and `params` always go INSIDE a key named `tool_call`. Example:
```json
{
  "type": "tool_call",
  "tool_call": {
    "tool_name": "run_shell_command",
    "params": {
      "command": "ls -l"
    }
  }
}
```

# EXAMPLE
User Request: "list this directory"
YOUR ANSWER: {"type":"tool_call","tool_call":{"tool_name":"list_directory","params":{"file_path":"."}}}"#;

pub const CHAT_SYSTEM_PROMPT: &str = "You are a helpful chat assistant. Your only job is to talk with the user. Never use special formats, tags or tools.";

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Language model error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Lesson memory is not available in this session")]
    MemoryDisabled,
}

/// Tunables taken from the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct AgentOptions {
    pub top_k: usize,
    pub similarity_threshold: f64,
    pub history_limit: usize,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            top_k: 2,
            similarity_threshold: 0.0,
            history_limit: 16_000,
        }
    }
}

impl From<&AgentConfig> for AgentOptions {
    fn from(config: &AgentConfig) -> Self {
        Self {
            top_k: config.chroma.top_k,
            similarity_threshold: config.chroma.similarity_threshold,
            history_limit: config.agent.history_limit,
        }
    }
}

/// Result of the model round-trip, before anything runs
#[derive(Debug)]
pub struct PreparedTurn {
    pub input: String,
    /// Lessons that made it into the prompt
    pub recalled: Vec<ScoredLesson>,
    /// Memory lookup problems; the turn still went ahead
    pub memory_warning: Option<String>,
    pub raw_reply: String,
    pub parsed: Result<ParsedReply, ParseError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Executed { tool: String, output: String },
    Cancelled { tool: String },
    ToolFailed { tool: String, error: String },
    /// The call was refused before asking (no name, unknown tool, no command)
    Rejected { reason: String },
    /// The reply held no usable tool call
    Unparsed { error: String, raw: String },
}

impl TurnOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TurnOutcome::Executed { .. })
    }
}

/// What a finished turn did to training mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingEvent {
    NotTraining,
    Captured,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub training: TrainingEvent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrainingToggle {
    Started,
    Saved { id: String, lesson: Lesson },
    NothingCaptured,
}

#[derive(Debug, Default)]
enum Training {
    #[default]
    Off,
    Active {
        captured: Option<Lesson>,
    },
}

/// The agent
pub struct Agent<L: LlmProvider, E: EmbeddingProvider, S: LessonStore, C: ConsentHandler> {
    llm: L,
    embedder: E,
    memory: Option<S>,
    consent: C,
    tools: ToolRegistry,
    transcript: Transcript,
    options: AgentOptions,
    training: Training,
    audit: SystemLogger,
    session_id: String,
}

impl<L: LlmProvider, E: EmbeddingProvider, S: LessonStore, C: ConsentHandler> Agent<L, E, S, C> {
    pub fn new(llm: L, embedder: E, memory: Option<S>, consent: C, options: AgentOptions) -> Self {
        Self {
            llm,
            embedder,
            memory,
            consent,
            tools: ToolRegistry::new(),
            transcript: Transcript::new(options.history_limit),
            options,
            training: Training::Off,
            audit: SystemLogger::new(),
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn provider_name(&self) -> &str {
        self.llm.name()
    }

    pub fn has_memory(&self) -> bool {
        self.memory.is_some()
    }

    pub fn is_training(&self) -> bool {
        matches!(self.training, Training::Active { .. })
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn begin_session(&self, mode: &str) {
        self.audit.session_start(&self.session_id, mode, self.llm.name());
    }

    pub fn end_session(&self) {
        self.audit.session_end(&self.session_id);
    }

    /// Forget the conversation
    pub fn clear_history(&mut self) {
        self.transcript.clear();
    }

    /// Recall lessons, ask the model, parse the reply.
    ///
    /// Only a failed model call is an error. If it happens while training,
    /// training ends.
    pub async fn prepare_tool_turn(&mut self, input: &str) -> Result<PreparedTurn, AgentError> {
        let (recalled, memory_warning) = self.recall(input).await;
        let examples = format_examples(&recalled);

        self.transcript.push_user(input);
        let prompt = build_tool_prompt(
            &format!("{}\n\n{}", TOOL_SYSTEM_PROMPT, self.tools.tools_prompt()),
            &examples,
            &current_dir_display(),
            &self.transcript.render(),
            input,
        );

        let raw_reply = match self.llm.generate(&prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                self.abort_training();
                return Err(e.into());
            }
        };
        tracing::debug!(reply = %raw_reply, "model reply");

        Ok(PreparedTurn {
            input: input.to_string(),
            recalled,
            memory_warning,
            parsed: parser::parse_reply(&raw_reply),
            raw_reply,
        })
    }

    /// Validate, confirm and run the call from a prepared turn
    pub async fn resolve_tool_turn(&mut self, turn: PreparedTurn) -> TurnReport {
        let (outcome, executed_json) = match turn.parsed {
            Ok(reply) => {
                let outcome = self.run_tool_call(&reply).await;
                (outcome, Some(reply.json))
            }
            Err(e) => {
                let raw = match &e {
                    // An object without a call is recorded as the JSON itself
                    ParseError::MissingToolCall { .. } => parser::extract_json_object(&turn.raw_reply)
                        .unwrap_or(&turn.raw_reply)
                        .to_string(),
                    _ => turn.raw_reply.clone(),
                };
                self.transcript.push_error(&e.to_string(), &raw);
                let outcome = TurnOutcome::Unparsed {
                    error: e.to_string(),
                    raw,
                };
                (outcome, None)
            }
        };

        let training = if !self.is_training() {
            TrainingEvent::NotTraining
        } else if let (true, Some(json)) = (outcome.is_success(), executed_json) {
            self.training = Training::Active {
                captured: Some(Lesson::new(turn.input, json)),
            };
            TrainingEvent::Captured
        } else {
            self.training = Training::Off;
            TrainingEvent::Aborted
        };

        TurnReport { outcome, training }
    }

    async fn run_tool_call(&mut self, reply: &ParsedReply) -> TurnOutcome {
        let call = &reply.call;

        if call.tool_name.is_empty() {
            let reason = "Tool call without a tool name".to_string();
            self.transcript.push_error(&reason, "");
            return TurnOutcome::Rejected { reason };
        }

        if call.tool_name == "run_command" {
            tracing::warn!("model asked for 'run_command', using 'run_shell_command'");
        }
        let tool = canonical_tool_name(&call.tool_name).to_string();

        if !self.tools.contains(&tool) {
            let reason = format!("Unknown tool requested: {}", tool);
            self.transcript.push_error(&reason, "");
            return TurnOutcome::Rejected { reason };
        }

        let request = match safety::assess(call) {
            Ok(request) => request,
            Err(e) => {
                let reason = e.to_string();
                self.transcript.push_error(&reason, "");
                return TurnOutcome::Rejected { reason };
            }
        };

        self.audit.tool_requested(&self.session_id, &tool, &reply.json);

        if !self.consent.confirm(&request) {
            self.audit.tool_cancelled(&self.session_id, &tool, request.severity);
            self.transcript.push_cancelled(&reply.json);
            return TurnOutcome::Cancelled { tool };
        }

        if request.severity == Severity::Critical {
            let command = call.param("command").unwrap_or(&reply.json);
            self.audit.critical_approved(&self.session_id, &tool, command);
        } else {
            self.audit.tool_approved(&self.session_id, &tool, request.severity);
        }

        match self.tools.execute(&tool, &call.params).await {
            Ok(output) => {
                self.audit.tool_executed(&self.session_id, &tool, &reply.json);
                self.transcript.push_tool_result(&reply.json, &output);
                TurnOutcome::Executed { tool, output }
            }
            Err(e) => {
                let error = e.to_string();
                self.audit.tool_failed(&self.session_id, &tool, &error);
                self.transcript.push_tool_error(&reply.json, &error);
                TurnOutcome::ToolFailed { tool, error }
            }
        }
    }

    /// Chat mode: plain conversation, no tools
    pub async fn handle_chat_input(&mut self, input: &str) -> Result<String, AgentError> {
        self.transcript.push_user(input);
        let prompt = build_chat_prompt(
            CHAT_SYSTEM_PROMPT,
            &current_dir_display(),
            &self.transcript.render(),
            input,
        );

        let reply = self.llm.generate(&prompt).await?;
        let reply = reply.trim().to_string();
        self.transcript.push_assistant(&reply);
        Ok(reply)
    }

    /// Enter training, or leave it and save what was captured
    pub async fn toggle_training(&mut self) -> Result<TrainingToggle, AgentError> {
        match std::mem::take(&mut self.training) {
            Training::Off => {
                if self.memory.is_none() {
                    return Err(AgentError::MemoryDisabled);
                }
                self.training = Training::Active { captured: None };
                Ok(TrainingToggle::Started)
            }
            Training::Active { captured: None } => Ok(TrainingToggle::NothingCaptured),
            Training::Active {
                captured: Some(lesson),
            } => {
                let memory = self.memory.as_ref().ok_or(AgentError::MemoryDisabled)?;
                let embedding = self.embedder.embed(&lesson.user_request).await?;
                let id = uuid::Uuid::new_v4().to_string();
                memory.add(&id, &embedding, &lesson).await?;

                self.audit.lesson_saved(&self.session_id, &id, &lesson.user_request);
                Ok(TrainingToggle::Saved { id, lesson })
            }
        }
    }

    /// Every stored lesson
    pub async fn list_lessons(&self) -> Result<Vec<Lesson>, AgentError> {
        let memory = self.memory.as_ref().ok_or(AgentError::MemoryDisabled)?;
        Ok(memory.all().await?)
    }

    fn abort_training(&mut self) {
        if self.is_training() {
            tracing::debug!("training aborted");
            self.training = Training::Off;
        }
    }

    async fn recall(&self, input: &str) -> (Vec<ScoredLesson>, Option<String>) {
        let Some(memory) = &self.memory else {
            return (Vec::new(), None);
        };

        let embedding = match self.embedder.embed(input).await {
            Ok(embedding) => embedding,
            Err(e) => {
                return (
                    Vec::new(),
                    Some(format!("Could not embed the request, memory lookup skipped: {}", e)),
                )
            }
        };

        match memory.query(&embedding, self.options.top_k).await {
            Ok(found) => (
                filter_by_threshold(found, self.options.similarity_threshold),
                None,
            ),
            Err(e) => (Vec::new(), Some(format!("Memory lookup failed: {}", e))),
        }
    }
}

/// Keep lessons with `distance <= threshold`; a threshold of 0 keeps all
pub fn filter_by_threshold(lessons: Vec<ScoredLesson>, threshold: f64) -> Vec<ScoredLesson> {
    if threshold <= 0.0 {
        return lessons;
    }
    lessons
        .into_iter()
        .filter(|l| l.distance <= threshold)
        .collect()
}

/// Render recalled lessons as worked examples for the prompt
pub fn format_examples(lessons: &[ScoredLesson]) -> String {
    if lessons.is_empty() {
        return String::new();
    }

    let mut out = String::from("\n# SUCCESSFUL EXAMPLES\n");
    out.push_str("# Learn from these previously solved examples to complete the new task.\n");
    for (i, scored) in lessons.iter().enumerate() {
        out.push_str(&format!("# Example {}:\n", i + 1));
        out.push_str(&format!("#   User Request: \"{}\"\n", scored.lesson.user_request));
        out.push_str(&format!("#   Correct Tool Call: {}\n", scored.lesson.tool_call_json));
    }
    out
}

pub fn build_tool_prompt(system: &str, examples: &str, cwd: &str, history: &str, input: &str) -> String {
    format!(
        "{}\n{}\n\n# CURRENT WORKING DIRECTORY\n{}\n\n--- Previous Conversation ---\n{}\n---------------------\n\nUser Request: {}",
        system, examples, cwd, history, input
    )
}

pub fn build_chat_prompt(system: &str, cwd: &str, history: &str, input: &str) -> String {
    format!(
        "{}\n\n# CURRENT WORKING DIRECTORY\n{}\n\n--- Previous Conversation ---\n{}\n---------------------\n\nUser Request: {}",
        system, cwd, history, input
    )
}

fn current_dir_display() -> String {
    match std::env::current_dir() {
        Ok(dir) => dir.display().to_string(),
        Err(e) => {
            tracing::warn!("could not read the working directory: {}", e);
            "(unknown)".into()
        }
    }
}

//! Ajan Library
//!
//! A local-first assistant: a model running in Ollama turns requests into
//! tool calls, the user confirms each one, and successful calls can be taught
//! to a ChromaDB-backed lesson memory that is recalled as worked examples.

pub mod agent;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod logging;
pub mod memory;
pub mod parser;
pub mod providers;
pub mod repl;
pub mod safety;
pub mod tools;

pub use agent::{Agent, AgentError, AgentOptions, PreparedTurn, TrainingEvent, TrainingToggle, TurnOutcome, TurnReport};
pub use config::{AgentConfig, ConfigError, ConfigManager};
pub use conversation::Transcript;
pub use logging::{AuditEvent, EventId, LogLevel, SystemLogger};
pub use memory::{ChromaClient, Lesson, LessonStore, MemoryError, ScoredLesson};
pub use parser::{parse_reply, ParseError, ParsedReply, ToolCall};
pub use providers::{EmbeddingProvider, LlmProvider, Ollama, OpenAiCompatible, ProviderError};
pub use safety::{assess, ConfirmationRequest, ConsentHandler, SafetyError, Severity};
pub use tools::{ToolError, ToolParams, ToolRegistry};

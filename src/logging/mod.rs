//! Audit logging
//!
//! Every tool the model asks for leaves a trace: requested, approved or
//! cancelled, executed or failed. On Linux events go to syslog (facility
//! LOCAL0) as well as `tracing`; elsewhere only to `tracing`.
//!
//! Filter with `journalctl -t ajan`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

const MAX_COMMAND_CHARS: usize = 500;

/// Event IDs for filtering in system logs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum EventId {
    // Informational (1000-1099)
    SessionStart = 1000,
    SessionEnd = 1001,
    ToolRequested = 1010,
    ToolApproved = 1011,
    ToolExecuted = 1012,
    LessonSaved = 1020,

    // Warnings (1100-1199)
    CriticalApproved = 1100,
    ToolCancelled = 1110,

    // Errors (1200-1299)
    ToolFailed = 1200,
}

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Structured audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_id: EventId,
    pub level: LogLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approved: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl AuditEvent {
    pub fn new(event_id: EventId, level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            event_id,
            level,
            message: message.into(),
            tool: None,
            command: None,
            severity: None,
            approved: None,
            reason: None,
            session_id: None,
        }
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_command(mut self, cmd: impl Into<String>) -> Self {
        let cmd: String = cmd.into();
        self.command = Some(cmd.chars().take(MAX_COMMAND_CHARS).collect());
        self
    }

    pub fn with_severity(mut self, severity: impl fmt::Display) -> Self {
        self.severity = Some(severity.to_string());
        self
    }

    pub fn with_approved(mut self, approved: bool) -> Self {
        self.approved = Some(approved);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Format for syslog-style output
    pub fn to_syslog_format(&self) -> String {
        let mut parts = vec![
            format!("AJAN[{}]", self.event_id as u32),
            format!("level={}", self.level),
        ];

        if let Some(ref tool) = self.tool {
            parts.push(format!("tool={}", tool));
        }
        if let Some(ref cmd) = self.command {
            let escaped = cmd.replace('"', "\\\"").replace('\n', " ");
            parts.push(format!("cmd=\"{}\"", escaped));
        }
        if let Some(ref severity) = self.severity {
            parts.push(format!("severity={}", severity));
        }
        if let Some(approved) = self.approved {
            parts.push(format!("approved={}", if approved { "yes" } else { "no" }));
        }
        if let Some(ref reason) = self.reason {
            let escaped = reason.replace('"', "\\\"").replace('\n', " ");
            parts.push(format!("reason=\"{}\"", escaped));
        }
        if let Some(ref session) = self.session_id {
            parts.push(format!("session={}", session.chars().take(8).collect::<String>()));
        }

        parts.push(format!("msg={}", self.message));
        parts.join(" ")
    }
}

/// Mirror an audit line into `tracing`
fn trace_event(level: LogLevel, message: &str) {
    match level {
        LogLevel::Info => tracing::info!("{}", message),
        LogLevel::Warning => tracing::warn!("{}", message),
        LogLevel::Error => tracing::error!("{}", message),
    }
}

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::SystemLogger;

#[cfg(not(target_os = "linux"))]
mod fallback;
#[cfg(not(target_os = "linux"))]
pub use fallback::SystemLogger;

/// Convenience functions
impl SystemLogger {
    pub fn session_start(&self, session: &str, mode: &str, model: &str) {
        self.log(
            AuditEvent::new(
                EventId::SessionStart,
                LogLevel::Info,
                format!("Session started in {} mode with {}", mode, model),
            )
            .with_session(session),
        );
    }

    pub fn session_end(&self, session: &str) {
        self.log(
            AuditEvent::new(EventId::SessionEnd, LogLevel::Info, "Session ended").with_session(session),
        );
    }

    pub fn tool_requested(&self, session: &str, tool: &str, detail: &str) {
        self.log(
            AuditEvent::new(EventId::ToolRequested, LogLevel::Info, "Tool requested")
                .with_tool(tool)
                .with_command(detail)
                .with_session(session),
        );
    }

    pub fn tool_approved(&self, session: &str, tool: &str, severity: impl fmt::Display) {
        self.log(
            AuditEvent::new(EventId::ToolApproved, LogLevel::Info, "Tool approved")
                .with_tool(tool)
                .with_severity(severity)
                .with_approved(true)
                .with_session(session),
        );
    }

    pub fn critical_approved(&self, session: &str, tool: &str, command: &str) {
        self.log(
            AuditEvent::new(
                EventId::CriticalApproved,
                LogLevel::Warning,
                "Critical command approved by user",
            )
            .with_tool(tool)
            .with_command(command)
            .with_severity("critical")
            .with_approved(true)
            .with_session(session),
        );
    }

    pub fn tool_cancelled(&self, session: &str, tool: &str, severity: impl fmt::Display) {
        self.log(
            AuditEvent::new(EventId::ToolCancelled, LogLevel::Info, "Tool cancelled by user")
                .with_tool(tool)
                .with_severity(severity)
                .with_approved(false)
                .with_session(session),
        );
    }

    pub fn tool_executed(&self, session: &str, tool: &str, detail: &str) {
        self.log(
            AuditEvent::new(EventId::ToolExecuted, LogLevel::Info, "Tool executed")
                .with_tool(tool)
                .with_command(detail)
                .with_session(session),
        );
    }

    pub fn tool_failed(&self, session: &str, tool: &str, error: &str) {
        self.log(
            AuditEvent::new(EventId::ToolFailed, LogLevel::Error, "Tool failed")
                .with_tool(tool)
                .with_reason(error)
                .with_session(session),
        );
    }

    pub fn lesson_saved(&self, session: &str, lesson_id: &str, request: &str) {
        self.log(
            AuditEvent::new(
                EventId::LessonSaved,
                LogLevel::Info,
                format!("Lesson {} saved", lesson_id),
            )
            .with_command(request)
            .with_session(session),
        );
    }
}

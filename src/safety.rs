//! Confirmation gating
//!
//! Nothing runs without the user saying yes. This module decides how loudly
//! to ask: every tool call is assessed into a [`ConfirmationRequest`] whose
//! severity drives the prompt text and whether auto-approval is allowed.

use crate::parser::ToolCall;
use crate::tools::canonical_tool_name;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SafetyError {
    #[error("run_shell_command was requested without a 'command' parameter")]
    MissingCommand,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Read-only or harmless
    Routine,
    /// Modifies files or runs a command
    Caution,
    /// Privileged or destructive, never auto-approved
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Routine => write!(f, "routine"),
            Severity::Caution => write!(f, "caution"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// What the user is asked before a tool runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub tool_name: String,
    pub severity: Severity,
    pub message: String,
}

/// Asks the user whether a tool call may run
pub trait ConsentHandler: Send + Sync {
    fn confirm(&self, request: &ConfirmationRequest) -> bool;
}

impl<T: ConsentHandler + ?Sized> ConsentHandler for Box<T> {
    fn confirm(&self, request: &ConfirmationRequest) -> bool {
        (**self).confirm(request)
    }
}

// Also catches absolute paths (`/usr/bin/sudo`) and quoted `sh -c 'sudo ..'`
static SUDO: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(^|[\s;&|(`/'"])sudo(\s|$|['"])"#).ok());

static DESTRUCTIVE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // rm with any options aimed at / (split flags, --no-preserve-root)
        r"\brm\s+(-{1,2}[a-zA-Z-]+\s+)+/(\*|\s|[;&|]|$)",
        // Filesystem creation
        r"\bmkfs(\.\w+)?\b",
        // Raw disk writes
        r"\bdd\s+if=",
        r">\s*/dev/sd[a-z]",
        // Fork bomb
        r":\(\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
});

pub fn uses_sudo(command: &str) -> bool {
    SUDO.as_ref().map(|re| re.is_match(command)).unwrap_or(false)
}

pub fn is_destructive(command: &str) -> bool {
    DESTRUCTIVE_PATTERNS.iter().any(|re| re.is_match(command))
}

/// Build the confirmation prompt for a tool call
pub fn assess(call: &ToolCall) -> Result<ConfirmationRequest, SafetyError> {
    let tool_name = canonical_tool_name(&call.tool_name).to_string();
    let file_path = call.param("file_path").unwrap_or("");

    let (severity, message) = match tool_name.as_str() {
        "write_file" => (
            Severity::Caution,
            format!(
                "'{}' will be written. If it exists its contents will be OVERWRITTEN. Continue?",
                file_path
            ),
        ),
        "append_file" => (
            Severity::Caution,
            format!("Content will be appended to the end of '{}'. Continue?", file_path),
        ),
        "run_shell_command" => {
            let command = call
                .param("command")
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .ok_or(SafetyError::MissingCommand)?;

            if uses_sudo(command) || is_destructive(command) {
                (
                    Severity::Critical,
                    format!(
                        "EXTREMELY DANGEROUS: this command can change or destroy your system.\nCommand: {}\nAre you absolutely sure you want to run it?",
                        command
                    ),
                )
            } else {
                (
                    Severity::Caution,
                    format!("The following command will be run:\n{}\nContinue?", command),
                )
            }
        }
        _ => {
            let mut params: Vec<_> = call.params.iter().collect();
            params.sort();
            let rendered = params
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", ");
            (
                Severity::Routine,
                format!("Run '{}' with parameters [{}]?", tool_name, rendered),
            )
        }
    };

    Ok(ConfirmationRequest {
        tool_name,
        severity,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolParams;

    fn call(tool: &str, pairs: &[(&str, &str)]) -> ToolCall {
        let params: ToolParams = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ToolCall::new(tool, params)
    }

    #[test]
    fn test_write_and_append_warnings() {
        let write = assess(&call("write_file", &[("file_path", "a.txt"), ("content", "x")])).unwrap();
        assert_eq!(write.severity, Severity::Caution);
        assert!(write.message.contains("OVERWRITTEN"));
        assert!(write.message.contains("a.txt"));

        let append = assess(&call("append_file", &[("file_path", "b.txt")])).unwrap();
        assert_eq!(append.severity, Severity::Caution);
        assert!(append.message.contains("appended"));
    }

    #[test]
    fn test_shell_commands() {
        let plain = assess(&call("run_shell_command", &[("command", "ls -la")])).unwrap();
        assert_eq!(plain.severity, Severity::Caution);
        assert!(plain.message.contains("ls -la"));

        let sudo = assess(&call("run_command", &[("command", "sudo apt update")])).unwrap();
        assert_eq!(sudo.severity, Severity::Critical);
        assert_eq!(sudo.tool_name, "run_shell_command");
        assert!(sudo.message.contains("EXTREMELY DANGEROUS"));
    }

    #[test]
    fn test_missing_command() {
        assert_eq!(
            assess(&call("run_shell_command", &[])),
            Err(SafetyError::MissingCommand)
        );
        assert_eq!(
            assess(&call("run_shell_command", &[("command", "   ")])),
            Err(SafetyError::MissingCommand)
        );
    }

    #[test]
    fn test_sudo_is_matched_as_a_word() {
        assert!(uses_sudo("sudo rm file"));
        assert!(uses_sudo("cd /tmp && sudo make install"));
        assert!(uses_sudo("echo hi | sudo tee /etc/motd"));
        assert!(uses_sudo("/usr/bin/sudo apt remove libc6"));
        assert!(uses_sudo("bash -c 'sudo reboot'"));
        assert!(uses_sudo("sh -c \"sudo rm -rf /etc\""));
        assert!(!uses_sudo("cat pseudocode.txt"));
        assert!(!uses_sudo("ls /home/pseudo/"));
        assert!(!uses_sudo("grep sudoers notes.md"));
    }

    #[test]
    fn test_destructive_patterns() {
        assert!(is_destructive("rm -rf /"));
        assert!(is_destructive("rm -fr /*"));
        assert!(is_destructive("mkfs.ext4 /dev/sdb1"));
        assert!(is_destructive("dd if=/dev/zero of=/dev/sda"));
        assert!(is_destructive("echo x > /dev/sda"));
        assert!(is_destructive(":(){ :|:& };:"));

        assert!(is_destructive("rm -r -f /"));
        assert!(is_destructive("rm -rf --no-preserve-root /"));
        assert!(is_destructive("rm --recursive --force / && echo done"));

        assert!(!is_destructive("rm -rf ./build"));
        assert!(!is_destructive("rm -rf /tmp/cache"));
        assert!(!is_destructive("ls /dev"));
    }

    #[test]
    fn test_other_tools_are_routine() {
        let req = assess(&call("list_directory", &[("file_path", "/tmp")])).unwrap();
        assert_eq!(req.severity, Severity::Routine);
        assert!(req.message.contains("list_directory"));
        assert!(req.message.contains("file_path=/tmp"));
    }
}

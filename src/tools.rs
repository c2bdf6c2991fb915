//! Tool System
//!
//! The whitelisted local actions the model may ask for. Every tool takes a
//! flat string map of parameters and returns text for the transcript.

use chrono::format::{Item, StrftimeItems};
use chrono::Local;
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub type ToolParams = HashMap<String, String>;

/// Default format for `get_current_time`
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S %:z";

const MAX_OUTPUT_BYTES: usize = 50_000;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("'{tool}' requires the '{param}' parameter")]
    MissingParam { tool: &'static str, param: &'static str },

    #[error("Invalid parameters for '{tool}': {reason}")]
    InvalidParams { tool: String, reason: String },

    #[error("Could not {action} '{path}': {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to start command: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Command exited with {status}: {output}")]
    CommandFailed { status: String, output: String },
}

/// The fixed set of tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    ListDirectory,
    ReadFile,
    WriteFile,
    AppendFile,
    RunShellCommand,
    GetCurrentTime,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::ListDirectory,
        ToolKind::ReadFile,
        ToolKind::WriteFile,
        ToolKind::AppendFile,
        ToolKind::RunShellCommand,
        ToolKind::GetCurrentTime,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::ListDirectory => "list_directory",
            ToolKind::ReadFile => "read_file",
            ToolKind::WriteFile => "write_file",
            ToolKind::AppendFile => "append_file",
            ToolKind::RunShellCommand => "run_shell_command",
            ToolKind::GetCurrentTime => "get_current_time",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ToolKind::ListDirectory => {
                "Lists the files and folders in a directory. Parameters: file_path (default \".\")"
            }
            ToolKind::ReadFile => "Reads the contents of a file. Parameters: file_path",
            ToolKind::WriteFile => {
                "Writes content to a file. WARNING: replaces the whole file. Parameters: file_path, content"
            }
            ToolKind::AppendFile => "Appends content to the end of a file. Parameters: file_path, content",
            ToolKind::RunShellCommand => "Runs a terminal (bash) command. Parameters: command",
            ToolKind::GetCurrentTime => {
                "Returns the current local date and time. Parameters: format (optional, strftime)"
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.name() == canonical_tool_name(name))
    }
}

/// Resolve legacy tool names the model still produces
pub fn canonical_tool_name(name: &str) -> &str {
    match name {
        "run_command" => "run_shell_command",
        other => other,
    }
}

/// Turn the plain-text parameter form into a parameter map.
///
/// Shell and path tools take the whole string. `write_file`/`append_file`
/// expect `<path> "<content>"`. Anything else must be a JSON object.
pub fn parse_params(tool_name: &str, raw: &str) -> Result<ToolParams, ToolError> {
    let raw = raw.trim();
    let mut params = ToolParams::new();

    match canonical_tool_name(tool_name) {
        "run_shell_command" => {
            params.insert("command".into(), raw.trim_matches('"').into());
        }
        "read_file" | "list_directory" => {
            params.insert("file_path".into(), raw.trim_matches('"').into());
        }
        "write_file" | "append_file" => {
            let (path, content) = raw.split_once(' ').ok_or_else(|| ToolError::InvalidParams {
                tool: tool_name.into(),
                reason: format!("expected <file_path> \"<content>\", got: {}", raw),
            })?;
            params.insert("file_path".into(), path.into());
            params.insert("content".into(), content.trim_matches('"').into());
        }
        _ => {
            params = serde_json::from_str(raw).map_err(|e| ToolError::InvalidParams {
                tool: tool_name.into(),
                reason: format!("{} ({})", e, raw),
            })?;
        }
    }

    Ok(params)
}

/// Tool definition
#[derive(Debug, Clone)]
pub struct ToolDef {
    pub kind: ToolKind,
    pub name: &'static str,
    pub description: &'static str,
}

/// Available tools, ordered by name
pub struct ToolRegistry {
    tools: BTreeMap<&'static str, ToolDef>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let tools = ToolKind::ALL
            .iter()
            .map(|&kind| {
                (
                    kind.name(),
                    ToolDef {
                        kind,
                        name: kind.name(),
                        description: kind.description(),
                    },
                )
            })
            .collect();
        Self { tools }
    }

    pub fn get_tool(&self, name: &str) -> Option<&ToolDef> {
        self.tools.get(canonical_tool_name(name))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get_tool(name).is_some()
    }

    pub fn list_tools(&self) -> impl Iterator<Item = &ToolDef> {
        self.tools.values()
    }

    /// Tool guide appended to the system prompt
    pub fn tools_prompt(&self) -> String {
        let mut prompt = String::from("# AVAILABLE TOOLS\n\n");
        prompt.push_str("These are the tools you can use to fulfil the user's request:\n\n");
        for tool in self.list_tools() {
            prompt.push_str(&format!("## Tool: {}\n", tool.name));
            prompt.push_str(&format!("- Description: {}\n\n", tool.description));
        }
        prompt
    }

    /// Execute a tool
    pub async fn execute(&self, name: &str, params: &ToolParams) -> Result<String, ToolError> {
        let tool = self
            .get_tool(name)
            .ok_or_else(|| ToolError::UnknownTool(name.into()))?;

        tracing::debug!(tool = tool.name, ?params, "executing tool");

        match tool.kind {
            ToolKind::ListDirectory => exec_list_directory(params).await,
            ToolKind::ReadFile => exec_read_file(params).await,
            ToolKind::WriteFile => exec_write_file(params).await,
            ToolKind::AppendFile => exec_append_file(params).await,
            ToolKind::RunShellCommand => exec_shell(params).await,
            ToolKind::GetCurrentTime => exec_current_time(params),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn required<'a>(
    params: &'a ToolParams,
    tool: &'static str,
    param: &'static str,
) -> Result<&'a str, ToolError> {
    params
        .get(param)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
        .ok_or(ToolError::MissingParam { tool, param })
}

fn io_error(action: &'static str, path: &str) -> impl FnOnce(std::io::Error) -> ToolError {
    let path = path.to_string();
    move |source| ToolError::Io { action, path, source }
}

async fn exec_list_directory(params: &ToolParams) -> Result<String, ToolError> {
    let path = params
        .get("file_path")
        .map(String::as_str)
        .filter(|p| !p.is_empty())
        .unwrap_or(".");

    let mut dir = tokio::fs::read_dir(path)
        .await
        .map_err(io_error("read directory", path))?;

    let mut entries = Vec::new();
    while let Some(entry) = dir
        .next_entry()
        .await
        .map_err(io_error("read directory", path))?
    {
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            name.push('/');
        }
        entries.push(name);
    }
    entries.sort();

    Ok(format!("Directory contents:\n{}", entries.join("\n")))
}

async fn exec_read_file(params: &ToolParams) -> Result<String, ToolError> {
    let path = required(params, "read_file", "file_path")?;
    let bytes = tokio::fs::read(path)
        .await
        .map_err(io_error("read file", path))?;

    // Non-UTF-8 files (Latin-1 logs, binaries) are shown lossily
    Ok(truncate_output(String::from_utf8_lossy(&bytes).into_owned()))
}

async fn exec_write_file(params: &ToolParams) -> Result<String, ToolError> {
    let path = required(params, "write_file", "file_path")?;
    let content = params.get("content").map(String::as_str).unwrap_or("");

    tokio::fs::write(path, content)
        .await
        .map_err(io_error("write file", path))?;

    Ok(format!("Wrote to '{}'.", path))
}

async fn exec_append_file(params: &ToolParams) -> Result<String, ToolError> {
    let path = required(params, "append_file", "file_path")?;
    let content = params.get("content").map(String::as_str).unwrap_or("");

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(io_error("open file", path))?;
    file.write_all(content.as_bytes())
        .await
        .map_err(io_error("append to file", path))?;
    file.flush().await.map_err(io_error("append to file", path))?;

    Ok(format!("Appended to '{}'.", path))
}

async fn exec_shell(params: &ToolParams) -> Result<String, ToolError> {
    let command = required(params, "run_shell_command", "command")?;

    let out = Command::new("bash")
        .arg("-c")
        .arg(command)
        .output()
        .await
        .map_err(ToolError::Spawn)?;

    let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
    output.push_str(&String::from_utf8_lossy(&out.stderr));
    let output = truncate_output(output);

    if !out.status.success() {
        return Err(ToolError::CommandFailed {
            status: out.status.to_string(),
            output,
        });
    }
    Ok(output)
}

fn exec_current_time(params: &ToolParams) -> Result<String, ToolError> {
    let format = params
        .get("format")
        .map(String::as_str)
        .filter(|f| !f.trim().is_empty())
        .unwrap_or(DEFAULT_TIME_FORMAT);

    let items: Vec<Item> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return Err(ToolError::InvalidParams {
            tool: "get_current_time".into(),
            reason: format!("invalid time format: {}", format),
        });
    }

    Ok(Local::now().format_with_items(items.into_iter()).to_string())
}

fn truncate_output(output: String) -> String {
    if output.len() <= MAX_OUTPUT_BYTES {
        return output;
    }
    let mut end = MAX_OUTPUT_BYTES;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...\n[truncated, {} bytes total]", &output[..end], output.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn params(pairs: &[(&str, &str)]) -> ToolParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_tool_registry() {
        let registry = ToolRegistry::new();
        assert!(registry.contains("read_file"));
        assert!(registry.contains("run_command"));
        assert!(!registry.contains("delete_everything"));

        let names: Vec<_> = registry.list_tools().map(|t| t.name).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_tools_prompt_lists_every_tool() {
        let prompt = ToolRegistry::new().tools_prompt();
        assert!(prompt.starts_with("# AVAILABLE TOOLS"));
        for kind in ToolKind::ALL {
            assert!(prompt.contains(&format!("## Tool: {}", kind.name())));
        }
    }

    #[test]
    fn test_canonical_names() {
        assert_eq!(canonical_tool_name("run_command"), "run_shell_command");
        assert_eq!(canonical_tool_name("read_file"), "read_file");
        assert_eq!(ToolKind::from_name("run_command"), Some(ToolKind::RunShellCommand));
        assert_eq!(ToolKind::from_name("nope"), None);
    }

    #[test]
    fn test_parse_params_text_forms() {
        let p = parse_params("run_shell_command", " \"ls -la\" ").unwrap();
        assert_eq!(p["command"], "ls -la");

        let p = parse_params("list_directory", "\"/tmp\"").unwrap();
        assert_eq!(p["file_path"], "/tmp");

        let p = parse_params("write_file", "notes.txt \"hello world\"").unwrap();
        assert_eq!(p["file_path"], "notes.txt");
        assert_eq!(p["content"], "hello world");

        assert!(matches!(
            parse_params("append_file", "only-a-path"),
            Err(ToolError::InvalidParams { .. })
        ));
    }

    #[test]
    fn test_parse_params_json_fallback() {
        let p = parse_params("get_current_time", r#"{"format":"%H:%M"}"#).unwrap();
        assert_eq!(p["format"], "%H:%M");
        assert!(parse_params("get_current_time", "now please").is_err());
    }

    #[tokio::test]
    async fn test_list_directory_sorted_with_dir_suffix() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();

        let registry = ToolRegistry::new();
        let out = registry
            .execute(
                "list_directory",
                &params(&[("file_path", dir.path().to_str().unwrap())]),
            )
            .await
            .unwrap();

        assert_eq!(out, "Directory contents:\na.txt\nb.txt\nsub/");
    }

    #[tokio::test]
    async fn test_write_append_read_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        let path = path.to_str().unwrap();
        let registry = ToolRegistry::new();

        let out = registry
            .execute("write_file", &params(&[("file_path", path), ("content", "one\n")]))
            .await
            .unwrap();
        assert_eq!(out, format!("Wrote to '{}'.", path));

        registry
            .execute("append_file", &params(&[("file_path", path), ("content", "two\n")]))
            .await
            .unwrap();

        let content = registry
            .execute("read_file", &params(&[("file_path", path)]))
            .await
            .unwrap();
        assert_eq!(content, "one\ntwo\n");
    }

    #[tokio::test]
    async fn test_append_creates_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.log");

        ToolRegistry::new()
            .execute(
                "append_file",
                &params(&[("file_path", path.to_str().unwrap()), ("content", "x")]),
            )
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "x");
    }

    #[tokio::test]
    async fn test_read_non_utf8_and_large_files() {
        let dir = TempDir::new().unwrap();
        let latin1 = dir.path().join("latin1.log");
        std::fs::write(&latin1, b"caf\xe9 ok\n").unwrap();

        let registry = ToolRegistry::new();
        let out = registry
            .execute("read_file", &params(&[("file_path", latin1.to_str().unwrap())]))
            .await
            .unwrap();
        assert_eq!(out, "caf\u{FFFD} ok\n");

        let big = dir.path().join("big.txt");
        std::fs::write(&big, "x".repeat(MAX_OUTPUT_BYTES * 2)).unwrap();
        let out = registry
            .execute("read_file", &params(&[("file_path", big.to_str().unwrap())]))
            .await
            .unwrap();
        assert!(out.len() < MAX_OUTPUT_BYTES + 100);
        assert!(out.ends_with("bytes total]"));
    }

    #[tokio::test]
    async fn test_read_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.txt");
        let err = ToolRegistry::new()
            .execute("read_file", &params(&[("file_path", path.to_str().unwrap())]))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Io { action: "read file", .. }));
    }

    #[tokio::test]
    async fn test_missing_required_params() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.execute("read_file", &ToolParams::new()).await,
            Err(ToolError::MissingParam { param: "file_path", .. })
        ));
        assert!(matches!(
            registry.execute("run_shell_command", &ToolParams::new()).await,
            Err(ToolError::MissingParam { param: "command", .. })
        ));
    }

    #[tokio::test]
    async fn test_shell_combines_output() {
        let out = ToolRegistry::new()
            .execute(
                "run_command",
                &params(&[("command", "echo out; echo err 1>&2")]),
            )
            .await
            .unwrap();
        assert!(out.contains("out"));
        assert!(out.contains("err"));
    }

    #[tokio::test]
    async fn test_shell_failure_keeps_output() {
        let err = ToolRegistry::new()
            .execute(
                "run_shell_command",
                &params(&[("command", "echo boom; exit 3")]),
            )
            .await
            .unwrap_err();
        match err {
            ToolError::CommandFailed { output, .. } => assert!(output.contains("boom")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_current_time() {
        let registry = ToolRegistry::new();
        let year = registry
            .execute("get_current_time", &params(&[("format", "%Y")]))
            .await
            .unwrap();
        assert_eq!(year.len(), 4);

        let default = registry
            .execute("get_current_time", &ToolParams::new())
            .await
            .unwrap();
        assert!(default.contains(':'));

        assert!(registry
            .execute("get_current_time", &params(&[("format", "%Q")]))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        assert!(matches!(
            ToolRegistry::new().execute("format_disk", &ToolParams::new()).await,
            Err(ToolError::UnknownTool(_))
        ));
    }

    #[test]
    fn test_truncate_output() {
        let long = "é".repeat(MAX_OUTPUT_BYTES);
        let truncated = truncate_output(long);
        assert!(truncated.ends_with("bytes total]"));
        assert_eq!(truncate_output("short".into()), "short");
    }
}

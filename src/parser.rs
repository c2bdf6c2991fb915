//! Model reply parsing
//!
//! The model is told to answer with
//! `{"type":"tool_call","tool_call":{"tool_name":..,"params":{..}}}` but local
//! models wrap it in prose, code fences, or flatten the structure. This module
//! digs the tool call out of whatever came back.

use crate::tools::{self, ToolError, ToolParams};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("No JSON object found in the model response")]
    NoJson,

    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Response contains no tool call (type: {response_type})")]
    MissingToolCall { response_type: String },

    #[error(transparent)]
    Params(#[from] ToolError),
}

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCall {
    pub tool_name: String,
    pub params: ToolParams,
}

impl ToolCall {
    pub fn new(tool_name: impl Into<String>, params: ToolParams) -> Self {
        Self {
            tool_name: tool_name.into(),
            params,
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// A parsed reply: the JSON text exactly as the model wrote it, and the call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub json: String,
    pub call: ToolCall,
}

/// Slice from the first `{` to the last `}`
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

pub fn parse_reply(text: &str) -> Result<ParsedReply, ParseError> {
    let json = extract_json_object(text).ok_or(ParseError::NoJson)?;
    let value: Value = serde_json::from_str(json)?;

    let object = value.as_object().ok_or(ParseError::NoJson)?;
    let response_type = object
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    let call_object = match object.get("tool_call").and_then(Value::as_object) {
        Some(nested) => nested,
        None if object.contains_key("tool_name") => {
            tracing::debug!("model used the flat tool call layout");
            object
        }
        None => return Err(ParseError::MissingToolCall { response_type }),
    };

    let tool_name = call_object
        .get("tool_name")
        .and_then(Value::as_str)
        .unwrap_or("")
        .trim()
        .to_string();

    let params = match call_object.get("params") {
        Some(Value::Object(map)) => stringify_params(map),
        Some(Value::String(raw)) if !raw.trim().is_empty() => tools::parse_params(&tool_name, raw)?,
        _ => ToolParams::new(),
    };

    Ok(ParsedReply {
        json: json.to_string(),
        call: ToolCall { tool_name, params },
    })
}

fn stringify_params(map: &Map<String, Value>) -> ToolParams {
    map.iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            Some((key.clone(), text))
        })
        .collect()
}

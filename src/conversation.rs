//! Conversation transcript fed back into every prompt

use std::collections::VecDeque;

/// Line-oriented conversation history.
///
/// With a non-zero `limit`, the oldest lines are dropped once the total
/// character count exceeds it. The newest line is always kept.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    lines: VecDeque<String>,
    chars: usize,
    limit: usize,
}

impl Transcript {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            chars: 0,
            limit,
        }
    }

    pub fn push_user(&mut self, input: &str) {
        self.push(format!("User: {}", input));
    }

    pub fn push_assistant(&mut self, reply: &str) {
        self.push(format!("Assistant: {}", reply));
    }

    /// A reply that could not be used, kept so the model sees its mistake
    pub fn push_error(&mut self, error: &str, raw: &str) {
        if raw.is_empty() {
            self.push(format!("Assistant: [Error: {}]", error));
        } else {
            self.push(format!("Assistant: [Error: {}] {}", error, raw));
        }
    }

    /// The call and its result are one entry, so trimming drops them together
    pub fn push_tool_result(&mut self, tool_json: &str, output: &str) {
        self.push(format!("{}\nTool-Result: {}", tool_json, output));
    }

    pub fn push_cancelled(&mut self, tool_json: &str) {
        self.push_tool_result(tool_json, "[Cancelled by user]");
    }

    pub fn push_tool_error(&mut self, tool_json: &str, error: &str) {
        self.push_tool_result(tool_json, &format!("[Error: {}]", error));
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.chars = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.chars + self.lines.len());
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }

    fn push(&mut self, line: String) {
        self.chars += line.chars().count();
        self.lines.push_back(line);

        if self.limit == 0 {
            return;
        }
        while self.chars > self.limit && self.lines.len() > 1 {
            if let Some(dropped) = self.lines.pop_front() {
                self.chars -= dropped.chars().count();
            }
        }
    }
}

//! Ajan CLI
//!
//! Banner, colours, boxed tool output and the interactive prompts.

use crate::memory::Lesson;
use crate::parser::ToolCall;
use crate::safety::{ConfirmationRequest, ConsentHandler, Severity};
use console::{measure_text_width, style, Style, Term};
use dialoguer::{theme::ColorfulTheme, Confirm, Select};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const BANNER_TEXT: &str = r#"
  █████       ██  █████  ███    ██
 ██   ██      ██ ██   ██ ████   ██
 ███████      ██ ███████ ██ ██  ██
 ██   ██ ██   ██ ██   ██ ██  ██ ██
 ██   ██  █████  ██   ██ ██   ████
"#;

pub fn print_banner() {
    println!("{}", style(BANNER_TEXT).cyan().bold());
    println!(
        "{}",
        style("      local model  ·  lesson memory  ·  your consent")
            .yellow()
            .bold()
    );
    println!(
        "{}",
        style(format!("                 Version {}", env!("CARGO_PKG_VERSION"))).dim()
    );
    println!();
}

pub fn print_info(msg: &str) {
    println!("{} {}", style("ℹ").cyan(), msg);
}

pub fn print_success(msg: &str) {
    println!("{} {}", style("✓").green().bold(), msg);
}

pub fn print_error(msg: &str) {
    println!("{} {}", style("✗").red().bold(), msg);
}

pub fn print_warning(msg: &str) {
    println!("{} {}", style("⚠").yellow().bold(), msg);
}

/// The two ways to talk to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Mode {
    /// Requests become confirmed tool calls
    Tools,
    /// Plain conversation
    Chat,
}

impl Mode {
    pub fn label(&self) -> &'static str {
        match self {
            Mode::Tools => "tools",
            Mode::Chat => "chat",
        }
    }
}

/// Ask which mode to run in; `None` if the prompt was dismissed
pub fn select_mode() -> Option<Mode> {
    let choices = ["Tool use", "General chat"];
    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Choose a mode")
        .items(&choices)
        .default(0)
        .interact_opt();

    match selection {
        Ok(Some(0)) => Some(Mode::Tools),
        Ok(Some(1)) => Some(Mode::Chat),
        _ => None,
    }
}

pub fn print_help(mode: Mode) {
    println!();
    println!("{}", style("Commands").cyan().bold());
    println!("  {}        show this help", style("/help").bold());
    println!("  {}       forget the conversation so far", style("/clear").bold());
    if mode == Mode::Tools {
        println!(
            "  {}       start training; run it again to save the last successful call",
            style("/train").bold()
        );
        println!("  {}  list every stored lesson", style("/showmemory").bold());
    }
    println!("  {}         leave (also: quit, çıkış, Ctrl-D)", style("exit").bold());
    println!();
}

pub fn create_spinner(msg: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
        .template("{spinner:.cyan} {msg}")
    {
        spinner.set_style(template);
    }
    spinner.set_message(msg.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

fn severity_style(severity: Severity) -> Style {
    match severity {
        Severity::Routine => Style::new().green(),
        Severity::Caution => Style::new().yellow(),
        Severity::Critical => Style::new().red().bold().on_black(),
    }
}

pub fn print_tool_request(call: &ToolCall) {
    print_info(&format!(
        "The model wants to use {}",
        style(&call.tool_name).cyan().bold()
    ));
    let mut params: Vec<_> = call.params.iter().collect();
    params.sort();
    for (key, value) in params {
        println!("    {} {}", style(format!("{}:", key)).dim(), value);
    }
}

/// Draw `body` inside a titled box
pub fn boxed(title: &str, body: &str) -> String {
    let width = body
        .lines()
        .map(measure_text_width)
        .chain(std::iter::once(measure_text_width(title) + 2))
        .max()
        .unwrap_or(0)
        .min(100);

    let mut out = String::new();
    let title_part = format!(" {} ", title);
    let fill = (width + 2).saturating_sub(measure_text_width(&title_part));
    out.push_str(&format!("┌{}{}┐\n", title_part, "─".repeat(fill)));
    for line in body.lines() {
        let pad = width.saturating_sub(measure_text_width(line));
        out.push_str(&format!("│ {}{} │\n", line, " ".repeat(pad)));
    }
    out.push_str(&format!("└{}┘", "─".repeat(width + 2)));
    out
}

pub fn print_tool_output(tool: &str, output: &str) {
    let body = if output.trim().is_empty() {
        "(no output)"
    } else {
        output.trim_end()
    };
    println!("{}", boxed(&format!("Tool output: {}", tool), body));
}

pub fn print_lessons(lessons: &[Lesson]) {
    for (i, lesson) in lessons.iter().enumerate() {
        let body = format!(
            "User request: {}\nTool call:\n{}",
            lesson.user_request,
            lesson.pretty_tool_call()
        );
        println!("{}", style(boxed(&format!("Lesson #{}", i + 1), &body)).cyan());
    }
}

pub fn print_chat_reply(reply: &str) {
    println!("{}", style(reply).green());
}

/// Interactive confirmation, defaulting to No
pub struct CliConsent {
    term: Term,
}

impl CliConsent {
    pub fn new() -> Self {
        Self {
            term: Term::stdout(),
        }
    }
}

impl Default for CliConsent {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsentHandler for CliConsent {
    fn confirm(&self, request: &ConfirmationRequest) -> bool {
        let badge = format!("[{}]", request.severity.to_string().to_uppercase());
        let _ = self.term.write_line("");
        let _ = self.term.write_line(&format!(
            "{} {}",
            severity_style(request.severity).apply_to(&badge),
            style(&request.tool_name).bold()
        ));

        let message = match request.severity {
            Severity::Critical => style(&request.message).red().bold().to_string(),
            Severity::Caution => style(&request.message).yellow().to_string(),
            Severity::Routine => request.message.clone(),
        };

        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(message)
            .default(false)
            .interact()
            .unwrap_or(false)
    }
}

/// Approves everything except critical requests (`--yes`)
pub struct AutoConsent<C: ConsentHandler = CliConsent> {
    fallback: C,
}

impl AutoConsent<CliConsent> {
    pub fn new() -> Self {
        Self::with_fallback(CliConsent::new())
    }
}

impl Default for AutoConsent<CliConsent> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ConsentHandler> AutoConsent<C> {
    pub fn with_fallback(fallback: C) -> Self {
        Self { fallback }
    }
}

impl<C: ConsentHandler> ConsentHandler for AutoConsent<C> {
    fn confirm(&self, request: &ConfirmationRequest) -> bool {
        if request.severity == Severity::Critical {
            return self.fallback.confirm(request);
        }
        print_info(&format!("Auto-approved {} ({})", request.tool_name, request.severity));
        true
    }
}

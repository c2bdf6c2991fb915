//! Interactive loop for both modes

use crate::agent::{Agent, TrainingEvent, TrainingToggle, TurnOutcome};
use crate::cli::{
    create_spinner, print_chat_reply, print_error, print_help, print_info, print_lessons,
    print_success, print_tool_output, print_tool_request, print_warning, Mode,
};
use crate::memory::LessonStore;
use crate::providers::{EmbeddingProvider, LlmProvider};
use crate::safety::ConsentHandler;
use console::style;
use rustyline::error::ReadlineError;
use rustyline::{Config, DefaultEditor, EditMode};
use std::path::PathBuf;
use std::time::Instant;

const FAREWELL: &str = "Goodbye!";

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Exit,
    Help,
    Clear,
    Train,
    ShowMemory,
    Input(String),
}

fn parse_command(input: &str, mode: Mode) -> ReplCommand {
    let lowered = input.to_lowercase();
    if matches!(lowered.as_str(), "exit" | "quit" | "çıkış") {
        return ReplCommand::Exit;
    }

    match (input, mode) {
        ("/help", _) => ReplCommand::Help,
        ("/clear", _) => ReplCommand::Clear,
        ("/train" | "/eğit", Mode::Tools) => ReplCommand::Train,
        ("/showmemory", Mode::Tools) => ReplCommand::ShowMemory,
        _ => ReplCommand::Input(input.to_string()),
    }
}

fn history_path() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("ajan").join("history.txt"))
        .unwrap_or_else(|| PathBuf::from(".ajan_history"))
}

fn prompt_for(mode: Mode, training: bool) -> String {
    match (mode, training) {
        (Mode::Chat, _) => format!("{} ", style("you (chat)>").cyan().bold()),
        (Mode::Tools, true) => format!("{} ", style("you (training)>").magenta().bold()),
        (Mode::Tools, false) => format!("{} ", style("you (tools)>").yellow().bold()),
    }
}

pub async fn run_repl<L, E, S, C>(agent: &mut Agent<L, E, S, C>, mode: Mode) -> anyhow::Result<()>
where
    L: LlmProvider,
    E: EmbeddingProvider,
    S: LessonStore,
    C: ConsentHandler,
{
    let config = Config::builder().edit_mode(EditMode::Emacs).build();
    let mut rl = DefaultEditor::with_config(config)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = rl.load_history(&history_path);
    }

    // Track Ctrl+C for double-press exit
    let mut last_interrupt: Option<Instant> = None;

    println!(
        "{}",
        style(format!(
            "{} mode. Type /help for commands, Ctrl+C twice to exit.",
            match mode {
                Mode::Tools => "Tool",
                Mode::Chat => "Chat",
            }
        ))
        .dim()
    );
    agent.begin_session(mode.label());

    loop {
        match rl.readline(&prompt_for(mode, agent.is_training())) {
            Ok(line) => {
                last_interrupt = None;

                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(input);

                match parse_command(input, mode) {
                    ReplCommand::Exit => {
                        println!("{}", style(FAREWELL).yellow());
                        break;
                    }
                    ReplCommand::Help => print_help(mode),
                    ReplCommand::Clear => {
                        agent.clear_history();
                        print_success("Conversation history cleared");
                    }
                    ReplCommand::Train => toggle_training(agent).await,
                    ReplCommand::ShowMemory => show_memory(agent).await,
                    ReplCommand::Input(text) => match mode {
                        Mode::Tools => tool_turn(agent, &text).await,
                        Mode::Chat => chat_turn(agent, &text).await,
                    },
                }
            }
            Err(ReadlineError::Interrupted) => {
                if let Some(last) = last_interrupt {
                    if last.elapsed().as_secs() < 2 {
                        println!("\n{}", style(FAREWELL).yellow());
                        break;
                    }
                }
                last_interrupt = Some(Instant::now());
                println!("{}", style("(Press Ctrl+C again to exit)").dim());
            }
            Err(ReadlineError::Eof) => {
                println!("{}", style(FAREWELL).yellow());
                break;
            }
            Err(err) => {
                print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    agent.end_session();

    if let Some(parent) = history_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = rl.save_history(&history_path) {
        tracing::debug!("could not save history: {}", e);
    }
    Ok(())
}

async fn tool_turn<L, E, S, C>(agent: &mut Agent<L, E, S, C>, input: &str)
where
    L: LlmProvider,
    E: EmbeddingProvider,
    S: LessonStore,
    C: ConsentHandler,
{
    let was_training = agent.is_training();

    let spinner = create_spinner("Thinking...");
    let prepared = agent.prepare_tool_turn(input).await;
    spinner.finish_and_clear();

    let turn = match prepared {
        Ok(turn) => turn,
        Err(e) => {
            print_error(&format!("No answer from the model: {}", e));
            if was_training && !agent.is_training() {
                print_warning("Training mode ended because the request failed.");
            }
            return;
        }
    };

    if let Some(warning) = &turn.memory_warning {
        print_warning(warning);
    }
    if !turn.recalled.is_empty() {
        let distances: Vec<String> = turn
            .recalled
            .iter()
            .map(|l| format!("{:.4}", l.distance))
            .collect();
        print_info(&format!(
            "{} similar lesson(s) recalled (distances: {})",
            turn.recalled.len(),
            distances.join(", ")
        ));
    }
    if let Ok(reply) = &turn.parsed {
        print_tool_request(&reply.call);
    }

    let report = agent.resolve_tool_turn(turn).await;
    match &report.outcome {
        TurnOutcome::Executed { tool, output } => print_tool_output(tool, output),
        TurnOutcome::Cancelled { .. } => print_warning("Cancelled."),
        TurnOutcome::ToolFailed { error, .. } => print_error(&format!("Tool error: {}", error)),
        TurnOutcome::Rejected { reason } => print_error(reason),
        TurnOutcome::Unparsed { error, raw } => {
            print_warning(&format!("Could not use the model's reply: {}", error));
            println!("{}", style(raw).dim());
        }
    }

    match report.training {
        TrainingEvent::Captured => {
            print_success("Training call succeeded. Enter /train again to save it.")
        }
        TrainingEvent::Aborted => {
            print_warning("The call failed during training. Training mode ended.")
        }
        TrainingEvent::NotTraining => {}
    }
}

async fn chat_turn<L, E, S, C>(agent: &mut Agent<L, E, S, C>, input: &str)
where
    L: LlmProvider,
    E: EmbeddingProvider,
    S: LessonStore,
    C: ConsentHandler,
{
    let spinner = create_spinner("Thinking...");
    let reply = agent.handle_chat_input(input).await;
    spinner.finish_and_clear();

    match reply {
        Ok(reply) => print_chat_reply(&reply),
        Err(e) => print_error(&format!("No answer from the model: {}", e)),
    }
}

async fn toggle_training<L, E, S, C>(agent: &mut Agent<L, E, S, C>)
where
    L: LlmProvider,
    E: EmbeddingProvider,
    S: LessonStore,
    C: ConsentHandler,
{
    match agent.toggle_training().await {
        Ok(TrainingToggle::Started) => {
            print_info("Training started. Enter the request you want to teach.")
        }
        Ok(TrainingToggle::Saved { id, .. }) => {
            print_success(&format!("New lesson saved to memory ({})", id))
        }
        Ok(TrainingToggle::NothingCaptured) => {
            print_warning("No successful call to save. Training cancelled.")
        }
        Err(e) => print_error(&format!("Training: {}", e)),
    }
}

async fn show_memory<L, E, S, C>(agent: &Agent<L, E, S, C>)
where
    L: LlmProvider,
    E: EmbeddingProvider,
    S: LessonStore,
    C: ConsentHandler,
{
    print_info("Fetching all lessons from memory...");
    match agent.list_lessons().await {
        Ok(lessons) if lessons.is_empty() => print_info("Memory is empty."),
        Ok(lessons) => {
            print_info(&format!("{} lesson(s) found:", lessons.len()));
            print_lessons(&lessons);
        }
        Err(e) => print_error(&format!("Could not read memory: {}", e)),
    }
}

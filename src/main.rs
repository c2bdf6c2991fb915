//! Ajan - local assistant with a memory for what worked
//!
//! ```bash
//! ajan                     # pick a mode interactively
//! ajan --mode tools --yes  # auto-approve everything but critical commands
//! ajan config show
//! ```

use ajan::agent::{Agent, AgentOptions};
use ajan::cli::{print_banner, print_error, print_info, print_warning, select_mode, AutoConsent, CliConsent, Mode};
use ajan::config::{AgentConfig, ConfigManager};
use ajan::memory::ChromaClient;
use ajan::providers::{LlmProvider, Ollama, OpenAiCompatible};
use ajan::repl::run_repl;
use ajan::safety::ConsentHandler;
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ajan")]
#[command(version)]
#[command(about = "Local assistant that turns requests into confirmed tool calls")]
#[command(long_about = r#"
Ajan sends your request to a local model, shows you the tool call it wants
to make, and runs it only after you confirm.

Teach it with /train: a successful call is stored in ChromaDB and recalled
as an example for similar requests.
"#)]
struct Args {
    /// Config file (default: ./config.toml, then the user config dir)
    #[arg(short, long, value_name = "PATH", env = "AJAN_CONFIG")]
    config: Option<PathBuf>,

    /// Start in this mode instead of asking
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// Language model backend
    #[arg(long, value_enum, default_value_t = ProviderKind::Ollama)]
    provider: ProviderKind,

    /// Override the model name of the chosen backend
    #[arg(long)]
    model: Option<String>,

    /// Approve non-critical tool calls without asking
    #[arg(short = 'y', long)]
    yes: bool,

    /// Run without lesson memory
    #[arg(long)]
    no_memory: bool,

    /// Show debug output
    #[arg(long)]
    debug: bool,

    /// Minimal output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProviderKind {
    /// Local Ollama server
    Ollama,
    /// OpenAI-compatible expert API
    Openai,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(args.debug);

    if let Err(e) = run(args).await {
        print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn init_tracing(debug: bool) {
    let default_level = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

async fn run(args: Args) -> anyhow::Result<()> {
    let manager = ConfigManager::locate(args.config.as_deref());
    let config = manager.load().context("Could not load configuration")?;

    if let Some(Commands::Config { action }) = &args.command {
        match action {
            ConfigAction::Show => {
                match manager.path() {
                    Some(path) => print_info(&format!("Config file: {}", path.display())),
                    None => print_info("No config file found, showing defaults"),
                }
                println!("{}", config.to_display_toml()?);
            }
        }
        return Ok(());
    }

    if !args.quiet {
        print_banner();
    }

    let ollama = Ollama::with_timeout(
        &config.ollama.url,
        args.model
            .as_deref()
            .filter(|_| args.provider == ProviderKind::Ollama)
            .unwrap_or(&config.ollama.model),
        &config.ollama.embedding_model,
        Duration::from_secs(config.ollama.timeout_secs),
    )?;

    let llm = build_llm(&args, &config, &ollama)?;
    if !args.quiet {
        print_info(&format!("Provider: {}", llm.name()));
    }

    let memory = connect_memory(&args, &config).await;

    let mode = match args.mode {
        Some(mode) => mode,
        None => match select_mode() {
            Some(mode) => mode,
            None => return Ok(()),
        },
    };

    let consent: Box<dyn ConsentHandler> = if args.yes {
        print_warning("Auto-approve is on. Critical commands still ask first.");
        Box::new(AutoConsent::new())
    } else {
        Box::new(CliConsent::new())
    };

    let mut agent = Agent::new(llm, ollama, memory, consent, AgentOptions::from(&config));
    tracing::debug!(session = agent.session_id(), "agent ready");

    run_repl(&mut agent, mode).await
}

fn build_llm(args: &Args, config: &AgentConfig, ollama: &Ollama) -> anyhow::Result<Box<dyn LlmProvider>> {
    match args.provider {
        ProviderKind::Ollama => Ok(Box::new(ollama.clone())),
        ProviderKind::Openai => {
            let model = args.model.as_deref().unwrap_or(&config.expert_api.model);
            let expert = OpenAiCompatible::new(&config.expert_api.url, &config.expert_api.api_key, model)
                .context("The openai provider needs expert_api.api_key")?
                .with_name("expert");
            Ok(Box::new(expert))
        }
    }
}

async fn connect_memory(args: &Args, config: &AgentConfig) -> Option<ChromaClient> {
    if args.no_memory || !config.chroma.enabled {
        if !args.quiet {
            print_info("Lesson memory is off");
        }
        return None;
    }

    match ChromaClient::connect(&config.chroma.url, &config.chroma.collection_name).await {
        Ok(client) => {
            if !args.quiet {
                print_info(&format!(
                    "Lesson memory: {} ({})",
                    client.collection_name(),
                    config.chroma.url
                ));
            }
            Some(client)
        }
        Err(e) => {
            print_warning(&format!(
                "Could not reach ChromaDB at {}, continuing without memory: {}",
                config.chroma.url, e
            ));
            None
        }
    }
}

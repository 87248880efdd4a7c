use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use kvitto_core::Severity;
use kvitto_ingest::{GrammarRegistry, ReceiptParser};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod check;
mod config;
mod llm;
mod state;

/// Store name reported when none is given and none is printed on the
/// receipt. Not a grammar id; lookup falls through to the generic grammar.
const UNKNOWN_STORE: &str = "unknown";

#[derive(Parser, Debug)]
#[command(
    name = "kvitto",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("KVITTO_BUILD_SHA"), ")"),
    about = "Parse Swedish grocery receipts into structured JSON"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse receipt text and print the result as JSON
    Parse {
        /// Receipt text file, or `-` for stdin
        file: PathBuf,

        /// Store id used to pick the grammar (default: detected from the receipt)
        #[arg(long)]
        store: Option<String>,

        /// Never call the AI fallback
        #[arg(long)]
        no_fallback: bool,

        /// Single-line JSON
        #[arg(long)]
        compact: bool,
    },

    /// List registered store grammars and their rules
    Stores,

    /// Replay fixture cases through the structured parser
    Check {
        /// JSON array of fixture cases
        fixtures: PathBuf,
    },

    /// Write the default ~/.kvitto/config.toml
    InitConfig,

    /// Store API keys for the AI fallback
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    /// Save an OpenAI API key to ~/.kvitto/auth.json
    PasteOpenaiApiKey,

    /// Save an Anthropic API key to ~/.kvitto/auth.json
    PasteAnthropicApiKey,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr; stdout carries JSON only.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kvitto=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Parse {
            file,
            store,
            no_fallback,
            compact,
        } => return parse(&file, store, no_fallback, compact).await,

        Command::Stores => stores(),

        Command::Check { fixtures } => return run_check(&fixtures).await,

        Command::InitConfig => config::init_config()?,

        Command::Auth { command } => match command {
            AuthCommand::PasteOpenaiApiKey => auth::paste_key(llm::Provider::OpenAI)?,
            AuthCommand::PasteAnthropicApiKey => auth::paste_key(llm::Provider::Anthropic)?,
        },
    }

    Ok(ExitCode::SUCCESS)
}

fn read_input(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut s = String::new();
        std::io::stdin()
            .read_to_string(&mut s)
            .context("read receipt from stdin")?;
        return Ok(s);
    }
    std::fs::read_to_string(file).with_context(|| format!("read {}", file.display()))
}

async fn parse(
    file: &Path,
    store: Option<String>,
    no_fallback: bool,
    compact: bool,
) -> Result<ExitCode> {
    let cfg = config::load_config()?;
    let text = read_input(file)?;

    let registry = Arc::new(GrammarRegistry::builtin());
    let store = resolve_store(store, &registry, &text);
    info!(store = %store, grammar = registry.grammar_for(&store).id, "parsing receipt");

    let mut parser = ReceiptParser::new(registry, cfg.parser.clone())?;
    if !no_fallback {
        let auth = auth::load_auth()?;
        match llm::LlmFallback::from_config(&cfg.llm, &auth)? {
            Some(fallback) => parser = parser.with_fallback(Arc::new(fallback)),
            None => warn!("AI fallback unavailable (disabled or no API key)"),
        }
    }

    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };
    let receipt = parser.parse_with_cancel(&text, &store, cancel).await?;

    let json = if compact {
        serde_json::to_string(&receipt)?
    } else {
        serde_json::to_string_pretty(&receipt)?
    };
    println!("{json}");

    let critical = receipt.anomalies_at_least(Severity::Critical).count();
    if critical > 0 {
        warn!(critical, "receipt has critical anomalies");
        return Ok(ExitCode::from(2));
    }
    Ok(ExitCode::SUCCESS)
}

/// Explicit `--store`, else the store printed on the receipt, else
/// [`UNKNOWN_STORE`].
fn resolve_store(explicit: Option<String>, registry: &GrammarRegistry, text: &str) -> String {
    explicit
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .or_else(|| registry.detect_store(text))
        .unwrap_or_else(|| UNKNOWN_STORE.to_string())
}

fn stores() {
    let registry = GrammarRegistry::builtin();
    for grammar in registry.grammars() {
        let prefixes = if grammar.prefixes.is_empty() {
            "(fallback for unregistered stores)".to_string()
        } else {
            grammar.prefixes.join(", ")
        };
        println!("{}  {}", grammar.id, prefixes);
        for rule in grammar.rules() {
            println!("  {:>3}  {}", rule.priority, rule.name);
        }
    }
}

async fn run_check(fixtures: &Path) -> Result<ExitCode> {
    let cases = check::load_fixtures(fixtures)?;
    if cases.is_empty() {
        bail!("no fixture cases in {}", fixtures.display());
    }
    let parser = ReceiptParser::builtin()?;

    let mut failed = 0;
    for case in &cases {
        let result = check::run_case(&parser, case).await?;
        if result.passed() {
            println!("ok    {}", result.name);
        } else {
            failed += 1;
            println!("FAIL  {}", result.name);
            for f in &result.failures {
                println!("      {f}");
            }
        }
    }

    println!("\n{} passed, {} failed", cases.len() - failed, failed);
    Ok(if failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

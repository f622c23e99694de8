use aidev_ai::{
    bounded, normalize, render_fallback, DisplaySections, GenerationConfig, IntentError,
    IntentProcessor, LLMProvider, LlmError, OpenRouterConfig, OpenRouterProvider, PromptComposer,
    Stage,
};
use aidev_api::{IntentResponse, Server};
use aidev_core::{init_tracing, AidevConfig, ConfigManager};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "aidev")]
#[command(about = "AI-native development environment - turn intents into code", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./.aidev.toml, then ~/.aidev/config.toml)
    #[arg(short, long, global = true, env = "AIDEV_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API server
    Serve {
        /// Address to bind
        #[arg(long)]
        host: Option<String>,

        /// Port to bind
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory of web assets to serve at /
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Turn one intent into code
    Intent {
        /// The intent, e.g. "create a login function"
        text: String,

        /// Model to use for this run (provider/model-name)
        #[arg(short, long)]
        model: Option<String>,

        /// API key, instead of OPENROUTER_API_KEY
        #[arg(long)]
        api_key: Option<String>,

        /// Print the HTTP-style JSON response instead of sections
        #[arg(long)]
        json: bool,
    },

    /// List the models available to the configured key
    Models {
        /// Only show models whose id contains this text
        #[arg(short, long)]
        filter: Option<String>,

        /// Print the full model records as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify the API key against the models endpoint
    Check,

    /// Write a default configuration file
    InitConfig {
        /// Where to write it (defaults to ./.aidev.toml)
        path: Option<PathBuf>,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Commands::InitConfig { path, force } = &cli.command {
        return init_config(path.clone(), *force);
    }

    let manager = match &cli.config {
        Some(path) => ConfigManager::load_from(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;

    let mut logging = manager.config().logging.clone();
    if cli.verbose {
        logging.level = "debug".to_string();
    }
    init_tracing(&logging);
    debug!(config = ?manager.config_path(), "configuration loaded");

    match execute_command(cli.command, manager).await {
        Ok(()) => Ok(()),
        Err(e) if is_missing_credential(&e) => {
            eprintln!("{} {}", "No API key:".yellow().bold(), e);
            eprintln!(
                "Set {} in your environment or .env file, or pass {}.",
                "OPENROUTER_API_KEY".cyan(),
                "--api-key".cyan()
            );
            std::process::exit(2);
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn execute_command(command: Commands, manager: ConfigManager) -> Result<()> {
    match command {
        Commands::Serve {
            host,
            port,
            static_dir,
        } => serve(manager, host, port, static_dir).await,
        Commands::Intent {
            text,
            model,
            api_key,
            json,
        } => run_intent(manager.config(), &text, model, api_key, json).await,
        Commands::Models { filter, json } => list_models(manager.config(), filter, json).await,
        Commands::Check => check(manager.config()).await,
        Commands::InitConfig { path, force } => init_config(path, force),
    }
}

fn is_missing_credential(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<LlmError>()
            .is_some_and(LlmError::is_missing_credential)
            || cause
                .downcast_ref::<IntentError>()
                .and_then(IntentError::as_llm)
                .is_some_and(LlmError::is_missing_credential)
    })
}

async fn serve(
    manager: ConfigManager,
    host: Option<String>,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
) -> Result<()> {
    let mut config = manager.config().clone();
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if static_dir.is_some() {
        config.server.static_dir = static_dir;
    }

    let manager = ConfigManager::from_config(config).context("Invalid server settings")?;
    let server = Server::new(Arc::new(manager)).context("Failed to initialize server")?;
    server.run().await.context("Server error")?;
    Ok(())
}

fn provider(config: &AidevConfig, api_key: Option<String>) -> Result<OpenRouterProvider, LlmError> {
    let mut provider_config = OpenRouterConfig::from_llm_config(&config.llm);
    if let Some(key) = api_key {
        provider_config = provider_config.with_api_key(key);
    }
    OpenRouterProvider::new(provider_config)
}

async fn run_intent(
    config: &AidevConfig,
    text: &str,
    model: Option<String>,
    api_key: Option<String>,
    json: bool,
) -> Result<()> {
    let provider = provider(config, api_key)?;
    let model = model.unwrap_or_else(|| config.llm.default_model.clone());
    info!(model = %model, intent = text, "running intent");

    let processor = IntentProcessor::new(PromptComposer::new(&config.codegen.language))
        .with_provider(Arc::new(provider))
        .with_generation_config(GenerationConfig::for_model(model.clone()));

    eprintln!("{} {} ({})", "Processing".cyan(), text.bold(), model.dimmed());

    let parsed = bounded(
        Stage::Parse,
        Duration::from_secs(config.server.parse_timeout_secs),
        processor.parse(text),
    )
    .await?;
    debug!(kind = ?parsed.kind, target = ?parsed.target, "intent parsed");
    if let Some(kind) = parsed.kind {
        eprintln!("{} {}", "Intent:".cyan(), kind);
    }

    let outcome = bounded(
        Stage::Execute,
        Duration::from_secs(config.server.execute_timeout_secs),
        processor.execute(&parsed),
    )
    .await?;

    let sections = outcome.to_section_map();
    if json {
        let response = IntentResponse::from_sections(text, &sections);
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    match normalize(&sections) {
        Some(map) => print_sections(&DisplaySections::from_map(&map)),
        None => println!("{}", render_fallback(&outcome)),
    }
    Ok(())
}

fn print_sections(sections: &DisplaySections) {
    for (title, body) in [
        ("Generated Code", &sections.code),
        ("AST", &sections.ast),
        ("Semantics", &sections.semantics),
    ] {
        println!("\n{}", format!("── {title} ──").cyan().bold());
        println!("{body}");
    }
}

async fn list_models(config: &AidevConfig, filter: Option<String>, json: bool) -> Result<()> {
    let provider = provider(config, None)?;
    let mut models = provider.list_models().await?;
    let total = models.len();
    if let Some(filter) = filter {
        models.retain(|m| m.id.contains(&filter));
    }
    debug!(total, shown = models.len(), "models listed");

    if json {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    for model in &models {
        if model.id == config.llm.default_model {
            println!("{} {}", model.id.green(), "(default)".dimmed());
        } else {
            println!("{}", model.id);
        }
    }
    eprintln!("{} models", models.len().to_string().yellow());
    Ok(())
}

async fn check(config: &AidevConfig) -> Result<()> {
    let key = config.llm.api_key().ok_or(LlmError::MissingCredential)?;
    println!("{}: {}", "Endpoint".cyan(), config.llm.base_url);
    println!("{}: {}", "API key".cyan(), mask_key(key));
    println!("{}: {}", "Default model".cyan(), config.llm.default_model);

    let provider = provider(config, None)?;
    let count = provider
        .check_connectivity()
        .await
        .context("Connectivity check failed")?;
    info!(count, "connectivity check passed");
    println!("{} {} models visible", "OK".green().bold(), count);
    Ok(())
}

fn init_config(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(|| PathBuf::from(".aidev.toml"));
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }

    ConfigManager::create_default_config(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} {}", "Wrote".green(), path.display());
    println!("Put your key in {} rather than the file.", "OPENROUTER_API_KEY".cyan());
    Ok(())
}

/// Show enough of a key to recognize it without revealing it.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_intent_command() {
        let cli = Cli::try_parse_from([
            "aidev",
            "intent",
            "create a login function",
            "--model",
            "openai/gpt-4o",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Intent {
                text, model, json, ..
            } => {
                assert_eq!(text, "create a login function");
                assert_eq!(model.as_deref(), Some("openai/gpt-4o"));
                assert!(json);
            }
            _ => panic!("expected intent command"),
        }
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-or-v1-0123456789abcdef"), "sk-or-v1...cdef");
        assert_eq!(mask_key("short"), "*****");
    }

    #[test]
    fn test_missing_credential_detected_through_context() {
        let err = anyhow::Error::new(IntentError::Llm(LlmError::MissingCredential))
            .context("while running intent");
        assert!(is_missing_credential(&err));

        let err = anyhow::anyhow!("something else");
        assert!(!is_missing_credential(&err));
    }
}

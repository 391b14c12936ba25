use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use polyems_client::{
    ChatSession, FallbackController, HistoryManager, HttpTransport, JsonFileStorage, KNOWN_MODELS,
    Outcome, Speaker, model_notice,
};
use polyems_core::providers::google::GoogleProvider;
use polyems_core::providers::huggingface::HuggingFaceProvider;
use polyems_core::providers::openai::OpenAiProvider;
use polyems_core::providers::openai_compat::OpenAiCompatProvider;
use polyems_core::{ModelRouter, ProviderSet, RoutingTable};
use polyems_gateway::{GatewayServer, GatewayState, RouteModels};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;

use config::PolyemsConfig;

#[derive(Parser)]
#[command(name = "polyems")]
#[command(version)]
#[command(about = "PolyEms — one chat API in front of Groq, Gemini, OpenAI and HuggingFace")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP gateway
    Serve,

    /// Send one message through the gateway
    Ask {
        /// The message to send
        message: String,

        /// Model to route to
        #[arg(short, long)]
        model: Option<String>,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,
    },

    /// Interactive chat session
    Chat {
        /// Model to start with
        #[arg(short, long)]
        model: Option<String>,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,
    },

    /// Show or clear saved chat history
    History {
        #[arg(long)]
        clear: bool,
    },

    /// List selectable models
    Models,

    /// Initialize config directory and default config
    Init,

    /// Show current configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init => cmd_init().await,
        Commands::Config => cmd_config(&cli.config),
        Commands::Models => cmd_models(),
        Commands::Serve => cmd_serve(&cli.config).await,
        Commands::Ask {
            message,
            model,
            system,
        } => cmd_ask(&cli.config, &message, model, system).await,
        Commands::Chat { model, system } => cmd_chat(&cli.config, model, system).await,
        Commands::History { clear } => cmd_history(&cli.config, clear),
    }
}

async fn cmd_init() -> Result<()> {
    let config_dir = config::config_dir();
    tokio::fs::create_dir_all(&config_dir)
        .await
        .with_context(|| format!("Failed to create config dir: {}", config_dir.display()))?;

    let config_path = config_dir.join("config.toml");
    if config_path.exists() {
        warn!("Config already exists at {}", config_path.display());
    } else {
        tokio::fs::write(&config_path, config::DEFAULT_CONFIG).await?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&config_path, std::fs::Permissions::from_mode(0o600))
                .await?;
        }
        info!("Created default config at {}", config_path.display());
    }

    println!("PolyEms initialized at {}", config_dir.display());
    println!("Export GROQ_API_KEY, GEMINI_API_KEY, OPENAI_API_KEY and HF_API_KEY, or edit {}.", config_path.display());
    Ok(())
}

fn cmd_config(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = PolyemsConfig::load(config_path)?;
    println!("{}", toml::to_string_pretty(&cfg.redacted())?);
    Ok(())
}

fn cmd_models() -> Result<()> {
    for model in KNOWN_MODELS {
        match model_notice(model) {
            Some(notice) => println!("  {}  ({})", model, notice),
            None => println!("  {}", model),
        }
    }
    Ok(())
}

fn http_client(cfg: &PolyemsConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = cfg.providers.request_timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder.build().context("Failed to build HTTP client")
}

/// Construct every provider once and wire them into the gateway
fn build_gateway(cfg: &PolyemsConfig) -> Result<GatewayServer> {
    let client = http_client(cfg)?;
    let providers = &cfg.providers;
    let sampling = &cfg.sampling;

    let groq = Arc::new(
        OpenAiCompatProvider::new(
            client.clone(),
            "groq".to_string(),
            providers.groq.api_key.clone(),
            providers.groq.base_url.clone(),
            sampling.chat,
        )
        .with_vision_sampling(sampling.vision),
    );
    let openai = Arc::new(OpenAiProvider::new(
        client.clone(),
        providers.openai.api_key.clone(),
        providers.openai.base_url.clone(),
        sampling.openai,
    ));
    let gemini = Arc::new(GoogleProvider::new(
        client.clone(),
        providers.google.api_key.clone(),
        providers.google.base_url.clone(),
        sampling.gemini,
    ));
    let huggingface = Arc::new(HuggingFaceProvider::new(
        client,
        providers.huggingface.api_key.clone(),
        providers.huggingface.base_url.clone(),
        cfg.routing.coder_upstream_model.clone(),
        sampling.coder,
    ));

    for (name, key) in [
        ("groq", &providers.groq.api_key),
        ("openai", &providers.openai.api_key),
        ("google", &providers.google.api_key),
        ("huggingface", &providers.huggingface.api_key),
    ] {
        if key.is_empty() {
            warn!("No API key for {}; requests routed there will fail", name);
        }
    }

    let router = ModelRouter::new(
        RoutingTable::standard(cfg.routing.coder_model.clone()),
        ProviderSet {
            gemini,
            openai,
            huggingface,
            default: groq.clone(),
        },
    );
    let state = GatewayState {
        router: Arc::new(router),
        vision: groq,
        models: RouteModels {
            backup_model: cfg.routing.backup_model.clone(),
            vision_model: cfg.routing.vision_model.clone(),
        },
    };

    let bind: SocketAddr = format!("{}:{}", cfg.server.host, cfg.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid bind address {}:{}",
                cfg.server.host, cfg.server.port
            )
        })?;
    GatewayServer::new(bind, &cfg.server.allowed_origin, state)
}

async fn cmd_serve(config_path: &Option<PathBuf>) -> Result<()> {
    let cfg = PolyemsConfig::load(config_path)?;
    info!("Starting PolyEms gateway...");

    let server = build_gateway(&cfg)?;
    info!(
        "Routing {} to HuggingFace, backup route uses {}",
        cfg.routing.coder_model, cfg.routing.backup_model
    );

    server
        .run_until(async {
            if let Err(e) = signal::ctrl_c().await {
                warn!("Failed to listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
}

fn open_history(cfg: &PolyemsConfig) -> HistoryManager {
    let path = config::expand_home(&cfg.client.history_file);
    HistoryManager::load(
        Box::new(JsonFileStorage::new(path)),
        cfg.client.history_limit,
    )
}

fn build_session(
    cfg: &PolyemsConfig,
    model: Option<String>,
    system: Option<String>,
) -> Result<ChatSession> {
    let client = http_client(cfg)?;
    let transport = Arc::new(HttpTransport::new(client, cfg.client.gateway_url.clone()));
    let controller = FallbackController::new(
        transport,
        cfg.client.primary_path.clone(),
        cfg.client.backup_path.clone(),
    );

    let mut session = ChatSession::new(controller, open_history(cfg))
        .with_model(cfg.client.default_model.clone())
        .with_system_prompt(system.unwrap_or_else(|| cfg.client.system_prompt.clone()));
    if let Some(model) = model {
        if let Some(notice) = session.select_model(model) {
            eprintln!("Note: {}", notice);
        }
    }
    Ok(session)
}

async fn cmd_ask(
    config_path: &Option<PathBuf>,
    message: &str,
    model: Option<String>,
    system: Option<String>,
) -> Result<()> {
    let cfg = PolyemsConfig::load(config_path)?;
    let mut session = build_session(&cfg, model, system)?;

    match session.send(message).await {
        Some(outcome) => {
            println!("{}", outcome.text());
            if outcome == Outcome::Failed {
                anyhow::bail!("Both gateway routes failed");
            }
        }
        None => warn!("Empty message, nothing sent"),
    }
    Ok(())
}

async fn cmd_chat(
    config_path: &Option<PathBuf>,
    model: Option<String>,
    system: Option<String>,
) -> Result<()> {
    let cfg = PolyemsConfig::load(config_path)?;
    let mut session = build_session(&cfg, model, system)?;

    println!("Chatting with {} via {}", session.model(), cfg.client.gateway_url);
    println!("Commands: /models /model NAME /history /replay N /clear /system TEXT /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim_end();
        if let Some(command) = input.strip_prefix('/') {
            let (name, arg) = command
                .split_once(' ')
                .map_or((command, ""), |(n, a)| (n, a.trim()));
            match name {
                "quit" | "exit" => break,
                "models" => cmd_models()?,
                "model" if arg.is_empty() => println!("Current model: {}", session.model()),
                "model" => {
                    if let Some(notice) = session.select_model(arg) {
                        println!("Note: {}", notice);
                    }
                    println!("Model set to {}", session.model());
                }
                "history" => print_history(session.history()),
                "replay" => {
                    let replayed = match arg.parse::<usize>().ok().and_then(|n| n.checked_sub(1)) {
                        Some(index) => session.replay(index).is_some(),
                        None => false,
                    };
                    if replayed {
                        for entry in session.transcript() {
                            print_line(entry.speaker, &entry.text);
                        }
                    } else {
                        println!("No history entry '{}'. Use /history to list them.", arg);
                    }
                }
                "clear" => {
                    session.clear();
                    println!("Transcript and history cleared");
                }
                "system" if arg.is_empty() => {
                    println!("System prompt: {:?}", session.system_prompt())
                }
                "system" => {
                    session.set_system_prompt(arg);
                    println!("System prompt updated");
                }
                other => println!("Unknown command /{}", other),
            }
            continue;
        }

        if let Some(outcome) = session.send(input).await {
            print_line(Speaker::Bot, outcome.text());
        }
    }
    Ok(())
}

fn cmd_history(config_path: &Option<PathBuf>, clear: bool) -> Result<()> {
    let cfg = PolyemsConfig::load(config_path)?;
    let mut history = open_history(&cfg);
    if clear {
        history.clear();
        println!("History cleared");
    } else {
        print_history(&history);
    }
    Ok(())
}

fn print_history(history: &HistoryManager) {
    if history.is_empty() {
        println!("No history yet");
        return;
    }
    for (i, entry) in history.entries().enumerate() {
        println!("{:>2}. {}", i + 1, entry.query);
    }
}

fn print_line(speaker: Speaker, text: &str) {
    match speaker {
        Speaker::User => println!("you> {}", text),
        Speaker::Bot => println!("bot> {}\n", text),
    }
}

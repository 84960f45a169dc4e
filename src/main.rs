//! uagent-client - query uAgents through a local bridge agent
//!
//! Starts (or reuses) the bridge agent, sends one query and prints the
//! result as JSON.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uagent_client::{bridge_id, BridgeManager, UAgentClient, UAgentConfig};

#[derive(Parser)]
#[command(name = "uagent-client")]
#[command(version)]
#[command(about = "Query uAgents through a local bridge agent")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "UAGENT_CLIENT_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    /// Bridge base URL (default http://localhost:<bridge_port>)
    #[arg(long, global = true)]
    bridge_url: Option<String>,

    /// Never spawn a bridge; expect one to be running
    #[arg(long, global = true)]
    no_auto_start: bool,

    /// Seed for a dedicated per-user bridge
    #[arg(long, global = true, env = "UAGENT_USER_SEED")]
    seed: Option<String>,

    /// Agentverse token for a dedicated per-user bridge
    #[arg(long, global = true, env = "AGENTVERSE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a query and print the full result
    Query {
        /// Target agent address
        address: String,

        /// Query text
        message: String,

        /// Correlation id (generated when omitted)
        #[arg(long)]
        request_id: Option<String>,

        /// Query timeout in milliseconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Send a query and print only the response text
    Ask {
        /// Target agent address
        address: String,

        /// Query text
        message: String,
    },

    /// Check whether the bridge answers
    Ping,

    /// Wait for the bridge to become ready
    Wait {
        /// Maximum wait in seconds
        #[arg(long, default_value = "30")]
        max_wait: u64,
    },

    /// Print the bridge id derived from a seed
    BridgeId {
        seed: String,
    },

    /// Show configuration
    Config {
        /// Show default configuration
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries results
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("uagent_client={}", log_level).into()),
        )
        .with(
            cli.json_logs
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!cli.json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    let mut config = match cli.config {
        Some(ref path) => UAgentConfig::load(path)?,
        None => UAgentConfig::default(),
    };
    if let Some(url) = cli.bridge_url {
        config.client.bridge_url = Some(url);
    }
    if cli.no_auto_start {
        config.client.auto_start_bridge = false;
    }
    if cli.seed.is_some() {
        config.client.user_seed = cli.seed;
    }
    if cli.token.is_some() {
        config.client.agentverse_token = cli.token;
    }

    match cli.command {
        Commands::Query {
            address,
            message,
            request_id,
            timeout,
        } => {
            if let Some(timeout) = timeout {
                config.client.timeout_ms = timeout;
            }
            config.validate()?;
            run_query(config, &address, &message, request_id.as_deref()).await
        }
        Commands::Ask { address, message } => run_ask(config, &address, &message).await,
        Commands::Ping => run_ping(config).await,
        Commands::Wait { max_wait } => run_wait(config, Duration::from_secs(max_wait)).await,
        Commands::BridgeId { seed } => {
            print_json(&serde_json::json!({ "seed": seed, "bridge_id": bridge_id(&seed) }))?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config { default } => {
            show_config(if default { None } else { Some(&config) })?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn connect(config: UAgentConfig) -> (Arc<BridgeManager>, UAgentClient) {
    let manager = Arc::new(BridgeManager::new(config.bridge));
    let client = UAgentClient::with_manager(config.client, manager.clone()).await;
    (manager, client)
}

async fn run_query(
    config: UAgentConfig,
    address: &str,
    message: &str,
    request_id: Option<&str>,
) -> Result<ExitCode> {
    let (manager, client) = connect(config).await;
    let result = client.query(address, message, request_id).await;
    drop(client);
    manager.shutdown();

    let result = result?;
    print_json(&result)?;
    Ok(exit_code(result.is_success()))
}

async fn run_ask(config: UAgentConfig, address: &str, message: &str) -> Result<ExitCode> {
    let (manager, client) = connect(config).await;
    let answer = client.ask(address, message).await;
    drop(client);
    manager.shutdown();

    match answer {
        Ok(response) => {
            println!("{}", response);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_ping(mut config: UAgentConfig) -> Result<ExitCode> {
    // Pinging never starts a bridge
    config.client.auto_start_bridge = false;
    let (_manager, client) = connect(config).await;
    let alive = client.ping().await;
    print_json(&serde_json::json!({ "bridge_url": client.bridge_url(), "alive": alive }))?;
    Ok(exit_code(alive))
}

async fn run_wait(config: UAgentConfig, max_wait: Duration) -> Result<ExitCode> {
    let (_manager, client) = connect(config).await;
    let ready = client.wait_for_bridge(max_wait).await;
    print_json(&serde_json::json!({ "bridge_url": client.bridge_url(), "ready": ready }))?;
    Ok(exit_code(ready))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn show_config(config: Option<&UAgentConfig>) -> Result<()> {
    let config = config.cloned().unwrap_or_default();
    let toml = toml::to_string_pretty(&config)?;
    println!("{}", toml);
    Ok(())
}

//! weaveproxy - Weave Storage Node Proxy
//!
//! Presents itself to Weave clients as their storage node and forwards
//! their storage requests to the node the authentication service assigned.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use weaveproxy::api::{Dispatcher, ProxyServer};
use weaveproxy::config::{ProxyConfig, StorageBackend};
use weaveproxy::error::Result;
use weaveproxy::fetch::{HttpFetcher, ReqwestFetcher};
use weaveproxy::resolver::NodeResolver;
use weaveproxy::store::{MemoryNodeStore, NodeStore, SqliteNodeStore};

/// weaveproxy - Weave Storage Node Proxy
#[derive(Parser)]
#[command(name = "weaveproxy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "weaveproxy.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy
    Start {
        /// Address to listen on (overrides server.bind_address)
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "weaveproxy.toml")]
        output: PathBuf,
    },

    /// Validate configuration file
    Validate,

    /// Show proxy configuration
    Info,

    /// List cached user → storage node assignments
    Nodes {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = cli
        .log_level
        .clone()
        .or_else(|| {
            ProxyConfig::from_file(&cli.config)
                .ok()
                .map(|c| c.logging.level)
        })
        .unwrap_or_else(|| "info".to_string());
    init_logging(&level);

    match cli.command {
        Commands::Start { listen } => run_start(cli.config, listen).await,
        Commands::Init { output } => run_init(output),
        Commands::Validate => run_validate(cli.config),
        Commands::Info => run_info(cli.config),
        Commands::Nodes { json } => run_nodes(cli.config, json).await,
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Start the proxy
async fn run_start(config_path: PathBuf, listen: Option<String>) -> Result<()> {
    tracing::info!("Starting weaveproxy...");

    let mut config = match ProxyConfig::from_file(&config_path) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Please check that the config file exists and is valid TOML");
            return Err(e);
        }
    };
    if let Some(listen) = listen {
        config.server.bind_address = listen;
    }

    let store: Arc<dyn NodeStore> = match config.storage.backend {
        StorageBackend::Sqlite => match SqliteNodeStore::open(&config.node_db_path()) {
            Ok(s) => {
                tracing::info!("Node store: {}", config.node_db_path().display());
                Arc::new(s)
            }
            Err(e) => {
                tracing::error!("Failed to open node store {:?}: {}", config.node_db_path(), e);
                return Err(e);
            }
        },
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory node store; assignments are lost on restart");
            Arc::new(MemoryNodeStore::new())
        }
    };

    let fetcher: Arc<dyn HttpFetcher> = Arc::new(ReqwestFetcher::new(config.upstream_timeout())?);
    let resolver = Arc::new(NodeResolver::new(
        store,
        Arc::clone(&fetcher),
        config.upstream.auth_server.clone(),
    ));
    tracing::info!("Authentication service: {}", config.upstream.auth_server);

    let dispatcher = Arc::new(Dispatcher::new(
        resolver,
        fetcher,
        config.server.public_url.clone(),
        config.server.max_body_bytes,
    ));

    ProxyServer::new(config.server.clone(), dispatcher)
        .start()
        .await?;

    tracing::info!("weaveproxy stopped");
    Ok(())
}

/// Write a starter configuration file
fn run_init(output: PathBuf) -> Result<()> {
    let config_content = r#"# weaveproxy Configuration
# Generated configuration file

[server]
bind_address = "0.0.0.0:8080"
# Base URL clients should use to reach this proxy. Derived from the
# request's Host header when unset.
# public_url = "https://myproxy.example.com"
max_body_bytes = 16777216

[upstream]
auth_server = "https://auth.services.mozilla.com"
timeout_secs = 30

[storage]
# "sqlite" (persistent) or "memory" (lost on restart)
backend = "sqlite"
data_dir = "/var/lib/weaveproxy"

[logging]
level = "info"
"#;

    std::fs::write(&output, config_content)?;
    println!("Configuration file created: {}", output.display());
    println!("Then start with: weaveproxy start --config {}", output.display());

    Ok(())
}

/// Validate configuration
fn run_validate(config_path: PathBuf) -> Result<()> {
    match ProxyConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Bind Address: {}", config.server.bind_address);
            println!("  Auth Server:  {}", config.upstream.auth_server);
            println!("  Node Store:   {} ({})", config.storage.backend, config.node_db_path().display());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Show proxy configuration
fn run_info(config_path: PathBuf) -> Result<()> {
    let config = ProxyConfig::from_file(&config_path)?;

    println!("weaveproxy Information");
    println!("======================");
    println!();
    println!("Bind Address:     {}", config.server.bind_address);
    println!(
        "Public URL:       {}",
        config.server.public_url.as_deref().unwrap_or("(from Host header)")
    );
    println!("Max Body:         {} bytes", config.server.max_body_bytes);
    println!();
    println!("Auth Server:      {}", config.upstream.auth_server);
    println!("Upstream Timeout: {} s", config.upstream.timeout_secs);
    println!();
    println!("Store Backend:    {}", config.storage.backend);
    println!("Data Directory:   {}", config.data_dir().display());
    println!("Node Store:       {}", config.node_db_path().display());

    Ok(())
}

/// List cached node assignments
async fn run_nodes(config_path: PathBuf, json: bool) -> Result<()> {
    let config = ProxyConfig::from_file(&config_path)?;
    if config.storage.backend == StorageBackend::Memory {
        println!("The memory backend keeps nothing between runs; no nodes to list");
        return Ok(());
    }
    let store = SqliteNodeStore::open(&config.node_db_path())?;
    let records = store.list().await?;

    if json {
        let output = serde_json::to_string_pretty(&records)
            .map_err(|e| weaveproxy::Error::Internal(format!("JSON encoding failed: {}", e)))?;
        println!("{}", output);
        return Ok(());
    }

    if records.is_empty() {
        println!("No storage nodes cached yet");
        return Ok(());
    }

    println!("{:<32} NODE", "USER");
    for record in records {
        println!("{:<32} {}", record.user, record.url);
    }

    Ok(())
}

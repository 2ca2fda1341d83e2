//! sdk-router: load-aware routing across lbrynet SDK servers
//!
//! Keeps a pool of SDK servers fresh, polls each one for the number of
//! loaded wallets and serves random or least-loaded picks over HTTP.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use sdk_router::{
    config::AppConfig,
    metrics::{InfluxDbSink, PrometheusSink, SinkSet},
    router::PollerSettings,
    server::{run_server, StatusState},
    wallet_id, Router,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Parser)]
#[command(name = "sdk-router")]
#[command(version = "0.1.0")]
#[command(about = "Load-aware router for lbrynet SDK servers")]
#[command(long_about = "
sdk-router keeps track of a pool of lbrynet SDK servers and their load:
  - Server list from config or a store file (refreshed at most every 30s)
  - Periodic wallet_list polling to estimate each server's load
  - Random and least-loaded selection over HTTP
  - Per-server load gauges for Prometheus and InfluxDB

Example usage:
  sdk-router run --config config.yaml
  sdk-router probe
  sdk-router wallet-id 42
")]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, default_value = "config.yaml")]
    config: PathBuf,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the load poller and status server
    Run {
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Validate configuration file
    CheckConfig,

    /// Print the current server pool
    ListServers,

    /// Poll every server once and print its load
    Probe,

    /// Print the wallet ID for a user
    WalletId {
        user_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level_filter = if let Some(level) = cli.log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&level_filter))
        .init();

    match cli.command {
        Commands::Run { port } => {
            run(cli.config, port).await?;
        }
        Commands::CheckConfig => {
            check_config(cli.config)?;
        }
        Commands::ListServers => {
            list_servers(cli.config).await?;
        }
        Commands::Probe => {
            probe(cli.config).await?;
        }
        Commands::WalletId { user_id } => {
            println!("{}", wallet_id(user_id));
        }
    }

    Ok(())
}

/// Run the poller and the status server until Ctrl-C
async fn run(config_path: PathBuf, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config_or_exit(&config_path);
    if let Some(port) = port_override {
        config.server.port = port;
    }

    tracing::info!("Loading configuration from {:?}", config_path);

    let mut sinks = SinkSet::new();
    let prometheus = if config.metrics.prometheus.enabled {
        let sink = Arc::new(PrometheusSink::new());
        sinks.add(sink.clone());
        Some(sink)
    } else {
        None
    };
    if config.metrics.influxdb.enabled {
        match InfluxDbSink::from_config(&config.metrics.influxdb) {
            Ok(sink) => {
                sinks.add(Arc::new(sink));
                tracing::info!("InfluxDB sink enabled");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to initialize InfluxDB sink");
            }
        }
    }

    let router = Arc::new(Router::from_config(&config, sinks).await?);
    let cancel = CancellationToken::new();

    let settings = PollerSettings {
        interval: Duration::from_secs(config.poller.interval_seconds),
        max_jitter: Duration::from_secs(config.poller.max_jitter_seconds),
    };
    let poller = router.start_watching(settings, cancel.child_token());

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        }
        tracing::info!("Shutting down");
        shutdown.cancel();
    });

    let state = StatusState {
        router,
        strategy: config.router.strategy,
        prometheus,
        poller: Some(poller.subscribe()),
    };
    let served = run_server(&config.server, state, cancel.clone()).await;

    cancel.cancel();
    poller.stop().await?;
    served
}

/// Validate configuration file
fn check_config(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    match AppConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration file is valid\n");
            println!("Status server:");
            println!("  Listen: {}:{}", config.server.host, config.server.port);
            println!("\nRouter:");
            println!("  Strategy: {}", config.router.strategy);
            if config.router.servers.is_empty() {
                if let Some(ref path) = config.store.path {
                    println!("  Store: {}", path.display());
                }
                println!("  Refresh throttle: {}s", config.router.refresh_throttle_seconds);
            } else {
                println!("  Static servers:");
                for server in &config.router.servers {
                    println!("    - {}", server);
                }
            }
            println!("\nPoller:");
            println!("  Interval: {}s", config.poller.interval_seconds);
            println!("  Max jitter: {}s", config.poller.max_jitter_seconds);
            println!("  RPC timeout: {}s", config.poller.rpc_timeout_seconds);
            println!("  Concurrency: {}", config.poller.concurrency);
            println!("\nMetrics:");
            println!("  Prometheus: {}", config.metrics.prometheus.enabled);
            println!("  InfluxDB: {}", config.metrics.influxdb.enabled);
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Print the current server pool
async fn list_servers(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_or_exit(&config_path);
    let router = Router::from_config(&config, SinkSet::new()).await?;

    let servers = router.get_all_servers().await;
    if servers.is_empty() {
        println!("✗ No SDK servers available");
        std::process::exit(1);
    }

    println!("SDK servers ({}):", servers.len());
    for server in servers.iter() {
        println!("  {:20} {}", server.name, server.address);
    }
    Ok(())
}

/// Poll every server once
async fn probe(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_or_exit(&config_path);
    let router = Router::from_config(&config, SinkSet::new()).await?;

    let report = router.poll_once(&CancellationToken::new()).await;
    let loads = router.load().snapshot();

    for server in router.get_all_servers().await.iter() {
        match loads.get(&server.address) {
            Some(load) => println!("✓ {:20} {:40} {} wallets", server.name, server.address, load),
            None => println!("✗ {:20} {:40} not responding", server.name, server.address),
        }
    }

    println!(
        "\n{} responsive, {} not responding",
        report.responsive, report.unresponsive
    );
    if let Some(server) = report.least_loaded {
        println!("Least loaded: {}", server);
    }
    Ok(())
}

/// Load configuration or exit with error
fn load_config_or_exit(config_path: &PathBuf) -> AppConfig {
    match AppConfig::from_file(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            eprintln!("\nMake sure you have a config.yaml file.");
            eprintln!("You can copy config.yaml.default and modify it:");
            eprintln!("  cp config.yaml.default config.yaml");
            std::process::exit(1);
        }
    }
}

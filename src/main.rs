//! parkgate - parking barrier gate orchestrator
//!
//! Runs one gate pipeline per configured camera and serves the operator API.
//!
//! # Usage
//!
//! ```bash
//! # Run with ./parkgate.toml (or $PARKGATE_CONFIG)
//! cargo run --release
//!
//! # Explicit config file and bind address
//! ./parkgate --config /etc/parkgate/gates.toml --addr 0.0.0.0:9090
//!
//! # Validate a config file and exit
//! ./parkgate check --config gates.toml
//! ```
//!
//! # Environment Variables
//!
//! - `PARKGATE_CONFIG`: Path to the gate config (TOML)
//! - `PARKGATE_ADDR`: Override the server bind address
//! - `PARKGATE_CORS_ORIGINS`: Comma-separated allowed CORS origins
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::Parser;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use parkgate::acquisition::{stream_session, HttpSignaling, ProbePeerFactory, WsTransport};
use parkgate::api::{create_app, ApiState};
use parkgate::config::watcher::{run_config_watcher, ConfigEvent};
use parkgate::config::{self, GateConfig};
use parkgate::storage::{DecisionLog, FanoutSink, HistorySink, HttpForwardSink};
use parkgate::{ActuatorClient, CameraRegistry, PipelineDeps};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "parkgate")]
#[command(about = "Parking barrier gate orchestrator")]
#[command(version)]
struct CliArgs {
    /// Path to the gate config file (overrides the default search order)
    #[arg(short, long, env = "PARKGATE_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Override the server address from the config
    #[arg(short, long, env = "PARKGATE_ADDR")]
    addr: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Do not persist decisions locally
    #[arg(long)]
    no_history: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Validate the config and print the effective settings
    Check,
    /// Print the built-in default config as TOML
    Defaults,
}

// ============================================================================
// Task Supervision
// ============================================================================

#[derive(Debug)]
enum TaskName {
    HttpServer,
    ConfigWatcher,
    Registry,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::ConfigWatcher => write!(f, "ConfigWatcher"),
            TaskName::Registry => write!(f, "Registry"),
        }
    }
}

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Run the supervisor loop: monitor tasks, cancel everything on failure.
async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    info!("[Supervisor] All tasks spawned, monitoring");

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("[Supervisor] Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("[Supervisor] Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("[Supervisor] Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("[Supervisor] Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("[Supervisor] All tasks completed");
                        break;
                    }
                }
            }
        }
    }

    // Let the remaining tasks drain (registry stops its pipelines)
    while let Some(result) = task_set.join_next().await {
        match result {
            Ok(Ok(task_name)) => info!("[Supervisor] Task {} stopped", task_name),
            Ok(Err(e)) => warn!("[Supervisor] Task ended with error during shutdown: {}", e),
            Err(e) => warn!("[Supervisor] Task panicked during shutdown: {}", e),
        }
    }

    Ok(())
}

// ============================================================================
// Startup
// ============================================================================

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<(GateConfig, Option<PathBuf>)> {
    match path {
        Some(p) => {
            let config = GateConfig::load_from_file(p)
                .with_context(|| format!("Failed to load config from {}", p.display()))?;
            info!(path = %p.display(), cameras = config.cameras.len(), "Loaded gate config");
            Ok((config, Some(p.clone())))
        }
        None => Ok(GateConfig::load()),
    }
}

/// History sinks from `[history]`: local sled log and optional forwarding.
fn build_history(config: &GateConfig, disabled: bool) -> Result<(Option<DecisionLog>, Arc<dyn HistorySink>)> {
    let mut fanout = FanoutSink::new();

    let log = if disabled {
        info!("[History] local decision log disabled");
        None
    } else {
        let log = DecisionLog::open(&config.history.path)
            .with_context(|| format!("Failed to open decision log at {}", config.history.path))?;
        fanout = fanout.with(Arc::new(log.clone()));
        Some(log)
    };

    if let Some(url) = config.history.forward_url.as_deref() {
        let forward = HttpForwardSink::new(url, config.timing.actuator_timeout())
            .context("Failed to build history forwarding client")?;
        info!(url = %url, "[History] forwarding decisions");
        fanout = fanout.with(Arc::new(forward));
    }

    Ok((log, Arc::new(fanout)))
}

fn build_deps(config: &GateConfig, history: Arc<dyn HistorySink>) -> Result<PipelineDeps> {
    let actuator = ActuatorClient::new(config.timing.actuator_timeout())
        .context("Failed to build actuator client")?;
    let signaling = Arc::new(
        HttpSignaling::new(stream_session::signaling_timeout())
            .context("Failed to build signalling client")?,
    );
    let peers = ProbePeerFactory::new(signaling.clone(), config.timing.stream_check());
    Ok(PipelineDeps {
        actuator: Arc::new(actuator),
        history,
        feed_transport: Arc::new(WsTransport),
        peers: Arc::new(peers),
        signaling,
    })
}

fn print_check(config: &GateConfig, path: Option<&PathBuf>) {
    match path {
        Some(p) => println!("config: {}", p.display()),
        None => println!("config: built-in defaults"),
    }
    println!("server: {}", config.server.addr);
    println!("history: {}", config.history.path);
    for cam in &config.cameras {
        println!(
            "camera {:<8} {:<5} {:<7} enabled={} stream={} feed={} actuator={}",
            cam.id,
            cam.direction.to_string(),
            format!("{:?}", cam.open_policy).to_lowercase(),
            cam.enabled,
            cam.stream.is_some(),
            cam.feed.is_some(),
            cam.actuator.is_some(),
        );
    }
    for w in config::validation::suspicious_values(config) {
        println!("warning: {}", w);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_logging(args.log_json);

    match args.command {
        Some(SubCommand::Defaults) => {
            print!("{}", GateConfig::default().to_toml()?);
            return Ok(());
        }
        Some(SubCommand::Check) => {
            let (config, path) = load_config(args.config.as_ref())?;
            print_check(&config, path.as_ref());
            return Ok(());
        }
        None => {}
    }

    let (gate_config, config_path) = load_config(args.config.as_ref())?;
    let server_addr = args.addr.clone().unwrap_or_else(|| gate_config.server.addr.clone());
    config::init(gate_config, config_path.clone());
    let gate_config = config::get();

    info!("parkgate {} | cameras: {}", env!("CARGO_PKG_VERSION"), gate_config.enabled_sessions().len());

    let (decision_log, history) = build_history(&gate_config, args.no_history)?;
    let deps = build_deps(&gate_config, history)?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown");
        shutdown_token.cancel();
    });

    let mut registry = CameraRegistry::new(deps, cancel_token.child_token());
    registry.start_all(&gate_config);
    let directory = registry.directory();

    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("Failed to bind {}", server_addr))?;
    info!("[HttpServer] Listening on http://{}/api/v1", server_addr);
    let app = create_app(ApiState::new(directory, decision_log.clone()));

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();
    spawn_http_server(&mut task_set, listener, app, cancel_token.clone());

    let (config_tx, config_rx) = mpsc::channel::<ConfigEvent>(8);
    if let Some(path) = config_path {
        let token = cancel_token.clone();
        task_set.spawn(async move {
            run_config_watcher(path, config_tx, token).await;
            Ok(TaskName::ConfigWatcher)
        });
    } else {
        info!("[ConfigWatcher] No config file, hot reload disabled");
        drop(config_tx);
    }

    task_set.spawn(async move {
        registry.run(config_rx).await;
        Ok(TaskName::Registry)
    });

    let result = run_supervisor(&mut task_set, cancel_token).await;

    if let Some(log) = decision_log {
        if let Err(e) = log.flush() {
            warn!(error = %e, "Failed to flush decision log");
        }
    }
    info!("parkgate stopped");
    result
}

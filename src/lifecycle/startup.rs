//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Initialize all subsystems in dependency order
//! - Start background tasks (prober, admin API, config reload)
//! - Run until a shutdown signal, then stop everything in order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Subsystems initialize in order, not concurrently
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use crate::admin::AdminServer;
use crate::config::{
    load_config, watcher::reload_into, ConfigError, ConfigWatcher, GatewayConfig, RoutingConfig,
};
use crate::gateway::Orchestrator;
use crate::health::HealthProber;
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::signals::{SignalEvent, Signals};
use crate::observability::{logging, metrics};
use crate::resilience::ProviderError;

const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("logging: {0}")]
    Logging(#[from] logging::TryInitError),

    #[error("metrics: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("provider setup: {0}")]
    Provider(#[from] ProviderError),

    #[error("config watcher: {0}")]
    Watch(#[from] notify::Error),

    #[error("invalid address '{0}'")]
    Address(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Run the failover service from the config file at `path` until SIGINT/SIGTERM.
pub async fn launch(path: &Path) -> Result<(), StartupError> {
    let config = load_config(path)?;
    logging::init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        providers = config.providers.len(),
        strategy = ?config.routing.strategy,
        call_timeout_ms = config.routing.call_timeout_ms,
        "provider-failover starting"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(parse_addr(&config.observability.metrics_address)?)?;
    }

    let orchestrator = Arc::new(Orchestrator::from_config(&config)?);
    let shutdown = Shutdown::new();
    let mut tasks = Vec::new();

    let prober = HealthProber::new(Arc::clone(orchestrator.registry()), config.prober.clone());
    tasks.push(tokio::spawn(prober.run(shutdown.subscribe())));

    let (watcher, updates) = ConfigWatcher::new(path);
    let reload_tx = watcher.sender();
    // Dropping the watcher handle stops file notifications
    let _watch_guard = watcher.run()?;
    tasks.push(tokio::spawn(apply_reloads(
        Arc::clone(&orchestrator),
        config.routing.clone(),
        updates,
        shutdown.subscribe(),
    )));

    if config.admin.enabled {
        let listener = TcpListener::bind(parse_addr(&config.admin.bind_address)?).await?;
        if config.admin.api_key.is_none() {
            tracing::warn!("Admin API running without authentication");
        }
        let server = AdminServer::new(Arc::clone(&orchestrator), &config.admin);
        let rx = shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = server.run(listener, rx).await {
                tracing::error!(error = %e, "Admin API failed");
            }
        }));
    }

    let mut signals = Signals::install()?;
    loop {
        match signals.recv().await? {
            SignalEvent::Reload => {
                tracing::info!(path = ?path, "Reloading configuration");
                reload_into(path, &reload_tx);
            }
            SignalEvent::Shutdown => break,
        }
    }

    tracing::info!("Shutting down");
    shutdown.trigger();
    shutdown.drain(tasks, SHUTDOWN_DEADLINE).await;
    tracing::info!("Shutdown complete");
    Ok(())
}

async fn apply_reloads(
    orchestrator: Arc<Orchestrator>,
    routing: RoutingConfig,
    mut updates: mpsc::UnboundedReceiver<GatewayConfig>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = shutdown.recv() => break,
            update = updates.recv() => {
                let Some(config) = update else { break };
                if config.routing != routing {
                    tracing::warn!("Routing settings changed on reload; restart to apply them");
                }
                if let Err(e) = orchestrator.apply_providers(&config) {
                    tracing::error!(error = %e, "Reloaded providers rejected, keeping current set");
                }
            }
        }
    }
}

fn parse_addr(address: &str) -> Result<SocketAddr, StartupError> {
    address
        .parse()
        .map_err(|_| StartupError::Address(address.to_string()))
}

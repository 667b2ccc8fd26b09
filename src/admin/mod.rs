//! Admin API.
//!
//! # Endpoints
//! - `GET /admin/status`: version and circuit summary
//! - `GET /providers/health`: health projection of every provider
//! - `GET /providers/{id}/health`: one provider
//! - `POST /providers/{id}/force-state`: `{"state": "OPEN" | "CLOSED"}`
//!
//! # Design Decisions
//! - Read endpoints are pure projections of registry + telemetry
//! - Force-state goes through the breaker's own lock, is rate limited per
//!   provider and always logged
//! - Bearer auth applies to every route when an API key is configured

pub mod auth;
pub mod handlers;
pub mod rate_limit;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use self::rate_limit::ForceStateLimiter;
use crate::config::AdminConfig;
use crate::gateway::Orchestrator;

const ADMIN_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// State injected into admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub orchestrator: Arc<Orchestrator>,
    pub limiter: Arc<ForceStateLimiter>,
    pub api_key: Option<Arc<str>>,
}

impl AdminState {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &AdminConfig) -> Self {
        Self {
            orchestrator,
            limiter: Arc::new(ForceStateLimiter::new(
                config.force_state_burst,
                config.force_state_per_minute,
            )),
            api_key: config.api_key.as_deref().map(Arc::from),
        }
    }
}

#[allow(deprecated)]
pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/providers/health", get(get_providers_health))
        .route("/providers/{id}/health", get(get_provider_health))
        .route("/providers/{id}/force-state", post(force_state))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(ADMIN_REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

/// Admin HTTP server.
pub struct AdminServer {
    router: Router,
}

impl AdminServer {
    pub fn new(orchestrator: Arc<Orchestrator>, config: &AdminConfig) -> Self {
        Self {
            router: setup_admin_router(AdminState::new(orchestrator, config)),
        }
    }

    /// Serve until `shutdown` fires, then drain in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "Admin API starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("Admin API stopped");
        Ok(())
    }
}

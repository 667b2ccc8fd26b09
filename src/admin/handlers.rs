use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::admin::AdminState;
use crate::gateway::ProviderHealth;
use crate::observability::metrics;
use crate::registry::RegistryError;
use crate::resilience::{BreakerSnapshot, CircuitState, ForcedState};

#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub providers: usize,
    pub open_circuits: usize,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ForceStateRequest {
    pub state: ForcedState,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ForceStateResponse {
    pub provider: String,
    pub breaker: BreakerSnapshot,
}

/// Errors the admin API answers with a JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    NotFound(#[from] RegistryError),

    #[error("force-state for '{provider}' rate limited, retry in {retry_after_secs}s")]
    RateLimited { provider: String, retry_after_secs: u64 },
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        let mut response = (status, body).into_response();
        if let Self::RateLimited { retry_after_secs, .. } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let report = state.orchestrator.health_report();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        providers: report.len(),
        open_circuits: report
            .iter()
            .filter(|p| p.breaker_state != CircuitState::Closed)
            .count(),
    })
}

pub async fn get_providers_health(State(state): State<AdminState>) -> Json<Vec<ProviderHealth>> {
    Json(state.orchestrator.health_report())
}

pub async fn get_provider_health(
    State(state): State<AdminState>,
    Path(id): Path<String>,
) -> Result<Json<ProviderHealth>, ApiError> {
    Ok(Json(state.orchestrator.provider_health(&id)?))
}

pub async fn force_state(
    State(state): State<AdminState>,
    Path(id): Path<String>,
    Json(request): Json<ForceStateRequest>,
) -> Result<Json<ForceStateResponse>, ApiError> {
    // Unknown ids must not consume or create rate-limit buckets
    let registry = state.orchestrator.registry();
    registry.get(&id)?;
    if state.limiter.len() > registry.len() {
        state.limiter.retain(|provider| registry.get(provider).is_ok());
    }

    if let Err(wait) = state.limiter.check(&id) {
        tracing::warn!(provider = %id, requested = ?request.state, "Force-state rate limited");
        metrics::record_rate_limited();
        return Err(ApiError::RateLimited {
            provider: id,
            retry_after_secs: wait.as_secs_f64().ceil() as u64,
        });
    }

    tracing::info!(provider = %id, requested = ?request.state, "Force-state requested via admin API");
    let breaker = state.orchestrator.force_state(&id, request.state)?;
    Ok(Json(ForceStateResponse {
        provider: id,
        breaker,
    }))
}

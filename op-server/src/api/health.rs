//! Liveness and readiness probes.
//!
//! `/healthz` answers as long as the process serves requests. `/ready`
//! reports whether the provider can actually issue tokens: a signing key has
//! arrived and storage is reachable. Both paths are fixed, not configurable.

use crate::openapi::HEALTH_TAG;
use crate::provider::Provider;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::timeout;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
pub enum HealthStatus {
    /// Component is functioning
    #[serde(rename = "ok")]
    Ok,
    /// Component reported a problem
    #[serde(rename = "error")]
    Error,
}

/// Status of a single readiness component.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ComponentStatus {
    pub status: HealthStatus,
    /// What went wrong, present only on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentStatus {
    fn ok() -> Self {
        Self {
            status: HealthStatus::Ok,
            error: None,
        }
    }

    fn error(message: &str) -> Self {
        Self {
            status: HealthStatus::Error,
            error: Some(message.to_string()),
        }
    }
}

/// Body of the liveness probe.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LivenessResponse {
    pub status: HealthStatus,
}

/// Aggregated readiness over the provider's collaborators.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub signer: ComponentStatus,
    pub storage: ComponentStatus,
    /// HTTP status code to return
    #[serde(skip)]
    pub status_code: StatusCode,
}

impl IntoResponse for ReadinessResponse {
    fn into_response(self) -> axum::response::Response {
        (self.status_code, Json(self)).into_response()
    }
}

async fn check_readiness(provider: &Provider) -> ReadinessResponse {
    let signer = if provider.signer_ready() {
        ComponentStatus::ok()
    } else {
        ComponentStatus::error("no signing key has been delivered yet")
    };

    let probe_timeout = Duration::from_secs_f64(provider.config().healthcheck_timeout);
    let storage = match timeout(probe_timeout, provider.storage_ready()).await {
        Ok(Ok(())) => ComponentStatus::ok(),
        Ok(Err(err)) => ComponentStatus::error(&err.to_string()),
        Err(_) => ComponentStatus::error(&format!(
            "storage probe timed out after {} seconds",
            probe_timeout.as_secs_f64()
        )),
    };

    let ready = signer.status == HealthStatus::Ok && storage.status == HealthStatus::Ok;
    if ready {
        debug!("Readiness check passed");
    } else {
        info!(
            "Readiness check failed: signer {:?}, storage {:?}",
            signer.error, storage.error
        );
    }

    ReadinessResponse {
        status: if ready {
            HealthStatus::Ok
        } else {
            HealthStatus::Error
        },
        signer,
        storage,
        status_code: if ready {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        },
    }
}

/// Liveness probe: answers 200 whenever the process serves requests
#[utoipa::path(
    get,
    path = "/healthz",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Process is alive", body = LivenessResponse)
    )
)]
async fn health_check() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: HealthStatus::Ok,
    })
}

/// Readiness probe: 200 once a signing key arrived and storage answers
#[utoipa::path(
    get,
    path = "/ready",
    tag = HEALTH_TAG,
    responses(
        (status = 200, description = "Provider can issue tokens", body = ReadinessResponse),
        (status = 503, description = "A collaborator is not ready", body = ReadinessResponse)
    )
)]
async fn ready_check(State(provider): State<Provider>) -> ReadinessResponse {
    check_readiness(&provider).await
}

pub(crate) fn router() -> Router<Provider> {
    Router::new()
        .route("/healthz", get(health_check))
        .route("/ready", get(ready_check))
}

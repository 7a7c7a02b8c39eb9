use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::api::middleware::session::AppState;
use crate::services::portal_api::PortalApi;
use crate::services::render_target::RenderHost;

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub dependencies: DependencyStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DependencyStatus {
    pub backend_api: ServiceHealth,
    pub render_targets: RenderHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    pub response_time_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RenderHealth {
    pub status: String,
    pub live: usize,
}

/// Health check endpoint
/// Returns 200 if the backend API answers, 503 otherwise
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let start = Instant::now();

    let backend_health = check_backend(&state.api).await;
    let render_health = check_render_targets(state.exporter.render_host());

    let all_healthy = backend_health.status == "healthy";

    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: if all_healthy {
            "healthy".to_string()
        } else {
            "unhealthy".to_string()
        },
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        dependencies: DependencyStatus {
            backend_api: backend_health,
            render_targets: render_health,
        },
    };

    tracing::info!(
        status = %response.status,
        duration_ms = start.elapsed().as_millis(),
        "Health check completed"
    );

    (status_code, Json(response))
}

async fn check_backend(api: &PortalApi) -> ServiceHealth {
    let start = Instant::now();

    match api.check_health().await {
        Ok(()) => ServiceHealth {
            status: "healthy".to_string(),
            response_time_ms: start.elapsed().as_millis(),
            error: None,
        },
        Err(e) => ServiceHealth {
            status: "unhealthy".to_string(),
            response_time_ms: start.elapsed().as_millis(),
            error: Some(format!("Backend API error: {}", e)),
        },
    }
}

/// Targets still alive between requests point at a leaked export
fn check_render_targets(host: &RenderHost) -> RenderHealth {
    let live = host.live_targets();
    RenderHealth {
        status: if live == 0 { "idle" } else { "busy" }.to_string(),
        live,
    }
}

use service_core::axum::{extract::State, http::StatusCode, Json};

use crate::AppState;

/// Service health
///
/// Checks the store and, with federation enabled, whether a key set is loaded.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "A dependency is unavailable")
    ),
    tag = "Observability"
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    let store_up = match state.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "Store health check failed");
            false
        }
    };

    let key_set = state.federation.as_ref().map(|f| f.validator().is_ready());

    let healthy = store_up && key_set.unwrap_or(true);
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(serde_json::json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "service": state.config.service_name,
            "version": state.config.service_version,
            "environment": format!("{:?}", state.config.environment),
            "checks": {
                "store": if store_up { "up" } else { "down" },
                "key_set": match key_set {
                    Some(true) => "loaded",
                    Some(false) => "missing",
                    None => "disabled",
                },
            }
        })),
    )
}

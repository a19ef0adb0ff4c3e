use crate::api::AppState;
use crate::database;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// GET /health
pub async fn health(State(state): State<AppState>) -> Response {
    let database_ok = database::health_check(&state.pool).await.is_ok();
    let gateway_configured = state.daraja.current_config().await.validate().is_empty();

    let status = if database_ok { "healthy" } else { "degraded" };
    let code = if database_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(json!({
            "status": status,
            "database": database_ok,
            "gatewayConfigured": gateway_configured,
        })),
    )
        .into_response()
}

/// GET /health/live
pub async fn liveness() -> Response {
    Json(json!({"status": "alive"})).into_response()
}

/// GET /health/ready
pub async fn readiness(State(state): State<AppState>) -> Response {
    match database::health_check(&state.pool).await {
        Ok(()) => Json(json!({"status": "ready"})).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "not_ready", "error": e.to_string()})),
        )
            .into_response(),
    }
}

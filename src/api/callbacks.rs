use crate::api::AppState;
use crate::gateway::callback::parse_callback;
use crate::services::reconciliation::OutcomeSource;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{info, warn};

/// POST /payments/callback
///
/// The gateway retries callbacks that do not receive its expected
/// acknowledgement, so this handler acknowledges unconditionally. Parse
/// failures and internal errors are logged and absorbed; the recovery sweep
/// settles anything that slips through.
pub async fn stk_callback(State(state): State<AppState>, body: String) -> Response {
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(raw) => match parse_callback(&raw) {
            Ok(outcome) => {
                info!(
                    correlation_id = %outcome.correlation_id,
                    succeeded = outcome.succeeded,
                    "gateway callback received"
                );
                if let Err(e) = state
                    .service
                    .engine()
                    .apply_outcome(&outcome, OutcomeSource::Callback)
                    .await
                {
                    warn!(
                        correlation_id = %outcome.correlation_id,
                        error = %e,
                        "callback settlement failed, left for recovery sweep"
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "malformed callback payload acknowledged and dropped");
            }
        },
        Err(e) => {
            warn!(error = %e, "non-JSON callback body acknowledged and dropped");
        }
    }

    ack()
}

fn ack() -> Response {
    Json(json!({"ResultCode": 0, "ResultDesc": "Success"})).into_response()
}

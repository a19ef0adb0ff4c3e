use crate::payments::error::PaymentError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

/// JSON error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Wrapper so handlers can return `Result<_, ApiError>` with `?`.
#[derive(Debug)]
pub struct ApiError(pub PaymentError);

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!(error = %self.0, "request failed");
        } else {
            warn!(error = %self.0, "request rejected");
        }

        let (code, field) = match &self.0 {
            PaymentError::Auth { .. } => ("GATEWAY_AUTH", None),
            PaymentError::Validation { field, .. } => ("VALIDATION", field.clone()),
            PaymentError::Gateway { code, .. } => {
                return (
                    status,
                    Json(json!({
                        "error": {
                            "code": "GATEWAY",
                            "message": self.0.user_message(),
                            "providerCode": code,
                        }
                    })),
                )
                    .into_response();
            }
            PaymentError::CallbackParse { .. } => ("CALLBACK_PARSE", None),
            PaymentError::DuplicateCorrelation { .. } => ("DUPLICATE_CORRELATION", None),
            PaymentError::Storage { .. } => ("STORAGE", None),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.0.user_message(),
                field,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// 404 with the standard error shape.
pub fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": {"code": "NOT_FOUND", "message": message}})),
    )
        .into_response()
}

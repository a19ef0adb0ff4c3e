use crate::api::error::{not_found, ApiError};
use crate::api::AppState;
use crate::payments::types::PaymentRecord;
use crate::services::payment_service::{InitiateStkRequest, RecordCashRequest};
use crate::services::reconciliation::CancelResult;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiatePaymentBody {
    pub invoice_id: String,
    pub patient_id: String,
    pub amount: BigDecimal,
    pub phone_number: String,
    #[serde(default)]
    pub account_reference: Option<String>,
    #[serde(default, alias = "transactionDesc")]
    pub description: Option<String>,
    #[serde(default)]
    pub recorded_by: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashPaymentBody {
    pub invoice_id: String,
    pub patient_id: String,
    pub amount: BigDecimal,
    #[serde(default)]
    pub recorded_by: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub payment: PaymentRecord,
}

/// POST /payments/initiate
pub async fn initiate_payment(
    State(state): State<AppState>,
    Json(body): Json<InitiatePaymentBody>,
) -> Result<Response, ApiError> {
    let (record, ack) = state
        .service
        .initiate_stk(InitiateStkRequest {
            invoice_id: body.invoice_id,
            patient_id: body.patient_id,
            amount: body.amount,
            phone_number: body.phone_number,
            account_reference: body.account_reference,
            description: body.description,
            recorded_by: body.recorded_by.unwrap_or_else(|| "system".to_string()),
        })
        .await?;

    Ok(Json(json!({
        "merchantRequestId": ack.merchant_request_id,
        "checkoutRequestId": ack.checkout_request_id,
        "customerMessage": ack.customer_message,
        "responseCode": ack.response_code,
        "responseDescription": ack.response_description,
        "payment": record,
    }))
    .into_response())
}

/// GET /payments/status/{checkout_request_id}
pub async fn payment_status(
    State(state): State<AppState>,
    Path(checkout_request_id): Path<String>,
) -> Result<Response, ApiError> {
    match state.service.payment_status(&checkout_request_id).await? {
        Some(record) => Ok(Json(PaymentResponse { payment: record }).into_response()),
        None => Ok(not_found("no payment with this checkout request id")),
    }
}

/// POST /payments/cancel/{checkout_request_id}
pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(checkout_request_id): Path<String>,
) -> Result<Response, ApiError> {
    match state
        .service
        .engine()
        .cancel(&checkout_request_id, "staff")
        .await?
    {
        CancelResult::Cancelled(record) => {
            Ok(Json(json!({"applied": true, "payment": record})).into_response())
        }
        CancelResult::AlreadyTerminal(record) => {
            Ok(Json(json!({"applied": false, "payment": record})).into_response())
        }
        CancelResult::NotFound => Ok(not_found("no payment with this checkout request id")),
    }
}

/// POST /payments/cash
pub async fn record_cash_payment(
    State(state): State<AppState>,
    Json(body): Json<CashPaymentBody>,
) -> Result<Response, ApiError> {
    let record = state
        .service
        .record_cash(RecordCashRequest {
            invoice_id: body.invoice_id,
            patient_id: body.patient_id,
            amount: body.amount,
            recorded_by: body.recorded_by.unwrap_or_else(|| "reception".to_string()),
        })
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(PaymentResponse { payment: record }),
    )
        .into_response())
}

/// GET /payments/invoice/{invoice_id}
pub async fn invoice_payments(
    State(state): State<AppState>,
    Path(invoice_id): Path<String>,
) -> Result<Response, ApiError> {
    let payments = state.service.payments_for_invoice(&invoice_id).await?;
    Ok(Json(json!({"invoiceId": invoice_id, "payments": payments})).into_response())
}

/// GET /payments/evidence/{payment_id}
pub async fn payment_evidence(
    State(state): State<AppState>,
    Path(payment_id): Path<Uuid>,
) -> Result<Response, ApiError> {
    match state.service.payment_evidence(payment_id).await? {
        Some(evidence) => Ok(Json(json!({"evidence": evidence})).into_response()),
        None => Ok(not_found("no evidence for this payment")),
    }
}

/// GET /payments/config
pub async fn gateway_config(State(state): State<AppState>) -> Response {
    let config = state.daraja.current_config().await;
    let missing = config.validate();
    Json(json!({
        "config": config.summary(),
        "missing": missing,
    }))
    .into_response()
}

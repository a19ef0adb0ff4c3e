use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Validated input for an STK push initiation, built by the API layer.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub amount: BigDecimal,
    pub phone_number: String,
    pub account_reference: String,
    pub transaction_desc: String,
    pub invoice_id: String,
    pub patient_id: String,
}

/// OAuth token response from the credential exchange.
#[derive(Debug, Deserialize)]
pub struct OAuthTokenResponse {
    pub access_token: String,
    /// Lifetime in seconds; the gateway sends it as a string.
    pub expires_in: String,
}

/// Wire payload for `POST /mpesa/stkpush/v1/processrequest`.
#[derive(Debug, Serialize)]
pub struct StkPushPayload {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "TransactionType")]
    pub transaction_type: String,
    #[serde(rename = "Amount")]
    pub amount: u64,
    #[serde(rename = "PartyA")]
    pub party_a: String,
    #[serde(rename = "PartyB")]
    pub party_b: String,
    #[serde(rename = "PhoneNumber")]
    pub phone_number: String,
    #[serde(rename = "CallBackURL")]
    pub callback_url: String,
    #[serde(rename = "AccountReference")]
    pub account_reference: String,
    #[serde(rename = "TransactionDesc")]
    pub transaction_desc: String,
}

#[derive(Debug, Deserialize)]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID")]
    pub merchant_request_id: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription")]
    pub response_description: String,
    #[serde(rename = "CustomerMessage")]
    pub customer_message: String,
}

/// Successful acceptance of a push request. Acceptance is not payment; the
/// terminal outcome arrives later through the callback or a status query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StkPushAck {
    pub merchant_request_id: String,
    pub checkout_request_id: String,
    pub response_code: String,
    pub response_description: String,
    pub customer_message: String,
}

/// Wire payload for `POST /mpesa/stkpushquery/v1/query`.
#[derive(Debug, Serialize)]
pub struct StkQueryPayload {
    #[serde(rename = "BusinessShortCode")]
    pub business_short_code: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
}

#[derive(Debug, Deserialize)]
pub struct StkQueryResponse {
    #[serde(rename = "ResponseCode")]
    pub response_code: String,
    #[serde(rename = "ResponseDescription", default)]
    pub response_description: Option<String>,
    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,
    /// Numeric in callbacks but a string here; keep raw and coerce.
    #[serde(rename = "ResultCode", default)]
    pub result_code: Option<JsonValue>,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
}

impl StkQueryResponse {
    pub fn result_code(&self) -> Option<i64> {
        match &self.result_code {
            Some(JsonValue::Number(n)) => n.as_i64(),
            Some(JsonValue::String(s)) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }
}

/// The gateway's current view of a checkout request, mapped for the
/// reconciliation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StkQueryOutcome {
    Completed,
    Failed { code: i64, description: String },
    /// The gateway has not settled the request yet; leave the record PENDING.
    StillPending,
}

/// Error body the gateway returns on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct GatewayErrorBody {
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
}

/// Daraja reports "the transaction is being processed" as this error code on
/// the query endpoint rather than as a result.
pub const QUERY_STILL_PROCESSING_CODE: &str = "500.001.1001";

/// Result code the gateway sends when the customer dismisses the prompt.
pub const RESULT_CODE_USER_CANCELLED: i64 = 1032;

use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::types::PaymentOutcome;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::str::FromStr;

/// Webhook envelope the gateway posts after the customer settles or dismisses
/// the prompt.
#[derive(Debug, Deserialize)]
pub struct CallbackEnvelope {
    #[serde(rename = "Body")]
    pub body: CallbackBody,
}

#[derive(Debug, Deserialize)]
pub struct CallbackBody {
    #[serde(rename = "stkCallback")]
    pub stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    pub result_code: JsonValue,
    #[serde(rename = "ResultDesc", default)]
    pub result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata", default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackMetadata {
    #[serde(rename = "Item", default)]
    pub items: Vec<MetadataItem>,
}

/// Name/value pair; values arrive as strings or numbers depending on field.
#[derive(Debug, Deserialize)]
pub struct MetadataItem {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Value", default)]
    pub value: Option<JsonValue>,
}

impl CallbackMetadata {
    fn get(&self, name: &str) -> Option<&JsonValue> {
        self.items
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
    }

    fn get_string(&self, name: &str) -> Option<String> {
        self.get(name).map(value_to_string)
    }

    fn get_amount(&self, name: &str) -> Option<BigDecimal> {
        self.get(name)
            .and_then(|v| BigDecimal::from_str(&value_to_string(v)).ok())
    }
}

fn value_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a raw callback body into a normalized terminal outcome.
///
/// Only structural problems are errors; a missing metadata field on a
/// successful callback leaves the corresponding outcome field empty.
pub fn parse_callback(raw: &JsonValue) -> PaymentResult<PaymentOutcome> {
    let envelope: CallbackEnvelope =
        serde_json::from_value(raw.clone()).map_err(|e| PaymentError::CallbackParse {
            message: format!("callback envelope did not parse: {}", e),
        })?;
    let callback = envelope.body.stk_callback;

    let result_code = match &callback.result_code {
        JsonValue::Number(n) => n.as_i64(),
        JsonValue::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| PaymentError::CallbackParse {
        message: "ResultCode is not numeric".to_string(),
    })?;

    let succeeded = result_code == 0;
    let metadata = callback.callback_metadata;

    let (amount, receipt_number, transaction_date, phone_number) = match (&metadata, succeeded) {
        (Some(meta), true) => (
            meta.get_amount("Amount"),
            meta.get_string("MpesaReceiptNumber"),
            meta.get_string("TransactionDate")
                .and_then(|raw| parse_transaction_date(&raw)),
            meta.get_string("PhoneNumber"),
        ),
        _ => (None, None, None, None),
    };

    Ok(PaymentOutcome {
        correlation_id: callback.checkout_request_id,
        succeeded,
        amount,
        receipt_number,
        transaction_date,
        phone_number,
        failure_reason: if succeeded {
            None
        } else {
            Some(
                callback
                    .result_desc
                    .unwrap_or_else(|| format!("payment failed with result code {}", result_code)),
            )
        },
    })
}

/// The gateway sends `TransactionDate` as a numeric `YYYYMMDDHHMMSS` in
/// Nairobi local time.
fn parse_transaction_date(raw: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), "%Y%m%d%H%M%S").ok()?;
    chrono::Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

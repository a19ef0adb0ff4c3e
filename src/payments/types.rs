use crate::payments::error::PaymentError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use uuid::Uuid;

/// How a payment was made.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Mpesa,
    ShaClaim,
    Insurance,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "CASH",
            PaymentMethod::Mpesa => "MPESA",
            PaymentMethod::ShaClaim => "SHA_CLAIM",
            PaymentMethod::Insurance => "INSURANCE",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "CASH" => Ok(PaymentMethod::Cash),
            "MPESA" => Ok(PaymentMethod::Mpesa),
            "SHA_CLAIM" | "SHA" => Ok(PaymentMethod::ShaClaim),
            "INSURANCE" => Ok(PaymentMethod::Insurance),
            _ => Err(PaymentError::Validation {
                message: format!("unsupported payment method: {}", value),
                field: Some("method".to_string()),
            }),
        }
    }
}

/// Lifecycle state of a payment record.
///
/// PENDING is the only non-terminal state. Once a record reaches a terminal
/// state it never transitions again; a second attempt is a no-op.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "FAILED" => Ok(PaymentStatus::Failed),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            _ => Err(PaymentError::Validation {
                message: format!("unsupported payment status: {}", value),
                field: Some("status".to_string()),
            }),
        }
    }
}

/// A stored payment record. Never deleted; terminal records form the audit
/// trail and retries produce fresh records with new correlation ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: Uuid,
    pub invoice_id: String,
    pub patient_id: String,
    pub amount: BigDecimal,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    /// Gateway checkout request id; the correlation key for STK payments.
    pub checkout_request_id: Option<String>,
    pub merchant_request_id: Option<String>,
    pub phone_number: Option<String>,
    pub receipt_number: Option<String>,
    pub transaction_date: DateTime<Utc>,
    pub failure_reason: Option<String>,
    pub recorded_by: String,
    pub recorded_at: DateTime<Utc>,
    pub evidence: Option<JsonValue>,
}

impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for PaymentRecord {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        let method: String = row.try_get("payment_method")?;
        let status: String = row.try_get("payment_status")?;
        let decode = |column: &str, e: PaymentError| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            )),
        };

        Ok(PaymentRecord {
            id: row.try_get("id")?,
            invoice_id: row.try_get("invoice_id")?,
            patient_id: row.try_get("patient_id")?,
            amount: row.try_get("amount")?,
            method: PaymentMethod::from_str(&method)
                .map_err(|e| decode("payment_method", e))?,
            status: PaymentStatus::from_str(&status)
                .map_err(|e| decode("payment_status", e))?,
            checkout_request_id: row.try_get("checkout_request_id")?,
            merchant_request_id: row.try_get("merchant_request_id")?,
            phone_number: row.try_get("phone_number")?,
            receipt_number: row.try_get("receipt_number")?,
            transaction_date: row.try_get("transaction_date")?,
            failure_reason: row.try_get("failure_reason")?,
            recorded_by: row.try_get("recorded_by")?,
            recorded_at: row.try_get("recorded_at")?,
            evidence: row.try_get("evidence")?,
        })
    }
}

/// Input for creating a PENDING gateway payment record after the push request
/// has been accepted.
#[derive(Debug, Clone)]
pub struct NewPendingPayment {
    pub checkout_request_id: String,
    pub merchant_request_id: String,
    pub invoice_id: String,
    pub patient_id: String,
    pub amount: BigDecimal,
    pub phone_number: String,
    pub recorded_by: String,
}

/// Input for recording an already-settled cash payment.
#[derive(Debug, Clone)]
pub struct NewCashPayment {
    pub invoice_id: String,
    pub patient_id: String,
    pub amount: BigDecimal,
    pub receipt_number: String,
    pub recorded_by: String,
}

/// Normalized terminal outcome for a gateway payment, produced either by the
/// webhook callback or by a status query. The reconciliation engine consumes
/// these through a single path.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentOutcome {
    pub correlation_id: String,
    pub succeeded: bool,
    /// Amount confirmed by the gateway; authoritative over the requested one.
    pub amount: Option<BigDecimal>,
    pub receipt_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub phone_number: Option<String>,
    pub failure_reason: Option<String>,
}

impl PaymentOutcome {
    pub fn terminal_status(&self) -> PaymentStatus {
        if self.succeeded {
            PaymentStatus::Completed
        } else {
            PaymentStatus::Failed
        }
    }
}

/// Fields merged into a record when its terminal transition applies.
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct TerminalFields {
    pub amount: Option<BigDecimal>,
    pub receipt_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub phone_number: Option<String>,
    pub failure_reason: Option<String>,
}

impl From<&PaymentOutcome> for TerminalFields {
    fn from(outcome: &PaymentOutcome) -> Self {
        TerminalFields {
            amount: outcome.amount.clone(),
            receipt_number: outcome.receipt_number.clone(),
            transaction_date: outcome.transaction_date,
            phone_number: outcome.phone_number.clone(),
            failure_reason: outcome.failure_reason.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Failed,
            PaymentStatus::Cancelled,
        ] {
            let parsed = PaymentStatus::from_str(status.as_str()).expect("known status");
            assert_eq!(parsed, status);
        }
        assert!(PaymentStatus::from_str("SETTLED").is_err());
    }

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!PaymentStatus::Pending.is_terminal());
        assert!(PaymentStatus::Completed.is_terminal());
        assert!(PaymentStatus::Failed.is_terminal());
        assert!(PaymentStatus::Cancelled.is_terminal());
    }

    #[test]
    fn outcome_maps_to_terminal_status() {
        let outcome = PaymentOutcome {
            correlation_id: "ws_CO_1".to_string(),
            succeeded: true,
            amount: None,
            receipt_number: None,
            transaction_date: None,
            phone_number: None,
            failure_reason: None,
        };
        assert_eq!(outcome.terminal_status(), PaymentStatus::Completed);

        let failed = PaymentOutcome {
            succeeded: false,
            ..outcome
        };
        assert_eq!(failed.terminal_status(), PaymentStatus::Failed);
    }

    #[test]
    fn method_accepts_sha_alias() {
        assert_eq!(
            PaymentMethod::from_str("sha").expect("alias"),
            PaymentMethod::ShaClaim
        );
    }
}

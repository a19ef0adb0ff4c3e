use crate::payments::types::{PaymentMethod, PaymentRecord};
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

/// Generate a cash receipt number of the form `RCP-YYYYMMDD-NNNNNN`.
pub fn cash_receipt_number() -> String {
    let date = Utc::now().format("%Y%m%d");
    let serial = u32::from_le_bytes(
        Uuid::new_v4().as_bytes()[..4]
            .try_into()
            .unwrap_or([0; 4]),
    ) % 1_000_000;
    format!("RCP-{}-{:06}", date, serial)
}

/// Build the evidence document for a settled payment.
///
/// Evidence is a point-in-time snapshot attached to the record; it is what a
/// claims reviewer or auditor sees, so it carries the verification identifiers
/// for the method rather than raw gateway payloads.
pub fn payment_evidence(record: &PaymentRecord) -> JsonValue {
    let base = json!({
        "paymentId": record.id,
        "invoiceId": record.invoice_id,
        "patientId": record.patient_id,
        "amount": record.amount.to_string(),
        "transactionDate": record.transaction_date,
        "generatedAt": Utc::now(),
    });

    let mut evidence = base;
    match record.method {
        PaymentMethod::Mpesa => {
            evidence["type"] = json!("MPESA_CONFIRMATION");
            evidence["receiptNumber"] = json!(record.receipt_number);
            evidence["phoneNumber"] = json!(record.phone_number);
            evidence["checkoutRequestId"] = json!(record.checkout_request_id);
        }
        PaymentMethod::Cash => {
            evidence["type"] = json!("CASH_RECEIPT");
            evidence["receiptNumber"] = json!(record.receipt_number);
            evidence["recordedBy"] = json!(record.recorded_by);
        }
        PaymentMethod::ShaClaim => {
            evidence["type"] = json!("SHA_CLAIM_STATEMENT");
            evidence["claimReference"] = json!(record.receipt_number);
        }
        PaymentMethod::Insurance => {
            evidence["type"] = json!("INSURANCE_REMITTANCE");
            evidence["remittanceReference"] = json!(record.receipt_number);
        }
    }
    evidence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::PaymentStatus;
    use bigdecimal::BigDecimal;
    use std::str::FromStr;

    fn record(method: PaymentMethod) -> PaymentRecord {
        PaymentRecord {
            id: Uuid::new_v4(),
            invoice_id: "INV-001".to_string(),
            patient_id: "PAT-001".to_string(),
            amount: BigDecimal::from_str("500").expect("decimal"),
            method,
            status: PaymentStatus::Completed,
            checkout_request_id: Some("ws_CO_1".to_string()),
            merchant_request_id: Some("29115-1".to_string()),
            phone_number: Some("254712345678".to_string()),
            receipt_number: Some("NLJ7RT61SV".to_string()),
            transaction_date: Utc::now(),
            failure_reason: None,
            recorded_by: "reception".to_string(),
            recorded_at: Utc::now(),
            evidence: None,
        }
    }

    #[test]
    fn receipt_number_has_expected_shape() {
        let receipt = cash_receipt_number();
        assert!(receipt.starts_with("RCP-"));
        let parts: Vec<&str> = receipt.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[1].len(), 8);
        assert_eq!(parts[2].len(), 6);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn mpesa_evidence_carries_gateway_identifiers() {
        let evidence = payment_evidence(&record(PaymentMethod::Mpesa));
        assert_eq!(evidence["type"], "MPESA_CONFIRMATION");
        assert_eq!(evidence["receiptNumber"], "NLJ7RT61SV");
        assert_eq!(evidence["checkoutRequestId"], "ws_CO_1");
        assert_eq!(evidence["amount"], "500");
    }

    #[test]
    fn cash_evidence_names_the_recorder() {
        let evidence = payment_evidence(&record(PaymentMethod::Cash));
        assert_eq!(evidence["type"], "CASH_RECEIPT");
        assert_eq!(evidence["recordedBy"], "reception");
    }
}

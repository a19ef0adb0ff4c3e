//! In-memory doubles for the storage and gateway seams.
#![allow(dead_code)]

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Duration, Utc};
use clinicpay_backend::database::audit_repository::{AuditEntry, AuditSink};
use clinicpay_backend::database::invoice_repository::InvoiceStore;
use clinicpay_backend::gateway::client::StkGateway;
use clinicpay_backend::gateway::types::{
    PaymentIntent, StkPushResponse, StkQueryOutcome,
};
use clinicpay_backend::payments::error::{PaymentError, PaymentResult};
use clinicpay_backend::payments::store::PaymentStore;
use clinicpay_backend::payments::types::{
    NewCashPayment, NewPendingPayment, PaymentMethod, PaymentRecord, PaymentStatus, TerminalFields,
};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use uuid::Uuid;

pub fn amount(value: &str) -> BigDecimal {
    BigDecimal::from_str(value).expect("valid decimal")
}

/// Mutex-backed payment store with the same atomic transition semantics as
/// the Postgres repository.
#[derive(Default)]
pub struct MemoryPaymentStore {
    records: Mutex<Vec<PaymentRecord>>,
}

impl MemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_pending(&self, checkout_request_id: &str, invoice_id: &str) -> PaymentRecord {
        self.insert_pending_aged(checkout_request_id, invoice_id, Duration::zero())
    }

    pub fn insert_pending_aged(
        &self,
        checkout_request_id: &str,
        invoice_id: &str,
        age: Duration,
    ) -> PaymentRecord {
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            invoice_id: invoice_id.to_string(),
            patient_id: "PAT-001".to_string(),
            amount: amount("500"),
            method: PaymentMethod::Mpesa,
            status: PaymentStatus::Pending,
            checkout_request_id: Some(checkout_request_id.to_string()),
            merchant_request_id: Some("29115-1".to_string()),
            phone_number: Some("254712345678".to_string()),
            receipt_number: None,
            transaction_date: Utc::now() - age,
            failure_reason: None,
            recorded_by: "reception".to_string(),
            recorded_at: Utc::now() - age,
            evidence: None,
        };
        self.records
            .lock()
            .expect("store lock")
            .push(record.clone());
        record
    }

    pub fn status_of(&self, checkout_request_id: &str) -> Option<PaymentStatus> {
        self.records
            .lock()
            .expect("store lock")
            .iter()
            .find(|r| r.checkout_request_id.as_deref() == Some(checkout_request_id))
            .map(|r| r.status)
    }
}

#[async_trait]
impl PaymentStore for MemoryPaymentStore {
    async fn create_pending(&self, payment: NewPendingPayment) -> PaymentResult<PaymentRecord> {
        let mut records = self.records.lock().expect("store lock");
        if records
            .iter()
            .any(|r| r.checkout_request_id.as_deref() == Some(&payment.checkout_request_id))
        {
            return Err(PaymentError::DuplicateCorrelation {
                correlation_id: payment.checkout_request_id,
            });
        }
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            invoice_id: payment.invoice_id,
            patient_id: payment.patient_id,
            amount: payment.amount,
            method: PaymentMethod::Mpesa,
            status: PaymentStatus::Pending,
            checkout_request_id: Some(payment.checkout_request_id),
            merchant_request_id: Some(payment.merchant_request_id),
            phone_number: Some(payment.phone_number),
            receipt_number: None,
            transaction_date: Utc::now(),
            failure_reason: None,
            recorded_by: payment.recorded_by,
            recorded_at: Utc::now(),
            evidence: None,
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn create_cash(&self, payment: NewCashPayment) -> PaymentResult<PaymentRecord> {
        let record = PaymentRecord {
            id: Uuid::new_v4(),
            invoice_id: payment.invoice_id,
            patient_id: payment.patient_id,
            amount: payment.amount,
            method: PaymentMethod::Cash,
            status: PaymentStatus::Completed,
            checkout_request_id: None,
            merchant_request_id: None,
            phone_number: None,
            receipt_number: Some(payment.receipt_number),
            transaction_date: Utc::now(),
            failure_reason: None,
            recorded_by: payment.recorded_by,
            recorded_at: Utc::now(),
            evidence: None,
        };
        self.records
            .lock()
            .expect("store lock")
            .push(record.clone());
        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> PaymentResult<Option<PaymentRecord>> {
        Ok(self
            .records
            .lock()
            .expect("store lock")
            .iter()
            .find(|r| r.id == id)
            .cloned())
    }

    async fn find_by_correlation(
        &self,
        checkout_request_id: &str,
    ) -> PaymentResult<Option<PaymentRecord>> {
        Ok(self
            .records
            .lock()
            .expect("store lock")
            .iter()
            .find(|r| r.checkout_request_id.as_deref() == Some(checkout_request_id))
            .cloned())
    }

    async fn transition_if_pending(
        &self,
        checkout_request_id: &str,
        to: PaymentStatus,
        fields: TerminalFields,
    ) -> PaymentResult<Option<PaymentRecord>> {
        let mut records = self.records.lock().expect("store lock");
        let record = records.iter_mut().find(|r| {
            r.checkout_request_id.as_deref() == Some(checkout_request_id)
                && r.status == PaymentStatus::Pending
        });
        let Some(record) = record else {
            return Ok(None);
        };

        record.status = to;
        if let Some(amount) = fields.amount {
            record.amount = amount;
        }
        if let Some(receipt) = fields.receipt_number {
            record.receipt_number = Some(receipt);
        }
        if let Some(date) = fields.transaction_date {
            record.transaction_date = date;
        }
        if let Some(phone) = fields.phone_number {
            record.phone_number = Some(phone);
        }
        if let Some(reason) = fields.failure_reason {
            record.failure_reason = Some(reason);
        }
        Ok(Some(record.clone()))
    }

    async fn list_for_invoice(&self, invoice_id: &str) -> PaymentResult<Vec<PaymentRecord>> {
        Ok(self
            .records
            .lock()
            .expect("store lock")
            .iter()
            .filter(|r| r.invoice_id == invoice_id)
            .cloned()
            .collect())
    }

    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> PaymentResult<Vec<PaymentRecord>> {
        let mut stale: Vec<PaymentRecord> = self
            .records
            .lock()
            .expect("store lock")
            .iter()
            .filter(|r| r.status == PaymentStatus::Pending && r.recorded_at < older_than)
            .cloned()
            .collect();
        stale.sort_by_key(|r| r.recorded_at);
        stale.truncate(limit as usize);
        Ok(stale)
    }

    async fn attach_evidence(&self, payment_id: Uuid, evidence: JsonValue) -> PaymentResult<()> {
        let mut records = self.records.lock().expect("store lock");
        if let Some(record) = records.iter_mut().find(|r| r.id == payment_id) {
            record.evidence = Some(evidence);
        }
        Ok(())
    }
}

/// Gateway double. Push requests are always accepted; query outcomes are
/// scripted per checkout request id.
pub struct MockGateway {
    query_outcomes: Mutex<HashMap<String, StkQueryOutcome>>,
    next_id: AtomicUsize,
    pub query_calls: AtomicUsize,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            query_outcomes: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            query_calls: AtomicUsize::new(0),
        }
    }

    pub fn script_query(&self, checkout_request_id: &str, outcome: StkQueryOutcome) {
        self.query_outcomes
            .lock()
            .expect("gateway lock")
            .insert(checkout_request_id.to_string(), outcome);
    }
}

#[async_trait]
impl StkGateway for MockGateway {
    async fn initiate(&self, _intent: &PaymentIntent) -> PaymentResult<StkPushResponse> {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(StkPushResponse {
            merchant_request_id: format!("29115-{}", n),
            checkout_request_id: format!("ws_CO_TEST_{}", n),
            response_code: "0".to_string(),
            response_description: "Success. Request accepted for processing".to_string(),
            customer_message: "Success. Request accepted for processing".to_string(),
        })
    }

    async fn query_status(&self, checkout_request_id: &str) -> PaymentResult<StkQueryOutcome> {
        self.query_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .query_outcomes
            .lock()
            .expect("gateway lock")
            .get(checkout_request_id)
            .cloned()
            .unwrap_or(StkQueryOutcome::StillPending))
    }
}

/// Invoice store recording every applied effect; optionally fails the first
/// N calls to exercise the bounded retry.
pub struct RecordingInvoiceStore {
    pub paid: Mutex<Vec<(String, Uuid)>>,
    fail_first: AtomicUsize,
}

impl Default for RecordingInvoiceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingInvoiceStore {
    pub fn new() -> Self {
        Self {
            paid: Mutex::new(Vec::new()),
            fail_first: AtomicUsize::new(0),
        }
    }

    pub fn failing_first(n: usize) -> Self {
        Self {
            paid: Mutex::new(Vec::new()),
            fail_first: AtomicUsize::new(n),
        }
    }

    pub fn paid_count(&self, invoice_id: &str) -> usize {
        self.paid
            .lock()
            .expect("invoice lock")
            .iter()
            .filter(|(id, _)| id == invoice_id)
            .count()
    }
}

#[async_trait]
impl InvoiceStore for RecordingInvoiceStore {
    async fn mark_invoice_paid(&self, invoice_id: &str, payment_id: Uuid) -> PaymentResult<bool> {
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            return Err(PaymentError::Storage {
                message: "injected invoice failure".to_string(),
            });
        }
        let mut paid = self.paid.lock().expect("invoice lock");
        if paid.iter().any(|(id, _)| id == invoice_id) {
            return Ok(false);
        }
        paid.push((invoice_id.to_string(), payment_id));
        Ok(true)
    }

    async fn invoice_exists(&self, _invoice_id: &str) -> PaymentResult<bool> {
        Ok(true)
    }
}

#[derive(Default)]
pub struct RecordingAuditSink {
    pub entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<String> {
        self.entries
            .lock()
            .expect("audit lock")
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, entry: AuditEntry) -> PaymentResult<()> {
        self.entries.lock().expect("audit lock").push(entry);
        Ok(())
    }
}

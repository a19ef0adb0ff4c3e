use crate::database::audit_repository::{AuditEntry, AuditSink};
use crate::database::invoice_repository::InvoiceStore;
use crate::gateway::client::StkGateway;
use crate::gateway::types::{PaymentIntent, StkPushAck};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::store::PaymentStore;
use crate::payments::types::{NewCashPayment, NewPendingPayment, PaymentRecord, PaymentStatus};
use crate::services::evidence::{cash_receipt_number, payment_evidence};
use crate::services::reconciliation::{OutcomeSource, ReconcileResult, ReconciliationEngine};
use bigdecimal::{BigDecimal, Zero};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Input for an STK push initiation from the API layer.
#[derive(Debug, Clone)]
pub struct InitiateStkRequest {
    pub invoice_id: String,
    pub patient_id: String,
    pub amount: BigDecimal,
    pub phone_number: String,
    /// Shown on the customer's statement; defaults to the invoice id.
    pub account_reference: Option<String>,
    pub description: Option<String>,
    pub recorded_by: String,
}

/// Input for recording a settled cash payment.
#[derive(Debug, Clone)]
pub struct RecordCashRequest {
    pub invoice_id: String,
    pub patient_id: String,
    pub amount: BigDecimal,
    pub recorded_by: String,
}

/// Orchestrates payment operations over the gateway, the stores and the
/// reconciliation engine.
pub struct PaymentService {
    gateway: Arc<dyn StkGateway>,
    store: Arc<dyn PaymentStore>,
    invoices: Arc<dyn InvoiceStore>,
    audit: Arc<dyn AuditSink>,
    engine: ReconciliationEngine,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn StkGateway>,
        store: Arc<dyn PaymentStore>,
        invoices: Arc<dyn InvoiceStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let engine =
            ReconciliationEngine::new(store.clone(), invoices.clone(), audit.clone());
        Self {
            gateway,
            store,
            invoices,
            audit,
            engine,
        }
    }

    pub fn engine(&self) -> &ReconciliationEngine {
        &self.engine
    }

    pub fn gateway(&self) -> &dyn StkGateway {
        self.gateway.as_ref()
    }

    /// Initiate an STK push and record the accepted request as PENDING.
    pub async fn initiate_stk(
        &self,
        request: InitiateStkRequest,
    ) -> PaymentResult<(PaymentRecord, StkPushAck)> {
        if !self.invoices.invoice_exists(&request.invoice_id).await? {
            return Err(PaymentError::Validation {
                message: format!("unknown invoice: {}", request.invoice_id),
                field: Some("invoiceId".to_string()),
            });
        }

        let intent = PaymentIntent {
            amount: request.amount.clone(),
            phone_number: crate::gateway::normalize_phone(&request.phone_number),
            account_reference: request
                .account_reference
                .clone()
                .unwrap_or_else(|| request.invoice_id.clone()),
            transaction_desc: request
                .description
                .clone()
                .unwrap_or_else(|| "Medical Services Payment".to_string()),
            invoice_id: request.invoice_id.clone(),
            patient_id: request.patient_id.clone(),
        };

        let response = self.gateway.initiate(&intent).await?;

        let record = self
            .store
            .create_pending(NewPendingPayment {
                checkout_request_id: response.checkout_request_id.clone(),
                merchant_request_id: response.merchant_request_id.clone(),
                invoice_id: request.invoice_id,
                patient_id: request.patient_id,
                amount: request.amount,
                phone_number: intent.phone_number,
                recorded_by: request.recorded_by.clone(),
            })
            .await?;

        let entry = AuditEntry::payment(
            "payment.initiated",
            record.id,
            &request.recorded_by,
            json!({
                "invoiceId": record.invoice_id,
                "checkoutRequestId": record.checkout_request_id,
                "amount": record.amount.to_string(),
            }),
        );
        if let Err(e) = self.audit.record(entry).await {
            warn!(payment_id = %record.id, error = %e, "audit write failed");
        }

        let ack = StkPushAck {
            merchant_request_id: response.merchant_request_id,
            checkout_request_id: response.checkout_request_id,
            response_code: response.response_code,
            response_description: response.response_description,
            customer_message: response.customer_message,
        };
        Ok((record, ack))
    }

    /// Record a cash payment, already settled at the desk.
    pub async fn record_cash(&self, request: RecordCashRequest) -> PaymentResult<PaymentRecord> {
        if request.amount <= BigDecimal::zero() {
            return Err(PaymentError::Validation {
                message: "amount must be positive".to_string(),
                field: Some("amount".to_string()),
            });
        }
        if !self.invoices.invoice_exists(&request.invoice_id).await? {
            return Err(PaymentError::Validation {
                message: format!("unknown invoice: {}", request.invoice_id),
                field: Some("invoiceId".to_string()),
            });
        }

        let record = self
            .store
            .create_cash(NewCashPayment {
                invoice_id: request.invoice_id,
                patient_id: request.patient_id,
                amount: request.amount,
                receipt_number: cash_receipt_number(),
                recorded_by: request.recorded_by.clone(),
            })
            .await?;

        info!(
            payment_id = %record.id,
            invoice_id = %record.invoice_id,
            receipt = ?record.receipt_number,
            "cash payment recorded"
        );
        self.engine.apply_completion_effects(&record).await;

        let entry = AuditEntry::payment(
            "payment.cash_recorded",
            record.id,
            &request.recorded_by,
            json!({
                "invoiceId": record.invoice_id,
                "receiptNumber": record.receipt_number,
                "amount": record.amount.to_string(),
            }),
        );
        if let Err(e) = self.audit.record(entry).await {
            warn!(payment_id = %record.id, error = %e, "audit write failed");
        }

        Ok(record)
    }

    /// Current state of a gateway payment. A record still PENDING triggers a
    /// status query so stale prompts settle on read.
    pub async fn payment_status(
        &self,
        checkout_request_id: &str,
    ) -> PaymentResult<Option<PaymentRecord>> {
        let record = match self.store.find_by_correlation(checkout_request_id).await? {
            Some(record) => record,
            None => return Ok(None),
        };
        if record.status != PaymentStatus::Pending {
            return Ok(Some(record));
        }

        match self
            .engine
            .reconcile_by_query(self.gateway.as_ref(), checkout_request_id, OutcomeSource::Query)
            .await
        {
            Ok(ReconcileResult::Applied(settled)) => Ok(Some(*settled)),
            Ok(ReconcileResult::AlreadySettled(settled)) => Ok(Some(*settled)),
            Ok(_) => Ok(Some(record)),
            // A gateway hiccup on the query path leaves the record pending;
            // the sweep will pick it up.
            Err(e) => {
                warn!(
                    correlation_id = %checkout_request_id,
                    error = %e,
                    "status query failed, returning stored state"
                );
                Ok(Some(record))
            }
        }
    }

    pub async fn payments_for_invoice(
        &self,
        invoice_id: &str,
    ) -> PaymentResult<Vec<PaymentRecord>> {
        self.store.list_for_invoice(invoice_id).await
    }

    /// Stored evidence for a payment, generated on demand for settled
    /// payments recorded before evidence attachment existed.
    pub async fn payment_evidence(&self, payment_id: Uuid) -> PaymentResult<Option<JsonValue>> {
        let record = match self.store.find_by_id(payment_id).await? {
            Some(record) => record,
            None => return Ok(None),
        };
        if let Some(evidence) = record.evidence.clone() {
            return Ok(Some(evidence));
        }
        if record.status == PaymentStatus::Completed {
            let evidence = payment_evidence(&record);
            self.store.attach_evidence(record.id, evidence.clone()).await?;
            return Ok(Some(evidence));
        }
        Ok(None)
    }
}

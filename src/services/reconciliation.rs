use crate::database::audit_repository::{AuditEntry, AuditSink};
use crate::database::invoice_repository::InvoiceStore;
use crate::gateway::client::StkGateway;
use crate::gateway::types::StkQueryOutcome;
use crate::payments::error::PaymentResult;
use crate::payments::store::PaymentStore;
use crate::payments::types::{PaymentOutcome, PaymentRecord, PaymentStatus, TerminalFields};
use crate::services::evidence::payment_evidence;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How many times the invoice effect is attempted after a completed payment
/// before giving up and flagging the record for manual follow-up.
const INVOICE_EFFECT_ATTEMPTS: u32 = 3;

/// Where a terminal outcome came from, for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeSource {
    Callback,
    Query,
    Sweep,
}

impl OutcomeSource {
    fn as_str(&self) -> &'static str {
        match self {
            OutcomeSource::Callback => "callback",
            OutcomeSource::Query => "query",
            OutcomeSource::Sweep => "sweep",
        }
    }
}

/// What applying an outcome did to the stored record.
#[derive(Debug)]
pub enum ReconcileResult {
    /// This call won the transition and applied all effects.
    Applied(Box<PaymentRecord>),
    /// The record was already terminal; everything was a no-op.
    AlreadySettled(Box<PaymentRecord>),
    /// No record carries this correlation id.
    Unknown,
    /// The gateway has not settled the request yet (query path only).
    StillPending,
}

#[derive(Debug)]
pub enum CancelResult {
    Cancelled(Box<PaymentRecord>),
    AlreadyTerminal(Box<PaymentRecord>),
    NotFound,
}

/// Applies terminal outcomes to pending payments exactly once.
///
/// Every settlement path (webhook callback, on-demand status query, staff
/// cancellation, recovery sweep) funnels through `transition_if_pending`, so
/// racing paths cannot double-apply invoice effects: whichever caller wins
/// the conditional update performs them, the loser sees a terminal record and
/// does nothing.
pub struct ReconciliationEngine {
    store: Arc<dyn PaymentStore>,
    invoices: Arc<dyn InvoiceStore>,
    audit: Arc<dyn AuditSink>,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        invoices: Arc<dyn InvoiceStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            store,
            invoices,
            audit,
        }
    }

    /// Apply a terminal outcome to its pending record.
    pub async fn apply_outcome(
        &self,
        outcome: &PaymentOutcome,
        source: OutcomeSource,
    ) -> PaymentResult<ReconcileResult> {
        let transitioned = self
            .store
            .transition_if_pending(
                &outcome.correlation_id,
                outcome.terminal_status(),
                TerminalFields::from(outcome),
            )
            .await?;

        let record = match transitioned {
            Some(record) => record,
            None => {
                return match self.store.find_by_correlation(&outcome.correlation_id).await? {
                    Some(existing) => {
                        debug!(
                            correlation_id = %outcome.correlation_id,
                            status = %existing.status,
                            source = source.as_str(),
                            "outcome for already-settled payment ignored"
                        );
                        Ok(ReconcileResult::AlreadySettled(Box::new(existing)))
                    }
                    None => {
                        warn!(
                            correlation_id = %outcome.correlation_id,
                            source = source.as_str(),
                            "outcome received for unknown correlation id"
                        );
                        Ok(ReconcileResult::Unknown)
                    }
                };
            }
        };

        info!(
            correlation_id = %outcome.correlation_id,
            payment_id = %record.id,
            status = %record.status,
            source = source.as_str(),
            "payment settled"
        );

        if record.status == PaymentStatus::Completed {
            self.apply_completion_effects(&record).await;
        }

        let audit_entry = AuditEntry::payment(
            "payment.settled",
            record.id,
            source.as_str(),
            json!({
                "status": record.status,
                "invoiceId": record.invoice_id,
                "receiptNumber": record.receipt_number,
            }),
        );
        if let Err(e) = self.audit.record(audit_entry).await {
            warn!(payment_id = %record.id, error = %e, "audit write failed");
        }

        Ok(ReconcileResult::Applied(Box::new(record)))
    }

    /// Evidence attachment and the invoice effect for a completed payment.
    /// The payment record is already terminal at this point; failures here
    /// are retried a bounded number of times and then surfaced through logs
    /// and the audit trail rather than unwinding the settlement.
    pub(crate) async fn apply_completion_effects(&self, record: &PaymentRecord) {
        let evidence = payment_evidence(record);
        if let Err(e) = self.store.attach_evidence(record.id, evidence).await {
            warn!(payment_id = %record.id, error = %e, "evidence attachment failed");
        }

        for attempt in 0..INVOICE_EFFECT_ATTEMPTS {
            match self
                .invoices
                .mark_invoice_paid(&record.invoice_id, record.id)
                .await
            {
                Ok(applied) => {
                    if !applied {
                        debug!(
                            invoice_id = %record.invoice_id,
                            "invoice already paid, effect skipped"
                        );
                    }
                    return;
                }
                Err(e) if attempt + 1 < INVOICE_EFFECT_ATTEMPTS => {
                    warn!(
                        invoice_id = %record.invoice_id,
                        attempt = attempt + 1,
                        error = %e,
                        "invoice effect failed, retrying"
                    );
                    tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
                }
                Err(e) => {
                    error!(
                        invoice_id = %record.invoice_id,
                        payment_id = %record.id,
                        error = %e,
                        "invoice effect failed after retries, needs manual follow-up"
                    );
                    let entry = AuditEntry::payment(
                        "payment.invoice_effect_failed",
                        record.id,
                        "reconciliation",
                        json!({"invoiceId": record.invoice_id, "error": e.to_string()}),
                    );
                    if let Err(audit_err) = self.audit.record(entry).await {
                        warn!(error = %audit_err, "audit write failed");
                    }
                }
            }
        }
    }

    /// Staff-initiated cancellation of a pending payment. A callback that
    /// arrives after cancellation finds a terminal record and is absorbed.
    pub async fn cancel(
        &self,
        checkout_request_id: &str,
        actor: &str,
    ) -> PaymentResult<CancelResult> {
        let fields = TerminalFields {
            failure_reason: Some(format!("Cancelled by {}", actor)),
            ..TerminalFields::default()
        };
        let transitioned = self
            .store
            .transition_if_pending(checkout_request_id, PaymentStatus::Cancelled, fields)
            .await?;

        match transitioned {
            Some(record) => {
                info!(
                    correlation_id = %checkout_request_id,
                    payment_id = %record.id,
                    actor,
                    "pending payment cancelled"
                );
                let entry = AuditEntry::payment(
                    "payment.cancelled",
                    record.id,
                    actor,
                    json!({"invoiceId": record.invoice_id}),
                );
                if let Err(e) = self.audit.record(entry).await {
                    warn!(payment_id = %record.id, error = %e, "audit write failed");
                }
                Ok(CancelResult::Cancelled(Box::new(record)))
            }
            None => match self.store.find_by_correlation(checkout_request_id).await? {
                Some(existing) => {
                    debug!(
                        correlation_id = %checkout_request_id,
                        status = %existing.status,
                        "cancellation of already-terminal payment is a no-op"
                    );
                    Ok(CancelResult::AlreadyTerminal(Box::new(existing)))
                }
                None => Ok(CancelResult::NotFound),
            },
        }
    }

    /// Ask the gateway for the current state of a checkout request and apply
    /// whatever terminal outcome it reports.
    pub async fn reconcile_by_query(
        &self,
        gateway: &dyn StkGateway,
        checkout_request_id: &str,
        source: OutcomeSource,
    ) -> PaymentResult<ReconcileResult> {
        let outcome = match gateway.query_status(checkout_request_id).await? {
            StkQueryOutcome::StillPending => return Ok(ReconcileResult::StillPending),
            StkQueryOutcome::Completed => PaymentOutcome {
                correlation_id: checkout_request_id.to_string(),
                succeeded: true,
                // The query endpoint reports no settlement metadata; the
                // stored request values stand.
                amount: None,
                receipt_number: None,
                transaction_date: None,
                phone_number: None,
                failure_reason: None,
            },
            StkQueryOutcome::Failed { code, description } => PaymentOutcome {
                correlation_id: checkout_request_id.to_string(),
                succeeded: false,
                amount: None,
                receipt_number: None,
                transaction_date: None,
                phone_number: None,
                failure_reason: Some(format!("{} (result code {})", description, code)),
            },
        };

        self.apply_outcome(&outcome, source).await
    }
}

//! Service layer: payment orchestration, reconciliation and evidence.

pub mod evidence;
pub mod payment_service;
pub mod reconciliation;

pub use payment_service::{InitiateStkRequest, PaymentService, RecordCashRequest};
pub use reconciliation::{CancelResult, OutcomeSource, ReconcileResult, ReconciliationEngine};

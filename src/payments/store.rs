use crate::payments::error::PaymentResult;
use crate::payments::types::{
    NewCashPayment, NewPendingPayment, PaymentRecord, PaymentStatus, TerminalFields,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Persistence seam for payment records.
///
/// `transition_if_pending` is the exactly-once primitive: it must apply the
/// terminal transition atomically and only when the record is still PENDING,
/// returning `None` when the record is missing or already terminal. All
/// correlated settlement paths (callback, query, sweep, cancel) go through it.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Insert a PENDING record for an accepted push request. Fails with
    /// `DuplicateCorrelation` if the checkout request id is already known.
    async fn create_pending(&self, payment: NewPendingPayment) -> PaymentResult<PaymentRecord>;

    /// Insert an already-settled cash payment.
    async fn create_cash(&self, payment: NewCashPayment) -> PaymentResult<PaymentRecord>;

    async fn find_by_id(&self, id: Uuid) -> PaymentResult<Option<PaymentRecord>>;

    async fn find_by_correlation(
        &self,
        checkout_request_id: &str,
    ) -> PaymentResult<Option<PaymentRecord>>;

    /// Atomically move a PENDING record to a terminal status, merging the
    /// provided fields. `Some` fields overwrite, `None` fields keep the
    /// stored value.
    async fn transition_if_pending(
        &self,
        checkout_request_id: &str,
        to: PaymentStatus,
        fields: TerminalFields,
    ) -> PaymentResult<Option<PaymentRecord>>;

    async fn list_for_invoice(&self, invoice_id: &str) -> PaymentResult<Vec<PaymentRecord>>;

    /// PENDING records recorded before `older_than`, oldest first.
    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> PaymentResult<Vec<PaymentRecord>>;

    async fn attach_evidence(&self, payment_id: Uuid, evidence: JsonValue) -> PaymentResult<()>;
}

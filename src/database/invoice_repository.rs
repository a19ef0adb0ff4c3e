use crate::database::error::DatabaseError;
use crate::payments::error::PaymentResult;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

/// Invoice-side effect seam used by the reconciliation engine.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    /// Mark an invoice paid by the given payment. Idempotent: returns `true`
    /// only when this call performed the transition, `false` when the invoice
    /// was already paid or does not exist.
    async fn mark_invoice_paid(&self, invoice_id: &str, payment_id: Uuid) -> PaymentResult<bool>;

    async fn invoice_exists(&self, invoice_id: &str) -> PaymentResult<bool>;
}

#[derive(Clone)]
pub struct PgInvoiceRepository {
    pool: PgPool,
}

impl PgInvoiceRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InvoiceStore for PgInvoiceRepository {
    async fn mark_invoice_paid(&self, invoice_id: &str, payment_id: Uuid) -> PaymentResult<bool> {
        let result = sqlx::query(
            "UPDATE invoices SET \
               status = 'PAID', paid_at = NOW(), paid_by_payment_id = $2 \
             WHERE id = $1 AND status <> 'PAID'",
        )
        .bind(invoice_id)
        .bind(payment_id)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn invoice_exists(&self, invoice_id: &str) -> PaymentResult<bool> {
        let found: Option<(String,)> =
            sqlx::query_as("SELECT id FROM invoices WHERE id = $1")
                .bind(invoice_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
        Ok(found.is_some())
    }
}

use crate::database::error::{DatabaseError, DatabaseErrorKind};
use crate::payments::error::{PaymentError, PaymentResult};
use crate::payments::store::PaymentStore;
use crate::payments::types::{
    NewCashPayment, NewPendingPayment, PaymentRecord, PaymentStatus, TerminalFields,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

const RECORD_COLUMNS: &str = "id, invoice_id, patient_id, amount, payment_method, \
     payment_status, checkout_request_id, merchant_request_id, phone_number, \
     receipt_number, transaction_date, failure_reason, recorded_by, recorded_at, evidence";

/// Postgres-backed payment store.
#[derive(Clone)]
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentRepository {
    async fn create_pending(&self, payment: NewPendingPayment) -> PaymentResult<PaymentRecord> {
        let query = format!(
            "INSERT INTO payments \
             (id, invoice_id, patient_id, amount, payment_method, payment_status, \
              checkout_request_id, merchant_request_id, phone_number, transaction_date, \
              recorded_by, recorded_at) \
             VALUES ($1, $2, $3, $4, 'MPESA', 'PENDING', $5, $6, $7, NOW(), $8, NOW()) \
             RETURNING {}",
            RECORD_COLUMNS
        );

        let record = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(&payment.invoice_id)
            .bind(&payment.patient_id)
            .bind(&payment.amount)
            .bind(&payment.checkout_request_id)
            .bind(&payment.merchant_request_id)
            .bind(&payment.phone_number)
            .bind(&payment.recorded_by)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                let db_err = DatabaseError::from_sqlx(e);
                if matches!(db_err.kind(), DatabaseErrorKind::UniqueViolation { .. }) {
                    PaymentError::DuplicateCorrelation {
                        correlation_id: payment.checkout_request_id.clone(),
                    }
                } else {
                    db_err.into()
                }
            })?;

        Ok(record)
    }

    async fn create_cash(&self, payment: NewCashPayment) -> PaymentResult<PaymentRecord> {
        let query = format!(
            "INSERT INTO payments \
             (id, invoice_id, patient_id, amount, payment_method, payment_status, \
              receipt_number, transaction_date, recorded_by, recorded_at) \
             VALUES ($1, $2, $3, $4, 'CASH', 'COMPLETED', $5, NOW(), $6, NOW()) \
             RETURNING {}",
            RECORD_COLUMNS
        );

        let record = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(Uuid::new_v4())
            .bind(&payment.invoice_id)
            .bind(&payment.patient_id)
            .bind(&payment.amount)
            .bind(&payment.receipt_number)
            .bind(&payment.recorded_by)
            .fetch_one(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> PaymentResult<Option<PaymentRecord>> {
        let query = format!("SELECT {} FROM payments WHERE id = $1", RECORD_COLUMNS);
        let record = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(record)
    }

    async fn find_by_correlation(
        &self,
        checkout_request_id: &str,
    ) -> PaymentResult<Option<PaymentRecord>> {
        let query = format!(
            "SELECT {} FROM payments WHERE checkout_request_id = $1",
            RECORD_COLUMNS
        );
        let record = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(checkout_request_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(record)
    }

    async fn transition_if_pending(
        &self,
        checkout_request_id: &str,
        to: PaymentStatus,
        fields: TerminalFields,
    ) -> PaymentResult<Option<PaymentRecord>> {
        // The status predicate in the WHERE clause is what makes the
        // transition exactly-once under concurrent settlement attempts.
        let query = format!(
            "UPDATE payments SET \
               payment_status = $2, \
               amount = COALESCE($3, amount), \
               receipt_number = COALESCE($4, receipt_number), \
               transaction_date = COALESCE($5, transaction_date), \
               phone_number = COALESCE($6, phone_number), \
               failure_reason = COALESCE($7, failure_reason) \
             WHERE checkout_request_id = $1 AND payment_status = 'PENDING' \
             RETURNING {}",
            RECORD_COLUMNS
        );

        let record = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(checkout_request_id)
            .bind(to.as_str())
            .bind(&fields.amount)
            .bind(&fields.receipt_number)
            .bind(fields.transaction_date)
            .bind(&fields.phone_number)
            .bind(&fields.failure_reason)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        Ok(record)
    }

    async fn list_for_invoice(&self, invoice_id: &str) -> PaymentResult<Vec<PaymentRecord>> {
        let query = format!(
            "SELECT {} FROM payments WHERE invoice_id = $1 ORDER BY recorded_at DESC",
            RECORD_COLUMNS
        );
        let records = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(invoice_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(records)
    }

    async fn find_stale_pending(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> PaymentResult<Vec<PaymentRecord>> {
        let query = format!(
            "SELECT {} FROM payments \
             WHERE payment_status = 'PENDING' AND recorded_at < $1 \
             ORDER BY recorded_at ASC LIMIT $2",
            RECORD_COLUMNS
        );
        let records = sqlx::query_as::<_, PaymentRecord>(&query)
            .bind(older_than)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(records)
    }

    async fn attach_evidence(&self, payment_id: Uuid, evidence: JsonValue) -> PaymentResult<()> {
        sqlx::query("UPDATE payments SET evidence = $2 WHERE id = $1")
            .bind(payment_id)
            .bind(evidence)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }
}

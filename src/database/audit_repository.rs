use crate::database::error::DatabaseError;
use crate::payments::error::PaymentResult;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use uuid::Uuid;

/// A single audit trail entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub actor: String,
    pub details: JsonValue,
}

impl AuditEntry {
    pub fn payment(action: &str, payment_id: Uuid, actor: &str, details: JsonValue) -> Self {
        AuditEntry {
            action: action.to_string(),
            entity_type: "payment".to_string(),
            entity_id: payment_id.to_string(),
            actor: actor.to_string(),
            details,
        }
    }
}

/// Destination for audit entries. Callers treat sink failures as
/// non-fatal; the payment path never rolls back because auditing failed.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> PaymentResult<()>;
}

#[derive(Clone)]
pub struct PgAuditRepository {
    pool: PgPool,
}

impl PgAuditRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditRepository {
    async fn record(&self, entry: AuditEntry) -> PaymentResult<()> {
        sqlx::query(
            "INSERT INTO audit_logs (id, action, entity_type, entity_id, actor, details, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW())",
        )
        .bind(Uuid::new_v4())
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(&entry.actor)
        .bind(&entry.details)
        .execute(&self.pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
        Ok(())
    }
}

//! Database module
//! Connection pool management and repositories for payments, invoices and
//! audit records.

pub mod audit_repository;
pub mod error;
pub mod invoice_repository;
pub mod payment_repository;

pub use audit_repository::{AuditSink, PgAuditRepository};
pub use error::{DatabaseError, DatabaseErrorKind};
pub use invoice_repository::{InvoiceStore, PgInvoiceRepository};
pub use payment_repository::PgPaymentRepository;

use crate::config::DatabaseConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::info;

/// Initialize the connection pool from configuration.
pub async fn init_pool(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
    let mut options = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout));

    if let Some(idle) = config.idle_timeout {
        options = options.idle_timeout(Duration::from_secs(idle));
    }

    let pool = options
        .connect(&config.url)
        .await
        .map_err(DatabaseError::from_sqlx)?;

    info!(
        max_connections = config.max_connections,
        "database pool initialized"
    );
    Ok(pool)
}

/// Cheap connectivity probe for the readiness endpoint.
pub async fn health_check(pool: &PgPool) -> Result<(), DatabaseError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(DatabaseError::from_sqlx)?;
    Ok(())
}

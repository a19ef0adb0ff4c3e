use anyhow::Context;
use clinicpay_backend::api::{self, AppState};
use clinicpay_backend::config::AppConfig;
use clinicpay_backend::database::{
    self, PgAuditRepository, PgInvoiceRepository, PgPaymentRepository,
};
use clinicpay_backend::gateway::client::StkGateway;
use clinicpay_backend::gateway::DarajaClient;
use clinicpay_backend::logging;
use clinicpay_backend::payments::store::PaymentStore;
use clinicpay_backend::services::{PaymentService, ReconciliationEngine};
use clinicpay_backend::workers::{RecoverySweep, SweepConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    logging::init_tracing(&config.logging);

    let missing = config.daraja.validate();
    if !missing.is_empty() {
        warn!(
            missing = ?missing,
            "M-Pesa gateway not fully configured; STK payments disabled until set"
        );
    }

    let pool = database::init_pool(&config.database)
        .await
        .context("failed to initialize database pool")?;

    let daraja = Arc::new(
        DarajaClient::new(config.daraja.clone())
            .map_err(|e| anyhow::anyhow!("failed to build gateway client: {}", e))?,
    );
    let gateway: Arc<dyn StkGateway> = daraja.clone();

    let store: Arc<dyn PaymentStore> = Arc::new(PgPaymentRepository::new(pool.clone()));
    let invoices = Arc::new(PgInvoiceRepository::new(pool.clone()));
    let audit = Arc::new(PgAuditRepository::new(pool.clone()));

    let service = Arc::new(PaymentService::new(
        gateway.clone(),
        store.clone(),
        invoices.clone(),
        audit.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let sweep_engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        invoices,
        audit,
    ));
    let sweep = RecoverySweep::new(
        SweepConfig::from_env(),
        store,
        gateway,
        sweep_engine,
        shutdown_rx.clone(),
    );
    let sweep_handle = tokio::spawn(sweep.run());

    let state = AppState {
        service,
        daraja,
        pool,
    };
    let app = api::router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(address = %addr, "payment service listening");

    let mut serve_shutdown = shutdown_rx.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let _ = serve_shutdown.changed().await;
    });

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for shutdown signal");
            return;
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await.context("server error")?;
    let _ = sweep_handle.await;
    info!("shutdown complete");
    Ok(())
}

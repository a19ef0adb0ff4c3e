mod common;

use chrono::Duration as ChronoDuration;
use clinicpay_backend::gateway::types::StkQueryOutcome;
use clinicpay_backend::payments::types::PaymentStatus;
use clinicpay_backend::services::reconciliation::ReconciliationEngine;
use clinicpay_backend::workers::{RecoverySweep, SweepConfig};
use common::{MemoryPaymentStore, MockGateway, RecordingAuditSink, RecordingInvoiceStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

struct SweepFixture {
    sweep: RecoverySweep,
    store: Arc<MemoryPaymentStore>,
    gateway: Arc<MockGateway>,
    invoices: Arc<RecordingInvoiceStore>,
}

fn sweep_fixture(stale_after_secs: i64) -> SweepFixture {
    let store = Arc::new(MemoryPaymentStore::new());
    let gateway = Arc::new(MockGateway::new());
    let invoices = Arc::new(RecordingInvoiceStore::new());
    let audit = Arc::new(RecordingAuditSink::new());
    let engine = Arc::new(ReconciliationEngine::new(
        store.clone(),
        invoices.clone(),
        audit,
    ));
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let config = SweepConfig {
        poll_interval: Duration::from_secs(60),
        stale_after: ChronoDuration::seconds(stale_after_secs),
        batch_size: 50,
    };
    let sweep = RecoverySweep::new(config, store.clone(), gateway.clone(), engine, shutdown_rx);
    SweepFixture {
        sweep,
        store,
        gateway,
        invoices,
    }
}

#[tokio::test]
async fn sweep_settles_a_payment_whose_callback_was_lost() {
    let fx = sweep_fixture(180);
    fx.store
        .insert_pending_aged("ws_CO_1", "INV-001", ChronoDuration::seconds(600));
    fx.gateway
        .script_query("ws_CO_1", StkQueryOutcome::Completed);

    fx.sweep.sweep_once().await;

    assert_eq!(fx.store.status_of("ws_CO_1"), Some(PaymentStatus::Completed));
    assert_eq!(fx.invoices.paid_count("INV-001"), 1);
}

#[tokio::test]
async fn sweep_marks_a_cancelled_prompt_failed() {
    let fx = sweep_fixture(180);
    fx.store
        .insert_pending_aged("ws_CO_1", "INV-001", ChronoDuration::seconds(600));
    fx.gateway.script_query(
        "ws_CO_1",
        StkQueryOutcome::Failed {
            code: 1032,
            description: "Request cancelled by user".to_string(),
        },
    );

    fx.sweep.sweep_once().await;

    assert_eq!(fx.store.status_of("ws_CO_1"), Some(PaymentStatus::Failed));
    assert_eq!(fx.invoices.paid_count("INV-001"), 0);
}

#[tokio::test]
async fn sweep_ignores_fresh_pending_payments() {
    let fx = sweep_fixture(180);
    fx.store.insert_pending("ws_CO_1", "INV-001");
    fx.gateway
        .script_query("ws_CO_1", StkQueryOutcome::Completed);

    fx.sweep.sweep_once().await;

    assert_eq!(fx.store.status_of("ws_CO_1"), Some(PaymentStatus::Pending));
    assert_eq!(
        fx.gateway
            .query_calls
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn sweep_leaves_unsettled_requests_for_the_next_cycle() {
    let fx = sweep_fixture(180);
    fx.store
        .insert_pending_aged("ws_CO_1", "INV-001", ChronoDuration::seconds(600));
    // No scripted outcome: the gateway still reports the request in flight.

    fx.sweep.sweep_once().await;
    assert_eq!(fx.store.status_of("ws_CO_1"), Some(PaymentStatus::Pending));

    fx.gateway
        .script_query("ws_CO_1", StkQueryOutcome::Completed);
    fx.sweep.sweep_once().await;
    assert_eq!(fx.store.status_of("ws_CO_1"), Some(PaymentStatus::Completed));
}

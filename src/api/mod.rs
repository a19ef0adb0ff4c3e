//! HTTP API: payment endpoints, the gateway webhook and health probes.

pub mod callbacks;
pub mod error;
pub mod health;
pub mod payments;

use crate::gateway::DarajaClient;
use crate::services::PaymentService;
use axum::routing::{get, post};
use axum::Router;
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PaymentService>,
    pub daraja: Arc<DarajaClient>,
    pub pool: PgPool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/payments/initiate", post(payments::initiate_payment))
        .route("/payments/callback", post(callbacks::stk_callback))
        .route(
            "/payments/status/{checkout_request_id}",
            get(payments::payment_status),
        )
        .route(
            "/payments/cancel/{checkout_request_id}",
            post(payments::cancel_payment),
        )
        .route("/payments/cash", post(payments::record_cash_payment))
        .route(
            "/payments/invoice/{invoice_id}",
            get(payments::invoice_payments),
        )
        .route(
            "/payments/evidence/{payment_id}",
            get(payments::payment_evidence),
        )
        .route("/payments/config", get(payments::gateway_config))
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

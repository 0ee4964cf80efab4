//! HTTP surface: axum handlers, shared state and the router.

pub mod error;
pub mod extractors;
pub mod health;
pub mod order;
pub mod payment;
pub mod webhook;

use crate::config::Config;
use crate::database::repository::TransactionManager;
use crate::orders::OrderService;
use crate::payments::{DirectVerifier, TransitionCoordinator, WebhookProcessor};
use axum::{
    routing::{get, patch, post},
    Router,
};
use http::HeaderName;
use std::sync::Arc;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Shared handler state; cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<DirectVerifier>,
    pub webhooks: Arc<WebhookProcessor>,
    pub orders: Arc<OrderService>,
    pub store: Arc<dyn TransactionManager>,
    pub key_id: Arc<str>,
    pub environment: Arc<str>,
}

impl AppState {
    /// Wire the coordinator, ingress adapters and order service over one store
    pub fn new(store: Arc<dyn TransactionManager>, config: &Config) -> Self {
        let storage_timeout = config.storage_timeout();
        let coordinator = Arc::new(TransitionCoordinator::new(store.clone(), storage_timeout));

        Self {
            verifier: Arc::new(DirectVerifier::new(
                coordinator.clone(),
                config.order_secret(),
            )),
            webhooks: Arc::new(WebhookProcessor::new(coordinator, config.webhook_secret())),
            orders: Arc::new(OrderService::new(store.clone(), storage_timeout)),
            store,
            key_id: Arc::from(config.payments.key_id.as_str()),
            environment: Arc::from(config.server.environment.as_str()),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    let payment_routes = Router::new()
        .route("/verify", post(payment::verify_payment))
        .route("/webhook", post(webhook::receive_webhook))
        .route("/key", get(payment::checkout_key))
        .route("/razorpay-key", get(payment::checkout_key));

    let order_routes = Router::new()
        .route("/orders", get(order::my_orders))
        .route("/all-orders", get(order::all_orders))
        .route("/cancel-order/:order_id", patch(order::cancel_order))
        .route("/update-order-status/:order_id", patch(order::update_order_status))
        .route("/:order_id", get(order::get_order));

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api/v1/payment", payment_routes)
        .nest("/api/v1/order", order_routes)
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .with_state(state)
}

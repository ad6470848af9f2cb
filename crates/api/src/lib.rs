//! HTTP API server for the commerce backend.
//!
//! Exposes the cart, checkout and payment surface over REST with
//! structured logging (tracing) and Prometheus metrics. Identity arrives
//! per request from the upstream identity provider (see
//! [`identity::Caller`]); ownership checks happen per endpoint.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use checkout::{CheckoutService, InMemoryNotifier, InstantGateway, SettlementService};
use metrics_exporter_prometheus::PrometheusHandle;
use store::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: CommerceStore> {
    pub store: S,
    pub checkout: CheckoutService<S, InMemoryNotifier>,
    pub settlement: SettlementService<S, InstantGateway>,
    /// Handle onto the dispatcher inside `checkout`, for observability
    /// and tests.
    pub notifier: InMemoryNotifier,
    /// Handle onto the gateway inside `settlement`.
    pub gateway: InstantGateway,
    /// Shared secret expected on gateway callback requests.
    pub gateway_token: Option<String>,
}

/// Wires the services around a store.
pub fn create_state<S: CommerceStore + Clone>(
    store: S,
    gateway_token: Option<String>,
) -> Arc<AppState<S>> {
    let notifier = InMemoryNotifier::new();
    let gateway = InstantGateway::new();
    Arc::new(AppState {
        checkout: CheckoutService::new(store.clone(), notifier.clone()),
        settlement: SettlementService::new(store.clone(), gateway.clone()),
        store,
        notifier,
        gateway,
        gateway_token,
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CommerceStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        // cart
        .route("/carts/me", get(routes::carts::my_cart::<S>))
        .route("/carts/items", post(routes::carts::add_item::<S>))
        .route(
            "/carts/items/{id}",
            patch(routes::carts::update_item::<S>).delete(routes::carts::remove_item::<S>),
        )
        // orders
        .route(
            "/orders/create-from-cart",
            post(routes::orders::create_from_cart::<S>),
        )
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route(
            "/orders/{id}/status",
            post(routes::orders::advance_status::<S>),
        )
        // payments
        .route("/payments", post(routes::payments::create::<S>))
        .route(
            "/payments/gateway/callback",
            post(routes::payments::gateway_callback::<S>),
        )
        // address book & catalog seeding
        .route("/addresses", post(routes::addresses::create::<S>))
        .route("/products", post(routes::products::create::<S>))
        .route("/products/{id}", delete(routes::products::remove::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

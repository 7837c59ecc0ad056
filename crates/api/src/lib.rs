//! HTTP API server for the shop cart and checkout core.
//!
//! Exposes cart editing, checkout and order management over REST, with
//! structured logging (tracing) and Prometheus metrics. The caller's
//! identity arrives in headers set by an upstream authenticating proxy.

pub mod config;
pub mod error;
pub mod fixture;
pub mod identity;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{
    AppState, InMemoryBackend, PostgresBackend, ShopBackend, create_in_memory_state,
    create_postgres_state,
};

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<B: ShopBackend>(
    state: Arc<AppState<B>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/cart", get(routes::cart::get::<B>))
        .route("/api/cart/items", post(routes::cart::add_item::<B>))
        .route(
            "/api/cart/items/{product_id}",
            put(routes::cart::set_quantity::<B>).delete(routes::cart::remove_item::<B>),
        )
        .route("/api/cart/clear", post(routes::cart::clear::<B>))
        .route("/api/orders/checkout", post(routes::orders::checkout::<B>))
        .route("/api/orders/my", get(routes::orders::mine::<B>))
        .route("/api/orders", get(routes::orders::list::<B>))
        .route("/api/orders/{id}", get(routes::orders::get::<B>))
        .route(
            "/api/orders/{id}/status",
            patch(routes::orders::set_status::<B>),
        )
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

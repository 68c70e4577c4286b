use axum::{
    BoxError, Router,
    error_handling::HandleErrorLayer,
    response::IntoResponse,
    routing::{get, post, put},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceBuilder;
use tower::timeout::TimeoutLayer;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::catalog_manager::CatalogManager;
use crate::catalog_service::CatalogReadService;
use crate::discount::DiscountResolver;
use crate::models::ShopType;
use crate::reconciler::ReconciliationEngine;
use crate::store::SqliteCatalogStore;
use crate::AppConfig;

pub mod handlers;
pub mod responses;

pub use handlers::{
    // Reconciliation
    reconcile_shop,
    // Listings
    list_listings, get_listing, update_listing, delete_listing, copy_listing,
    // References
    assign_reference, clear_reference, update_reference,
    // Discounts
    list_discounts, upsert_discount, delete_discount,
    // System
    dashboard, health_check, render_metrics,
};
pub use responses::*;

/// Shops with a reconciliation in flight. At most one run per shop.
#[derive(Clone, Default)]
pub struct RunRegistry {
    running: Arc<Mutex<HashSet<(ShopType, String)>>>,
}

/// Marks a shop busy until dropped.
pub struct RunGuard {
    registry: RunRegistry,
    key: (ShopType, String),
}

impl RunRegistry {
    pub fn try_start(&self, shop_type: ShopType, shop_name: &str) -> Option<RunGuard> {
        let key = (shop_type, shop_name.to_string());
        let mut running = self.running.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if !running.insert(key.clone()) {
            return None;
        }
        Some(RunGuard {
            registry: self.clone(),
            key,
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        let mut running = self
            .registry
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        running.remove(&self.key);
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ReconciliationEngine>,
    pub catalog: Arc<CatalogReadService>,
    pub manager: Arc<CatalogManager>,
    pub runs: RunRegistry,
    pub metrics: Option<PrometheusHandle>,
    pub config: AppConfig,
}

impl AppState {
    /// Wires every service onto one shared store.
    pub fn new(
        store: Arc<SqliteCatalogStore>,
        config: AppConfig,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let engine = ReconciliationEngine::new(store.clone(), config.reconciliation.clone());
        let catalog = CatalogReadService::new(
            store.clone(),
            store.clone(),
            DiscountResolver::new(store.clone()),
        );
        let manager = CatalogManager::new(store.clone(), store.clone(), store);

        Self {
            engine: Arc::new(engine),
            catalog: Arc::new(catalog),
            manager: Arc::new(manager),
            runs: RunRegistry::default(),
            metrics,
            config,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.server.request_timeout.max(1));

    let mut router = Router::new()
        // Health check
        .route("/health", get(health_check))
        // API routes
        .nest("/api/v1", api_routes());

    if state.config.metrics.enabled && state.metrics.is_some() {
        router = router.route(&state.config.metrics.endpoint, get(render_metrics));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new())
                .layer(CorsLayer::permissive())
                .layer(HandleErrorLayer::new(handle_timeout_error))
                .layer(TimeoutLayer::new(timeout)),
        )
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        // Reconciliation
        .route("/shops/:shop_type/:shop_name/reconcile", post(reconcile_shop))
        // Listings
        .route("/listings", get(list_listings))
        .route(
            "/listings/:id",
            get(get_listing).patch(update_listing).delete(delete_listing),
        )
        .route("/listings/:id/copy", post(copy_listing))
        .route(
            "/listings/:id/reference",
            put(assign_reference).delete(clear_reference),
        )
        // References
        .route("/references/:id", put(update_reference))
        // Discounts
        .route("/discounts", get(list_discounts))
        .route(
            "/discounts/:shop_name",
            put(upsert_discount).delete(delete_discount),
        )
        // Dashboard
        .route("/dashboard", get(dashboard))
}

async fn handle_timeout_error(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        AppError::RequestTimeout.into_response()
    } else {
        tracing::error!(error = %err, "Unhandled middleware error");
        AppError::Internal.into_response()
    }
}

pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let address = state.config.server_address();
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Server starting on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
}

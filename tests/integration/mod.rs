// Integration tests for the resale catalog
// These tests run the services against a migrated in-memory SQLite database

pub mod catalog_tests;
pub mod reconciliation_tests;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use resale_catalog::{
    AppConfig, Listing, ScrapedItem, ShopType,
    config::{DatabaseConfig, ReconciliationConfig},
    store::{ListingStore, SqliteCatalogStore},
    web::AppState,
};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

/// Test configuration for integration tests
pub fn get_test_config() -> AppConfig {
    AppConfig {
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..Default::default()
        },
        reconciliation: ReconciliationConfig {
            batch_size: 2,
            fetch_retry_attempts: 1,
            fetch_retry_delay_ms: 1,
            max_concurrent_shops: 2,
        },
        ..Default::default()
    }
}

/// Create a migrated in-memory store
pub async fn create_test_store() -> anyhow::Result<Arc<SqliteCatalogStore>> {
    let store = SqliteCatalogStore::connect(&get_test_config().database).await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}

/// Create test app state with all services wired onto one store
pub async fn create_test_app_state() -> anyhow::Result<(AppState, Arc<SqliteCatalogStore>)> {
    let store = create_test_store().await?;
    let state = AppState::new(store.clone(), get_test_config(), None);
    Ok((state, store))
}

pub fn scraped(name: &str, price: i64) -> ScrapedItem {
    ScrapedItem {
        name: name.to_string(),
        price: Some(Decimal::from(price)),
        sale_price: None,
        image_url: Some(format!("https://img.example.com/{}.jpg", name)),
        product_url: Some(format!("https://shop.example.com/items/{}", name)),
    }
}

pub async fn shop_listings(
    store: &SqliteCatalogStore,
    shop_type: ShopType,
    shop_name: &str,
) -> anyhow::Result<Vec<Listing>> {
    let filter = resale_catalog::models::ListingFilter::for_shop(shop_type, shop_name);
    Ok(store.select_listings(&filter).await?)
}

/// Sends one request through the router and decodes the JSON body, if any.
pub async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> anyhow::Result<(StatusCode, Value)> {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json)?)
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(request.body(body)?).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    // Extractor rejections come back as plain text
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
    };

    Ok((status, json))
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::models::{
    DashboardSummary, EnrichedListing, Listing, ListingFilter, MarketplaceReference, NewReference,
    NewShopDiscount, ScrapedItem, ShopDiscount, ShopType, UpdateListing, UpdateReference,
};
use crate::reconciler::ReconcileReport;

use super::{ApiResponse, AppError, AppState, HealthResponse};

#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub shop_type: Option<String>,
    pub shop_name: Option<String>,
    pub include_hidden: Option<bool>,
    pub favorites_only: Option<bool>,
}

impl ListingQuery {
    fn into_filter(self) -> Result<ListingFilter, AppError> {
        let shop_type = match self.shop_type.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(parse_shop_type(raw)?),
            _ => None,
        };

        Ok(ListingFilter {
            shop_type,
            shop_name: self.shop_name.filter(|name| !name.trim().is_empty()),
            original_ids: None,
            include_hidden: self.include_hidden.unwrap_or(false),
            favorites_only: self.favorites_only.unwrap_or(false),
        })
    }
}

fn parse_shop_type(raw: &str) -> Result<ShopType, AppError> {
    raw.parse::<ShopType>()
        .map_err(|_| AppError::BadRequest(format!("Unknown shop type: {}", raw)))
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

// Reconciliation
pub async fn reconcile_shop(
    State(state): State<AppState>,
    Path((shop_type, shop_name)): Path<(String, String)>,
    Json(items): Json<Vec<ScrapedItem>>,
) -> Result<Json<ApiResponse<ReconcileReport>>, AppError> {
    let shop_type = parse_shop_type(&shop_type)?;
    if shop_name.trim().is_empty() {
        return Err(AppError::BadRequest("Shop name is required".into()));
    }

    let Some(_guard) = state.runs.try_start(shop_type, &shop_name) else {
        tracing::warn!(%shop_type, shop_name, "Rejected overlapping reconciliation");
        return Err(AppError::Conflict(format!(
            "A reconciliation for {}/{} is already running",
            shop_type, shop_name
        )));
    };

    let report = state.engine.reconcile(shop_type, &shop_name, items).await;
    Ok(Json(ApiResponse::success(report)))
}

// Listings
pub async fn list_listings(
    State(state): State<AppState>,
    Query(query): Query<ListingQuery>,
) -> Result<Json<ApiResponse<Vec<EnrichedListing>>>, AppError> {
    let filter = query.into_filter()?;
    let rows = state.catalog.list_enriched(&filter).await?;

    tracing::debug!(count = rows.len(), "Listed catalog entries");
    let meta = json!({ "count": rows.len() });
    Ok(Json(ApiResponse::success_with_meta(rows, meta)))
}

pub async fn get_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<EnrichedListing>>, AppError> {
    let row = state.catalog.get_enriched(&id).await?;
    Ok(Json(ApiResponse::success(row)))
}

pub async fn update_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<UpdateListing>,
) -> Result<Json<ApiResponse<Listing>>, AppError> {
    let listing = state.manager.update_listing(&id, update).await?;
    Ok(Json(ApiResponse::success(listing)))
}

pub async fn delete_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let deleted = state.manager.delete_listing(&id).await?;
    Ok(Json(ApiResponse::success(json!({ "deleted": deleted }))))
}

pub async fn copy_listing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let copy = state.manager.copy_listing(&id).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(copy))))
}

// References
pub async fn assign_reference(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<NewReference>,
) -> Result<Json<ApiResponse<MarketplaceReference>>, AppError> {
    let reference = state.manager.assign_reference(&id, request).await?;
    Ok(Json(ApiResponse::success(reference)))
}

pub async fn clear_reference(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<Value>>, AppError> {
    let removed = state.manager.clear_reference(&id).await?;
    Ok(Json(ApiResponse::success(json!({ "removed": removed }))))
}

pub async fn update_reference(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(update): Json<UpdateReference>,
) -> Result<Json<ApiResponse<MarketplaceReference>>, AppError> {
    let reference = state.manager.update_reference(&id, update).await?;
    Ok(Json(ApiResponse::success(reference)))
}

// Discounts
pub async fn list_discounts(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ShopDiscount>>>, AppError> {
    let discounts = state.manager.list_discounts().await?;
    Ok(Json(ApiResponse::success(discounts)))
}

pub async fn upsert_discount(
    State(state): State<AppState>,
    Path(shop_name): Path<String>,
    Json(request): Json<NewShopDiscount>,
) -> Result<Json<ApiResponse<ShopDiscount>>, AppError> {
    let discount = state.manager.upsert_discount(&shop_name, request).await?;
    Ok(Json(ApiResponse::success(discount)))
}

pub async fn delete_discount(
    State(state): State<AppState>,
    Path(shop_name): Path<String>,
) -> Result<StatusCode, AppError> {
    state.manager.delete_discount(&shop_name).await?;
    Ok(StatusCode::NO_CONTENT)
}

// Dashboard
pub async fn dashboard(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<DashboardSummary>>, AppError> {
    let summary = state.catalog.dashboard().await?;
    Ok(Json(ApiResponse::success(summary)))
}

pub async fn render_metrics(State(state): State<AppState>) -> Result<String, AppError> {
    match &state.metrics {
        Some(handle) => Ok(handle.render()),
        None => Err(AppError::NotFound("Metrics recorder not enabled".into())),
    }
}

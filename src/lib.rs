pub mod catalog_manager;
pub mod catalog_service;
pub mod config;
pub mod discount;
pub mod identity;
pub mod logging;
pub mod models;
pub mod profit;
pub mod reconciler;
pub mod store;
pub mod utils;
pub mod web;

// Re-export commonly used types
pub use catalog_manager::CatalogManager;
pub use catalog_service::CatalogReadService;
pub use config::AppConfig;
pub use discount::DiscountResolver;
pub use models::{EnrichedListing, Listing, MarketplaceReference, ScrapedItem, ShopDiscount, ShopType};
pub use reconciler::{ReconcileError, ReconcileReport, ReconciliationEngine};
pub use utils::error::{AppError, Result};

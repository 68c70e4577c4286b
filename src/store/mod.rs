//! Typed data access over the catalog tables.
//!
//! One trait per table family. The engine and services only ever see these
//! traits behind an `Arc<dyn …>`, so tests can swap in mocks.

use async_trait::async_trait;

use crate::Result;
use crate::models::{
    Listing, ListingFilter, ListingReferenceLink, MarketplaceReference, PricePatch, ShopDiscount,
};

pub mod sqlite;

pub use sqlite::SqliteCatalogStore;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn select_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>>;

    async fn get_listing(&self, id: &str) -> Result<Option<Listing>>;

    /// Inserts all rows or none of them.
    async fn insert_listings(&self, listings: &[Listing]) -> Result<u64>;

    /// Overwrites price, sale price and image URL only.
    async fn update_listing_prices(&self, id: &str, patch: &PricePatch) -> Result<()>;

    /// Persists every user editable field of `listing`.
    async fn update_listing(&self, listing: &Listing) -> Result<()>;

    /// Points copies of any listing in `from_ids` at `to_id`.
    async fn reassign_lineage(&self, from_ids: &[String], to_id: &str) -> Result<u64>;

    /// Deletes the listings and their reference links. References survive.
    async fn delete_listings(&self, ids: &[String]) -> Result<u64>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn get_reference(&self, id: &str) -> Result<Option<MarketplaceReference>>;

    async fn find_reference_by_asin(&self, asin: &str) -> Result<Option<MarketplaceReference>>;

    async fn select_references(&self, ids: &[String]) -> Result<Vec<MarketplaceReference>>;

    async fn insert_reference(&self, reference: &MarketplaceReference) -> Result<()>;

    async fn update_reference(&self, reference: &MarketplaceReference) -> Result<()>;

    async fn select_links(&self, listing_ids: &[String]) -> Result<Vec<ListingReferenceLink>>;

    /// Drops any existing link of the listing, then stores `link`.
    async fn replace_link(&self, link: &ListingReferenceLink) -> Result<()>;

    async fn delete_links_for_listing(&self, listing_id: &str) -> Result<u64>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DiscountStore: Send + Sync {
    async fn find_discount(&self, shop_name: &str) -> Result<Option<ShopDiscount>>;

    async fn list_discounts(&self) -> Result<Vec<ShopDiscount>>;

    async fn upsert_discount(&self, discount: &ShopDiscount) -> Result<()>;

    async fn delete_discount(&self, shop_name: &str) -> Result<bool>;
}

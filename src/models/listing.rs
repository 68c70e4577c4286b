use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::identity::identity_key;
use crate::models::{ShopType, generate_id};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: String,
    pub shop_type: ShopType,
    pub shop_name: String,

    // Scraped fields
    pub name: String,
    pub price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,

    // User state
    pub is_hidden: bool,
    pub is_favorite: bool,
    pub memo: Option<String>,

    // Lineage pointer, set only on user-created copies
    pub original_id: Option<String>,

    // Metadata
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewListing {
    pub shop_type: ShopType,
    pub shop_name: String,
    pub name: String,
    pub price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub image_url: Option<String>,
    pub source_url: Option<String>,
}

/// User edits. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateListing {
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub sale_price: Option<Decimal>,
    #[serde(default)]
    pub clear_sale_price: Option<bool>,
    #[serde(default)]
    pub is_hidden: Option<bool>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
    #[serde(default)]
    pub memo: Option<String>,
}

/// The only fields a reconciliation run ever overwrites on an existing listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePatch {
    pub price: Option<Decimal>,
    pub sale_price: Option<Decimal>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListingFilter {
    pub shop_type: Option<ShopType>,
    pub shop_name: Option<String>,
    pub original_ids: Option<Vec<String>>,
    #[serde(default)]
    pub include_hidden: bool,
    #[serde(default)]
    pub favorites_only: bool,
}

impl ListingFilter {
    /// Every listing of one shop, hidden ones included.
    pub fn for_shop(shop_type: ShopType, shop_name: &str) -> Self {
        Self {
            shop_type: Some(shop_type),
            shop_name: Some(shop_name.to_string()),
            original_ids: None,
            include_hidden: true,
            favorites_only: false,
        }
    }

    pub fn copies_of(original_ids: Vec<String>) -> Self {
        Self {
            original_ids: Some(original_ids),
            include_hidden: true,
            ..Default::default()
        }
    }
}

impl Listing {
    pub fn new(new_listing: NewListing) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            shop_type: new_listing.shop_type,
            shop_name: new_listing.shop_name,
            name: new_listing.name,
            price: new_listing.price,
            sale_price: new_listing.sale_price,
            image_url: new_listing.image_url,
            source_url: new_listing.source_url,
            is_hidden: false,
            is_favorite: false,
            memo: None,
            original_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update(&mut self, update: UpdateListing) {
        if let Some(price) = update.price {
            self.price = Some(price);
        }
        if let Some(sale_price) = update.sale_price {
            self.sale_price = Some(sale_price);
        }
        if update.clear_sale_price == Some(true) {
            self.sale_price = None;
        }
        if let Some(is_hidden) = update.is_hidden {
            self.is_hidden = is_hidden;
        }
        if let Some(is_favorite) = update.is_favorite {
            self.is_favorite = is_favorite;
        }
        if let Some(memo) = update.memo {
            self.memo = if memo.trim().is_empty() { None } else { Some(memo) };
        }

        self.updated_at = Utc::now();
    }

    /// Builds a user copy. Copies of copies point at the root original so
    /// lineage stays one level deep.
    pub fn duplicate(&self) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            original_id: Some(self.original_id.clone().unwrap_or_else(|| self.id.clone())),
            created_at: now,
            updated_at: now,
            ..self.clone()
        }
    }

    pub fn identity_key(&self) -> String {
        identity_key(self.source_url.as_deref(), &self.name)
    }

    pub fn is_copy(&self) -> bool {
        self.original_id.is_some()
    }

    /// Sale price when present, else list price, else zero.
    pub fn base_price(&self) -> Decimal {
        self.sale_price.or(self.price).unwrap_or(Decimal::ZERO)
    }

    pub fn price_patch(&self) -> PricePatch {
        PricePatch {
            price: self.price,
            sale_price: self.sale_price,
            image_url: self.image_url.clone(),
        }
    }
}

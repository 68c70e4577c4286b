use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::identity::identity_key;
use crate::models::{Listing, NewListing, PricePatch, ShopType};

/// One normalized listing record handed over by a scraping collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedItem {
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub sale_price: Option<Decimal>,
    #[serde(default, alias = "imageURL")]
    pub image_url: Option<String>,
    #[serde(default, alias = "productURL")]
    pub product_url: Option<String>,
}

fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::new("blank"))
    } else {
        Ok(())
    }
}

impl ScrapedItem {
    pub fn identity_key(&self) -> String {
        identity_key(self.product_url.as_deref(), &self.name)
    }

    pub fn price_patch(&self) -> PricePatch {
        PricePatch {
            price: self.price,
            sale_price: self.sale_price,
            image_url: self.image_url.clone(),
        }
    }

    /// True when any field a reconciliation run owns differs from `existing`.
    pub fn differs_from(&self, existing: &Listing) -> bool {
        self.price != existing.price
            || self.sale_price != existing.sale_price
            || self.image_url != existing.image_url
    }

    pub fn into_listing(self, shop_type: ShopType, shop_name: &str) -> Listing {
        Listing::new(NewListing {
            shop_type,
            shop_name: shop_name.to_string(),
            name: self.name,
            price: self.price,
            sale_price: self.sale_price,
            image_url: self.image_url,
            source_url: self.product_url,
        })
    }
}

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::AppError;

pub mod discount;
pub mod enriched;
pub mod listing;
pub mod reference;
pub mod scraped_item;

// Re-exports for convenience
pub use discount::*;
pub use enriched::*;
pub use listing::*;
pub use reference::*;
pub use scraped_item::*;

/// Largest price or fee accepted from users: one trillion.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0xD4A5_1000, 0xE8, 0, false, 0);

// Common enums used across models
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum ShopType {
    #[sqlx(rename = "official")]
    Official,
    #[sqlx(rename = "rakuten")]
    Rakuten,
    #[sqlx(rename = "yahoo")]
    Yahoo,
}

impl ShopType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShopType::Official => "official",
            ShopType::Rakuten => "rakuten",
            ShopType::Yahoo => "yahoo",
        }
    }
}

impl fmt::Display for ShopType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShopType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "official" => Ok(ShopType::Official),
            "rakuten" => Ok(ShopType::Rakuten),
            "yahoo" => Ok(ShopType::Yahoo),
            other => Err(AppError::Validation(format!("Unknown shop type: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT")]
pub enum DiscountType {
    #[sqlx(rename = "percentage")]
    Percentage,
    #[sqlx(rename = "fixed")]
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }
}

impl FromStr for DiscountType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            other => Err(AppError::Validation(format!("Unknown discount type: {}", other))),
        }
    }
}

// Helper function to generate UUIDs in the format expected by the database
pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

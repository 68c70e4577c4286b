use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::AppError;
use crate::models::{DiscountType, MAX_AMOUNT};

/// Per-shop purchase discount, keyed by shop name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShopDiscount {
    pub shop_name: String,
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub is_enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewShopDiscount {
    pub discount_type: DiscountType,
    pub discount_value: Decimal,
    pub is_enabled: Option<bool>,
}

impl ShopDiscount {
    pub fn new(shop_name: &str, new_discount: NewShopDiscount) -> Result<Self, AppError> {
        Self::validate_value(new_discount.discount_type, new_discount.discount_value)?;
        if shop_name.trim().is_empty() {
            return Err(AppError::Validation("Shop name is required".into()));
        }

        let now = Utc::now();
        Ok(Self {
            shop_name: shop_name.to_string(),
            discount_type: new_discount.discount_type,
            discount_value: new_discount.discount_value,
            is_enabled: new_discount.is_enabled.unwrap_or(true),
            created_at: now,
            updated_at: now,
        })
    }

    fn validate_value(discount_type: DiscountType, value: Decimal) -> Result<(), AppError> {
        if value < Decimal::ZERO {
            return Err(AppError::Validation("Discount value cannot be negative".into()));
        }
        if discount_type == DiscountType::Percentage && value > Decimal::ONE_HUNDRED {
            return Err(AppError::Validation(
                "Percentage discount must be between 0 and 100".into(),
            ));
        }
        if value > MAX_AMOUNT {
            return Err(AppError::Validation(format!(
                "Discount value cannot exceed {}",
                MAX_AMOUNT
            )));
        }
        Ok(())
    }

    /// Price after this rule, or `None` when the result does not fit a
    /// `Decimal`. Disabled rules leave the price unchanged.
    pub fn apply(&self, base_price: Decimal) -> Option<Decimal> {
        if !self.is_enabled {
            return Some(base_price);
        }
        match self.discount_type {
            DiscountType::Percentage => {
                let kept = Decimal::ONE_HUNDRED.checked_sub(self.discount_value)?;
                base_price.checked_mul(kept)?.checked_div(Decimal::ONE_HUNDRED)
            }
            DiscountType::Fixed => base_price.checked_sub(self.discount_value),
        }
    }
}

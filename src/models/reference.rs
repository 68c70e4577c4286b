use chrono::{DateTime, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use validator::{Validate, ValidationError};

use crate::models::{MAX_AMOUNT, generate_id};

static ASIN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9]{10}$").expect("ASIN pattern is valid"));

/// Amazon catalog entry a listing is resold against.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketplaceReference {
    pub id: String,
    pub asin: String,
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub monthly_sales: Option<i64>,
    /// Commission percentage, 0 to 100
    pub fee_rate: Option<Decimal>,
    pub fulfillment_fee: Option<Decimal>,
    pub jan_code: Option<String>,

    pub available_on_marketplace: bool,
    pub available_on_official_site: bool,

    // Risk tracking
    pub complaint_count: i64,
    pub is_hazardous: bool,
    pub has_brand_restriction: bool,

    pub memo: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NewReference {
    #[validate(custom(function = "validate_asin"))]
    pub asin: String,
    pub name: Option<String>,
    #[validate(custom(function = "validate_amount"))]
    pub price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub monthly_sales: Option<i64>,
    #[validate(custom(function = "validate_fee_rate"))]
    pub fee_rate: Option<Decimal>,
    #[validate(custom(function = "validate_amount"))]
    pub fulfillment_fee: Option<Decimal>,
    pub jan_code: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateReference {
    pub name: Option<String>,
    #[validate(custom(function = "validate_amount"))]
    pub price: Option<Decimal>,
    #[validate(range(min = 0))]
    pub monthly_sales: Option<i64>,
    #[validate(custom(function = "validate_fee_rate"))]
    pub fee_rate: Option<Decimal>,
    #[validate(custom(function = "validate_amount"))]
    pub fulfillment_fee: Option<Decimal>,
    pub jan_code: Option<String>,
    pub available_on_marketplace: Option<bool>,
    pub available_on_official_site: Option<bool>,
    #[validate(range(min = 0))]
    pub complaint_count: Option<i64>,
    pub is_hazardous: Option<bool>,
    pub has_brand_restriction: Option<bool>,
    pub memo: Option<String>,
}

/// Join row between a listing and its reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct ListingReferenceLink {
    pub listing_id: String,
    pub reference_id: String,
    pub created_at: DateTime<Utc>,
}

impl ListingReferenceLink {
    pub fn new(listing_id: &str, reference_id: &str) -> Self {
        Self {
            listing_id: listing_id.to_string(),
            reference_id: reference_id.to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Upper-cases and trims a user supplied code before validation.
pub fn normalize_asin(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn validate_asin(code: &str) -> Result<(), ValidationError> {
    if ASIN_PATTERN.is_match(code) {
        Ok(())
    } else {
        Err(ValidationError::new("asin_format"))
    }
}

fn validate_fee_rate(rate: &Decimal) -> Result<(), ValidationError> {
    if *rate >= Decimal::ZERO && *rate <= Decimal::ONE_HUNDRED {
        Ok(())
    } else {
        Err(ValidationError::new("fee_rate_range"))
    }
}

fn validate_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        Err(ValidationError::new("negative_amount"))
    } else if *amount > MAX_AMOUNT {
        Err(ValidationError::new("amount_too_large"))
    } else {
        Ok(())
    }
}

impl MarketplaceReference {
    pub fn new(new_reference: NewReference) -> Self {
        let now = Utc::now();
        Self {
            id: generate_id(),
            asin: new_reference.asin,
            name: new_reference.name,
            price: new_reference.price,
            monthly_sales: new_reference.monthly_sales,
            fee_rate: new_reference.fee_rate,
            fulfillment_fee: new_reference.fulfillment_fee,
            jan_code: new_reference.jan_code,
            available_on_marketplace: true,
            available_on_official_site: false,
            complaint_count: 0,
            is_hazardous: false,
            has_brand_restriction: false,
            memo: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn update(&mut self, update: UpdateReference) {
        if let Some(name) = update.name {
            self.name = Some(name);
        }
        if let Some(price) = update.price {
            self.price = Some(price);
        }
        if let Some(monthly_sales) = update.monthly_sales {
            self.monthly_sales = Some(monthly_sales);
        }
        if let Some(fee_rate) = update.fee_rate {
            self.fee_rate = Some(fee_rate);
        }
        if let Some(fulfillment_fee) = update.fulfillment_fee {
            self.fulfillment_fee = Some(fulfillment_fee);
        }
        if let Some(jan_code) = update.jan_code {
            self.jan_code = Some(jan_code);
        }
        if let Some(flag) = update.available_on_marketplace {
            self.available_on_marketplace = flag;
        }
        if let Some(flag) = update.available_on_official_site {
            self.available_on_official_site = flag;
        }
        if let Some(count) = update.complaint_count {
            self.complaint_count = count;
        }
        if let Some(flag) = update.is_hazardous {
            self.is_hazardous = flag;
        }
        if let Some(flag) = update.has_brand_restriction {
            self.has_brand_restriction = flag;
        }
        if let Some(memo) = update.memo {
            self.memo = Some(memo);
        }

        self.updated_at = Utc::now();
    }
}

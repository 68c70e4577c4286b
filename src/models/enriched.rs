use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Listing, MarketplaceReference};

/// A listing joined with its linked reference and computed profit figures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrichedListing {
    #[serde(flatten)]
    pub listing: Listing,
    pub reference: Option<MarketplaceReference>,
    pub effective_price: Decimal,
    pub profit_amount: Decimal,
    pub profit_rate: Decimal,
    pub roi: Decimal,
}

impl EnrichedListing {
    pub fn is_linked(&self) -> bool {
        self.reference.is_some()
    }

    pub fn is_profitable(&self) -> bool {
        self.profit_amount > Decimal::ZERO
    }
}

/// Catalog-wide aggregates shown on the dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DashboardSummary {
    pub total_listings: u64,
    pub linked_listings: u64,
    /// Percentage of listings with a linked reference
    pub link_rate: Decimal,
    /// Mean profit rate over linked listings only
    pub average_profit_rate: Decimal,
    pub profitable_listings: u64,
    pub total_expected_profit: Decimal,
}

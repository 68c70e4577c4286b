//! Profit figures for a listing resold against its marketplace reference.
//!
//! Everything here is total: missing or out-of-range inputs degrade to zeros.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{Listing, MarketplaceReference, ShopDiscount};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfitBreakdown {
    pub effective_price: Decimal,
    pub profit_amount: Decimal,
    /// Profit over total cost, in percent
    pub profit_rate: Decimal,
    /// Profit over effective purchase price, in percent
    pub roi: Decimal,
}

/// Purchase price after the shop's discount, unrounded. `None` when the
/// discounted price overflows.
pub fn effective_price(base_price: Decimal, discount: Option<&ShopDiscount>) -> Option<Decimal> {
    match discount {
        Some(rule) => rule.apply(base_price),
        None => Some(base_price),
    }
}

pub fn calculate(
    listing: &Listing,
    reference: Option<&MarketplaceReference>,
    discount: Option<&ShopDiscount>,
) -> ProfitBreakdown {
    let Some(effective) = effective_price(listing.base_price(), discount) else {
        warn!(listing_id = %listing.id, "Discounted price out of range");
        return ProfitBreakdown::default();
    };
    let unprofitable = ProfitBreakdown {
        effective_price: round_whole(effective),
        ..Default::default()
    };

    let usable = reference.and_then(|r| match r.price {
        Some(price) if price > Decimal::ZERO => Some((r, price)),
        _ => None,
    });
    let Some((reference, reference_price)) = usable else {
        return unprofitable;
    };

    match breakdown(effective, reference_price, reference) {
        Some(result) => result,
        None => {
            warn!(listing_id = %listing.id, asin = %reference.asin, "Profit figures out of range");
            unprofitable
        }
    }
}

fn breakdown(
    effective: Decimal,
    reference_price: Decimal,
    reference: &MarketplaceReference,
) -> Option<ProfitBreakdown> {
    let fee_rate = reference.fee_rate.unwrap_or(Decimal::ZERO);
    let fulfillment_fee = reference.fulfillment_fee.unwrap_or(Decimal::ZERO);

    let commission = reference_price
        .checked_mul(fee_rate)?
        .checked_div(Decimal::ONE_HUNDRED)?;
    let total_cost = effective
        .checked_add(fulfillment_fee)?
        .checked_add(commission)?;
    let profit = reference_price.checked_sub(total_cost)?;

    Some(ProfitBreakdown {
        effective_price: round_whole(effective),
        profit_amount: round_whole(profit),
        profit_rate: round_cents(percent_of(profit, total_cost)),
        roi: round_cents(percent_of(profit, effective)),
    })
}

fn percent_of(part: Decimal, whole: Decimal) -> Decimal {
    if whole <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    part.checked_div(whole)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

/// Rounds to an integer with halves going up, so -2.5 becomes -2.
pub fn round_whole(value: Decimal) -> Decimal {
    round_half_up(value, 0)
}

/// Rounds to two decimals with halves going up.
pub fn round_cents(value: Decimal) -> Decimal {
    round_half_up(value, 2)
}

// Halves toward positive infinity, without any intermediate arithmetic
fn round_half_up(value: Decimal, dp: u32) -> Decimal {
    let strategy = if value.is_sign_negative() {
        RoundingStrategy::MidpointTowardZero
    } else {
        RoundingStrategy::MidpointAwayFromZero
    };
    value.round_dp_with_strategy(dp, strategy)
}

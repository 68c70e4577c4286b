use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;

use crate::discount::DiscountResolver;
use crate::models::{DashboardSummary, EnrichedListing, Listing, ListingFilter, MarketplaceReference};
use crate::profit::{self, round_cents};
use crate::store::{ListingStore, ReferenceStore};
use crate::{AppError, Result};

/// Read side of the catalog: listings joined with references, discounts and
/// profit figures.
#[derive(Clone)]
pub struct CatalogReadService {
    listings: Arc<dyn ListingStore>,
    references: Arc<dyn ReferenceStore>,
    discounts: DiscountResolver,
}

impl CatalogReadService {
    pub fn new(
        listings: Arc<dyn ListingStore>,
        references: Arc<dyn ReferenceStore>,
        discounts: DiscountResolver,
    ) -> Self {
        Self {
            listings,
            references,
            discounts,
        }
    }

    pub async fn list_enriched(&self, filter: &ListingFilter) -> Result<Vec<EnrichedListing>> {
        let listings = self.listings.select_listings(filter).await?;
        self.enrich(listings).await
    }

    pub async fn get_enriched(&self, id: &str) -> Result<EnrichedListing> {
        let listing = self
            .listings
            .get_listing(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("listing {}", id)))?;

        let mut enriched = self.enrich(vec![listing]).await?;
        enriched
            .pop()
            .ok_or_else(|| AppError::Internal(format!("listing {} vanished during enrichment", id)))
    }

    pub async fn dashboard(&self) -> Result<DashboardSummary> {
        let filter = ListingFilter {
            include_hidden: true,
            ..Default::default()
        };
        let rows = self.list_enriched(&filter).await?;
        Ok(summarize(&rows))
    }

    /// One reference query and one discount lookup per distinct shop for the
    /// whole result set.
    async fn enrich(&self, listings: Vec<Listing>) -> Result<Vec<EnrichedListing>> {
        if listings.is_empty() {
            return Ok(Vec::new());
        }

        let listing_ids: Vec<String> = listings.iter().map(|l| l.id.clone()).collect();
        let links = self.references.select_links(&listing_ids).await?;

        // Links are ordered oldest first, so the newest wins if several exist
        let reference_for: HashMap<String, String> = links
            .into_iter()
            .map(|link| (link.listing_id, link.reference_id))
            .collect();

        let mut reference_ids: Vec<String> = reference_for.values().cloned().collect();
        reference_ids.sort();
        reference_ids.dedup();
        let references: HashMap<String, MarketplaceReference> = self
            .references
            .select_references(&reference_ids)
            .await?
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();

        let discounts = self
            .discounts
            .resolve_many(listings.iter().map(|l| l.shop_name.as_str()))
            .await?;

        Ok(listings
            .into_iter()
            .map(|listing| {
                let reference = reference_for
                    .get(&listing.id)
                    .and_then(|id| references.get(id))
                    .cloned();
                let breakdown = profit::calculate(
                    &listing,
                    reference.as_ref(),
                    discounts.get(&listing.shop_name),
                );
                EnrichedListing {
                    listing,
                    reference,
                    effective_price: breakdown.effective_price,
                    profit_amount: breakdown.profit_amount,
                    profit_rate: breakdown.profit_rate,
                    roi: breakdown.roi,
                }
            })
            .collect())
    }
}

pub fn summarize(rows: &[EnrichedListing]) -> DashboardSummary {
    let total = rows.len() as u64;
    let linked: Vec<&EnrichedListing> = rows.iter().filter(|r| r.is_linked()).collect();
    let linked_count = linked.len() as u64;

    let link_rate = if total > 0 {
        round_cents(Decimal::from(linked_count) / Decimal::from(total) * Decimal::ONE_HUNDRED)
    } else {
        Decimal::ZERO
    };

    let average_profit_rate = if linked_count > 0 {
        let sum = saturating_sum(linked.iter().map(|r| r.profit_rate));
        round_cents(sum / Decimal::from(linked_count))
    } else {
        Decimal::ZERO
    };

    DashboardSummary {
        total_listings: total,
        linked_listings: linked_count,
        link_rate,
        average_profit_rate,
        profitable_listings: rows.iter().filter(|r| r.is_profitable()).count() as u64,
        total_expected_profit: saturating_sum(
            rows.iter().filter(|r| r.is_profitable()).map(|r| r.profit_amount),
        ),
    }
}

fn saturating_sum(values: impl Iterator<Item = Decimal>) -> Decimal {
    values.fold(Decimal::ZERO, Decimal::saturating_add)
}

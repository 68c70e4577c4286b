use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};
use validator::Validate;

use crate::models::{
    Listing, ListingFilter, ListingReferenceLink, MAX_AMOUNT, MarketplaceReference, NewReference,
    NewShopDiscount, ShopDiscount, UpdateListing, UpdateReference, normalize_asin,
};
use crate::store::{DiscountStore, ListingStore, ReferenceStore};
use crate::{AppError, Result};

/// Direct user edits on the catalog: listing fields, copies, reference links
/// and shop discounts.
#[derive(Clone)]
pub struct CatalogManager {
    listings: Arc<dyn ListingStore>,
    references: Arc<dyn ReferenceStore>,
    discounts: Arc<dyn DiscountStore>,
}

impl CatalogManager {
    pub fn new(
        listings: Arc<dyn ListingStore>,
        references: Arc<dyn ReferenceStore>,
        discounts: Arc<dyn DiscountStore>,
    ) -> Self {
        Self {
            listings,
            references,
            discounts,
        }
    }

    async fn load_listing(&self, id: &str) -> Result<Listing> {
        self.listings
            .get_listing(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("listing {}", id)))
    }

    pub async fn update_listing(&self, id: &str, update: UpdateListing) -> Result<Listing> {
        for price in [update.price, update.sale_price].into_iter().flatten() {
            if price < Decimal::ZERO {
                return Err(AppError::Validation("Prices cannot be negative".into()));
            }
            if price > MAX_AMOUNT {
                return Err(AppError::Validation(format!(
                    "Prices cannot exceed {}",
                    MAX_AMOUNT
                )));
            }
        }

        let mut listing = self.load_listing(id).await?;
        listing.update(update);
        self.listings.update_listing(&listing).await?;

        debug!(listing_id = id, "Listing updated");
        Ok(listing)
    }

    /// Copies a listing. The copy points at the root original and is left
    /// alone by reconciliation until that original disappears.
    pub async fn copy_listing(&self, id: &str) -> Result<Listing> {
        let source = self.load_listing(id).await?;
        let copy = source.duplicate();
        self.listings.insert_listings(std::slice::from_ref(&copy)).await?;

        info!(listing_id = id, copy_id = %copy.id, "Listing copied");
        Ok(copy)
    }

    /// Deletes a listing together with its copies. Returns how many listings
    /// went. Linked references are kept.
    pub async fn delete_listing(&self, id: &str) -> Result<u64> {
        let listing = self.load_listing(id).await?;

        let mut ids = vec![listing.id.clone()];
        if !listing.is_copy() {
            let copies = self
                .listings
                .select_listings(&ListingFilter::copies_of(vec![listing.id.clone()]))
                .await?;
            ids.extend(copies.into_iter().map(|c| c.id));
        }

        let deleted = self.listings.delete_listings(&ids).await?;
        info!(listing_id = id, deleted, "Listing deleted");
        Ok(deleted)
    }

    /// Links a listing to the reference with the given ASIN, creating the
    /// reference on first use. Any previous link of the listing is replaced.
    pub async fn assign_reference(
        &self,
        listing_id: &str,
        mut request: NewReference,
    ) -> Result<MarketplaceReference> {
        request.asin = normalize_asin(&request.asin);
        request.validate()?;
        let listing = self.load_listing(listing_id).await?;

        let reference = match self.references.find_reference_by_asin(&request.asin).await? {
            Some(existing) => existing,
            None => {
                let created = MarketplaceReference::new(request);
                self.references.insert_reference(&created).await?;
                debug!(asin = %created.asin, "Reference created");
                created
            }
        };

        self.references
            .replace_link(&ListingReferenceLink::new(&listing.id, &reference.id))
            .await?;

        info!(listing_id, asin = %reference.asin, "Reference assigned");
        Ok(reference)
    }

    /// Removes the listing's link. Returns false when it had none.
    pub async fn clear_reference(&self, listing_id: &str) -> Result<bool> {
        self.load_listing(listing_id).await?;
        let removed = self.references.delete_links_for_listing(listing_id).await?;
        Ok(removed > 0)
    }

    pub async fn update_reference(
        &self,
        reference_id: &str,
        update: UpdateReference,
    ) -> Result<MarketplaceReference> {
        update.validate()?;

        let mut reference = self
            .references
            .get_reference(reference_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("reference {}", reference_id)))?;
        reference.update(update);
        self.references.update_reference(&reference).await?;

        Ok(reference)
    }

    pub async fn list_discounts(&self) -> Result<Vec<ShopDiscount>> {
        self.discounts.list_discounts().await
    }

    pub async fn upsert_discount(
        &self,
        shop_name: &str,
        request: NewShopDiscount,
    ) -> Result<ShopDiscount> {
        let mut discount = ShopDiscount::new(shop_name, request)?;
        if let Some(existing) = self.discounts.find_discount(shop_name).await? {
            discount.created_at = existing.created_at;
        }
        self.discounts.upsert_discount(&discount).await?;

        info!(
            shop_name,
            discount_type = discount.discount_type.as_str(),
            value = %discount.discount_value,
            enabled = discount.is_enabled,
            "Shop discount saved"
        );
        Ok(discount)
    }

    pub async fn delete_discount(&self, shop_name: &str) -> Result<()> {
        if self.discounts.delete_discount(shop_name).await? {
            Ok(())
        } else {
            Err(AppError::not_found(format!("discount for {}", shop_name)))
        }
    }
}

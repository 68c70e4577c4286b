//! Merges one freshly scraped batch for a shop into the persistent catalog.
//!
//! A run is: load the shop's listings, classify each scraped item as insert,
//! update or skip, delete listings that disappeared, cascade those deletions to
//! user copies, then drop duplicate identities keeping the newest listing.
//! Writes are not transactional across phases; every failed sub-operation is
//! recorded in the report and the run carries on.

use futures::stream::{self, StreamExt};
use metrics::counter;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_retry::Retry;
use tokio_retry::strategy::ExponentialBackoff;
use tracing::{debug, info, warn};
use validator::Validate;

use crate::AppError;
use crate::config::{MAX_BATCH_SIZE, ReconciliationConfig};
use crate::models::{Listing, ListingFilter, PricePatch, ScrapedItem, ShopType};
use crate::store::ListingStore;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Item {index} rejected: {reason}")]
    Validation { index: usize, reason: String },

    #[error("{operation} failed: {source}")]
    Store {
        operation: String,
        #[source]
        source: AppError,
    },

    #[error("Could not load existing listings: {0}")]
    Fatal(#[source] AppError),
}

impl ReconcileError {
    fn store(operation: impl Into<String>, source: AppError) -> Self {
        ReconcileError::Store {
            operation: operation.into(),
            source,
        }
    }
}

/// Outcome of one run. A non-empty `errors` list means partial success.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    #[serde(rename = "insertedCount")]
    pub inserted: u64,
    #[serde(rename = "updatedCount")]
    pub updated: u64,
    #[serde(rename = "deletedCount")]
    pub deleted: u64,
    #[serde(rename = "skippedCount")]
    pub skipped: u64,
    #[serde(rename = "duplicatesRemovedCount")]
    pub duplicates_removed: u64,
    pub errors: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    fn record(&mut self, error: ReconcileError) {
        warn!(error = %error, "Reconciliation step failed");
        self.errors.push(error.to_string());
    }
}

/// One shop's scraped batch for a multi-shop run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopBatch {
    pub shop_type: ShopType,
    pub shop_name: String,
    pub items: Vec<ScrapedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopReport {
    pub shop_type: ShopType,
    pub shop_name: String,
    pub report: ReconcileReport,
}

/// What a scraped batch means for the existing catalog.
#[derive(Debug, Default)]
struct Plan {
    inserts: Vec<Listing>,
    updates: Vec<(String, PricePatch)>,
    deletions: Vec<String>,
    skipped: u64,
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn ListingStore>,
    config: ReconciliationConfig,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn ListingStore>, config: ReconciliationConfig) -> Self {
        Self { store, config }
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size.clamp(1, MAX_BATCH_SIZE)
    }

    pub async fn reconcile(
        &self,
        shop_type: ShopType,
        shop_name: &str,
        items: Vec<ScrapedItem>,
    ) -> ReconcileReport {
        info!(%shop_type, shop_name, items = items.len(), "Reconciliation started");
        counter!("reconcile_runs_total").increment(1);

        let mut report = ReconcileReport::default();
        let filter = ListingFilter::for_shop(shop_type, shop_name);

        let existing = match self.fetch_with_retry(&filter).await {
            Ok(listings) => listings,
            Err(e) => {
                report.record(ReconcileError::Fatal(e));
                self.finish(shop_type, shop_name, &report);
                return report;
            }
        };

        let items = validate_items(items, &mut report);
        let plan = plan(shop_type, shop_name, existing, items);
        report.skipped = plan.skipped;
        debug!(
            inserts = plan.inserts.len(),
            updates = plan.updates.len(),
            deletions = plan.deletions.len(),
            skipped = plan.skipped,
            "Classified scraped items"
        );

        self.apply_inserts(&plan.inserts, &mut report).await;
        self.apply_updates(&plan.updates, &mut report).await;

        let deleted_ids = self.delete_chunked(&plan.deletions, "delete", &mut report).await;
        report.deleted += deleted_ids.len() as u64;

        let cascaded = self.cascade_to_copies(deleted_ids, &mut report).await;
        report.deleted += cascaded;

        self.remove_duplicates(&filter, &mut report).await;

        self.finish(shop_type, shop_name, &report);
        report
    }

    /// Reconciles several shops concurrently, at most `max_concurrent_shops` at
    /// a time. A shop listed twice only runs once; the repeat gets an error.
    pub async fn reconcile_many(&self, batches: Vec<ShopBatch>) -> Vec<ShopReport> {
        let mut scheduled = HashSet::new();
        let mut runnable = Vec::with_capacity(batches.len());
        let mut rejected = Vec::new();

        for batch in batches {
            if scheduled.insert((batch.shop_type, batch.shop_name.clone())) {
                runnable.push(batch);
            } else {
                rejected.push(ShopReport {
                    shop_type: batch.shop_type,
                    report: ReconcileReport {
                        errors: vec![format!(
                            "Shop {}/{} appears more than once in this run",
                            batch.shop_type, batch.shop_name
                        )],
                        ..Default::default()
                    },
                    shop_name: batch.shop_name,
                });
            }
        }

        let concurrency = self.config.max_concurrent_shops.max(1);
        let mut reports: Vec<ShopReport> = stream::iter(runnable.into_iter().map(|batch| async move {
            let report = self
                .reconcile(batch.shop_type, &batch.shop_name, batch.items)
                .await;
            ShopReport {
                shop_type: batch.shop_type,
                shop_name: batch.shop_name,
                report,
            }
        }))
        .buffer_unordered(concurrency)
        .collect()
        .await;

        reports.extend(rejected);
        reports
    }

    async fn fetch_with_retry(&self, filter: &ListingFilter) -> crate::Result<Vec<Listing>> {
        Retry::spawn(retry_delays(&self.config), || async {
            let result = self.store.select_listings(filter).await;
            if let Err(e) = &result {
                warn!(error = %e, "Loading existing listings failed");
            }
            result
        })
        .await
    }

    async fn apply_inserts(&self, inserts: &[Listing], report: &mut ReconcileReport) {
        for (batch_no, chunk) in inserts.chunks(self.batch_size()).enumerate() {
            match self.store.insert_listings(chunk).await {
                Ok(count) => report.inserted += count,
                Err(e) => report.record(ReconcileError::store(
                    format!("insert batch {} ({} rows)", batch_no + 1, chunk.len()),
                    e,
                )),
            }
        }
    }

    async fn apply_updates(&self, updates: &[(String, PricePatch)], report: &mut ReconcileReport) {
        for (id, patch) in updates {
            match self.store.update_listing_prices(id, patch).await {
                Ok(()) => report.updated += 1,
                Err(e) => report.record(ReconcileError::store(format!("update {}", id), e)),
            }
        }
    }

    /// Deletes `ids` in chunks and returns the ids whose chunk succeeded.
    async fn delete_chunked(
        &self,
        ids: &[String],
        label: &str,
        report: &mut ReconcileReport,
    ) -> Vec<String> {
        let mut deleted = Vec::with_capacity(ids.len());
        for (batch_no, chunk) in ids.chunks(self.batch_size()).enumerate() {
            match self.store.delete_listings(chunk).await {
                Ok(_) => deleted.extend_from_slice(chunk),
                Err(e) => report.record(ReconcileError::store(
                    format!("{} batch {} ({} ids)", label, batch_no + 1, chunk.len()),
                    e,
                )),
            }
        }
        deleted
    }

    /// Deletes copies of every id in `deleted`, repeating until no copy is
    /// left pointing at a deleted listing. Returns how many copies went.
    async fn cascade_to_copies(&self, deleted: Vec<String>, report: &mut ReconcileReport) -> u64 {
        let mut frontier = deleted;
        let mut removed = 0;

        while !frontier.is_empty() {
            let mut copy_ids = Vec::new();
            for chunk in frontier.chunks(self.batch_size()) {
                match self
                    .store
                    .select_listings(&ListingFilter::copies_of(chunk.to_vec()))
                    .await
                {
                    Ok(copies) => copy_ids.extend(copies.into_iter().map(|c| c.id)),
                    Err(e) => report.record(ReconcileError::store("load copies", e)),
                }
            }
            if copy_ids.is_empty() {
                break;
            }

            frontier = self.delete_chunked(&copy_ids, "cascade delete", report).await;
            removed += frontier.len() as u64;
        }

        if removed > 0 {
            debug!(removed, "Cascaded deletions to copies");
        }
        removed
    }

    async fn remove_duplicates(&self, filter: &ListingFilter, report: &mut ReconcileReport) {
        let listings = match self.store.select_listings(filter).await {
            Ok(listings) => listings,
            Err(e) => {
                report.record(ReconcileError::store("reload for deduplication", e));
                return;
            }
        };

        let mut by_survivor: HashMap<String, Vec<String>> = HashMap::new();
        for (duplicate, survivor) in find_duplicates(listings) {
            by_survivor.entry(survivor).or_default().push(duplicate);
        }
        if by_survivor.is_empty() {
            return;
        }

        let mut removable = Vec::new();
        for (survivor, duplicates) in by_survivor {
            match self.store.reassign_lineage(&duplicates, &survivor).await {
                Ok(_) => removable.extend(duplicates),
                // Keep duplicates whose copies could not be repointed
                Err(e) => report.record(ReconcileError::store(
                    format!("repoint copies to {}", survivor),
                    e,
                )),
            }
        }

        let removed = self.delete_chunked(&removable, "duplicate delete", report).await;
        report.duplicates_removed += removed.len() as u64;
    }

    fn finish(&self, shop_type: ShopType, shop_name: &str, report: &ReconcileReport) {
        counter!("reconcile_rows_total", "op" => "inserted").increment(report.inserted);
        counter!("reconcile_rows_total", "op" => "updated").increment(report.updated);
        counter!("reconcile_rows_total", "op" => "deleted").increment(report.deleted);
        counter!("reconcile_rows_total", "op" => "skipped").increment(report.skipped);
        counter!("reconcile_rows_total", "op" => "duplicate").increment(report.duplicates_removed);
        counter!("reconcile_errors_total").increment(report.errors.len() as u64);

        info!(
            %shop_type,
            shop_name,
            inserted = report.inserted,
            updated = report.updated,
            deleted = report.deleted,
            skipped = report.skipped,
            duplicates_removed = report.duplicates_removed,
            errors = report.errors.len(),
            "Reconciliation finished"
        );
    }
}

fn validate_items(items: Vec<ScrapedItem>, report: &mut ReconcileReport) -> Vec<ScrapedItem> {
    items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match item.validate() {
            Ok(()) => Some(item),
            Err(e) => {
                report.record(ReconcileError::Validation {
                    index,
                    reason: format!("invalid name {:?} ({})", item.name, e),
                });
                None
            }
        })
        .collect()
}

fn newest_first(listings: &mut [Listing]) {
    listings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

fn plan(shop_type: ShopType, shop_name: &str, mut existing: Vec<Listing>, items: Vec<ScrapedItem>) -> Plan {
    newest_first(&mut existing);

    // Copies never take part in matching; among pre-existing duplicates the
    // newest listing is the one that gets matched.
    let mut by_key: HashMap<String, &Listing> = HashMap::new();
    for listing in existing.iter().filter(|l| !l.is_copy()) {
        by_key.entry(listing.identity_key()).or_insert(listing);
    }

    let scraped_keys: HashSet<String> = items.iter().map(ScrapedItem::identity_key).collect();
    let mut plan = Plan::default();

    for item in items {
        match by_key.get(&item.identity_key()) {
            Some(current) if item.differs_from(current) => {
                plan.updates.push((current.id.clone(), item.price_patch()));
            }
            Some(_) => plan.skipped += 1,
            None => plan.inserts.push(item.into_listing(shop_type, shop_name)),
        }
    }

    plan.deletions = existing
        .iter()
        .filter(|l| !l.is_copy() && !scraped_keys.contains(&l.identity_key()))
        .map(|l| l.id.clone())
        .collect();

    plan
}

/// Pairs of (duplicate id, surviving id). The newest non-copy listing of each
/// identity survives.
fn find_duplicates(mut listings: Vec<Listing>) -> Vec<(String, String)> {
    newest_first(&mut listings);

    let mut seen: HashMap<String, String> = HashMap::new();
    let mut duplicates = Vec::new();
    for listing in listings.into_iter().filter(|l| !l.is_copy()) {
        match seen.get(&listing.identity_key()) {
            Some(survivor) => duplicates.push((listing.id, survivor.clone())),
            None => {
                seen.insert(listing.identity_key(), listing.id);
            }
        }
    }
    duplicates
}

/// Waits between fetch attempts: the configured delay, then doubling up to
/// `MAX_RETRY_DELAY`.
fn retry_delays(config: &ReconciliationConfig) -> impl Iterator<Item = Duration> {
    // `ExponentialBackoff` starts at base * factor, so halve to start at the factor
    ExponentialBackoff::from_millis(2)
        .factor(config.fetch_retry_delay_ms.max(1))
        .map(|delay| (delay / 2).min(MAX_RETRY_DELAY))
        .take(config.fetch_retry_attempts)
}

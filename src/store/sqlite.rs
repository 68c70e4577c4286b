use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::models::{
    DiscountType, Listing, ListingFilter, ListingReferenceLink, MarketplaceReference, PricePatch,
    ShopDiscount, ShopType,
};
use crate::store::{DiscountStore, ListingStore, ReferenceStore};
use crate::{AppError, Result};

/// SQLite backed implementation of every catalog store trait.
#[derive(Clone)]
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let in_memory = config.url.contains(":memory:");
        if !in_memory {
            ensure_parent_dir(&config.url).await?;
        }

        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true);

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout));

        // Each in-memory connection opens its own database, so keep exactly one alive
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;

        info!(url = %config.url, in_memory, "Connected to catalog database");
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        debug!("Catalog migrations applied");
        Ok(())
    }

    async fn fetch_listings(
        &self,
        filter: &ListingFilter,
        original_ids: Option<&[String]>,
    ) -> Result<Vec<Listing>> {
        let mut builder: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT * FROM listings WHERE 1 = 1");

        if let Some(shop_type) = filter.shop_type {
            builder.push(" AND shop_type = ").push_bind(shop_type.as_str());
        }
        if let Some(shop_name) = &filter.shop_name {
            builder.push(" AND shop_name = ").push_bind(shop_name.as_str());
        }
        if let Some(original_ids) = original_ids {
            builder.push(" AND original_id IN ");
            push_id_list(&mut builder, original_ids);
        }
        if !filter.include_hidden {
            builder.push(" AND is_hidden = 0");
        }
        if filter.favorites_only {
            builder.push(" AND is_favorite = 1");
        }
        builder.push(" ORDER BY created_at DESC, id");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(listing_from_row).collect()
    }
}

/// Creates the directory holding a file database.
async fn ensure_parent_dir(url: &str) -> Result<()> {
    let path = url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

fn decimal_column(row: &SqliteRow, column: &str) -> Result<Option<Decimal>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|value| Decimal::from_str(&value).map_err(|e| AppError::decode(column, e)))
        .transpose()
}

fn decimal_text(value: Option<Decimal>) -> Option<String> {
    value.map(|v| v.to_string())
}

fn listing_from_row(row: &SqliteRow) -> Result<Listing> {
    let shop_type: String = row.try_get("shop_type")?;
    let shop_type =
        ShopType::from_str(&shop_type).map_err(|e| AppError::decode("shop_type", e))?;

    Ok(Listing {
        id: row.try_get("id")?,
        shop_type,
        shop_name: row.try_get("shop_name")?,
        name: row.try_get("name")?,
        price: decimal_column(row, "price")?,
        sale_price: decimal_column(row, "sale_price")?,
        image_url: row.try_get("image_url")?,
        source_url: row.try_get("source_url")?,
        is_hidden: row.try_get("is_hidden")?,
        is_favorite: row.try_get("is_favorite")?,
        memo: row.try_get("memo")?,
        original_id: row.try_get("original_id")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn reference_from_row(row: &SqliteRow) -> Result<MarketplaceReference> {
    Ok(MarketplaceReference {
        id: row.try_get("id")?,
        asin: row.try_get("asin")?,
        name: row.try_get("name")?,
        price: decimal_column(row, "price")?,
        monthly_sales: row.try_get("monthly_sales")?,
        fee_rate: decimal_column(row, "fee_rate")?,
        fulfillment_fee: decimal_column(row, "fulfillment_fee")?,
        jan_code: row.try_get("jan_code")?,
        available_on_marketplace: row.try_get("available_on_marketplace")?,
        available_on_official_site: row.try_get("available_on_official_site")?,
        complaint_count: row.try_get("complaint_count")?,
        is_hazardous: row.try_get("is_hazardous")?,
        has_brand_restriction: row.try_get("has_brand_restriction")?,
        memo: row.try_get("memo")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn discount_from_row(row: &SqliteRow) -> Result<ShopDiscount> {
    let discount_type: String = row.try_get("discount_type")?;
    let discount_type = DiscountType::from_str(&discount_type)
        .map_err(|e| AppError::decode("discount_type", e))?;
    let discount_value = decimal_column(row, "discount_value")?
        .ok_or_else(|| AppError::decode("discount_value", "missing value"))?;

    Ok(ShopDiscount {
        shop_name: row.try_get("shop_name")?,
        discount_type,
        discount_value,
        is_enabled: row.try_get("is_enabled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// SQLite caps bound variables per statement, so id lists go out in chunks.
const IDS_PER_STATEMENT: usize = 500;

fn push_id_list<'a>(builder: &mut QueryBuilder<'a, Sqlite>, ids: &'a [String]) {
    builder.push("(");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id.as_str());
    }
    separated.push_unseparated(")");
}

#[async_trait]
impl ListingStore for SqliteCatalogStore {
    async fn select_listings(&self, filter: &ListingFilter) -> Result<Vec<Listing>> {
        let Some(original_ids) = &filter.original_ids else {
            return self.fetch_listings(filter, None).await;
        };

        let mut listings = Vec::new();
        for chunk in original_ids.chunks(IDS_PER_STATEMENT) {
            listings.extend(self.fetch_listings(filter, Some(chunk)).await?);
        }
        if original_ids.len() > IDS_PER_STATEMENT {
            listings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        }
        Ok(listings)
    }

    async fn get_listing(&self, id: &str) -> Result<Option<Listing>> {
        let row = sqlx::query("SELECT * FROM listings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(listing_from_row).transpose()
    }

    async fn insert_listings(&self, listings: &[Listing]) -> Result<u64> {
        if listings.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for listing in listings {
            let result = sqlx::query(
                r#"
                INSERT INTO listings
                    (id, shop_type, shop_name, name, price, sale_price, image_url, source_url,
                     is_hidden, is_favorite, memo, original_id, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&listing.id)
            .bind(listing.shop_type.as_str())
            .bind(&listing.shop_name)
            .bind(&listing.name)
            .bind(decimal_text(listing.price))
            .bind(decimal_text(listing.sale_price))
            .bind(&listing.image_url)
            .bind(&listing.source_url)
            .bind(listing.is_hidden)
            .bind(listing.is_favorite)
            .bind(&listing.memo)
            .bind(&listing.original_id)
            .bind(listing.created_at)
            .bind(listing.updated_at)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected();
        }
        tx.commit().await?;

        Ok(inserted)
    }

    async fn update_listing_prices(&self, id: &str, patch: &PricePatch) -> Result<()> {
        let result = sqlx::query(
            "UPDATE listings SET price = ?, sale_price = ?, image_url = ?, updated_at = ? WHERE id = ?",
        )
        .bind(decimal_text(patch.price))
        .bind(decimal_text(patch.sale_price))
        .bind(&patch.image_url)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("listing {}", id)));
        }
        Ok(())
    }

    async fn update_listing(&self, listing: &Listing) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE listings
            SET price = ?, sale_price = ?, image_url = ?, is_hidden = ?, is_favorite = ?,
                memo = ?, original_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(decimal_text(listing.price))
        .bind(decimal_text(listing.sale_price))
        .bind(&listing.image_url)
        .bind(listing.is_hidden)
        .bind(listing.is_favorite)
        .bind(&listing.memo)
        .bind(&listing.original_id)
        .bind(listing.updated_at)
        .bind(&listing.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("listing {}", listing.id)));
        }
        Ok(())
    }

    async fn reassign_lineage(&self, from_ids: &[String], to_id: &str) -> Result<u64> {
        if from_ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut moved = 0;
        for chunk in from_ids.chunks(IDS_PER_STATEMENT) {
            let mut builder: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("UPDATE listings SET original_id = ");
            builder.push_bind(to_id);
            builder.push(" WHERE original_id IN ");
            push_id_list(&mut builder, chunk);
            moved += builder.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(moved)
    }

    async fn delete_listings(&self, ids: &[String]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;
        for chunk in ids.chunks(IDS_PER_STATEMENT) {
            let mut links: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("DELETE FROM listing_references WHERE listing_id IN ");
            push_id_list(&mut links, chunk);
            links.build().execute(&mut *tx).await?;

            let mut listings: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("DELETE FROM listings WHERE id IN ");
            push_id_list(&mut listings, chunk);
            deleted += listings.build().execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        Ok(deleted)
    }
}

#[async_trait]
impl ReferenceStore for SqliteCatalogStore {
    async fn get_reference(&self, id: &str) -> Result<Option<MarketplaceReference>> {
        let row = sqlx::query("SELECT * FROM marketplace_references WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(reference_from_row).transpose()
    }

    async fn find_reference_by_asin(&self, asin: &str) -> Result<Option<MarketplaceReference>> {
        let row = sqlx::query("SELECT * FROM marketplace_references WHERE asin = ?")
            .bind(asin)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(reference_from_row).transpose()
    }

    async fn select_references(&self, ids: &[String]) -> Result<Vec<MarketplaceReference>> {
        let mut references = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(IDS_PER_STATEMENT) {
            let mut builder: QueryBuilder<'_, Sqlite> =
                QueryBuilder::new("SELECT * FROM marketplace_references WHERE id IN ");
            push_id_list(&mut builder, chunk);

            let rows = builder.build().fetch_all(&self.pool).await?;
            for row in &rows {
                references.push(reference_from_row(row)?);
            }
        }
        Ok(references)
    }

    async fn insert_reference(&self, reference: &MarketplaceReference) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO marketplace_references
                (id, asin, name, price, monthly_sales, fee_rate, fulfillment_fee, jan_code,
                 available_on_marketplace, available_on_official_site, complaint_count,
                 is_hazardous, has_brand_restriction, memo, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&reference.id)
        .bind(&reference.asin)
        .bind(&reference.name)
        .bind(decimal_text(reference.price))
        .bind(reference.monthly_sales)
        .bind(decimal_text(reference.fee_rate))
        .bind(decimal_text(reference.fulfillment_fee))
        .bind(&reference.jan_code)
        .bind(reference.available_on_marketplace)
        .bind(reference.available_on_official_site)
        .bind(reference.complaint_count)
        .bind(reference.is_hazardous)
        .bind(reference.has_brand_restriction)
        .bind(&reference.memo)
        .bind(reference.created_at)
        .bind(reference.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_reference(&self, reference: &MarketplaceReference) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE marketplace_references
            SET name = ?, price = ?, monthly_sales = ?, fee_rate = ?, fulfillment_fee = ?,
                jan_code = ?, available_on_marketplace = ?, available_on_official_site = ?,
                complaint_count = ?, is_hazardous = ?, has_brand_restriction = ?, memo = ?,
                updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&reference.name)
        .bind(decimal_text(reference.price))
        .bind(reference.monthly_sales)
        .bind(decimal_text(reference.fee_rate))
        .bind(decimal_text(reference.fulfillment_fee))
        .bind(&reference.jan_code)
        .bind(reference.available_on_marketplace)
        .bind(reference.available_on_official_site)
        .bind(reference.complaint_count)
        .bind(reference.is_hazardous)
        .bind(reference.has_brand_restriction)
        .bind(&reference.memo)
        .bind(reference.updated_at)
        .bind(&reference.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("reference {}", reference.id)));
        }
        Ok(())
    }

    async fn select_links(&self, listing_ids: &[String]) -> Result<Vec<ListingReferenceLink>> {
        let mut links = Vec::new();
        for chunk in listing_ids.chunks(IDS_PER_STATEMENT) {
            let mut builder: QueryBuilder<'_, Sqlite> = QueryBuilder::new(
                "SELECT listing_id, reference_id, created_at FROM listing_references WHERE listing_id IN ",
            );
            push_id_list(&mut builder, chunk);
            builder.push(" ORDER BY created_at");

            links.extend(
                builder
                    .build_query_as::<ListingReferenceLink>()
                    .fetch_all(&self.pool)
                    .await?,
            );
        }
        if listing_ids.len() > IDS_PER_STATEMENT {
            links.sort_by_key(|link| link.created_at);
        }
        Ok(links)
    }

    async fn replace_link(&self, link: &ListingReferenceLink) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM listing_references WHERE listing_id = ?")
            .bind(&link.listing_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO listing_references (listing_id, reference_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(&link.listing_id)
        .bind(&link.reference_id)
        .bind(link.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn delete_links_for_listing(&self, listing_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM listing_references WHERE listing_id = ?")
            .bind(listing_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DiscountStore for SqliteCatalogStore {
    async fn find_discount(&self, shop_name: &str) -> Result<Option<ShopDiscount>> {
        let row = sqlx::query("SELECT * FROM shop_discounts WHERE shop_name = ?")
            .bind(shop_name)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(discount_from_row).transpose()
    }

    async fn list_discounts(&self) -> Result<Vec<ShopDiscount>> {
        let rows = sqlx::query("SELECT * FROM shop_discounts ORDER BY shop_name")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(discount_from_row).collect()
    }

    async fn upsert_discount(&self, discount: &ShopDiscount) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO shop_discounts
                (shop_name, discount_type, discount_value, is_enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (shop_name) DO UPDATE SET
                discount_type = excluded.discount_type,
                discount_value = excluded.discount_value,
                is_enabled = excluded.is_enabled,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&discount.shop_name)
        .bind(discount.discount_type.as_str())
        .bind(discount.discount_value.to_string())
        .bind(discount.is_enabled)
        .bind(discount.created_at)
        .bind(discount.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_discount(&self, shop_name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM shop_discounts WHERE shop_name = ?")
            .bind(shop_name)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

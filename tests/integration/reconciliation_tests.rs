use chrono::{Duration, Utc};
use resale_catalog::{
    ShopType,
    models::UpdateListing,
    reconciler::ShopBatch,
    store::ListingStore,
};
use rust_decimal::Decimal;

use super::*;

const SHOP: &str = "Kitchen Store";

#[tokio::test]
async fn test_second_run_with_same_batch_is_all_skipped() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    let items = vec![scraped("kettle", 3000), scraped("toaster", 5000), scraped("mixer", 2000)];

    let first = state.engine.reconcile(ShopType::Rakuten, SHOP, items.clone()).await;
    assert_eq!(first.inserted, 3);
    assert!(first.is_clean(), "unexpected errors: {:?}", first.errors);

    let second = state.engine.reconcile(ShopType::Rakuten, SHOP, items).await;
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 0);
    assert_eq!(second.deleted, 0);
    assert_eq!(second.skipped, 3);

    assert_eq!(shop_listings(&store, ShopType::Rakuten, SHOP).await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_price_change_updates_scraped_fields_only() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    state
        .engine
        .reconcile(ShopType::Yahoo, SHOP, vec![scraped("kettle", 3000)])
        .await;

    let listing = shop_listings(&store, ShopType::Yahoo, SHOP).await?.remove(0);
    state
        .manager
        .update_listing(
            &listing.id,
            UpdateListing {
                memo: Some("check coupon".to_string()),
                is_favorite: Some(true),
                ..Default::default()
            },
        )
        .await?;

    let mut repriced = scraped("kettle", 2800);
    repriced.sale_price = Some(Decimal::from(2500));
    let report = state.engine.reconcile(ShopType::Yahoo, SHOP, vec![repriced]).await;
    assert_eq!(report.updated, 1);
    assert_eq!(report.skipped, 0);

    let after = store.get_listing(&listing.id).await?.expect("listing kept");
    assert_eq!(after.price, Some(Decimal::from(2800)));
    assert_eq!(after.sale_price, Some(Decimal::from(2500)));
    assert_eq!(after.memo.as_deref(), Some("check coupon"));
    assert!(after.is_favorite);
    Ok(())
}

#[tokio::test]
async fn test_zero_price_is_distinct_from_missing_price() -> anyhow::Result<()> {
    let (state, _store) = create_test_app_state().await?;
    let mut unpriced = scraped("sample", 0);
    unpriced.price = None;

    state
        .engine
        .reconcile(ShopType::Official, SHOP, vec![unpriced])
        .await;

    let free = scraped("sample", 0);
    let report = state.engine.reconcile(ShopType::Official, SHOP, vec![free.clone()]).await;
    assert_eq!(report.updated, 1);

    let report = state.engine.reconcile(ShopType::Official, SHOP, vec![free]).await;
    assert_eq!(report.skipped, 1);
    assert_eq!(report.updated, 0);
    Ok(())
}

#[tokio::test]
async fn test_vanished_listing_is_deleted_with_its_copies() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    state
        .engine
        .reconcile(
            ShopType::Rakuten,
            SHOP,
            vec![scraped("kettle", 3000), scraped("toaster", 5000)],
        )
        .await;

    let kettle = shop_listings(&store, ShopType::Rakuten, SHOP)
        .await?
        .into_iter()
        .find(|l| l.name == "kettle")
        .expect("kettle inserted");
    let copy = state.manager.copy_listing(&kettle.id).await?;
    // A copy of a copy still points at the root
    let nested = state.manager.copy_listing(&copy.id).await?;
    assert_eq!(nested.original_id.as_deref(), Some(kettle.id.as_str()));

    let report = state
        .engine
        .reconcile(ShopType::Rakuten, SHOP, vec![scraped("toaster", 5000)])
        .await;
    assert_eq!(report.deleted, 3);
    assert_eq!(report.skipped, 1);

    let remaining = shop_listings(&store, ShopType::Rakuten, SHOP).await?;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "toaster");
    Ok(())
}

#[tokio::test]
async fn test_copies_are_untouched_while_original_is_scraped() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    state
        .engine
        .reconcile(ShopType::Rakuten, SHOP, vec![scraped("kettle", 3000)])
        .await;

    let original = shop_listings(&store, ShopType::Rakuten, SHOP).await?.remove(0);
    let copy = state.manager.copy_listing(&original.id).await?;
    state
        .manager
        .update_listing(
            &copy.id,
            UpdateListing {
                price: Some(Decimal::from(2700)),
                ..Default::default()
            },
        )
        .await?;

    let report = state
        .engine
        .reconcile(ShopType::Rakuten, SHOP, vec![scraped("kettle", 3200)])
        .await;
    assert_eq!(report.updated, 1);
    assert_eq!(report.inserted, 0);
    assert_eq!(report.deleted, 0);
    assert_eq!(report.duplicates_removed, 0);

    let copy_after = store.get_listing(&copy.id).await?.expect("copy kept");
    assert_eq!(copy_after.price, Some(Decimal::from(2700)));
    let original_after = store.get_listing(&original.id).await?.expect("original kept");
    assert_eq!(original_after.price, Some(Decimal::from(3200)));
    Ok(())
}

#[tokio::test]
async fn test_duplicates_collapse_to_newest_and_copies_follow() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;

    let mut older = scraped("kettle", 3000).into_listing(ShopType::Rakuten, SHOP);
    older.created_at = Utc::now() - Duration::hours(2);
    let mut newer = scraped("kettle", 3000).into_listing(ShopType::Rakuten, SHOP);
    newer.created_at = Utc::now() - Duration::hours(1);
    let copy_of_older = older.duplicate();
    store
        .insert_listings(&[older.clone(), newer.clone(), copy_of_older.clone()])
        .await?;

    let report = state
        .engine
        .reconcile(ShopType::Rakuten, SHOP, vec![scraped("kettle", 3000)])
        .await;
    assert_eq!(report.skipped, 1);
    assert_eq!(report.duplicates_removed, 1);
    assert_eq!(report.deleted, 0);
    assert!(report.is_clean(), "unexpected errors: {:?}", report.errors);

    assert!(store.get_listing(&older.id).await?.is_none());
    assert!(store.get_listing(&newer.id).await?.is_some());
    let copy_after = store
        .get_listing(&copy_of_older.id)
        .await?
        .expect("copy survives deduplication");
    assert_eq!(copy_after.original_id.as_deref(), Some(newer.id.as_str()));
    Ok(())
}

#[tokio::test]
async fn test_repeated_items_in_one_batch_end_as_one_listing() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;

    let report = state
        .engine
        .reconcile(
            ShopType::Yahoo,
            SHOP,
            vec![scraped("kettle", 3000), scraped("kettle", 3000)],
        )
        .await;
    assert_eq!(report.inserted, 2);
    assert_eq!(report.duplicates_removed, 1);

    assert_eq!(shop_listings(&store, ShopType::Yahoo, SHOP).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_deletions_span_several_chunks() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    let items: Vec<_> = (0..5).map(|i| scraped(&format!("item-{}", i), 1000 + i)).collect();
    state.engine.reconcile(ShopType::Official, SHOP, items).await;

    // Chunk size is 2 in the test config, so five ids take three delete calls
    let report = state.engine.reconcile(ShopType::Official, SHOP, Vec::new()).await;
    assert_eq!(report.deleted, 5);
    assert!(shop_listings(&store, ShopType::Official, SHOP).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_blank_names_are_reported_and_skipped() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    let mut blank = scraped("placeholder", 100);
    blank.name = "   ".to_string();

    let report = state
        .engine
        .reconcile(ShopType::Rakuten, SHOP, vec![blank, scraped("kettle", 3000)])
        .await;
    assert_eq!(report.inserted, 1);
    assert_eq!(report.errors.len(), 1);

    assert_eq!(shop_listings(&store, ShopType::Rakuten, SHOP).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_shops_are_reconciled_independently() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    state
        .engine
        .reconcile(ShopType::Rakuten, SHOP, vec![scraped("kettle", 3000)])
        .await;

    let reports = state
        .engine
        .reconcile_many(vec![
            ShopBatch {
                shop_type: ShopType::Yahoo,
                shop_name: SHOP.to_string(),
                items: vec![scraped("kettle", 2900)],
            },
            ShopBatch {
                shop_type: ShopType::Rakuten,
                shop_name: "Camera Store".to_string(),
                items: vec![scraped("lens", 45000)],
            },
        ])
        .await;
    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.report.inserted == 1 && r.report.deleted == 0));

    // The same name on another storefront is a different shop
    assert_eq!(shop_listings(&store, ShopType::Rakuten, SHOP).await?.len(), 1);
    assert_eq!(shop_listings(&store, ShopType::Yahoo, SHOP).await?.len(), 1);
    Ok(())
}

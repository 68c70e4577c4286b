use resale_catalog::{
    AppError, ShopType,
    models::{DiscountType, NewReference, NewShopDiscount, UpdateReference},
    store::{ListingStore, ReferenceStore},
    web::AppState,
};
use rust_decimal_macros::dec;

use super::*;

const SHOP: &str = "Kitchen Store";

fn reference_request(asin: &str) -> NewReference {
    NewReference {
        asin: asin.to_string(),
        name: Some("Electric Kettle 1.2L".to_string()),
        price: Some(dec!(2000)),
        fee_rate: Some(dec!(10)),
        fulfillment_fee: Some(dec!(300)),
        ..Default::default()
    }
}

fn ten_percent_off(is_enabled: bool) -> NewShopDiscount {
    NewShopDiscount {
        discount_type: DiscountType::Percentage,
        discount_value: dec!(10),
        is_enabled: Some(is_enabled),
    }
}

/// Reconciles two listings into the shop and returns their ids, kettle first.
async fn seed_shop(state: &AppState, store: &SqliteCatalogStore) -> anyhow::Result<(String, String)> {
    state
        .engine
        .reconcile(
            ShopType::Rakuten,
            SHOP,
            vec![scraped("kettle", 1000), scraped("toaster", 3000)],
        )
        .await;

    let listings = shop_listings(store, ShopType::Rakuten, SHOP).await?;
    let id_of = |name: &str| {
        listings
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.id.clone())
            .ok_or_else(|| anyhow::anyhow!("{} missing", name))
    };
    Ok((id_of("kettle")?, id_of("toaster")?))
}

#[tokio::test]
async fn test_enriched_listing_applies_discount_and_reference() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    let (kettle, _) = seed_shop(&state, &store).await?;

    state.manager.upsert_discount(SHOP, ten_percent_off(true)).await?;
    let reference = state
        .manager
        .assign_reference(&kettle, reference_request(" b0kettle12 "))
        .await?;
    assert_eq!(reference.asin, "B0KETTLE12");

    let row = state.catalog.get_enriched(&kettle).await?;
    assert_eq!(row.reference.as_ref().map(|r| r.id.as_str()), Some(reference.id.as_str()));
    assert_eq!(row.effective_price, dec!(900));
    assert_eq!(row.profit_amount, dec!(600));
    assert_eq!(row.profit_rate, dec!(42.86));
    assert_eq!(row.roi, dec!(66.67));
    Ok(())
}

#[tokio::test]
async fn test_disabled_discount_leaves_price_alone() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    let (kettle, _) = seed_shop(&state, &store).await?;

    state.manager.upsert_discount(SHOP, ten_percent_off(false)).await?;
    state
        .manager
        .assign_reference(&kettle, reference_request("B0KETTLE12"))
        .await?;

    let row = state.catalog.get_enriched(&kettle).await?;
    assert_eq!(row.effective_price, dec!(1000));
    assert_eq!(row.profit_amount, dec!(500));
    assert_eq!(row.profit_rate, dec!(33.33));
    assert_eq!(row.roi, dec!(50));
    Ok(())
}

#[tokio::test]
async fn test_listings_sharing_an_asin_share_one_reference() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    let (kettle, toaster) = seed_shop(&state, &store).await?;

    let first = state
        .manager
        .assign_reference(&kettle, reference_request("B0SHARED01"))
        .await?;
    let second = state
        .manager
        .assign_reference(&toaster, reference_request("b0shared01"))
        .await?;
    assert_eq!(first.id, second.id);

    state
        .manager
        .update_reference(
            &first.id,
            UpdateReference {
                price: Some(dec!(4000)),
                ..Default::default()
            },
        )
        .await?;

    let rows = state
        .catalog
        .list_enriched(&resale_catalog::models::ListingFilter::for_shop(ShopType::Rakuten, SHOP))
        .await?;
    assert_eq!(rows.len(), 2);
    assert!(rows
        .iter()
        .all(|r| r.reference.as_ref().and_then(|x| x.price) == Some(dec!(4000))));
    Ok(())
}

#[tokio::test]
async fn test_reassigning_replaces_the_previous_link() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    let (kettle, _) = seed_shop(&state, &store).await?;

    state
        .manager
        .assign_reference(&kettle, reference_request("B0OLDCODE1"))
        .await?;
    let newer = state
        .manager
        .assign_reference(&kettle, reference_request("B0NEWCODE1"))
        .await?;

    let links = store.select_links(std::slice::from_ref(&kettle)).await?;
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].reference_id, newer.id);
    Ok(())
}

#[tokio::test]
async fn test_deleting_a_listing_keeps_its_reference() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    let (kettle, _) = seed_shop(&state, &store).await?;
    let reference = state
        .manager
        .assign_reference(&kettle, reference_request("B0KETTLE12"))
        .await?;
    state.manager.copy_listing(&kettle).await?;

    // Deleting an original takes its copies along
    assert_eq!(state.manager.delete_listing(&kettle).await?, 2);

    assert!(store.get_reference(&reference.id).await?.is_some());
    assert!(store.select_links(std::slice::from_ref(&kettle)).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_clear_reference_reports_whether_a_link_existed() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    let (kettle, _) = seed_shop(&state, &store).await?;
    state
        .manager
        .assign_reference(&kettle, reference_request("B0KETTLE12"))
        .await?;

    assert!(state.manager.clear_reference(&kettle).await?);
    assert!(!state.manager.clear_reference(&kettle).await?);

    let row = state.catalog.get_enriched(&kettle).await?;
    assert!(row.reference.is_none());
    assert_eq!(row.profit_amount, dec!(0));
    Ok(())
}

#[tokio::test]
async fn test_invalid_asin_is_rejected() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    let (kettle, _) = seed_shop(&state, &store).await?;

    let result = state
        .manager
        .assign_reference(&kettle, reference_request("NOT-AN-ASIN"))
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
    Ok(())
}

#[tokio::test]
async fn test_dashboard_counts_linked_and_profitable_listings() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    let (kettle, toaster) = seed_shop(&state, &store).await?;
    state.manager.upsert_discount(SHOP, ten_percent_off(true)).await?;
    state
        .manager
        .assign_reference(&kettle, reference_request("B0KETTLE12"))
        .await?;
    // Hidden listings still count
    state
        .manager
        .update_listing(
            &toaster,
            resale_catalog::models::UpdateListing {
                is_hidden: Some(true),
                ..Default::default()
            },
        )
        .await?;

    let summary = state.catalog.dashboard().await?;
    assert_eq!(summary.total_listings, 2);
    assert_eq!(summary.linked_listings, 1);
    assert_eq!(summary.link_rate, dec!(50));
    assert_eq!(summary.average_profit_rate, dec!(42.86));
    assert_eq!(summary.profitable_listings, 1);
    assert_eq!(summary.total_expected_profit, dec!(600));
    Ok(())
}

#[tokio::test]
async fn test_dashboard_over_a_very_large_catalog() -> anyhow::Result<()> {
    let (state, store) = create_test_app_state().await?;
    let listings: Vec<_> = (0..33_000)
        .map(|i| scraped(&format!("item-{}", i), 1000).into_listing(ShopType::Official, SHOP))
        .collect();
    store.insert_listings(&listings).await?;

    let linked = &listings[32_999].id;
    state
        .manager
        .assign_reference(linked, reference_request("B0KETTLE12"))
        .await?;

    let summary = state.catalog.dashboard().await?;
    assert_eq!(summary.total_listings, 33_000);
    assert_eq!(summary.linked_listings, 1);
    assert_eq!(summary.profitable_listings, 1);
    assert_eq!(summary.total_expected_profit, dec!(500));
    Ok(())
}

#[tokio::test]
async fn test_discount_upsert_and_delete() -> anyhow::Result<()> {
    let (state, _store) = create_test_app_state().await?;

    let created = state.manager.upsert_discount(SHOP, ten_percent_off(true)).await?;
    let replaced = state
        .manager
        .upsert_discount(
            SHOP,
            NewShopDiscount {
                discount_type: DiscountType::Fixed,
                discount_value: dec!(150),
                is_enabled: None,
            },
        )
        .await?;
    assert_eq!(replaced.created_at, created.created_at);

    let all = state.manager.list_discounts().await?;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].discount_type, DiscountType::Fixed);

    state.manager.delete_discount(SHOP).await?;
    let missing = state.manager.delete_discount(SHOP).await;
    assert!(matches!(missing, Err(AppError::NotFound { .. })));
    Ok(())
}

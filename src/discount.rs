use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::Result;
use crate::models::ShopDiscount;
use crate::store::DiscountStore;

/// Looks up the active discount rule for a shop name.
#[derive(Clone)]
pub struct DiscountResolver {
    store: Arc<dyn DiscountStore>,
}

impl DiscountResolver {
    pub fn new(store: Arc<dyn DiscountStore>) -> Self {
        Self { store }
    }

    /// The enabled rule for `shop_name`. Missing and disabled rules both
    /// resolve to `None`.
    pub async fn resolve(&self, shop_name: &str) -> Result<Option<ShopDiscount>> {
        let discount = self.store.find_discount(shop_name).await?;
        Ok(discount.filter(|rule| rule.is_enabled))
    }

    /// Resolves each distinct name once. Shops without an active rule are
    /// absent from the map.
    pub async fn resolve_many<'a, I>(&self, shop_names: I) -> Result<HashMap<String, ShopDiscount>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct: BTreeSet<&str> = shop_names.into_iter().collect();

        let mut resolved = HashMap::with_capacity(distinct.len());
        for shop_name in distinct {
            if let Some(rule) = self.resolve(shop_name).await? {
                resolved.insert(shop_name.to_string(), rule);
            }
        }
        Ok(resolved)
    }
}

//! Cart service
//!
//! Loads a user's cart snapshot, applies one change and stores the result
//! only if nobody else wrote the cart in between; otherwise starts over.

use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::aggregates::{Cart, CartError, CartItem};
use crate::domain::services::discount::DiscountService;
use crate::domain::value_objects::Quantity;
use crate::store::{CartStore, ProductStore};
use crate::ShopError;

/// Attempts before a contended change gives up with `CartError::Conflict`.
const MAX_ATTEMPTS: usize = 5;

#[derive(Clone, Debug, Deserialize)]
pub struct AddToCart {
    pub product_id: Uuid,
    pub variant_id: Uuid,
    pub option_id: Uuid,
    pub quantity: u32,
}

#[derive(Clone)]
pub struct CartService {
    carts: Arc<dyn CartStore>,
    products: Arc<dyn ProductStore>,
    discounts: DiscountService,
}

impl CartService {
    pub fn new(carts: Arc<dyn CartStore>, products: Arc<dyn ProductStore>, discounts: DiscountService) -> Self {
        Self { carts, products, discounts }
    }

    /// A user without a stored cart has an empty one.
    pub async fn cart(&self, user_id: Uuid) -> Result<Cart, ShopError> {
        Ok(self.carts.load(user_id).await?.unwrap_or_else(|| Cart::empty(user_id)))
    }

    /// Prices the selected storage option with whatever discount is active now.
    pub async fn add(&self, user_id: Uuid, req: AddToCart) -> Result<Cart, ShopError> {
        let product = self.products.get(req.product_id).await?.ok_or(CartError::UnknownProduct)?;
        let variant = product.variant(req.variant_id).ok_or(CartError::UnknownProduct)?;
        let option = variant.option(req.option_id).ok_or(CartError::UnknownProduct)?;

        let unit_price = match self.discounts.quote(option.price).await {
            Some(quote) => quote.final_price,
            None => option.price,
        };
        let item = CartItem {
            product_id: product.id,
            variant_id: variant.id,
            option_id: option.id,
            title: product.title.clone(),
            variant_name: variant.name.clone(),
            color: variant.color.clone(),
            storage: option.label.clone(),
            quantity: Quantity::new(req.quantity),
            unit_price,
        };

        let cart = self.update(user_id, |cart| cart.with_item(item.clone())).await?;
        tracing::debug!(%user_id, product_id = %req.product_id, "item added to cart");
        Ok(cart)
    }

    pub async fn set_quantity(&self, user_id: Uuid, option_id: Uuid, quantity: u32) -> Result<Cart, ShopError> {
        self.update(user_id, |cart| cart.with_quantity(option_id, Quantity::new(quantity))).await
    }

    pub async fn remove(&self, user_id: Uuid, option_id: Uuid) -> Result<Cart, ShopError> {
        self.update(user_id, |cart| cart.without_item(option_id)).await
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<Cart, ShopError> {
        self.update(user_id, |cart| Ok(cart.cleared())).await
    }

    async fn update<F>(&self, user_id: Uuid, change: F) -> Result<Cart, ShopError>
    where
        F: Fn(&Cart) -> Result<Cart, CartError> + Send + Sync,
    {
        for _ in 0..MAX_ATTEMPTS {
            let stored = self.carts.load(user_id).await?;
            let next = change(stored.as_ref().unwrap_or(&Cart::empty(user_id)))?;
            if self.carts.replace(stored.as_ref(), &next).await? {
                return Ok(next);
            }
            tracing::debug!(%user_id, "cart changed underneath, retrying");
        }
        Err(CartError::Conflict.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Category, DiscountRule, Product, Variant};
    use crate::domain::value_objects::{HexColor, Percent, Price};
    use crate::store::MemoryStore;
    use crate::FixedClock;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal::Decimal;

    struct Fixture { service: CartService, store: MemoryStore, product: Product }

    async fn fixture() -> Fixture {
        let now = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).unwrap();
        let store = MemoryStore::new();
        let product = Product::create("iPhone 15", Category::Phones).with_variant(
            Variant::new(Uuid::nil(), "Blue", HexColor::new("#0000ff").unwrap())
                .with_option("128GB", Price::units(800))
                .with_option("256GB", Price::units(900)),
        );
        store.add_product(product.clone()).await;
        store.add_rule(
            DiscountRule::new(
                Price::units(850), Price::units(1000), Percent::new(Decimal::new(10, 0)).unwrap(),
                now - Duration::days(1), now + Duration::days(1),
            )
            .unwrap(),
        )
        .await;
        let discounts = DiscountService::new(Arc::new(store.clone()), Arc::new(FixedClock(now)));
        let service = CartService::new(Arc::new(store.clone()), Arc::new(store.clone()), discounts);
        Fixture { service, store, product }
    }

    fn add(p: &Product, option: usize, quantity: u32) -> AddToCart {
        let variant = &p.variants[0];
        AddToCart { product_id: p.id, variant_id: variant.id, option_id: variant.options[option].id, quantity }
    }

    #[tokio::test]
    async fn test_unit_price_uses_discount_for_selected_option() {
        let f = fixture().await;
        let user = Uuid::new_v4();
        f.service.add(user, add(&f.product, 0, 1)).await.unwrap();
        let cart = f.service.add(user, add(&f.product, 1, 2)).await.unwrap();
        assert_eq!(cart.items()[0].unit_price, Price::units(800));
        assert_eq!(cart.items()[1].unit_price, Price::units(810));
        assert_eq!(cart.subtotal(), Price::units(2420));
    }

    #[tokio::test]
    async fn test_add_merges_and_persists() {
        let f = fixture().await;
        let user = Uuid::new_v4();
        f.service.add(user, add(&f.product, 0, 1)).await.unwrap();
        f.service.add(user, add(&f.product, 0, 2)).await.unwrap();
        let cart = f.service.cart(user).await.unwrap();
        assert_eq!(cart.item_count(), 1);
        assert_eq!(cart.items()[0].quantity.value(), 3);
    }

    #[tokio::test]
    async fn test_unknown_option_rejected() {
        let f = fixture().await;
        let mut req = add(&f.product, 0, 1);
        req.option_id = Uuid::new_v4();
        let err = f.service.add(Uuid::new_v4(), req).await.unwrap_err();
        assert!(matches!(err, ShopError::Cart(CartError::UnknownProduct)));
    }

    #[tokio::test]
    async fn test_removed_product_cannot_be_added() {
        let f = fixture().await;
        f.store.remove_product(f.product.id).await;
        let err = f.service.add(Uuid::new_v4(), add(&f.product, 0, 1)).await.unwrap_err();
        assert!(matches!(err, ShopError::Cart(CartError::UnknownProduct)));
    }

    #[tokio::test]
    async fn test_quantity_zero_removes_then_clear() {
        let f = fixture().await;
        let user = Uuid::new_v4();
        let option = f.product.variants[0].options[0].id;
        f.service.add(user, add(&f.product, 0, 2)).await.unwrap();
        f.service.add(user, add(&f.product, 1, 1)).await.unwrap();
        assert_eq!(f.service.set_quantity(user, option, 0).await.unwrap().item_count(), 1);
        assert!(matches!(f.service.remove(user, option).await, Err(ShopError::Cart(CartError::ItemNotFound))));
        assert!(f.service.clear(user).await.unwrap().is_empty());
        assert!(f.service.cart(user).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_are_not_lost() {
        let f = fixture().await;
        let user = Uuid::new_v4();
        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let service = f.service.clone();
                let req = add(&f.product, 0, 1);
                tokio::spawn(async move { service.add(user, req).await })
            })
            .collect();

        let mut added = 0;
        for task in tasks {
            match task.await.unwrap() {
                Ok(_) => added += 1,
                Err(e) => assert!(matches!(e, ShopError::Cart(CartError::Conflict))),
            }
        }
        let cart = f.service.cart(user).await.unwrap();
        assert!(added > 0);
        assert_eq!(cart.items()[0].quantity.value(), added);
    }
}

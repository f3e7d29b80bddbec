//! In-memory store, used when no database is configured and by tests.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CartStore, DiscountRuleStore, FavouriteStore, OrderStore, ProductStore, StoreError};
use crate::domain::aggregates::{Cart, DiscountRule, Order, OrderStatus, Product};
use crate::domain::services::catalog::{compare_products, CatalogFilter, PageWindow, SortOrder};

#[derive(Default)]
struct Inner {
    products: Vec<Product>,
    rules: Vec<DiscountRule>,
    favourites: HashMap<Uuid, HashSet<Uuid>>,
    carts: HashMap<Uuid, Cart>,
    orders: Vec<Order>,
}

/// Cheap to clone; clones share the same data.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }

    pub async fn add_product(&self, product: Product) {
        self.inner.write().await.products.push(product);
    }

    /// Deleting a product drops its variants with it, and any favourites.
    pub async fn remove_product(&self, id: Uuid) -> bool {
        let mut inner = self.inner.write().await;
        let before = inner.products.len();
        inner.products.retain(|p| p.id != id);
        inner.favourites.values_mut().for_each(|f| { f.remove(&id); });
        inner.products.len() != before
    }

    pub async fn add_rule(&self, rule: DiscountRule) {
        self.inner.write().await.rules.push(rule);
    }
}

#[async_trait]
impl ProductStore for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        Ok(self.inner.read().await.products.iter().find(|p| p.id == id).cloned())
    }

    async fn list(&self, filter: &CatalogFilter, sort: SortOrder, window: PageWindow) -> Result<Vec<Product>, StoreError> {
        Ok(select(&self.inner.read().await.products, filter, sort, window).0)
    }

    async fn count(&self, filter: &CatalogFilter) -> Result<u64, StoreError> {
        Ok(self.inner.read().await.products.iter().filter(|p| filter.matches(p)).count() as u64)
    }

    async fn page(&self, filter: &CatalogFilter, sort: SortOrder, window: PageWindow) -> Result<(Vec<Product>, u64), StoreError> {
        Ok(select(&self.inner.read().await.products, filter, sort, window))
    }
}

/// Page and total from one view of the product list.
fn select(products: &[Product], filter: &CatalogFilter, sort: SortOrder, window: PageWindow) -> (Vec<Product>, u64) {
    let mut matched: Vec<&Product> = products.iter().filter(|p| filter.matches(p)).collect();
    let total = matched.len() as u64;
    matched.sort_by(|a, b| compare_products(a, b, sort));
    let page = matched
        .into_iter()
        .skip(usize::try_from(window.offset()).unwrap_or(usize::MAX))
        .take(usize::try_from(window.limit()).unwrap_or(usize::MAX))
        .cloned()
        .collect();
    (page, total)
}

/// Persisted state only; pending events stay with the caller.
fn stored(order: &Order) -> Order {
    Order::restore(
        order.id(), order.user_id(), order.status(), order.lines().to_vec(),
        order.quantity(), order.total_price(), order.created_at(),
    )
}

#[async_trait]
impl DiscountRuleStore for MemoryStore {
    async fn all(&self) -> Result<Vec<DiscountRule>, StoreError> {
        Ok(self.inner.read().await.rules.clone())
    }
}

#[async_trait]
impl FavouriteStore for MemoryStore {
    async fn favourites_of(&self, user_id: Uuid) -> Result<HashSet<Uuid>, StoreError> {
        Ok(self.inner.read().await.favourites.get(&user_id).cloned().unwrap_or_default())
    }

    async fn toggle(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let set = inner.favourites.entry(user_id).or_default();
        if set.remove(&product_id) { return Ok(false); }
        set.insert(product_id);
        Ok(true)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<Cart>, StoreError> {
        Ok(self.inner.read().await.carts.get(&user_id).cloned())
    }

    async fn replace(&self, expected: Option<&Cart>, cart: &Cart) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.carts.get(&cart.user_id()) != expected { return Ok(false); }
        inner.carts.insert(cart.user_id(), cart.clone());
        Ok(true)
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        self.inner.write().await.orders.push(stored(order));
        Ok(())
    }

    async fn place_from_cart(&self, order: &Order, cart: &Cart) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        if inner.carts.get(&cart.user_id()) != Some(cart) { return Ok(false); }
        inner.orders.push(stored(order));
        inner.carts.insert(cart.user_id(), cart.cleared());
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        Ok(self.inner.read().await.orders.iter().find(|o| o.id() == id).cloned())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let mut orders: Vec<Order> =
            self.inner.read().await.orders.iter().filter(|o| o.user_id() == user_id).cloned().collect();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders)
    }

    async fn list_all(&self) -> Result<Vec<Order>, StoreError> {
        let mut orders = self.inner.read().await.orders.clone();
        orders.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        Ok(orders)
    }

    async fn save_status(&self, id: Uuid, status: OrderStatus) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let order = inner.orders.iter_mut().find(|o| o.id() == id)
            .ok_or_else(|| StoreError::Corrupt(format!("order {id} vanished")))?;
        *order = Order::restore(
            order.id(), order.user_id(), status, order.lines().to_vec(),
            order.quantity(), order.total_price(), order.created_at(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{CartItem, Category, Variant};
    use crate::domain::value_objects::{HexColor, Price, Quantity};

    #[tokio::test]
    async fn test_remove_product_cascades_favourites() {
        let store = MemoryStore::new();
        let p = Product::create("Note", Category::Phones)
            .with_variant(Variant::new(Uuid::nil(), "Ink", HexColor::new("#123").unwrap()).with_option("64GB", Price::units(5)));
        let id = p.id;
        store.add_product(p).await;
        let user = Uuid::new_v4();
        store.toggle(user, id).await.unwrap();
        assert!(store.remove_product(id).await);
        assert!(ProductStore::get(&store, id).await.unwrap().is_none());
        assert!(store.favourites_of(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_windows_past_end_are_empty() {
        let store = MemoryStore::new();
        store.add_product(Product::create("Solo", Category::Others)).await;
        let filter = CatalogFilter::default();
        let page = store.list(&filter, SortOrder::Newest, PageWindow { page: 2, page_size: 1 }).await.unwrap();
        assert!(page.is_empty());
        assert_eq!(store.count(&filter).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_page_total_matches_listing() {
        let store = MemoryStore::new();
        for title in ["A", "B", "C"] {
            store.add_product(Product::create(title, Category::Laptops)).await;
        }
        let window = PageWindow { page: 1, page_size: 2 };
        let (page, total) = store.page(&CatalogFilter::default(), SortOrder::Newest, window).await.unwrap();
        assert_eq!((page.len(), total), (2, 3));
    }

    #[tokio::test]
    async fn test_replace_detects_concurrent_write() {
        let store = MemoryStore::new();
        let user = Uuid::new_v4();
        let first = Cart::empty(user);
        assert!(store.replace(None, &first).await.unwrap());
        assert!(!store.replace(None, &Cart::empty(user)).await.unwrap());

        let item = CartItem {
            product_id: Uuid::new_v4(), variant_id: Uuid::new_v4(), option_id: Uuid::new_v4(),
            title: "ThinkPad".into(), variant_name: "Black".into(), color: HexColor::new("#000").unwrap(),
            storage: "1TB".into(), quantity: Quantity::new(1), unit_price: Price::units(1200),
        };
        let second = first.with_item(item).unwrap();
        assert!(store.replace(Some(&first), &second).await.unwrap());
        assert!(!store.replace(Some(&first), &first.cleared()).await.unwrap());
        assert_eq!(store.load(user).await.unwrap(), Some(second));
    }
}

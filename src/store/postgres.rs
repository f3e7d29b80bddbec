//! PostgreSQL store.
//!
//! Catalog filters are translated into SQL with `QueryBuilder`; variants and
//! storage options for a page are fetched in two follow-up queries and
//! stitched back together in position order. A page and its total are
//! read in one repeatable-read transaction so they agree.
//!
//! Cart writes compare-and-swap on the stored JSONB snapshot. Checkout locks
//! the cart row, inserts the order and empties the cart in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use super::{CartStore, DiscountRuleStore, FavouriteStore, OrderStore, ProductStore, StoreError};
use crate::domain::aggregates::{
    Cart, Category, DiscountRule, Order, OrderProduct, OrderStatus, Product, StorageOption, Variant, VariantSnapshot,
};
use crate::domain::services::catalog::{CatalogFilter, PageWindow, SortOrder};
use crate::domain::value_objects::{HexColor, Percent, Price, Quantity};

const PRODUCT_COLUMNS: &str = "p.id, p.title, p.description, p.category, p.brand, p.created_at";

/// First variant's first storage option.
const REPRESENTATIVE_PRICE: &str = "(SELECT so.price FROM storage_options so \
     WHERE so.variant_id = (SELECT v.id FROM variants v WHERE v.product_id = p.id ORDER BY v.position LIMIT 1) \
     ORDER BY so.position LIMIT 1)";

#[derive(Debug, FromRow)]
struct ProductRow { id: Uuid, title: String, description: String, category: String, brand: Option<String>, created_at: DateTime<Utc> }

#[derive(Debug, FromRow)]
struct VariantRow { id: Uuid, product_id: Uuid, name: String, color: String, condition: Option<String>, images: Vec<String> }

#[derive(Debug, FromRow)]
struct OptionRow { id: Uuid, variant_id: Uuid, label: String, price: Decimal }

#[derive(Debug, FromRow)]
struct DiscountRow { id: Uuid, min_price: Decimal, max_price: Decimal, discount: Decimal, start_date: DateTime<Utc>, end_date: DateTime<Utc> }

#[derive(Debug, FromRow)]
struct OrderRow { id: Uuid, user_id: Uuid, quantity: i32, total_price: Decimal, status: String, created_at: DateTime<Utc> }

#[derive(Debug, FromRow)]
struct OrderLineRow {
    id: Uuid, order_id: Uuid, product_id: Uuid, title: String, variant_id: Uuid, variant_name: String,
    color: String, storage: String, unit_price: Decimal, quantity: i32,
}

#[derive(Clone)]
pub struct PgStore { pool: PgPool }

impl PgStore {
    pub fn new(pool: PgPool) -> Self { Self { pool } }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await.map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn hydrate(&self, rows: Vec<ProductRow>) -> Result<Vec<Product>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        hydrate(&mut conn, rows).await
    }

    async fn load_orders(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, StoreError> {
        if rows.is_empty() { return Ok(vec![]); }
        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let line_rows = sqlx::query_as::<_, OrderLineRow>(
            "SELECT id, order_id, product_id, title, variant_id, variant_name, color, storage, unit_price, quantity \
             FROM order_products WHERE order_id = ANY($1) ORDER BY order_id, position",
        )
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await?;

        let mut lines: HashMap<Uuid, Vec<OrderProduct>> = HashMap::new();
        for row in line_rows {
            let line = OrderProduct {
                id: row.id,
                product_id: row.product_id,
                title: row.title,
                variant: VariantSnapshot {
                    variant_id: row.variant_id,
                    name: row.variant_name,
                    color: HexColor::new(row.color).map_err(corrupt)?,
                    storage: row.storage,
                    unit_price: Price::new(row.unit_price).map_err(corrupt)?,
                },
                quantity: Quantity::new(u32::try_from(row.quantity).map_err(corrupt)?),
            };
            lines.entry(row.order_id).or_default().push(line);
        }

        rows.into_iter()
            .map(|row| -> Result<Order, StoreError> {
                Ok(Order::restore(
                    row.id,
                    row.user_id,
                    row.status.parse().map_err(corrupt)?,
                    lines.remove(&row.id).unwrap_or_default(),
                    Quantity::new(u32::try_from(row.quantity).map_err(corrupt)?),
                    Price::new(row.total_price).map_err(corrupt)?,
                    row.created_at,
                ))
            })
            .collect()
    }
}

/// Attaches variants and options to product rows. A product with a variant
/// that no longer parses is left out entirely rather than shown incomplete.
async fn hydrate(conn: &mut PgConnection, rows: Vec<ProductRow>) -> Result<Vec<Product>, StoreError> {
    if rows.is_empty() { return Ok(vec![]); }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let variant_rows = sqlx::query_as::<_, VariantRow>(
        "SELECT id, product_id, name, color, condition, images FROM variants \
         WHERE product_id = ANY($1) ORDER BY product_id, position",
    )
    .bind(&ids[..])
    .fetch_all(&mut *conn)
    .await?;

    let option_rows = sqlx::query_as::<_, OptionRow>(
        "SELECT so.id, so.variant_id, so.label, so.price FROM storage_options so \
         JOIN variants v ON v.id = so.variant_id \
         WHERE v.product_id = ANY($1) ORDER BY so.variant_id, so.position",
    )
    .bind(&ids[..])
    .fetch_all(&mut *conn)
    .await?;

    let mut options: HashMap<Uuid, Vec<StorageOption>> = HashMap::new();
    for row in option_rows {
        match Price::new(row.price) {
            Ok(price) => options.entry(row.variant_id).or_default()
                .push(StorageOption { id: row.id, variant_id: row.variant_id, label: row.label, price }),
            Err(e) => tracing::warn!(option_id = %row.id, error = %e, "dropping storage option"),
        }
    }

    let mut variants: HashMap<Uuid, Vec<Variant>> = HashMap::new();
    let mut broken: HashSet<Uuid> = HashSet::new();
    for row in variant_rows {
        let color = match HexColor::new(row.color) {
            Ok(color) => color,
            Err(e) => {
                tracing::warn!(product_id = %row.product_id, variant_id = %row.id, error = %e, "skipping product with malformed variant");
                broken.insert(row.product_id);
                continue;
            }
        };
        variants.entry(row.product_id).or_default().push(Variant {
            id: row.id,
            product_id: row.product_id,
            name: row.name,
            color,
            condition: row.condition.and_then(|c| c.parse().ok()),
            images: row.images,
            options: options.remove(&row.id).unwrap_or_default(),
        });
    }

    Ok(rows
        .into_iter()
        .filter(|row| !broken.contains(&row.id))
        .map(|row| Product {
            id: row.id,
            category: row.category.parse().unwrap_or_else(|e| {
                tracing::warn!(product_id = %row.id, error = %e, "unknown category, listing under Others");
                Category::Others
            }),
            brand: row.brand.and_then(|b| b.parse().ok()),
            title: row.title,
            description: row.description,
            created_at: row.created_at,
            variants: variants.remove(&row.id).unwrap_or_default(),
        })
        .collect())
}

fn corrupt(e: impl std::fmt::Display) -> StoreError { StoreError::Corrupt(e.to_string()) }

fn text_list<T: ToString>(values: &[T]) -> Vec<String> { values.iter().map(ToString::to_string).collect() }

/// `%` and `_` in user text are literals, not wildcards.
fn like_pattern(text: &str) -> String {
    let escaped = text.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, f: &CatalogFilter) {
    qb.push(" WHERE TRUE");
    if let Some(text) = &f.text {
        let pattern = like_pattern(text);
        qb.push(" AND (p.title ILIKE ").push_bind(pattern.clone())
            .push(" OR p.description ILIKE ").push_bind(pattern).push(")");
    }
    if !f.categories.is_empty() {
        qb.push(" AND p.category = ANY(").push_bind(text_list(&f.categories)).push(")");
    }
    if !f.brands.is_empty() {
        qb.push(" AND p.brand = ANY(").push_bind(text_list(&f.brands)).push(")");
    }
    if f.has_price_bounds() {
        qb.push(" AND EXISTS (SELECT 1 FROM variants v JOIN storage_options so ON so.variant_id = v.id WHERE v.product_id = p.id");
        if let Some(min) = f.min_price { qb.push(" AND so.price >= ").push_bind(min.amount()); }
        if let Some(max) = f.max_price { qb.push(" AND so.price <= ").push_bind(max.amount()); }
        qb.push(")");
    }
    if !f.conditions.is_empty() {
        qb.push(" AND EXISTS (SELECT 1 FROM variants v WHERE v.product_id = p.id AND v.condition = ANY(")
            .push_bind(text_list(&f.conditions)).push("))");
    }
}

fn order_clause(sort: SortOrder) -> &'static str {
    match sort {
        SortOrder::Relevance | SortOrder::Newest => " ORDER BY p.created_at DESC, p.id",
        SortOrder::PriceLow => " ORDER BY representative_price ASC NULLS LAST, p.created_at DESC, p.id",
        SortOrder::PriceHigh => " ORDER BY representative_price DESC NULLS LAST, p.created_at DESC, p.id",
    }
}

#[async_trait]
impl ProductStore for PgStore {
    async fn get(&self, id: Uuid) -> Result<Option<Product>, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products p WHERE p.id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn list(&self, filter: &CatalogFilter, sort: SortOrder, window: PageWindow) -> Result<Vec<Product>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        list_products(&mut conn, filter, sort, window).await
    }

    async fn count(&self, filter: &CatalogFilter) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        count_products(&mut conn, filter).await
    }

    async fn page(&self, filter: &CatalogFilter, sort: SortOrder, window: PageWindow) -> Result<(Vec<Product>, u64), StoreError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY").execute(&mut *tx).await?;
        let products = list_products(&mut tx, filter, sort, window).await?;
        let total = count_products(&mut tx, filter).await?;
        tx.commit().await?;
        Ok((products, total))
    }
}

async fn list_products(conn: &mut PgConnection, filter: &CatalogFilter, sort: SortOrder, window: PageWindow) -> Result<Vec<Product>, StoreError> {
    let mut qb = QueryBuilder::<Postgres>::new(format!(
        "SELECT {PRODUCT_COLUMNS}, {REPRESENTATIVE_PRICE} AS representative_price FROM products p"
    ));
    push_filter(&mut qb, filter);
    qb.push(order_clause(sort));
    qb.push(" LIMIT ").push_bind(i64::try_from(window.limit()).unwrap_or(i64::MAX));
    qb.push(" OFFSET ").push_bind(i64::try_from(window.offset()).unwrap_or(i64::MAX));
    let rows: Vec<ProductRow> = qb.build_query_as().fetch_all(&mut *conn).await?;
    hydrate(conn, rows).await
}

async fn count_products(conn: &mut PgConnection, filter: &CatalogFilter) -> Result<u64, StoreError> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products p");
    push_filter(&mut qb, filter);
    let (count,): (i64,) = qb.build_query_as().fetch_one(&mut *conn).await?;
    u64::try_from(count).map_err(corrupt)
}

#[async_trait]
impl DiscountRuleStore for PgStore {
    async fn all(&self) -> Result<Vec<DiscountRule>, StoreError> {
        let rows = sqlx::query_as::<_, DiscountRow>(
            "SELECT id, min_price, max_price, discount, start_date, end_date FROM discounts ORDER BY created_at, id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let id = row.id;
                rule_from_row(row).map_err(|e| tracing::warn!(rule_id = %id, error = %e, "ignoring discount rule")).ok()
            })
            .collect())
    }
}

fn rule_from_row(row: DiscountRow) -> Result<DiscountRule, StoreError> {
    DiscountRule::restore(
        row.id,
        Price::new(row.min_price).map_err(corrupt)?,
        Price::new(row.max_price).map_err(corrupt)?,
        Percent::new(row.discount).map_err(corrupt)?,
        row.start_date,
        row.end_date,
    )
    .map_err(corrupt)
}

#[async_trait]
impl FavouriteStore for PgStore {
    async fn favourites_of(&self, user_id: Uuid) -> Result<HashSet<Uuid>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT product_id FROM favourites WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids.into_iter().collect())
    }

    async fn toggle(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        let removed = sqlx::query("DELETE FROM favourites WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if removed > 0 { return Ok(false); }
        sqlx::query("INSERT INTO favourites (user_id, product_id) VALUES ($1, $2) ON CONFLICT DO NOTHING")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(true)
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn load(&self, user_id: Uuid) -> Result<Option<Cart>, StoreError> {
        let snapshot = sqlx::query_scalar::<_, Json<Cart>>("SELECT snapshot FROM carts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(snapshot.map(|Json(cart)| cart))
    }

    async fn replace(&self, expected: Option<&Cart>, cart: &Cart) -> Result<bool, StoreError> {
        let written = match expected {
            None => sqlx::query(
                "INSERT INTO carts (user_id, snapshot, updated_at) VALUES ($1, $2, $3) ON CONFLICT (user_id) DO NOTHING",
            )
            .bind(cart.user_id())
            .bind(Json(cart))
            .bind(cart.updated_at())
            .execute(&self.pool)
            .await?,
            Some(previous) => sqlx::query(
                "UPDATE carts SET snapshot = $2, updated_at = $3 WHERE user_id = $1 AND snapshot = $4",
            )
            .bind(cart.user_id())
            .bind(Json(cart))
            .bind(cart.updated_at())
            .bind(Json(previous))
            .execute(&self.pool)
            .await?,
        };
        Ok(written.rows_affected() == 1)
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn insert(&self, order: &Order) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;
        insert_order(&mut tx, order).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn place_from_cart(&self, order: &Order, cart: &Cart) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        let stored = sqlx::query_scalar::<_, Json<Cart>>("SELECT snapshot FROM carts WHERE user_id = $1 FOR UPDATE")
            .bind(cart.user_id())
            .fetch_optional(&mut *tx)
            .await?;
        if stored.as_ref().map(|Json(c)| c) != Some(cart) {
            tx.rollback().await?;
            return Ok(false);
        }

        insert_order(&mut tx, order).await?;
        let cleared = cart.cleared();
        sqlx::query("UPDATE carts SET snapshot = $2, updated_at = $3 WHERE user_id = $1")
            .bind(cleared.user_id())
            .bind(Json(&cleared))
            .bind(cleared.updated_at())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, quantity, total_price, status, created_at FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(self.load_orders(rows).await?.pop())
    }

    async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, quantity, total_price, status, created_at FROM orders \
             WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        self.load_orders(rows).await
    }

    async fn list_all(&self) -> Result<Vec<Order>, StoreError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            "SELECT id, user_id, quantity, total_price, status, created_at FROM orders ORDER BY created_at DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        self.load_orders(rows).await
    }

    async fn save_status(&self, id: Uuid, status: OrderStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Order row plus its lines. Callers own the transaction.
async fn insert_order(conn: &mut PgConnection, order: &Order) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO orders (id, user_id, quantity, total_price, status, created_at) VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(order.id())
    .bind(order.user_id())
    .bind(i32::try_from(order.quantity().value()).map_err(corrupt)?)
    .bind(order.total_price().amount())
    .bind(order.status().as_str())
    .bind(order.created_at())
    .execute(&mut *conn)
    .await?;

    for (position, line) in order.lines().iter().enumerate() {
        sqlx::query(
            "INSERT INTO order_products (id, order_id, position, product_id, title, variant_id, variant_name, \
             color, storage, unit_price, quantity) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(line.id)
        .bind(order.id())
        .bind(i32::try_from(position).map_err(corrupt)?)
        .bind(line.product_id)
        .bind(&line.title)
        .bind(line.variant.variant_id)
        .bind(&line.variant.name)
        .bind(line.variant.color.as_str())
        .bind(&line.variant.storage)
        .bind(line.variant.unit_price.amount())
        .bind(i32::try_from(line.quantity.value()).map_err(corrupt)?)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

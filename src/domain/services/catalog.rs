//! Catalog query builder
//!
//! Turns raw search criteria into a normalized filter, asks the product store
//! for one page plus the total, and projects every product into a
//! `ProductSummary` annotated with its discount.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::domain::aggregates::{Brand, Category, Condition, Product};
use crate::domain::services::discount::{resolve_discount, DiscountQuote, DiscountService};
use crate::domain::value_objects::Price;
use crate::store::{FavouriteStore, ProductStore};
use crate::CatalogError;

/// Image shown for products whose first variant has no pictures.
pub const PLACEHOLDER_IMAGE: &str = "/placeholder.svg";

pub const DEFAULT_PAGE_SIZE: u32 = 8;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Newest first; there is no scoring.
    #[default]
    Relevance,
    Newest,
    PriceLow,
    PriceHigh,
}

/// Raw criteria as supplied by a caller. Every field is optional.
#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[validate(schema(function = "validate_price_bounds"))]
#[serde(default)]
pub struct SearchCriteria {
    #[validate(range(min = 1, message = "page must be at least 1"))]
    pub page: Option<i64>,
    #[validate(range(min = 1, message = "page size must be positive"))]
    pub page_size: Option<i64>,
    pub text_query: Option<String>,
    pub categories: Vec<Category>,
    pub brands: Vec<Brand>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub conditions: Vec<Condition>,
    pub sort: SortOrder,
}

fn validate_price_bounds(c: &SearchCriteria) -> Result<(), ValidationError> {
    let invalid = |code: &'static str, message: &'static str| {
        let mut e = ValidationError::new(code);
        e.message = Some(Cow::Borrowed(message));
        Err(e)
    };
    if c.min_price.is_some_and(|p| p.is_sign_negative()) || c.max_price.is_some_and(|p| p.is_sign_negative()) {
        return invalid("negative_price", "price bounds cannot be negative");
    }
    if let (Some(min), Some(max)) = (c.min_price, c.max_price) {
        if min > max { return invalid("price_bounds", "min price exceeds max price"); }
    }
    Ok(())
}

/// Store-facing filter. AND across fields, OR within a field, empty means
/// unconstrained.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CatalogFilter {
    /// Lowercased, trimmed, never empty.
    pub text: Option<String>,
    pub categories: Vec<Category>,
    pub brands: Vec<Brand>,
    pub min_price: Option<Price>,
    pub max_price: Option<Price>,
    pub conditions: Vec<Condition>,
}

impl CatalogFilter {
    pub fn has_price_bounds(&self) -> bool { self.min_price.is_some() || self.max_price.is_some() }

    pub fn matches(&self, p: &Product) -> bool {
        self.text.as_deref().map_or(true, |t| p.mentions(t))
            && (self.categories.is_empty() || self.categories.contains(&p.category))
            && (self.brands.is_empty() || p.brand.is_some_and(|b| self.brands.contains(&b)))
            && (!self.has_price_bounds() || p.option_prices().any(|price| self.price_in_range(price)))
            && (self.conditions.is_empty() || p.conditions().any(|c| self.conditions.contains(&c)))
    }

    fn price_in_range(&self, price: Price) -> bool {
        self.min_price.map_or(true, |min| price >= min) && self.max_price.map_or(true, |max| price <= max)
    }
}

/// Deterministic listing order. Products without a representative price sort
/// after priced ones; ties fall back to newest first, then id.
pub fn compare_products(a: &Product, b: &Product, sort: SortOrder) -> Ordering {
    let newest = b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id));
    let by_price = |asc: bool| match (a.representative_price(), b.representative_price()) {
        (Some(x), Some(y)) => if asc { x.cmp(&y) } else { y.cmp(&x) },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    match sort {
        SortOrder::Relevance | SortOrder::Newest => newest,
        SortOrder::PriceLow => by_price(true).then(newest),
        SortOrder::PriceHigh => by_price(false).then(newest),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct PageWindow { pub page: u32, pub page_size: u32 }

impl PageWindow {
    pub fn offset(&self) -> u64 { u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size) }
    pub fn limit(&self) -> u64 { u64::from(self.page_size) }
}

#[derive(Clone, Debug, PartialEq)]
pub struct NormalizedQuery { pub filter: CatalogFilter, pub sort: SortOrder, pub window: PageWindow }

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageDefaults { pub page_size: u32, pub max_page_size: u32 }

impl Default for PageDefaults {
    fn default() -> Self { Self { page_size: DEFAULT_PAGE_SIZE, max_page_size: MAX_PAGE_SIZE } }
}

impl SearchCriteria {
    /// Rejects malformed values, fills in absent ones.
    pub fn normalize(&self, defaults: PageDefaults) -> Result<NormalizedQuery, CatalogError> {
        self.validate().map_err(|e| CatalogError::InvalidCriteria(e.to_string()))?;
        let page = u32::try_from(self.page.unwrap_or(1))
            .map_err(|_| CatalogError::InvalidCriteria("page is too large".into()))?;
        let page_size = self.page_size
            .map_or(defaults.page_size, |s| u32::try_from(s).unwrap_or(u32::MAX))
            .min(defaults.max_page_size);
        let price = |v: Option<Decimal>| {
            v.map(Price::new).transpose().map_err(|e| CatalogError::InvalidCriteria(e.to_string()))
        };
        let text = self.text_query.as_deref().map(str::trim).filter(|t| !t.is_empty()).map(str::to_lowercase);
        Ok(NormalizedQuery {
            filter: CatalogFilter {
                text,
                categories: dedup(&self.categories),
                brands: dedup(&self.brands),
                min_price: price(self.min_price)?,
                max_price: price(self.max_price)?,
                conditions: dedup(&self.conditions),
            },
            sort: self.sort,
            window: PageWindow { page, page_size },
        })
    }
}

fn dedup<T: Copy + Eq + std::hash::Hash>(values: &[T]) -> Vec<T> {
    let mut seen = HashSet::new();
    values.iter().copied().filter(|v| seen.insert(*v)).collect()
}

/// Listing card for one product.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProductSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price: Price,
    pub discount: Option<DiscountQuote>,
    pub image: String,
    pub brand: Brand,
    pub condition: Condition,
    pub is_favourite: bool,
}

impl ProductSummary {
    /// Fails when the product lacks the nested data a card needs.
    pub fn try_from_product(p: &Product, is_favourite: bool) -> Result<Self, CatalogError> {
        let malformed = |reason| CatalogError::RecordMapping { product_id: p.id, reason };
        let first = p.variants.first().ok_or_else(|| malformed("product has no variants"))?;
        let price = p.representative_price().ok_or_else(|| malformed("first variant has no storage options"))?;
        Ok(Self {
            id: p.id,
            title: p.title.clone(),
            description: p.description.clone(),
            price,
            discount: None,
            image: first.images.first().cloned().unwrap_or_else(|| PLACEHOLDER_IMAGE.to_string()),
            brand: p.brand.unwrap_or_default(),
            condition: first.condition.unwrap_or_default(),
            is_favourite,
        })
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CatalogPage {
    pub items: Vec<ProductSummary>,
    pub total_count: u64,
    pub page: u32,
    pub page_size: u32,
}

impl CatalogPage {
    pub fn total_pages(&self) -> u64 { self.total_count.div_ceil(u64::from(self.page_size.max(1))) }
}

#[derive(Clone, Debug, Serialize)]
pub struct ProductDetail {
    pub product: Product,
    pub discount: Option<DiscountQuote>,
    pub is_favourite: bool,
}

#[derive(Clone)]
pub struct CatalogService {
    products: Arc<dyn ProductStore>,
    favourites: Arc<dyn FavouriteStore>,
    discounts: DiscountService,
    defaults: PageDefaults,
}

impl CatalogService {
    pub fn new(products: Arc<dyn ProductStore>, favourites: Arc<dyn FavouriteStore>, discounts: DiscountService) -> Self {
        Self { products, favourites, discounts, defaults: PageDefaults::default() }
    }

    pub fn with_page_defaults(mut self, defaults: PageDefaults) -> Self { self.defaults = defaults; self }

    pub async fn query_products(&self, criteria: &SearchCriteria, viewer: Option<Uuid>) -> Result<CatalogPage, CatalogError> {
        let query = criteria.normalize(self.defaults)?;
        tracing::debug!(filter = ?query.filter, sort = ?query.sort, window = ?query.window, "catalog query");

        let (products, total_count) = self.products.page(&query.filter, query.sort, query.window).await.map_err(|e| {
            tracing::error!(error = %e, "catalog query failed");
            CatalogError::DataUnavailable(e)
        })?;

        let favourites = self.favourites_of(viewer).await;
        let rules = self.discounts.rules().await;
        let now = self.discounts.now();

        let items = products
            .iter()
            .filter_map(|p| match ProductSummary::try_from_product(p, favourites.contains(&p.id)) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    tracing::warn!(product_id = %p.id, error = %e, "skipping product");
                    None
                }
            })
            .map(|mut s| { s.discount = resolve_discount(s.price, now, &rules); s })
            .collect();

        Ok(CatalogPage { items, total_count, page: query.window.page, page_size: query.window.page_size })
    }

    pub async fn get_product(&self, id: Uuid, viewer: Option<Uuid>) -> Result<ProductDetail, CatalogError> {
        let product = self.products.get(id).await?.ok_or(CatalogError::NotFound)?;
        let discount = match product.representative_price() {
            Some(price) => self.discounts.quote(price).await,
            None => None,
        };
        let is_favourite = self.favourites_of(viewer).await.contains(&id);
        Ok(ProductDetail { product, discount, is_favourite })
    }

    pub async fn toggle_favourite(&self, user_id: Uuid, product_id: Uuid) -> Result<bool, CatalogError> {
        self.products.get(product_id).await?.ok_or(CatalogError::NotFound)?;
        Ok(self.favourites.toggle(user_id, product_id).await?)
    }

    async fn favourites_of(&self, viewer: Option<Uuid>) -> HashSet<Uuid> {
        let Some(user_id) = viewer else { return HashSet::new() };
        self.favourites.favourites_of(user_id).await.unwrap_or_else(|e| {
            tracing::warn!(%user_id, error = %e, "favourites unavailable");
            HashSet::new()
        })
    }
}

//! HTTP adapter
//!
//! Thin axum layer over the services. The caller's identity arrives in the
//! `x-user-id` header and their role in `x-user-role`, both set by the
//! identity proxy in front of this service, which strips any client-supplied
//! copies. Admin routes require the role `admin` and answer 403 otherwise.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::config::Config;
use crate::domain::aggregates::{Cart, CartError, Order, OrderError, OrderStatus};
use crate::domain::services::cart::{AddToCart, CartService};
use crate::domain::services::catalog::{CatalogService, ProductDetail, ProductSummary, SearchCriteria, SortOrder};
use crate::domain::services::checkout::{Checkout, CheckoutService};
use crate::domain::services::discount::{Countdown, DiscountQuote, DiscountService};
use crate::domain::services::orders::OrderService;
use crate::domain::value_objects::Price;
use crate::publisher::EventPublisher;
use crate::store::{CartStore, DiscountRuleStore, FavouriteStore, OrderStore, ProductStore};
use crate::{CatalogError, Clock, ShopError};

pub const USER_HEADER: &str = "x-user-id";
pub const ROLE_HEADER: &str = "x-user-role";
pub const ADMIN_ROLE: &str = "admin";

type ApiError = (StatusCode, String);

#[derive(Clone)]
pub struct AppState {
    pub catalog: CatalogService,
    pub discounts: DiscountService,
    pub carts: CartService,
    pub checkout: CheckoutService,
    pub orders: OrderService,
}

impl AppState {
    /// Wires every service onto one backing store.
    pub fn from_store<S>(store: S, publisher: Arc<dyn EventPublisher>, clock: Arc<dyn Clock>, config: &Config) -> Self
    where
        S: ProductStore + DiscountRuleStore + FavouriteStore + CartStore + OrderStore + 'static,
    {
        let store = Arc::new(store);
        let discounts = DiscountService::new(store.clone(), clock.clone());
        Self {
            catalog: CatalogService::new(store.clone(), store.clone(), discounts.clone())
                .with_page_defaults(config.page_defaults),
            carts: CartService::new(store.clone(), store.clone(), discounts.clone()),
            checkout: CheckoutService::new(store.clone(), store.clone(), publisher.clone(), clock, config.whatsapp_number.clone()),
            orders: OrderService::new(store, publisher),
            discounts,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "devicehub-storefront"})) }))
        .route("/api/v1/products", get(list_products))
        .route("/api/v1/products/:id", get(get_product))
        .route("/api/v1/discounts/quote", get(quote_discount))
        .route("/api/v1/cart", get(get_cart).post(add_to_cart).delete(clear_cart))
        .route("/api/v1/cart/items/:option_id", put(set_cart_quantity).delete(remove_cart_item))
        .route("/api/v1/favourites/:product_id", post(toggle_favourite))
        .route("/api/v1/checkout", post(checkout))
        .route("/api/v1/orders", get(list_orders))
        .route("/api/v1/admin/orders", get(list_all_orders))
        .route("/api/v1/admin/orders/:id/status", put(update_order_status))
        .layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()).with_state(state)
}

// =============================================================================
// Errors and identity
// =============================================================================

fn catalog_error(e: CatalogError) -> ApiError {
    let status = match &e {
        CatalogError::InvalidCriteria(_) => StatusCode::BAD_REQUEST,
        CatalogError::NotFound => StatusCode::NOT_FOUND,
        CatalogError::RecordMapping { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        CatalogError::DataUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, e.to_string())
}

fn shop_error(e: ShopError) -> ApiError {
    let status = match &e {
        ShopError::Cart(CartError::ItemNotFound | CartError::UnknownProduct) => StatusCode::NOT_FOUND,
        ShopError::Cart(CartError::ZeroQuantity | CartError::Empty) => StatusCode::BAD_REQUEST,
        ShopError::Cart(CartError::Conflict) => StatusCode::CONFLICT,
        ShopError::Order(OrderError::NotFound) => StatusCode::NOT_FOUND,
        ShopError::Order(OrderError::Terminal(_)) => StatusCode::CONFLICT,
        ShopError::Order(OrderError::NoItems | OrderError::UnknownStatus(_)) => StatusCode::BAD_REQUEST,
        ShopError::DataUnavailable(e) => {
            tracing::error!(error = %e, "store failure");
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (status, e.to_string())
}

fn viewer(headers: &HeaderMap) -> Option<Uuid> {
    headers.get(USER_HEADER)?.to_str().ok()?.parse().ok()
}

fn user_id(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let raw = headers.get(USER_HEADER).ok_or((StatusCode::UNAUTHORIZED, format!("missing {USER_HEADER} header")))?;
    raw.to_str().ok().and_then(|v| v.parse().ok())
        .ok_or((StatusCode::BAD_REQUEST, format!("{USER_HEADER} must be a UUID")))
}

fn require_admin(headers: &HeaderMap) -> Result<(), ApiError> {
    match headers.get(ROLE_HEADER).and_then(|v| v.to_str().ok()) {
        Some(role) if role.eq_ignore_ascii_case(ADMIN_ROLE) => Ok(()),
        _ => Err((StatusCode::FORBIDDEN, "admin role required".to_string())),
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Query string form of `SearchCriteria`. Lists are comma separated.
#[derive(Debug, Default, Deserialize)]
pub struct CatalogParams {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
    pub category: Option<String>,
    pub brand: Option<String>,
    pub condition: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub sort: Option<SortOrder>,
}

impl CatalogParams {
    pub fn into_criteria(self) -> Result<SearchCriteria, CatalogError> {
        Ok(SearchCriteria {
            page: self.page,
            page_size: self.page_size,
            text_query: self.q,
            categories: split_list(self.category.as_deref())?,
            brands: split_list(self.brand.as_deref())?,
            conditions: split_list(self.condition.as_deref())?,
            min_price: decimal("min_price", self.min_price.as_deref())?,
            max_price: decimal("max_price", self.max_price.as_deref())?,
            sort: self.sort.unwrap_or_default(),
        })
    }
}

fn split_list<T: FromStr>(raw: Option<&str>) -> Result<Vec<T>, CatalogError>
where
    T::Err: Display,
{
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.parse().map_err(|e: T::Err| CatalogError::InvalidCriteria(e.to_string())))
        .collect()
}

fn decimal(name: &str, raw: Option<&str>) -> Result<Option<Decimal>, CatalogError> {
    raw.map(|v| v.trim().parse().map_err(|_| CatalogError::InvalidCriteria(format!("{name} is not a number: {v}"))))
        .transpose()
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> { pub data: Vec<T>, pub total: u64, pub page: u32, pub page_size: u32, pub total_pages: u64 }

async fn list_products(State(s): State<AppState>, headers: HeaderMap, Query(p): Query<CatalogParams>) -> Result<Json<PaginatedResponse<ProductSummary>>, ApiError> {
    let criteria = p.into_criteria().map_err(catalog_error)?;
    let page = s.catalog.query_products(&criteria, viewer(&headers)).await.map_err(catalog_error)?;
    let total_pages = page.total_pages();
    Ok(Json(PaginatedResponse { data: page.items, total: page.total_count, page: page.page, page_size: page.page_size, total_pages }))
}

async fn get_product(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>) -> Result<Json<ProductDetail>, ApiError> {
    s.catalog.get_product(id, viewer(&headers)).await.map(Json).map_err(catalog_error)
}

#[derive(Debug, Deserialize)] pub struct QuoteParams { pub price: String }

#[derive(Debug, Serialize)]
pub struct QuoteResponse { pub discount: Option<DiscountQuote>, pub remaining: Option<Countdown> }

async fn quote_discount(State(s): State<AppState>, Query(p): Query<QuoteParams>) -> Result<Json<QuoteResponse>, ApiError> {
    let price = p.price.trim().parse::<Decimal>().ok().and_then(|d| Price::new(d).ok())
        .ok_or((StatusCode::BAD_REQUEST, format!("invalid price: {}", p.price)))?;
    let discount = s.discounts.quote(price).await;
    let remaining = discount.as_ref().map(|q| q.remaining(s.discounts.now()));
    Ok(Json(QuoteResponse { discount, remaining }))
}

#[derive(Debug, Serialize)] pub struct FavouriteResponse { pub product_id: Uuid, pub is_favourite: bool }

async fn toggle_favourite(State(s): State<AppState>, headers: HeaderMap, Path(product_id): Path<Uuid>) -> Result<Json<FavouriteResponse>, ApiError> {
    let user = user_id(&headers)?;
    let is_favourite = s.catalog.toggle_favourite(user, product_id).await.map_err(catalog_error)?;
    Ok(Json(FavouriteResponse { product_id, is_favourite }))
}

// =============================================================================
// Cart, checkout, orders
// =============================================================================

#[derive(Debug, Serialize)]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub subtotal: Price,
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self { Self { subtotal: cart.subtotal(), cart } }
}

#[derive(Debug, Deserialize)] pub struct SetQuantityRequest { pub quantity: u32 }

async fn get_cart(State(s): State<AppState>, headers: HeaderMap) -> Result<Json<CartView>, ApiError> {
    let cart = s.carts.cart(user_id(&headers)?).await.map_err(shop_error)?;
    Ok(Json(cart.into()))
}

async fn add_to_cart(State(s): State<AppState>, headers: HeaderMap, Json(r): Json<AddToCart>) -> Result<(StatusCode, Json<CartView>), ApiError> {
    let cart = s.carts.add(user_id(&headers)?, r).await.map_err(shop_error)?;
    Ok((StatusCode::CREATED, Json(cart.into())))
}

async fn set_cart_quantity(State(s): State<AppState>, headers: HeaderMap, Path(option_id): Path<Uuid>, Json(r): Json<SetQuantityRequest>) -> Result<Json<CartView>, ApiError> {
    let cart = s.carts.set_quantity(user_id(&headers)?, option_id, r.quantity).await.map_err(shop_error)?;
    Ok(Json(cart.into()))
}

async fn remove_cart_item(State(s): State<AppState>, headers: HeaderMap, Path(option_id): Path<Uuid>) -> Result<Json<CartView>, ApiError> {
    let cart = s.carts.remove(user_id(&headers)?, option_id).await.map_err(shop_error)?;
    Ok(Json(cart.into()))
}

async fn clear_cart(State(s): State<AppState>, headers: HeaderMap) -> Result<StatusCode, ApiError> {
    s.carts.clear(user_id(&headers)?).await.map_err(shop_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn checkout(State(s): State<AppState>, headers: HeaderMap) -> Result<(StatusCode, Json<Checkout>), ApiError> {
    let placed = s.checkout.checkout(user_id(&headers)?).await.map_err(shop_error)?;
    Ok((StatusCode::CREATED, Json(placed)))
}

async fn list_orders(State(s): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<Order>>, ApiError> {
    s.orders.orders_of(user_id(&headers)?).await.map(Json).map_err(shop_error)
}

async fn list_all_orders(State(s): State<AppState>, headers: HeaderMap) -> Result<Json<Vec<Order>>, ApiError> {
    require_admin(&headers)?;
    s.orders.all().await.map(Json).map_err(shop_error)
}

#[derive(Debug, Deserialize)] pub struct UpdateStatusRequest { pub status: String }

async fn update_order_status(State(s): State<AppState>, headers: HeaderMap, Path(id): Path<Uuid>, Json(r): Json<UpdateStatusRequest>) -> Result<Json<Order>, ApiError> {
    require_admin(&headers)?;
    let status = r.status.parse::<OrderStatus>().map_err(|e| shop_error(e.into()))?;
    s.orders.update_status(id, status).await.map(Json).map_err(shop_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Brand, Category, Condition, Product, Variant};
    use crate::domain::value_objects::HexColor;
    use crate::publisher::RecordingPublisher;
    use crate::store::MemoryStore;
    use crate::FixedClock;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use chrono::{Duration, TimeZone, Utc};
    use tower::ServiceExt;

    fn config() -> Config {
        Config::from_lookup(|name| (name == "WHATSAPP_NUMBER").then(|| "+15550001111".to_string())).unwrap()
    }

    fn phone(title: &str, brand: Brand, price: u32, days_old: i64) -> Product {
        let now = Utc.with_ymd_and_hms(2026, 4, 1, 0, 0, 0).unwrap();
        Product::create(title, Category::Phones)
            .with_brand(brand)
            .created(now - Duration::days(days_old))
            .with_variant(
                Variant::new(Uuid::nil(), "Graphite", HexColor::new("#333").unwrap())
                    .with_condition(Condition::New)
                    .with_option("128GB", Price::units(price)),
            )
    }

    async fn app() -> (Router, MemoryStore) {
        let store = MemoryStore::new();
        store.add_product(phone("iPhone 14", Brand::Apple, 700, 30)).await;
        store.add_product(phone("Galaxy S23", Brand::Samsung, 650, 10)).await;
        store.add_product(phone("iPhone 15", Brand::Apple, 900, 1)).await;
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 4, 2, 0, 0, 0).unwrap());
        let state = AppState::from_store(store.clone(), Arc::new(RecordingPublisher::new()), Arc::new(clock), &config());
        (router(state), store)
    }

    async fn send(app: &Router, method: Method, uri: &str, user: Option<Uuid>, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        send_as(app, method, uri, user, None, body).await
    }

    async fn send_as(app: &Router, method: Method, uri: &str, user: Option<Uuid>, role: Option<&str>, body: Option<serde_json::Value>) -> (StatusCode, serde_json::Value) {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(user) = user { req = req.header(USER_HEADER, user.to_string()); }
        if let Some(role) = role { req = req.header(ROLE_HEADER, role); }
        let req = match body {
            Some(json) => req.header("content-type", "application/json").body(Body::from(json.to_string())).unwrap(),
            None => req.body(Body::empty()).unwrap(),
        };
        let res = app.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    fn titles(body: &serde_json::Value) -> Vec<String> {
        body["data"].as_array().unwrap().iter().map(|p| p["title"].as_str().unwrap().to_string()).collect()
    }

    #[tokio::test]
    async fn test_list_products_filters_and_sorts() {
        let (app, _) = app().await;
        let (status, body) = send(&app, Method::GET, "/api/v1/products?brand=apple&sort=price-high", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(titles(&body), vec!["iPhone 15", "iPhone 14"]);
        assert_eq!(body["total"], 2);

        let (_, body) = send(&app, Method::GET, "/api/v1/products?page_size=2&page=2", None, None).await;
        assert_eq!(titles(&body), vec!["iPhone 14"]);
        assert_eq!(body["total_pages"], 2);
    }

    #[tokio::test]
    async fn test_invalid_criteria_are_bad_requests() {
        let (app, _) = app().await;
        for uri in [
            "/api/v1/products?category=Tablets",
            "/api/v1/products?min_price=500&max_price=100",
            "/api/v1/products?min_price=cheap",
            "/api/v1/products?page=0",
        ] {
            let (status, _) = send(&app, Method::GET, uri, None, None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        }
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let (app, _) = app().await;
        let (status, _) = send(&app, Method::GET, &format!("/api/v1/products/{}", Uuid::new_v4()), None, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cart_requires_user() {
        let (app, _) = app().await;
        let (status, _) = send(&app, Method::GET, "/api/v1/cart", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_favourite_shows_in_listing() {
        let (app, store) = app().await;
        let user = Uuid::new_v4();
        let id = ProductStore::list(&store, &Default::default(), SortOrder::Newest, crate::domain::services::catalog::PageWindow { page: 1, page_size: 1 })
            .await.unwrap()[0].id;
        let (status, body) = send(&app, Method::POST, &format!("/api/v1/favourites/{id}"), Some(user), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["is_favourite"], true);
        let (_, body) = send(&app, Method::GET, "/api/v1/products?sort=newest", Some(user), None).await;
        assert_eq!(body["data"][0]["is_favourite"], true);
        assert_eq!(body["data"][1]["is_favourite"], false);
    }

    #[tokio::test]
    async fn test_cart_checkout_and_order_tracking() {
        let (app, store) = app().await;
        let user = Uuid::new_v4();
        let products = ProductStore::list(&store, &Default::default(), SortOrder::PriceLow, crate::domain::services::catalog::PageWindow { page: 1, page_size: 1 })
            .await.unwrap();
        let variant = &products[0].variants[0];
        let add = serde_json::json!({
            "product_id": products[0].id, "variant_id": variant.id, "option_id": variant.options[0].id, "quantity": 2,
        });

        let (status, body) = send(&app, Method::POST, "/api/v1/cart", Some(user), Some(add)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["subtotal"].as_str().unwrap().parse::<Decimal>().unwrap(), Decimal::from(1300));

        let (status, body) = send(&app, Method::POST, "/api/v1/checkout", Some(user), None).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["whatsapp_url"].as_str().unwrap().starts_with("https://wa.me/15550001111?text="));
        let order_id = body["order"]["id"].as_str().unwrap().to_string();

        let (status, _) = send(&app, Method::POST, "/api/v1/checkout", Some(user), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = send(&app, Method::GET, "/api/v1/orders", Some(user), None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let uri = format!("/api/v1/admin/orders/{order_id}/status");
        let admin = Some(ADMIN_ROLE);
        let (status, body) = send_as(&app, Method::PUT, &uri, None, admin, Some(serde_json::json!({"status": "cancelled"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Cancelled");
        let (status, _) = send_as(&app, Method::PUT, &uri, None, admin, Some(serde_json::json!({"status": "shipped"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, _) = send_as(&app, Method::PUT, &uri, None, admin, Some(serde_json::json!({"status": "lost"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let (status, body) = send_as(&app, Method::GET, "/api/v1/admin/orders", None, admin, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_admin_routes_reject_non_admins() {
        let (app, _) = app().await;
        let user = Uuid::new_v4();
        let uri = format!("/api/v1/admin/orders/{}/status", Uuid::new_v4());
        let change = serde_json::json!({"status": "shipped"});
        for role in [None, Some("customer")] {
            let (status, _) = send_as(&app, Method::GET, "/api/v1/admin/orders", Some(user), role, None).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
            let (status, _) = send_as(&app, Method::PUT, &uri, Some(user), role, Some(change.clone())).await;
            assert_eq!(status, StatusCode::FORBIDDEN);
        }
    }

    #[test]
    fn test_cart_conflict_is_409() {
        assert_eq!(shop_error(CartError::Conflict.into()).0, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_discount_quote_without_rules() {
        let (app, _) = app().await;
        let (status, body) = send(&app, Method::GET, "/api/v1/discounts/quote?price=150", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["discount"].is_null());
        let (status, _) = send(&app, Method::GET, "/api/v1/discounts/quote?price=-1", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockhold_audit::ObjectType;
use stockhold_core::{
    DomainError, DomainResult, Entity, Money, OrderId, ProductId, ReservationId, UserId,
};
use stockhold_infra::{AuditQuery, Cursor, OrderFilter, OrderQuery, OrderSort, Page};
use stockhold_inventory::{Product, Reservation};
use stockhold_sales::{Order, OrderStatus};

// -------------------------
// Request DTOs
// -------------------------
//
// Only client-settable fields are declared; anything else in the body
// (ids, totals, timestamps, expiry) is ignored.

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub product: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReservationRequest {
    pub quantity: u32,
}

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    pub product: ProductId,
    pub quantity: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateOrderRequest {
    pub quantity: Option<u32>,
    pub status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CursorParams {
    pub cursor: Option<String>,
}

impl CursorParams {
    pub fn cursor(&self) -> DomainResult<Option<Cursor>> {
        parse_cursor(self.cursor.as_deref())
    }
}

/// `GET /orders` query string. Values arrive as strings so malformed input
/// becomes a JSON validation error.
#[derive(Debug, Default, Deserialize)]
pub struct OrderListParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    pub min_total: Option<String>,
    pub max_total: Option<String>,
    pub sort: Option<String>,
    pub cursor: Option<String>,
}

impl OrderListParams {
    pub fn to_query(&self) -> DomainResult<OrderQuery> {
        let filter = OrderFilter {
            start_date: parse_opt(self.start_date.as_deref(), parse_date)?,
            end_date: parse_opt(self.end_date.as_deref(), parse_date)?,
            status: parse_opt(self.status.as_deref(), str::parse::<OrderStatus>)?,
            min_total: parse_opt(self.min_total.as_deref(), str::parse::<Money>)?,
            max_total: parse_opt(self.max_total.as_deref(), str::parse::<Money>)?,
        };
        let sort = OrderSort::parse_lenient(self.sort.as_deref());
        OrderQuery::new(filter, sort).resume(parse_cursor(self.cursor.as_deref())?.as_ref())
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditListParams {
    pub object_type: Option<String>,
    pub object_id: Option<String>,
    pub action: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cursor: Option<String>,
}

impl AuditListParams {
    pub fn to_query(&self) -> DomainResult<AuditQuery> {
        let query = AuditQuery {
            object_type: parse_opt(self.object_type.as_deref(), str::parse::<ObjectType>)?,
            object_id: parse_opt(self.object_id.as_deref(), |s| {
                s.parse::<uuid::Uuid>()
                    .map_err(|_| DomainError::validation("object_id must be a UUID"))
            })?,
            action: self
                .action
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(str::to_string),
            from: parse_opt(self.from.as_deref(), parse_timestamp)?,
            to: parse_opt(self.to.as_deref(), parse_timestamp)?,
            after: None,
        };
        query.resume(parse_cursor(self.cursor.as_deref())?.as_ref())
    }
}

/// Empty strings count as absent, like an unset query parameter.
fn parse_opt<T>(
    raw: Option<&str>,
    parse: impl FnOnce(&str) -> DomainResult<T>,
) -> DomainResult<Option<T>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => parse(s).map(Some),
        None => Ok(None),
    }
}

fn parse_cursor(raw: Option<&str>) -> DomainResult<Option<Cursor>> {
    parse_opt(raw, str::parse::<Cursor>)
}

fn parse_date(s: &str) -> DomainResult<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|_| DomainError::validation(format!("invalid date '{s}' (expected YYYY-MM-DD)")))
}

fn parse_timestamp(s: &str) -> DomainResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|_| DomainError::validation(format!("invalid timestamp '{s}' (expected RFC 3339)")))
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct PageResponse<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

impl<T> PageResponse<T> {
    pub fn from_page<U>(page: Page<U>, f: impl FnMut(U) -> T) -> Self {
        Self {
            items: page.items.into_iter().map(f).collect(),
            next_cursor: page.next_cursor.map(|c| c.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub total_stock: u32,
    pub available_stock: u32,
    pub reserved_stock: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Product> for ProductResponse {
    fn from(p: Product) -> Self {
        let stock = p.stock();
        Self {
            id: *p.id(),
            name: p.name().to_string(),
            price: p.price(),
            total_stock: stock.total(),
            available_stock: stock.available(),
            reserved_stock: stock.reserved(),
            created_at: p.created_at(),
            updated_at: p.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReservationResponse {
    pub id: ReservationId,
    pub user: Option<UserId>,
    pub product: ProductId,
    pub quantity: u32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Reservation> for ReservationResponse {
    fn from(r: Reservation) -> Self {
        Self {
            id: *r.id(),
            user: r.user_id(),
            product: r.product_id(),
            quantity: r.quantity(),
            expires_at: r.expires_at(),
            created_at: r.created_at(),
            updated_at: r.updated_at(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user: Option<UserId>,
    pub product: ProductId,
    pub quantity: u32,
    pub total: Money,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(o: Order) -> Self {
        Self {
            id: *o.id(),
            user: o.user_id(),
            product: o.product_id(),
            quantity: o.quantity(),
            total: o.total(),
            status: o.status(),
            created_at: o.created_at(),
            updated_at: o.updated_at(),
        }
    }
}

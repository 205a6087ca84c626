//! Listing queries: filters, sort orders and opaque cursors.
//!
//! Every listing is cursor-paginated with a fixed page size. A cursor records
//! the sort key of the last item served, so pages stay stable while rows are
//! inserted, and it is bound to the listing (and sort) that issued it.

use core::cmp::Ordering;
use core::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockhold_audit::{AuditEntry, ObjectType};
use stockhold_core::{DomainError, DomainResult, Entity, Money};
use stockhold_inventory::{Product, Reservation};
use stockhold_sales::{Order, OrderStatus};

pub const PAGE_SIZE: usize = 10;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    /// Build a page from up to `PAGE_SIZE + 1` rows already in listing order.
    /// The extra row only signals that another page exists.
    pub fn from_overfetch(mut rows: Vec<T>, cursor_of: impl Fn(&T) -> Cursor) -> Self {
        let next_cursor = if rows.len() > PAGE_SIZE {
            rows.truncate(PAGE_SIZE);
            rows.last().map(cursor_of)
        } else {
            None
        };
        Self {
            items: rows,
            next_cursor,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Order listing sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSort {
    /// Oldest first.
    #[default]
    Chronological,
    Newest,
    HighestValue,
}

impl OrderSort {
    /// Unknown or empty values fall back to chronological order.
    pub fn parse_lenient(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("newest") => OrderSort::Newest,
            Some(v) if v.eq_ignore_ascii_case("highest_value") => OrderSort::HighestValue,
            _ => OrderSort::Chronological,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderSort::Chronological => "chronological",
            OrderSort::Newest => "newest",
            OrderSort::HighestValue => "highest_value",
        }
    }

    /// SQL `ORDER BY` clause matching [`OrderKey::compare`].
    pub(crate) fn order_by(self) -> &'static str {
        match self {
            OrderSort::Chronological => "created_at ASC, id ASC",
            OrderSort::Newest => "created_at DESC, id DESC",
            OrderSort::HighestValue => "total DESC, id ASC",
        }
    }
}

/// Sort key of an order row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderKey {
    pub created_at: DateTime<Utc>,
    pub total: Decimal,
    pub id: Uuid,
}

impl OrderKey {
    pub fn of(order: &Order) -> Self {
        Self {
            created_at: order.created_at(),
            total: order.total().amount(),
            id: *order.id().as_uuid(),
        }
    }

    /// Listing order under `sort`; the id breaks ties.
    pub fn compare(&self, other: &Self, sort: OrderSort) -> Ordering {
        match sort {
            OrderSort::Chronological => (self.created_at, self.id).cmp(&(other.created_at, other.id)),
            OrderSort::Newest => (other.created_at, other.id).cmp(&(self.created_at, self.id)),
            OrderSort::HighestValue => other
                .total
                .cmp(&self.total)
                .then_with(|| self.id.cmp(&other.id)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
enum Position {
    Products { after: Uuid },
    Reservations { after: Uuid },
    Orders { sort: OrderSort, key: OrderKey },
    Audit { timestamp: DateTime<Utc>, id: Uuid },
}

/// Opaque continuation token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cursor(Position);

impl Cursor {
    pub fn after_product(product: &Product) -> Self {
        Self(Position::Products {
            after: *product.id().as_uuid(),
        })
    }

    pub fn after_reservation(reservation: &Reservation) -> Self {
        Self(Position::Reservations {
            after: *reservation.id().as_uuid(),
        })
    }

    pub fn after_order(order: &Order, sort: OrderSort) -> Self {
        Self(Position::Orders {
            sort,
            key: OrderKey::of(order),
        })
    }

    pub fn after_audit(entry: &AuditEntry) -> Self {
        Self(Position::Audit {
            timestamp: entry.timestamp(),
            id: *entry.id().as_uuid(),
        })
    }
}

impl core::fmt::Display for Cursor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let json = serde_json::to_vec(&self.0).map_err(|_| core::fmt::Error)?;
        f.write_str(&URL_SAFE_NO_PAD.encode(json))
    }
}

impl FromStr for Cursor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s.trim())
            .map_err(|_| DomainError::validation("malformed cursor"))?;
        let position =
            serde_json::from_slice(&bytes).map_err(|_| DomainError::validation("malformed cursor"))?;
        Ok(Self(position))
    }
}

fn foreign_cursor() -> DomainError {
    DomainError::validation("cursor was issued for a different listing")
}

/// Id-ordered listing (products, reservations).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub after: Option<Uuid>,
}

impl PageRequest {
    pub fn first() -> Self {
        Self::default()
    }

    pub fn products(cursor: Option<&Cursor>) -> DomainResult<Self> {
        match cursor.map(|c| &c.0) {
            None => Ok(Self::first()),
            Some(Position::Products { after }) => Ok(Self {
                after: Some(*after),
            }),
            Some(_) => Err(foreign_cursor()),
        }
    }

    pub fn reservations(cursor: Option<&Cursor>) -> DomainResult<Self> {
        match cursor.map(|c| &c.0) {
            None => Ok(Self::first()),
            Some(Position::Reservations { after }) => Ok(Self {
                after: Some(*after),
            }),
            Some(_) => Err(foreign_cursor()),
        }
    }
}

/// Order listing filters. Date bounds are inclusive calendar days (UTC).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<OrderStatus>,
    pub min_total: Option<Money>,
    pub max_total: Option<Money>,
}

impl OrderFilter {
    /// `[lower, upper)` creation-time bounds derived from the calendar dates.
    pub fn created_range(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        let lower = self.start_date.map(start_of_day);
        let upper = self
            .end_date
            .and_then(|d| d.checked_add_days(Days::new(1)))
            .map(start_of_day);
        (lower, upper)
    }

    pub fn matches(&self, order: &Order) -> bool {
        let (lower, upper) = self.created_range();
        lower.is_none_or(|l| order.created_at() >= l)
            && upper.is_none_or(|u| order.created_at() < u)
            && self.status.is_none_or(|s| order.status() == s)
            && self.min_total.is_none_or(|m| order.total() >= m)
            && self.max_total.is_none_or(|m| order.total() <= m)
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderQuery {
    pub filter: OrderFilter,
    pub sort: OrderSort,
    pub after: Option<OrderKey>,
}

impl OrderQuery {
    pub fn new(filter: OrderFilter, sort: OrderSort) -> Self {
        Self {
            filter,
            sort,
            after: None,
        }
    }

    /// Continue after `cursor`, which must come from an order listing with the same sort.
    pub fn resume(mut self, cursor: Option<&Cursor>) -> DomainResult<Self> {
        match cursor.map(|c| &c.0) {
            None => {}
            Some(Position::Orders { sort, key }) if *sort == self.sort => self.after = Some(*key),
            Some(_) => return Err(foreign_cursor()),
        }
        Ok(self)
    }

    /// Whether `order` belongs on a page of this query (filters + cursor).
    pub fn admits(&self, order: &Order) -> bool {
        self.filter.matches(order)
            && self
                .after
                .is_none_or(|a| OrderKey::of(order).compare(&a, self.sort) == Ordering::Greater)
    }
}

/// Audit listing filters; results are chronological.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    pub object_type: Option<ObjectType>,
    pub object_id: Option<Uuid>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub after: Option<(DateTime<Utc>, Uuid)>,
}

impl AuditQuery {
    pub fn resume(mut self, cursor: Option<&Cursor>) -> DomainResult<Self> {
        match cursor.map(|c| &c.0) {
            None => {}
            Some(Position::Audit { timestamp, id }) => self.after = Some((*timestamp, *id)),
            Some(_) => return Err(foreign_cursor()),
        }
        Ok(self)
    }

    pub fn admits(&self, entry: &AuditEntry) -> bool {
        self.object_type.is_none_or(|t| entry.object_type() == t.as_str())
            && self.object_id.is_none_or(|id| entry.object_id() == id)
            && self.action.as_deref().is_none_or(|a| entry.action() == a)
            && self.from.is_none_or(|f| entry.timestamp() >= f)
            && self.to.is_none_or(|t| entry.timestamp() <= t)
            && self
                .after
                .is_none_or(|a| (entry.timestamp(), *entry.id().as_uuid()) > a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockhold_core::ProductId;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn order(created: &str, qty: u32) -> Order {
        Order::place(ProductId::new(), None, qty, Money::from_minor(1000), at(created)).unwrap()
    }

    #[test]
    fn cursor_round_trips_through_its_string_form() {
        let o = order("2024-03-01T12:00:00Z", 2);
        let cursor = Cursor::after_order(&o, OrderSort::HighestValue);
        let parsed: Cursor = cursor.to_string().parse().unwrap();
        assert_eq!(parsed, cursor);
    }

    #[test]
    fn malformed_cursor_is_a_validation_error() {
        let err = "%%%".parse::<Cursor>().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        let err = URL_SAFE_NO_PAD.encode(b"{}").parse::<Cursor>().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn cursor_is_bound_to_its_sort() {
        let o = order("2024-03-01T12:00:00Z", 2);
        let cursor = Cursor::after_order(&o, OrderSort::Newest);
        let q = OrderQuery::new(OrderFilter::default(), OrderSort::Chronological);
        assert!(q.clone().resume(Some(&cursor)).is_err());
        assert!(PageRequest::products(Some(&cursor)).is_err());

        let q = OrderQuery::new(OrderFilter::default(), OrderSort::Newest);
        assert!(q.resume(Some(&cursor)).is_ok());
    }

    #[test]
    fn date_bounds_are_inclusive_days() {
        let filter = OrderFilter {
            start_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            ..OrderFilter::default()
        };
        assert!(filter.matches(&order("2024-03-01T00:00:00Z", 1)));
        assert!(filter.matches(&order("2024-03-01T23:59:59Z", 1)));
        assert!(!filter.matches(&order("2024-03-02T00:00:00Z", 1)));
        assert!(!filter.matches(&order("2024-02-29T23:59:59Z", 1)));
    }

    #[test]
    fn total_bounds_and_status() {
        let filter = OrderFilter {
            min_total: Some(Money::from_minor(2000)),
            max_total: Some(Money::from_minor(3000)),
            status: Some(OrderStatus::Pending),
            ..OrderFilter::default()
        };
        assert!(!filter.matches(&order("2024-03-01T12:00:00Z", 1)));
        assert!(filter.matches(&order("2024-03-01T12:00:00Z", 2)));
        assert!(filter.matches(&order("2024-03-01T12:00:00Z", 3)));
        assert!(!filter.matches(&order("2024-03-01T12:00:00Z", 4)));
    }

    #[test]
    fn highest_value_breaks_ties_by_id() {
        let a = order("2024-03-01T12:00:00Z", 2);
        let b = order("2024-03-01T12:00:00Z", 2);
        let c = order("2024-03-01T12:00:00Z", 5);
        let (ka, kb, kc) = (OrderKey::of(&a), OrderKey::of(&b), OrderKey::of(&c));
        assert_eq!(kc.compare(&ka, OrderSort::HighestValue), Ordering::Less);
        assert_eq!(
            ka.compare(&kb, OrderSort::HighestValue),
            ka.id.cmp(&kb.id)
        );
    }

    #[test]
    fn unknown_sort_falls_back_to_chronological() {
        assert_eq!(OrderSort::parse_lenient(Some("NEWEST")), OrderSort::Newest);
        assert_eq!(OrderSort::parse_lenient(Some("cheapest")), OrderSort::Chronological);
        assert_eq!(OrderSort::parse_lenient(None), OrderSort::Chronological);
    }

    #[test]
    fn overfetch_yields_cursor_only_when_more_rows_exist() {
        let rows: Vec<Order> = (0..11).map(|_| order("2024-03-01T12:00:00Z", 1)).collect();
        let page = Page::from_overfetch(rows, |o| Cursor::after_order(o, OrderSort::Chronological));
        assert_eq!(page.items.len(), PAGE_SIZE);
        assert_eq!(
            page.next_cursor,
            Some(Cursor::after_order(&page.items[9], OrderSort::Chronological))
        );

        let rows: Vec<Order> = (0..10).map(|_| order("2024-03-01T12:00:00Z", 1)).collect();
        let page = Page::from_overfetch(rows, |o| Cursor::after_order(o, OrderSort::Chronological));
        assert!(page.next_cursor.is_none());
    }

    fn paginate(orders: &[Order], sort: OrderSort) -> Vec<Order> {
        let mut seen = Vec::new();
        let mut cursor: Option<Cursor> = None;
        loop {
            let query = OrderQuery::new(OrderFilter::default(), sort)
                .resume(cursor.as_ref())
                .unwrap();
            let mut rows: Vec<Order> = orders.iter().filter(|o| query.admits(o)).cloned().collect();
            rows.sort_by(|a, b| OrderKey::of(a).compare(&OrderKey::of(b), sort));
            rows.truncate(PAGE_SIZE + 1);
            let page = Page::from_overfetch(rows, |o| Cursor::after_order(o, sort));
            seen.extend(page.items);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return seen,
            }
        }
    }

    proptest::proptest! {
        #[test]
        fn pages_visit_every_order_once_in_sort_order(
            rows in proptest::collection::vec((0i64..5, 1u32..4), 0..40),
            sort_idx in 0usize..3,
        ) {
            let sort = [OrderSort::Chronological, OrderSort::Newest, OrderSort::HighestValue][sort_idx];
            let base = at("2024-03-01T12:00:00Z");
            let orders: Vec<Order> = rows
                .iter()
                .map(|(minutes, qty)| {
                    Order::place(
                        ProductId::new(),
                        None,
                        *qty,
                        Money::from_minor(1000),
                        base + chrono::Duration::minutes(*minutes),
                    )
                    .unwrap()
                })
                .collect();

            let paged = paginate(&orders, sort);
            let mut expected = orders.clone();
            expected.sort_by(|a, b| OrderKey::of(a).compare(&OrderKey::of(b), sort));
            proptest::prop_assert_eq!(paged, expected);
        }
    }
}

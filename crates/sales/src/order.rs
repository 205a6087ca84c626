use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockhold_core::{DomainError, DomainResult, Entity, Money, OrderId, ProductId, UserId};

/// Order status lifecycle.
///
/// ```text
/// pending ──► confirmed ──► processing ──► shipped ──► delivered
///    │            │
///    └────────────┴──► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    /// Statuses reachable in one step from `self`.
    pub fn next_statuses(self) -> &'static [OrderStatus] {
        use OrderStatus::*;
        match self {
            Pending => &[Confirmed, Cancelled],
            Confirmed => &[Processing, Cancelled],
            Processing => &[Shipped],
            Shipped => &[Delivered],
            Delivered | Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, requested: OrderStatus) -> bool {
        self.next_statuses().contains(&requested)
    }

    pub fn is_terminal(self) -> bool {
        self.next_statuses().is_empty()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for OrderStatus {
    type Err = DomainError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        OrderStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| DomainError::validation(format!("unknown order status '{s}'")))
    }
}

/// Pure membership test against the transition table.
pub fn can_transition(current: OrderStatus, requested: OrderStatus) -> bool {
    current.can_transition_to(requested)
}

/// Outcome of a successful status transition (audit payload source).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusChange {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

impl StatusChange {
    pub fn old_value(&self) -> serde_json::Value {
        serde_json::json!({ "status": self.from })
    }

    pub fn new_value(&self) -> serde_json::Value {
        serde_json::json!({ "status": self.to })
    }
}

/// Order totals carry at most this many digits, two of them after the point.
pub const TOTAL_MAX_DIGITS: u32 = 14;

/// Entity: Order.
///
/// `total` is derived (`quantity × unit price`) and only ever written by
/// [`Order::reprice`]; there is no setter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    user_id: Option<UserId>,
    product_id: ProductId,
    quantity: u32,
    total: Money,
    status: OrderStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Order {
    /// Place a new `pending` order priced at `unit_price`.
    pub fn place(
        product_id: ProductId,
        user_id: Option<UserId>,
        quantity: u32,
        unit_price: Money,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        validate_quantity(quantity)?;
        Ok(Self {
            id: OrderId::new(),
            user_id,
            product_id,
            quantity,
            total: line_total(unit_price, quantity)?,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild an order from persisted state.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: OrderId,
        user_id: Option<UserId>,
        product_id: ProductId,
        quantity: u32,
        total: Money,
        status: OrderStatus,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            product_id,
            quantity,
            total,
            status,
            created_at,
            updated_at,
        }
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn total(&self) -> Money {
        self.total
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn can_transition_to(&self, requested: OrderStatus) -> bool {
        self.status.can_transition_to(requested)
    }

    /// Move to `requested`, or fail with `InvalidTransition` leaving status unchanged.
    pub fn apply_transition(
        &mut self,
        requested: OrderStatus,
        now: DateTime<Utc>,
    ) -> DomainResult<StatusChange> {
        if !self.can_transition_to(requested) {
            return Err(DomainError::invalid_transition(self.status, requested));
        }
        let change = StatusChange {
            from: self.status,
            to: requested,
        };
        self.status = requested;
        self.updated_at = now;
        Ok(change)
    }

    pub fn set_quantity(&mut self, quantity: u32, now: DateTime<Utc>) -> DomainResult<()> {
        validate_quantity(quantity)?;
        self.quantity = quantity;
        self.updated_at = now;
        Ok(())
    }

    /// Recompute `total` from the product's current price. Runs on every save.
    ///
    /// A total too wide to store is a validation error and leaves the order as is.
    pub fn reprice(&mut self, unit_price: Money) -> DomainResult<()> {
        self.total = line_total(unit_price, self.quantity)?;
        Ok(())
    }
}

impl Entity for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn line_total(unit_price: Money, quantity: u32) -> DomainResult<Money> {
    unit_price
        .times(quantity)?
        .within_digits(TOTAL_MAX_DIGITS, "total")
}

fn validate_quantity(quantity: u32) -> DomainResult<()> {
    if quantity == 0 {
        return Err(DomainError::validation("quantity must be positive"));
    }
    Ok(())
}

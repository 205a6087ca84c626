use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use stockhold_core::{AuditEntryId, DomainError};

use crate::actor::Actor;

/// Kind of entity an entry describes.
///
/// Entries reference their subject by `(object_type, object_id)` only, with no
/// foreign key, so history survives deletion of the subject (e.g. reclaimed
/// reservations).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Product,
    Reservation,
    Order,
}

impl ObjectType {
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Product => "Product",
            ObjectType::Reservation => "Reservation",
            ObjectType::Order => "Order",
        }
    }
}

impl core::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for ObjectType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [ObjectType::Product, ObjectType::Reservation, ObjectType::Order]
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("unknown object type '{s}'")))
    }
}

/// Event tags written by the workflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    StockAdjusted,
    ReservationCreated,
    ReservationUpdated,
    ReservationExpired,
    OrderCreated,
    OrderUpdated,
    OrderStatusChanged,
    ProductCreated,
    ProductUpdated,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::StockAdjusted => "stock_adjusted",
            AuditAction::ReservationCreated => "reservation_created",
            AuditAction::ReservationUpdated => "reservation_updated",
            AuditAction::ReservationExpired => "reservation_expired",
            AuditAction::OrderCreated => "order_created",
            AuditAction::OrderUpdated => "order_updated",
            AuditAction::OrderStatusChanged => "order_status_changed",
            AuditAction::ProductCreated => "product_created",
            AuditAction::ProductUpdated => "product_updated",
        }
    }
}

impl core::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable audit record.
///
/// `action` and `object_type` are stored as free-form strings: the trail may
/// contain tags this build does not know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    id: AuditEntryId,
    actor: String,
    action: String,
    object_type: String,
    object_id: Uuid,
    old_value: Option<JsonValue>,
    new_value: Option<JsonValue>,
    timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor: &Actor,
        action: AuditAction,
        object_type: ObjectType,
        object_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: AuditEntryId::new(),
            actor: actor.as_str().to_string(),
            action: action.as_str().to_string(),
            object_type: object_type.as_str().to_string(),
            object_id,
            old_value: None,
            new_value: None,
            timestamp,
        }
    }

    pub fn with_old(mut self, value: JsonValue) -> Self {
        self.old_value = Some(value);
        self
    }

    pub fn with_new(mut self, value: JsonValue) -> Self {
        self.new_value = Some(value);
        self
    }

    /// Rebuild an entry from persisted state.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: AuditEntryId,
        actor: String,
        action: String,
        object_type: String,
        object_id: Uuid,
        old_value: Option<JsonValue>,
        new_value: Option<JsonValue>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            actor,
            action,
            object_type,
            object_id,
            old_value,
            new_value,
            timestamp,
        }
    }

    pub fn id(&self) -> AuditEntryId {
        self.id
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    pub fn object_id(&self) -> Uuid {
        self.object_id
    }

    pub fn old_value(&self) -> Option<&JsonValue> {
        self.old_value.as_ref()
    }

    pub fn new_value(&self) -> Option<&JsonValue> {
        self.new_value.as_ref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn is_action(&self, action: AuditAction) -> bool {
        self.action == action.as_str()
    }
}

//! Builds audit entries for one unit of work.

use chrono::{DateTime, Utc};
use serde_json::json;

use stockhold_core::{Entity, Money, Principal, ProductId};
use stockhold_inventory::{Product, Reservation, StockAdjustment};
use stockhold_sales::{Order, StatusChange};

use crate::actor::Actor;
use crate::entry::{AuditAction, AuditEntry, ObjectType};

/// Produces the entries a workflow appends alongside its mutations.
///
/// One recorder is created per unit of work so every entry shares the same
/// actor and timestamp.
#[derive(Debug, Clone)]
pub struct AuditRecorder {
    actor: Actor,
    at: DateTime<Utc>,
}

impl AuditRecorder {
    pub fn new(actor: Actor, at: DateTime<Utc>) -> Self {
        Self { actor, at }
    }

    pub fn for_principal(principal: Option<&Principal>, at: DateTime<Utc>) -> Self {
        Self::new(Actor::from_principal(principal), at)
    }

    /// Recorder for automated operations (reclamation).
    pub fn system(at: DateTime<Utc>) -> Self {
        Self::new(Actor::System, at)
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn record(&self, action: AuditAction, object_type: ObjectType, object_id: uuid::Uuid) -> AuditEntry {
        AuditEntry::new(&self.actor, action, object_type, object_id, self.at)
    }

    pub fn stock_adjusted(&self, product_id: ProductId, adjustment: &StockAdjustment) -> AuditEntry {
        self.record(AuditAction::StockAdjusted, ObjectType::Product, product_id.into())
            .with_old(adjustment.before.snapshot())
            .with_new(adjustment.after.snapshot())
    }

    pub fn reservation_created(&self, reservation: &Reservation, product_name: &str) -> AuditEntry {
        self.record(
            AuditAction::ReservationCreated,
            ObjectType::Reservation,
            (*reservation.id()).into(),
        )
        .with_new(json!({
            "product": product_name,
            "quantity": reservation.quantity(),
        }))
    }

    pub fn reservation_updated(&self, reservation: &Reservation, old_quantity: u32) -> AuditEntry {
        self.record(
            AuditAction::ReservationUpdated,
            ObjectType::Reservation,
            (*reservation.id()).into(),
        )
        .with_old(json!({ "quantity": old_quantity }))
        .with_new(json!({ "quantity": reservation.quantity() }))
    }

    pub fn reservation_expired(&self, reservation: &Reservation) -> AuditEntry {
        self.record(
            AuditAction::ReservationExpired,
            ObjectType::Reservation,
            (*reservation.id()).into(),
        )
        .with_old(json!({ "status": "active" }))
        .with_new(json!({ "status": "expired" }))
    }

    pub fn order_created(&self, order: &Order, product_name: &str) -> AuditEntry {
        self.record(AuditAction::OrderCreated, ObjectType::Order, (*order.id()).into())
            .with_new(json!({
                "product": product_name,
                "quantity": order.quantity(),
                "total": order.total(),
            }))
    }

    pub fn order_updated(&self, order: &Order, old_quantity: u32, old_total: Money) -> AuditEntry {
        self.record(AuditAction::OrderUpdated, ObjectType::Order, (*order.id()).into())
            .with_old(json!({ "quantity": old_quantity, "total": old_total }))
            .with_new(json!({ "quantity": order.quantity(), "total": order.total() }))
    }

    pub fn order_status_changed(&self, order: &Order, change: StatusChange) -> AuditEntry {
        self.record(AuditAction::OrderStatusChanged, ObjectType::Order, (*order.id()).into())
            .with_old(change.old_value())
            .with_new(change.new_value())
    }

    pub fn product_created(&self, product: &Product) -> AuditEntry {
        self.record(AuditAction::ProductCreated, ObjectType::Product, (*product.id()).into())
            .with_new(product.snapshot())
    }

    pub fn product_updated(&self, before: &Product, after: &Product) -> AuditEntry {
        self.record(AuditAction::ProductUpdated, ObjectType::Product, (*after.id()).into())
            .with_old(before.snapshot())
            .with_new(after.snapshot())
    }
}

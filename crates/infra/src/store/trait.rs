use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockhold_audit::AuditEntry;
use stockhold_core::{OrderId, ProductId, ReservationId};
use stockhold_inventory::{Product, Reservation};
use stockhold_sales::Order;

use crate::query::{AuditQuery, OrderQuery, Page, PageRequest};

/// Storage operation error.
///
/// These are **infrastructure errors** (locking, connectivity, persisted-state
/// integrity) as opposed to domain errors (validation, stock, lifecycle).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A row lock could not be acquired within the configured lock timeout.
    #[error("lock wait timed out: {0}")]
    LockTimeout(String),

    /// The backing store could not be reached or the connection failed.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A row with the same identifier already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A persisted row could not be turned back into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// A storage-level constraint rejected the write.
    #[error("constraint violated: {0}")]
    Constraint(String),
}

/// Transactional inventory store.
///
/// Reads on the store itself see committed state only. All writes go through a
/// [`StoreTransaction`], which is the unit of atomicity: everything written
/// through it (rows and audit entries alike) becomes visible on `commit` or not
/// at all.
///
/// Row locks are exclusive and pessimistic. `lock_product` / `lock_order` block
/// until the row is free or the store's lock timeout elapses
/// ([`StoreError::LockTimeout`]). Locks are held until the transaction ends.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn products(&self, page: PageRequest) -> Result<Page<Product>, StoreError>;

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    async fn reservations(&self, page: PageRequest) -> Result<Page<Reservation>, StoreError>;

    /// Reservations with `expires_at < now`, oldest expiry first, at most `limit`.
    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError>;

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError>;

    async fn audit_entries(&self, query: &AuditQuery) -> Result<Page<AuditEntry>, StoreError>;
}

/// One unit of work.
///
/// Dropping a transaction without calling [`commit`](StoreTransaction::commit)
/// rolls it back and releases its locks.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Load a product and hold its row lock until the transaction ends.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    /// Read a product without locking it.
    async fn product(&mut self, id: ProductId) -> Result<Option<Product>, StoreError>;

    async fn insert_product(&mut self, product: &Product) -> Result<(), StoreError>;

    /// Persist a product whose row lock this transaction holds.
    async fn update_product(&mut self, product: &Product) -> Result<(), StoreError>;

    async fn reservation(&mut self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    async fn insert_reservation(&mut self, reservation: &Reservation) -> Result<(), StoreError>;

    async fn update_reservation(&mut self, reservation: &Reservation) -> Result<(), StoreError>;

    /// Returns whether a row was deleted.
    async fn delete_reservation(&mut self, id: ReservationId) -> Result<bool, StoreError>;

    /// Load an order and hold its row lock until the transaction ends.
    async fn lock_order(&mut self, id: OrderId) -> Result<Option<Order>, StoreError>;

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError>;

    /// Persist an order whose row lock this transaction holds.
    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError>;

    async fn append_audit(&mut self, entry: &AuditEntry) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> InventoryStore for Arc<S>
where
    S: InventoryStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        (**self).begin().await
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>, StoreError> {
        (**self).product(id).await
    }

    async fn products(&self, page: PageRequest) -> Result<Page<Product>, StoreError> {
        (**self).products(page).await
    }

    async fn reservation(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        (**self).reservation(id).await
    }

    async fn reservations(&self, page: PageRequest) -> Result<Page<Reservation>, StoreError> {
        (**self).reservations(page).await
    }

    async fn expired_reservations(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reservation>, StoreError> {
        (**self).expired_reservations(now, limit).await
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>, StoreError> {
        (**self).order(id).await
    }

    async fn orders(&self, query: &OrderQuery) -> Result<Page<Order>, StoreError> {
        (**self).orders(query).await
    }

    async fn audit_entries(&self, query: &AuditQuery) -> Result<Page<AuditEntry>, StoreError> {
        (**self).audit_entries(query).await
    }
}

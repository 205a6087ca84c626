//! Order placement and the order edit path (quantity, status, repricing).

use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use stockhold_audit::{AuditEntry, AuditRecorder};
use stockhold_core::{Entity, OrderId, Principal, ProductId};
use stockhold_sales::{Order, OrderStatus};

use crate::error::{WorkflowError, WorkflowResult};
use crate::store::InventoryStore;

/// Partial edit of an order. Absent fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct OrderPatch {
    pub quantity: Option<u32>,
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Clone)]
pub struct OrderService<S> {
    store: S,
}

impl<S: InventoryStore> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Place a `pending` order priced from the product's current price.
    ///
    /// Orders do not move stock; reservations are the only ledger consumer.
    #[instrument(skip(self, principal))]
    pub async fn place_order(
        &self,
        product_id: ProductId,
        principal: Option<&Principal>,
        quantity: u32,
    ) -> WorkflowResult<Order> {
        let now = Utc::now();
        let recorder = AuditRecorder::for_principal(principal, now);

        let mut tx = self.store.begin().await?;
        let product = tx
            .product(product_id)
            .await?
            .ok_or(WorkflowError::ProductNotFound(product_id))?;

        let order = Order::place(
            product_id,
            principal.map(Principal::user_id),
            quantity,
            product.price(),
            now,
        )?;
        tx.insert_order(&order).await?;
        tx.append_audit(&recorder.order_created(&order, product.name()))
            .await?;
        tx.commit().await?;

        info!(order_id = %order.id(), total = %order.total(), "order placed");
        Ok(order)
    }

    pub async fn change_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        principal: Option<&Principal>,
    ) -> WorkflowResult<Order> {
        let patch = OrderPatch {
            status: Some(status),
            ..OrderPatch::default()
        };
        self.update_order(order_id, patch, principal).await
    }

    /// Apply `patch` under the order row lock.
    ///
    /// The status transition is validated first; a rejected transition leaves
    /// the whole order untouched. Every save recomputes `total` from the
    /// product's current price; only a quantity edit records `order_updated`.
    /// A patch that changes nothing is a no-op.
    #[instrument(skip(self, principal))]
    pub async fn update_order(
        &self,
        order_id: OrderId,
        patch: OrderPatch,
        principal: Option<&Principal>,
    ) -> WorkflowResult<Order> {
        let now = Utc::now();
        let recorder = AuditRecorder::for_principal(principal, now);

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(WorkflowError::OrderNotFound(order_id))?;
        let product = tx.product(order.product_id()).await?.ok_or_else(|| {
            WorkflowError::invariant(format!(
                "order {order_id} references missing product {}",
                order.product_id()
            ))
        })?;

        let old_quantity = order.quantity();
        let old_total = order.total();

        let status_change = match patch.status.filter(|s| *s != order.status()) {
            Some(status) => Some(order.apply_transition(status, now)?),
            None => None,
        };
        let quantity_changed = match patch.quantity.filter(|q| *q != old_quantity) {
            Some(quantity) => {
                order.set_quantity(quantity, now)?;
                true
            }
            None => false,
        };
        if status_change.is_none() && !quantity_changed {
            debug!(order_id = %order_id, "order unchanged");
            return Ok(order);
        }
        order.reprice(product.price())?;

        let mut entries: Vec<AuditEntry> = Vec::with_capacity(2);
        if let Some(change) = status_change {
            entries.push(recorder.order_status_changed(&order, change));
        }
        if quantity_changed {
            entries.push(recorder.order_updated(&order, old_quantity, old_total));
        }

        tx.update_order(&order).await?;
        for entry in &entries {
            tx.append_audit(entry).await?;
        }
        tx.commit().await?;

        info!(
            order_id = %order_id,
            status = %order.status(),
            quantity = order.quantity(),
            total = %order.total(),
            "order updated"
        );
        Ok(order)
    }
}

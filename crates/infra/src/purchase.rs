//! Purchase: reserve stock and open a reservation as one unit of work.

use chrono::Utc;
use tracing::{info, instrument};

use stockhold_audit::AuditRecorder;
use stockhold_core::{Entity, Principal, ProductId};
use stockhold_inventory::{Reservation, reservation_ttl};

use crate::error::{WorkflowError, WorkflowResult};
use crate::store::InventoryStore;

/// Serializes purchases per product through the product row lock.
///
/// Steps, all in one transaction:
/// 1. load + lock the product
/// 2. ledger reserve
/// 3. audit `stock_adjusted`
/// 4. open the reservation (10 minute TTL)
/// 5. audit `reservation_created`
/// 6. commit
///
/// Any failure before commit drops the transaction: no stock moves, no
/// reservation, no audit entry.
#[derive(Debug, Clone)]
pub struct PurchaseOrchestrator<S> {
    store: S,
}

impl<S: InventoryStore> PurchaseOrchestrator<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self, principal))]
    pub async fn purchase(
        &self,
        product_id: ProductId,
        principal: Option<&Principal>,
        quantity: u32,
    ) -> WorkflowResult<Reservation> {
        let now = Utc::now();
        let recorder = AuditRecorder::for_principal(principal, now);

        let mut tx = self.store.begin().await?;
        let mut product = tx
            .lock_product(product_id)
            .await?
            .ok_or(WorkflowError::ProductNotFound(product_id))?;

        let adjustment = product.reserve(quantity, now)?;
        tx.update_product(&product).await?;
        tx.append_audit(&recorder.stock_adjusted(product_id, &adjustment))
            .await?;

        let reservation = Reservation::open(
            product_id,
            principal.map(Principal::user_id),
            quantity,
            reservation_ttl(),
            now,
        )?;
        tx.insert_reservation(&reservation).await?;
        tx.append_audit(&recorder.reservation_created(&reservation, product.name()))
            .await?;

        tx.commit().await?;

        info!(
            reservation_id = %reservation.id(),
            available = adjustment.after.available(),
            reserved = adjustment.after.reserved(),
            "stock reserved"
        );
        Ok(reservation)
    }
}

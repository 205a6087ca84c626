//! Reservation lifecycle after creation: quantity edits and expiry reclamation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use stockhold_audit::AuditRecorder;
use stockhold_core::{Entity, Principal, ReservationId};
use stockhold_inventory::Reservation;

use crate::error::{WorkflowError, WorkflowResult};
use crate::store::InventoryStore;

/// Upper bound on reservations examined by one reclamation pass.
pub const DEFAULT_RECLAIM_BATCH: usize = 1_000;

/// Outcome of one reclamation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    /// Expired reservations found by the scan.
    pub scanned: usize,
    /// Reservations released and deleted by this pass.
    pub reclaimed: usize,
    /// Reservations already gone (another pass won the race).
    pub skipped: usize,
    /// Reservations whose transaction failed; retried on the next pass.
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct ReservationManager<S> {
    store: S,
    batch: usize,
}

impl<S: InventoryStore> ReservationManager<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            batch: DEFAULT_RECLAIM_BATCH,
        }
    }

    pub fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch.max(1);
        self
    }

    /// Change a live reservation's quantity, moving the delta through the ledger.
    #[instrument(skip(self, principal))]
    pub async fn adjust(
        &self,
        reservation_id: ReservationId,
        quantity: u32,
        principal: Option<&Principal>,
    ) -> WorkflowResult<Reservation> {
        if quantity == 0 {
            return Err(WorkflowError::Validation("quantity must be positive".into()));
        }
        let now = Utc::now();
        let recorder = AuditRecorder::for_principal(principal, now);

        let candidate = self
            .store
            .reservation(reservation_id)
            .await?
            .ok_or(WorkflowError::ReservationNotFound(reservation_id))?;

        let mut tx = self.store.begin().await?;
        let mut product = tx
            .lock_product(candidate.product_id())
            .await?
            .ok_or(WorkflowError::ProductNotFound(candidate.product_id()))?;
        // Re-read under the product lock: reclamation may have deleted it.
        let mut reservation = tx
            .reservation(reservation_id)
            .await?
            .ok_or(WorkflowError::ReservationNotFound(reservation_id))?;

        let old_quantity = reservation.quantity();
        if quantity == old_quantity {
            return Ok(reservation);
        }

        let adjustment = if quantity > old_quantity {
            product.reserve(quantity - old_quantity, now)?
        } else {
            product.release(old_quantity - quantity, now)?.0
        };
        reservation.set_quantity(quantity, now)?;

        tx.update_product(&product).await?;
        tx.append_audit(&recorder.stock_adjusted(*product.id(), &adjustment))
            .await?;
        tx.update_reservation(&reservation).await?;
        tx.append_audit(&recorder.reservation_updated(&reservation, old_quantity))
            .await?;
        tx.commit().await?;

        info!(
            reservation_id = %reservation_id,
            old_quantity,
            quantity,
            "reservation adjusted"
        );
        Ok(reservation)
    }

    /// Release and delete every reservation that expired before `now`.
    ///
    /// Each reservation is reclaimed in its own transaction, so one failure
    /// never blocks the others and the pass holds at most one product lock at a
    /// time. Safe to run concurrently with itself.
    #[instrument(skip(self))]
    pub async fn reclaim_expired(&self, now: DateTime<Utc>) -> WorkflowResult<ReclaimReport> {
        let expired = self.store.expired_reservations(now, self.batch).await?;
        let mut report = ReclaimReport {
            scanned: expired.len(),
            ..ReclaimReport::default()
        };

        for candidate in &expired {
            match self.reclaim_one(candidate, now).await {
                Ok(true) => report.reclaimed += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    warn!(
                        reservation_id = %candidate.id(),
                        error = %e,
                        "failed to reclaim expired reservation"
                    );
                    report.failed += 1;
                }
            }
        }

        if report.scanned > 0 {
            info!(
                scanned = report.scanned,
                reclaimed = report.reclaimed,
                skipped = report.skipped,
                failed = report.failed,
                "expired reservations reclaimed"
            );
        }
        Ok(report)
    }

    /// Returns `false` when the reservation no longer needs reclaiming.
    async fn reclaim_one(&self, candidate: &Reservation, now: DateTime<Utc>) -> WorkflowResult<bool> {
        let recorder = AuditRecorder::system(now);
        let reservation_id = *candidate.id();

        let mut tx = self.store.begin().await?;
        let mut product = tx.lock_product(candidate.product_id()).await?.ok_or_else(|| {
            WorkflowError::invariant(format!(
                "reservation {reservation_id} references missing product {}",
                candidate.product_id()
            ))
        })?;

        let Some(reservation) = tx.reservation(reservation_id).await? else {
            debug!(reservation_id = %reservation_id, "already reclaimed");
            return Ok(false);
        };
        if !reservation.is_expired(now) {
            return Ok(false);
        }

        let (adjustment, released) = product.release(reservation.quantity(), now)?;
        if released < reservation.quantity() {
            warn!(
                reservation_id = %reservation_id,
                quantity = reservation.quantity(),
                released,
                "reserved stock lower than reservation quantity; release clamped"
            );
        }

        tx.update_product(&product).await?;
        tx.append_audit(&recorder.stock_adjusted(*product.id(), &adjustment))
            .await?;
        tx.append_audit(&recorder.reservation_expired(&reservation))
            .await?;
        tx.delete_reservation(reservation_id).await?;
        tx.commit().await?;
        Ok(true)
    }
}

use chrono::{DateTime, Duration, Utc};

use stockhold_core::{DomainError, DomainResult, Entity, ProductId, ReservationId, UserId};

/// Lifetime of a reservation created by the purchase flow.
pub const RESERVATION_TTL_MINUTES: i64 = 10;

pub fn reservation_ttl() -> Duration {
    Duration::minutes(RESERVATION_TTL_MINUTES)
}

/// Entity: a time-bounded hold on product stock.
///
/// A reservation only exists while its units are counted in the product's
/// `reserved_stock`. It is created right after a successful ledger reserve and
/// deleted when reclaimed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reservation {
    id: ReservationId,
    user_id: Option<UserId>,
    product_id: ProductId,
    quantity: u32,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Open a hold of `quantity` units expiring `ttl` after `now`.
    pub fn open(
        product_id: ProductId,
        user_id: Option<UserId>,
        quantity: u32,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if ttl <= Duration::zero() {
            return Err(DomainError::validation("ttl must be positive"));
        }
        Ok(Self {
            id: ReservationId::new(),
            user_id,
            product_id,
            quantity,
            expires_at: now + ttl,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild a reservation from persisted state.
    pub fn restore(
        id: ReservationId,
        user_id: Option<UserId>,
        product_id: ProductId,
        quantity: u32,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            product_id,
            quantity,
            expires_at,
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

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Change the held quantity. The caller adjusts the ledger by the delta.
    pub fn set_quantity(&mut self, quantity: u32, now: DateTime<Utc>) -> DomainResult<()> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        self.quantity = quantity;
        self.updated_at = now;
        Ok(())
    }
}

impl Entity for Reservation {
    type Id = ReservationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn open_sets_expiry_from_ttl() {
        let r = Reservation::open(ProductId::new(), None, 2, reservation_ttl(), now()).unwrap();
        assert_eq!(r.expires_at(), now() + Duration::minutes(10));
        assert_eq!(r.created_at(), now());
    }

    #[test]
    fn expiry_is_strictly_after_expires_at() {
        let r = Reservation::open(ProductId::new(), None, 1, reservation_ttl(), now()).unwrap();
        assert!(!r.is_expired(r.expires_at()));
        assert!(r.is_expired(r.expires_at() + Duration::milliseconds(1)));
        assert!(!r.is_expired(now()));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let err = Reservation::open(ProductId::new(), None, 0, reservation_ttl(), now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn set_quantity_rejects_zero_and_keeps_value() {
        let mut r = Reservation::open(ProductId::new(), None, 3, reservation_ttl(), now()).unwrap();
        assert!(r.set_quantity(0, now()).is_err());
        assert_eq!(r.quantity(), 3);
    }
}

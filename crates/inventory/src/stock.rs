//! Stock ledger: the `available + reserved == total` invariant.

use serde::{Deserialize, Serialize};

use stockhold_core::{DomainError, DomainResult, ValueObject};

/// Stock counters of a single product.
///
/// Fields are private and every constructor validates, so an inconsistent
/// `StockLevels` cannot be observed. Ledger operations return a new value
/// instead of mutating in place.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStockLevels", into = "RawStockLevels")]
pub struct StockLevels {
    total: u32,
    available: u32,
    reserved: u32,
}

impl ValueObject for StockLevels {}

impl StockLevels {
    /// Validate explicit counters.
    pub fn new(total: u32, available: u32, reserved: u32) -> DomainResult<Self> {
        match available.checked_add(reserved) {
            Some(sum) if sum == total => Ok(Self {
                total,
                available,
                reserved,
            }),
            _ => Err(DomainError::invariant(format!(
                "available_stock + reserved_stock must equal total_stock \
                 (available={available}, reserved={reserved}, total={total})"
            ))),
        }
    }

    /// Fully available stock: nothing reserved yet.
    pub fn fresh(total: u32) -> Self {
        Self {
            total,
            available: total,
            reserved: 0,
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn available(&self) -> u32 {
        self.available
    }

    pub fn reserved(&self) -> u32 {
        self.reserved
    }

    /// Move `quantity` units from available to reserved.
    pub fn reserve(&self, quantity: u32) -> DomainResult<Self> {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.available < quantity {
            return Err(DomainError::insufficient_stock(quantity, self.available));
        }
        Self::new(self.total, self.available - quantity, self.reserved + quantity)
    }

    /// Move up to `quantity` units from reserved back to available.
    ///
    /// Clamped to the currently reserved amount; returns the new levels and the
    /// number of units actually released.
    pub fn release(&self, quantity: u32) -> DomainResult<(Self, u32)> {
        let released = quantity.min(self.reserved);
        let next = Self::new(
            self.total,
            self.available + released,
            self.reserved - released,
        )?;
        Ok((next, released))
    }

    /// JSON snapshot used by audit entries.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "available_stock": self.available,
            "reserved_stock": self.reserved,
        })
    }
}

/// Wire shape of [`StockLevels`]; only converted through validation.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
struct RawStockLevels {
    total_stock: u32,
    available_stock: u32,
    reserved_stock: u32,
}

impl TryFrom<RawStockLevels> for StockLevels {
    type Error = DomainError;

    fn try_from(raw: RawStockLevels) -> Result<Self, Self::Error> {
        Self::new(raw.total_stock, raw.available_stock, raw.reserved_stock)
    }
}

impl From<StockLevels> for RawStockLevels {
    fn from(levels: StockLevels) -> Self {
        Self {
            total_stock: levels.total,
            available_stock: levels.available,
            reserved_stock: levels.reserved,
        }
    }
}

/// Before/after pair produced by a ledger mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StockAdjustment {
    pub before: StockLevels,
    pub after: StockLevels,
}

impl StockAdjustment {
    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_unbalanced_levels() {
        let err = StockLevels::new(10, 8, 4).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn new_rejects_overflowing_sum() {
        assert!(StockLevels::new(u32::MAX, u32::MAX, 1).is_err());
    }

    #[test]
    fn reserve_moves_units() {
        let levels = StockLevels::fresh(10).reserve(4).unwrap();
        assert_eq!((levels.available(), levels.reserved(), levels.total()), (6, 4, 10));
    }

    #[test]
    fn reserve_more_than_available_fails() {
        let levels = StockLevels::new(10, 3, 7).unwrap();
        let err = levels.reserve(4).unwrap_err();
        assert_eq!(err, DomainError::insufficient_stock(4, 3));
    }

    #[test]
    fn reserve_zero_is_rejected() {
        let err = StockLevels::fresh(5).reserve(0).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn release_is_clamped_to_reserved() {
        let levels = StockLevels::new(10, 8, 2).unwrap();
        let (next, released) = levels.release(5).unwrap();
        assert_eq!(released, 2);
        assert_eq!((next.available(), next.reserved()), (10, 0));
    }

    #[test]
    fn deserialize_validates_invariant() {
        let ok: Result<StockLevels, _> = serde_json::from_value(serde_json::json!({
            "total_stock": 10, "available_stock": 7, "reserved_stock": 3
        }));
        assert!(ok.is_ok());

        let bad: Result<StockLevels, _> = serde_json::from_value(serde_json::json!({
            "total_stock": 10, "available_stock": 8, "reserved_stock": 4
        }));
        assert!(bad.is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Op {
            Reserve(u32),
            Release(u32),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u32..20).prop_map(Op::Reserve),
                (0u32..20).prop_map(Op::Release),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            #[test]
            fn invariant_holds_for_any_sequence(
                total in 0u32..100,
                ops in proptest::collection::vec(op(), 0..60),
            ) {
                let mut levels = StockLevels::fresh(total);
                for op in ops {
                    match op {
                        Op::Reserve(q) => {
                            if let Ok(next) = levels.reserve(q) {
                                prop_assert_eq!(next.reserved(), levels.reserved() + q);
                                levels = next;
                            }
                        }
                        Op::Release(q) => {
                            let (next, released) = levels.release(q).unwrap();
                            prop_assert!(released <= q);
                            levels = next;
                        }
                    }
                    prop_assert_eq!(levels.available() + levels.reserved(), levels.total());
                    prop_assert_eq!(levels.total(), total);
                }
            }

            #[test]
            fn failed_reserve_leaves_levels_untouched(
                total in 0u32..50,
                extra in 1u32..50,
            ) {
                let levels = StockLevels::fresh(total);
                let before = levels;
                prop_assert!(levels.reserve(total + extra).is_err());
                prop_assert_eq!(levels, before);
            }
        }
    }
}

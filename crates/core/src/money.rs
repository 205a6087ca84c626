//! Fixed-point monetary amounts.

use core::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Number of fractional digits carried by every amount.
pub const MONEY_SCALE: u32 = 2;

/// A non-negative amount with two decimal places (e.g. `10.00`).
///
/// Serialized as a decimal string so no precision is lost on the wire.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Build an amount, rounding to two places. Negative amounts are rejected.
    pub fn new(amount: Decimal) -> DomainResult<Self> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(DomainError::validation("amount cannot be negative"));
        }
        let mut rounded = amount.round_dp(MONEY_SCALE);
        rounded.rescale(MONEY_SCALE);
        Ok(Self(rounded))
    }

    /// Build an amount from minor units (cents).
    pub fn from_minor(minor: u32) -> Self {
        Self(Decimal::new(i64::from(minor), MONEY_SCALE))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }

    /// `self × quantity`, kept at two decimal places.
    pub fn times(&self, quantity: u32) -> DomainResult<Self> {
        let mut product = self
            .0
            .checked_mul(Decimal::from(quantity))
            .ok_or_else(|| DomainError::validation(format!("amount {self} x {quantity} overflows")))?;
        product.rescale(MONEY_SCALE);
        Ok(Self(product))
    }

    /// Reject amounts wider than `max_digits` significant digits, two of
    /// them fractional (the shape of a `NUMERIC(max_digits, 2)` column).
    pub fn within_digits(self, max_digits: u32, field: &str) -> DomainResult<Self> {
        let whole_digits = max_digits.saturating_sub(MONEY_SCALE);
        let limit = 10u64
            .checked_pow(whole_digits)
            .map(Decimal::from)
            .unwrap_or(Decimal::MAX);
        if self.0 >= limit {
            return Err(DomainError::validation(format!(
                "{field} must have at most {max_digits} digits ({whole_digits} before the decimal point)"
            )));
        }
        Ok(self)
    }
}

impl ValueObject for Money {}

impl core::fmt::Display for Money {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Money {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let amount = Decimal::from_str(s.trim())
            .map_err(|e| DomainError::validation(format!("invalid amount '{s}': {e}")))?;
        Self::new(amount)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(value: Money) -> Self {
        value.0
    }
}

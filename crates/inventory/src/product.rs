use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockhold_core::{DomainError, DomainResult, Entity, Money, ProductId};

use crate::stock::{StockAdjustment, StockLevels};

/// Prices carry at most this many digits, two of them after the point.
pub const PRICE_MAX_DIGITS: u32 = 10;

/// Input for creating a product.
///
/// `reserved_stock` defaults to 0 and `available_stock` to
/// `total_stock - reserved_stock`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: Money,
    pub total_stock: u32,
    #[serde(default)]
    pub available_stock: Option<u32>,
    #[serde(default)]
    pub reserved_stock: Option<u32>,
}

/// Partial update of a product. Absent fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub price: Option<Money>,
    pub total_stock: Option<u32>,
    pub available_stock: Option<u32>,
    pub reserved_stock: Option<u32>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Entity: Product, the root of the stock invariant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    name: String,
    price: Money,
    stock: StockLevels,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Product {
    pub fn create(input: NewProduct, now: DateTime<Utc>) -> DomainResult<Self> {
        let name = validate_name(&input.name)?;
        let price = validate_price(input.price)?;
        let reserved = input.reserved_stock.unwrap_or(0);
        let available = match input.available_stock {
            Some(v) => v,
            None => input.total_stock.checked_sub(reserved).ok_or_else(|| {
                DomainError::validation("reserved_stock cannot exceed total_stock")
            })?,
        };
        let stock = user_levels(input.total_stock, available, reserved)?;

        Ok(Self {
            id: ProductId::new(),
            name,
            price,
            stock,
            created_at: now,
            updated_at: now,
        })
    }

    /// Rebuild a product from already-validated persisted state.
    pub fn restore(
        id: ProductId,
        name: String,
        price: Money,
        stock: StockLevels,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            name,
            price,
            stock,
            created_at,
            updated_at,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> Money {
        self.price
    }

    pub fn stock(&self) -> StockLevels {
        self.stock
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Ledger: hold `quantity` units for a reservation.
    pub fn reserve(&mut self, quantity: u32, now: DateTime<Utc>) -> DomainResult<StockAdjustment> {
        let before = self.stock;
        let after = before.reserve(quantity)?;
        self.stock = after;
        self.updated_at = now;
        Ok(StockAdjustment { before, after })
    }

    /// Ledger: return up to `quantity` held units to availability.
    ///
    /// Returns the adjustment and how many units were actually released.
    pub fn release(
        &mut self,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<(StockAdjustment, u32)> {
        let before = self.stock;
        let (after, released) = before.release(quantity)?;
        self.stock = after;
        self.updated_at = now;
        Ok((StockAdjustment { before, after }, released))
    }

    /// Apply a catalog edit. Stock fields are merged with the current levels
    /// and must balance, otherwise nothing changes.
    pub fn apply_patch(&mut self, patch: ProductPatch, now: DateTime<Utc>) -> DomainResult<()> {
        let name = match patch.name {
            Some(ref n) => validate_name(n)?,
            None => self.name.clone(),
        };
        let price = patch.price.map(validate_price).transpose()?;
        let stock = user_levels(
            patch.total_stock.unwrap_or(self.stock.total()),
            patch.available_stock.unwrap_or(self.stock.available()),
            patch.reserved_stock.unwrap_or(self.stock.reserved()),
        )?;

        self.name = name;
        if let Some(price) = price {
            self.price = price;
        }
        self.stock = stock;
        self.updated_at = now;
        Ok(())
    }

    /// Full JSON snapshot used by catalog audit entries.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "name": self.name,
            "price": self.price,
            "total_stock": self.stock.total(),
            "available_stock": self.stock.available(),
            "reserved_stock": self.stock.reserved(),
        })
    }
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

fn validate_name(name: &str) -> DomainResult<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("name cannot be empty"));
    }
    if trimmed.chars().count() > 255 {
        return Err(DomainError::validation("name cannot exceed 255 characters"));
    }
    Ok(trimmed.to_string())
}

fn validate_price(price: Money) -> DomainResult<Money> {
    price.within_digits(PRICE_MAX_DIGITS, "price")
}

/// Caller-supplied stock counters: an imbalance is bad input, not corruption.
fn user_levels(total: u32, available: u32, reserved: u32) -> DomainResult<StockLevels> {
    StockLevels::new(total, available, reserved).map_err(|e| match e {
        DomainError::InvariantViolation(msg) => DomainError::Validation(msg),
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn new_product(total: u32) -> NewProduct {
        NewProduct {
            name: "Widget".to_string(),
            price: Money::from_minor(1000),
            total_stock: total,
            available_stock: None,
            reserved_stock: None,
        }
    }

    #[test]
    fn create_defaults_available_to_total_minus_reserved() {
        let mut input = new_product(10);
        input.reserved_stock = Some(3);
        let p = Product::create(input, now()).unwrap();
        assert_eq!(p.stock().available(), 7);
        assert_eq!(p.stock().reserved(), 3);
    }

    #[test]
    fn create_rejects_unbalanced_stock_as_validation() {
        let mut input = new_product(10);
        input.available_stock = Some(8);
        input.reserved_stock = Some(4);
        let err = Product::create(input, now()).unwrap_err();
        match err {
            DomainError::Validation(msg) => assert!(msg.contains("must equal total_stock")),
            other => panic!("expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn create_rejects_blank_name() {
        let mut input = new_product(1);
        input.name = "   ".to_string();
        assert!(Product::create(input, now()).is_err());
    }

    #[test]
    fn create_rejects_price_wider_than_ten_digits() {
        let mut input = new_product(1);
        input.price = "100000000000000000000".parse().unwrap();
        let err = Product::create(input, now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        let mut input = new_product(1);
        input.price = "99999999.99".parse().unwrap();
        assert!(Product::create(input, now()).is_ok());
    }

    #[test]
    fn patch_rejects_oversized_price_without_changes() {
        let mut p = Product::create(new_product(10), now()).unwrap();
        let before = p.clone();
        let patch = ProductPatch {
            price: Some("100000000".parse().unwrap()),
            ..Default::default()
        };
        let err = p.apply_patch(patch, now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(p, before);
    }

    #[test]
    fn reserve_then_release_round_trips() {
        let mut p = Product::create(new_product(10), now()).unwrap();
        let adj = p.reserve(4, now()).unwrap();
        assert_eq!(adj.before.available(), 10);
        assert_eq!(adj.after.available(), 6);

        let (adj, released) = p.release(4, now()).unwrap();
        assert_eq!(released, 4);
        assert_eq!(adj.after, StockLevels::fresh(10));
        assert_eq!(p.stock(), StockLevels::fresh(10));
    }

    #[test]
    fn failed_reserve_does_not_touch_product() {
        let mut p = Product::create(new_product(2), now()).unwrap();
        let before = p.clone();
        assert!(p.reserve(3, now()).is_err());
        assert_eq!(p, before);
    }

    #[test]
    fn partial_patch_must_keep_balance() {
        let mut input = new_product(10);
        input.available_stock = Some(7);
        input.reserved_stock = Some(3);
        let mut p = Product::create(input, now()).unwrap();
        let before = p.clone();

        let patch = ProductPatch {
            available_stock: Some(5),
            ..Default::default()
        };
        let err = p.apply_patch(patch, now()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(p, before);

        let patch = ProductPatch {
            total_stock: Some(8),
            available_stock: Some(5),
            price: Some(Money::from_minor(250)),
            ..Default::default()
        };
        p.apply_patch(patch, now()).unwrap();
        assert_eq!(p.stock(), StockLevels::new(8, 5, 3).unwrap());
        assert_eq!(p.price(), Money::from_minor(250));
    }
}

//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: two instances with the same attributes
/// are interchangeable. They are immutable; "changing" one produces a new value.
///
/// In this codebase value objects are also the place where invariants live.
/// Constructors validate, so an instance that exists is an instance that holds
/// (e.g. stock levels always balance, money is never negative).
///
/// ```ignore
/// let price: Money = "10.00".parse()?;
/// assert_eq!(price.times(3)?, Money::from_minor(3000));
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

//! `stockhold-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, money, and the acting principal.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod principal;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AuditEntryId, OrderId, ProductId, ReservationId, UserId};
pub use money::Money;
pub use principal::Principal;
pub use value_object::ValueObject;

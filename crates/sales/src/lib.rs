//! Sales domain module: orders and their status lifecycle.
//!
//! Orders record a committed transaction. They are independent of reservation
//! mechanics and never touch stock.

pub mod order;

pub use order::{Order, OrderStatus, StatusChange, TOTAL_MAX_DIGITS, can_transition};

//! Inventory domain module.
//!
//! Products own the stock ledger (`available + reserved == total`), and
//! reservations are time-bounded holds against it. Pure domain logic: no IO,
//! no HTTP, no storage.

pub mod product;
pub mod reservation;
pub mod stock;

pub use product::{NewProduct, PRICE_MAX_DIGITS, Product, ProductPatch};
pub use reservation::{RESERVATION_TTL_MINUTES, Reservation, reservation_ttl};
pub use stock::{StockAdjustment, StockLevels};

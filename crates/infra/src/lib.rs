//! Infrastructure layer: transactional storage and the workflows that run on it.

pub mod catalog;
pub mod error;
pub mod jobs;
pub mod orders;
pub mod purchase;
pub mod query;
pub mod reservations;
pub mod store;


pub use catalog::CatalogService;
pub use error::{WorkflowError, WorkflowResult};
pub use jobs::{ReclaimScheduler, ReclaimSchedulerHandle, SchedulerStats};
pub use orders::{OrderPatch, OrderService};
pub use purchase::PurchaseOrchestrator;
pub use query::{
    AuditQuery, Cursor, OrderFilter, OrderQuery, OrderSort, PAGE_SIZE, Page, PageRequest,
};
pub use reservations::{ReclaimReport, ReservationManager};
pub use store::{InMemoryStore, InventoryStore, PostgresStore, StoreError, StoreTransaction};

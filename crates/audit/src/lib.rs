//! Audit trail: immutable records of every stock, reservation, order and
//! catalog mutation.
//!
//! Entries are built here and appended by the infrastructure layer inside the
//! same transaction as the mutation they describe. The trail is write-only from
//! the domain's point of view and never drives control flow.

pub mod actor;
pub mod entry;
pub mod recorder;

pub use actor::{Actor, SYSTEM_ACTOR};
pub use entry::{AuditAction, AuditEntry, ObjectType};
pub use recorder::AuditRecorder;

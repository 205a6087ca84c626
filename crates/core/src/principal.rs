//! The acting principal of a unit of work.

use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// Authenticated identity on whose behalf a workflow runs.
///
/// Authentication happens upstream; by the time a `Principal` exists the
/// identity has already been asserted. Workflows invoked without a principal
/// (schedulers, maintenance commands) act as the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    user_id: UserId,
    identifier: String,
}

impl Principal {
    pub fn new(user_id: UserId, identifier: impl Into<String>) -> Self {
        Self {
            user_id,
            identifier: identifier.into(),
        }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Human-readable identifier (typically an email) recorded as the audit actor.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }
}

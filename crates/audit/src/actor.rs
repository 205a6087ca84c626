use serde::{Deserialize, Serialize};

use stockhold_core::Principal;

/// Actor string recorded for automated operations.
pub const SYSTEM_ACTOR: &str = "System";

/// Who performed a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Actor {
    System,
    Principal(String),
}

impl Actor {
    /// The principal's identifier when present, otherwise the system.
    pub fn from_principal(principal: Option<&Principal>) -> Self {
        match principal {
            Some(p) if !p.identifier().trim().is_empty() => {
                Actor::Principal(p.identifier().to_string())
            }
            _ => Actor::System,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Actor::System => SYSTEM_ACTOR,
            Actor::Principal(id) => id,
        }
    }
}

impl core::fmt::Display for Actor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

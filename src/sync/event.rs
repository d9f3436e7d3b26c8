//! Change events

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::inventory::EquipmentId;

/// What happened to a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Upsert,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Upsert => f.write_str("UPSERT"),
            Self::Delete => f.write_str("DELETE"),
        }
    }
}

/// Signal that a record may have changed.
///
/// Carries identity and intent only; the index writer re-reads the record
/// from the primary store when it applies the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChangeEvent {
    pub record_id: EquipmentId,
    pub operation: Operation,
}

impl ChangeEvent {
    pub fn upsert(record_id: EquipmentId) -> Self {
        Self {
            record_id,
            operation: Operation::Upsert,
        }
    }

    pub fn delete(record_id: EquipmentId) -> Self {
        Self {
            record_id,
            operation: Operation::Delete,
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} id={}", self.operation, self.record_id)
    }
}

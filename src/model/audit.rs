//! Audit entries: one per label actually applied.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// A record of one applied label.
///
/// Created only after the label store confirmed the change, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub issue_number: u64,
    pub repository: String,
    pub action: String,
    pub reason: String,
    pub timestamp: Timestamp,
}

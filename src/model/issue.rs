//! Issue records: the uniform view of one board item the rules decide on.

use std::collections::BTreeSet;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Value used when a board item has no value for a status or group field.
pub const UNKNOWN: &str = "Unknown";

/// One issue on the board, normalized from whatever the upstream returned.
///
/// Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecord {
    /// Upstream node id. Unique within a snapshot.
    pub id: String,

    /// Issue number within its repository.
    pub number: u64,

    /// Repository the issue lives in, as `owner/name`.
    pub repository: String,

    pub is_closed: bool,

    pub closed_reason: ClosedReason,

    /// Board status field value, or [`UNKNOWN`].
    pub status: String,

    /// Grouping field value (e.g. workstream), or [`UNKNOWN`].
    pub group: String,

    /// Issue-level "last updated". The only timestamp used for age comparisons.
    pub updated_at: Timestamp,

    /// Labels the issue carried when the snapshot was taken.
    pub labels: BTreeSet<String>,
}

/// Why an issue was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClosedReason {
    NotPlanned,
    Completed,
    /// Open issues, reopened issues, or a closure without a recorded reason.
    Unset,
}

impl ClosedReason {
    /// Parse the upstream state reason (`NOT_PLANNED`, `COMPLETED`, ...).
    ///
    /// Anything unrecognized, including `REOPENED`, maps to `Unset`.
    pub fn from_state_reason(reason: Option<&str>) -> Self {
        match reason.map(str::to_ascii_uppercase).as_deref() {
            Some("NOT_PLANNED") => Self::NotPlanned,
            Some("COMPLETED") => Self::Completed,
            _ => Self::Unset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_reason_parsing() {
        assert_eq!(
            ClosedReason::from_state_reason(Some("NOT_PLANNED")),
            ClosedReason::NotPlanned
        );
        assert_eq!(
            ClosedReason::from_state_reason(Some("not_planned")),
            ClosedReason::NotPlanned
        );
        assert_eq!(
            ClosedReason::from_state_reason(Some("COMPLETED")),
            ClosedReason::Completed
        );
        assert_eq!(
            ClosedReason::from_state_reason(Some("REOPENED")),
            ClosedReason::Unset
        );
        assert_eq!(ClosedReason::from_state_reason(None), ClosedReason::Unset);
    }
}

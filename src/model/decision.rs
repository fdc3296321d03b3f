//! Label decisions: what the rules want done, before anything is done.

use serde::{Deserialize, Serialize};

/// A computed intent to put a terminal label on an issue.
///
/// Carries no confirmation that the label was set. The issue's repository
/// and number are copied keys so the decision can be applied on its own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDecision {
    pub issue_id: String,
    pub repository: String,
    pub number: u64,
    pub label: TargetLabel,
    pub rule: Rule,

    /// Human-readable, copied verbatim into the audit entry.
    pub reason: String,
}

/// The terminal labels a decision can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TargetLabel {
    NotPlanned,
    Archive,
}

/// Which rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Rule {
    /// Closed with reason "not planned".
    NotPlanned,

    /// In the done status for at least the age threshold.
    DoneAge,

    /// Among the oldest done issues of a group over its limit.
    Overflow,
}

/// A label's name and the color it is created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelSpec {
    pub name: String,
    /// Six hex digits, no leading `#`.
    pub color: String,
}

/// The concrete labels behind each [`TargetLabel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSet {
    pub not_planned: LabelSpec,
    pub archive: LabelSpec,
}

impl LabelSet {
    pub fn get(&self, label: TargetLabel) -> &LabelSpec {
        match label {
            TargetLabel::NotPlanned => &self.not_planned,
            TargetLabel::Archive => &self.archive,
        }
    }
}

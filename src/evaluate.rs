//! The rules: decide which issues get which terminal label.
//!
//! Evaluation is a pure function of the snapshot, the policy, and the
//! instant the run started. It has no side effects and keeps nothing
//! past the call, so it can be run repeatedly, or in parallel over
//! independent snapshots, with different policies.
//!
//! Three rules run independently over the whole snapshot:
//!
//! 1. Closed as "not planned" → not-planned label.
//! 2. In the done status for at least the age threshold → archive label.
//! 3. Among the oldest done issues of a group over its limit → archive label
//!    (see [`overflow`]).
//!
//! An issue may receive several decisions in one run. Nothing here
//! deduplicates against labels already applied; that is the applicator's job.

pub mod overflow;

use jiff::{SignedDuration, Timestamp};

use crate::model::{ClosedReason, IssueRecord, LabelDecision, LabelSet, Rule, TargetLabel};

/// Validated rule parameters, built once per run from the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Board status value that means "done".
    pub done_status: String,

    /// Minimum whole days in the done status before archiving.
    pub done_age_days: u32,

    /// Done issues a group may keep before the oldest overflow into the archive.
    pub overflow_limit: usize,

    pub labels: LabelSet,

    /// Compute and report decisions without touching labels or the audit log.
    pub dry_run: bool,
}

impl Policy {
    /// The age threshold as a duration.
    pub fn done_age(&self) -> SignedDuration {
        SignedDuration::from_hours(i64::from(self.done_age_days) * 24)
    }
}

/// Classify every issue in the snapshot.
///
/// Output order is deterministic: not-planned decisions, then age-based
/// archive decisions, each in snapshot order, then overflow decisions by
/// group name.
pub fn evaluate(records: &[IssueRecord], policy: &Policy, now: Timestamp) -> Vec<LabelDecision> {
    let mut decisions = Vec::new();

    decisions.extend(
        records
            .iter()
            .filter(|r| r.is_closed && r.closed_reason == ClosedReason::NotPlanned)
            .map(|r| decide(r, TargetLabel::NotPlanned, Rule::NotPlanned, not_planned_reason())),
    );

    let threshold = policy.done_age();
    decisions.extend(
        records
            .iter()
            .filter(|r| r.status == policy.done_status)
            .filter(|r| now.duration_since(r.updated_at) >= threshold)
            .map(|r| {
                decide(
                    r,
                    TargetLabel::Archive,
                    Rule::DoneAge,
                    format!(
                        "In '{}' status for more than {} days",
                        policy.done_status, policy.done_age_days
                    ),
                )
            }),
    );

    decisions.extend(overflow::resolve(records, policy));

    decisions
}

fn not_planned_reason() -> String {
    "Closed with reason \"not planned\"".to_string()
}

fn decide(record: &IssueRecord, label: TargetLabel, rule: Rule, reason: String) -> LabelDecision {
    LabelDecision {
        issue_id: record.id.clone(),
        repository: record.repository.clone(),
        number: record.number,
        label,
        rule,
        reason,
    }
}

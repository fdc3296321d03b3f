//! Core data model for the pruner.
//!
//! These types flow one way through a run:
//! issue records in, label decisions out of the rules,
//! audit entries out of the label applicator.

mod audit;
mod decision;
mod issue;

pub use audit::AuditEntry;
pub use decision::{LabelDecision, LabelSet, LabelSpec, Rule, TargetLabel};
pub use issue::{ClosedReason, IssueRecord, UNKNOWN};

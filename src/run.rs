//! One reconciliation run, start to finish.
//!
//! Snapshot, evaluate, then either report (dry run) or apply and record.
//! The instant the run starts is captured once by the caller and used for
//! both the age rule and the audit timestamps.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::Serialize;
use uuid::Uuid;

use crate::apply::{Applicator, Cancel, Failure};
use crate::audit::AuditWriter;
use crate::evaluate::{Policy, evaluate};
use crate::model::{AuditEntry, LabelDecision, LabelSet, Rule, TargetLabel};
use crate::snapshot::{self, FieldSelector};
use crate::store::{DocumentStore, IssueSource, LabelStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Without the whole board the overflow rule cannot be evaluated.
    #[error("failed to read the project board: {0}")]
    Snapshot(#[source] StoreError),
}

/// Everything a run reads from and writes to.
pub struct Setup<'a> {
    pub source: &'a dyn IssueSource,
    pub labels: &'a dyn LabelStore,
    pub documents: &'a dyn DocumentStore,
    pub selector: FieldSelector,
    pub policy: Policy,
    pub audit_path: &'a str,
    pub audit_title: &'a str,
    pub workers: usize,
}

/// Decision counts for a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// Issues in the normalized snapshot.
    pub issues: usize,
    /// Label name → decisions targeting it.
    pub by_label: BTreeMap<String, usize>,
    pub by_rule: BTreeMap<Rule, usize>,
    pub decisions: Vec<LabelDecision>,
}

impl Summary {
    fn of(issues: usize, decisions: Vec<LabelDecision>, labels: &LabelSet) -> Self {
        let mut by_label: BTreeMap<String, usize> = [TargetLabel::NotPlanned, TargetLabel::Archive]
            .into_iter()
            .map(|l| (labels.get(l).name.clone(), 0))
            .collect();
        let mut by_rule: BTreeMap<Rule, usize> = [Rule::NotPlanned, Rule::DoneAge, Rule::Overflow]
            .into_iter()
            .map(|r| (r, 0))
            .collect();
        for d in &decisions {
            *by_label.entry(labels.get(d.label).name.clone()).or_default() += 1;
            *by_rule.entry(d.rule).or_default() += 1;
        }
        Self {
            issues,
            by_label,
            by_rule,
            decisions,
        }
    }
}

/// What happened to the audit document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum AuditStatus {
    Written { entries: usize, attempts: u32 },
    /// Nothing was applied, so nothing was recorded.
    Skipped,
    /// Labels were applied but could not be recorded.
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum RunReport {
    DryRun(Summary),
    #[serde(rename_all = "camelCase")]
    Applied {
        applied: Vec<AuditEntry>,
        unchanged: usize,
        failures: Vec<Failure>,
        cancelled: usize,
        audit: AuditStatus,
    },
}

/// Run once against the given stores.
pub fn execute(
    setup: &Setup<'_>,
    run_id: Uuid,
    now: Timestamp,
    cancel: &Cancel,
) -> Result<RunReport, RunError> {
    let span = tracing::info_span!("run", run_id = %run_id.simple());
    let _guard = span.enter();

    let records =
        snapshot::collect(setup.source, setup.selector.clone()).map_err(RunError::Snapshot)?;
    let decisions = evaluate(&records, &setup.policy, now);
    tracing::info!(
        issues = records.len(),
        decisions = decisions.len(),
        dry_run = setup.policy.dry_run,
        "evaluated snapshot"
    );

    if setup.policy.dry_run {
        for d in &decisions {
            tracing::info!(
                repository = %d.repository,
                number = d.number,
                label = %setup.policy.labels.get(d.label).name,
                reason = %d.reason,
                "would label"
            );
        }
        return Ok(RunReport::DryRun(Summary::of(
            records.len(),
            decisions,
            &setup.policy.labels,
        )));
    }

    let outcome = Applicator::new(setup.labels, &setup.policy.labels, &records)
        .with_workers(setup.workers)
        .apply(&decisions, now, cancel);

    let audit = if outcome.entries.is_empty() {
        AuditStatus::Skipped
    } else {
        let writer = AuditWriter::new(setup.documents, setup.audit_path, setup.audit_title);
        match writer.append(run_id, now, &outcome.entries) {
            Ok(attempts) => AuditStatus::Written {
                entries: outcome.entries.len(),
                attempts,
            },
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    applied = outcome.entries.len(),
                    "labels applied but the audit log was not updated"
                );
                AuditStatus::Failed {
                    error: e.to_string(),
                }
            }
        }
    };

    tracing::info!(
        applied = outcome.entries.len(),
        unchanged = outcome.unchanged,
        failed = outcome.failures.len(),
        cancelled = outcome.cancelled,
        "run complete"
    );

    Ok(RunReport::Applied {
        applied: outcome.entries,
        unchanged: outcome.unchanged,
        failures: outcome.failures,
        cancelled: outcome.cancelled,
        audit,
    })
}

//! Label application: turn decisions into labels on issues.
//!
//! Per decision the protocol is: attach the label; if the repository has no
//! such label, create it and attach again, exactly once. A label the issue
//! already carries is a no-op and produces no audit entry. Labels are only
//! ever added, never removed or edited.
//!
//! Failures are isolated per issue. An issue that fails stops there, and its
//! remaining decisions are reported as failures too, but other issues carry on.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use jiff::Timestamp;
use serde::Serialize;

use crate::model::{AuditEntry, IssueRecord, LabelDecision, LabelSet, LabelSpec};
use crate::store::{self, Attach, LabelStore, StoreError};

/// Run budget: once the deadline passes, no further issue is started.
///
/// Checked before each issue starts. An issue already in progress finishes.
#[derive(Debug, Default)]
pub struct Cancel {
    deadline: Option<Instant>,
}

impl Cancel {
    pub fn never() -> Self {
        Self::default()
    }

    /// Cancel once `budget` has elapsed from now.
    pub fn after(budget: Duration) -> Self {
        Self {
            deadline: Instant::now().checked_add(budget),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// A decision that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub repository: String,
    pub number: u64,
    pub label: String,
    pub error: String,
}

/// What application did with a batch of decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    /// One entry per label actually added, in decision order.
    pub entries: Vec<AuditEntry>,

    /// Decisions whose label the issue already carried.
    pub unchanged: usize,

    pub failures: Vec<Failure>,

    /// Decisions never attempted because the run was cancelled.
    pub cancelled: usize,
}

/// Applies label decisions against a label store.
pub struct Applicator<'a> {
    store: &'a dyn LabelStore,
    labels: &'a LabelSet,
    /// (issue id, lowercased label name) pairs already present in the snapshot.
    present: HashSet<(String, String)>,
    workers: usize,
}

/// All decisions for one issue, kept together so they run in sequence.
struct IssueWork<'d> {
    repository: &'d str,
    number: u64,
    issue_id: &'d str,
    decisions: Vec<(usize, &'d LabelDecision)>,
}

/// Result of one decision, tagged with its position in the batch.
enum Applied {
    Added(AuditEntry),
    Unchanged,
    Failed(Failure),
}

impl<'a> Applicator<'a> {
    /// `snapshot` supplies the labels each issue already carries. Label names
    /// compare case-insensitively, as GitHub does.
    pub fn new(store: &'a dyn LabelStore, labels: &'a LabelSet, snapshot: &[IssueRecord]) -> Self {
        let present = snapshot
            .iter()
            .flat_map(|r| r.labels.iter().map(|l| (r.id.clone(), l.to_lowercase())))
            .collect();
        Self {
            store,
            labels,
            present,
            workers: 1,
        }
    }

    /// Apply up to `workers` issues concurrently. Values below 1 mean 1.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Apply every decision. Audit entries are stamped with `now`.
    pub fn apply(&self, decisions: &[LabelDecision], now: Timestamp, cancel: &Cancel) -> Outcome {
        let work = group_by_issue(decisions);
        let next = AtomicUsize::new(0);
        let results: Mutex<Vec<(usize, Applied)>> = Mutex::new(Vec::with_capacity(decisions.len()));

        thread::scope(|scope| {
            for _ in 0..self.workers.min(work.len()) {
                scope.spawn(|| {
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        let Some(issue) = work.get(i) else {
                            break;
                        };
                        let applied = self.apply_issue(issue, now);
                        if let Ok(mut results) = results.lock() {
                            results.extend(applied);
                        }
                    }
                });
            }
        });

        let mut results = results.into_inner().unwrap_or_else(|e| e.into_inner());
        results.sort_by_key(|(index, _)| *index);

        let mut outcome = Outcome {
            cancelled: decisions.len() - results.len(),
            ..Outcome::default()
        };
        for (_, applied) in results {
            match applied {
                Applied::Added(entry) => outcome.entries.push(entry),
                Applied::Unchanged => outcome.unchanged += 1,
                Applied::Failed(failure) => outcome.failures.push(failure),
            }
        }
        if outcome.cancelled > 0 {
            tracing::warn!(
                cancelled = outcome.cancelled,
                "run cancelled before all decisions were applied"
            );
        }
        outcome
    }

    fn apply_issue(&self, issue: &IssueWork<'_>, now: Timestamp) -> Vec<(usize, Applied)> {
        let mut results = Vec::with_capacity(issue.decisions.len());
        let mut carried: HashSet<String> = HashSet::new();
        let mut broken: Option<String> = None;

        for &(index, decision) in &issue.decisions {
            let spec = self.labels.get(decision.label);

            if let Some(error) = &broken {
                results.push((index, Applied::Failed(failure(issue, spec, error.clone()))));
                continue;
            }

            let key = spec.name.to_lowercase();
            let already = carried.contains(&key)
                || self.present.contains(&(issue.issue_id.to_string(), key.clone()));
            if already {
                results.push((index, Applied::Unchanged));
                continue;
            }

            match self.attach(issue.repository, issue.number, spec) {
                Ok(Attach::Added) => {
                    tracing::info!(
                        repository = issue.repository,
                        number = issue.number,
                        label = %spec.name,
                        "added label"
                    );
                    carried.insert(key);
                    results.push((
                        index,
                        Applied::Added(AuditEntry {
                            issue_number: issue.number,
                            repository: issue.repository.to_string(),
                            action: format!("Added label `{}`", spec.name),
                            reason: decision.reason.clone(),
                            timestamp: now,
                        }),
                    ));
                }
                Ok(Attach::AlreadyPresent) => {
                    carried.insert(key);
                    results.push((index, Applied::Unchanged));
                }
                Err(e) => {
                    tracing::warn!(
                        repository = issue.repository,
                        number = issue.number,
                        label = %spec.name,
                        error = %e,
                        "failed to label issue"
                    );
                    results.push((index, Applied::Failed(failure(issue, spec, e.to_string()))));
                    broken = Some(format!("skipped after earlier failure: {e}"));
                }
            }
        }
        results
    }

    /// Attach, creating the label and retrying once if the repository lacks it.
    fn attach(&self, repository: &str, number: u64, spec: &LabelSpec) -> store::Result<Attach> {
        match self.store.add_label(repository, number, &spec.name) {
            Err(StoreError::NotFound(_)) => {
                tracing::info!(repository, label = %spec.name, "creating missing label");
                self.store.ensure_label(repository, &spec.name, &spec.color)?;
                self.store.add_label(repository, number, &spec.name)
            }
            other => other,
        }
    }
}

fn failure(issue: &IssueWork<'_>, spec: &LabelSpec, error: String) -> Failure {
    Failure {
        repository: issue.repository.to_string(),
        number: issue.number,
        label: spec.name.clone(),
        error,
    }
}

/// Group decisions by issue, in order of each issue's first decision.
fn group_by_issue(decisions: &[LabelDecision]) -> Vec<IssueWork<'_>> {
    let mut work: Vec<IssueWork<'_>> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();
    for (index, decision) in decisions.iter().enumerate() {
        let i = *slot.entry(decision.issue_id.as_str()).or_insert_with(|| {
            work.push(IssueWork {
                repository: &decision.repository,
                number: decision.number,
                issue_id: &decision.issue_id,
                decisions: Vec::new(),
            });
            work.len() - 1
        });
        work[i].decisions.push((index, decision));
    }
    work
}

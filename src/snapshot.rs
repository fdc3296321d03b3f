//! Snapshot normalization: raw board items in, uniform issue records out.
//!
//! The upstream hands back items with heterogeneous, partially missing
//! metadata. Normalization never fails on a missing field: absent status or
//! group values become [`UNKNOWN`], and items that are not issues are dropped.

use std::collections::{BTreeMap, HashSet};

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::model::{ClosedReason, IssueRecord, UNKNOWN};
use crate::store::{self, IssueSource, StoreError};

/// What a board item points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContentType {
    Issue,
    PullRequest,
    DraftIssue,
    /// Redacted or unrecognized content.
    Other,
}

/// One board item as the upstream reported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawItem {
    pub content_type: ContentType,

    /// Issue state. `None` when the item is not an issue or the content was not visible.
    pub issue: Option<RawIssue>,

    /// Field display name → scalar value rendered as text.
    pub fields: BTreeMap<String, String>,
}

/// Issue state carried by a board item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawIssue {
    pub id: String,
    pub number: u64,
    pub repository: String,
    /// `OPEN` or `CLOSED`.
    pub state: String,
    /// `NOT_PLANNED`, `COMPLETED`, `REOPENED`, or absent.
    pub state_reason: Option<String>,
    pub updated_at: Timestamp,
    pub labels: Vec<String>,
}

/// One page of board items.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub items: Vec<RawItem>,
    /// Cursor for the next page, `None` on the last page.
    pub next_cursor: Option<String>,
}

/// Names of the board fields the rules read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSelector {
    pub status: String,
    pub group: String,
}

impl FieldSelector {
    /// Look up a field by display name, ignoring case.
    ///
    /// Returns `None` when the item has no such field or the value is blank.
    fn lookup<'a>(fields: &'a BTreeMap<String, String>, name: &str) -> Option<&'a str> {
        fields
            .get(name)
            .or_else(|| {
                fields
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    fn status<'a>(&self, fields: &'a BTreeMap<String, String>) -> Option<&'a str> {
        Self::lookup(fields, &self.status)
    }

    fn group<'a>(&self, fields: &'a BTreeMap<String, String>) -> Option<&'a str> {
        Self::lookup(fields, &self.group)
    }
}

/// Accumulates normalized records across pages.
///
/// Feeding the same item twice (e.g. a page boundary that shifted while
/// paging) yields one record.
pub struct Normalizer {
    selector: FieldSelector,
    seen_keys: HashSet<(String, u64)>,
    seen_ids: HashSet<String>,
    records: Vec<IssueRecord>,
    dropped: usize,
}

impl Normalizer {
    pub fn new(selector: FieldSelector) -> Self {
        Self {
            selector,
            seen_keys: HashSet::new(),
            seen_ids: HashSet::new(),
            records: Vec::new(),
            dropped: 0,
        }
    }

    /// Normalize one page of items. Returns how many new records it produced.
    pub fn ingest(&mut self, items: Vec<RawItem>) -> usize {
        let before = self.records.len();
        for item in items {
            match self.normalize(item) {
                Some(record) => self.records.push(record),
                None => self.dropped += 1,
            }
        }
        self.records.len() - before
    }

    /// Items dropped so far: non-issues and duplicates.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn into_records(self) -> Vec<IssueRecord> {
        self.records
    }

    fn normalize(&mut self, item: RawItem) -> Option<IssueRecord> {
        if item.content_type != ContentType::Issue {
            return None;
        }
        let issue = item.issue?;

        let key = (issue.repository.clone(), issue.number);
        if self.seen_keys.contains(&key) || self.seen_ids.contains(&issue.id) {
            return None;
        }
        self.seen_keys.insert(key);
        self.seen_ids.insert(issue.id.clone());

        let is_closed = issue.state.eq_ignore_ascii_case("closed");
        let closed_reason = if is_closed {
            ClosedReason::from_state_reason(issue.state_reason.as_deref())
        } else {
            ClosedReason::Unset
        };

        Some(IssueRecord {
            id: issue.id,
            number: issue.number,
            repository: issue.repository,
            is_closed,
            closed_reason,
            status: self.selector.status(&item.fields).unwrap_or(UNKNOWN).to_string(),
            group: self.selector.group(&item.fields).unwrap_or(UNKNOWN).to_string(),
            updated_at: issue.updated_at,
            labels: issue.labels.into_iter().collect(),
        })
    }
}

/// Fetch every page from the source, in order, and normalize them.
///
/// Pages are requested sequentially: each cursor comes from the previous page.
/// Any page failure aborts collection, since the overflow rule needs the whole board.
pub fn collect(source: &dyn IssueSource, selector: FieldSelector) -> store::Result<Vec<IssueRecord>> {
    let mut normalizer = Normalizer::new(selector);
    let mut cursors = HashSet::new();
    let mut cursor: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = source.fetch_page(cursor.as_deref())?;
        pages += 1;
        let added = normalizer.ingest(page.items);
        tracing::debug!(page = pages, added, "normalized snapshot page");

        match page.next_cursor {
            Some(next) => {
                if !cursors.insert(next.clone()) {
                    return Err(StoreError::Malformed(format!(
                        "cursor {next} repeated after page {pages}"
                    )));
                }
                cursor = Some(next);
            }
            None => break,
        }
    }

    let dropped = normalizer.dropped();
    let records = normalizer.into_records();
    tracing::info!(pages, issues = records.len(), dropped, "collected snapshot");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::store::memory::MemoryIssueSource;

    fn selector() -> FieldSelector {
        FieldSelector {
            status: "Status".into(),
            group: "Workstream".into(),
        }
    }

    fn issue_item(number: u64, fields: &[(&str, &str)]) -> RawItem {
        RawItem {
            content_type: ContentType::Issue,
            issue: Some(RawIssue {
                id: format!("I_{number}"),
                number,
                repository: "acme/widgets".into(),
                state: "OPEN".into(),
                state_reason: None,
                updated_at: Timestamp::from_second(1_700_000_000).unwrap(),
                labels: vec!["bug".into()],
            }),
            fields: fields
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }

    #[test]
    fn maps_fields_and_state() {
        let mut item = issue_item(7, &[("Status", "Done"), ("Workstream", "Backend")]);
        let issue = item.issue.as_mut().unwrap();
        issue.state = "CLOSED".into();
        issue.state_reason = Some("NOT_PLANNED".into());

        let mut n = Normalizer::new(selector());
        assert_eq!(n.ingest(vec![item]), 1);
        let records = n.into_records();

        let r = &records[0];
        assert_eq!(r.id, "I_7");
        assert_eq!(r.number, 7);
        assert!(r.is_closed);
        assert_eq!(r.closed_reason, ClosedReason::NotPlanned);
        assert_eq!(r.status, "Done");
        assert_eq!(r.group, "Backend");
        assert!(r.labels.contains("bug"));
    }

    #[test]
    fn missing_fields_default_to_unknown() {
        let mut n = Normalizer::new(selector());
        n.ingest(vec![issue_item(1, &[]), issue_item(2, &[("Status", "  ")])]);
        let records = n.into_records();

        assert_eq!(records.len(), 2);
        for r in &records {
            assert_eq!(r.status, UNKNOWN);
            assert_eq!(r.group, UNKNOWN);
        }
    }

    #[test]
    fn field_names_match_case_insensitively() {
        let mut n = Normalizer::new(selector());
        n.ingest(vec![issue_item(1, &[("status", "Done"), ("WORKSTREAM", "Web")])]);
        let r = &n.into_records()[0];

        assert_eq!(r.status, "Done");
        assert_eq!(r.group, "Web");
    }

    #[test]
    fn open_issue_has_no_closed_reason() {
        let mut item = issue_item(3, &[]);
        item.issue.as_mut().unwrap().state_reason = Some("NOT_PLANNED".into());

        let mut n = Normalizer::new(selector());
        n.ingest(vec![item]);
        let r = &n.into_records()[0];

        assert!(!r.is_closed);
        assert_eq!(r.closed_reason, ClosedReason::Unset);
    }

    #[test]
    fn drops_non_issues() {
        let mut draft = issue_item(1, &[]);
        draft.content_type = ContentType::DraftIssue;
        let mut pr = issue_item(2, &[]);
        pr.content_type = ContentType::PullRequest;
        let mut hidden = issue_item(3, &[]);
        hidden.issue = None;

        let mut n = Normalizer::new(selector());
        assert_eq!(n.ingest(vec![draft, pr, hidden, issue_item(4, &[])]), 1);
        assert_eq!(n.dropped(), 3);
        assert_eq!(n.into_records()[0].number, 4);
    }

    #[test]
    fn duplicates_across_pages_are_emitted_once() {
        let mut n = Normalizer::new(selector());
        assert_eq!(n.ingest(vec![issue_item(1, &[]), issue_item(2, &[])]), 2);
        assert_eq!(n.ingest(vec![issue_item(2, &[]), issue_item(3, &[])]), 1);

        let numbers: Vec<u64> = n.into_records().iter().map(|r| r.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn same_number_in_different_repositories_is_distinct() {
        let a = issue_item(1, &[]);
        let mut b = issue_item(1, &[]);
        let issue = b.issue.as_mut().unwrap();
        issue.repository = "acme/gadgets".into();
        issue.id = "I_other".into();

        let mut n = Normalizer::new(selector());
        assert_eq!(n.ingest(vec![a, b]), 2);
    }

    #[test]
    fn collect_follows_cursors_in_order() {
        let source = MemoryIssueSource::new(vec![
            vec![issue_item(1, &[])],
            vec![issue_item(2, &[])],
            vec![issue_item(3, &[])],
        ]);

        let records = collect(&source, selector()).unwrap();

        assert_eq!(records.len(), 3);
        let requested = source.requested.lock().unwrap().clone();
        assert_eq!(
            requested,
            vec![None, Some("1".to_string()), Some("2".to_string())]
        );
    }

    #[test]
    fn collect_rejects_repeated_cursor() {
        struct Stuck;
        impl IssueSource for Stuck {
            fn fetch_page(&self, _cursor: Option<&str>) -> store::Result<Page> {
                Ok(Page {
                    items: vec![],
                    next_cursor: Some("same".into()),
                })
            }
        }

        let err = collect(&Stuck, selector()).unwrap_err();
        assert!(matches!(err, StoreError::Malformed(_)));
    }

    #[test]
    fn collect_propagates_page_failure() {
        struct Down;
        impl IssueSource for Down {
            fn fetch_page(&self, _cursor: Option<&str>) -> store::Result<Page> {
                Err(StoreError::Transport("timed out".into()))
            }
        }

        let err = collect(&Down, selector()).unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }
}

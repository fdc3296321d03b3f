//! In-memory stores for tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::snapshot::{Page, RawItem};

use super::{Attach, Document, DocumentStore, IssueSource, LabelStore, Result, StoreError};

// ── Issue source ──

/// Serves fixed pages, with cursors `"1"`, `"2"`, ...
pub struct MemoryIssueSource {
    pages: Vec<Vec<RawItem>>,
    pub requested: Mutex<Vec<Option<String>>>,
}

impl MemoryIssueSource {
    pub fn new(pages: Vec<Vec<RawItem>>) -> Self {
        Self {
            pages,
            requested: Mutex::new(Vec::new()),
        }
    }
}

impl IssueSource for MemoryIssueSource {
    fn fetch_page(&self, cursor: Option<&str>) -> Result<Page> {
        self.requested
            .lock()
            .unwrap()
            .push(cursor.map(String::from));
        let index: usize = match cursor {
            None => 0,
            Some(c) => c
                .parse()
                .map_err(|_| StoreError::Malformed(format!("bad cursor {c}")))?,
        };
        let items = self.pages.get(index).cloned().unwrap_or_default();
        let next_cursor = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());
        Ok(Page { items, next_cursor })
    }
}

// ── Labels ──

/// Repositories' labels and issues' labels, plus a call log.
#[derive(Default)]
pub struct MemoryLabelStore {
    repo_labels: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    issue_labels: Mutex<BTreeMap<(String, u64), BTreeSet<String>>>,
    /// Issues whose attach always fails with a transport error.
    broken_issues: BTreeSet<u64>,
    /// When set, label creation reports success but stores nothing.
    creation_is_lost: bool,
    pub calls: Mutex<Vec<String>>,
}

impl MemoryLabelStore {
    pub fn with_label(self, repository: &str, name: &str) -> Self {
        self.repo_labels
            .lock()
            .unwrap()
            .entry(repository.to_string())
            .or_default()
            .insert(name.to_string(), "ffffff".to_string());
        self
    }

    pub fn with_issue_label(self, repository: &str, number: u64, name: &str) -> Self {
        self.issue_labels
            .lock()
            .unwrap()
            .entry((repository.to_string(), number))
            .or_default()
            .insert(name.to_string());
        self
    }

    /// Every attach to issue `number` fails with a transport error.
    pub fn with_broken_issue(mut self, number: u64) -> Self {
        self.broken_issues.insert(number);
        self
    }

    /// Label creation succeeds but the label never appears.
    pub fn with_lost_creation(mut self) -> Self {
        self.creation_is_lost = true;
        self
    }

    pub fn issue_labels(&self, repository: &str, number: u64) -> BTreeSet<String> {
        self.issue_labels
            .lock()
            .unwrap()
            .get(&(repository.to_string(), number))
            .cloned()
            .unwrap_or_default()
    }

    pub fn label_color(&self, repository: &str, name: &str) -> Option<String> {
        self.repo_labels
            .lock()
            .unwrap()
            .get(repository)
            .and_then(|labels| labels.get(name).cloned())
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl LabelStore for MemoryLabelStore {
    fn ensure_label(&self, repository: &str, name: &str, color: &str) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("ensure {repository} {name}"));
        if !self.creation_is_lost {
            self.repo_labels
                .lock()
                .unwrap()
                .entry(repository.to_string())
                .or_default()
                .entry(name.to_string())
                .or_insert_with(|| color.to_string());
        }
        Ok(())
    }

    fn add_label(&self, repository: &str, number: u64, name: &str) -> Result<Attach> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("add {repository}#{number} {name}"));
        if self.broken_issues.contains(&number) {
            return Err(StoreError::Transport("connection reset".into()));
        }
        let exists = self
            .repo_labels
            .lock()
            .unwrap()
            .get(repository)
            .is_some_and(|labels| labels.contains_key(name));
        if !exists {
            return Err(StoreError::NotFound(format!("label {name} in {repository}")));
        }
        let inserted = self
            .issue_labels
            .lock()
            .unwrap()
            .entry((repository.to_string(), number))
            .or_default()
            .insert(name.to_string());
        Ok(if inserted {
            Attach::Added
        } else {
            Attach::AlreadyPresent
        })
    }
}

// ── Documents ──

/// Documents keyed by path; revisions are a write counter.
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: Mutex<BTreeMap<String, Document>>,
    counter: Mutex<u64>,
    /// Number of upcoming writes that lose against a simulated concurrent writer.
    conflicts: Mutex<u32>,
    /// Content the simulated concurrent writer appends when it wins.
    intruder_text: String,
    /// When set, every write fails with a transport error.
    unavailable: bool,
    pub writes: Mutex<u32>,
}

impl MemoryDocumentStore {
    pub fn with_document(self, path: &str, content: &str) -> Self {
        let revision = self.next_revision();
        self.docs.lock().unwrap().insert(
            path.to_string(),
            Document {
                content: content.to_string(),
                revision,
            },
        );
        self
    }

    /// The next `count` writes lose to another writer, which appends `text`.
    pub fn with_conflicts(mut self, count: u32, text: &str) -> Self {
        self.conflicts = Mutex::new(count);
        self.intruder_text = text.to_string();
        self
    }

    /// Every write fails with a transport error.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    pub fn content(&self, path: &str) -> Option<String> {
        self.docs
            .lock()
            .unwrap()
            .get(path)
            .map(|d| d.content.clone())
    }

    fn next_revision(&self) -> String {
        let mut counter = self.counter.lock().unwrap();
        *counter += 1;
        format!("rev-{counter}")
    }
}

impl DocumentStore for MemoryDocumentStore {
    fn read(&self, path: &str) -> Result<Document> {
        self.docs
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_string()))
    }

    fn write(&self, path: &str, content: &str, expected: Option<&str>) -> Result<String> {
        *self.writes.lock().unwrap() += 1;
        if self.unavailable {
            return Err(StoreError::Transport("service unavailable".into()));
        }

        {
            let mut conflicts = self.conflicts.lock().unwrap();
            if *conflicts > 0 {
                *conflicts -= 1;
                // Another writer gets in first.
                let revision = self.next_revision();
                let mut docs = self.docs.lock().unwrap();
                let doc = docs.entry(path.to_string()).or_insert_with(|| Document {
                    content: String::new(),
                    revision: String::new(),
                });
                doc.content.push_str(&self.intruder_text);
                doc.revision = revision;
                return Err(StoreError::Conflict(path.to_string()));
            }
        }

        let current = self
            .docs
            .lock()
            .unwrap()
            .get(path)
            .map(|d| d.revision.clone());
        if current.as_deref() != expected {
            return Err(StoreError::Conflict(path.to_string()));
        }

        let revision = self.next_revision();
        self.docs.lock().unwrap().insert(
            path.to_string(),
            Document {
                content: content.to_string(),
                revision: revision.clone(),
            },
        );
        Ok(revision)
    }
}

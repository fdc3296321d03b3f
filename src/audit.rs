//! Audit log: an append-only markdown document of every label applied.
//!
//! Each run with something to record appends one dated section. The
//! document is created with a header on first use. Writes are conditioned
//! on the revision that was read, so overlapping runs cannot drop each
//! other's sections: a stale revision re-reads, re-appends, and retries.
//!
//! ```text
//! # Pruner Audit Log
//!
//! Append-only record of labels applied by the pruner. Do not edit prior sections.
//!
//! ## 2026-10-19 14:03:00 UTC · run 1a2b3c4d
//!
//! | Issue | Repository | Action | Reason | Timestamp |
//! | --- | --- | --- | --- | --- |
//! | #12 | owner/repo | Added label `archive` | In 'Done' status for more than 14 days | 2026-10-19T14:03:00Z |
//! ```

use std::fmt::Write;

use jiff::Timestamp;
use uuid::Uuid;

use crate::model::AuditEntry;
use crate::store::{DocumentStore, StoreError};

/// Attempts before a contended write gives up.
pub const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit store error: {0}")]
    Store(#[from] StoreError),

    #[error("audit document still contended after {attempts} attempts")]
    Contended { attempts: u32 },
}

/// Appends dated sections to one document.
pub struct AuditWriter<'a> {
    store: &'a dyn DocumentStore,
    path: &'a str,
    title: &'a str,
}

impl<'a> AuditWriter<'a> {
    pub fn new(store: &'a dyn DocumentStore, path: &'a str, title: &'a str) -> Self {
        Self { store, path, title }
    }

    /// Append `entries` as a new section, creating the document if needed.
    ///
    /// Writes nothing when `entries` is empty. Returns the number of attempts used.
    pub fn append(
        &self,
        run_id: Uuid,
        at: Timestamp,
        entries: &[AuditEntry],
    ) -> Result<u32, AuditError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let section = render_section(run_id, at, entries);

        for attempt in 1..=MAX_ATTEMPTS {
            let written = match self.store.read(self.path) {
                Ok(doc) => {
                    let content = append_section(&doc.content, &section);
                    self.store.write(self.path, &content, Some(&doc.revision))
                }
                Err(StoreError::NotFound(_)) => {
                    let content = append_section(&render_header(self.title), &section);
                    self.store.write(self.path, &content, None)
                }
                Err(e) => return Err(e.into()),
            };

            match written {
                Ok(revision) => {
                    tracing::info!(
                        path = self.path,
                        entries = entries.len(),
                        %revision,
                        attempt,
                        "appended audit section"
                    );
                    return Ok(attempt);
                }
                Err(StoreError::Conflict(reason)) => {
                    tracing::debug!(path = self.path, attempt, %reason, "audit write conflicted");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(AuditError::Contended {
            attempts: MAX_ATTEMPTS,
        })
    }
}

fn render_header(title: &str) -> String {
    format!(
        "# {title}\n\nAppend-only record of labels applied by the pruner. \
         Do not edit prior sections.\n"
    )
}

/// Existing content, untouched, then a blank line, then the section.
fn append_section(existing: &str, section: &str) -> String {
    let mut content = String::with_capacity(existing.len() + section.len() + 2);
    content.push_str(existing);
    if !existing.is_empty() && !existing.ends_with('\n') {
        content.push('\n');
    }
    if !existing.is_empty() {
        content.push('\n');
    }
    content.push_str(section);
    content
}

fn render_section(run_id: Uuid, at: Timestamp, entries: &[AuditEntry]) -> String {
    let short_id = &run_id.simple().to_string()[..8];
    let mut out = format!(
        "## {} · run {short_id}\n\n\
         | Issue | Repository | Action | Reason | Timestamp |\n\
         | --- | --- | --- | --- | --- |\n",
        at.strftime("%Y-%m-%d %H:%M:%S UTC"),
    );
    for e in entries {
        // Writing to a String cannot fail.
        let _ = writeln!(
            out,
            "| #{} | {} | {} | {} | {} |",
            e.issue_number,
            cell(&e.repository),
            cell(&e.action),
            cell(&e.reason),
            e.timestamp,
        );
    }
    out
}

/// Escape a value for a markdown table cell.
fn cell(value: &str) -> String {
    value.replace('|', "\\|").replace(['\n', '\r'], " ")
}

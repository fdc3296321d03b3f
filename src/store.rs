//! Boundaries to the outside world.
//!
//! The rules never touch these. Only snapshot collection reads an
//! [`IssueSource`], and only the applicator and audit writer call the
//! mutating stores. Everything behind these traits can fail per call;
//! callers decide whether a failure is per-item or fatal.

#[cfg(test)]
pub mod memory;

use crate::snapshot::Page;

/// Errors from any external store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Network, auth, rate limit, or timeout.
    #[error("transport error: {0}")]
    Transport(String),

    /// The label or document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A conditional write lost against a concurrent writer.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The upstream answered with something we could not make sense of.
    #[error("malformed response: {0}")]
    Malformed(String),
}

pub type Result<T> = core::result::Result<T, StoreError>;

/// Paged access to the items on a project board.
pub trait IssueSource {
    /// Fetch the page after `cursor`, or the first page when `None`.
    fn fetch_page(&self, cursor: Option<&str>) -> Result<Page>;
}

/// What happened when a label was attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attach {
    Added,
    /// The issue already carried the label; nothing changed.
    AlreadyPresent,
}

/// Per-repository labels and their attachment to issues.
///
/// Both operations must be safe to call when the target state already holds.
pub trait LabelStore: Sync {
    /// Create the label on the repository unless it already exists.
    fn ensure_label(&self, repository: &str, name: &str, color: &str) -> Result<()>;

    /// Attach an existing label to an issue.
    ///
    /// Returns [`StoreError::NotFound`] when the label does not exist on the repository.
    fn add_label(&self, repository: &str, number: u64, name: &str) -> Result<Attach>;
}

/// A document and the revision it was read at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub revision: String,
}

/// A persistent text document with conditional writes.
pub trait DocumentStore {
    /// Read a document. Returns [`StoreError::NotFound`] if it does not exist.
    fn read(&self, path: &str) -> Result<Document>;

    /// Write a document, returning its new revision.
    ///
    /// With `expected = None` the document must not exist yet; otherwise its
    /// current revision must equal `expected`. Either mismatch is a
    /// [`StoreError::Conflict`].
    fn write(&self, path: &str, content: &str, expected: Option<&str>) -> Result<String>;
}

//! Repository labels and their attachment to issues.

use serde::Deserialize;
use serde_json::json;

use crate::store::{self, Attach, LabelStore, StoreError};

use super::{Gh, split_repository};

const LOOKUP_QUERY: &str = r"
query($owner: String!, $name: String!, $number: Int!, $label: String!) {
  repository(owner: $owner, name: $name) {
    label(name: $label) { id name }
    issue(number: $number) {
      id
      labels(first: 100) { nodes { name } }
    }
  }
}";

const ADD_MUTATION: &str = r"
mutation($labelable: ID!, $labels: [ID!]!) {
  addLabelsToLabelable(input: { labelableId: $labelable, labelIds: $labels }) {
    clientMutationId
  }
}";

/// Labels on GitHub repositories.
pub struct GhLabelStore {
    gh: Gh,
}

impl GhLabelStore {
    pub fn new(gh: Gh) -> Self {
        Self { gh }
    }
}

#[derive(Deserialize)]
struct LookupData {
    repository: Option<LookupRepository>,
}

#[derive(Deserialize)]
struct LookupRepository {
    label: Option<Label>,
    issue: Option<Issue>,
}

#[derive(Deserialize)]
struct Label {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct Issue {
    id: String,
    labels: Nodes,
}

#[derive(Deserialize)]
struct Nodes {
    nodes: Vec<Option<LabelName>>,
}

#[derive(Deserialize)]
struct LabelName {
    name: String,
}

/// Ids needed to attach, or the reason there is nothing to do.
enum Target {
    Attach { issue_id: String, label_id: String },
    Present,
}

/// Only a missing label is [`StoreError::NotFound`]; the applicator creates
/// labels on that error, and a missing issue or repository must not trigger it.
fn target(repository: &str, number: u64, name: &str, data: LookupData) -> store::Result<Target> {
    let repo = data
        .repository
        .ok_or_else(|| StoreError::Malformed(format!("no repository {repository}")))?;
    let label = repo
        .label
        .ok_or_else(|| StoreError::NotFound(format!("label '{name}' in {repository}")))?;
    let issue = repo
        .issue
        .ok_or_else(|| StoreError::Malformed(format!("no issue {repository}#{number}")))?;

    // Label names are case-insensitive on GitHub; the lookup returns the
    // canonical spelling.
    let present = issue
        .labels
        .nodes
        .iter()
        .flatten()
        .any(|l| l.name == label.name);
    Ok(if present {
        Target::Present
    } else {
        Target::Attach {
            issue_id: issue.id,
            label_id: label.id,
        }
    })
}

/// GraphQL reports an unknown repository or issue as a NOT_FOUND error,
/// while an unknown label is just null.
fn lookup_error(error: StoreError) -> StoreError {
    match error {
        StoreError::NotFound(message) => StoreError::Malformed(message),
        other => other,
    }
}

/// True when a label-creation failure only says the label is already there.
fn already_exists(output: &str) -> bool {
    output.contains("already_exists")
}

impl LabelStore for GhLabelStore {
    fn ensure_label(&self, repository: &str, name: &str, color: &str) -> store::Result<()> {
        split_repository(repository)?;
        let endpoint = format!("repos/{repository}/labels");
        let output = self.gh.exec(
            &[
                "api",
                &endpoint,
                "--method",
                "POST",
                "-f",
                &format!("name={name}"),
                "-f",
                &format!("color={color}"),
            ],
            None,
        )?;

        if output.success {
            tracing::info!(repository, label = name, color, "created label");
            Ok(())
        } else if already_exists(&output.stdout) || already_exists(&output.stderr) {
            tracing::debug!(repository, label = name, "label already exists");
            Ok(())
        } else {
            Err(super::classify(&output.stderr))
        }
    }

    fn add_label(&self, repository: &str, number: u64, name: &str) -> store::Result<Attach> {
        let (owner, repo) = split_repository(repository)?;
        let data: LookupData = self
            .gh
            .graphql(
                LOOKUP_QUERY,
                json!({ "owner": owner, "name": repo, "number": number, "label": name }),
            )
            .map_err(lookup_error)?;

        match target(repository, number, name, data)? {
            Target::Present => Ok(Attach::AlreadyPresent),
            Target::Attach { issue_id, label_id } => {
                let _: serde_json::Value = self.gh.graphql(
                    ADD_MUTATION,
                    json!({ "labelable": issue_id, "labels": [label_id] }),
                )?;
                Ok(Attach::Added)
            }
        }
    }
}

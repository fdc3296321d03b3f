//! Project board items, paged through GraphQL.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::Deserialize;
use serde_json::json;

use crate::snapshot::{ContentType, Page, RawIssue, RawItem};
use crate::store::{self, IssueSource, StoreError};

use super::Gh;

const ITEMS_QUERY: &str = r"
query($project: ID!, $first: Int!, $after: String) {
  node(id: $project) {
    ... on ProjectV2 {
      items(first: $first, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes {
          type
          content {
            ... on Issue {
              id
              number
              state
              stateReason
              updatedAt
              repository { nameWithOwner }
              labels(first: 100) { nodes { name } }
            }
          }
          fieldValues(first: 50) {
            nodes {
              ... on ProjectV2ItemFieldSingleSelectValue { name field { ... on ProjectV2FieldCommon { name } } }
              ... on ProjectV2ItemFieldTextValue { text field { ... on ProjectV2FieldCommon { name } } }
              ... on ProjectV2ItemFieldNumberValue { number field { ... on ProjectV2FieldCommon { name } } }
              ... on ProjectV2ItemFieldIterationValue { title field { ... on ProjectV2FieldCommon { name } } }
              ... on ProjectV2ItemFieldDateValue { date field { ... on ProjectV2FieldCommon { name } } }
            }
          }
        }
      }
    }
  }
}";

const FIND_QUERY: &str = r"
query($owner: String!, $number: Int!) {
  repositoryOwner(login: $owner) {
    ... on ProjectV2Owner {
      projectV2(number: $number) { id title }
    }
  }
}";

/// Items of one project board.
pub struct ProjectSource {
    gh: Gh,
    project_id: String,
    page_size: u32,
}

impl ProjectSource {
    pub fn new(gh: Gh, project_id: impl Into<String>, page_size: u32) -> Self {
        Self {
            gh,
            project_id: project_id.into(),
            page_size,
        }
    }
}

impl IssueSource for ProjectSource {
    fn fetch_page(&self, cursor: Option<&str>) -> store::Result<Page> {
        let data: ItemsData = self.gh.graphql(
            ITEMS_QUERY,
            json!({
                "project": self.project_id,
                "first": self.page_size,
                "after": cursor,
            }),
        )?;
        into_page(&self.project_id, data)
    }
}

// ── Response shapes ──

#[derive(Deserialize)]
struct ItemsData {
    node: Option<ProjectNode>,
}

/// Empty when the node exists but is not a project.
#[derive(Deserialize)]
struct ProjectNode {
    items: Option<Items>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Items {
    page_info: PageInfo,
    nodes: Vec<Option<ItemNode>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemNode {
    #[serde(rename = "type")]
    kind: String,
    content: Option<Content>,
    field_values: Nodes<FieldValue>,
}

/// Issue content. Every field is absent for other content types.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    id: Option<String>,
    number: Option<u64>,
    state: Option<String>,
    state_reason: Option<String>,
    updated_at: Option<Timestamp>,
    repository: Option<Repository>,
    labels: Option<Nodes<Named>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Repository {
    name_with_owner: String,
}

#[derive(Deserialize)]
struct Nodes<T> {
    nodes: Vec<Option<T>>,
}

#[derive(Deserialize)]
struct Named {
    name: String,
}

/// One field value. Which member is set depends on the field's type.
#[derive(Deserialize)]
struct FieldValue {
    name: Option<String>,
    text: Option<String>,
    number: Option<f64>,
    title: Option<String>,
    date: Option<String>,
    field: Option<Named>,
}

impl FieldValue {
    fn into_pair(self) -> Option<(String, String)> {
        let field = self.field?.name;
        let value = self
            .name
            .or(self.text)
            .or(self.title)
            .or(self.date)
            .or_else(|| self.number.map(|n| n.to_string()))?;
        Some((field, value))
    }
}

fn into_page(project_id: &str, data: ItemsData) -> store::Result<Page> {
    let node = data
        .node
        .ok_or_else(|| StoreError::NotFound(format!("project {project_id}")))?;
    let items = node
        .items
        .ok_or_else(|| StoreError::Malformed(format!("{project_id} is not a project")))?;

    let next_cursor = if items.page_info.has_next_page {
        let cursor = items.page_info.end_cursor.ok_or_else(|| {
            StoreError::Malformed("next page announced without a cursor".to_string())
        })?;
        Some(cursor)
    } else {
        None
    };

    Ok(Page {
        items: items.nodes.into_iter().flatten().map(into_raw_item).collect(),
        next_cursor,
    })
}

fn into_raw_item(node: ItemNode) -> RawItem {
    let content_type = match node.kind.as_str() {
        "ISSUE" => ContentType::Issue,
        "PULL_REQUEST" => ContentType::PullRequest,
        "DRAFT_ISSUE" => ContentType::DraftIssue,
        _ => ContentType::Other,
    };
    let issue = match content_type {
        ContentType::Issue => node.content.and_then(into_raw_issue),
        _ => None,
    };
    let fields: BTreeMap<String, String> = node
        .field_values
        .nodes
        .into_iter()
        .flatten()
        .filter_map(FieldValue::into_pair)
        .collect();

    RawItem {
        content_type,
        issue,
        fields,
    }
}

/// `None` when the viewer cannot see the issue's core attributes.
fn into_raw_issue(content: Content) -> Option<RawIssue> {
    Some(RawIssue {
        id: content.id?,
        number: content.number?,
        repository: content.repository?.name_with_owner,
        state: content.state?,
        state_reason: content.state_reason,
        updated_at: content.updated_at?,
        labels: content
            .labels
            .map(|l| l.nodes.into_iter().flatten().map(|n| n.name).collect())
            .unwrap_or_default(),
    })
}

// ── Project lookup ──

/// A project's node id and title.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ProjectRef {
    pub id: String,
    pub title: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FindData {
    repository_owner: Option<Owner>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Owner {
    project_v2: Option<ProjectRef>,
}

/// Look up a user- or organization-owned project by its number.
pub fn find_project(gh: &Gh, owner: &str, number: u64) -> store::Result<ProjectRef> {
    let data: FindData = gh.graphql(FIND_QUERY, json!({ "owner": owner, "number": number }))?;
    data.repository_owner
        .and_then(|o| o.project_v2)
        .ok_or_else(|| StoreError::NotFound(format!("project {number} of {owner}")))
}

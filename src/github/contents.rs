//! A document kept as a file in a GitHub repository.
//!
//! Read and written through the contents API. The blob `sha` is the
//! revision: GitHub rejects a write whose `sha` no longer matches, and a
//! create over an existing file, which is what makes the writes conditional.
//!
//! Files over 1 MB come back without inline content; their body is fetched
//! as the raw blob named by that same `sha`.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use crate::store::{self, Document, DocumentStore, StoreError};

use super::{Gh, split_repository};

/// Documents stored in one repository's default branch.
pub struct GhContentsStore {
    gh: Gh,
    repository: String,
}

impl GhContentsStore {
    pub fn new(gh: Gh, repository: impl Into<String>) -> Self {
        Self {
            gh,
            repository: repository.into(),
        }
    }

    fn endpoint(&self, path: &str) -> store::Result<String> {
        split_repository(&self.repository)?;
        Ok(format!("repos/{}/contents/{path}", self.repository))
    }
}

/// `GET /repos/{repo}/contents/{path}` for a file.
#[derive(Deserialize)]
struct FileResponse {
    sha: String,
    content: String,
    #[serde(default)]
    encoding: String,
}

/// `PUT /repos/{repo}/contents/{path}` request body.
#[derive(Serialize)]
struct PutRequest<'a> {
    message: String,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
}

#[derive(Deserialize)]
struct PutResponse {
    content: PutContent,
}

#[derive(Deserialize)]
struct PutContent {
    sha: String,
}

/// A decoded contents response.
#[derive(Debug, PartialEq, Eq)]
enum Decoded {
    Inline(Document),
    /// Too large to inline; the body has to be fetched as a blob.
    Large { sha: String },
}

fn decode(body: &str) -> store::Result<Decoded> {
    let file: FileResponse = serde_json::from_str(body)
        .map_err(|e| StoreError::Malformed(format!("contents response: {e}")))?;
    match file.encoding.as_str() {
        "base64" => {}
        "none" => return Ok(Decoded::Large { sha: file.sha }),
        other => {
            return Err(StoreError::Malformed(format!(
                "unexpected content encoding '{other}'"
            )));
        }
    }

    // GitHub wraps the base64 payload at 60 columns.
    let packed: String = file.content.split_whitespace().collect();
    let bytes = STANDARD
        .decode(packed)
        .map_err(|e| StoreError::Malformed(format!("content is not base64: {e}")))?;
    let content = String::from_utf8(bytes)
        .map_err(|e| StoreError::Malformed(format!("content is not UTF-8: {e}")))?;

    Ok(Decoded::Inline(Document {
        content,
        revision: file.sha,
    }))
}

fn encode(path: &str, content: &str, expected: Option<&str>) -> store::Result<String> {
    let message = match expected {
        Some(_) => format!("Append to {path}"),
        None => format!("Create {path}"),
    };
    let request = PutRequest {
        message,
        content: STANDARD.encode(content.as_bytes()),
        sha: expected,
    };
    serde_json::to_string(&request).map_err(|e| StoreError::Malformed(e.to_string()))
}

impl DocumentStore for GhContentsStore {
    fn read(&self, path: &str) -> store::Result<Document> {
        let endpoint = self.endpoint(path)?;
        let body = self.gh.run(&["api", &endpoint], None)?;
        match decode(&body)? {
            Decoded::Inline(document) => Ok(document),
            Decoded::Large { sha } => {
                tracing::debug!(path, %sha, "fetching large document as a blob");
                let blob = format!("repos/{}/git/blobs/{sha}", self.repository);
                let content = self.gh.run(
                    &["api", "-H", "Accept: application/vnd.github.raw", &blob],
                    None,
                )?;
                Ok(Document {
                    content,
                    revision: sha,
                })
            }
        }
    }

    fn write(&self, path: &str, content: &str, expected: Option<&str>) -> store::Result<String> {
        let endpoint = self.endpoint(path)?;
        let request = encode(path, content, expected)?;
        let body = self.gh.run(
            &["api", &endpoint, "--method", "PUT", "--input", "-"],
            Some(&request),
        )?;

        let response: PutResponse = serde_json::from_str(&body)
            .map_err(|e| StoreError::Malformed(format!("contents response: {e}")))?;
        Ok(response.content.sha)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_wrapped_base64() {
        let body = r#"{
            "type": "file",
            "encoding": "base64",
            "sha": "3d21ec53a331a6f037a91c368710b99387d012c1",
            "content": "IyBQcnVuZXIgQXVkaXQgTG9nCgpBcHBlbmQtb25seSByZWNvcmQu\nCg==\n"
        }"#;

        let Decoded::Inline(doc) = decode(body).unwrap() else {
            panic!("expected inline content");
        };

        assert_eq!(doc.revision, "3d21ec53a331a6f037a91c368710b99387d012c1");
        assert_eq!(doc.content, "# Pruner Audit Log\n\nAppend-only record.\n");
    }

    #[test]
    fn directories_and_odd_encodings_are_malformed() {
        assert!(matches!(
            decode(r#"[{"type":"file","name":"a.md"}]"#),
            Err(StoreError::Malformed(_))
        ));
        assert!(matches!(
            decode(r#"{"sha":"abc","content":"","encoding":"utf-16"}"#),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn files_over_a_megabyte_defer_to_the_blob() {
        let body = r#"{"type":"file","encoding":"none","size":1048577,"sha":"abc","content":""}"#;

        assert_eq!(
            decode(body).unwrap(),
            Decoded::Large {
                sha: "abc".into()
            }
        );
    }

    #[test]
    fn create_request_has_no_sha() {
        let body: serde_json::Value =
            serde_json::from_str(&encode("docs/log.md", "hi", None).unwrap()).unwrap();

        assert_eq!(body["message"], "Create docs/log.md");
        assert_eq!(body["content"], "aGk=");
        assert!(body.get("sha").is_none());
    }

    #[test]
    fn update_request_carries_expected_sha() {
        let body: serde_json::Value =
            serde_json::from_str(&encode("docs/log.md", "hi", Some("abc123")).unwrap()).unwrap();

        assert_eq!(body["message"], "Append to docs/log.md");
        assert_eq!(body["sha"], "abc123");
    }
}

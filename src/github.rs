//! GitHub access through the `gh` CLI.
//!
//! All calls run as the resolved identity via `GH_CONFIG_DIR` and are bounded
//! by a timeout. Failures are classified from `gh`'s stderr into
//! [`StoreError`] kinds so callers can tell a missing label from a lost
//! conditional write from a flaky network.

mod contents;
mod labels;
mod project;

pub use contents::GhContentsStore;
pub use labels::GhLabelStore;
pub use project::{ProjectSource, find_project};

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use wait_timeout::ChildExt;

use crate::store::{self, StoreError};

/// A configured `gh` invoker.
#[derive(Debug, Clone)]
pub struct Gh {
    /// `GH_CONFIG_DIR` for the acting identity; `None` uses gh's own default.
    config_dir: Option<PathBuf>,
    timeout: Duration,
}

/// What a finished `gh` process left behind.
struct Output {
    success: bool,
    stdout: String,
    stderr: String,
}

impl Gh {
    pub fn new(config_dir: Option<PathBuf>, timeout: Duration) -> Self {
        Self {
            config_dir,
            timeout,
        }
    }

    /// Run `gh` with the given args and return stdout.
    ///
    /// `input` is fed on stdin, for `--input -`.
    pub fn run(&self, args: &[&str], input: Option<&str>) -> store::Result<String> {
        let output = self.exec(args, input)?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(classify(&output.stderr))
        }
    }

    /// Run a GraphQL document and deserialize its `data`.
    pub fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> store::Result<T> {
        let body = serde_json::json!({ "query": query, "variables": variables }).to_string();
        let stdout = self.run(&["api", "graphql", "--input", "-"], Some(&body))?;
        parse_graphql(&stdout)
    }

    fn exec(&self, args: &[&str], input: Option<&str>) -> store::Result<Output> {
        let mut command = Command::new("gh");
        command
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.config_dir {
            command.env("GH_CONFIG_DIR", dir);
        }

        let mut child = command
            .spawn()
            .map_err(|e| StoreError::Transport(format!("failed to run gh: {e}")))?;

        // Pipes are serviced on their own threads so a large body in either
        // direction cannot stall the child.
        let stdin = child.stdin.take();
        let input = input.map(str::to_owned);
        let writer = thread::spawn(move || {
            if let (Some(mut stdin), Some(input)) = (stdin, input) {
                let _ = stdin.write_all(input.as_bytes());
            }
        });
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = match child.wait_timeout(self.timeout) {
            Ok(Some(status)) => status,
            Ok(None) => {
                let _ = child.kill();
                let _ = child.wait();
                tracing::warn!(command = %args.join(" "), timeout = ?self.timeout, "gh timed out");
                return Err(StoreError::Transport(format!(
                    "gh {} timed out after {:?}",
                    args.first().copied().unwrap_or_default(),
                    self.timeout
                )));
            }
            Err(e) => {
                let _ = child.kill();
                return Err(StoreError::Transport(format!("failed to wait for gh: {e}")));
            }
        };

        let _ = writer.join();
        Ok(Output {
            success: status.success(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

// ── Error classification ──

/// Map `gh` stderr to an error kind.
fn classify(stderr: &str) -> StoreError {
    let message = stderr.trim().trim_start_matches("gh: ").to_string();
    if message.contains("HTTP 404") || message.contains("Could not resolve to") {
        StoreError::NotFound(message)
    } else if message.contains("HTTP 409")
        || (message.contains("HTTP 422") && message.contains("\"sha\""))
    {
        StoreError::Conflict(message)
    } else {
        StoreError::Transport(message)
    }
}

/// GraphQL response envelope.
#[derive(Deserialize)]
struct Response<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Deserialize)]
struct GraphqlError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

fn parse_graphql<T: DeserializeOwned>(body: &str) -> store::Result<T> {
    let response: Response<T> = serde_json::from_str(body)
        .map_err(|e| StoreError::Malformed(format!("graphql response: {e}")))?;

    if let Some(first) = response.errors.first() {
        let message = response
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(match first.kind.as_deref() {
            Some("NOT_FOUND") => StoreError::NotFound(message),
            _ => StoreError::Transport(message),
        });
    }

    response
        .data
        .ok_or_else(|| StoreError::Malformed("graphql response without data".to_string()))
}

/// Split `owner/name`.
fn split_repository(repository: &str) -> store::Result<(&str, &str)> {
    repository
        .split_once('/')
        .filter(|(owner, name)| !owner.is_empty() && !name.is_empty() && !name.contains('/'))
        .ok_or_else(|| StoreError::Malformed(format!("not a repository: {repository}")))
}

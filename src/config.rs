//! Pruner configuration.
//!
//! Loaded from `~/.pruner/config.toml` unless `--config` points elsewhere.
//! Everything is validated up front: a bad value stops the run before any
//! board data is fetched.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::evaluate::Policy;
use crate::model::{LabelSet, LabelSpec};
use crate::snapshot::FieldSelector;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not determine home directory")]
    NoHome,

    #[error(
        "no config file found at {}\n\
         Create one with at minimum:\n\n\
         project-id = \"PVT_...\"\n\
         done-age-days = 14\n\
         done-overflow-limit = 3\n\n\
         [fields]\n\
         status = \"Status\"\n\
         group = \"Workstream\"\n\
         done-status-value = \"Done\"\n\n\
         [audit]\n\
         repository = \"owner/repo\"",
        path.display()
    )]
    Missing { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{key} is required")]
    Required { key: &'static str },

    #[error("{key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

type Result<T> = core::result::Result<T, ConfigError>;

// ── File shape ──

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct File {
    identity: Option<String>,
    project_id: Option<String>,
    done_age_days: Option<u32>,
    done_overflow_limit: Option<usize>,
    #[serde(default)]
    dry_run: bool,
    #[serde(default)]
    fields: FieldsSection,
    #[serde(default)]
    labels: LabelsSection,
    audit: Option<AuditSection>,
    #[serde(default)]
    transport: TransportSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct FieldsSection {
    status: Option<String>,
    group: Option<String>,
    done_status_value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
struct LabelsSection {
    archive: String,
    not_planned: String,
    archive_color: String,
    not_planned_color: String,
}

impl Default for LabelsSection {
    fn default() -> Self {
        Self {
            archive: "archive".to_string(),
            not_planned: "Closed as not planned".to_string(),
            archive_color: "e6e6e6".to_string(),
            not_planned_color: "c5def5".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
struct AuditSection {
    repository: Option<String>,
    #[serde(default = "default_audit_path")]
    path: String,
    #[serde(default = "default_audit_title")]
    title: String,
    local_dir: Option<PathBuf>,
}

fn default_audit_path() -> String {
    "docs/pruner-audit-log.md".to_string()
}

fn default_audit_title() -> String {
    "Pruner Audit Log".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields, default)]
struct TransportSection {
    timeout_secs: u64,
    page_size: u32,
    workers: usize,
    run_budget_secs: Option<u64>,
}

impl Default for TransportSection {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            page_size: 50,
            workers: 1,
            run_budget_secs: None,
        }
    }
}

// ── Validated configuration ──

/// Where the audit document lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditStore {
    /// A file in this GitHub repository (`owner/name`).
    Repository(String),
    /// A file under this local directory.
    Local(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Audit {
    pub store: AuditStore,
    /// Document path relative to the store root.
    pub path: String,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transport {
    /// Bound on every external call.
    pub timeout: Duration,
    pub page_size: u32,
    pub workers: usize,
    /// Stop starting new issues after this long.
    pub run_budget: Option<Duration>,
}

/// Pruner configuration, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Identity whose gh credentials are used, unless overridden.
    pub identity: Option<String>,
    pub project_id: String,
    pub selector: FieldSelector,
    /// Rule parameters; `dry_run` is the file's value.
    pub policy: Policy,
    pub audit: Audit,
    pub transport: Transport,
}

impl Config {
    /// Load config from `path`, or from `~/.pruner/config.toml`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path().ok_or(ConfigError::NoHome)?,
        };

        let contents = match fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::Missing { path });
            }
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        Self::parse(&contents)
    }

    /// Parse and validate TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let file: File = toml::from_str(contents)?;
        validate(file)
    }

    /// The default config file path: `~/.pruner/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".pruner").join("config.toml"))
    }

    /// The policy for one run. `force_dry_run` wins over the file.
    pub fn policy(&self, force_dry_run: bool) -> Policy {
        let mut policy = self.policy.clone();
        policy.dry_run |= force_dry_run;
        policy
    }
}

fn validate(file: File) -> Result<Config> {
    let project_id = non_empty("project-id", file.project_id)?;
    let done_age_days = file
        .done_age_days
        .ok_or(ConfigError::Required { key: "done-age-days" })?;
    let overflow_limit = file.done_overflow_limit.ok_or(ConfigError::Required {
        key: "done-overflow-limit",
    })?;

    let selector = FieldSelector {
        status: non_empty("fields.status", file.fields.status)?,
        group: non_empty("fields.group", file.fields.group)?,
    };
    let done_status = non_empty("fields.done-status-value", file.fields.done_status_value)?;

    let labels = validate_labels(file.labels)?;
    let audit = validate_audit(file.audit)?;
    let transport = validate_transport(file.transport)?;

    Ok(Config {
        identity: file.identity.filter(|s| !s.trim().is_empty()),
        project_id,
        selector,
        policy: Policy {
            done_status,
            done_age_days,
            overflow_limit,
            labels,
            dry_run: file.dry_run,
        },
        audit,
        transport,
    })
}

fn non_empty(key: &'static str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Required { key }),
    }
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

fn validate_labels(section: LabelsSection) -> Result<LabelSet> {
    if section.archive.trim().is_empty() {
        return Err(invalid("labels.archive", "label name is empty"));
    }
    if section.not_planned.trim().is_empty() {
        return Err(invalid("labels.not-planned", "label name is empty"));
    }
    if section.archive.eq_ignore_ascii_case(&section.not_planned) {
        return Err(invalid(
            "labels.not-planned",
            "must differ from the archive label",
        ));
    }
    check_color("labels.archive-color", &section.archive_color)?;
    check_color("labels.not-planned-color", &section.not_planned_color)?;

    Ok(LabelSet {
        not_planned: LabelSpec {
            name: section.not_planned,
            color: section.not_planned_color,
        },
        archive: LabelSpec {
            name: section.archive,
            color: section.archive_color,
        },
    })
}

fn check_color(key: &'static str, color: &str) -> Result<()> {
    if color.len() == 6 && color.chars().all(|c| c.is_ascii_hexdigit()) {
        Ok(())
    } else {
        Err(invalid(key, format!("'{color}' is not six hex digits")))
    }
}

fn validate_audit(section: Option<AuditSection>) -> Result<Audit> {
    let section = section.ok_or(ConfigError::Required { key: "audit" })?;

    let store = match (section.local_dir, section.repository) {
        (Some(dir), _) => AuditStore::Local(dir),
        (None, Some(repo)) => {
            check_repository(&repo)?;
            AuditStore::Repository(repo)
        }
        (None, None) => {
            return Err(invalid(
                "audit",
                "set either repository or local-dir",
            ));
        }
    };
    check_document_path(&section.path)?;
    if section.title.trim().is_empty() {
        return Err(invalid("audit.title", "title is empty"));
    }

    Ok(Audit {
        store,
        path: section.path,
        title: section.title,
    })
}

fn check_repository(repo: &str) -> Result<()> {
    let valid = repo.split_once('/').is_some_and(|(owner, name)| {
        !owner.is_empty()
            && !name.is_empty()
            && !name.contains('/')
            && !repo.chars().any(char::is_whitespace)
    });
    if valid {
        Ok(())
    } else {
        Err(invalid(
            "audit.repository",
            format!("'{repo}' is not of the form owner/name"),
        ))
    }
}

fn check_document_path(path: &str) -> Result<()> {
    let reason = if path.is_empty() {
        Some("path is empty")
    } else if path.starts_with('/') {
        Some("path must be relative")
    } else if path.chars().any(|c| c.is_whitespace() || c == '?' || c == '#') {
        Some("path may not contain whitespace, '?' or '#'")
    } else if path.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..") {
        Some("path has an empty, '.' or '..' segment")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(invalid("audit.path", reason)),
        None => Ok(()),
    }
}

fn validate_transport(section: TransportSection) -> Result<Transport> {
    if section.timeout_secs == 0 {
        return Err(invalid("transport.timeout-secs", "must be at least 1"));
    }
    if !(1..=100).contains(&section.page_size) {
        return Err(invalid("transport.page-size", "must be between 1 and 100"));
    }
    if section.workers == 0 {
        return Err(invalid("transport.workers", "must be at least 1"));
    }

    Ok(Transport {
        timeout: Duration::from_secs(section.timeout_secs),
        page_size: section.page_size,
        workers: section.workers,
        run_budget: section.run_budget_secs.map(Duration::from_secs),
    })
}

//! CLI interface for the pruner.
//!
//! Meant for cron jobs and humans alike: one non-interactive run per
//! invocation, a readable summary on stdout (or JSON with `--json`), logs on
//! stderr.
//!
//! - `pruner run` reconciles the board once.
//! - `pruner project-id <owner> <number>` finds the id to put in the config.

mod format;

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use jiff::Timestamp;
use uuid::Uuid;

use crate::apply::Cancel;
use crate::config::{AuditStore, Config};
use crate::github::{self, Gh, GhContentsStore, GhLabelStore, ProjectSource};
use crate::identity::{gh_config_dir, resolve_identity};
use crate::run::{self, Setup};
use crate::storage::FsDocumentStore;
use crate::store::DocumentStore;

use format::format_report;

/// Timeout for commands that run before a config exists.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Pruner: keep a project board's done column tidy.
#[derive(Debug, Parser)]
#[command(name = "pruner", version, after_long_help = SETUP_HELP)]
pub struct Cli {
    /// Config file. Defaults to `~/.pruner/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

const SETUP_HELP: &str = r#"Getting started:
  1. pruner project-id my-org 7
     → prints the project id and a config snippet
  2. Write ~/.pruner/config.toml with the project id, field names, and thresholds
  3. pruner run --dry-run
     → shows what would be labeled, changes nothing
  4. pruner run

Running as a bot account:
  GH_CONFIG_DIR=~/.pruner/gh-config/pruner-bot gh auth login
  pruner run --as pruner-bot"#;

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile labels on the board once.
    ///
    /// Closed-as-not-planned issues get the not-planned label; done issues
    /// past the age threshold, or beyond their group's limit, get the archive
    /// label. Every label added is recorded in the audit log.
    Run {
        /// Report what would change without touching labels or the audit log.
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON.
        #[arg(long)]
        json: bool,

        /// GitHub identity to act as.
        #[arg(long = "as")]
        identity: Option<String>,
    },

    /// Look up the id of a user- or organization-owned project.
    ProjectId {
        /// User or organization login.
        owner: String,

        /// Project number, as in the project's URL.
        number: u64,

        /// GitHub identity to act as.
        #[arg(long = "as")]
        identity: Option<String>,
    },
}

/// Run the CLI, returning an error message on failure.
pub fn run() -> Result<(), String> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            dry_run,
            json,
            identity,
        } => cmd_run(cli.config.as_deref(), dry_run, json, identity.as_deref()),
        Command::ProjectId {
            owner,
            number,
            identity,
        } => cmd_project_id(cli.config.as_deref(), &owner, number, identity.as_deref()),
    }
}

/// Build a gh invoker for the resolved identity.
fn gh_for(explicit: Option<&str>, configured: Option<&str>, timeout: Duration) -> Result<Gh, String> {
    let config_dir = resolve_identity(explicit, configured)
        .map(|id| gh_config_dir(&id))
        .transpose()?;
    Ok(Gh::new(config_dir, timeout))
}

fn cmd_run(
    config_path: Option<&Path>,
    dry_run: bool,
    json: bool,
    identity: Option<&str>,
) -> Result<(), String> {
    let config = Config::load(config_path).map_err(|e| e.to_string())?;
    let gh = gh_for(identity, config.identity.as_deref(), config.transport.timeout)?;

    let source = ProjectSource::new(gh.clone(), &config.project_id, config.transport.page_size);
    let labels = GhLabelStore::new(gh.clone());
    let documents: Box<dyn DocumentStore> = match &config.audit.store {
        AuditStore::Repository(repository) => Box::new(GhContentsStore::new(gh, repository)),
        AuditStore::Local(dir) => Box::new(
            FsDocumentStore::new(dir)
                .map_err(|e| format!("failed to open {}: {e}", dir.display()))?,
        ),
    };

    let setup = Setup {
        source: &source,
        labels: &labels,
        documents: documents.as_ref(),
        selector: config.selector.clone(),
        policy: config.policy(dry_run),
        audit_path: &config.audit.path,
        audit_title: &config.audit.title,
        workers: config.transport.workers,
    };
    let cancel = config
        .transport
        .run_budget
        .map_or_else(Cancel::never, Cancel::after);

    let report = run::execute(&setup, Uuid::new_v4(), Timestamp::now(), &cancel)
        .map_err(|e| e.to_string())?;

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("failed to serialize report: {e}"))?;
        println!("{out}");
    } else {
        print!("{}", format_report(&report, &setup.policy.labels));
    }
    Ok(())
}

fn cmd_project_id(
    config_path: Option<&Path>,
    owner: &str,
    number: u64,
    identity: Option<&str>,
) -> Result<(), String> {
    // The config may not exist yet; this command helps write it.
    let configured = Config::load(config_path).ok().and_then(|c| c.identity);
    let gh = gh_for(identity, configured.as_deref(), DEFAULT_TIMEOUT)?;

    let project = github::find_project(&gh, owner, number)
        .map_err(|e| format!("failed to find project {number} of {owner}: {e}"))?;

    println!("{} ({owner} #{number})", project.title);
    println!();
    println!("project-id = \"{}\"", project.id);
    Ok(())
}

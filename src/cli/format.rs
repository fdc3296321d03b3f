//! Output formatting for CLI display.

use std::fmt::Write;

use crate::model::{LabelSet, Rule};
use crate::run::{AuditStatus, RunReport, Summary};

/// Format a run report for human-readable display.
pub(super) fn format_report(report: &RunReport, labels: &LabelSet) -> String {
    match report {
        RunReport::DryRun(summary) => format_summary(summary, labels),
        RunReport::Applied {
            applied,
            unchanged,
            failures,
            cancelled,
            audit,
        } => {
            let mut out = format!(
                "Added {} label{}, {unchanged} already present, {} failed\n",
                applied.len(),
                plural(applied.len()),
                failures.len(),
            );
            for entry in applied {
                let _ = writeln!(
                    out,
                    "  {}#{}  {}",
                    entry.repository, entry.issue_number, entry.action
                );
            }
            for f in failures {
                let _ = writeln!(
                    out,
                    "  failed {}#{} `{}`: {}",
                    f.repository, f.number, f.label, f.error
                );
            }
            if *cancelled > 0 {
                let _ = writeln!(out, "Run budget exhausted: {cancelled} not attempted");
            }
            out.push_str(&format_audit(audit));
            out
        }
    }
}

fn format_summary(summary: &Summary, labels: &LabelSet) -> String {
    let mut out = format!(
        "Dry run: {} issue{}, {} decision{}\n",
        summary.issues,
        plural(summary.issues),
        summary.decisions.len(),
        plural(summary.decisions.len()),
    );
    for (label, count) in &summary.by_label {
        let _ = writeln!(out, "  {label}: {count}");
    }
    let rules: Vec<String> = summary
        .by_rule
        .iter()
        .map(|(rule, count)| format!("{} {count}", rule_name(*rule)))
        .collect();
    let _ = writeln!(out, "  by rule: {}", rules.join(", "));

    if !summary.decisions.is_empty() {
        out.push('\n');
    }
    for d in &summary.decisions {
        let _ = writeln!(
            out,
            "  {}#{}  → {}  ({})",
            d.repository,
            d.number,
            labels.get(d.label).name,
            d.reason
        );
    }
    out
}

fn format_audit(audit: &AuditStatus) -> String {
    match audit {
        AuditStatus::Written { entries, .. } => {
            format!("Audit log: recorded {entries} entr{}\n", if *entries == 1 { "y" } else { "ies" })
        }
        AuditStatus::Skipped => "Audit log: nothing to record\n".to_string(),
        AuditStatus::Failed { error } => {
            format!("Warning: labels were applied but the audit log was not updated: {error}\n")
        }
    }
}

fn rule_name(rule: Rule) -> &'static str {
    match rule {
        Rule::NotPlanned => "not planned",
        Rule::DoneAge => "done age",
        Rule::Overflow => "overflow",
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 { "" } else { "s" }
}

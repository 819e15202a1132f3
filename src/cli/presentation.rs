//! CLI presentation: text and json formatters per command.

use crate::cache::ConsolidationReport;
use crate::error::ApiError;
use crate::orchestrator::ArtifactsOutcome;
use crate::render::RenderReport;
use crate::sync::{ReconcileOutcome, SyncStatus};
use crate::types::{Artifact, CollectionSummary, Origin};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;

pub fn format_section_heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

pub fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::MalformedResponse(format!("Failed to encode output: {}", e)))
}

fn timestamp(summary: &CollectionSummary) -> String {
    summary
        .last_updated
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "-".to_string())
}

fn origin_label(origin: Origin) -> &'static str {
    match origin {
        Origin::Local => "local",
        Origin::RemoteSynced => "remote-synced",
    }
}

/// Artifacts as a table (id, page, version, origin, visual, updated).
pub fn format_artifact_table(artifacts: &[Artifact]) -> String {
    if artifacts.is_empty() {
        return "No artifacts cached for this project.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Id", "Page", "Version", "Origin", "Visual", "Updated"]);
    for artifact in artifacts {
        table.add_row(vec![
            artifact.artifact_id.to_string(),
            artifact.page_name.clone(),
            artifact.version.to_string(),
            origin_label(artifact.origin).to_string(),
            if artifact.visual.is_some() { "yes" } else { "no" }.to_string(),
            artifact.updated_at.to_rfc3339(),
        ]);
    }
    table.to_string()
}

pub fn format_sync_status_text(project: &str, status: &SyncStatus) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "{}\n\n",
        format_section_heading(&format!("Sync status: {}", project))
    ));
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Side", "Artifacts", "Last updated"]);
    table.add_row(vec![
        "local".to_string(),
        status.local.count.to_string(),
        timestamp(&status.local),
    ]);
    table.add_row(vec![
        "remote".to_string(),
        status.remote.count.to_string(),
        timestamp(&status.remote),
    ]);
    out.push_str(&format!("{}\n\n", table));
    if status.is_synced {
        out.push_str(&format!("{}", "In sync".green()));
    } else {
        out.push_str(&format!("{}", "Needs sync".yellow()));
    }
    out
}

pub fn format_reconcile_outcome(project: &str, outcome: &ReconcileOutcome) -> String {
    match outcome {
        ReconcileOutcome::Pulled { count } => {
            format!("Pulled {} artifacts from remote into {}", count, project)
        }
        ReconcileOutcome::Pushed { count } => {
            format!("Pushed {} local artifacts of {} to remote", count, project)
        }
        ReconcileOutcome::Merged { count } => {
            format!("Merged {}: {} artifacts adopted from remote result", project, count)
        }
        ReconcileOutcome::NothingToSync => format!("Nothing to sync for {}", project),
    }
}

pub fn format_artifacts_outcome(outcome: &ArtifactsOutcome) -> String {
    let mut out = format!(
        "{} artifacts (source: {}",
        outcome.artifacts.len(),
        outcome.source
    );
    if outcome.attempts > 0 {
        out.push_str(&format!(", attempts: {}", outcome.attempts));
    }
    if outcome.auto_synced {
        out.push_str(", synced to remote");
    }
    out.push_str(")\n\n");
    out.push_str(&format_artifact_table(&outcome.artifacts));
    out
}

#[derive(Serialize)]
struct ArtifactsOutcomeJson<'a> {
    source: String,
    auto_synced: bool,
    attempts: u32,
    artifacts: &'a [Artifact],
}

pub fn format_artifacts_outcome_json(outcome: &ArtifactsOutcome) -> Result<String, ApiError> {
    to_json(&ArtifactsOutcomeJson {
        source: outcome.source.to_string(),
        auto_synced: outcome.auto_synced,
        attempts: outcome.attempts,
        artifacts: &outcome.artifacts,
    })
}

pub fn format_consolidation_report(report: &ConsolidationReport) -> String {
    if report.already_current {
        return format!(
            "Storage already at schema version {}; nothing to consolidate",
            report.to_version
        );
    }
    let mut out = format!(
        "Consolidated schema v{} -> v{}: {} artifacts from {} partitions ({} duplicates overwritten)",
        report.from_version,
        report.to_version,
        report.artifacts_merged,
        report.partitions_merged.len(),
        report.duplicates_overwritten
    );
    for error in &report.errors {
        out.push_str(&format!("\n{} {}", "skipped:".red(), error));
    }
    out
}

pub fn format_render_report(project: &str, report: &RenderReport) -> String {
    let mut out = format!(
        "Rendered {} visuals for {}",
        report.rendered.len(),
        project
    );
    for (artifact_id, error) in &report.failed {
        out.push_str(&format!("\n{} {}: {}", "failed:".red(), artifact_id, error));
    }
    out
}

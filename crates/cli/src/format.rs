//! Output formatting for human and JSON modes.

use nomen_core::EntityIdentifier;
use nomen_engine::{MigrationSummary, OutcomeKind};

/// Output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-readable text
    Human,
    /// Pretty JSON
    Json,
}

/// Format an assigned identifier.
pub fn format_identifier(id: &EntityIdentifier, mode: OutputMode) -> String {
    match mode {
        OutputMode::Human => id.to_string(),
        OutputMode::Json => serde_json::json!({ "identifier": id.as_str() }).to_string(),
    }
}

/// Format a migration summary.
pub fn format_summary(summary: &MigrationSummary, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::to_string_pretty(summary)
            .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}")),
        OutputMode::Human => format_summary_human(summary),
    }
}

fn format_summary_human(summary: &MigrationSummary) -> String {
    let mut lines = Vec::new();
    let title = if summary.dry_run {
        format!("{} migration summary (dry run)", summary.entity_type)
    } else {
        format!("{} migration summary", summary.entity_type)
    };
    lines.push(title);
    lines.push(format!("  processed:       {}", summary.processed));
    lines.push(format!("  already correct: {}", summary.already_correct));
    lines.push(format!("  renamed:         {}", summary.renamed));
    lines.push(format!("  skipped:         {}", summary.skipped));
    lines.push(format!("  failed:          {}", summary.failed));
    if summary.cancelled {
        lines.push("  (stopped before completion)".to_string());
    }

    for outcome in &summary.outcomes {
        let arrow = outcome.new_id.as_deref().unwrap_or("-");
        let line = match outcome.kind {
            OutcomeKind::Renamed => format!("  {} -> {}", outcome.old_id, arrow),
            OutcomeKind::Skipped => format!(
                "  skipped {}: {}",
                outcome.old_id,
                outcome.detail.as_deref().unwrap_or("")
            ),
            OutcomeKind::Failed => format!(
                "  FAILED {} -> {}: {}",
                outcome.old_id,
                arrow,
                outcome.detail.as_deref().unwrap_or("")
            ),
            OutcomeKind::AlreadyCorrect => continue,
        };
        lines.push(line);
    }
    if summary.unlisted_renames > 0 {
        lines.push(format!("  ... and {} more renamed", summary.unlisted_renames));
    }

    if !summary.critical.is_empty() {
        lines.push(format!(
            "  CRITICAL: {} record(s) need manual repair (references already point at the new identifier):",
            summary.critical.len()
        ));
        for outcome in &summary.critical {
            lines.push(format!(
                "    {} (references moved to {})",
                outcome.old_id,
                outcome.new_id.as_deref().unwrap_or("-")
            ));
        }
    }
    lines.join("\n")
}

/// Format an error.
pub fn format_error(err: &nomen_core::Error, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json::json!({ "error": err.to_string() }).to_string(),
        OutputMode::Human => format!("(error) {err}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomen_core::Error;

    #[test]
    fn test_format_identifier() {
        let id = EntityIdentifier::from_raw("SPAACM001");
        assert_eq!(format_identifier(&id, OutputMode::Human), "SPAACM001");
        assert_eq!(
            format_identifier(&id, OutputMode::Json),
            r#"{"identifier":"SPAACM001"}"#
        );
    }

    #[test]
    fn test_format_error() {
        let err = Error::UnknownEntityType("Lead".to_string());
        assert_eq!(
            format_error(&err, OutputMode::Human),
            "(error) Unsupported entity type: Lead"
        );
    }
}

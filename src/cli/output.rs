//! Output formatting for CLI

use archival_import_sdk::{ImportLog, SyncLog};

/// Format an import log for people reading a terminal
pub fn format_log_text(log: &ImportLog) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "Created: {}, updated: {}, unchanged: {}\n",
        log.created(),
        log.updated(),
        log.unchanged()
    ));

    match log.event_id() {
        Some(id) => output.push_str(&format!("Event: {}\n", id)),
        None => output.push_str("No changes recorded\n"),
    }
    if let Some(message) = log.message() {
        output.push_str(&format!("Message: {}\n", message));
    }

    if log.has_errors() {
        output.push_str(&format!("\nSkipped {} record(s):\n", log.error_count()));
        for (location, message) in log.errors() {
            output.push_str(&format!("  - {}: {}\n", location, message));
        }
    }

    output
}

/// Format an import log as JSON
pub fn format_log_json(log: &ImportLog) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(log)
}

/// Format a sync log: the ingest summary followed by the cleanup
pub fn format_sync_text(log: &SyncLog) -> String {
    let mut output = format_log_text(log.log());
    output.push_str(&format!(
        "New: {}, deleted: {}, moved: {}\n",
        log.created_ids().len(),
        log.deleted_ids().len(),
        log.moved().len()
    ));
    for id in log.deleted_ids() {
        output.push_str(&format!("  - deleted {}\n", id));
    }
    for (from, to) in log.moved() {
        output.push_str(&format!("  - moved {} -> {}\n", from, to));
    }
    output
}

pub fn format_sync_json(log: &SyncLog) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(log)
}

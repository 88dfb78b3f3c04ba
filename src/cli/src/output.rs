//! Table formatting helpers for CLI output.

use comfy_table::{ContentArrangement, Table};
use console_guard_core::EntryPoint;

/// Create a styled table with the given headers.
pub fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.load_preset(comfy_table::presets::NOTHING);
    table.set_header(headers);
    table
}

/// Render a list of entry points, or `-` when empty.
pub fn format_entries(entries: &[EntryPoint]) -> String {
    if entries.is_empty() {
        return "-".to_string();
    }
    entries
        .iter()
        .map(|e| e.slot())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

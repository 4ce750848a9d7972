use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Cell, Color as TableColor, ContentArrangement, Table};

use crate::report::StageStatus;

/// Table and cell creation helpers
pub fn create_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn stage_status_cell(status: StageStatus) -> Cell {
    match status {
        StageStatus::Succeeded => Cell::new("succeeded").fg(TableColor::Green),
        StageStatus::Failed => Cell::new("failed").fg(TableColor::Red),
        StageStatus::NotRun => Cell::new("not run").fg(TableColor::DarkGrey),
    }
}

pub fn cleanup_result_cell(error: Option<&str>) -> Cell {
    match error {
        None => Cell::new("done").fg(TableColor::Green),
        Some(_) => Cell::new("failed").fg(TableColor::Yellow),
    }
}

pub fn duration_cell(seconds: f64) -> Cell {
    let minutes = seconds / 60.0;
    Cell::new(format!("{minutes:.1}min"))
}

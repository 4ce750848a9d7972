use std::fmt::Write;

use comfy_table::{Cell, Color as TableColor};

use crate::report::{ScenarioReport, StageStatus};

use super::styling::{bright, cyan, dim, outcome, outcome_label};
use super::tables::{cleanup_result_cell, create_table, duration_cell, stage_status_cell};

/// Prints a human-readable summary of a harness run to stderr.
///
/// Displays:
/// - Overview: pipeline identity, endpoint, outcome and total duration
/// - Stages: submission kind, status, runs observed, polls and duration per stage
/// - Cleanup: the result of each janitor step, when cleanup ran
pub fn print_summary(report: &ScenarioReport) {
    eprintln!("{}", render_summary(report));
}

fn create_cyan_header(labels: &[&str]) -> Vec<Cell> {
    labels
        .iter()
        .map(|label| Cell::new(*label).fg(TableColor::Cyan))
        .collect()
}

fn add_section_header(output: &mut String, emoji: &str, title: &str) {
    let _ = writeln!(output, "{} {}", bright(emoji), bright(title).underlined());
}

#[allow(clippy::cast_precision_loss)]
fn total_seconds(report: &ScenarioReport) -> f64 {
    (report.finished_at - report.started_at).num_milliseconds() as f64 / 1000.0
}

fn render_summary(report: &ScenarioReport) -> String {
    let mut output = String::new();

    add_section_header(&mut output, "📊", "Overview");

    let _ = writeln!(
        output,
        "  {} {}\n  {} {}\n  {} {}\n  {} {}\n  {} {:.1}min\n",
        dim("Pipeline:"),
        cyan(&report.pipeline_name),
        dim("Image:"),
        report.target_image,
        dim("Endpoint:"),
        report.endpoint,
        dim("Outcome:"),
        outcome_label(report.succeeded),
        dim("Duration:"),
        total_seconds(report) / 60.0,
    );

    if let Some(failure) = &report.failure {
        let _ = writeln!(output, "  {} {}\n", dim("Failure:"), outcome(failure, false));
    }

    if !report.stages.is_empty() {
        add_section_header(&mut output, "🪜", "Stages");

        let mut table = create_table();
        table.set_header(create_cyan_header(&[
            "Stage", "Submit", "Status", "Runs", "Polls", "Duration", "Error",
        ]));

        for stage in &report.stages {
            let error = stage.error.as_deref().unwrap_or("");
            let duration = if stage.status == StageStatus::NotRun {
                Cell::new("-")
            } else {
                duration_cell(stage.duration_secs)
            };
            table.add_row(vec![
                Cell::new(&stage.name),
                Cell::new(format!("{:?}", stage.submit).to_lowercase()),
                stage_status_cell(stage.status),
                Cell::new(stage.runs_observed),
                Cell::new(stage.polls),
                duration,
                Cell::new(error),
            ]);
        }

        let _ = writeln!(output, "{table}\n");
    }

    match &report.cleanup {
        Some(cleanup) => {
            add_section_header(&mut output, "🧹", "Cleanup");

            let mut table = create_table();
            table.set_header(create_cyan_header(&["Step", "Result", "Error"]));
            for step in &cleanup.steps {
                table.add_row(vec![
                    Cell::new(step.step.to_string()),
                    cleanup_result_cell(step.error.as_deref()),
                    Cell::new(step.error.as_deref().unwrap_or("")),
                ]);
            }
            let _ = writeln!(output, "{table}");
        }
        None => {
            let _ = writeln!(
                output,
                "{} {}",
                bright("🧹"),
                dim("Cleanup skipped, remote resources were kept")
            );
        }
    }

    output
}

//! Output formatting utilities for the CLI.
//!
//! Reports go to stdout, as a table or as JSON with `--json`. Logs stay on
//! stderr.

use std::env;

use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use console::style;
use serde::Serialize;

use crate::domain::models::{
    AggregateReport, FixAttempt, ReferenceState, ReferenceStatus, SuiteRun, SuiteStatus,
    Verification,
};

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

fn supports_color() -> bool {
    if env::var("NO_COLOR").is_ok() {
        return false;
    }
    !matches!(env::var("TERM").as_deref(), Ok("dumb"))
}

fn base_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

fn colored(text: String, color: Color) -> Cell {
    if supports_color() {
        Cell::new(text).fg(color)
    } else {
        Cell::new(text)
    }
}

/// Green for success, red otherwise.
pub fn headline(text: &str, ok: bool) -> String {
    if !supports_color() {
        return text.to_string();
    }
    if ok {
        style(text).green().bold().to_string()
    } else {
        style(text).red().bold().to_string()
    }
}

pub fn attempts_table(attempts: &[FixAttempt]) -> String {
    let mut table = base_table(&["#", "Strategy", "Verification", "Failures", "Log"]);
    for attempt in attempts {
        let verification = attempt.verification();
        let color = match verification {
            Verification::Passed => Color::Green,
            Verification::Improved => Color::Cyan,
            Verification::NoProgress | Verification::Pending => Color::Yellow,
            Verification::Failed => Color::Red,
        };
        table.add_row(vec![
            Cell::new(attempt.sequence),
            Cell::new(truncate(&attempt.strategy_descriptor, 48)),
            colored(verification.to_string(), color),
            Cell::new(attempt.failure_count.map_or_else(|| "-".to_string(), |n| n.to_string())),
            Cell::new(
                attempt
                    .log_path
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |p| p.display().to_string()),
            ),
        ]);
    }
    table.to_string()
}

pub fn probes_table(probes: &[ReferenceState]) -> String {
    let mut table = base_table(&["Candidate", "Commit", "Status", "Note"]);
    for probe in probes {
        let color = match probe.status {
            ReferenceStatus::Passing => Color::Green,
            ReferenceStatus::Failing => Color::Red,
            ReferenceStatus::Unknown => Color::DarkGrey,
        };
        table.add_row(vec![
            Cell::new(probe.kind),
            Cell::new(probe.commit.as_deref().map_or("-", |c| &c[..c.len().min(12)])),
            colored(probe.status.to_string(), color),
            Cell::new(probe.note.as_deref().unwrap_or("")),
        ]);
    }
    table.to_string()
}

pub fn suites_table(runs: &[SuiteRun], aggregate: &AggregateReport) -> String {
    let mut table = base_table(&["Suite", "Status", "Exit", "Duration", "Log"]);
    for (suite_id, status) in &aggregate.per_suite {
        let run = runs.iter().rev().find(|r| &r.suite_id == suite_id);
        let color = match status {
            SuiteStatus::Passed => Color::Green,
            SuiteStatus::NotRun | SuiteStatus::Cancelled => Color::DarkGrey,
            SuiteStatus::TimedOut => Color::Yellow,
            _ => Color::Red,
        };
        table.add_row(vec![
            Cell::new(suite_id),
            colored(status.to_string(), color),
            Cell::new(run.map_or_else(|| "-".to_string(), |r| r.exit_code.to_string())),
            Cell::new(run.map_or_else(|| "-".to_string(), |r| format_ms(r.duration_ms))),
            Cell::new(
                run.and_then(|r| r.log_location.as_ref())
                    .map_or_else(|| "-".to_string(), |p| p.display().to_string()),
            ),
        ]);
    }
    table.to_string()
}

pub fn format_ms(ms: u64) -> String {
    if ms < 1_000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.1}s", ms as f64 / 1_000.0)
    } else {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1_000)
    }
}

/// Truncate a string to a maximum length, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("äöüäöüäöü", 6), "äöü...");
    }

    #[test]
    fn durations() {
        assert_eq!(format_ms(12), "12ms");
        assert_eq!(format_ms(1_500), "1.5s");
        assert_eq!(format_ms(125_000), "2m05s");
    }
}

//! Output formatting utilities

use chrono::{DateTime, Local, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use tabled::{settings::Style, Table, Tabled};

use crate::client::{LoadCategory, NodeLoad};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a JSON document
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print rows as a rounded table, or a warning when there are none
pub fn print_rows<T: Tabled>(rows: Vec<T>, empty: &str) {
    if rows.is_empty() {
        print_warning(empty);
        return;
    }
    let table = Table::new(rows).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// RFC 3339 timestamp in local time; unparseable input is returned as-is
pub fn format_timestamp(ts: &str) -> String {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| ts.to_string())
}

/// Seconds left until `ts`, e.g. "in 7s", or "due" once passed
pub fn format_countdown(ts: &str, now: DateTime<Utc>) -> String {
    match DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => {
            let secs = (dt.with_timezone(&Utc) - now).num_seconds();
            if secs > 0 {
                format!("in {}s", secs)
            } else {
                "due".to_string()
            }
        }
        Err(_) => ts.to_string(),
    }
}

/// Load as a colored percentage, or a dash when not sampled
pub fn format_load(load: Option<NodeLoad>) -> String {
    match load {
        Some(load) => {
            let text = format!("{:.1}%", load.cpu_percent);
            match load.category {
                LoadCategory::Green => text.green().to_string(),
                LoadCategory::Amber => text.yellow().to_string(),
                LoadCategory::Red => text.red().bold().to_string(),
            }
        }
        None => "-".dimmed().to_string(),
    }
}

/// Color status based on value
pub fn color_status(status: &str) -> String {
    match status.to_lowercase().as_str() {
        "pending" | "creating" => status.yellow().to_string(),
        "confirmed" | "running" => status.green().to_string(),
        "stopped" | "deleted" => status.red().to_string(),
        _ => status.dimmed().to_string(),
    }
}

/// Summary line of a series: points, latest, min and max
pub fn summarize_values(values: &[f64]) -> String {
    let Some(last) = values.last() else {
        return "no points".to_string();
    };
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    format!(
        "{} points, latest {:.2}, min {:.2}, max {:.2}",
        values.len(),
        last,
        min,
        max
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_countdown() {
        let now = Utc::now();
        let later = (now + chrono::Duration::seconds(8)).to_rfc3339();
        let earlier = (now - chrono::Duration::seconds(2)).to_rfc3339();

        assert_eq!(format_countdown(&later, now), "in 8s");
        assert_eq!(format_countdown(&earlier, now), "due");
        assert_eq!(format_countdown("soon", now), "soon");
    }

    #[test]
    fn test_format_timestamp_passes_through_garbage() {
        assert_eq!(format_timestamp("not a time"), "not a time");
    }

    #[test]
    fn test_summarize_values() {
        assert_eq!(summarize_values(&[]), "no points");
        assert_eq!(
            summarize_values(&[10.0, 40.0, 25.0]),
            "3 points, latest 25.00, min 10.00, max 40.00"
        );
    }
}

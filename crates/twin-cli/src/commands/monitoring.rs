//! Workload templates, node load and time-series commands

use anyhow::Result;
use colored::Colorize;
use std::collections::HashMap;
use tabled::Tabled;

use crate::client::{ApiClient, NodeLoad, NodeTimeseries, SystemStatus, TemplateList, Usage};
use crate::output::{format_load, print_json, print_rows, summarize_values, OutputFormat};

#[derive(Tabled)]
struct TemplateRow {
    #[tabled(rename = "File")]
    filename: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Points")]
    time_points: usize,
}

#[derive(Tabled)]
struct LoadRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "CPU")]
    cpu: String,
}

/// List workload templates available for virtual pods
pub async fn list_templates(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: TemplateList = client.get("api/workload-templates").await?;

    match format {
        OutputFormat::Json => print_json(&result.templates)?,
        OutputFormat::Table => {
            let rows = result
                .templates
                .into_iter()
                .map(|t| TemplateRow {
                    filename: t.filename,
                    name: t.name,
                    time_points: t.time_points,
                })
                .collect();
            print_rows(rows, "No workload templates");
        }
    }

    Ok(())
}

/// Show the latest sampled CPU load per k3s node
pub async fn show_load(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let loads: HashMap<String, NodeLoad> = client.get("api/nodes/current-load").await?;

    match format {
        OutputFormat::Json => print_json(&loads)?,
        OutputFormat::Table => {
            let mut nodes: Vec<_> = loads.into_iter().collect();
            nodes.sort_by(|a, b| a.0.cmp(&b.0));
            let rows = nodes
                .into_iter()
                .map(|(node, load)| LoadRow {
                    node,
                    cpu: format_load(Some(load)),
                })
                .collect();
            print_rows(rows, "No load samples yet");
        }
    }

    Ok(())
}

/// Show emulated and real series for a node
pub async fn show_timeseries(
    client: &ApiClient,
    node: &str,
    metric: &str,
    window: &str,
    format: OutputFormat,
) -> Result<()> {
    let series: NodeTimeseries = client
        .get_with(
            &format!("api/node/{}/timeseries", node),
            &[("metric", metric), ("window", window)],
        )
        .await?;

    match format {
        OutputFormat::Json => print_json(&series)?,
        OutputFormat::Table => {
            println!(
                "{} {} over {}",
                series.node.bold(),
                series.metric.cyan(),
                window
            );
            for (label, data) in [("emulated", &series.emulated), ("real", &series.real)] {
                let summary = match data {
                    Some(s) => summarize_values(&s.values),
                    None => "unavailable".dimmed().to_string(),
                };
                println!("  {:<9} {}", label, summary);
            }
        }
    }

    Ok(())
}

fn usage_line(usage: &Usage) -> String {
    format!(
        "{:>5.1}%  {:.2} / {:.2} GiB",
        usage.percent, usage.used_gb, usage.total_gb
    )
}

/// Show CPU, memory and disk usage of the orchestrator host
pub async fn show_system(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: SystemStatus = client.get("api/system/status").await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            println!(
                "  {:<7} {:>5.1}%  {} cores",
                "cpu".bold(),
                status.cpu.percent,
                status.cpu.cores
            );
            println!("  {:<7} {}", "memory".bold(), usage_line(&status.memory));
            match &status.disk {
                Some(disk) => println!("  {:<7} {}", "disk".bold(), usage_line(disk)),
                None => println!("  {:<7} {}", "disk".bold(), "unavailable".dimmed()),
            }
        }
    }

    Ok(())
}

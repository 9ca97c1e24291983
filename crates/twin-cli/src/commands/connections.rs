//! Peering connection CLI commands

use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{
    ApiClient, Connection, ConnectionRequest, ConnectionResponse, PendingConnection,
    PendingResponse, RemovalResponse, VirtualPodList,
};
use crate::output::{
    color_status, format_countdown, format_timestamp, print_info, print_json, print_rows,
    print_success, print_warning, OutputFormat,
};

#[derive(Tabled)]
struct ConnectionRow {
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

#[derive(Tabled)]
struct PendingRow {
    #[tabled(rename = "From")]
    from: String,
    #[tabled(rename = "To")]
    to: String,
    #[tabled(rename = "Confirms")]
    confirms: String,
}

fn request(from: &str, to: &str) -> ConnectionRequest {
    ConnectionRequest {
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// List confirmed connections
pub async fn list_connections(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let connections: Vec<Connection> = client.get("api/liqo-connections").await?;

    match format {
        OutputFormat::Json => print_json(&connections)?,
        OutputFormat::Table => {
            let rows = connections
                .iter()
                .map(|c| ConnectionRow {
                    from: c.from.clone(),
                    to: c.to.clone(),
                    state: color_status(&c.state),
                    created_at: format_timestamp(&c.created_at),
                })
                .collect();
            print_rows(rows, "No connections");
        }
    }

    Ok(())
}

/// Confirm a connection immediately, or reserve it for the dwell period
pub async fn add_connection(
    client: &ApiClient,
    from: &str,
    to: &str,
    wait: bool,
    format: OutputFormat,
) -> Result<()> {
    if wait {
        let response: PendingResponse = client
            .post("api/liqo-connections/initiate", &request(from, to))
            .await?;
        match format {
            OutputFormat::Json => print_json(&response.pending)?,
            OutputFormat::Table => print_info(&format!(
                "Connection {} <-> {} pending, confirms {}",
                from,
                to,
                format_countdown(&response.pending.confirms_at, Utc::now())
            )),
        }
        return Ok(());
    }

    let response: ConnectionResponse = client
        .post("api/liqo-connections", &request(from, to))
        .await?;
    match format {
        OutputFormat::Json => print_json(&response.connection)?,
        OutputFormat::Table => print_success(&format!(
            "Connection {} <-> {} confirmed",
            response.connection.from, response.connection.to
        )),
    }

    Ok(())
}

/// Remove a connection and the virtual pods bound to it
pub async fn remove_connection(
    client: &ApiClient,
    from: &str,
    to: &str,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    if dry_run {
        let plan: VirtualPodList = client
            .get_with(
                "api/liqo-connections/removal-plan",
                &[("from", from), ("to", to)],
            )
            .await?;
        match format {
            OutputFormat::Json => print_json(&plan)?,
            OutputFormat::Table if plan.virtual_pods.is_empty() => {
                print_info(&format!("Removing {} <-> {} deletes no virtual pods", from, to))
            }
            OutputFormat::Table => {
                print_warning(&format!(
                    "Removing {} <-> {} deletes {} virtual pod(s):",
                    from,
                    to,
                    plan.virtual_pods.len()
                ));
                for pod in &plan.virtual_pods {
                    println!("  {} ({})", pod.id.bold(), pod.workload_file);
                }
            }
        }
        return Ok(());
    }

    let response: RemovalResponse = client
        .delete("api/liqo-connections", Some(&request(from, to)))
        .await?;
    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            print_success(&format!("Connection {} <-> {} removed", from, to));
            if !response.deleted_pods.is_empty() {
                println!("Deleted virtual pods: {}", response.deleted_pods.join(", "));
            }
        }
    }

    Ok(())
}

/// List connections awaiting confirmation
pub async fn list_pending(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let pending: Vec<PendingConnection> = client.get("api/liqo-connections/pending").await?;

    match format {
        OutputFormat::Json => print_json(&pending)?,
        OutputFormat::Table => {
            let now = Utc::now();
            let rows = pending
                .iter()
                .map(|p| PendingRow {
                    from: p.from.clone(),
                    to: p.to.clone(),
                    confirms: format_countdown(&p.confirms_at, now),
                })
                .collect();
            print_rows(rows, "No pending connections");
        }
    }

    Ok(())
}

/// Cancel a pending connection
pub async fn cancel_pending(
    client: &ApiClient,
    from: &str,
    to: &str,
    format: OutputFormat,
) -> Result<()> {
    let response: serde_json::Value = client
        .post("api/liqo-connections/cancel", &request(from, to))
        .await?;
    let cancelled = response["cancelled"].as_bool().unwrap_or(false);

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table if cancelled => {
            print_success(&format!("Pending connection {} <-> {} cancelled", from, to))
        }
        OutputFormat::Table => {
            print_warning(&format!("No pending connection between {} and {}", from, to))
        }
    }

    Ok(())
}

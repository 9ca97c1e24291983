//! Virtual pod CLI commands

use anyhow::Result;
use tabled::Tabled;

use crate::client::{ApiClient, CreatePodRequest, VirtualPodList, VirtualPodResponse};
use crate::output::{
    color_status, format_timestamp, print_json, print_rows, print_success, OutputFormat,
};

#[derive(Tabled)]
struct VirtualPodRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Destination")]
    dest: String,
    #[tabled(rename = "Workload")]
    workload: String,
    #[tabled(rename = "Interval")]
    interval: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Created")]
    created_at: String,
}

/// List virtual pods, optionally only those touching `node`
pub async fn list_pods(client: &ApiClient, node: Option<String>, format: OutputFormat) -> Result<()> {
    let result: VirtualPodList = client.get("api/virtual-pods").await?;

    let pods: Vec<_> = result
        .virtual_pods
        .into_iter()
        .filter(|p| {
            node.as_ref()
                .map(|n| &p.source_node == n || &p.dest_node == n)
                .unwrap_or(true)
        })
        .collect();

    match format {
        OutputFormat::Json => print_json(&pods)?,
        OutputFormat::Table => {
            let total = pods.len();
            let rows = pods
                .into_iter()
                .map(|p| VirtualPodRow {
                    id: p.id,
                    source: format!("{} ({})", p.source_node, p.source_pod_name),
                    dest: format!("{} ({})", p.dest_node, p.dest_pod_name),
                    workload: p.workload_file,
                    interval: format!("{}s", p.interval),
                    status: color_status(&p.status),
                    created_at: format_timestamp(&p.created_at),
                })
                .collect();
            print_rows(rows, "No virtual pods");
            if total > 0 {
                println!("\nTotal: {} virtual pods", total);
            }
        }
    }

    Ok(())
}

/// Create a virtual pod replaying `workload` across a confirmed connection
pub async fn create_pod(
    client: &ApiClient,
    request: CreatePodRequest,
    format: OutputFormat,
) -> Result<()> {
    let response: VirtualPodResponse = client.post("api/virtual-pods/create", &request).await?;
    let pod = response.virtual_pod;

    match format {
        OutputFormat::Json => print_json(&pod)?,
        OutputFormat::Table => print_success(&format!(
            "Created {} replaying {} from {} to {} every {}s",
            pod.id, pod.workload_file, pod.source_node, pod.dest_node, pod.interval
        )),
    }

    Ok(())
}

/// Delete a virtual pod and stop its replay
pub async fn delete_pod(client: &ApiClient, id: &str, format: OutputFormat) -> Result<()> {
    let response: VirtualPodResponse = client
        .delete::<_, ()>(&format!("api/virtual-pods/{}", id), None)
        .await?;

    match format {
        OutputFormat::Json => print_json(&response.virtual_pod)?,
        OutputFormat::Table => print_success(&format!("Deleted {}", response.virtual_pod.id)),
    }

    Ok(())
}

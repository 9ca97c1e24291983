//! Topology and container CLI commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, ContainerList, TopologyView};
use crate::output::{color_status, format_load, print_json, print_rows, OutputFormat};

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Node")]
    id: String,
    #[tabled(rename = "Type")]
    node_type: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Container")]
    container: String,
    #[tabled(rename = "Load")]
    load: String,
    #[tabled(rename = "Monitoring")]
    monitoring: String,
}

#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Node")]
    node: String,
    #[tabled(rename = "Container")]
    name: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Ports")]
    ports: String,
}

/// Show nodes, their container state and the latest load
pub async fn show_topology(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let view: TopologyView = client.get("api/topology/view").await?;

    match format {
        OutputFormat::Json => print_json(&view)?,
        OutputFormat::Table => {
            println!("{} {}", "Topology".bold(), view.name.cyan());

            let rows = view
                .nodes
                .iter()
                .map(|node| {
                    let mut endpoints: Vec<&str> =
                        node.container.urls.keys().map(String::as_str).collect();
                    endpoints.sort_unstable();
                    NodeRow {
                        id: node.id.clone(),
                        node_type: node.node_type.clone(),
                        kind: node.kind.clone(),
                        container: color_status(&node.container.status),
                        load: format_load(node.load),
                        monitoring: endpoints.join(", "),
                    }
                })
                .collect();
            print_rows(rows, "Topology has no nodes");
            println!("\n{} nodes, {} links", view.nodes.len(), view.links.len());
        }
    }

    Ok(())
}

/// List node containers and their published ports
pub async fn list_containers(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let result: ContainerList = client.get("api/containers").await?;

    match format {
        OutputFormat::Json => print_json(&result.containers)?,
        OutputFormat::Table => {
            let rows = result
                .containers
                .into_iter()
                .map(|c| ContainerRow {
                    node: c.node_name,
                    name: c.container_name,
                    id: c.container_id,
                    state: color_status(&c.state),
                    ports: c
                        .ports
                        .iter()
                        .map(|p| format!("{} {}->{}", p.service, p.container_port, p.host_port))
                        .collect::<Vec<_>>()
                        .join(", "),
                })
                .collect();
            print_rows(rows, "No node containers found");
        }
    }

    Ok(())
}

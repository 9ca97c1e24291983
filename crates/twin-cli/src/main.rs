//! Digital-twin testbed CLI
//!
//! A command-line tool for inspecting the emulated topology, managing
//! peering connections and virtual pods, and reading node metrics.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{connections, monitoring, topology, vpods};

/// Digital-twin testbed CLI
#[derive(Parser)]
#[command(name = "twinctl")]
#[command(author, version, about = "CLI for the digital-twin testbed orchestrator", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via TWIN_API_URL env var)
    #[arg(long, env = "TWIN_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show topology nodes with container state and load
    Topology,

    /// Manage peering connections between k3s nodes
    #[command(subcommand)]
    Connections(ConnectionCommands),

    /// Manage virtual pods
    #[command(subcommand)]
    Vpods(VpodCommands),

    /// List workload templates
    Templates,

    /// Show the latest CPU load per k3s node
    Load,

    /// List node containers and published ports
    Containers,

    /// Show CPU, memory and disk usage of the orchestrator host
    System,

    /// Show a node's emulated and real time series
    Timeseries {
        /// Node id
        node: String,

        /// Metric (cpu, memory, psi, power)
        #[arg(long, short, default_value = "cpu")]
        metric: String,

        /// Time window (5m, 15m, 1h, 2h)
        #[arg(long, short, default_value = "5m")]
        window: String,
    },
}

#[derive(Subcommand)]
pub enum ConnectionCommands {
    /// List confirmed connections
    List,

    /// Add a connection between two k3s nodes
    Add {
        from: String,
        to: String,

        /// Reserve the connection and let it confirm after the dwell period
        #[arg(long)]
        wait: bool,
    },

    /// Remove a connection and every virtual pod bound to it
    Remove {
        from: String,
        to: String,

        /// Only show the virtual pods that would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// List connections awaiting confirmation
    Pending,

    /// Cancel a pending connection
    Cancel { from: String, to: String },
}

#[derive(Subcommand)]
pub enum VpodCommands {
    /// List virtual pods
    List {
        /// Only pods with this node as source or destination
        #[arg(long, short)]
        node: Option<String>,
    },

    /// Create a virtual pod across a confirmed connection
    Create {
        /// Node the workload is offloaded from
        #[arg(long)]
        source: String,

        /// Node the workload is offloaded to
        #[arg(long)]
        dest: String,

        /// Workload template file name
        #[arg(long)]
        workload: String,

        /// Replay interval in seconds
        #[arg(long)]
        interval: Option<u64>,
    },

    /// Delete a virtual pod
    Delete {
        /// Virtual pod id, e.g. vp-001
        id: String,
    },
}

const DEFAULT_REPLAY_INTERVAL: u64 = 5;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::Config::load()?;
    let format = config.format(cli.format);
    let client = client::ApiClient::new(&config.api_url(cli.api_url))?;

    match cli.command {
        Commands::Topology => topology::show_topology(&client, format).await?,
        Commands::Connections(cmd) => match cmd {
            ConnectionCommands::List => connections::list_connections(&client, format).await?,
            ConnectionCommands::Add { from, to, wait } => {
                connections::add_connection(&client, &from, &to, wait, format).await?;
            }
            ConnectionCommands::Remove { from, to, dry_run } => {
                connections::remove_connection(&client, &from, &to, dry_run, format).await?;
            }
            ConnectionCommands::Pending => connections::list_pending(&client, format).await?,
            ConnectionCommands::Cancel { from, to } => {
                connections::cancel_pending(&client, &from, &to, format).await?;
            }
        },
        Commands::Vpods(cmd) => match cmd {
            VpodCommands::List { node } => vpods::list_pods(&client, node, format).await?,
            VpodCommands::Create {
                source,
                dest,
                workload,
                interval,
            } => {
                let request = client::CreatePodRequest {
                    source_node: source,
                    dest_node: dest,
                    workload_file: workload,
                    interval: interval
                        .or(config.default_interval)
                        .unwrap_or(DEFAULT_REPLAY_INTERVAL),
                };
                vpods::create_pod(&client, request, format).await?;
            }
            VpodCommands::Delete { id } => vpods::delete_pod(&client, &id, format).await?,
        },
        Commands::Templates => monitoring::list_templates(&client, format).await?,
        Commands::Load => monitoring::show_load(&client, format).await?,
        Commands::Containers => topology::list_containers(&client, format).await?,
        Commands::System => monitoring::show_system(&client, format).await?,
        Commands::Timeseries {
            node,
            metric,
            window,
        } => {
            monitoring::show_timeseries(&client, &node, &metric, &window, format).await?;
        }
    }

    Ok(())
}

//! twind - digital-twin testbed orchestrator
//!
//! Loads the emulated topology, serves the testbed API and runs the
//! background load sampling and container status polling.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use twin_lib::{
    cluster::{DockerExec, DockerKubectl},
    metrics::PrometheusBackend,
    pods::ContainerReplayer,
    topology::{ClabTopologySource, DockerStatusProbe},
    Testbed,
};
use twin_server::{api, config::TwinConfig};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting twind");

    let config = TwinConfig::load()?;
    info!(
        topology_file = %config.topology.file,
        listen = %config.listen_addr(),
        "Orchestrator configured"
    );

    let exec_timeout = Duration::from_secs(config.pods.exec_timeout_secs);
    let process_timeout = Duration::from_secs(config.pods.process_timeout_secs);
    let exec = DockerExec::new(&config.topology.container_prefix, exec_timeout);

    // Metrics backend; a disabled backend still answers, with fetch errors
    let prometheus_url = config
        .prometheus_url()
        .unwrap_or_else(|| "http://127.0.0.1:9".to_string());
    if config.prometheus_url().is_none() {
        warn!("Prometheus disabled, metrics and load sampling will report fetch errors");
    }
    let backend = PrometheusBackend::new(&prometheus_url)
        .with_context(|| format!("Invalid Prometheus URL {}", prometheus_url))?;

    let testbed = Testbed::builder()
        .topology_source(Arc::new(ClabTopologySource::new(&config.topology.file)))
        .status_probe(Arc::new(DockerStatusProbe::new(
            config.monitoring_links(),
            exec_timeout,
        )))
        .backend(Arc::new(backend))
        .cluster(Arc::new(DockerKubectl::new(
            exec.clone(),
            &config.pods.annotations_dir,
        )))
        .replayer(Arc::new(ContainerReplayer::new(
            exec,
            &config.pods.annotations_dir,
            &config.pods.replay_script,
            process_timeout,
        )))
        .templates_dir(&config.storage.workload_templates_dir)
        .connections_file(&config.storage.connections_file)
        .registry_file(&config.storage.registry_file)
        .pod_settings(config.pod_settings())
        .confirm_dwell(config.confirm_dwell())
        .build()
        .await?;
    let testbed = Arc::new(testbed);

    // Not fatal: the status poll retries the load and flips readiness
    if let Err(e) = testbed.initialize().await {
        warn!(error = %e, "Initial topology load failed");
    }

    testbed.start_background(
        Duration::from_secs(config.monitor.load_sample_secs),
        Duration::from_secs(config.topology.status_poll_secs),
    );

    let app_state = Arc::new(api::AppState::new(testbed.clone()));
    let api_handle = tokio::spawn(api::serve(config.listen_addr(), app_state));

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            testbed.shutdown("SIGINT received");
        }
        result = api_handle => {
            testbed.shutdown("API server stopped");
            result??;
        }
    }
    info!("Shutting down");

    Ok(())
}

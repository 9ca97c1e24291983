//! Background replay processes inside node containers

use crate::cluster::DockerExec;
use crate::error::{TwinError, TwinResult};
use crate::models::{ReplayHandle, WorkloadPoint};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Input of one replay run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub pod_name: String,
    pub namespace: String,
    pub source_node: String,
    pub destination_node: String,
    pub time_series: Vec<WorkloadPoint>,
}

/// Starts and stops the processes that replay a workload onto a pod
#[async_trait]
pub trait Replayer: Send + Sync {
    /// Start replaying `config` on `node` every `interval` seconds. Returns
    /// only once the process is confirmed running.
    async fn start(
        &self,
        node: &str,
        pod_id: &str,
        config: &ReplayConfig,
        interval: u64,
    ) -> TwinResult<ReplayHandle>;

    /// Stop the process. Stopping a process that is already gone succeeds;
    /// a process still alive after the bounded wait is an error.
    async fn stop(&self, handle: &ReplayHandle) -> TwinResult<()>;
}

const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// [`Replayer`] running the replay script inside the destination container
pub struct ContainerReplayer {
    exec: DockerExec,
    annotations_dir: String,
    script: String,
    confirm_timeout: Duration,
}

impl ContainerReplayer {
    pub fn new(
        exec: DockerExec,
        annotations_dir: impl Into<String>,
        script: impl Into<String>,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            exec,
            annotations_dir: annotations_dir.into().trim_end_matches('/').to_string(),
            script: script.into(),
            confirm_timeout,
        }
    }

    fn config_path(&self, pod_id: &str) -> String {
        format!("{}/virtual_pods/{}.json", self.annotations_dir, pod_id)
    }

    async fn is_alive(&self, node: &str, pid: &str) -> TwinResult<bool> {
        Ok(self.exec.exec(node, &["kill", "-0", pid], None).await?.success())
    }

    async fn write_config(&self, node: &str, path: &str, config: &ReplayConfig) -> TwinResult<()> {
        let dir = path.rsplit_once('/').map(|(d, _)| d).unwrap_or(".");
        self.exec
            .exec(node, &["mkdir", "-p", dir], None)
            .await?
            .check("create replay config directory")?;

        let body = serde_json::to_vec_pretty(config)?;
        self.exec
            .exec(node, &["bash", "-c", &format!("cat > {}", path)], Some(&body))
            .await?
            .check("write replay config")?;
        Ok(())
    }

    async fn remove_config(&self, node: &str, path: &str) {
        if let Err(e) = self.exec.exec(node, &["rm", "-f", path], None).await {
            warn!(node = %node, path = %path, error = %e, "Failed to remove replay config");
        }
    }
}

#[async_trait]
impl Replayer for ContainerReplayer {
    async fn start(
        &self,
        node: &str,
        pod_id: &str,
        config: &ReplayConfig,
        interval: u64,
    ) -> TwinResult<ReplayHandle> {
        let config_path = self.config_path(pod_id);
        self.write_config(node, &config_path, config).await?;

        let script = format!(
            "cd {dir} && nohup python3 {script} --config {cfg} --interval {interval} --loop \
             > /tmp/replayer-{id}.log 2>&1 & echo $!",
            dir = self.annotations_dir,
            script = self.script,
            cfg = config_path,
            interval = interval,
            id = pod_id,
        );
        let out = self.exec.shell(node, &script).await?;
        let pid = out.stdout.trim().to_string();
        if !out.success() || pid.is_empty() || !pid.chars().all(|c| c.is_ascii_digit()) {
            self.remove_config(node, &config_path).await;
            return Err(TwinError::Process(format!(
                "replayer did not start on {}: {}",
                node,
                out.stderr.trim()
            )));
        }

        // A replayer that dies on bad input exits almost immediately
        sleep(POLL_INTERVAL.min(self.confirm_timeout)).await;
        if !self.is_alive(node, &pid).await? {
            self.remove_config(node, &config_path).await;
            return Err(TwinError::Process(format!(
                "replayer {} on {} exited right after start, see /tmp/replayer-{}.log",
                pid, node, pod_id
            )));
        }

        info!(node = %node, pod_id = %pod_id, pid = %pid, "Started replayer");
        Ok(ReplayHandle {
            node: node.to_string(),
            pid,
            config_path,
        })
    }

    async fn stop(&self, handle: &ReplayHandle) -> TwinResult<()> {
        let node = handle.node.as_str();
        let kill = self.exec.exec(node, &["kill", &handle.pid], None).await?;
        if !kill.success() {
            debug!(node = %node, pid = %handle.pid, "Replayer already gone");
        }

        let deadline = Instant::now() + self.confirm_timeout;
        loop {
            if !self.is_alive(node, &handle.pid).await? {
                break;
            }
            if Instant::now() >= deadline {
                return Err(TwinError::Process(format!(
                    "replayer {} on {} still running after {}s",
                    handle.pid,
                    node,
                    self.confirm_timeout.as_secs()
                )));
            }
            sleep(POLL_INTERVAL).await;
        }

        self.remove_config(node, &handle.config_path).await;
        info!(node = %node, pid = %handle.pid, "Stopped replayer");
        Ok(())
    }
}

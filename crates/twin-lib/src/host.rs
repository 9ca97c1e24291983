//! Host resource usage for the machine running the testbed

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use sysinfo::{Disks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::sync::Mutex;

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// CPU sampling window
const CPU_SAMPLE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CpuUsage {
    pub percent: f64,
    pub cores: usize,
}

/// Used and total capacity of memory or a filesystem
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub percent: f64,
    pub used_gb: f64,
    pub total_gb: f64,
}

impl Usage {
    pub fn from_bytes(used: u64, total: u64) -> Self {
        let percent = if total == 0 {
            0.0
        } else {
            used as f64 / total as f64 * 100.0
        };
        Self {
            percent: round_to(percent, 1),
            used_gb: round_to(used as f64 / GIB, 2),
            total_gb: round_to(total as f64 / GIB, 2),
        }
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SystemStatus {
    pub cpu: CpuUsage,
    pub memory: Usage,
    /// Root filesystem; absent when it is not among the listed mounts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disk: Option<Usage>,
}

/// Samples host CPU, memory and root disk usage
pub struct HostStats {
    system: Mutex<System>,
}

impl Default for HostStats {
    fn default() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl HostStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// CPU usage is measured across a short window, so concurrent callers
    /// wait on each other.
    pub async fn sample(&self) -> SystemStatus {
        let mut system = self.system.lock().await;
        system.refresh_cpu();
        tokio::time::sleep(CPU_SAMPLE.max(MINIMUM_CPU_UPDATE_INTERVAL)).await;
        system.refresh_cpu();
        system.refresh_memory();

        let cores = match system.cpus().len() {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        };
        let cpu = CpuUsage {
            percent: round_to(f64::from(system.global_cpu_info().cpu_usage()), 1),
            cores,
        };
        let memory = Usage::from_bytes(system.used_memory(), system.total_memory());
        drop(system);

        let disks = Disks::new_with_refreshed_list();
        let disk = disks
            .list()
            .iter()
            .find(|d| d.mount_point() == Path::new("/"))
            .map(|d| {
                let total = d.total_space();
                Usage::from_bytes(total.saturating_sub(d.available_space()), total)
            });

        SystemStatus { cpu, memory, disk }
    }
}

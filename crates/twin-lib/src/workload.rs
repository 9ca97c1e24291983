//! Workload template catalog
//!
//! Templates are JSON files in a single directory, each holding a recorded
//! `time_series` of cpu/memory/power/psi samples.

use crate::error::{TwinError, TwinResult};
use crate::models::{WorkloadProfile, WorkloadTemplate};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

pub struct WorkloadCatalog {
    dir: PathBuf,
}

impl WorkloadCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All templates, sorted by filename. Unreadable templates are listed
    /// with zero time points.
    pub async fn list(&self) -> TwinResult<Vec<WorkloadTemplate>> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(dir = %self.dir.display(), "Workload template directory missing");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let mut templates = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let (Some(filename), Some(name)) = (
                path.file_name().and_then(|n| n.to_str()),
                path.file_stem().and_then(|n| n.to_str()),
            ) else {
                continue;
            };

            let time_points = match read_profile(&path).await {
                Ok(profile) => profile.time_series.len(),
                Err(e) => {
                    debug!(template = %filename, error = %e, "Unreadable workload template");
                    0
                }
            };

            templates.push(WorkloadTemplate {
                filename: filename.to_string(),
                name: name.to_string(),
                time_points,
            });
        }

        templates.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(templates)
    }

    /// Load a template by filename; the `.json` suffix is optional
    pub async fn load(&self, filename: &str) -> TwinResult<WorkloadProfile> {
        let path = self.resolve(filename)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => read_profile(&path).await,
            _ => Err(TwinError::NotFound(format!("workload template {}", filename))),
        }
    }

    fn resolve(&self, filename: &str) -> TwinResult<PathBuf> {
        if filename.is_empty()
            || filename.contains('/')
            || filename.contains('\\')
            || filename.starts_with('.')
        {
            return Err(TwinError::Validation(format!(
                "invalid workload template name: {:?}",
                filename
            )));
        }
        let name = if filename.ends_with(".json") {
            filename.to_string()
        } else {
            format!("{}.json", filename)
        };
        Ok(self.dir.join(name))
    }
}

async fn read_profile(path: &Path) -> TwinResult<WorkloadProfile> {
    let bytes = fs::read(path).await?;
    serde_json::from_slice(&bytes).map_err(|e| {
        TwinError::Validation(format!("invalid workload template {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with_templates() -> (tempfile::TempDir, WorkloadCatalog) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("workloadA.json"),
            r#"{"time_series":[{"cpu":120,"memory":256,"power":4.5,"psi":0.1},{"cpu":300,"memory":260}]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("broken.json"), "not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let catalog = WorkloadCatalog::new(dir.path());
        (dir, catalog)
    }

    #[tokio::test]
    async fn test_list_templates() {
        let (_dir, catalog) = catalog_with_templates();
        let templates = catalog.list().await.unwrap();

        assert_eq!(templates.len(), 2);
        assert_eq!(templates[0].filename, "broken.json");
        assert_eq!(templates[0].time_points, 0);
        assert_eq!(templates[1].name, "workloadA");
        assert_eq!(templates[1].time_points, 2);
    }

    #[tokio::test]
    async fn test_load_with_or_without_suffix() {
        let (_dir, catalog) = catalog_with_templates();

        let profile = catalog.load("workloadA").await.unwrap();
        assert_eq!(profile.time_series.len(), 2);
        assert_eq!(profile.time_series[1].power, 0.0);

        assert_eq!(catalog.load("workloadA.json").await.unwrap(), profile);
    }

    #[tokio::test]
    async fn test_unknown_template_is_not_found() {
        let (_dir, catalog) = catalog_with_templates();
        assert!(matches!(
            catalog.load("workloadZ").await,
            Err(TwinError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_path_traversal_rejected() {
        let (_dir, catalog) = catalog_with_templates();
        assert!(matches!(
            catalog.load("../etc/passwd").await,
            Err(TwinError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_directory_lists_nothing() {
        let catalog = WorkloadCatalog::new("/nonexistent/workloads");
        assert!(catalog.list().await.unwrap().is_empty());
    }
}

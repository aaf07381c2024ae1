//! Activation-time garbage collection of stale generations
//!
//! Each deploy ships a new generation tag; everything stored under any other
//! tag is garbage. The sweep runs once per activation and bounds storage
//! growth across repeated deployments.

use log::{info, warn};
use std::path::PathBuf;

use crate::store::{DurableStore, EphemeralCache};

/// Outcome of one garbage-collection sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Generation directories removed, e.g. `store-v1`, `cache-v1`
    pub removed: Vec<String>,
    /// Generation directories whose removal failed
    pub failed: Vec<String>,
}

impl SweepReport {
    /// Whether every stale generation was removed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Deletes every store and cache generation other than the current one
#[derive(Debug, Clone)]
pub struct GenerationManager {
    /// Directory holding all generations
    root: PathBuf,
    /// The one generation allowed to survive
    current: String,
}

impl GenerationManager {
    /// Creates a manager for the configured root and live generation
    pub fn new(root: PathBuf, current: impl Into<String>) -> Self {
        Self {
            root,
            current: current.into(),
        }
    }

    /// Runs the sweep over both store kinds
    ///
    /// Deletion failures for an individual generation are logged and do not
    /// abort the rest of the sweep. After a clean sweep exactly one
    /// generation of each kind remains.
    pub fn collect(&self) -> SweepReport {
        let mut report = SweepReport::default();

        for generation in DurableStore::generations(&self.root) {
            if generation == self.current {
                continue;
            }
            let label = format!("store-{}", generation);
            match DurableStore::delete_generation(&self.root, &generation) {
                Ok(()) => report.removed.push(label),
                Err(err) => {
                    warn!("failed to delete stale generation {}: {}", label, err);
                    report.failed.push(label);
                }
            }
        }

        for generation in EphemeralCache::generations(&self.root) {
            if generation == self.current {
                continue;
            }
            let label = format!("cache-{}", generation);
            match EphemeralCache::delete_generation(&self.root, &generation) {
                Ok(()) => report.removed.push(label),
                Err(err) => {
                    warn!("failed to delete stale generation {}: {}", label, err);
                    report.failed.push(label);
                }
            }
        }

        if !report.removed.is_empty() {
            info!(
                "collected {} stale generation(s): {}",
                report.removed.len(),
                report.removed.join(", ")
            );
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerConfig;
    use std::path::Path;
    use tempfile::TempDir;

    fn seed_generation(root: &Path, generation: &str) {
        DurableStore::open(root, generation).expect("store open");
        let config = LayerConfig::with_root(
            generation,
            "https://converter.example",
            "https://rates.example/v6/latest/USD",
            root.to_path_buf(),
        );
        EphemeralCache::open(&config).expect("cache open");
    }

    #[test]
    fn test_collect_removes_every_stale_generation() {
        let temp = TempDir::new().expect("temp dir");
        seed_generation(temp.path(), "v1");
        seed_generation(temp.path(), "v2");

        let report = GenerationManager::new(temp.path().to_path_buf(), "v2").collect();

        assert!(report.is_clean());
        assert_eq!(report.removed.len(), 2);
        assert!(report.removed.contains(&"store-v1".to_string()));
        assert!(report.removed.contains(&"cache-v1".to_string()));
        assert_eq!(DurableStore::generations(temp.path()), vec!["v2"]);
        assert_eq!(EphemeralCache::generations(temp.path()), vec!["v2"]);
    }

    #[test]
    fn test_collect_keeps_only_the_current_generation_data() {
        let temp = TempDir::new().expect("temp dir");
        seed_generation(temp.path(), "v2");
        let store = DurableStore::open(temp.path(), "v2").unwrap();
        store.put("key", &serde_json::json!({"kept": true})).unwrap();
        seed_generation(temp.path(), "v1");

        GenerationManager::new(temp.path().to_path_buf(), "v2").collect();

        assert_eq!(
            store.get("key").unwrap(),
            Some(serde_json::json!({"kept": true}))
        );
    }

    #[test]
    fn test_collect_on_empty_root_is_a_no_op() {
        let temp = TempDir::new().expect("temp dir");
        let report = GenerationManager::new(temp.path().to_path_buf(), "v1").collect();
        assert!(report.is_clean());
        assert!(report.removed.is_empty());
    }

    #[test]
    fn test_collect_is_idempotent() {
        let temp = TempDir::new().expect("temp dir");
        seed_generation(temp.path(), "v1");
        seed_generation(temp.path(), "v2");
        let manager = GenerationManager::new(temp.path().to_path_buf(), "v2");

        manager.collect();
        let second = manager.collect();

        assert!(second.is_clean());
        assert!(second.removed.is_empty());
    }
}

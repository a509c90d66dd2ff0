use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;
use tracing::{info, warn};

use crate::geo::GeoTable;

/// Configuration complète du kernel (kernel.yaml)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    pub data_dir: PathBuf,
    /// Export JSON de l'inventaire source lu par la phase de collecte
    pub inventory_file: PathBuf,
    pub probe: ProbeConfig,
    pub batch: BatchConfig,
    pub collection: CollectionConfig,
    pub retest: RetestConfig,
    pub geography: GeographyConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ProbeConfig {
    pub ping_command: String,
    pub udp_command: String,
    /// Timeout passé aux outils eux-mêmes (ping -W, nc -w)
    pub request_timeout_secs: u32,
    /// Délai au-delà duquel le sous-processus est tué, quoi qu'il arrive
    pub hard_timeout_ms: u64,
    pub management_port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct BatchConfig {
    pub size: usize,
    pub pause_ms: u64,
    /// Réécriture des fichiers du stockage tous les N lots (et en fin de passe)
    pub flush_every: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct CollectionConfig {
    pub department_pause_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RetestConfig {
    pub max_count: usize,
    pub batch_size: usize,
    pub pause_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
#[serde(default)]
pub struct GeographyConfig {
    /// Surcharges département → région
    pub regions: HashMap<String, String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            inventory_file: PathBuf::from("./data/inventory.json"),
            probe: ProbeConfig::default(),
            batch: BatchConfig::default(),
            collection: CollectionConfig::default(),
            retest: RetestConfig::default(),
            geography: GeographyConfig::default(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            ping_command: "ping".into(),
            udp_command: "nc".into(),
            request_timeout_secs: 2,
            hard_timeout_ms: 3000,
            management_port: 161,
        }
    }
}

impl ProbeConfig {
    pub fn hard_timeout(&self) -> Duration {
        Duration::from_millis(self.hard_timeout_ms)
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { size: 8, pause_ms: 200, flush_every: 10 }
    }
}

impl BatchConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self { department_pause_ms: 1000 }
    }
}

impl Default for RetestConfig {
    fn default() -> Self {
        Self { max_count: 100, batch_size: 8, pause_ms: 100 }
    }
}

impl RetestConfig {
    pub fn as_batch(&self) -> BatchConfig {
        BatchConfig { size: self.batch_size, pause_ms: self.pause_ms, ..BatchConfig::default() }
    }
}

impl GeographyConfig {
    pub fn table(&self) -> GeoTable {
        GeoTable::builtin().with_overrides(&self.regions)
    }
}

impl KernelConfig {
    /// Applique DSLAM_DATA_DIR / DSLAM_INVENTORY_FILE
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("DSLAM_DATA_DIR").filter(|v| !v.trim().is_empty()) {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(file) = lookup("DSLAM_INVENTORY_FILE").filter(|v| !v.trim().is_empty()) {
            self.inventory_file = PathBuf::from(file);
        }
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("DSLAM_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let mut cfg = load_config_from(&path).await;
    cfg.apply_env_overrides(|key| std::env::var(key).ok());
    cfg
}

/// Fichier absent, vide ou invalide → configuration par défaut
pub async fn load_config_from(path: impl AsRef<Path>) -> KernelConfig {
    let path = path.as_ref();
    if !path.exists() {
        info!("no {} found, using default configuration", path.display());
        return KernelConfig::default();
    }
    let txt = fs::read_to_string(path).await.unwrap_or_default();
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(&txt).unwrap_or_else(|e| {
        warn!("invalid configuration {}: {e}", path.display());
        KernelConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(dir.path().join("absent.yaml")).await;
        assert_eq!(cfg, KernelConfig::default());
        assert_eq!(cfg.batch.size, 8);
        assert_eq!(cfg.probe.hard_timeout(), Duration::from_millis(3000));
    }

    #[tokio::test]
    async fn partial_yaml_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.yaml");
        std::fs::write(
            &path,
            "batch:\n  size: 10\nprobe:\n  management_port: 1161\ngeography:\n  regions:\n    \"99\": Labo\n",
        )
        .unwrap();

        let cfg = load_config_from(&path).await;
        assert_eq!(cfg.batch.size, 10);
        assert_eq!(cfg.batch.pause_ms, 200);
        assert_eq!(cfg.batch.flush_every, 10);
        assert_eq!(cfg.probe.management_port, 1161);
        assert_eq!(cfg.probe.ping_command, "ping");
        assert_eq!(cfg.geography.table().region_of("99"), "Labo");
        assert_eq!(cfg.geography.table().region_of("14"), "Normandie");
    }

    #[tokio::test]
    async fn invalid_yaml_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kernel.yaml");
        std::fs::write(&path, "batch: [oops").unwrap();
        assert_eq!(load_config_from(&path).await, KernelConfig::default());
    }

    #[test]
    fn env_overrides_paths() {
        let mut cfg = KernelConfig::default();
        cfg.apply_env_overrides(|key| match key {
            "DSLAM_DATA_DIR" => Some("/srv/dslam".to_string()),
            "DSLAM_INVENTORY_FILE" => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(cfg.data_dir, PathBuf::from("/srv/dslam"));
        assert_eq!(cfg.inventory_file, PathBuf::from("./data/inventory.json"));
    }
}

/*!
Harnais de test pour le moteur DSLAM

Fournit en une ligne :
- Un store JSON en mémoire (ou sur disque temporaire)
- Un runner scripté à la place de ping/nc
- Une configuration sans pauses entre lots et départements
- Des assertions sur l'état persistant des DSLAM et NRA
*/

use crate::runner_stub::ScriptedRunner;
use anyhow::{bail, Context, Result};
use dslam_kernel::config::KernelConfig;
use dslam_kernel::models::{DeviceRecord, NetworkQuality};
use dslam_kernel::prober::DeviceProber;
use dslam_kernel::progress::ProgressTracker;
use dslam_kernel::scheduler::BatchScheduler;
use dslam_kernel::state::CancelFlag;
use dslam_kernel::store::{DeviceFilter, InventoryStore, JsonStore};
use dslam_kernel::Pipeline;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Active les logs de test une seule fois (RUST_LOG respecté)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Configuration par défaut, pauses à zéro
pub fn fast_config() -> KernelConfig {
    let mut config = KernelConfig::default();
    config.batch.pause_ms = 0;
    config.retest.pause_ms = 0;
    config.collection.department_pause_ms = 0;
    config
}

pub struct TestHarness {
    pub config: KernelConfig,
    pub store: Arc<dyn InventoryStore>,
    pub runner: ScriptedRunner,
    pub cancel: CancelFlag,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(JsonStore::in_memory()))
    }

    /// Store persisté dans `dir` (fichiers devices.json, nras.json, historique)
    pub fn on_disk(dir: &Path) -> Result<Self> {
        let store = JsonStore::open(dir)
            .with_context(|| format!("cannot open test store in {}", dir.display()))?;
        let mut harness = Self::with_store(Arc::new(store));
        harness.config.data_dir = dir.to_path_buf();
        Ok(harness)
    }

    pub fn with_store(store: Arc<dyn InventoryStore>) -> Self {
        init_tracing();
        let config = fast_config();
        Self {
            runner: ScriptedRunner::for_config(&config.probe),
            config,
            store,
            cancel: CancelFlag::new(),
        }
    }

    pub fn seed(&self, devices: Vec<DeviceRecord>) -> Result<usize> {
        let count = devices.len();
        for device in devices {
            self.store.upsert_device(device)?;
        }
        info!("seeded {} devices", count);
        Ok(count)
    }

    pub fn prober(&self) -> DeviceProber {
        DeviceProber::new(Arc::new(self.runner.clone()), self.config.probe.clone())
    }

    pub fn scheduler(&self) -> BatchScheduler {
        BatchScheduler::new(
            self.prober(),
            self.store.clone(),
            ProgressTracker::new(),
            self.cancel.clone(),
        )
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.config.clone(),
            self.store.clone(),
            Arc::new(self.runner.clone()),
            self.cancel.clone(),
        )
    }

    pub fn device(&self, id: &str) -> Result<DeviceRecord> {
        match self.store.get_device(id)? {
            Some(device) => Ok(device),
            None => bail!("device {id} not found"),
        }
    }

    /// Vérifie le cache de statut d'un DSLAM après test
    pub fn assert_device(&self, id: &str, functional: bool, score: u8, quality: NetworkQuality) -> Result<()> {
        let device = self.device(id)?;
        if device.functional != functional
            || device.last_score != Some(score)
            || device.last_quality != Some(quality)
        {
            bail!(
                "device {id}: expected functional={functional} score={score} quality={}, got functional={} score={:?} quality={:?}",
                quality.as_str(),
                device.functional,
                device.last_score,
                device.last_quality
            );
        }
        Ok(())
    }

    pub fn assert_parent_functional(&self, id: &str, functional: bool) -> Result<()> {
        let parent = self
            .store
            .get_parent(id)?
            .with_context(|| format!("parent {id} not found"))?;
        if parent.functional != functional {
            bail!("parent {id}: expected functional={functional}, got {}", parent.functional);
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let devices = self.store.find_devices(&DeviceFilter::all())?;
        Ok(StoreStats {
            devices: devices.len(),
            functional: devices.iter().filter(|d| d.functional).count(),
            tested: devices.iter().filter(|d| d.last_tested_at.is_some()).count(),
            parents: self.store.list_parents()?.len(),
            probe_calls: self.runner.call_count(),
        })
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    pub devices: usize,
    pub functional: usize,
    pub tested: usize,
    pub parents: usize,
    pub probe_calls: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::DeviceBuilder;

    #[tokio::test]
    async fn harness_probes_seeded_device() {
        let harness = TestHarness::new();
        harness
            .seed(vec![DeviceBuilder::new("D1", "NRA1").ipv4("192.0.2.10").build()])
            .unwrap();
        harness.runner.ping_ok("192.0.2.10", 20).udp_ok("192.0.2.10", 20);

        let devices = harness.store.find_devices(&DeviceFilter::all()).unwrap();
        let run = harness.scheduler().run_batch_probe(devices, &harness.config.batch).await;

        assert_eq!(run.processed, 1);
        harness.assert_device("D1", true, 75, NetworkQuality::Good).unwrap();
        harness.assert_parent_functional("NRA1", true).unwrap();

        let stats = harness.stats().unwrap();
        assert_eq!(stats.tested, 1);
        assert_eq!(stats.probe_calls, 2);
    }
}

/**
 * ORDONNANCEUR - Tests de connectivité par lots
 *
 * RÔLE : Fait passer une population de DSLAM dans le prober par lots de taille
 * fixe, avec une pause entre deux lots pour borner la charge réseau/noyau.
 *
 * FONCTIONNEMENT :
 * - Une tâche par DSLAM du lot (parallélisme = taille du lot)
 * - Résultat replié dans la fiche DSLAM, puis ajouté à l'historique
 * - Échec inattendu d'un DSLAM → résultat pire-cas, le lot continue
 * - Un seul résultat par DSLAM et par passe dans l'historique
 * - Après chaque lot : une agrégation des NRA touchés, flush du stockage
 *   tous les `flush_every` lots, compteurs journalisés, puis contrôle du
 *   drapeau d'annulation
 * - Lots traités dans l'ordre de la population, aucun ordre garanti dans un lot
 */

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::aggregator::Aggregator;
use crate::config::BatchConfig;
use crate::models::{ConnectivityTestResult, DeviceRecord, DeviceStatus};
use crate::prober::DeviceProber;
use crate::progress::ProgressTracker;
use crate::state::CancelFlag;
use crate::store::{rounded_percent, DeviceFilter, InventoryStore, StoreError};

/// Échec isolé au niveau d'un DSLAM
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("failed to persist result: {0}")]
    Persist(#[from] StoreError),
    #[error("probe task aborted: {0}")]
    TaskAborted(String),
}

/// Bilan d'une passe de tests par lots
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchRunReport {
    pub processed: usize,
    pub reachable: usize,
    /// DSLAM remplacés par un résultat pire-cas
    pub failures: usize,
    pub batches: usize,
    pub cancelled: bool,
    pub results: Vec<ConnectivityTestResult>,
}

/// Bilan d'un retest des DSLAM en échec
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetestReport {
    pub retested: usize,
    pub newly_functional: usize,
    pub still_failed: usize,
    pub improved_rate_percent: u8,
    pub cancelled: bool,
}

#[derive(Clone)]
pub struct BatchScheduler {
    prober: Arc<DeviceProber>,
    store: Arc<dyn InventoryStore>,
    aggregator: Aggregator,
    progress: ProgressTracker,
    cancel: CancelFlag,
}

impl BatchScheduler {
    pub fn new(
        prober: DeviceProber,
        store: Arc<dyn InventoryStore>,
        progress: ProgressTracker,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            prober: Arc::new(prober),
            aggregator: Aggregator::new(store.clone()),
            store,
            progress,
            cancel,
        }
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Teste `devices` lot par lot
    pub async fn run_batch_probe(
        &self,
        devices: Vec<DeviceRecord>,
        batch: &BatchConfig,
    ) -> BatchRunReport {
        self.run_batches("connectivity", devices, batch).await
    }

    /// Reteste au plus `max_count` DSLAM du filtre (par défaut : les non fonctionnels)
    pub async fn retest(
        &self,
        filter: &DeviceFilter,
        max_count: usize,
        batch: &BatchConfig,
    ) -> Result<RetestReport, StoreError> {
        let candidates = self
            .store
            .find_devices(&DeviceFilter { limit: Some(max_count), ..filter.clone() })?;
        info!("{} devices selected for retest (max {})", candidates.len(), max_count);

        let was_functional: HashMap<String, bool> = candidates
            .iter()
            .map(|d| (d.id.clone(), d.functional))
            .collect();

        let run = self.run_batches("retest", candidates, batch).await;
        let newly_functional = run
            .results
            .iter()
            .filter(|r| r.is_reachable && !was_functional.get(&r.device_id).copied().unwrap_or(false))
            .count();
        let retested = run.processed;

        let report = RetestReport {
            retested,
            newly_functional,
            still_failed: retested - newly_functional,
            improved_rate_percent: rounded_percent(newly_functional, retested),
            cancelled: run.cancelled,
        };
        info!(
            "retest done: {} newly functional, {} still failing ({}% improvement)",
            report.newly_functional, report.still_failed, report.improved_rate_percent
        );
        Ok(report)
    }

    async fn run_batches(
        &self,
        phase: &str,
        devices: Vec<DeviceRecord>,
        batch: &BatchConfig,
    ) -> BatchRunReport {
        let size = batch.size.max(1);
        let flush_every = batch.flush_every.max(1);
        let chunk_count = devices.len().div_ceil(size);
        let mut report = BatchRunReport::default();
        self.progress.start(phase, devices.len());
        info!("[{}] {} devices to test in {} batches of {}", phase, devices.len(), chunk_count, size);

        for (index, chunk) in devices.chunks(size).enumerate() {
            if self.cancel.is_cancelled() {
                warn!("[{}] cancelled after {} batches", phase, report.batches);
                report.cancelled = true;
                break;
            }

            let (results, failures) = self.run_one_batch(chunk).await;
            let reachable = results.iter().filter(|r| r.is_reachable).count();

            let touched: BTreeSet<String> = chunk.iter().map(|d| d.nra.trim().to_string()).collect();
            if let Err(e) = self.aggregator.refresh_parents(&touched) {
                error!("[{}] NRA aggregation failed after batch {}: {}", phase, index + 1, e);
            }
            if (index + 1) % flush_every == 0 {
                if let Err(e) = self.store.flush() {
                    error!("[{}] failed to flush store after batch {}: {}", phase, index + 1, e);
                }
            }

            report.processed += results.len();
            report.reachable += reachable;
            report.failures += failures;
            report.batches += 1;
            report.results.extend(results);
            self.progress.record_batch(chunk.len(), reachable, failures);
            self.progress.log_snapshot();

            if index + 1 < chunk_count && !batch.pause().is_zero() {
                tokio::time::sleep(batch.pause()).await;
            }
        }

        if let Err(e) = self.store.flush() {
            error!("[{}] final flush failed: {}", phase, e);
        }
        info!(
            "[{}] done: {} tested, {} reachable ({}%)",
            phase,
            report.processed,
            report.reachable,
            rounded_percent(report.reachable, report.processed)
        );
        report
    }

    /// Un lot : une tâche par DSLAM, chaque DSLAM produit exactement un résultat
    async fn run_one_batch(&self, chunk: &[DeviceRecord]) -> (Vec<ConnectivityTestResult>, usize) {
        let handles: Vec<(&DeviceRecord, JoinHandle<Result<ConnectivityTestResult, DeviceError>>)> = chunk
            .iter()
            .map(|device| {
                let task = probe_and_record(self.prober.clone(), self.store.clone(), device.clone());
                (device, tokio::spawn(task))
            })
            .collect();

        let mut results = Vec::with_capacity(chunk.len());
        let mut failures = 0;
        for (device, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => Err(DeviceError::TaskAborted(e.to_string())),
            };
            match outcome {
                Ok(result) => results.push(result),
                Err(err) => {
                    warn!("device {} test failed: {}", device.id, err);
                    failures += 1;
                    let synthetic = ConnectivityTestResult::unreachable(device, Some(err.to_string()));
                    self.record_synthetic(device, &synthetic);
                    results.push(synthetic);
                }
            }
        }
        (results, failures)
    }

    fn record_synthetic(&self, device: &DeviceRecord, result: &ConnectivityTestResult) {
        if let Err(e) = self.store.append_history(result) {
            warn!("could not record failure result for {}: {}", device.id, e);
        }
        if let Err(e) = self.store.record_status(&device.id, DeviceStatus::from(result)) {
            warn!("could not update status of {}: {}", device.id, e);
        }
    }
}

async fn probe_and_record(
    prober: Arc<DeviceProber>,
    store: Arc<dyn InventoryStore>,
    device: DeviceRecord,
) -> Result<ConnectivityTestResult, DeviceError> {
    let result = prober.test_device(&device).await;
    // historique en dernier : un échec ici ou avant laisse la place au résultat pire-cas
    store.record_status(&device.id, DeviceStatus::from(&result))?;
    store.append_history(&result)?;
    Ok(result)
}

/**
 * PIPELINE - Orchestration collecte → tests de connectivité → statistiques
 *
 * RÔLE : Point d'entrée des runs (complet ou retest) pour le binaire et les tests.
 *
 * FONCTIONNEMENT :
 * - Les échecs de département ou de DSLAM sont absorbés par les phases
 * - Seules les erreurs fatales (stockage illisible, source absente) remontent
 *   en EngineError
 * - Un CancelFlag unique est partagé par toutes les phases du run
 */

use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::collector::{CollectionReport, Collector, FeedError, InventoryFeed};
use crate::config::KernelConfig;
use crate::probes::ProcessRunner;
use crate::prober::DeviceProber;
use crate::progress::ProgressTracker;
use crate::reports::{ConnectivityReport, DetailedReport, FinalStatistics};
use crate::scheduler::{BatchRunReport, BatchScheduler, RetestReport};
use crate::state::CancelFlag;
use crate::store::{DeviceFilter, InventoryStore, StoreError};

/// Erreur fatale d'un run
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),
    #[error("inventory feed failure: {0}")]
    Feed(#[from] FeedError),
    #[error("no inventory feed configured")]
    NoFeed,
}

/// Compteurs de la phase de tests, sans le détail des résultats
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectivityPhase {
    pub processed: usize,
    pub reachable: usize,
    pub failures: usize,
    pub batches: usize,
    pub cancelled: bool,
}

impl From<&BatchRunReport> for ConnectivityPhase {
    fn from(run: &BatchRunReport) -> Self {
        Self {
            processed: run.processed,
            reachable: run.reachable,
            failures: run.failures,
            batches: run.batches,
            cancelled: run.cancelled,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    pub collection: CollectionReport,
    pub connectivity: ConnectivityPhase,
    pub statistics: FinalStatistics,
    pub duration_ms: u64,
    pub cancelled: bool,
}

pub struct Pipeline {
    config: KernelConfig,
    store: Arc<dyn InventoryStore>,
    feed: Option<Arc<dyn InventoryFeed>>,
    scheduler: BatchScheduler,
    aggregator: Aggregator,
    progress: ProgressTracker,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(
        config: KernelConfig,
        store: Arc<dyn InventoryStore>,
        runner: Arc<dyn ProcessRunner>,
        cancel: CancelFlag,
    ) -> Self {
        let progress = ProgressTracker::new();
        let prober = DeviceProber::new(runner, config.probe.clone());
        let scheduler = BatchScheduler::new(prober, store.clone(), progress.clone(), cancel.clone());
        Self {
            aggregator: Aggregator::new(store.clone()),
            config,
            store,
            feed: None,
            scheduler,
            progress,
            cancel,
        }
    }

    pub fn with_feed(mut self, feed: Arc<dyn InventoryFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    pub fn store(&self) -> &Arc<dyn InventoryStore> {
        &self.store
    }

    /// Collecte, test de toute la population, statistiques finales
    pub async fn run_complete(&self) -> Result<ProcessingReport, EngineError> {
        let feed = self.feed.clone().ok_or(EngineError::NoFeed)?;
        let started = Instant::now();
        info!("complete run started");

        self.progress.set_phase("collection");
        let collector = Collector::new(
            feed,
            self.store.clone(),
            self.config.geography.table(),
            self.config.collection.clone(),
            self.cancel.clone(),
        );
        let collection = collector.collect_all().await;

        let connectivity = if self.cancel.is_cancelled() {
            warn!("run cancelled, connectivity phase skipped");
            ConnectivityPhase { cancelled: true, ..ConnectivityPhase::default() }
        } else {
            ConnectivityPhase::from(&self.test_connectivity().await?)
        };

        self.progress.set_phase("statistics");
        let statistics = self.final_statistics()?;
        let cancelled = collection.cancelled || connectivity.cancelled;

        let report = ProcessingReport {
            collection,
            connectivity,
            statistics,
            duration_ms: started.elapsed().as_millis() as u64,
            cancelled,
        };
        info!(
            "complete run finished in {}s: {} DSLAM tested, {} reachable ({}%)",
            report.duration_ms / 1000,
            report.statistics.total_tested,
            report.statistics.total_reachable,
            report.statistics.global_reachability_rate
        );
        Ok(report)
    }

    /// Phase 2 seule : toute la population, lots de la configuration
    pub async fn test_connectivity(&self) -> Result<BatchRunReport, EngineError> {
        let devices = self.store.find_devices(&DeviceFilter::all())?;
        Ok(self.scheduler.run_batch_probe(devices, &self.config.batch).await)
    }

    /// Retest des DSLAM non fonctionnels, `max` par défaut depuis la configuration
    pub async fn retest_failed(&self, max: Option<usize>) -> Result<RetestReport, EngineError> {
        let max = max.unwrap_or(self.config.retest.max_count);
        let report = self
            .scheduler
            .retest(&DeviceFilter::non_functional(), max, &self.config.retest.as_batch())
            .await?;
        Ok(report)
    }

    pub fn final_statistics(&self) -> Result<FinalStatistics, EngineError> {
        let devices = self.store.find_devices(&DeviceFilter::all())?;
        Ok(FinalStatistics::from_devices(&devices))
    }

    /// Statistiques sur le dernier résultat de chaque DSLAM, globales et par zone
    pub fn connectivity_stats(&self) -> Result<ConnectivityReport, EngineError> {
        let results = self.store.latest_results()?;
        let devices = self.store.find_devices(&DeviceFilter::all())?;
        Ok(ConnectivityReport::build(&results, &devices))
    }

    pub fn detailed_report(&self, department: Option<&str>) -> Result<DetailedReport, EngineError> {
        let devices = self.store.find_devices(&DeviceFilter::all())?;
        Ok(DetailedReport::build(&devices, department))
    }

    /// Recalcule tous les NRA sans relancer de test
    pub fn refresh_parents(&self) -> Result<usize, EngineError> {
        Ok(self.aggregator.refresh_all()?)
    }
}

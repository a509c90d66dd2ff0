/**
 * DSLAM KERNEL - Moteur de test de connectivité du parc DSLAM/NRA
 *
 * RÔLE : Inventaire des DSLAM et de leurs NRA, sondes de joignabilité IPv4/IPv6,
 * score 0-100 et qualité réseau par DSLAM, statut dérivé par NRA.
 *
 * ARCHITECTURE : sondes → prober → scoring → ordonnanceur par lots → agrégateur,
 * avec un port de stockage (InventoryStore) et une source d'inventaire (InventoryFeed).
 */

pub mod aggregator;
pub mod collector;
pub mod config;
pub mod geo;
pub mod models;
pub mod pipeline;
pub mod prober;
pub mod probes;
pub mod progress;
pub mod reports;
pub mod scheduler;
pub mod scoring;
pub mod state;
pub mod store;

pub use aggregator::{Aggregator, GroupSummary};
pub use collector::{Collector, FeedRecord, InventoryFeed, JsonFeed, PhaseResult};
pub use config::{load_config, KernelConfig};
pub use geo::GeoTable;
pub use models::{ConnectivityTestResult, DeviceRecord, NetworkQuality, ParentNodeRecord, Zone};
pub use pipeline::{EngineError, Pipeline, ProcessingReport};
pub use prober::DeviceProber;
pub use probes::{ProbeCommand, ProbeOutcome, ProcessRunner, RunOutcome, SystemRunner};
pub use progress::ProgressTracker;
pub use scheduler::{BatchRunReport, BatchScheduler, DeviceError, RetestReport};
pub use state::CancelFlag;
pub use store::{DeviceFilter, InventoryStore, JsonStore, StoreError};

/**
 * COLLECTE - Phase 1 : import de l'inventaire DSLAM/NRA par département
 *
 * RÔLE : Lit la source d'inventaire département par département et alimente
 * le stockage (upsert DSLAM puis NRA dérivés).
 *
 * FONCTIONNEMENT :
 * - Départements parcourus dans l'ordre de la table géographique
 * - Aucun résultat ou erreur de lecture → département en échec, on continue
 * - Erreurs d'upsert collectées par fiche sans interrompre le département
 * - Région et typologie de zone calculées à l'import
 * - Pause configurable entre deux départements
 */

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::aggregator::parent_from_members;
use crate::config::CollectionConfig;
use crate::geo::GeoTable;
use crate::models::{DeviceRecord, ParentNodeRecord, Zone};
use crate::state::CancelFlag;
use crate::store::InventoryStore;

/// Fiche telle que fournie par la source d'inventaire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRecord {
    #[serde(alias = "dslam")]
    pub id: String,
    pub nra: String,
    #[serde(alias = "ville", default)]
    pub city: String,
    #[serde(alias = "localisation", default)]
    pub location: String,
    #[serde(default)]
    pub ipv4: Option<String>,
    #[serde(default)]
    pub ipv6: Option<String>,
    #[serde(alias = "dateInstallation", default)]
    pub installed_on: String,
    #[serde(alias = "dateMiseEnService", default)]
    pub in_service_on: String,
    #[serde(alias = "departement", default)]
    pub department: Option<String>,
    #[serde(alias = "codePostal", default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub population: Option<u32>,
}

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid feed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("feed unavailable: {0}")]
    Unavailable(String),
}

/// Source d'inventaire interrogée par département
#[async_trait]
pub trait InventoryFeed: Send + Sync {
    async fn fetch_department(&self, code: &str) -> Result<Vec<FeedRecord>, FeedError>;
}

/// Export JSON (tableau de fiches) chargé une fois en mémoire
pub struct JsonFeed {
    path: Option<PathBuf>,
    records: Vec<FeedRecord>,
}

impl JsonFeed {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, FeedError> {
        let path = path.as_ref();
        let txt = tokio::fs::read_to_string(path).await?;
        let records: Vec<FeedRecord> = serde_json::from_str(&txt)?;
        info!("inventory feed {} loaded: {} records", path.display(), records.len());
        Ok(Self { path: Some(path.to_path_buf()), records })
    }

    pub fn from_records(records: Vec<FeedRecord>) -> Self {
        Self { path: None, records }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl InventoryFeed for JsonFeed {
    async fn fetch_department(&self, code: &str) -> Result<Vec<FeedRecord>, FeedError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.department.as_deref().map(str::trim) == Some(code))
            .cloned()
            .collect())
    }
}

/// Erreur enregistrée dans le bilan d'une phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhaseFailure {
    Device { id: String, reason: String },
    Parent { id: String, reason: String },
    Department { code: String, reason: String },
}

/// Bilan d'une phase sur un département
#[derive(Debug, Clone, Serialize)]
pub struct PhaseResult {
    pub phase: String,
    pub department: String,
    pub success: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub ended_at: OffsetDateTime,
    pub duration_ms: u64,
    pub items_processed: usize,
    pub items_successful: usize,
    pub items_failed: usize,
    pub errors: Vec<PhaseFailure>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CollectionReport {
    pub departments: usize,
    pub phases: Vec<PhaseResult>,
    pub devices_collected: usize,
    pub parents_collected: usize,
    pub total_errors: usize,
    pub duration_ms: u64,
    pub cancelled: bool,
}

impl CollectionReport {
    pub fn failed_departments(&self) -> impl Iterator<Item = &PhaseResult> {
        self.phases.iter().filter(|p| !p.success)
    }
}

pub struct Collector {
    feed: Arc<dyn InventoryFeed>,
    store: Arc<dyn InventoryStore>,
    geo: GeoTable,
    config: CollectionConfig,
    cancel: CancelFlag,
}

impl Collector {
    pub fn new(
        feed: Arc<dyn InventoryFeed>,
        store: Arc<dyn InventoryStore>,
        geo: GeoTable,
        config: CollectionConfig,
        cancel: CancelFlag,
    ) -> Self {
        Self { feed, store, geo, config, cancel }
    }

    pub async fn collect_all(&self) -> CollectionReport {
        let started = Instant::now();
        let departments = self.geo.departments();
        let mut report = CollectionReport { departments: departments.len(), ..Default::default() };
        info!("collection of {} departments started", departments.len());

        for (i, code) in departments.iter().enumerate() {
            if self.cancel.is_cancelled() {
                warn!("collection cancelled before department {}", code);
                report.cancelled = true;
                break;
            }
            info!("[{}/{}] collecting department {}", i + 1, departments.len(), code);

            let (phase, devices, parents) = self.collect_department(code).await;
            if phase.success {
                info!(
                    "department {} done: {} DSLAM, {} NRA ({}ms)",
                    code, devices, parents, phase.duration_ms
                );
            }
            report.devices_collected += devices;
            report.parents_collected += parents;
            report.total_errors += phase.errors.len();
            report.phases.push(phase);

            if i + 1 < departments.len() && self.config.department_pause_ms > 0 {
                tokio::time::sleep(std::time::Duration::from_millis(self.config.department_pause_ms)).await;
            }
        }

        if let Err(e) = self.store.flush() {
            error!("failed to flush store after collection: {}", e);
        }
        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "collection finished: {} DSLAM, {} NRA, {} errors in {}s",
            report.devices_collected,
            report.parents_collected,
            report.total_errors,
            report.duration_ms / 1000
        );
        report
    }

    /// Retourne le bilan et les nombres de DSLAM et NRA lus
    pub async fn collect_department(&self, code: &str) -> (PhaseResult, usize, usize) {
        let started_at = OffsetDateTime::now_utc();
        let clock = Instant::now();

        let records = match self.feed.fetch_department(code).await {
            Ok(records) if records.is_empty() => {
                return (failed_phase(code, started_at, clock, "no result found".into()), 0, 0)
            }
            Ok(records) => records,
            Err(e) => return (failed_phase(code, started_at, clock, e.to_string()), 0, 0),
        };

        let mut errors = Vec::new();
        let mut successful = 0;

        let mut devices = Vec::with_capacity(records.len());
        for record in records {
            match self.to_device(code, record) {
                Ok(device) => devices.push(device),
                Err(failure) => errors.push(failure),
            }
        }

        for device in &devices {
            match self.store.upsert_device(device.clone()) {
                Ok(outcome) if outcome.changed() => successful += 1,
                Ok(_) => {}
                Err(e) => errors.push(PhaseFailure::Device { id: device.id.clone(), reason: e.to_string() }),
            }
        }

        let parents = derive_parents(&devices);
        for parent in &parents {
            match self.store.upsert_parent(parent.clone()) {
                Ok(outcome) if outcome.changed() => successful += 1,
                Ok(_) => {}
                Err(e) => errors.push(PhaseFailure::Parent { id: parent.id.clone(), reason: e.to_string() }),
            }
        }

        if !errors.is_empty() {
            warn!("department {}: {} records rejected", code, errors.len());
        }

        let phase = PhaseResult {
            phase: "collection".into(),
            department: code.to_string(),
            success: true,
            started_at,
            ended_at: OffsetDateTime::now_utc(),
            duration_ms: clock.elapsed().as_millis() as u64,
            items_processed: devices.len() + parents.len(),
            items_successful: successful,
            items_failed: errors.len(),
            errors,
        };
        (phase, devices.len(), parents.len())
    }

    fn to_device(&self, code: &str, record: FeedRecord) -> Result<DeviceRecord, PhaseFailure> {
        let id = record.id.trim().to_string();
        if id.is_empty() {
            return Err(PhaseFailure::Device { id, reason: "missing identifier".into() });
        }
        let department = record
            .department
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| code.to_string());

        let mut device = DeviceRecord::new(id, record.nra.trim());
        device.zone = Zone::classify(&record.city, record.population);
        device.region = self.geo.region_of(&department).to_string();
        device.department = department;
        device.city = record.city;
        device.location = record.location;
        device.ipv4 = record.ipv4;
        device.ipv6 = record.ipv6;
        device.installed_on = record.installed_on;
        device.in_service_on = record.in_service_on;
        device.postal_code = record.postal_code;
        device.population = record.population;
        Ok(device)
    }
}

/// NRA du département, dans l'ordre de première apparition
pub fn derive_parents(devices: &[DeviceRecord]) -> Vec<ParentNodeRecord> {
    let mut order: Vec<&str> = Vec::new();
    let mut members: HashMap<&str, Vec<DeviceRecord>> = HashMap::new();
    for device in devices {
        let key = device.nra.trim();
        if key.is_empty() {
            continue;
        }
        members
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(device.clone());
    }
    order
        .into_iter()
        .filter_map(|key| members.get(key).and_then(|m| parent_from_members(m)))
        .collect()
}

fn failed_phase(code: &str, started_at: OffsetDateTime, clock: Instant, reason: String) -> PhaseResult {
    error!("department {} failed: {}", code, reason);
    PhaseResult {
        phase: "collection".into(),
        department: code.to_string(),
        success: false,
        started_at,
        ended_at: OffsetDateTime::now_utc(),
        duration_ms: clock.elapsed().as_millis() as u64,
        items_processed: 0,
        items_successful: 0,
        items_failed: 1,
        errors: vec![PhaseFailure::Department { code: code.to_string(), reason }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonStore;

    fn record(id: &str, nra: &str, dept: &str, city: &str) -> FeedRecord {
        FeedRecord {
            id: id.into(),
            nra: nra.into(),
            city: city.into(),
            location: String::new(),
            ipv4: Some("10.0.0.1".into()),
            ipv6: Some("N/A".into()),
            installed_on: "2010-01-01".into(),
            in_service_on: "2010-02-01".into(),
            department: Some(dept.into()),
            postal_code: None,
            population: None,
        }
    }

    fn geo() -> GeoTable {
        GeoTable::from_pairs(
            [("14", "Normandie"), ("76", "Normandie"), ("2A", "Corse")]
                .iter()
                .map(|(d, r)| (d.to_string(), r.to_string())),
        )
    }

    struct Broken;

    #[async_trait]
    impl InventoryFeed for Broken {
        async fn fetch_department(&self, code: &str) -> Result<Vec<FeedRecord>, FeedError> {
            if code == "14" {
                Err(FeedError::Unavailable("source down".into()))
            } else {
                Ok(vec![record("R1", "NRA-R", code, "Rouen")])
            }
        }
    }

    fn collector(feed: Arc<dyn InventoryFeed>, store: Arc<JsonStore>) -> Collector {
        Collector::new(
            feed,
            store,
            geo(),
            CollectionConfig { department_pause_ms: 0 },
            CancelFlag::new(),
        )
    }

    #[test]
    fn feed_accepts_source_field_names() {
        let json = r#"[{"dslam":"D1","nra":"N1","ville":"Rouen","localisation":"Rue X",
            "ipv4":"10.0.0.1","ipv6":"N/A","dateInstallation":"2010","dateMiseEnService":"2011",
            "departement":"76"}]"#;
        let records: Vec<FeedRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].id, "D1");
        assert_eq!(records[0].city, "Rouen");
        assert_eq!(records[0].department.as_deref(), Some("76"));
    }

    #[tokio::test]
    async fn empty_department_is_a_failed_phase() {
        let store = Arc::new(JsonStore::in_memory());
        let feed = Arc::new(JsonFeed::from_records(vec![
            record("D1", "N1", "76", "Rouen"),
            record("D2", "N1", "76", ""),
            record("D3", "N2", "76", "Saint-Saëns"),
        ]));
        let report = collector(feed, store.clone()).collect_all().await;

        assert_eq!(report.departments, 3);
        assert_eq!(report.devices_collected, 3);
        assert_eq!(report.parents_collected, 2);
        let failed: Vec<&str> = report.failed_departments().map(|p| p.department.as_str()).collect();
        assert_eq!(failed, vec!["14", "2A"]);

        let d1 = store.get_device("D1").unwrap().unwrap();
        assert_eq!(d1.region, "Normandie");
        assert_eq!(d1.zone, Zone::Urban);
        assert_eq!(store.get_device("D3").unwrap().unwrap().zone, Zone::Rural);

        let n1 = store.get_parent("N1").unwrap().unwrap();
        assert_eq!(n1.device_count, 2);
        assert!(!n1.functional);
    }

    #[tokio::test]
    async fn fetch_error_does_not_stop_the_scan() {
        let store = Arc::new(JsonStore::in_memory());
        let report = collector(Arc::new(Broken), store.clone()).collect_all().await;

        let phase_14 = report.phases.iter().find(|p| p.department == "14").unwrap();
        assert!(!phase_14.success);
        assert_eq!(phase_14.items_successful, 0);
        assert_eq!(
            phase_14.errors,
            vec![PhaseFailure::Department { code: "14".into(), reason: "feed unavailable: source down".into() }]
        );
        assert!(report.phases.iter().filter(|p| p.department != "14").all(|p| p.success));
        assert!(store.get_device("R1").unwrap().is_some());
    }

    #[tokio::test]
    async fn second_collection_updates_without_duplicating() {
        let store = Arc::new(JsonStore::in_memory());
        let feed = Arc::new(JsonFeed::from_records(vec![record("D1", "N1", "76", "Rouen")]));
        let c = collector(feed, store.clone());

        let (first, _, _) = c.collect_department("76").await;
        let created = store.get_device("D1").unwrap().unwrap().created_at;
        let (second, _, _) = c.collect_department("76").await;

        assert_eq!(first.items_successful, 2);
        assert_eq!(second.items_successful, 2);
        assert_eq!(store.find_devices(&Default::default()).unwrap().len(), 1);
        assert_eq!(store.get_device("D1").unwrap().unwrap().created_at, created);
    }

    #[tokio::test]
    async fn blank_identifier_is_rejected_per_record() {
        let store = Arc::new(JsonStore::in_memory());
        let feed = Arc::new(JsonFeed::from_records(vec![
            record("  ", "N1", "76", "Rouen"),
            record("D2", "N1", "76", "Rouen"),
        ]));
        let (phase, devices, _) = collector(feed, store).collect_department("76").await;
        assert!(phase.success);
        assert_eq!(devices, 1);
        assert_eq!(phase.items_failed, 1);
    }
}

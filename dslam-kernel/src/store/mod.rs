/**
 * STOCKAGE - Port de persistance de l'inventaire DSLAM/NRA
 *
 * RÔLE :
 * Interface unique entre le moteur et le stockage durable : fiches DSLAM,
 * fiches NRA, historique des tests de connectivité.
 *
 * FONCTIONNEMENT :
 * - InventoryStore = trait synchrone, implémenté par JsonStore (fichiers JSON)
 * - DeviceFilter = critères de sélection (fonctionnel, département, NRA, limite)
 * - devices_by_nra = membres de plusieurs NRA en une lecture (agrégation par lot)
 * - Upsert par identifiant unique : insertion au premier passage, mise à jour ensuite,
 *   date de création jamais écrasée
 * - Historique en ajout seul
 * - aggregate_by = comptages groupés, vues en lecture seule recalculées à la demande
 */

pub mod json;

pub use json::JsonStore;

use std::collections::{BTreeSet, HashMap};
use time::OffsetDateTime;

use crate::models::{ConnectivityTestResult, DeviceRecord, DeviceStatus, ParentNodeRecord};

/// Erreurs du port de stockage
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Sélection de DSLAM, appliquée dans l'ordre de la population
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceFilter {
    pub functional: Option<bool>,
    pub department: Option<String>,
    pub nra: Option<String>,
    /// Nombre max de fiches retournées
    pub limit: Option<usize>,
}

impl DeviceFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn non_functional() -> Self {
        Self { functional: Some(false), ..Self::default() }
    }

    pub fn in_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn in_nra(mut self, nra: impl Into<String>) -> Self {
        self.nra = Some(nra.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Critères hors limite
    pub fn matches(&self, device: &DeviceRecord) -> bool {
        if let Some(functional) = self.functional {
            if device.functional != functional {
                return false;
            }
        }
        if let Some(dept) = &self.department {
            if device.department != *dept {
                return false;
            }
        }
        if let Some(nra) = &self.nra {
            if device.nra.trim() != nra.trim() {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpsertOutcome {
    pub inserted: bool,
    pub updated: bool,
}

impl UpsertOutcome {
    pub fn inserted() -> Self {
        Self { inserted: true, updated: false }
    }

    pub fn updated() -> Self {
        Self { inserted: false, updated: true }
    }

    pub fn changed(&self) -> bool {
        self.inserted || self.updated
    }
}

/// État dérivé d'un NRA, écrit uniquement par l'agrégation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParentStatus {
    pub functional: bool,
    pub device_count: u32,
    pub functional_rate: u8,
    pub aggregated_at: OffsetDateTime,
}

/// Champ de regroupement des DSLAM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupField {
    Department,
    Region,
    Nra,
    Quality,
    Zone,
}

impl GroupField {
    pub fn key_of(&self, device: &DeviceRecord) -> String {
        match self {
            GroupField::Department => device.department.clone(),
            GroupField::Region => device.region.clone(),
            GroupField::Nra => device.nra.trim().to_string(),
            GroupField::Quality => device
                .last_quality
                .map(|q| q.as_str().to_string())
                .unwrap_or_default(),
            GroupField::Zone => device.zone.as_str().to_string(),
        }
    }
}

/// Comptages d'un groupe de DSLAM
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GroupCounts {
    pub key: String,
    pub total: usize,
    pub functional: usize,
    /// Somme et nombre des scores connus, pour la moyenne
    pub score_sum: u64,
    pub scored: usize,
    pub last_tested_at: Option<OffsetDateTime>,
}

impl GroupCounts {
    fn add(&mut self, device: &DeviceRecord) {
        self.total += 1;
        if device.functional {
            self.functional += 1;
        }
        if let Some(score) = device.last_score {
            self.score_sum += u64::from(score);
            self.scored += 1;
        }
        if let Some(at) = device.last_tested_at {
            self.last_tested_at = Some(self.last_tested_at.map_or(at, |cur| cur.max(at)));
        }
    }

    pub fn rate(&self) -> u8 {
        rounded_percent(self.functional, self.total)
    }

    pub fn average_score(&self) -> Option<f64> {
        (self.scored > 0).then(|| self.score_sum as f64 / self.scored as f64)
    }
}

/// Pourcentage arrondi à l'entier le plus proche, 0 si total nul
pub fn rounded_percent(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((part as f64 / total as f64) * 100.0).round().clamp(0.0, 100.0) as u8
}

/// Regroupe des DSLAM, dans l'ordre de première apparition des clés
pub fn group_devices(devices: &[DeviceRecord], field: GroupField) -> Vec<GroupCounts> {
    let mut order: Vec<GroupCounts> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for device in devices {
        let key = field.key_of(device);
        let slot = *index.entry(key.clone()).or_insert_with(|| {
            order.push(GroupCounts { key, ..GroupCounts::default() });
            order.len() - 1
        });
        order[slot].add(device);
    }
    order
}

/// Interface de persistance consommée par le moteur
pub trait InventoryStore: Send + Sync {
    fn find_devices(&self, filter: &DeviceFilter) -> Result<Vec<DeviceRecord>, StoreError>;

    fn get_device(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError>;

    /// Les champs de statut et la date de création d'une fiche existante sont conservés
    fn upsert_device(&self, record: DeviceRecord) -> Result<UpsertOutcome, StoreError>;

    /// Replie le dernier résultat de test dans la fiche (NotFound si inconnue)
    fn record_status(&self, id: &str, status: DeviceStatus) -> Result<(), StoreError>;

    fn count_devices(&self, filter: &DeviceFilter) -> Result<usize, StoreError> {
        let unbounded = DeviceFilter { limit: None, ..filter.clone() };
        let count = self.find_devices(&unbounded)?.len();
        Ok(filter.limit.map_or(count, |limit| count.min(limit)))
    }

    /// Membres de chaque NRA demandé, en une seule lecture ; un NRA sans membre
    /// est présent avec une liste vide
    fn devices_by_nra(
        &self,
        nra_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, Vec<DeviceRecord>>, StoreError> {
        let mut members: HashMap<String, Vec<DeviceRecord>> =
            nra_ids.iter().map(|id| (id.trim().to_string(), Vec::new())).collect();
        for device in self.find_devices(&DeviceFilter::all())? {
            if let Some(list) = members.get_mut(device.nra.trim()) {
                list.push(device);
            }
        }
        Ok(members)
    }

    fn get_parent(&self, id: &str) -> Result<Option<ParentNodeRecord>, StoreError>;

    fn list_parents(&self) -> Result<Vec<ParentNodeRecord>, StoreError>;

    /// L'état dérivé (fonctionnel, taux) d'un NRA existant est conservé
    fn upsert_parent(&self, record: ParentNodeRecord) -> Result<UpsertOutcome, StoreError>;

    fn set_parent_status(&self, id: &str, status: ParentStatus) -> Result<(), StoreError>;

    fn append_history(&self, result: &ConnectivityTestResult) -> Result<(), StoreError>;

    /// Historique d'un DSLAM, du plus ancien au plus récent
    fn history_for(&self, device_id: &str) -> Result<Vec<ConnectivityTestResult>, StoreError>;

    /// Dernier résultat de chaque DSLAM testé
    fn latest_results(&self) -> Result<Vec<ConnectivityTestResult>, StoreError>;

    fn aggregate_by(
        &self,
        field: GroupField,
        filter: &DeviceFilter,
    ) -> Result<Vec<GroupCounts>, StoreError> {
        let devices = self.find_devices(&DeviceFilter { limit: None, ..filter.clone() })?;
        Ok(group_devices(&devices, field))
    }

    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/**
 * STORE JSON - Implémentation fichier de l'InventoryStore
 *
 * FONCTIONNEMENT :
 * - Cache mémoire (parking_lot) dans l'ordre d'insertion = ordre de la population
 * - devices.json / nras.json réécrits en entier à chaque flush
 * - connectivity_history.jsonl : une ligne JSON ajoutée par résultat, fichier
 *   ouvert une fois et tamponné, vidé à chaque flush (et à la fermeture)
 * - Sans répertoire de données, tout reste en mémoire
 */

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{info, warn};

use super::{DeviceFilter, InventoryStore, ParentStatus, StoreError, UpsertOutcome};
use crate::models::{ConnectivityTestResult, DeviceRecord, DeviceStatus, ParentNodeRecord};

const DEVICES_FILE: &str = "devices.json";
const PARENTS_FILE: &str = "nras.json";
const HISTORY_FILE: &str = "connectivity_history.jsonl";

trait Keyed {
    fn key(&self) -> &str;

    /// Clé de regroupement indexée (NRA d'un DSLAM)
    fn group(&self) -> Option<&str> {
        None
    }
}

impl Keyed for DeviceRecord {
    fn key(&self) -> &str {
        &self.id
    }

    fn group(&self) -> Option<&str> {
        Some(self.nra.trim())
    }
}

impl Keyed for ParentNodeRecord {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Table ordonnée avec index unique et index de regroupement
#[derive(Debug)]
struct Table<T> {
    rows: Vec<T>,
    index: HashMap<String, usize>,
    /// groupe → positions, croissantes
    groups: HashMap<String, Vec<usize>>,
}

impl<T: Keyed> Table<T> {
    fn new() -> Self {
        Self { rows: Vec::new(), index: HashMap::new(), groups: HashMap::new() }
    }

    fn from_rows(rows: Vec<T>) -> Self {
        let mut table = Self::new();
        for row in rows {
            table.put(row);
        }
        table
    }

    fn get(&self, key: &str) -> Option<&T> {
        self.index.get(key).map(|&pos| &self.rows[pos])
    }

    /// Modification sur place, sans toucher à la clé de regroupement
    fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        match self.index.get(key) {
            Some(&pos) => self.rows.get_mut(pos),
            None => None,
        }
    }

    /// Insère ou remplace la ligne de même clé, en gardant sa position
    fn put(&mut self, row: T) {
        match self.index.get(row.key()).copied() {
            Some(pos) => {
                self.detach(pos);
                self.rows[pos] = row;
                self.attach(pos);
            }
            None => {
                let pos = self.rows.len();
                self.index.insert(row.key().to_string(), pos);
                self.rows.push(row);
                self.attach(pos);
            }
        }
    }

    fn attach(&mut self, pos: usize) {
        if let Some(group) = self.rows[pos].group() {
            let slots = self.groups.entry(group.to_string()).or_default();
            if let Err(at) = slots.binary_search(&pos) {
                slots.insert(at, pos);
            }
        }
    }

    fn detach(&mut self, pos: usize) {
        if let Some(group) = self.rows[pos].group() {
            if let Some(slots) = self.groups.get_mut(group) {
                slots.retain(|&p| p != pos);
            }
        }
    }

    fn members(&self, group: &str) -> impl Iterator<Item = &T> + '_ {
        self.groups
            .get(group)
            .into_iter()
            .flatten()
            .map(move |&pos| &self.rows[pos])
    }
}

pub struct JsonStore {
    data_dir: Option<PathBuf>,
    devices: Mutex<Table<DeviceRecord>>,
    parents: Mutex<Table<ParentNodeRecord>>,
    history: Mutex<Vec<ConnectivityTestResult>>,
    history_log: Mutex<Option<BufWriter<File>>>,
}

impl JsonStore {
    pub fn in_memory() -> Self {
        Self {
            data_dir: None,
            devices: Mutex::new(Table::new()),
            parents: Mutex::new(Table::new()),
            history: Mutex::new(Vec::new()),
            history_log: Mutex::new(None),
        }
    }

    /// Ouvre (ou crée) le répertoire de données et recharge son contenu
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = data_dir.into();
        fs::create_dir_all(&dir)?;

        let devices: Vec<DeviceRecord> = load_array(&dir.join(DEVICES_FILE))?;
        let parents: Vec<ParentNodeRecord> = load_array(&dir.join(PARENTS_FILE))?;
        let history = load_history(&dir.join(HISTORY_FILE))?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(HISTORY_FILE))?;

        info!(
            "store opened at {}: {} devices, {} NRA, {} history entries",
            dir.display(),
            devices.len(),
            parents.len(),
            history.len()
        );

        Ok(Self {
            data_dir: Some(dir),
            devices: Mutex::new(Table::from_rows(devices)),
            parents: Mutex::new(Table::from_rows(parents)),
            history: Mutex::new(history),
            history_log: Mutex::new(Some(BufWriter::new(log))),
        })
    }

    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    fn save_array<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<(), StoreError> {
        if let Some(dir) = &self.data_dir {
            let json = serde_json::to_string_pretty(rows)?;
            let tmp = dir.join(format!("{name}.tmp"));
            fs::write(&tmp, json)?;
            fs::rename(&tmp, dir.join(name))?;
        }
        Ok(())
    }
}

fn load_array<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

fn load_history(path: &Path) -> Result<Vec<ConnectivityTestResult>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (n, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!("skipping history line {} of {}: {}", n + 1, path.display(), e),
        }
    }
    Ok(entries)
}

impl InventoryStore for JsonStore {
    fn find_devices(&self, filter: &DeviceFilter) -> Result<Vec<DeviceRecord>, StoreError> {
        let devices = self.devices.lock();
        let matching = devices.rows.iter().filter(|d| filter.matches(d)).cloned();
        Ok(match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    fn get_device(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        Ok(self.devices.lock().get(id).cloned())
    }

    fn upsert_device(&self, mut record: DeviceRecord) -> Result<UpsertOutcome, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut devices = self.devices.lock();
        let outcome = match devices.get(&record.id) {
            Some(existing) => {
                record.created_at = existing.created_at;
                record.functional = existing.functional;
                record.last_tested_at = existing.last_tested_at;
                record.last_score = existing.last_score;
                record.last_quality = existing.last_quality;
                UpsertOutcome::updated()
            }
            None => {
                record.created_at = now;
                UpsertOutcome::inserted()
            }
        };
        record.modified_at = now;
        // le NRA peut changer : put() réindexe
        devices.put(record);
        Ok(outcome)
    }

    fn devices_by_nra(
        &self,
        nra_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, Vec<DeviceRecord>>, StoreError> {
        let devices = self.devices.lock();
        Ok(nra_ids
            .iter()
            .map(|id| (id.trim().to_string(), devices.members(id.trim()).cloned().collect()))
            .collect())
    }

    fn record_status(&self, id: &str, status: DeviceStatus) -> Result<(), StoreError> {
        let mut devices = self.devices.lock();
        let device = devices
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("device {id}")))?;
        device.functional = status.functional;
        device.last_tested_at = status.last_tested_at;
        device.last_score = status.last_score;
        device.last_quality = status.last_quality;
        device.modified_at = OffsetDateTime::now_utc();
        Ok(())
    }

    fn get_parent(&self, id: &str) -> Result<Option<ParentNodeRecord>, StoreError> {
        Ok(self.parents.lock().get(id.trim()).cloned())
    }

    fn list_parents(&self) -> Result<Vec<ParentNodeRecord>, StoreError> {
        Ok(self.parents.lock().rows.clone())
    }

    fn upsert_parent(&self, mut record: ParentNodeRecord) -> Result<UpsertOutcome, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut parents = self.parents.lock();
        match parents.get_mut(&record.id) {
            Some(existing) => {
                record.created_at = existing.created_at;
                record.functional = existing.functional;
                record.functional_rate = existing.functional_rate;
                record.last_aggregated_at = existing.last_aggregated_at;
                record.modified_at = now;
                *existing = record;
                Ok(UpsertOutcome::updated())
            }
            None => {
                record.created_at = now;
                record.modified_at = now;
                parents.put(record);
                Ok(UpsertOutcome::inserted())
            }
        }
    }

    fn set_parent_status(&self, id: &str, status: ParentStatus) -> Result<(), StoreError> {
        let mut parents = self.parents.lock();
        let parent = parents
            .get_mut(id.trim())
            .ok_or_else(|| StoreError::NotFound(format!("NRA {id}")))?;
        parent.functional = status.functional;
        parent.device_count = status.device_count;
        parent.functional_rate = Some(status.functional_rate);
        parent.last_aggregated_at = Some(status.aggregated_at);
        parent.modified_at = status.aggregated_at;
        Ok(())
    }

    fn append_history(&self, result: &ConnectivityTestResult) -> Result<(), StoreError> {
        if let Some(log) = self.history_log.lock().as_mut() {
            let mut line = serde_json::to_string(result)?;
            line.push('\n');
            log.write_all(line.as_bytes())?;
        }
        self.history.lock().push(result.clone());
        Ok(())
    }

    fn history_for(&self, device_id: &str) -> Result<Vec<ConnectivityTestResult>, StoreError> {
        Ok(self
            .history
            .lock()
            .iter()
            .filter(|r| r.device_id == device_id)
            .cloned()
            .collect())
    }

    fn latest_results(&self) -> Result<Vec<ConnectivityTestResult>, StoreError> {
        let history = self.history.lock();
        let mut order: Vec<&str> = Vec::new();
        let mut latest: HashMap<&str, &ConnectivityTestResult> = HashMap::new();
        for result in history.iter() {
            let id = result.device_id.as_str();
            if latest.insert(id, result).is_none() {
                order.push(id);
            }
        }
        Ok(order
            .into_iter()
            .filter_map(|id| latest.get(id).map(|r| (*r).clone()))
            .collect())
    }

    fn flush(&self) -> Result<(), StoreError> {
        if self.data_dir.is_none() {
            return Ok(());
        }
        if let Some(log) = self.history_log.lock().as_mut() {
            log.flush()?;
        }
        let devices = self.devices.lock().rows.clone();
        self.save_array(DEVICES_FILE, &devices)?;
        let parents = self.parents.lock().rows.clone();
        self.save_array(PARENTS_FILE, &parents)?;
        Ok(())
    }
}

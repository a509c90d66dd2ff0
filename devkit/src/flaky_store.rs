/*!
Store défaillant sur commande

Enveloppe un store réel et fait échouer les écritures de statut pour des
DSLAM donnés, ou toutes les lectures de population.
*/

use dslam_kernel::models::{ConnectivityTestResult, DeviceRecord, DeviceStatus, ParentNodeRecord};
use dslam_kernel::store::{DeviceFilter, InventoryStore, ParentStatus, StoreError, UpsertOutcome};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub struct FlakyStore {
    inner: Arc<dyn InventoryStore>,
    failing_ids: Mutex<HashSet<String>>,
    fail_reads: AtomicBool,
    rejected_writes: AtomicUsize,
}

impl FlakyStore {
    pub fn wrap(inner: Arc<dyn InventoryStore>) -> Self {
        Self {
            inner,
            failing_ids: Mutex::new(HashSet::new()),
            fail_reads: AtomicBool::new(false),
            rejected_writes: AtomicUsize::new(0),
        }
    }

    /// Les mises à jour de statut de `id` échouent désormais
    pub fn fail_writes_for(&self, id: &str) -> &Self {
        self.failing_ids.lock().insert(id.to_string());
        self
    }

    pub fn fail_reads(&self, fail: bool) -> &Self {
        self.fail_reads.store(fail, Ordering::SeqCst);
        self
    }

    pub fn rejected_writes(&self) -> usize {
        self.rejected_writes.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &Arc<dyn InventoryStore> {
        &self.inner
    }

    fn reject(&self, id: &str) -> Option<StoreError> {
        if self.failing_ids.lock().contains(id) {
            self.rejected_writes.fetch_add(1, Ordering::SeqCst);
            Some(StoreError::Unavailable(format!("write rejected for {id}")))
        } else {
            None
        }
    }
}

impl InventoryStore for FlakyStore {
    fn find_devices(&self, filter: &DeviceFilter) -> Result<Vec<DeviceRecord>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("device table unreadable".into()));
        }
        self.inner.find_devices(filter)
    }

    fn get_device(&self, id: &str) -> Result<Option<DeviceRecord>, StoreError> {
        self.inner.get_device(id)
    }

    fn devices_by_nra(
        &self,
        nra_ids: &BTreeSet<String>,
    ) -> Result<HashMap<String, Vec<DeviceRecord>>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("device table unreadable".into()));
        }
        self.inner.devices_by_nra(nra_ids)
    }

    fn upsert_device(&self, record: DeviceRecord) -> Result<UpsertOutcome, StoreError> {
        self.inner.upsert_device(record)
    }

    fn record_status(&self, id: &str, status: DeviceStatus) -> Result<(), StoreError> {
        match self.reject(id) {
            Some(err) => Err(err),
            None => self.inner.record_status(id, status),
        }
    }

    fn get_parent(&self, id: &str) -> Result<Option<ParentNodeRecord>, StoreError> {
        self.inner.get_parent(id)
    }

    fn list_parents(&self) -> Result<Vec<ParentNodeRecord>, StoreError> {
        self.inner.list_parents()
    }

    fn upsert_parent(&self, record: ParentNodeRecord) -> Result<UpsertOutcome, StoreError> {
        self.inner.upsert_parent(record)
    }

    fn set_parent_status(&self, id: &str, status: ParentStatus) -> Result<(), StoreError> {
        self.inner.set_parent_status(id, status)
    }

    fn append_history(&self, result: &ConnectivityTestResult) -> Result<(), StoreError> {
        self.inner.append_history(result)
    }

    fn history_for(&self, device_id: &str) -> Result<Vec<ConnectivityTestResult>, StoreError> {
        self.inner.history_for(device_id)
    }

    fn latest_results(&self) -> Result<Vec<ConnectivityTestResult>, StoreError> {
        self.inner.latest_results()
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dslam_kernel::JsonStore;

    #[test]
    fn only_listed_ids_are_rejected() {
        let store = FlakyStore::wrap(Arc::new(JsonStore::in_memory()));
        store.upsert_device(DeviceRecord::new("A", "N1")).unwrap();
        store.upsert_device(DeviceRecord::new("B", "N1")).unwrap();
        store.fail_writes_for("B");

        let status = DeviceRecord::new("x", "y").status();
        assert!(store.record_status("A", status).is_ok());
        assert!(store.record_status("B", status).is_err());
        assert_eq!(store.rejected_writes(), 1);

        store.fail_reads(true);
        assert!(store.find_devices(&DeviceFilter::all()).is_err());
    }
}

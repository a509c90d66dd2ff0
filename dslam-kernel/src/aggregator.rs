/**
 * AGRÉGATEUR - Statut des NRA dérivé de leurs DSLAM
 *
 * RÔLE : Recalcule, pour chaque NRA touché par un lot, le drapeau fonctionnel
 * (au moins un DSLAM fonctionnel) et le taux arrondi de DSLAM fonctionnels.
 *
 * FONCTIONNEMENT :
 * - Une seule lecture des membres pour tous les NRA demandés, puis une
 *   écriture par NRA
 * - Idempotent : deux passes sans changement de DSLAM donnent le même état
 * - NRA absent du stockage → créé depuis ses membres
 * - Résumés département/région = vues en lecture seule, jamais persistées
 */

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{debug, info};

use crate::models::{DeviceRecord, ParentNodeRecord};
use crate::store::{
    rounded_percent, DeviceFilter, GroupField, InventoryStore, ParentStatus, StoreError,
};

/// Comptage de joignabilité d'un groupe (département, région...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub key: String,
    pub device_count: usize,
    pub reachable_count: usize,
    pub reachability_rate: u8,
}

#[derive(Clone)]
pub struct Aggregator {
    store: Arc<dyn InventoryStore>,
}

impl Aggregator {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    /// Met à jour les NRA donnés, retourne le nombre de NRA écrits
    pub fn refresh_parents(&self, parent_ids: &BTreeSet<String>) -> Result<usize, StoreError> {
        let aggregated_at = OffsetDateTime::now_utc();
        let mut refreshed = 0;

        let wanted: BTreeSet<String> = parent_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        let mut by_nra = self.store.devices_by_nra(&wanted)?;

        for id in &wanted {
            let members = by_nra.remove(id).unwrap_or_default();
            if members.is_empty() {
                debug!("NRA {} has no member device, skipped", id);
                continue;
            }

            if self.store.get_parent(id)?.is_none() {
                if let Some(parent) = parent_from_members(&members) {
                    self.store.upsert_parent(parent)?;
                }
            }

            let functional = members.iter().filter(|d| d.functional).count();
            self.store.set_parent_status(
                id,
                ParentStatus {
                    functional: functional > 0,
                    device_count: members.len() as u32,
                    functional_rate: rounded_percent(functional, members.len()),
                    aggregated_at,
                },
            )?;
            refreshed += 1;
        }

        Ok(refreshed)
    }

    /// Recalcule tous les NRA connus de la population
    pub fn refresh_all(&self) -> Result<usize, StoreError> {
        let ids: BTreeSet<String> = self
            .store
            .find_devices(&DeviceFilter::all())?
            .into_iter()
            .map(|d| d.nra.trim().to_string())
            .collect();
        let refreshed = self.refresh_parents(&ids)?;
        info!("{} NRA refreshed", refreshed);
        Ok(refreshed)
    }

    pub fn summarize(
        &self,
        field: GroupField,
        filter: &DeviceFilter,
    ) -> Result<Vec<GroupSummary>, StoreError> {
        Ok(self
            .store
            .aggregate_by(field, filter)?
            .into_iter()
            .map(|g| GroupSummary {
                reachability_rate: g.rate(),
                key: g.key,
                device_count: g.total,
                reachable_count: g.functional,
            })
            .collect())
    }
}

/// Fiche NRA construite depuis la liste de ses DSLAM (premières valeurs non vides)
pub fn parent_from_members(members: &[DeviceRecord]) -> Option<ParentNodeRecord> {
    let (first, rest) = members.split_first()?;
    let mut parent = ParentNodeRecord::from_first_member(first);
    for device in rest {
        parent.absorb(device);
    }
    Some(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceStatus;
    use crate::store::JsonStore;

    fn seed(store: &JsonStore, id: &str, nra: &str, dept: &str, functional: bool) {
        let mut d = DeviceRecord::new(id, nra);
        d.department = dept.into();
        d.city = format!("Ville {nra}");
        store.upsert_device(d).unwrap();
        if functional {
            store
                .record_status(
                    id,
                    DeviceStatus { functional: true, last_tested_at: None, last_score: Some(70), last_quality: None },
                )
                .unwrap();
        }
    }

    fn setup() -> (Arc<JsonStore>, Aggregator) {
        let store = Arc::new(JsonStore::in_memory());
        seed(&store, "D1", "N1", "76", true);
        seed(&store, "D2", "N1", "76", false);
        seed(&store, "D3", "N1", "76", false);
        seed(&store, "D4", "N2", "14", false);
        let aggregator = Aggregator::new(store.clone());
        (store, aggregator)
    }

    #[test]
    fn any_functional_member_makes_parent_functional() {
        let (store, aggregator) = setup();
        assert_eq!(aggregator.refresh_all().unwrap(), 2);

        let n1 = store.get_parent("N1").unwrap().unwrap();
        assert!(n1.functional);
        assert_eq!(n1.device_count, 3);
        assert_eq!(n1.functional_rate, Some(33));
        assert_eq!(n1.city, "Ville N1");

        let n2 = store.get_parent("N2").unwrap().unwrap();
        assert!(!n2.functional);
        assert_eq!(n2.functional_rate, Some(0));
    }

    #[test]
    fn aggregation_is_idempotent() {
        let (store, aggregator) = setup();
        aggregator.refresh_all().unwrap();
        let first: Vec<_> = store
            .list_parents()
            .unwrap()
            .into_iter()
            .map(|p| (p.id, p.functional, p.functional_rate, p.device_count))
            .collect();

        aggregator.refresh_all().unwrap();
        let second: Vec<_> = store
            .list_parents()
            .unwrap()
            .into_iter()
            .map(|p| (p.id, p.functional, p.functional_rate, p.device_count))
            .collect();

        assert_eq!(first, second);
    }

    #[test]
    fn only_requested_parents_are_touched() {
        let (store, aggregator) = setup();
        let ids: BTreeSet<String> = ["N2".to_string(), "UNKNOWN".to_string()].into();
        assert_eq!(aggregator.refresh_parents(&ids).unwrap(), 1);
        assert!(store.get_parent("N1").unwrap().is_none());
        assert!(store.get_parent("UNKNOWN").unwrap().is_none());
    }

    #[test]
    fn department_summary_is_read_only() {
        let (store, aggregator) = setup();
        let summary = aggregator.summarize(GroupField::Department, &DeviceFilter::all()).unwrap();
        assert_eq!(
            summary[0],
            GroupSummary { key: "76".into(), device_count: 3, reachable_count: 1, reachability_rate: 33 }
        );
        assert!(store.list_parents().unwrap().is_empty());
    }
}

/**
 * RAPPORTS - Statistiques de fin de run et rapports détaillés
 *
 * RÔLE : Données seulement, le rendu (JSON, logs) est fait par l'appelant.
 *
 * FONCTIONNEMENT :
 * - FinalStatistics : fiches DSLAM (statut replié du dernier test)
 * - ConnectivityReport : derniers résultats de test, global puis par région
 *   et par département (jointure sur la fiche DSLAM)
 * - DetailedReport : régions, tendances de qualité, zones à problème
 */

use serde::Serialize;
use std::collections::HashMap;
use time::OffsetDateTime;

use crate::aggregator::GroupSummary;
use crate::geo::{department_rank, UNKNOWN_REGION};
use crate::models::{ConnectivityTestResult, DeviceRecord, NetworkQuality};
use crate::store::{group_devices, rounded_percent, GroupField};

pub const PROBLEM_AREA_LIMIT: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QualityBreakdown {
    pub excellent: usize,
    pub good: usize,
    pub poor: usize,
    pub unavailable: usize,
}

impl QualityBreakdown {
    fn count(&mut self, quality: NetworkQuality) {
        match quality {
            NetworkQuality::Excellent => self.excellent += 1,
            NetworkQuality::Good => self.good += 1,
            NetworkQuality::Poor => self.poor += 1,
            NetworkQuality::Unavailable => self.unavailable += 1,
        }
    }
}

/// Statistiques de fin de run, calculées sur les fiches DSLAM
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FinalStatistics {
    pub total_tested: usize,
    pub total_reachable: usize,
    pub global_reachability_rate: u8,
    pub average_score: Option<f64>,
    /// `unavailable` = total - joignables
    pub quality: QualityBreakdown,
    pub departments: Vec<GroupSummary>,
}

impl FinalStatistics {
    pub fn from_devices(devices: &[DeviceRecord]) -> Self {
        let total_tested = devices.len();
        let total_reachable = devices.iter().filter(|d| d.functional).count();

        let mut quality = QualityBreakdown::default();
        for q in devices.iter().filter_map(|d| d.last_quality) {
            if q != NetworkQuality::Unavailable {
                quality.count(q);
            }
        }
        quality.unavailable = total_tested - total_reachable;

        let scores: Vec<u8> = devices.iter().filter_map(|d| d.last_score).collect();
        let departments = group_devices(devices, GroupField::Department)
            .into_iter()
            .map(|g| GroupSummary {
                reachability_rate: g.rate(),
                key: g.key,
                device_count: g.total,
                reachable_count: g.functional,
            })
            .collect();

        Self {
            total_tested,
            total_reachable,
            global_reachability_rate: rounded_percent(total_reachable, total_tested),
            average_score: average(scores.iter().map(|&s| f64::from(s))),
            quality,
            departments,
        }
    }

    /// Départements triés par taux décroissant
    pub fn top_departments(&self, n: usize) -> Vec<&GroupSummary> {
        let mut sorted: Vec<&GroupSummary> = self.departments.iter().collect();
        sorted.sort_by(|a, b| b.reachability_rate.cmp(&a.reachability_rate).then(a.key.cmp(&b.key)));
        sorted.truncate(n);
        sorted
    }

    /// Départements sous le seuil, du pire au meilleur
    pub fn struggling_departments(&self, threshold: u8) -> Vec<&GroupSummary> {
        let mut sorted: Vec<&GroupSummary> = self
            .departments
            .iter()
            .filter(|d| d.reachability_rate < threshold)
            .collect();
        sorted.sort_by(|a, b| a.reachability_rate.cmp(&b.reachability_rate).then(a.key.cmp(&b.key)));
        sorted
    }
}

/// Statistiques sur un ensemble de résultats de test
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectivityStats {
    pub total: usize,
    pub reachable: usize,
    pub unreachable: usize,
    pub reachability_rate: u8,
    pub ipv4_only: usize,
    pub ipv6_only: usize,
    pub both: usize,
    pub udp_reachable: usize,
    pub average_response_time_ms: Option<f64>,
    pub quality: QualityBreakdown,
}

impl ConnectivityStats {
    pub fn from_results(results: &[ConnectivityTestResult]) -> Self {
        let mut stats = Self { total: results.len(), ..Self::default() };
        for r in results {
            if r.is_reachable {
                stats.reachable += 1;
            }
            match (r.ipv4_reachable, r.ipv6_reachable) {
                (true, true) => stats.both += 1,
                (true, false) => stats.ipv4_only += 1,
                (false, true) => stats.ipv6_only += 1,
                (false, false) => {}
            }
            if r.ipv4_udp_reachable {
                stats.udp_reachable += 1;
            }
            stats.quality.count(r.quality);
        }
        stats.unreachable = stats.total - stats.reachable;
        stats.reachability_rate = rounded_percent(stats.reachable, stats.total);
        stats.average_response_time_ms = average(
            results
                .iter()
                .filter(|r| r.is_reachable)
                .filter_map(|r| r.response_time_ms)
                .map(|ms| ms as f64),
        );
        stats
    }
}

/// Statistiques d'un groupe de résultats (région, département)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectivityGroup {
    pub key: String,
    #[serde(flatten)]
    pub stats: ConnectivityStats,
}

/// Statistiques de connectivité globales et par zone géographique
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConnectivityReport {
    /// `overall.quality` tient lieu de répartition par qualité
    pub overall: ConnectivityStats,
    /// Trié par nom de région
    pub by_region: Vec<ConnectivityGroup>,
    /// Trié par code département
    pub by_department: Vec<ConnectivityGroup>,
}

impl ConnectivityReport {
    /// Résultats sans fiche DSLAM correspondante → région inconnue, département vide
    pub fn build(results: &[ConnectivityTestResult], devices: &[DeviceRecord]) -> Self {
        let by_id: HashMap<&str, &DeviceRecord> = devices.iter().map(|d| (d.id.as_str(), d)).collect();
        let mut regions: HashMap<String, Vec<ConnectivityTestResult>> = HashMap::new();
        let mut departments: HashMap<String, Vec<ConnectivityTestResult>> = HashMap::new();

        for result in results {
            let (region, department) = match by_id.get(result.device_id.as_str()) {
                Some(device) => (device.region.clone(), device.department.clone()),
                None => (UNKNOWN_REGION.to_string(), String::new()),
            };
            regions.entry(region).or_default().push(result.clone());
            departments.entry(department).or_default().push(result.clone());
        }

        let mut by_region = groups_of(regions);
        by_region.sort_by(|a, b| a.key.cmp(&b.key));
        let mut by_department = groups_of(departments);
        by_department.sort_by_key(|g| department_rank(&g.key));

        Self {
            overall: ConnectivityStats::from_results(results),
            by_region,
            by_department,
        }
    }

    pub fn department(&self, code: &str) -> Option<&ConnectivityStats> {
        self.by_department.iter().find(|g| g.key == code).map(|g| &g.stats)
    }

    pub fn region(&self, name: &str) -> Option<&ConnectivityStats> {
        self.by_region.iter().find(|g| g.key == name).map(|g| &g.stats)
    }
}

fn groups_of(grouped: HashMap<String, Vec<ConnectivityTestResult>>) -> Vec<ConnectivityGroup> {
    grouped
        .into_iter()
        .map(|(key, results)| ConnectivityGroup { key, stats: ConnectivityStats::from_results(&results) })
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub total: usize,
    pub functional: usize,
    pub average_score: Option<f64>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_tested_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionRow {
    pub region: String,
    pub total: usize,
    pub functional: usize,
    pub rate: u8,
    /// Arrondi au dixième
    pub average_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityCount {
    /// `None` pour les DSLAM jamais testés
    pub quality: Option<NetworkQuality>,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemArea {
    pub city: String,
    pub nra: String,
    pub failing_devices: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_tested_at: Option<OffsetDateTime>,
}

/// Rapport détaillé, éventuellement limité à un département
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DetailedReport {
    pub department: Option<String>,
    pub summary: ReportSummary,
    pub by_region: Vec<RegionRow>,
    pub quality_trends: Vec<QualityCount>,
    pub problem_areas: Vec<ProblemArea>,
}

impl DetailedReport {
    pub fn build(devices: &[DeviceRecord], department: Option<&str>) -> Self {
        let selected: Vec<DeviceRecord> = devices
            .iter()
            .filter(|d| department.map_or(true, |dept| d.department == dept))
            .cloned()
            .collect();

        Self {
            department: department.map(str::to_string),
            summary: summary_of(&selected),
            by_region: region_rows(&selected),
            quality_trends: quality_trends(&selected),
            problem_areas: problem_areas(&selected),
        }
    }
}

fn summary_of(devices: &[DeviceRecord]) -> ReportSummary {
    ReportSummary {
        total: devices.len(),
        functional: devices.iter().filter(|d| d.functional).count(),
        average_score: average(devices.iter().filter_map(|d| d.last_score).map(f64::from)),
        last_tested_at: devices.iter().filter_map(|d| d.last_tested_at).max(),
    }
}

fn region_rows(devices: &[DeviceRecord]) -> Vec<RegionRow> {
    let mut groups = group_devices(devices, GroupField::Region);
    // tri sur le ratio exact, pas sur le pourcentage arrondi
    groups.sort_by(|a, b| {
        let ra = a.functional as f64 / a.total.max(1) as f64;
        let rb = b.functional as f64 / b.total.max(1) as f64;
        rb.total_cmp(&ra).then(a.key.cmp(&b.key))
    });
    groups
        .into_iter()
        .map(|g| RegionRow {
            rate: g.rate(),
            average_score: g.average_score().map(|s| (s * 10.0).round() / 10.0),
            region: g.key,
            total: g.total,
            functional: g.functional,
        })
        .collect()
}

fn quality_trends(devices: &[DeviceRecord]) -> Vec<QualityCount> {
    let mut counts: Vec<QualityCount> = Vec::new();
    for device in devices {
        match counts.iter_mut().find(|c| c.quality == device.last_quality) {
            Some(entry) => entry.count += 1,
            None => counts.push(QualityCount { quality: device.last_quality, count: 1 }),
        }
    }
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

fn problem_areas(devices: &[DeviceRecord]) -> Vec<ProblemArea> {
    let mut areas: Vec<ProblemArea> = Vec::new();
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    for device in devices.iter().filter(|d| !d.functional) {
        let key = (device.city.clone(), device.nra.trim().to_string());
        let slot = *index.entry(key).or_insert_with_key(|(city, nra)| {
            areas.push(ProblemArea {
                city: city.clone(),
                nra: nra.clone(),
                failing_devices: 0,
                last_tested_at: None,
            });
            areas.len() - 1
        });
        let area = &mut areas[slot];
        area.failing_devices += 1;
        area.last_tested_at = area.last_tested_at.max(device.last_tested_at);
    }
    // tri stable : à égalité, ordre de première apparition
    areas.sort_by(|a, b| b.failing_devices.cmp(&a.failing_devices));
    areas.truncate(PROBLEM_AREA_LIMIT);
    areas
}

fn average<I: Iterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str, dept: &str, region: &str, functional: bool, quality: Option<NetworkQuality>) -> DeviceRecord {
        let mut d = DeviceRecord::new(id, format!("NRA-{dept}"));
        d.department = dept.into();
        d.region = region.into();
        d.city = format!("Ville {dept}");
        d.functional = functional;
        d.last_quality = quality;
        d.last_score = quality.map(|q| match q {
            NetworkQuality::Excellent => 100,
            NetworkQuality::Good => 70,
            NetworkQuality::Poor => 35,
            NetworkQuality::Unavailable => 0,
        });
        d
    }

    fn fleet() -> Vec<DeviceRecord> {
        vec![
            device("D1", "76", "Normandie", true, Some(NetworkQuality::Excellent)),
            device("D2", "76", "Normandie", true, Some(NetworkQuality::Poor)),
            device("D3", "76", "Normandie", false, Some(NetworkQuality::Unavailable)),
            device("D4", "14", "Normandie", false, Some(NetworkQuality::Unavailable)),
            device("D5", "29", "Bretagne", true, Some(NetworkQuality::Good)),
            device("D6", "29", "Bretagne", false, None),
        ]
    }

    #[test]
    fn final_statistics_count_unavailable_as_unreachable() {
        let stats = FinalStatistics::from_devices(&fleet());
        assert_eq!(stats.total_tested, 6);
        assert_eq!(stats.total_reachable, 3);
        assert_eq!(stats.global_reachability_rate, 50);
        assert_eq!(
            stats.quality,
            QualityBreakdown { excellent: 1, good: 1, poor: 1, unavailable: 3 }
        );
        let d76 = stats.departments.iter().find(|d| d.key == "76").unwrap();
        assert_eq!((d76.device_count, d76.reachable_count, d76.reachability_rate), (3, 2, 67));
        assert_eq!(stats.top_departments(1)[0].key, "76");
        let struggling: Vec<&str> = stats.struggling_departments(50).iter().map(|d| d.key.as_str()).collect();
        assert_eq!(struggling, vec!["14"]);
    }

    #[test]
    fn connectivity_stats_split_families() {
        let base = DeviceRecord::new("X", "N");
        let mut v4 = ConnectivityTestResult::unreachable(&base, None);
        v4.ipv4_reachable = true;
        v4.ipv4_udp_reachable = true;
        v4.is_reachable = true;
        v4.response_time_ms = Some(20);
        v4.quality = NetworkQuality::Good;
        let mut both = v4.clone();
        both.ipv6_reachable = true;
        both.response_time_ms = Some(40);
        let down = ConnectivityTestResult::unreachable(&base, None);

        let stats = ConnectivityStats::from_results(&[v4, both, down]);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.reachable, 2);
        assert_eq!(stats.unreachable, 1);
        assert_eq!(stats.reachability_rate, 67);
        assert_eq!((stats.ipv4_only, stats.ipv6_only, stats.both), (1, 0, 1));
        assert_eq!(stats.udp_reachable, 2);
        assert_eq!(stats.average_response_time_ms, Some(30.0));
        assert_eq!(stats.quality.good, 2);
        assert_eq!(stats.quality.unavailable, 1);
    }

    #[test]
    fn connectivity_report_groups_by_region_and_department() {
        let devices = fleet();
        let result = |device: &DeviceRecord, reachable: bool, udp: bool, ms: Option<u64>| {
            let mut r = ConnectivityTestResult::unreachable(device, None);
            r.is_reachable = reachable;
            r.ipv4_reachable = reachable;
            r.ipv4_ping_reachable = reachable;
            r.ipv4_udp_reachable = udp;
            r.response_time_ms = ms;
            if reachable {
                r.quality = NetworkQuality::Poor;
            }
            r
        };
        let orphan = DeviceRecord::new("GONE", "NRA-X");
        let results = vec![
            result(&devices[0], true, true, Some(10)),
            result(&devices[1], true, false, Some(30)),
            result(&devices[3], false, false, None),
            result(&devices[4], true, true, Some(50)),
            result(&orphan, false, false, None),
        ];

        let report = ConnectivityReport::build(&results, &devices);
        assert_eq!(report.overall.total, 5);
        assert_eq!(report.overall.reachable, 3);
        assert_eq!(report.overall.quality.poor, 3);

        let keys: Vec<&str> = report.by_department.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["14", "29", "76", ""]);
        let d76 = report.department("76").unwrap();
        assert_eq!((d76.total, d76.reachable, d76.udp_reachable), (2, 2, 1));
        assert_eq!(d76.average_response_time_ms, Some(20.0));
        assert_eq!(report.department("14").unwrap().reachability_rate, 0);

        let regions: Vec<&str> = report.by_region.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(regions, vec!["Bretagne", "Normandie", UNKNOWN_REGION]);
        let normandie = report.region("Normandie").unwrap();
        assert_eq!((normandie.total, normandie.unreachable, normandie.reachability_rate), (3, 1, 67));
    }

    #[test]
    fn detailed_report_orders_regions_and_problems() {
        let report = DetailedReport::build(&fleet(), None);
        assert_eq!(report.summary.total, 6);
        assert_eq!(report.summary.functional, 3);

        // Normandie 2/4 = 50 %, Bretagne 1/2 = 50 % : égalité, ordre alphabétique
        assert_eq!(report.by_region[0].region, "Bretagne");
        assert_eq!(report.by_region[1].average_score, Some(33.8));

        assert_eq!(report.quality_trends[0].quality, Some(NetworkQuality::Unavailable));
        assert_eq!(report.quality_trends[0].count, 2);

        assert_eq!(report.problem_areas.len(), 3);
        assert!(report.problem_areas.iter().all(|a| a.failing_devices == 1));
    }

    #[test]
    fn detailed_report_can_focus_on_department() {
        let report = DetailedReport::build(&fleet(), Some("76"));
        assert_eq!(report.department.as_deref(), Some("76"));
        assert_eq!(report.summary.total, 3);
        assert_eq!(report.by_region.len(), 1);
        assert_eq!(report.problem_areas[0].nra, "NRA-76");
    }
}

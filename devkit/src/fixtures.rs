/*!
Jeux de données de test : DSLAM, parcs et fiches d'inventaire
*/

use dslam_kernel::collector::FeedRecord;
use dslam_kernel::models::{DeviceRecord, Zone};

/// Constructeur de fiche DSLAM pour les tests
#[derive(Debug, Clone)]
pub struct DeviceBuilder {
    record: DeviceRecord,
}

impl DeviceBuilder {
    pub fn new(id: &str, nra: &str) -> Self {
        let mut record = DeviceRecord::new(id, nra);
        record.city = format!("Ville {nra}");
        Self { record }
    }

    pub fn ipv4(mut self, address: &str) -> Self {
        self.record.ipv4 = Some(address.to_string());
        self
    }

    pub fn ipv6(mut self, address: &str) -> Self {
        self.record.ipv6 = Some(address.to_string());
        self
    }

    pub fn department(mut self, code: &str, region: &str) -> Self {
        self.record.department = code.to_string();
        self.record.region = region.to_string();
        self
    }

    pub fn zone(mut self, zone: Zone) -> Self {
        self.record.zone = zone;
        self
    }

    pub fn functional(mut self, functional: bool) -> Self {
        self.record.functional = functional;
        self
    }

    pub fn build(self) -> DeviceRecord {
        self.record
    }
}

/// Parc de `count` DSLAM répartis sur des NRA de `per_parent` membres.
///
/// Identifiants `DSLAM-0000`.., NRA `NRA-00`.., adresses IPv4 `10.0.x.y`.
/// Les `functional` premiers sont marqués fonctionnels.
#[derive(Debug, Clone)]
pub struct FleetBuilder {
    count: usize,
    per_parent: usize,
    functional: usize,
    department: String,
    region: String,
    with_ipv6: bool,
}

impl FleetBuilder {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            per_parent: 4,
            functional: 0,
            department: "76".into(),
            region: "Normandie".into(),
            with_ipv6: false,
        }
    }

    pub fn per_parent(mut self, per_parent: usize) -> Self {
        self.per_parent = per_parent.max(1);
        self
    }

    pub fn functional(mut self, functional: usize) -> Self {
        self.functional = functional;
        self
    }

    pub fn department(mut self, code: &str, region: &str) -> Self {
        self.department = code.into();
        self.region = region.into();
        self
    }

    pub fn with_ipv6(mut self) -> Self {
        self.with_ipv6 = true;
        self
    }

    pub fn build(self) -> Vec<DeviceRecord> {
        (0..self.count)
            .map(|i| {
                let mut builder = DeviceBuilder::new(&device_id(i), &format!("NRA-{:02}", i / self.per_parent))
                    .ipv4(&ipv4_of(i))
                    .department(&self.department, &self.region)
                    .functional(i < self.functional);
                if self.with_ipv6 {
                    builder = builder.ipv6(&format!("2001:db8::{:x}", i + 1));
                }
                builder.build()
            })
            .collect()
    }
}

pub fn device_id(index: usize) -> String {
    format!("DSLAM-{index:04}")
}

pub fn ipv4_of(index: usize) -> String {
    format!("10.0.{}.{}", index / 250, index % 250 + 1)
}

/// Fiche d'inventaire minimale
pub fn feed_record(id: &str, nra: &str, department: &str, ipv4: Option<&str>) -> FeedRecord {
    FeedRecord {
        id: id.to_string(),
        nra: nra.to_string(),
        city: format!("Ville {nra}"),
        location: String::new(),
        ipv4: ipv4.map(str::to_string),
        ipv6: None,
        installed_on: String::new(),
        in_service_on: String::new(),
        department: Some(department.to_string()),
        postal_code: None,
        population: None,
    }
}

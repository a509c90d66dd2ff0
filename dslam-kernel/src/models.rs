use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Qualité réseau dérivée du score et de la joignabilité
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkQuality {
    Excellent,
    Good,
    Poor,
    Unavailable,
}

impl NetworkQuality {
    pub const ALL: [NetworkQuality; 4] = [
        NetworkQuality::Excellent,
        NetworkQuality::Good,
        NetworkQuality::Poor,
        NetworkQuality::Unavailable,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkQuality::Excellent => "excellent",
            NetworkQuality::Good => "good",
            NetworkQuality::Poor => "poor",
            NetworkQuality::Unavailable => "unavailable",
        }
    }
}

/// Type de zone géographique d'un site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Zone {
    Urban,
    Rural,
    SemiUrban,
    #[default]
    Unknown,
}

impl Zone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Zone::Urban => "urban",
            Zone::Rural => "rural",
            Zone::SemiUrban => "semi-urban",
            Zone::Unknown => "unknown",
        }
    }
}

/// Fiche d'inventaire d'un DSLAM (clé unique : `id`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    /// NRA de rattachement
    pub nra: String,
    pub city: String,
    pub location: String,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    pub installed_on: String,
    pub in_service_on: String,
    pub department: String,
    pub region: String,
    pub zone: Zone,
    pub postal_code: Option<String>,
    pub population: Option<u32>,
    /// Dernier statut connu, replié depuis le résultat de test le plus récent
    pub functional: bool,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_tested_at: Option<OffsetDateTime>,
    pub last_score: Option<u8>,
    pub last_quality: Option<NetworkQuality>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
}

impl DeviceRecord {
    /// Fiche vierge, jamais testée
    pub fn new(id: impl Into<String>, nra: impl Into<String>) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: id.into(),
            nra: nra.into(),
            city: String::new(),
            location: String::new(),
            ipv4: None,
            ipv6: None,
            installed_on: String::new(),
            in_service_on: String::new(),
            department: String::new(),
            region: String::new(),
            zone: Zone::Unknown,
            postal_code: None,
            population: None,
            functional: false,
            last_tested_at: None,
            last_score: None,
            last_quality: None,
            created_at: now,
            modified_at: now,
        }
    }

    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            functional: self.functional,
            last_tested_at: self.last_tested_at,
            last_score: self.last_score,
            last_quality: self.last_quality,
        }
    }
}

/// Champs de cache d'un DSLAM mis à jour après chaque test
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceStatus {
    pub functional: bool,
    pub last_tested_at: Option<OffsetDateTime>,
    pub last_score: Option<u8>,
    pub last_quality: Option<NetworkQuality>,
}

impl From<&ConnectivityTestResult> for DeviceStatus {
    fn from(result: &ConnectivityTestResult) -> Self {
        Self {
            functional: result.is_reachable,
            last_tested_at: Some(result.tested_at),
            last_score: Some(result.score),
            last_quality: Some(result.quality),
        }
    }
}

/// Fiche agrégée d'un NRA, entièrement dérivée de ses DSLAM
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParentNodeRecord {
    pub id: String,
    pub city: String,
    pub location: String,
    pub ipv4: Option<String>,
    pub ipv6: Option<String>,
    /// Vrai ssi au moins un DSLAM membre est fonctionnel
    pub functional: bool,
    pub device_count: u32,
    /// Pourcentage arrondi de DSLAM fonctionnels
    pub functional_rate: Option<u8>,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub last_aggregated_at: Option<OffsetDateTime>,
    pub department: String,
    pub region: String,
    pub zone: Zone,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
}

impl ParentNodeRecord {
    /// NRA initialisé depuis son premier DSLAM membre
    pub fn from_first_member(device: &DeviceRecord) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: device.nra.trim().to_string(),
            city: device.city.clone(),
            location: device.location.clone(),
            ipv4: non_empty(device.ipv4.as_deref()),
            ipv6: non_empty(device.ipv6.as_deref()),
            functional: false,
            device_count: 1,
            functional_rate: None,
            last_aggregated_at: None,
            department: device.department.clone(),
            region: device.region.clone(),
            zone: device.zone,
            created_at: now,
            modified_at: now,
        }
    }

    /// Intègre un DSLAM supplémentaire : compteur et premières valeurs non vides
    pub fn absorb(&mut self, device: &DeviceRecord) {
        self.device_count += 1;
        if self.city.trim().is_empty() && !device.city.trim().is_empty() {
            self.city = device.city.clone();
        }
        if self.location.trim().is_empty() && !device.location.trim().is_empty() {
            self.location = device.location.clone();
        }
        if self.ipv4.is_none() {
            self.ipv4 = non_empty(device.ipv4.as_deref());
        }
        if self.ipv6.is_none() {
            self.ipv6 = non_empty(device.ipv6.as_deref());
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Résultat d'un test de connectivité (historique en ajout seul)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityTestResult {
    pub id: Uuid,
    pub device_id: String,
    pub nra: String,
    pub ipv4_reachable: bool,
    pub ipv4_ping_reachable: bool,
    pub ipv4_udp_reachable: bool,
    pub ipv6_reachable: bool,
    pub is_reachable: bool,
    /// Meilleur temps de réponse parmi les sondes réussies
    pub response_time_ms: Option<u64>,
    pub score: u8,
    pub quality: NetworkQuality,
    #[serde(with = "time::serde::rfc3339")]
    pub tested_at: OffsetDateTime,
    pub error: Option<String>,
}

impl ConnectivityTestResult {
    /// Résultat pire-cas utilisé quand le test d'un DSLAM échoue de façon inattendue
    pub fn unreachable(device: &DeviceRecord, error: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device.id.clone(),
            nra: device.nra.clone(),
            ipv4_reachable: false,
            ipv4_ping_reachable: false,
            ipv4_udp_reachable: false,
            ipv6_reachable: false,
            is_reachable: false,
            response_time_ms: None,
            score: 0,
            quality: NetworkQuality::Unavailable,
            tested_at: OffsetDateTime::now_utc(),
            error,
        }
    }
}

/**
 * GÉOGRAPHIE - Table département → région et typologie de zone
 *
 * RÔLE : Table immuable injectée dans la collecte et les rapports, construite
 * depuis la table intégrée puis surchargée par la configuration.
 *
 * UTILITÉ : Permet des géographies synthétiques en test sans état global.
 */

use std::collections::HashMap;

use crate::models::Zone;

pub const UNKNOWN_REGION: &str = "Région inconnue";

const BUILTIN: &[(&str, &str)] = &[
    ("01", "Auvergne-Rhône-Alpes"), ("03", "Auvergne-Rhône-Alpes"), ("07", "Auvergne-Rhône-Alpes"),
    ("15", "Auvergne-Rhône-Alpes"), ("26", "Auvergne-Rhône-Alpes"), ("38", "Auvergne-Rhône-Alpes"),
    ("42", "Auvergne-Rhône-Alpes"), ("43", "Auvergne-Rhône-Alpes"), ("63", "Auvergne-Rhône-Alpes"),
    ("69", "Auvergne-Rhône-Alpes"), ("73", "Auvergne-Rhône-Alpes"), ("74", "Auvergne-Rhône-Alpes"),
    ("21", "Bourgogne-Franche-Comté"), ("25", "Bourgogne-Franche-Comté"), ("39", "Bourgogne-Franche-Comté"),
    ("58", "Bourgogne-Franche-Comté"), ("70", "Bourgogne-Franche-Comté"), ("71", "Bourgogne-Franche-Comté"),
    ("89", "Bourgogne-Franche-Comté"), ("90", "Bourgogne-Franche-Comté"),
    ("22", "Bretagne"), ("29", "Bretagne"), ("35", "Bretagne"), ("56", "Bretagne"),
    ("18", "Centre-Val de Loire"), ("28", "Centre-Val de Loire"), ("36", "Centre-Val de Loire"),
    ("37", "Centre-Val de Loire"), ("41", "Centre-Val de Loire"), ("45", "Centre-Val de Loire"),
    ("2A", "Corse"), ("2B", "Corse"),
    ("08", "Grand Est"), ("10", "Grand Est"), ("51", "Grand Est"), ("52", "Grand Est"),
    ("54", "Grand Est"), ("55", "Grand Est"), ("57", "Grand Est"), ("67", "Grand Est"),
    ("68", "Grand Est"), ("88", "Grand Est"),
    ("02", "Hauts-de-France"), ("59", "Hauts-de-France"), ("60", "Hauts-de-France"),
    ("62", "Hauts-de-France"), ("80", "Hauts-de-France"),
    ("75", "Île-de-France"), ("77", "Île-de-France"), ("78", "Île-de-France"),
    ("91", "Île-de-France"), ("92", "Île-de-France"), ("93", "Île-de-France"),
    ("94", "Île-de-France"), ("95", "Île-de-France"),
    ("14", "Normandie"), ("27", "Normandie"), ("50", "Normandie"), ("61", "Normandie"), ("76", "Normandie"),
    ("16", "Nouvelle-Aquitaine"), ("17", "Nouvelle-Aquitaine"), ("19", "Nouvelle-Aquitaine"),
    ("23", "Nouvelle-Aquitaine"), ("24", "Nouvelle-Aquitaine"), ("33", "Nouvelle-Aquitaine"),
    ("40", "Nouvelle-Aquitaine"), ("47", "Nouvelle-Aquitaine"), ("64", "Nouvelle-Aquitaine"),
    ("79", "Nouvelle-Aquitaine"), ("86", "Nouvelle-Aquitaine"), ("87", "Nouvelle-Aquitaine"),
    ("09", "Occitanie"), ("11", "Occitanie"), ("12", "Occitanie"), ("30", "Occitanie"),
    ("31", "Occitanie"), ("32", "Occitanie"), ("34", "Occitanie"), ("46", "Occitanie"),
    ("48", "Occitanie"), ("65", "Occitanie"), ("66", "Occitanie"), ("81", "Occitanie"), ("82", "Occitanie"),
    ("44", "Pays de la Loire"), ("49", "Pays de la Loire"), ("53", "Pays de la Loire"),
    ("72", "Pays de la Loire"), ("85", "Pays de la Loire"),
    ("04", "Provence-Alpes-Côte d'Azur"), ("05", "Provence-Alpes-Côte d'Azur"),
    ("06", "Provence-Alpes-Côte d'Azur"), ("13", "Provence-Alpes-Côte d'Azur"),
    ("83", "Provence-Alpes-Côte d'Azur"), ("84", "Provence-Alpes-Côte d'Azur"),
    ("971", "Guadeloupe"), ("972", "Martinique"), ("973", "Guyane"),
    ("974", "La Réunion"), ("975", "Saint-Pierre-et-Miquelon"), ("976", "Mayotte"),
];

const LARGE_CITIES: &[&str] = &[
    "PARIS", "LYON", "MARSEILLE", "TOULOUSE", "NICE", "NANTES", "STRASBOURG", "MONTPELLIER",
    "BORDEAUX", "LILLE", "RENNES", "REIMS", "SAINT-ÉTIENNE", "TOULON", "ANGERS", "GRENOBLE",
    "DIJON", "NÎMES", "AIX-EN-PROVENCE", "BREST", "LIMOGES", "TOURS", "AMIENS", "PERPIGNAN",
    "BOULOGNE-BILLANCOURT", "METZ", "BESANÇON", "ORLÉANS", "MULHOUSE", "ROUEN", "SAINT-DENIS",
    "MONTREUIL", "ARGENTEUIL", "CAEN", "NANCY", "TOURCOING", "ROUBAIX",
];

const RURAL_WORDS: &[&str] = &["VILLAGE", "HAMEAU", "BOURG"];

/// Correspondance département → région, immuable une fois construite
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoTable {
    regions: HashMap<String, String>,
}

impl GeoTable {
    /// Table métropole + Corse + outre-mer
    pub fn builtin() -> Self {
        Self::from_pairs(BUILTIN.iter().map(|(d, r)| (d.to_string(), r.to_string())))
    }

    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self { regions: pairs.into_iter().collect() }
    }

    /// Surcharges de configuration appliquées par-dessus la table courante
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Self {
        for (dept, region) in overrides {
            self.regions.insert(dept.trim().to_string(), region.clone());
        }
        self
    }

    pub fn region_of(&self, department: &str) -> &str {
        self.regions
            .get(department.trim())
            .map(String::as_str)
            .unwrap_or(UNKNOWN_REGION)
    }

    pub fn contains(&self, department: &str) -> bool {
        self.regions.contains_key(department.trim())
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Ordre de balayage : codes numériques croissants, puis 2A/2B, puis outre-mer
    pub fn departments(&self) -> Vec<String> {
        let mut codes: Vec<&String> = self.regions.keys().collect();
        codes.sort_by_key(|code| department_rank(code));
        codes.into_iter().cloned().collect()
    }
}

impl Default for GeoTable {
    fn default() -> Self {
        Self::builtin()
    }
}

pub(crate) fn department_rank(code: &str) -> (u8, u32, String) {
    match code.parse::<u32>() {
        Ok(n) if code.len() <= 2 => (0, n, String::new()),
        Ok(n) => (2, n, String::new()),
        Err(_) => (1, 0, code.to_string()),
    }
}

impl Zone {
    /// Typologie d'une commune, par population si connue, sinon par le nom
    pub fn classify(city: &str, population: Option<u32>) -> Zone {
        if let Some(pop) = population {
            return if pop > 100_000 {
                Zone::Urban
            } else if pop < 2_000 {
                Zone::Rural
            } else {
                Zone::SemiUrban
            };
        }

        let upper = city.to_uppercase();
        if LARGE_CITIES.iter().any(|c| upper.contains(c)) {
            return Zone::Urban;
        }
        if upper.contains("SAINT-") || upper.contains("SAINTE-") {
            return Zone::Rural;
        }
        let has_rural_word = upper
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| RURAL_WORDS.contains(&word));
        if has_rural_word {
            Zone::Rural
        } else {
            Zone::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_department_falls_back() {
        let geo = GeoTable::builtin();
        assert_eq!(geo.region_of("76"), "Normandie");
        assert_eq!(geo.region_of("2A"), "Corse");
        assert_eq!(geo.region_of("99"), UNKNOWN_REGION);
    }

    #[test]
    fn overrides_win_over_builtin() {
        let mut extra = HashMap::new();
        extra.insert("76".to_string(), "Haute-Normandie".to_string());
        extra.insert("99".to_string(), "Test".to_string());
        let geo = GeoTable::builtin().with_overrides(&extra);
        assert_eq!(geo.region_of("76"), "Haute-Normandie");
        assert_eq!(geo.region_of("99"), "Test");
    }

    #[test]
    fn departments_are_scanned_in_order() {
        let geo = GeoTable::from_pairs(
            ["971", "2B", "10", "01", "2A", "95"]
                .iter()
                .map(|d| (d.to_string(), "R".to_string())),
        );
        assert_eq!(geo.departments(), vec!["01", "10", "95", "2A", "2B", "971"]);
        assert_eq!(GeoTable::builtin().departments().first().map(String::as_str), Some("01"));
    }

    #[test]
    fn zone_by_population() {
        assert_eq!(Zone::classify("X", Some(150_000)), Zone::Urban);
        assert_eq!(Zone::classify("X", Some(1_500)), Zone::Rural);
        assert_eq!(Zone::classify("X", Some(2_000)), Zone::SemiUrban);
        assert_eq!(Zone::classify("X", Some(100_000)), Zone::SemiUrban);
    }

    #[test]
    fn zone_by_name() {
        assert_eq!(Zone::classify("Rouen Centre", None), Zone::Urban);
        assert_eq!(Zone::classify("nîmes", None), Zone::Urban);
        assert_eq!(Zone::classify("Sainte-Marie", None), Zone::Rural);
        assert_eq!(Zone::classify("Le Bourg d'Oisans", None), Zone::Rural);
        assert_eq!(Zone::classify("Bourgtheroulde", None), Zone::Unknown);
        assert_eq!(Zone::classify("Yvetot", None), Zone::Unknown);
    }
}

/**
 * SONDES - Primitives de joignabilité (écho ICMP, port UDP de gestion)
 *
 * RÔLE : Chaque sonde lance un outil système via un `ProcessRunner` et
 * traduit son issue en `ProbeOutcome`.
 *
 * FONCTIONNEMENT :
 * - Adresse absente ou sentinelle → échec immédiat, aucun processus lancé
 * - Timeout, échec de lancement, signal → échec, jamais d'erreur propagée
 * - Le délai dur est appliqué par le runner, indépendamment des options de l'outil
 */

pub mod icmp;
pub mod runner;
pub mod udp;

pub use runner::{ProbeCommand, ProcessRunner, RunOutcome, SystemRunner};

/// Valeurs d'inventaire signifiant "pas d'adresse" (comparaison insensible à la casse)
pub const ABSENT_ADDRESSES: &[&str] = &["n/a", "not found", "error", "non trouvé", "erreur"];

pub fn is_absent_address(address: &str) -> bool {
    let trimmed = address.trim();
    trimmed.is_empty()
        || ABSENT_ADDRESSES
            .iter()
            .any(|sentinel| trimmed.to_lowercase() == *sentinel)
}

/// Adresse exploitable, ou `None` si absente
pub fn usable_address(address: Option<&str>) -> Option<&str> {
    address.map(str::trim).filter(|a| !is_absent_address(a))
}

/// Issue d'une sonde sur une adresse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProbeOutcome {
    pub success: bool,
    /// Présent uniquement en cas de succès
    pub response_time_ms: Option<u64>,
}

impl ProbeOutcome {
    pub fn failed() -> Self {
        Self { success: false, response_time_ms: None }
    }

    pub fn succeeded(response_time_ms: u64) -> Self {
        Self { success: true, response_time_ms: Some(response_time_ms) }
    }
}

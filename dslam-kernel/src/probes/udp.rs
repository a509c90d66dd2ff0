/**
 * UDP - Port de gestion SNMP des DSLAM, via nc en mode scan
 */

use tracing::debug;

use super::{is_absent_address, ProbeCommand, ProbeOutcome, ProcessRunner, RunOutcome};
use crate::config::ProbeConfig;

/// Vérification UDP du port de gestion (nc en mode scan)
pub fn udp_command(config: &ProbeConfig, address: &str) -> ProbeCommand {
    ProbeCommand::new(&config.udp_command)
        .args(["-u", "-z"])
        .arg(format!("-w{}", config.request_timeout_secs))
        .arg(address)
        .arg(config.management_port.to_string())
}

/// Succès ⇔ code de sortie nul
pub async fn check_management_port(
    runner: &dyn ProcessRunner,
    config: &ProbeConfig,
    address: &str,
) -> ProbeOutcome {
    if is_absent_address(address) {
        return ProbeOutcome::failed();
    }

    let command = udp_command(config, address.trim());
    let outcome = match runner.run(&command, config.hard_timeout()).await {
        RunOutcome::Exited { code: Some(0), elapsed, .. } => {
            ProbeOutcome::succeeded(elapsed.as_millis() as u64)
        }
        RunOutcome::Exited { .. } | RunOutcome::TimedOut => ProbeOutcome::failed(),
        RunOutcome::SpawnFailed(reason) => {
            debug!("udp check {} could not run: {}", address, reason);
            ProbeOutcome::failed()
        }
    };
    debug!("udp {}:{} -> {:?}", address, config.management_port, outcome);
    outcome
}

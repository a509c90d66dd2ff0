/**
 * ICMP - Écho ping IPv4/IPv6
 *
 * Succès ⇔ code de sortie nul ET sortie contenant une trace de réponse
 * (formats anglais et français de ping).
 */

use tracing::debug;

use super::{is_absent_address, ProbeCommand, ProbeOutcome, ProcessRunner, RunOutcome};
use crate::config::ProbeConfig;

/// Lignes prouvant qu'une réponse a été reçue, sorties anglaise et française
pub const SUCCESS_MARKERS: &[&str] = &[
    "1 received",
    "1 reçus",
    "bytes from",
    "octets de",
    "time=",
    "temps=",
];

pub fn reply_confirms_success(stdout: &str) -> bool {
    SUCCESS_MARKERS.iter().any(|marker| stdout.contains(marker))
}

/// Un seul écho, sortie numérique
pub fn ping_command(config: &ProbeConfig, address: &str, ipv6: bool) -> ProbeCommand {
    let cmd = ProbeCommand::new(&config.ping_command);
    let cmd = if ipv6 { cmd.arg("-6") } else { cmd };
    cmd.args(["-c", "1", "-W"])
        .arg(config.request_timeout_secs.to_string())
        .arg("-n")
        .arg(address)
}

/// Écho ICMP : code de sortie nul ET marqueur de réponse dans la sortie
pub async fn ping(
    runner: &dyn ProcessRunner,
    config: &ProbeConfig,
    address: &str,
    ipv6: bool,
) -> ProbeOutcome {
    if is_absent_address(address) {
        return ProbeOutcome::failed();
    }

    let command = ping_command(config, address.trim(), ipv6);
    let outcome = match runner.run(&command, config.hard_timeout()).await {
        RunOutcome::Exited { code: Some(0), stdout, elapsed } if reply_confirms_success(&stdout) => {
            ProbeOutcome::succeeded(elapsed.as_millis() as u64)
        }
        RunOutcome::Exited { code, .. } => {
            debug!("ping {} exited with {:?} without reply", address, code);
            ProbeOutcome::failed()
        }
        RunOutcome::TimedOut => {
            debug!("ping {} killed after {}ms", address, config.hard_timeout_ms);
            ProbeOutcome::failed()
        }
        RunOutcome::SpawnFailed(reason) => {
            debug!("ping {} could not run: {}", address, reason);
            ProbeOutcome::failed()
        }
    };
    debug!("ping {} (ipv6={}) -> {:?}", address, ipv6, outcome);
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;

    struct OneShot {
        outcome: RunOutcome,
        calls: Mutex<Vec<ProbeCommand>>,
    }

    impl OneShot {
        fn new(outcome: RunOutcome) -> Self {
            Self { outcome, calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl ProcessRunner for OneShot {
        async fn run(&self, command: &ProbeCommand, _hard_timeout: Duration) -> RunOutcome {
            self.calls.lock().push(command.clone());
            self.outcome.clone()
        }
    }

    fn exited(code: i32, stdout: &str) -> RunOutcome {
        RunOutcome::Exited {
            code: Some(code),
            stdout: stdout.to_string(),
            elapsed: Duration::from_millis(12),
        }
    }

    #[test]
    fn builds_ipv6_command() {
        let cmd = ping_command(&ProbeConfig::default(), "2001:db8::1", true);
        assert_eq!(cmd.to_string(), "ping -6 -c 1 -W 2 -n 2001:db8::1");
        let cmd = ping_command(&ProbeConfig::default(), "10.0.0.1", false);
        assert_eq!(cmd.to_string(), "ping -c 1 -W 2 -n 10.0.0.1");
    }

    #[tokio::test]
    async fn sentinel_never_spawns() {
        let runner = OneShot::new(exited(0, "64 bytes from"));
        for address in ["N/A", "Non trouvé", ""] {
            let outcome = ping(&runner, &ProbeConfig::default(), address, false).await;
            assert_eq!(outcome, ProbeOutcome::failed());
        }
        assert!(runner.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn french_reply_counts_as_success() {
        let runner = OneShot::new(exited(0, "64 octets de 10.0.0.1 : icmp_seq=1 ttl=64 temps=0.04 ms"));
        let outcome = ping(&runner, &ProbeConfig::default(), "10.0.0.1", false).await;
        assert_eq!(outcome, ProbeOutcome::succeeded(12));
    }

    #[tokio::test]
    async fn zero_exit_without_marker_fails() {
        let runner = OneShot::new(exited(0, "PING 10.0.0.1 (10.0.0.1) 56(84) data."));
        let outcome = ping(&runner, &ProbeConfig::default(), "10.0.0.1", false).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn marker_with_failure_exit_fails() {
        let runner = OneShot::new(exited(1, "From 10.0.0.254 icmp_seq=1 Destination Host Unreachable time=1"));
        let outcome = ping(&runner, &ProbeConfig::default(), "10.0.0.1", false).await;
        assert_eq!(outcome, ProbeOutcome::failed());
    }

    #[tokio::test]
    async fn timeout_and_spawn_failure_fail() {
        let runner = OneShot::new(RunOutcome::TimedOut);
        assert!(!ping(&runner, &ProbeConfig::default(), "10.0.0.1", false).await.success);
        let runner = OneShot::new(RunOutcome::SpawnFailed("no such file".into()));
        assert!(!ping(&runner, &ProbeConfig::default(), "10.0.0.1", false).await.success);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_tool_settles_by_hard_deadline() {
        use crate::probes::SystemRunner;
        use std::os::unix::fs::PermissionsExt;
        use std::time::Instant;

        // faux ping qui ignore ses options et ne répond jamais
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ping");
        std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let config = ProbeConfig {
            ping_command: script.display().to_string(),
            request_timeout_secs: 30,
            hard_timeout_ms: 400,
            ..ProbeConfig::default()
        };
        let started = Instant::now();
        let outcome = ping(&SystemRunner, &config, "10.0.0.1", false).await;
        assert_eq!(outcome, ProbeOutcome::failed());
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}

/**
 * PROBER - Test de connectivité complet d'un DSLAM
 *
 * FONCTIONNEMENT :
 * - IPv4 : écho ICMP et port UDP de gestion en parallèle
 * - IPv6 : écho ICMP seul
 * - Les deux familles en parallèle, chaque sonde est attendue jusqu'au bout
 * - Temps de réponse retenu = le plus rapide parmi les sondes réussies
 */

use std::sync::Arc;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::config::ProbeConfig;
use crate::models::{ConnectivityTestResult, DeviceRecord};
use crate::probes::{icmp, udp, usable_address, ProbeOutcome, ProcessRunner};
use crate::scoring::{self, ScoreInput};

#[derive(Clone)]
pub struct DeviceProber {
    runner: Arc<dyn ProcessRunner>,
    config: ProbeConfig,
}

impl DeviceProber {
    pub fn new(runner: Arc<dyn ProcessRunner>, config: ProbeConfig) -> Self {
        Self { runner, config }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    pub async fn test_device(&self, device: &DeviceRecord) -> ConnectivityTestResult {
        let runner = self.runner.as_ref();
        let config = &self.config;
        let ipv4 = usable_address(device.ipv4.as_deref());
        let ipv6 = usable_address(device.ipv6.as_deref());

        let v4 = async {
            match ipv4 {
                Some(addr) => tokio::join!(
                    icmp::ping(runner, config, addr, false),
                    udp::check_management_port(runner, config, addr),
                ),
                None => (ProbeOutcome::failed(), ProbeOutcome::failed()),
            }
        };
        let v6 = async {
            match ipv6 {
                Some(addr) => icmp::ping(runner, config, addr, true).await,
                None => ProbeOutcome::failed(),
            }
        };
        let ((ping4, udp4), ping6) = tokio::join!(v4, v6);

        let response_time_ms = [ping4, udp4, ping6]
            .iter()
            .filter(|o| o.success)
            .filter_map(|o| o.response_time_ms)
            .min();

        let ipv4_reachable = ping4.success || udp4.success;
        let is_reachable = ipv4_reachable || ping6.success;
        let score = scoring::score(&ScoreInput {
            ipv4_ping: ping4.success,
            ipv4_udp: udp4.success,
            ipv6: ping6.success,
            response_time_ms,
        });
        let quality = scoring::quality(score, is_reachable);

        debug!(
            "device {} -> ping4={} udp4={} ping6={} score={} quality={}",
            device.id, ping4.success, udp4.success, ping6.success, score, quality.as_str()
        );

        ConnectivityTestResult {
            id: Uuid::new_v4(),
            device_id: device.id.clone(),
            nra: device.nra.clone(),
            ipv4_reachable,
            ipv4_ping_reachable: ping4.success,
            ipv4_udp_reachable: udp4.success,
            ipv6_reachable: ping6.success,
            is_reachable,
            response_time_ms,
            score,
            quality,
            tested_at: OffsetDateTime::now_utc(),
            error: None,
        }
    }
}

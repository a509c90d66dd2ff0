/**
 * SCORING - Score 0-100 et qualité réseau d'un DSLAM
 *
 * FONCTIONNEMENT :
 * - Points fixes par sonde réussie (ping IPv4, port UDP, ping IPv6)
 * - Ajustement selon le meilleur temps de réponse, puis borne 0..=100
 * - Qualité déduite du score, `Unavailable` si aucune sonde ne répond
 */

use crate::models::NetworkQuality;

pub const PING_POINTS: i32 = 30;
pub const MANAGEMENT_PORT_POINTS: i32 = 40;
pub const IPV6_POINTS: i32 = 30;

/// Entrées du calcul de score pour un DSLAM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScoreInput {
    pub ipv4_ping: bool,
    pub ipv4_udp: bool,
    pub ipv6: bool,
    pub response_time_ms: Option<u64>,
}

/// Bonus/malus sur le meilleur temps de réponse
pub fn timing_adjustment(response_time_ms: Option<u64>) -> i32 {
    match response_time_ms {
        Some(ms) if ms < 50 => 5,
        Some(ms) if ms < 100 => 2,
        Some(ms) if ms > 1000 => -5,
        _ => 0,
    }
}

/// Score borné à 0..=100
pub fn score(input: &ScoreInput) -> u8 {
    let mut total = 0;
    if input.ipv4_ping {
        total += PING_POINTS;
    }
    if input.ipv4_udp {
        total += MANAGEMENT_PORT_POINTS;
    }
    if input.ipv6 {
        total += IPV6_POINTS;
    }
    total += timing_adjustment(input.response_time_ms);
    total.clamp(0, 100) as u8
}

/// Seule l'injoignabilité totale donne `Unavailable`
pub fn quality(score: u8, reachable: bool) -> NetworkQuality {
    if !reachable {
        NetworkQuality::Unavailable
    } else if score >= 80 {
        NetworkQuality::Excellent
    } else if score >= 60 {
        NetworkQuality::Good
    } else {
        NetworkQuality::Poor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_marks_are_clamped() {
        let input = ScoreInput { ipv4_ping: true, ipv4_udp: true, ipv6: true, response_time_ms: Some(30) };
        assert_eq!(score(&input), 100);
    }

    #[test]
    fn management_port_only() {
        let input = ScoreInput { ipv4_udp: true, ..ScoreInput::default() };
        assert_eq!(score(&input), 40);
        assert_eq!(quality(40, true), NetworkQuality::Poor);
    }

    #[test]
    fn timing_bands() {
        assert_eq!(timing_adjustment(Some(49)), 5);
        assert_eq!(timing_adjustment(Some(50)), 2);
        assert_eq!(timing_adjustment(Some(99)), 2);
        assert_eq!(timing_adjustment(Some(100)), 0);
        assert_eq!(timing_adjustment(Some(1000)), 0);
        assert_eq!(timing_adjustment(Some(1001)), -5);
        assert_eq!(timing_adjustment(None), 0);
    }

    #[test]
    fn slow_response_never_goes_negative() {
        let input = ScoreInput { response_time_ms: Some(5000), ..ScoreInput::default() };
        assert_eq!(score(&input), 0);
    }

    #[test]
    fn unreachable_is_always_unavailable() {
        for s in [0, 40, 60, 80, 100] {
            assert_eq!(quality(s, false), NetworkQuality::Unavailable);
        }
        assert_eq!(quality(80, true), NetworkQuality::Excellent);
        assert_eq!(quality(79, true), NetworkQuality::Good);
        assert_eq!(quality(60, true), NetworkQuality::Good);
        assert_eq!(quality(59, true), NetworkQuality::Poor);
    }
}

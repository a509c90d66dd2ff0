/*!
Runner de processus scripté pour tests sans outils réseau

Remplace `SystemRunner` : aucun processus n'est lancé. Chaque appel est
enregistré, la réponse dépend de l'outil (ping IPv4, ping IPv6, nc) et de
l'adresse ciblée. Par défaut, tout échoue (code de sortie 1).
*/

use async_trait::async_trait;
use dslam_kernel::config::ProbeConfig;
use dslam_kernel::probes::{ProbeCommand, ProcessRunner, RunOutcome};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Outil visé par une commande de sonde
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeTool {
    Ping,
    Ping6,
    Udp,
}

/// Comportement scripté d'un outil
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    Reply { code: i32, stdout: String, elapsed_ms: u64 },
    /// Ne répond jamais : le runner attend le délai dur puis rend `TimedOut`
    Hang,
    SpawnFailure(String),
}

impl Script {
    pub fn ping_reply(elapsed_ms: u64) -> Self {
        Script::Reply {
            code: 0,
            stdout: format!("64 bytes from target: icmp_seq=1 ttl=64 time={elapsed_ms} ms\n1 packets transmitted, 1 received"),
            elapsed_ms,
        }
    }

    pub fn exit(code: i32, elapsed_ms: u64) -> Self {
        Script::Reply { code, stdout: String::new(), elapsed_ms }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub tool: ProbeTool,
    pub address: String,
    pub command: ProbeCommand,
    pub hard_timeout: Duration,
}

#[derive(Clone)]
pub struct ScriptedRunner {
    ping_program: String,
    scripts: Arc<Mutex<HashMap<(ProbeTool, String), Script>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::for_config(&ProbeConfig::default())
    }

    /// Reconnaît les outils d'après les commandes de la configuration
    pub fn for_config(config: &ProbeConfig) -> Self {
        Self {
            ping_program: config.ping_command.clone(),
            scripts: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn script(&self, tool: ProbeTool, address: &str, script: Script) -> &Self {
        self.scripts.lock().insert((tool, address.to_string()), script);
        self
    }

    pub fn ping_ok(&self, address: &str, elapsed_ms: u64) -> &Self {
        self.script(ProbeTool::Ping, address, Script::ping_reply(elapsed_ms))
    }

    pub fn ping6_ok(&self, address: &str, elapsed_ms: u64) -> &Self {
        self.script(ProbeTool::Ping6, address, Script::ping_reply(elapsed_ms))
    }

    pub fn udp_ok(&self, address: &str, elapsed_ms: u64) -> &Self {
        self.script(ProbeTool::Udp, address, Script::exit(0, elapsed_ms))
    }

    /// Tous les outils restent bloqués sur cette adresse
    pub fn hang(&self, address: &str) -> &Self {
        for tool in [ProbeTool::Ping, ProbeTool::Ping6, ProbeTool::Udp] {
            self.script(tool, address, Script::Hang);
        }
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls_for(&self, address: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.address == address)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    fn tool_of(&self, command: &ProbeCommand) -> ProbeTool {
        if command.program == self.ping_program {
            if command.args.iter().any(|a| a == "-6") {
                ProbeTool::Ping6
            } else {
                ProbeTool::Ping
            }
        } else {
            ProbeTool::Udp
        }
    }

    /// Adresse ciblée : dernier argument pour ping, avant-dernier pour nc
    fn address_of(tool: ProbeTool, command: &ProbeCommand) -> String {
        let n = command.args.len();
        let pos = match tool {
            ProbeTool::Udp => n.saturating_sub(2),
            _ => n.saturating_sub(1),
        };
        command.args.get(pos).cloned().unwrap_or_default()
    }
}

impl Default for ScriptedRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, command: &ProbeCommand, hard_timeout: Duration) -> RunOutcome {
        let tool = self.tool_of(command);
        let address = Self::address_of(tool, command);
        self.calls.lock().push(RecordedCall {
            tool,
            address: address.clone(),
            command: command.clone(),
            hard_timeout,
        });

        let script = self
            .scripts
            .lock()
            .get(&(tool, address))
            .cloned()
            .unwrap_or_else(|| Script::exit(1, 1));

        match script {
            Script::Reply { code, stdout, elapsed_ms } => RunOutcome::Exited {
                code: Some(code),
                stdout,
                elapsed: Duration::from_millis(elapsed_ms),
            },
            Script::Hang => {
                tokio::time::sleep(hard_timeout).await;
                RunOutcome::TimedOut
            }
            Script::SpawnFailure(reason) => RunOutcome::SpawnFailed(reason),
        }
    }
}

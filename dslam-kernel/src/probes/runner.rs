/**
 * RUNNER - Exécution des outils système des sondes
 *
 * RÔLE : Un `ProcessRunner` lance une commande externe et rend toujours la main
 * avant le délai dur.
 *
 * FONCTIONNEMENT :
 * - SystemRunner possède le processus fils pendant tout l'appel
 * - Délai dépassé → fils tué puis attendu, issue `TimedOut`
 * - `kill_on_drop` libère le fils si le futur appelant est abandonné
 */

use async_trait::async_trait;
use std::fmt;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Command line of a probe tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ProbeCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self { program: program.into(), args: Vec::new() }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for ProbeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// How a probe process ended. Never an error: callers derive failure from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Process terminated on its own. `code` is `None` when killed by a signal.
    Exited {
        code: Option<i32>,
        stdout: String,
        elapsed: Duration,
    },
    /// Hard deadline reached, process killed
    TimedOut,
    SpawnFailed(String),
}

impl RunOutcome {
    pub fn exited_ok(&self) -> bool {
        matches!(self, RunOutcome::Exited { code: Some(0), .. })
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: &ProbeCommand, hard_timeout: Duration) -> RunOutcome;
}

/// Runner backed by `tokio::process`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl ProcessRunner for SystemRunner {
    async fn run(&self, command: &ProbeCommand, hard_timeout: Duration) -> RunOutcome {
        let started = Instant::now();
        let spawned = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                debug!("failed to spawn `{}`: {}", command, e);
                return RunOutcome::SpawnFailed(e.to_string());
            }
        };

        let mut stdout = child.stdout.take();
        let completion = async {
            let mut buf = Vec::new();
            if let Some(out) = stdout.as_mut() {
                // A read error only loses output, the exit status still decides
                let _ = out.read_to_end(&mut buf).await;
            }
            (buf, child.wait().await)
        };
        let waited = timeout(hard_timeout, completion).await;

        match waited {
            Ok((buf, Ok(status))) => RunOutcome::Exited {
                code: status.code(),
                stdout: String::from_utf8_lossy(&buf).into_owned(),
                elapsed: started.elapsed(),
            },
            Ok((_, Err(e))) => {
                warn!("failed to wait for `{}`: {}", command, e);
                RunOutcome::SpawnFailed(e.to_string())
            }
            Err(_) => {
                debug!("`{}` exceeded {:?}, killing", command, hard_timeout);
                if let Err(e) = child.kill().await {
                    warn!("failed to kill `{}`: {}", command, e);
                }
                RunOutcome::TimedOut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_arguments() {
        let cmd = ProbeCommand::new("ping").args(["-c", "1"]).arg("10.0.0.1");
        assert_eq!(cmd.to_string(), "ping -c 1 10.0.0.1");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_failure() {
        let cmd = ProbeCommand::new("/nonexistent/dslam-probe-tool");
        let outcome = SystemRunner.run(&cmd, Duration::from_secs(1)).await;
        assert!(matches!(outcome, RunOutcome::SpawnFailed(_)));
        assert!(!outcome.exited_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let cmd = ProbeCommand::new("sh").args(["-c", "echo 1 received; exit 3"]);
        match SystemRunner.run(&cmd, Duration::from_secs(5)).await {
            RunOutcome::Exited { code, stdout, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stdout.trim(), "1 received");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn successful_command_exits_ok() {
        let outcome = SystemRunner.run(&ProbeCommand::new("true"), Duration::from_secs(5)).await;
        assert!(outcome.exited_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_process_is_killed_at_deadline() {
        let cmd = ProbeCommand::new("sleep").arg("30");
        let started = Instant::now();
        let outcome = SystemRunner.run(&cmd, Duration::from_millis(300)).await;
        assert_eq!(outcome, RunOutcome::TimedOut);
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}

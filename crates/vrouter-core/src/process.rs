// ── Process control ──
//
// Every external effect (service restarts, `ip`, `iptables-restore`,
// validators) goes through a `CommandRunner`. `SystemRunner` executes for
// real; `DryRunRunner` records what would run and answers from a script.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{RouterConfig, ServiceManager};
use crate::error::CoreError;

// ── Commands ────────────────────────────────────────────────────────

/// A program and its argument vector. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Shorthand for `ip <args...>`.
    pub fn ip<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new("ip").args(args)
    }

    /// Copy with every `{}` argument replaced by `path`.
    pub fn with_path(&self, path: &Path) -> Self {
        let rendered = path.display().to_string();
        Self {
            program: self.program.clone(),
            args: self
                .args
                .iter()
                .map(|a| if a == "{}" { rendered.clone() } else { a.clone() })
                .collect(),
        }
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Exit status and captured output of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn ok() -> Self {
        Self::with_status(0)
    }

    pub fn with_status(status: i32) -> Self {
        Self {
            status,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    #[must_use]
    pub fn stdout(mut self, text: impl Into<String>) -> Self {
        self.stdout = text.into();
        self
    }

    #[must_use]
    pub fn stderr(mut self, text: impl Into<String>) -> Self {
        self.stderr = text.into();
        self
    }

    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Failure that means the desired state already holds: adding what
    /// exists, or deleting what is gone.
    pub fn is_idempotent_success(&self) -> bool {
        const MARKERS: &[&str] = &[
            "File exists",
            "already assigned",
            "Cannot assign requested address",
            "No such process",
            "No such file or directory",
            "does not exist",
        ];
        !self.success() && MARKERS.iter().any(|m| self.stderr.contains(m))
    }
}

/// A running process as seen in the process table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub pid: i32,
    pub argv: Vec<String>,
}

impl ProcessInfo {
    /// Whether `signature` appears in order within this argv.
    ///
    /// The first element is compared by basename so `keepalived` matches
    /// `/usr/sbin/keepalived`.
    pub fn matches(&self, signature: &[String]) -> bool {
        let Some((head, rest)) = signature.split_first() else {
            return false;
        };
        let Some((argv0, args)) = self.argv.split_first() else {
            return false;
        };
        let base = Path::new(argv0)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(argv0);
        if base != head.as_str() && argv0 != head {
            return false;
        }
        let mut args = args.iter();
        rest.iter().all(|want| args.any(|a| a == want))
    }
}

// ── Runner seam ─────────────────────────────────────────────────────

/// Executes commands and inspects the process table.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
    ) -> impl Future<Output = Result<CommandOutput, CoreError>> + Send;

    fn processes(&self) -> Result<Vec<ProcessInfo>, CoreError>;
}

/// Runs commands on the host via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        timeout: Duration,
    ) -> Result<CommandOutput, CoreError> {
        debug!(%command, "executing");
        let child = tokio::process::Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| CoreError::CommandTimeout {
                command: command.to_string(),
                timeout_secs: timeout.as_secs(),
            })?
            .map_err(|e| CoreError::CommandFailed {
                command: command.to_string(),
                status: -1,
                stderr: e.to_string(),
            })?;

        Ok(CommandOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn processes(&self) -> Result<Vec<ProcessInfo>, CoreError> {
        let all = procfs::process::all_processes()
            .map_err(|e| CoreError::Internal(format!("cannot read process table: {e}")))?;
        Ok(all
            .filter_map(Result::ok)
            .filter_map(|proc| {
                let argv = proc.cmdline().ok()?;
                (!argv.is_empty()).then(|| ProcessInfo {
                    pid: proc.pid(),
                    argv,
                })
            })
            .collect())
    }
}

/// Records commands instead of running them.
///
/// Every command succeeds unless a scripted response matches it. Used by
/// `--dry-run` and by tests.
#[derive(Debug, Default)]
pub struct DryRunRunner {
    recorded: Mutex<Vec<CommandSpec>>,
    responses: Mutex<Vec<(Vec<String>, CommandOutput)>>,
    processes: Mutex<Vec<ProcessInfo>>,
}

impl DryRunRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands whose `program args...` starts with `prefix`.
    ///
    /// Later scripts win over earlier ones.
    #[must_use]
    pub fn respond(self, prefix: &[&str], output: CommandOutput) -> Self {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((prefix.iter().map(|s| (*s).to_owned()).collect(), output));
        self
    }

    /// Pretend these processes are running.
    #[must_use]
    pub fn with_process(self, pid: i32, argv: &[&str]) -> Self {
        self.processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ProcessInfo {
                pid,
                argv: argv.iter().map(|s| (*s).to_owned()).collect(),
            });
        self
    }

    /// Every command seen so far, in order.
    pub fn recorded(&self) -> Vec<CommandSpec> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Recorded commands rendered as strings.
    pub fn recorded_lines(&self) -> Vec<String> {
        self.recorded().iter().map(ToString::to_string).collect()
    }

    pub fn clear(&self) {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn scripted(&self, command: &CommandSpec) -> Option<CommandOutput> {
        let words: Vec<&str> = std::iter::once(command.program.as_str())
            .chain(command.args.iter().map(String::as_str))
            .collect();
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(prefix, _)| {
                prefix.len() <= words.len() && prefix.iter().zip(&words).all(|(p, w)| p == w)
            })
            .map(|(_, output)| output.clone())
    }
}

impl CommandRunner for DryRunRunner {
    async fn run(
        &self,
        command: &CommandSpec,
        _timeout: Duration,
    ) -> Result<CommandOutput, CoreError> {
        info!(%command, "dry run");
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(command.clone());
        Ok(self.scripted(command).unwrap_or_else(CommandOutput::ok))
    }

    fn processes(&self) -> Result<Vec<ProcessInfo>, CoreError> {
        Ok(self
            .processes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }
}

// ── Controller ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
    Reload,
}

/// Runs commands with the configured timeout and service manager.
#[derive(Debug)]
pub struct ProcessController<R> {
    runner: Arc<R>,
    manager: ServiceManager,
    timeout: Duration,
}

impl<R: CommandRunner> ProcessController<R> {
    pub fn new(runner: Arc<R>, config: &RouterConfig) -> Self {
        Self {
            runner,
            manager: config.service_manager,
            timeout: config.command_timeout(),
        }
    }

    pub fn runner(&self) -> &Arc<R> {
        &self.runner
    }

    /// Run a command and capture its output, whatever its exit status.
    pub async fn probe(&self, command: &CommandSpec) -> Result<CommandOutput, CoreError> {
        self.runner.run(command, self.timeout).await
    }

    /// Run a command; a non-zero exit is an error.
    pub async fn execute(&self, command: &CommandSpec) -> Result<CommandOutput, CoreError> {
        let output = self.probe(command).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(failed(command, &output))
        }
    }

    /// Run a command whose "already done" failures count as success.
    pub async fn execute_idempotent(
        &self,
        command: &CommandSpec,
    ) -> Result<CommandOutput, CoreError> {
        let output = self.probe(command).await?;
        if output.success() {
            Ok(output)
        } else if output.is_idempotent_success() {
            debug!(%command, stderr = output.stderr.trim(), "already applied");
            Ok(output)
        } else {
            Err(failed(command, &output))
        }
    }

    pub fn service_command(&self, service: &str, action: ServiceAction) -> CommandSpec {
        match self.manager {
            ServiceManager::Systemd => CommandSpec::new("systemctl")
                .arg(action.to_string())
                .arg(service),
            ServiceManager::Sysv => CommandSpec::new("service")
                .arg(service)
                .arg(action.to_string()),
        }
    }

    pub async fn service(&self, service: &str, action: ServiceAction) -> Result<(), CoreError> {
        info!(service, %action, "service action");
        self.execute(&self.service_command(service, action))
            .await
            .map(|_| ())
    }

    /// First running process matching `signature`.
    pub fn find_process(&self, signature: &[String]) -> Result<Option<ProcessInfo>, CoreError> {
        Ok(self
            .runner
            .processes()?
            .into_iter()
            .find(|p| p.matches(signature)))
    }

    /// Start `service` unless a process matching `signature` is running.
    ///
    /// Returns `true` when a start was issued.
    pub async fn ensure_running(
        &self,
        signature: &[String],
        service: &str,
    ) -> Result<bool, CoreError> {
        if let Some(proc) = self.find_process(signature)? {
            debug!(service, pid = proc.pid, "already running");
            return Ok(false);
        }
        warn!(service, "not running, starting");
        self.service(service, ServiceAction::Start).await?;
        Ok(true)
    }
}

fn failed(command: &CommandSpec, output: &CommandOutput) -> CoreError {
    CoreError::CommandFailed {
        command: command.to_string(),
        status: output.status,
        stderr: output.stderr.trim().to_owned(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn controller(runner: DryRunRunner, manager: ServiceManager) -> ProcessController<DryRunRunner> {
        let config = RouterConfig {
            service_manager: manager,
            ..RouterConfig::default()
        };
        ProcessController::new(Arc::new(runner), &config)
    }

    #[test]
    fn signature_matches_basename_and_ordered_args() {
        let proc = ProcessInfo {
            pid: 10,
            argv: vec![
                "/usr/sbin/keepalived".into(),
                "--dont-fork".into(),
                "-f".into(),
                "/etc/keepalived/keepalived.conf".into(),
            ],
        };
        assert!(proc.matches(&["keepalived".into()]));
        assert!(proc.matches(&["keepalived".into(), "-f".into()]));
        assert!(!proc.matches(&["keepalived".into(), "--vrrp".into()]));
        assert!(!proc.matches(&["dnsmasq".into()]));
        assert!(!proc.matches(&[]));
    }

    #[test]
    fn path_placeholder_is_substituted() {
        let cmd = CommandSpec::new("haproxy").args(["-c", "-f", "{}"]);
        assert_eq!(
            cmd.with_path(Path::new("/tmp/x")).to_string(),
            "haproxy -c -f /tmp/x"
        );
    }

    #[tokio::test]
    async fn service_commands_follow_the_manager() {
        let ctl = controller(DryRunRunner::new(), ServiceManager::Sysv);
        ctl.service("dnsmasq", ServiceAction::Restart).await.unwrap();
        let ctl2 = controller(DryRunRunner::new(), ServiceManager::Systemd);
        ctl2.service("dnsmasq", ServiceAction::Restart).await.unwrap();

        assert_eq!(ctl.runner().recorded_lines(), vec!["service dnsmasq restart"]);
        assert_eq!(ctl2.runner().recorded_lines(), vec!["systemctl restart dnsmasq"]);
    }

    #[tokio::test]
    async fn existing_address_counts_as_success_only_when_idempotent() {
        let runner = DryRunRunner::new().respond(
            &["ip", "addr", "add"],
            CommandOutput::with_status(2).stderr("RTNETLINK answers: File exists"),
        );
        let ctl = controller(runner, ServiceManager::Systemd);
        let cmd = CommandSpec::ip(["addr", "add", "10.0.0.1/24", "dev", "eth1"]);

        ctl.execute_idempotent(&cmd).await.unwrap();
        let err = ctl.execute(&cmd).await.unwrap_err();
        assert!(matches!(err, CoreError::CommandFailed { status: 2, .. }));
    }

    #[tokio::test]
    async fn ensure_running_starts_only_when_absent() {
        let signature = vec!["keepalived".to_string()];

        let running = controller(
            DryRunRunner::new().with_process(42, &["/usr/sbin/keepalived"]),
            ServiceManager::Systemd,
        );
        assert!(!running.ensure_running(&signature, "keepalived").await.unwrap());
        assert!(running.runner().recorded().is_empty());

        let absent = controller(DryRunRunner::new(), ServiceManager::Systemd);
        assert!(absent.ensure_running(&signature, "keepalived").await.unwrap());
        assert_eq!(absent.runner().recorded_lines(), vec!["systemctl start keepalived"]);
    }

    #[tokio::test]
    async fn system_runner_captures_exit_status() {
        let out = SystemRunner
            .run(&CommandSpec::new("sh").args(["-c", "echo hi; exit 3"]), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out.status, 3);
        assert_eq!(out.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn system_runner_times_out() {
        let err = SystemRunner
            .run(&CommandSpec::new("sleep").arg("5"), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CommandTimeout { .. }));
    }
}

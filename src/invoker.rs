//! Process invocation boundary.
//!
//! [`ProcessInvoker`] is the seam between the engine and the container
//! runtime's CLI. [`CommandInvoker`] is the production implementation built on
//! `tokio::process`; tests substitute their own invoker.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use dockwatch_types::{ErrorInfo, ErrorKind};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Default docker executable, resolved through `PATH`.
pub const DEFAULT_DOCKER: &str = "docker";

/// Go template for the status listing: name and state, tab separated.
pub const STATUS_FORMAT: &str = "{{.Names}}\t{{.State}}";

/// Go template for the name-only listing used by import.
pub const NAMES_FORMAT: &str = "{{.Names}}";

/// An external command: program plus arguments. Never run through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `docker ps --all --format "{{.Names}}\t{{.State}}"`
    pub fn docker_status(docker: impl Into<String>) -> Self {
        Self::new(docker, ["ps", "--all", "--format", STATUS_FORMAT])
    }

    /// `docker ps --all --format "{{.Names}}"`
    pub fn docker_names(docker: impl Into<String>) -> Self {
        Self::new(docker, ["ps", "--all", "--format", NAMES_FORMAT])
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg:?}")?;
        }
        Ok(())
    }
}

/// Captured output of a successful invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawOutput {
    pub stdout: String,
    pub stderr: String,
}

impl RawOutput {
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }
}

/// Failure of a single invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The executable could not be started, or its pipes failed.
    #[error("failed to run {program}: {source}")]
    LaunchFailed {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process ran and reported failure.
    #[error("{program} command failed{}", stderr_suffix(.stderr))]
    NonZeroExit {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The process exceeded its time budget and was killed.
    #[error("{program} command timed out after {}s", .after.as_secs())]
    Timeout { program: String, after: Duration },
}

fn stderr_suffix(stderr: &str) -> String {
    match stderr.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => format!(": {line}"),
        None => String::new(),
    }
}

impl InvokeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InvokeError::LaunchFailed { .. } => ErrorKind::LaunchFailed,
            InvokeError::NonZeroExit { .. } => ErrorKind::NonZeroExit,
            InvokeError::Timeout { .. } => ErrorKind::Timeout,
        }
    }

    /// Convert into the snapshot-facing error description.
    pub fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.kind(), self.to_string())
    }
}

/// Runs external commands on behalf of the engine.
#[async_trait]
pub trait ProcessInvoker: Send + Sync + fmt::Debug {
    /// Run `command` to completion within `timeout`.
    ///
    /// Implementations spawn exactly one process per call and must not leave
    /// it (or anything it started) running when the call times out or the
    /// returned future is dropped.
    async fn invoke(&self, command: &CommandSpec, timeout: Duration)
        -> Result<RawOutput, InvokeError>;
}

/// Production invoker using `tokio::process`.
///
/// The child gets its own process group on Unix so that a timeout or
/// cancellation can kill whatever it spawned along with it.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandInvoker;

impl CommandInvoker {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ProcessInvoker for CommandInvoker {
    async fn invoke(
        &self,
        command: &CommandSpec,
        timeout: Duration,
    ) -> Result<RawOutput, InvokeError> {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        debug!("Running {}", command);
        let child = cmd.spawn().map_err(|source| InvokeError::LaunchFailed {
            program: command.program.clone(),
            source,
        })?;

        let mut group = ProcessGroupGuard::new(child.id());

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| InvokeError::LaunchFailed {
                program: command.program.clone(),
                source,
            })?,
            Err(_) => {
                warn!("{} timed out after {:?}, killing it", command, timeout);
                return Err(InvokeError::Timeout {
                    program: command.program.clone(),
                    after: timeout,
                });
            }
        };

        // Exited and reaped: the group id may be reused from here on.
        group.disarm();

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if output.status.success() {
            Ok(RawOutput { stdout, stderr })
        } else {
            Err(InvokeError::NonZeroExit {
                program: command.program.clone(),
                code: output.status.code(),
                stderr,
            })
        }
    }
}

/// Kills a child's process group on drop unless disarmed.
///
/// `kill_on_drop` only reaches the direct child; this reaches its descendants.
#[derive(Debug)]
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn disarm(&mut self) {
        self.pgid = None;
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            match killpg(Pid::from_raw(pgid as i32), Signal::SIGKILL) {
                Ok(()) => debug!("Killed process group {}", pgid),
                Err(nix::errno::Errno::ESRCH) => {}
                Err(e) => warn!("Failed to kill process group {}: {}", pgid, e),
            }
        }

        #[cfg(not(unix))]
        let _ = pgid;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docker_commands_match_runtime_cli() {
        let status = CommandSpec::docker_status("docker");
        assert_eq!(status.program, "docker");
        assert_eq!(
            status.args,
            vec!["ps", "--all", "--format", "{{.Names}}\t{{.State}}"]
        );

        let names = CommandSpec::docker_names("/usr/local/bin/docker");
        assert_eq!(names.program, "/usr/local/bin/docker");
        assert_eq!(names.args.last().map(String::as_str), Some("{{.Names}}"));
    }

    #[test]
    fn error_kinds_map_to_snapshot_kinds() {
        let launch = InvokeError::LaunchFailed {
            program: "docker".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert_eq!(launch.kind(), ErrorKind::LaunchFailed);

        let exit = InvokeError::NonZeroExit {
            program: "docker".into(),
            code: Some(1),
            stderr: "\nCannot connect to the Docker daemon\nsecond line\n".into(),
        };
        assert_eq!(exit.kind(), ErrorKind::NonZeroExit);
        assert_eq!(
            exit.to_error_info().message,
            "docker command failed: Cannot connect to the Docker daemon"
        );

        let timeout = InvokeError::Timeout {
            program: "docker".into(),
            after: Duration::from_secs(10),
        };
        assert_eq!(timeout.kind(), ErrorKind::Timeout);
        assert_eq!(timeout.to_string(), "docker command timed out after 10s");
    }

    #[test]
    fn non_zero_exit_without_stderr_has_plain_message() {
        let exit = InvokeError::NonZeroExit {
            program: "docker".into(),
            code: Some(1),
            stderr: String::new(),
        };
        assert_eq!(exit.to_string(), "docker command failed");
    }

    #[tokio::test]
    async fn missing_executable_is_launch_failure() {
        let invoker = CommandInvoker::new();
        let command = CommandSpec::new("dockwatch-definitely-not-installed", ["ps"]);

        let err = invoker
            .invoke(&command, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LaunchFailed);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_verbatim() {
        let invoker = CommandInvoker::new();
        let command = CommandSpec::new("sh", ["-c", "printf 'web\\trunning\\n'"]);

        let output = invoker
            .invoke(&command, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(output.stdout, "web\trunning\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_carries_stderr() {
        let invoker = CommandInvoker::new();
        let command = CommandSpec::new("sh", ["-c", "echo boom >&2; exit 3"]);

        let err = invoker
            .invoke(&command, Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            InvokeError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "boom");
            }
            other => panic!("expected NonZeroExit, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let invoker = CommandInvoker::new();
        let command = CommandSpec::new("sh", ["-c", "sleep 30"]);

        let started = std::time::Instant::now();
        let err = invoker
            .invoke(&command, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    /// `sh` that records its own pid and a background `sleep`'s pid, then
    /// waits on the sleep.
    #[cfg(unix)]
    fn spawning_shell(dir: &std::path::Path) -> CommandSpec {
        let script = format!(
            "echo $$ > {shell}; sleep 300 & echo $! > {sleep}; wait",
            shell = dir.join("shell.pid").display(),
            sleep = dir.join("sleep.pid").display(),
        );
        CommandSpec::new("sh", ["-c".to_string(), script])
    }

    #[cfg(unix)]
    fn read_pid(path: std::path::PathBuf) -> i32 {
        std::fs::read_to_string(&path)
            .unwrap()
            .trim()
            .parse()
            .unwrap()
    }

    /// Alive and not a zombie waiting to be reaped.
    #[cfg(unix)]
    fn process_alive(pid: i32) -> bool {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        if kill(Pid::from_raw(pid), None).is_err() {
            return false;
        }
        match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
            Ok(stat) => !stat
                .rsplit(')')
                .next()
                .is_some_and(|rest| rest.trim_start().starts_with('Z')),
            Err(_) => true,
        }
    }

    #[cfg(unix)]
    async fn wait_until_gone(pid: i32) -> bool {
        for _ in 0..100 {
            if !process_alive(pid) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        false
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_the_whole_process_group() {
        let dir = tempfile::TempDir::new().unwrap();
        let invoker = CommandInvoker::new();

        let err = invoker
            .invoke(&spawning_shell(dir.path()), Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(matches!(err, InvokeError::Timeout { .. }));

        let shell = read_pid(dir.path().join("shell.pid"));
        let sleep = read_pid(dir.path().join("sleep.pid"));
        assert!(wait_until_gone(shell).await, "shell {shell} survived");
        assert!(wait_until_gone(sleep).await, "background sleep {sleep} survived");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn dropping_the_call_kills_the_whole_process_group() {
        let dir = tempfile::TempDir::new().unwrap();
        let invoker = CommandInvoker::new();
        let command = spawning_shell(dir.path());

        // The call's own budget is far away; the outer timeout drops it
        let cancelled = tokio::time::timeout(
            Duration::from_millis(500),
            invoker.invoke(&command, Duration::from_secs(60)),
        )
        .await;
        assert!(cancelled.is_err());

        let shell = read_pid(dir.path().join("shell.pid"));
        let sleep = read_pid(dir.path().join("sleep.pid"));
        assert!(wait_until_gone(shell).await, "shell {shell} survived");
        assert!(wait_until_gone(sleep).await, "background sleep {sleep} survived");
    }
}

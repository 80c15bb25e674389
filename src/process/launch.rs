//! Spawning and terminating the game server process.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, warn};

use crate::config::ServerConfig;

/// Program, arguments and working directory of one server launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

impl LaunchSpec {
    /// Build the launch command for `server` with the given mod folders.
    ///
    /// A relative executable containing a path separator is resolved
    /// against the server directory; a bare name is looked up on `PATH`.
    pub fn from_config(server: &ServerConfig, mods: &[String]) -> Self {
        let executable = Path::new(&server.executable);
        let program = if executable.is_relative() && executable.components().count() > 1 {
            server.dir.join(executable)
        } else {
            executable.to_path_buf()
        };

        let mut args = vec![
            format!("-profiles={}", server.profiles_dir),
            format!("-maxMem={}", server.max_mem_mb),
        ];
        if !mods.is_empty() {
            args.push(format!("-mod={}", mods.join(";")));
        }
        args.push(format!("-config={}", server.config_file));
        args.push(format!("-port={}", server.port));
        args.push(format!("-cpuCount={}", server.cpu_cores));
        args.extend(server.extra_flags.iter().cloned());

        Self {
            program,
            args,
            cwd: server.dir.clone(),
        }
    }
}

/// Result of a non-blocking liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Exited { code: Option<i32> },
}

/// A launched server process.
#[async_trait]
pub trait ServerProcess: Send {
    fn id(&self) -> Option<u32>;

    /// Check whether the process is still running without blocking.
    fn liveness(&mut self) -> Result<Liveness>;

    /// Ask the process to exit, killing it if it is still running after
    /// `grace`. Reaps the process either way.
    async fn terminate(&mut self, grace: Duration) -> Result<()>;
}

/// Creates server processes.
pub trait ServerLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ServerProcess>>;
}

/// Launches real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandLauncher;

impl ServerLauncher for CommandLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ServerProcess>> {
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .current_dir(&spec.cwd)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn {}", spec.program.display()))?;
        debug!(pid = ?child.id(), program = %spec.program.display(), "Spawned server process");
        Ok(Box::new(ChildProcess { child }))
    }
}

struct ChildProcess {
    child: Child,
}

#[async_trait]
impl ServerProcess for ChildProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn liveness(&mut self) -> Result<Liveness> {
        let status = self
            .child
            .try_wait()
            .context("Failed to query server process status")?;
        Ok(match status {
            Some(status) => Liveness::Exited {
                code: status.code(),
            },
            None => Liveness::Alive,
        })
    }

    async fn terminate(&mut self, grace: Duration) -> Result<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }

        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            use nix::sys::signal::{Signal, kill};
            use nix::unistd::Pid;

            let pid = i32::try_from(pid).context("Process ID out of range")?;
            if let Err(e) = kill(Pid::from_raw(pid), Signal::SIGTERM) {
                warn!(pid, error = %e, "Failed to send SIGTERM");
            } else if let Ok(status) = tokio::time::timeout(grace, self.child.wait()).await {
                status.context("Failed to wait for server process")?;
                return Ok(());
            }
            warn!(pid, grace_secs = grace.as_secs(), "Server did not exit in time, killing it");
        }

        #[cfg(not(unix))]
        let _ = grace;

        self.child
            .kill()
            .await
            .context("Failed to kill server process")?;
        Ok(())
    }
}

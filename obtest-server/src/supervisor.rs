//! Database server process lifecycle
//!
//! `ServerSupervisor` owns at most one `ServerHandle`. A handle is registered
//! as soon as the process is spawned, so a failed start can still be stopped
//! and cleaned by the caller.

use crate::probe::probe;
use camino::{Utf8Path, Utf8PathBuf};
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use obtest_core::config::Config;
use obtest_core::{Endpoint, ObtestError, Result};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

/// Pause between spawn and the first readiness probe.
pub const SETTLE_DELAY: Duration = Duration::from_millis(200);
pub const PROBE_INTERVAL: Duration = Duration::from_millis(500);
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
/// How long a graceful stop may take before the process is killed.
pub const STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Ready,
    Stopping,
    FailedToStart,
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub binary: Utf8PathBuf,
    pub config_file: Utf8PathBuf,
    pub data_dir: Utf8PathBuf,
    pub endpoint: Endpoint,
    /// Remove any existing data directory before starting.
    pub clean_data_dir: bool,
    /// Keep the data directory on cleanup.
    pub retain_data: bool,
}

impl ServerOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            binary: config.server_binary(),
            config_file: config.server_config_file(),
            data_dir: config.data_dir(),
            endpoint: config.endpoint(),
            clean_data_dir: true,
            retain_data: config.retain_data(),
        }
    }
}

/// One spawned server process.
pub struct ServerHandle {
    child: Child,
    pid: u32,
    state: ServerState,
    endpoint: Endpoint,
    spawned_at: Instant,
    startup_time: Option<Duration>,
}

impl ServerHandle {
    pub fn state(&self) -> ServerState {
        self.state
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Time from spawn until the first successful probe.
    pub fn startup_time(&self) -> Option<Duration> {
        self.startup_time
    }

    /// Notice a ready server that has since exited on its own.
    fn reap(&mut self) -> ServerState {
        if self.state == ServerState::Ready {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    warn!("server exited unexpectedly with {}. pid={}", status, self.pid);
                    self.state = ServerState::Stopped;
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to check server status: {}", e),
            }
        }
        self.state
    }

    async fn wait_until_ready(&mut self) -> Result<()> {
        let deadline = self.spawned_at + SETTLE_DELAY + PROBE_TIMEOUT;

        while Instant::now() <= deadline {
            if let Some(status) = self.child.try_wait()? {
                error!("Server exited during startup with {}", status);
                self.state = ServerState::FailedToStart;
                return Err(ObtestError::Exited {
                    code: status.code(),
                });
            }
            if probe(&self.endpoint).await {
                self.state = ServerState::Ready;
                self.startup_time = Some(self.spawned_at.elapsed());
                return Ok(());
            }
            sleep(PROBE_INTERVAL).await;
        }

        let waited = self.spawned_at.elapsed();
        error!("Failed to start server in {:?}", waited);
        self.state = ServerState::FailedToStart;
        Err(ObtestError::NotReady { waited })
    }

    async fn terminate(&mut self) -> bool {
        if self.state == ServerState::Stopped {
            return true;
        }

        // Already reaped; the pid may belong to someone else by now.
        match self.child.try_wait() {
            Ok(Some(status)) => {
                info!("server already exited with {}. pid={}", status, self.pid);
                self.state = ServerState::Stopped;
                return true;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to check server status: {}", e),
        }

        self.state = ServerState::Stopping;
        if let Err(e) = kill(Pid::from_raw(self.pid as i32), Signal::SIGTERM) {
            warn!("Failed to send SIGTERM to server pid={}: {}", self.pid, e);
        }

        match timeout(STOP_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!("server exit with {}. pid={}", status, self.pid);
                self.state = ServerState::Stopped;
                true
            }
            Ok(Err(e)) => {
                warn!("Failed to wait for server pid={}: {}", self.pid, e);
                self.force_kill().await;
                false
            }
            Err(_) => {
                warn!("wait server exit timed out after {:?}. pid={}", STOP_TIMEOUT, self.pid);
                self.force_kill().await;
                false
            }
        }
    }

    async fn force_kill(&mut self) {
        if let Err(e) = self.child.kill().await {
            warn!("Failed to kill server pid={}: {}", self.pid, e);
        }
        self.state = ServerState::Stopped;
    }
}

pub struct ServerSupervisor {
    options: ServerOptions,
    handle: Option<ServerHandle>,
    /// Set once `start` has created the data directory.
    data_prepared: bool,
}

impl ServerSupervisor {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options,
            handle: None,
            data_prepared: false,
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }

    pub fn handle(&self) -> Option<&ServerHandle> {
        self.handle.as_ref()
    }

    /// Current state, reporting `Stopped` once a ready process has exited.
    pub fn state(&mut self) -> ServerState {
        self.handle
            .as_mut()
            .map_or(ServerState::Stopped, ServerHandle::reap)
    }

    /// Whether the process has exited since it became ready.
    pub fn has_exited(&mut self) -> bool {
        self.handle.is_some() && self.state() == ServerState::Stopped
    }

    pub fn is_ready(&mut self) -> bool {
        self.state() == ServerState::Ready
    }

    /// Spawn the server and wait until its endpoint accepts connections.
    ///
    /// A no-op when the server is already ready. After any failure past the
    /// spawn, `stop` and `cleanup` must still be called.
    pub async fn start(&mut self) -> Result<()> {
        match self.state() {
            ServerState::Ready => {
                warn!("Server has already been started");
                return Ok(());
            }
            ServerState::Stopped if self.handle.is_none() => {}
            state => {
                return Err(ObtestError::Start(format!(
                    "previous server instance is {state:?}; stop it first"
                )));
            }
        }

        self.check_files()?;
        prepare_data_dir(&self.options.data_dir, self.options.clean_data_dir)?;
        self.data_prepared = true;

        let options = &self.options;
        debug!("use '{}' as server work path", options.data_dir);
        let spawned_at = Instant::now();
        let child = Command::new(&options.binary)
            .arg("-f")
            .arg(&options.config_file)
            .args(options.endpoint.server_args())
            .current_dir(&options.data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ObtestError::Start(format!("failed to spawn {}: {e}", options.binary)))?;

        let pid = child
            .id()
            .ok_or_else(|| ObtestError::Start("spawned server has no pid".to_owned()))?;
        info!("start subprocess with pid={}", pid);

        let handle = self.handle.insert(ServerHandle {
            child,
            pid,
            state: ServerState::Starting,
            endpoint: options.endpoint.clone(),
            spawned_at,
            startup_time: None,
        });

        if let Some(status) = handle.child.try_wait()? {
            error!("Failed to start server, exit with {}", status);
            handle.state = ServerState::FailedToStart;
            return Err(ObtestError::Exited {
                code: status.code(),
            });
        }

        sleep(SETTLE_DELAY).await;
        handle.wait_until_ready().await?;
        info!(
            "server started in {:?} at {}",
            handle.startup_time.unwrap_or_default(),
            handle.endpoint
        );
        Ok(())
    }

    /// Terminate the process gracefully, killing it if it does not exit in time.
    ///
    /// Returns false when the process had to be killed. Never fails.
    pub async fn stop(&mut self) -> bool {
        match self.handle.as_mut() {
            Some(handle) => handle.terminate().await,
            None => {
                debug!("Server has not been started");
                true
            }
        }
    }

    /// Forget the stopped process and remove its data directory unless retained.
    ///
    /// Also removes a data directory left by a start that failed to spawn.
    pub fn cleanup(&mut self) {
        let had_handle = self.handle.take().is_some();
        let prepared = std::mem::take(&mut self.data_prepared);
        if !had_handle && !prepared {
            return;
        }

        if self.options.retain_data {
            info!("server data retained at {}", self.options.data_dir);
            return;
        }
        match std::fs::remove_dir_all(&self.options.data_dir) {
            Ok(()) => info!("server cleaned"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove {}: {}", self.options.data_dir, e),
        }
    }

    /// Stop then clean up.
    pub async fn shutdown(&mut self) -> bool {
        let stopped = self.stop().await;
        self.cleanup();
        stopped
    }

    fn check_files(&self) -> Result<()> {
        if !self.options.binary.is_file() {
            return Err(ObtestError::Config(format!(
                "server binary does not exist: {}",
                self.options.binary
            )));
        }
        if !self.options.config_file.is_file() {
            return Err(ObtestError::Config(format!(
                "config file does not exist: {}",
                self.options.config_file
            )));
        }
        Ok(())
    }
}

fn prepare_data_dir(data_dir: &Utf8Path, clean: bool) -> Result<()> {
    if clean && data_dir.exists() {
        std::fs::remove_dir_all(data_dir)?;
    }
    std::fs::create_dir_all(data_dir)?;

    if !data_dir.is_dir() {
        return Err(ObtestError::Config(format!(
            "{data_dir} is not a directory or failed to create"
        )));
    }
    Ok(())
}

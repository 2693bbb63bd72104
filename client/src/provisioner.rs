//! Engine provisioning: making the engine available and running it.
//!
//! [`EngineProvisioner`] is the seam the startup sequence drives.
//! [`ProcessProvisioner`] is the default: it locates an installed engine
//! executable and runs it as a child process listening on the chosen port.

use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::process::{Child, Command};

use crate::events::EventSink;
use crate::types::EngineConfig;

const SHUTDOWN_TIMEOUT_SECS: u64 = 2;

const PORT_PLACEHOLDER: &str = "{port}";

pub trait EngineProvisioner: Send + Sync + 'static {
    /// Make the engine available locally. Progress may be reported through
    /// `events` as provisioning events.
    fn initialize(&self, events: &EventSink) -> impl Future<Output = Result<()>> + Send;

    /// Launch the engine listening on `port`.
    fn start_service(&self, port: u16) -> impl Future<Output = Result<()>> + Send;

    /// Stop the engine. Must be safe to call more than once.
    fn shutdown(&self) -> impl Future<Output = ()> + Send;
}

/// Minimal glob matcher for env var denylist patterns.
/// Handles `*_SUFFIX`, `PREFIX_*`, `*_INFIX*`, and exact match.
/// Both pattern and key are compared in uppercase.
fn env_glob_matches(pattern: &str, key_upper: &str) -> bool {
    let pat = pattern.to_uppercase();
    match (pat.starts_with('*'), pat.ends_with('*')) {
        (true, true) if pat.len() >= 2 => key_upper.contains(&pat[1..pat.len() - 1]),
        (true, true) => true,
        (true, false) => key_upper.ends_with(&pat[1..]),
        (false, true) => key_upper.starts_with(&pat[..pat.len() - 1]),
        (false, false) => key_upper == pat,
    }
}

/// Substitute `{port}` into the configured arguments, or append
/// `--port <port>` when no argument mentions it.
fn engine_args(args: &[String], port: u16) -> Vec<String> {
    let port = port.to_string();
    if args.iter().any(|a| a.contains(PORT_PLACEHOLDER)) {
        args.iter()
            .map(|a| a.replace(PORT_PLACEHOLDER, &port))
            .collect()
    } else {
        let mut out = args.to_vec();
        out.push("--port".to_string());
        out.push(port);
        out
    }
}

/// Runs an installed engine executable as a child process.
pub struct ProcessProvisioner {
    config: EngineConfig,
    binary: Mutex<Option<PathBuf>>,
    child: tokio::sync::Mutex<Option<Child>>,
}

impl ProcessProvisioner {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            binary: Mutex::new(None),
            child: tokio::sync::Mutex::new(None),
        }
    }

    fn resolved_binary(&self) -> Option<PathBuf> {
        self.binary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EngineProvisioner for ProcessProvisioner {
    async fn initialize(&self, _events: &EventSink) -> Result<()> {
        let resolved = which::which(&self.config.command)
            .with_context(|| format!("engine executable '{}' not found", self.config.command))?;
        tracing::info!(path = %resolved.display(), "Engine executable located");
        *self.binary.lock().unwrap_or_else(PoisonError::into_inner) = Some(resolved);
        Ok(())
    }

    async fn start_service(&self, port: u16) -> Result<()> {
        let binary = self
            .resolved_binary()
            .context("engine provisioner was not initialized")?;

        let mut cmd = Command::new(&binary);
        cmd.args(engine_args(&self.config.args, port))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        if !self.config.env_denylist.is_empty() {
            for (key, _) in std::env::vars_os() {
                let Some(key) = key.to_str() else { continue };
                let upper = key.to_uppercase();
                if self
                    .config
                    .env_denylist
                    .iter()
                    .any(|pat| env_glob_matches(pat, &upper))
                {
                    cmd.env_remove(key);
                }
            }
        }

        let child = cmd
            .spawn()
            .with_context(|| format!("spawning {}", binary.display()))?;
        tracing::info!(pid = child.id(), port, "Engine process started");

        let previous = self.child.lock().await.replace(child);
        if previous.is_some() {
            tracing::warn!("Replacing an engine process that was still tracked");
        }
        Ok(())
    }

    async fn shutdown(&self) {
        let Some(mut child) = self.child.lock().await.take() else {
            return;
        };

        match stop_child(&mut child, Duration::from_secs(SHUTDOWN_TIMEOUT_SECS)).await {
            Ok(status) => tracing::info!(%status, "Engine process exited"),
            Err(e) => tracing::warn!("Failed to reap engine process: {e}"),
        }
    }
}

/// Give the child `grace` to exit on its own, then kill it.
async fn stop_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    if let Ok(status) = tokio::time::timeout(grace, child.wait()).await {
        return status;
    }
    tracing::warn!(
        grace_secs = grace.as_secs_f32(),
        "Engine process did not exit in time; killing"
    );
    child.start_kill()?;
    child.wait().await
}

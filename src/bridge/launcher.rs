//! Bridge process launching
//!
//! [`ProcessLauncher`] runs the bridge script under the configured
//! interpreter with stdin discarded and stdout/stderr captured. Output is
//! scanned for readiness markers and, for per-user bridges, for the JSON
//! descriptor line. Readiness and exit are reported as [`ProcessEvent`]s.

use super::cleanup;
use super::locator::BridgeLocator;
use super::types::{BridgeDescriptor, DescriptorLine};
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};

/// Flag passed to the bridge script to request a dedicated bridge
pub const CREATE_BRIDGE_FLAG: &str = "--create-bridge";

/// What to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchSpec {
    /// Shared bridge on a fixed port, no arguments
    Shared { port: u16 },
    /// Dedicated bridge created from a user seed and token
    PerUser {
        seed: String,
        token: String,
        port: Option<u16>,
    },
}

/// Lifecycle notifications from a launched process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessEvent {
    /// A readiness marker appeared in the process output
    Ready,
    /// The process exited with the given code
    Exited(Option<i32>),
}

/// A running bridge process
pub trait BridgeProcess: Send + Sync {
    fn pid(&self) -> Option<u32>;

    /// Send a graceful termination signal without waiting for exit
    fn terminate(&self);
}

/// Result of a successful launch
pub struct LaunchedBridge {
    /// Port the bridge serves HTTP on
    pub port: u16,
    /// Descriptor reported by a per-user bridge
    pub descriptor: Option<BridgeDescriptor>,
    pub process: Box<dyn BridgeProcess>,
    pub events: mpsc::UnboundedReceiver<ProcessEvent>,
}

impl std::fmt::Debug for LaunchedBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LaunchedBridge")
            .field("port", &self.port)
            .field("descriptor", &self.descriptor)
            .field("pid", &self.process.pid())
            .finish()
    }
}

/// Starts bridge processes
#[async_trait]
pub trait BridgeLauncher: Send + Sync {
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedBridge>;
}

/// Structured input of the per-user creation entry point
#[derive(Debug, Serialize)]
struct CreateBridgeRequest<'a> {
    seed: &'a str,
    agentverse_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
    mailbox: bool,
}

/// Launches the bridge script as a child process
pub struct ProcessLauncher {
    config: BridgeConfig,
    locator: BridgeLocator,
}

impl ProcessLauncher {
    pub fn new(config: BridgeConfig) -> Self {
        let locator = BridgeLocator::from_config(&config);
        Self { config, locator }
    }

    pub fn with_locator(config: BridgeConfig, locator: BridgeLocator) -> Self {
        Self { config, locator }
    }

    fn build_command(&self, script: &Path, spec: &LaunchSpec) -> Result<Command> {
        let mut cmd = Command::new(&self.config.interpreter);
        cmd.arg(script);

        if let LaunchSpec::PerUser { seed, token, port } = spec {
            let request = CreateBridgeRequest {
                seed,
                agentverse_token: token,
                port: *port,
                mailbox: true,
            };
            cmd.arg(CREATE_BRIDGE_FLAG).arg(serde_json::to_string(&request)?);
        }

        if let Some(dir) = script.parent().filter(|d| !d.as_os_str().is_empty()) {
            cmd.current_dir(dir);
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

#[async_trait]
impl BridgeLauncher for ProcessLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedBridge> {
        let script = self.locator.locate()?;
        let mut child = self.build_command(&script, spec)?.spawn().map_err(|e| {
            Error::Spawn(format!(
                "{} {}: {}",
                self.config.interpreter,
                script.display(),
                e
            ))
        })?;

        let pid = child.id();
        tracing::info!(
            pid = ?pid,
            script = %script.display(),
            per_user = matches!(spec, LaunchSpec::PerUser { .. }),
            "Spawned bridge agent"
        );

        if self.config.handle_signals {
            cleanup::install_signal_handlers();
        }
        if let Some(pid) = pid {
            cleanup::track(pid);
        }

        let (event_tx, events) = mpsc::unbounded_channel();
        let markers = Arc::new(self.config.ready_markers.clone());
        let ready_seen = Arc::new(AtomicBool::new(false));

        let (descriptor_tx, descriptor_rx) = oneshot::channel();
        let descriptor_tx = match spec {
            LaunchSpec::PerUser { .. } => Some(descriptor_tx),
            LaunchSpec::Shared { .. } => None,
        };

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(scan_output(
                stdout,
                "stdout",
                pid,
                markers.clone(),
                ready_seen.clone(),
                event_tx.clone(),
                None,
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(scan_output(
                stderr,
                "stderr",
                pid,
                markers,
                ready_seen,
                event_tx.clone(),
                descriptor_tx,
            ));
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        tokio::spawn(supervise(child, pid, kill_rx, event_tx));

        let process = ChildProcess {
            pid,
            kill_tx: Mutex::new(Some(kill_tx)),
        };

        let (port, descriptor) = match spec {
            LaunchSpec::Shared { port } => (*port, None),
            LaunchSpec::PerUser { .. } => {
                let outcome =
                    tokio::time::timeout(self.config.descriptor_timeout(), descriptor_rx).await;
                let failure = match outcome {
                    Ok(Ok(DescriptorLine::Created(descriptor))) => {
                        tracing::info!(
                            pid = ?pid,
                            name = %descriptor.name,
                            port = descriptor.port,
                            "Per-user bridge created"
                        );
                        return Ok(LaunchedBridge {
                            port: descriptor.port,
                            descriptor: Some(descriptor),
                            process: Box::new(process),
                            events,
                        });
                    }
                    Ok(Ok(DescriptorLine::Failed { error })) => error,
                    Ok(Err(_)) => "bridge exited before reporting its descriptor".to_string(),
                    Err(_) => "Timeout waiting for bridge info".to_string(),
                };
                process.terminate();
                return Err(Error::Spawn(format!(
                    "Failed to create user bridge: {}",
                    failure
                )));
            }
        };

        Ok(LaunchedBridge {
            port,
            descriptor,
            process: Box::new(process),
            events,
        })
    }
}

/// Handle to a child owned by its supervise task
struct ChildProcess {
    pid: Option<u32>,
    kill_tx: Mutex<Option<oneshot::Sender<()>>>,
}

impl BridgeProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn terminate(&self) {
        let tx = self.kill_tx.lock().ok().and_then(|mut tx| tx.take());
        if let Some(tx) = tx {
            tracing::debug!(pid = ?self.pid, "Terminating bridge agent");
            let _ = tx.send(());
        }
    }
}

/// Wait for exit, forwarding a termination request if one arrives first.
/// Dropping the [`ChildProcess`] counts as a termination request.
async fn supervise(
    mut child: Child,
    pid: Option<u32>,
    kill_rx: oneshot::Receiver<()>,
    events: mpsc::UnboundedSender<ProcessEvent>,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = kill_rx => None,
    };

    let status = match exited {
        Some(status) => status,
        None => {
            let delivered = pid.map(cleanup::send_terminate).unwrap_or(false);
            if !delivered {
                let _ = child.start_kill();
            }
            child.wait().await
        }
    };

    if let Some(pid) = pid {
        cleanup::untrack(pid);
    }

    let code = match status {
        Ok(status) => status.code(),
        Err(e) => {
            tracing::warn!(pid = ?pid, "Failed to wait for bridge agent: {}", e);
            None
        }
    };
    tracing::info!(pid = ?pid, exit_code = ?code, "Bridge agent exited");
    let _ = events.send(ProcessEvent::Exited(code));
}

/// Forward process output to tracing, watching for readiness markers and
/// (on the side channel) the first parseable descriptor line
async fn scan_output<R>(
    stream: R,
    source: &'static str,
    pid: Option<u32>,
    markers: Arc<Vec<String>>,
    ready_seen: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ProcessEvent>,
    mut descriptor: Option<oneshot::Sender<DescriptorLine>>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(pid = ?pid, stream = source, "Bridge output closed: {}", e);
                break;
            }
        };

        let trimmed = line.trim();
        if descriptor.is_some() && trimmed.starts_with('{') {
            if let Ok(parsed) = serde_json::from_str::<DescriptorLine>(trimmed) {
                if let Some(tx) = descriptor.take() {
                    let _ = tx.send(parsed);
                }
                continue;
            }
        }

        if !ready_seen.load(Ordering::Acquire)
            && markers.iter().any(|m| line.contains(m.as_str()))
            && !ready_seen.swap(true, Ordering::AcqRel)
        {
            tracing::debug!(pid = ?pid, "Bridge agent reported readiness");
            let _ = events.send(ProcessEvent::Ready);
        }

        tracing::trace!(pid = ?pid, stream = source, "{}", line);
    }
}

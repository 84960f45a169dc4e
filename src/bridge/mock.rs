//! In-process launcher double for tests

use super::launcher::{BridgeLauncher, BridgeProcess, LaunchSpec, LaunchedBridge, ProcessEvent};
use super::types::BridgeDescriptor;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub struct MockProcess {
    pid: Option<u32>,
    terminations: Arc<AtomicUsize>,
}

impl MockProcess {
    pub fn new(pid: Option<u32>, terminations: Arc<AtomicUsize>) -> Self {
        Self { pid, terminations }
    }
}

impl BridgeProcess for MockProcess {
    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn terminate(&self) {
        self.terminations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts launches and termination signals; never starts a process
pub struct MockLauncher {
    port: u16,
    launch_delay: Duration,
    failure: Option<String>,
    /// Queue an exit before `launch` returns
    crash_on_launch: AtomicBool,
    launches: AtomicUsize,
    terminations: Arc<AtomicUsize>,
    specs: Mutex<Vec<LaunchSpec>>,
    senders: Mutex<Vec<mpsc::UnboundedSender<ProcessEvent>>>,
}

impl MockLauncher {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            launch_delay: Duration::from_millis(10),
            failure: None,
            crash_on_launch: AtomicBool::new(false),
            launches: AtomicUsize::new(0),
            terminations: Arc::new(AtomicUsize::new(0)),
            specs: Mutex::new(Vec::new()),
            senders: Mutex::new(Vec::new()),
        }
    }

    /// Every launch fails with a discovery error
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::new(0)
        }
    }

    /// Every launch exits immediately, as a bridge that fails to bind would
    pub fn crashing(port: u16) -> Self {
        let launcher = Self::new(port);
        launcher.set_crash_on_launch(true);
        launcher
    }

    pub fn set_crash_on_launch(&self, crash: bool) {
        self.crash_on_launch.store(crash, Ordering::SeqCst);
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn terminations(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn specs(&self) -> Vec<LaunchSpec> {
        self.specs.lock().unwrap().clone()
    }

    /// Deliver an event to the most recently launched process
    pub fn emit(&self, event: ProcessEvent) {
        if let Some(tx) = self.senders.lock().unwrap().last() {
            let _ = tx.send(event);
        }
    }
}

#[async_trait]
impl BridgeLauncher for MockLauncher {
    async fn launch(&self, spec: &LaunchSpec) -> Result<LaunchedBridge> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.specs.lock().unwrap().push(spec.clone());
        // Leave room for concurrent registrations to interleave
        tokio::time::sleep(self.launch_delay).await;

        if let Some(ref message) = self.failure {
            return Err(Error::NotFound(message.clone()));
        }

        let (port, descriptor) = match spec {
            LaunchSpec::Shared { .. } => (self.port, None),
            LaunchSpec::PerUser { seed, port, .. } => {
                let port = port.unwrap_or(self.port);
                let descriptor = BridgeDescriptor {
                    name: format!("bridge-{}", seed),
                    address: format!("agent1q{}", seed),
                    port,
                    seed: seed.clone(),
                };
                (port, Some(descriptor))
            }
        };

        let (tx, events) = mpsc::unbounded_channel();
        if self.crash_on_launch.load(Ordering::SeqCst) {
            let _ = tx.send(ProcessEvent::Exited(Some(1)));
        }
        self.senders.lock().unwrap().push(tx);
        let pid = 10_000 + self.launches() as u32;

        Ok(LaunchedBridge {
            port,
            descriptor,
            process: Box::new(MockProcess::new(Some(pid), self.terminations.clone())),
            events,
        })
    }
}

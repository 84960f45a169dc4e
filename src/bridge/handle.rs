//! Handle to one running bridge process

use super::launcher::BridgeProcess;
use super::types::{BridgeDescriptor, BridgeKey, BridgeState};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;

/// One running bridge process and its readiness state
///
/// State only moves forward: `Starting -> Ready -> Stopped`, or
/// `Starting -> Stopped`. A stopped handle is never revived; a respawn
/// produces a new handle.
pub struct BridgeHandle {
    key: BridgeKey,
    port: u16,
    base_url: String,
    descriptor: Option<BridgeDescriptor>,
    process: Box<dyn BridgeProcess>,
    state: watch::Sender<BridgeState>,
    terminated: AtomicBool,
    created_at: i64,
}

impl BridgeHandle {
    pub fn new(
        key: BridgeKey,
        port: u16,
        descriptor: Option<BridgeDescriptor>,
        process: Box<dyn BridgeProcess>,
    ) -> Self {
        let (state, _) = watch::channel(BridgeState::Starting);
        Self {
            key,
            port,
            base_url: format!("http://127.0.0.1:{}", port),
            descriptor,
            process,
            state,
            terminated: AtomicBool::new(false),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn key(&self) -> &BridgeKey {
        &self.key
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn descriptor(&self) -> Option<&BridgeDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn state(&self) -> BridgeState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == BridgeState::Ready
    }

    pub fn is_stopped(&self) -> bool {
        self.state() == BridgeState::Stopped
    }

    /// Returns true if the state changed
    pub fn mark_ready(&self) -> bool {
        self.transition(BridgeState::Ready)
    }

    /// Returns true if the state changed
    pub fn mark_stopped(&self) -> bool {
        self.transition(BridgeState::Stopped)
    }

    /// Signal the process to terminate, at most once per handle
    ///
    /// Does not wait for the process to exit. Returns false if a
    /// termination signal was already sent.
    pub fn terminate(&self) -> bool {
        if self.terminated.swap(true, Ordering::AcqRel) {
            return false;
        }
        tracing::info!(bridge = %self.key, pid = ?self.pid(), "Stopping bridge agent");
        self.process.terminate();
        self.mark_stopped();
        true
    }

    fn transition(&self, next: BridgeState) -> bool {
        let key = &self.key;
        self.state.send_if_modified(|current| {
            if current.can_transition_to(next) {
                tracing::debug!(bridge = %key, from = ?*current, to = ?next, "Bridge state change");
                *current = next;
                true
            } else {
                false
            }
        })
    }
}

impl std::fmt::Debug for BridgeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeHandle")
            .field("key", &self.key)
            .field("port", &self.port)
            .field("pid", &self.pid())
            .field("state", &self.state())
            .finish()
    }
}

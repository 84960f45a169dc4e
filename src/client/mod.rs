//! uAgent client: bridge readiness and correlated queries
//!
//! A client either shares the reference-counted bridge with every other
//! client using the same [`BridgeManager`], or, when configured with a user
//! seed and Agentverse token, gets a dedicated bridge keyed by that seed.

mod query;
pub mod types;

pub use query::NO_RESPONSE;
pub use types::{generate_request_id, QueryRequest, QueryResult};

use crate::bridge::probe::{probe, wait_until_ready};
use crate::bridge::{
    BridgeDescriptor, BridgeHandle, BridgeManager, BridgeMode, BridgeState, InstanceId,
};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug)]
struct ClientState {
    /// Whether this client may spawn its bridge
    auto_start: bool,
    registered: bool,
    bridge: Option<Arc<BridgeHandle>>,
    bridge_url: String,
    /// Why auto-start was disabled
    startup_error: Option<String>,
}

/// Client for querying uAgents through a local bridge agent
pub struct UAgentClient {
    instance_id: InstanceId,
    config: ClientConfig,
    mode: BridgeMode,
    manager: Arc<BridgeManager>,
    http: reqwest::Client,
    state: Mutex<ClientState>,
}

impl UAgentClient {
    /// Create a client on the process-wide [`BridgeManager`]
    ///
    /// The global manager uses the default [`crate::BridgeConfig`]. To change
    /// the interpreter, script location or shared port, call
    /// [`BridgeManager::init_global`] before the first client is created, or
    /// build a manager and use [`UAgentClient::with_manager`].
    pub async fn new(config: ClientConfig) -> Self {
        Self::with_manager(config, BridgeManager::global()).await
    }

    /// Create a client on an explicit manager
    ///
    /// In shared mode with auto-start enabled this registers with the
    /// manager right away, spawning the bridge if needed. It does not wait
    /// for readiness. A spawn failure is remembered and reported by the
    /// next query instead of failing construction.
    pub async fn with_manager(config: ClientConfig, manager: Arc<BridgeManager>) -> Self {
        let mode = match config.user_credentials() {
            Some((seed, token)) => BridgeMode::PerUser {
                seed: seed.to_string(),
                token: token.to_string(),
                port: Some(config.bridge_port),
            },
            None => BridgeMode::Shared,
        };

        let client = Self {
            instance_id: InstanceId::generate(),
            state: Mutex::new(ClientState {
                auto_start: config.auto_start_bridge,
                registered: false,
                bridge: None,
                bridge_url: config.resolved_bridge_url(),
                startup_error: None,
            }),
            http: manager.http().clone(),
            mode,
            config,
            manager,
        };

        tracing::debug!(
            instance_id = %client.instance_id,
            per_user = !client.mode.is_shared(),
            "Created uAgent client"
        );

        if client.mode.is_shared() && client.config.auto_start_bridge {
            let _ = client.register_bridge().await;
        }
        client
    }

    pub fn instance_id(&self) -> &InstanceId {
        &self.instance_id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn mode(&self) -> &BridgeMode {
        &self.mode
    }

    pub fn manager(&self) -> &Arc<BridgeManager> {
        &self.manager
    }

    /// Base URL queries are sent to
    pub fn bridge_url(&self) -> String {
        self.state().bridge_url.clone()
    }

    pub fn is_registered(&self) -> bool {
        self.state().registered
    }

    /// Descriptor of this client's per-user bridge, once created
    pub fn bridge_info(&self) -> Option<BridgeDescriptor> {
        self.state()
            .bridge
            .as_ref()
            .and_then(|bridge| bridge.descriptor().cloned())
    }

    /// State of the bridge this client registered with
    pub fn bridge_state(&self) -> Option<BridgeState> {
        self.state().bridge.as_ref().map(|bridge| bridge.state())
    }

    pub fn generate_request_id(&self) -> String {
        generate_request_id()
    }

    fn state(&self) -> MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    async fn register_bridge(&self) -> Result<Arc<BridgeHandle>> {
        match self.manager.register(&self.instance_id, &self.mode).await {
            Ok(handle) => {
                let mut state = self.state();
                state.registered = true;
                if !self.mode.is_shared() {
                    state.bridge_url = handle.base_url().to_string();
                }
                state.bridge = Some(handle.clone());
                Ok(handle)
            }
            Err(e) => {
                tracing::warn!(
                    instance_id = %self.instance_id,
                    "Bridge auto-start disabled: {}",
                    e
                );
                let mut state = self.state();
                state.auto_start = false;
                state.startup_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Make sure a bridge is accepting queries
    async fn ensure_ready(&self) -> Result<()> {
        let (auto_start, bridge, startup_error) = {
            let state = self.state();
            (
                state.auto_start,
                state.bridge.clone(),
                state.startup_error.clone(),
            )
        };

        if !auto_start {
            // Bridge is managed externally; only fail if it is missing and
            // an earlier start attempt explains why
            if let Some(message) = startup_error {
                if !self.ping().await {
                    return Err(Error::Unavailable(message));
                }
            }
            return Ok(());
        }

        let bridge = match bridge {
            Some(bridge) if !bridge.is_stopped() => bridge,
            _ => self.register_bridge().await?,
        };

        if self.await_bridge(&bridge, self.config.ready_timeout()).await {
            Ok(())
        } else {
            Err(Error::StartupTimeout)
        }
    }

    /// Wait for `bridge` to serve this client's URL
    ///
    /// Shared clients may point `bridge_url` somewhere other than the port
    /// the shared bridge was started on, so only an answer on that URL
    /// counts. A per-user client's URL is its bridge's own address.
    async fn await_bridge(&self, bridge: &BridgeHandle, max_wait: Duration) -> bool {
        if self.mode.is_shared() {
            let url = self.bridge_url();
            if url != bridge.base_url() {
                tracing::debug!(
                    instance_id = %self.instance_id,
                    bridge_url = %url,
                    bridge_port = bridge.port(),
                    "Client URL differs from the shared bridge address"
                );
            }
            return self.manager.await_ready_at(bridge, &url, max_wait).await;
        }

        if bridge.is_ready() || self.ping().await {
            bridge.mark_ready();
            return true;
        }
        self.manager.await_ready(bridge, max_wait).await
    }

    /// Whether the bridge answers at all; never fails
    pub async fn ping(&self) -> bool {
        let url = self.bridge_url();
        probe(&self.http, &url, self.manager.config().probe_timeout()).await
    }

    /// Wait up to `max_wait` for the bridge to become ready
    pub async fn wait_for_bridge(&self, max_wait: Duration) -> bool {
        let (bridge, url) = {
            let state = self.state();
            (state.bridge.clone(), state.bridge_url.clone())
        };

        match bridge {
            Some(bridge) if !bridge.is_stopped() => self.await_bridge(&bridge, max_wait).await,
            _ => wait_until_ready(&self.http, &url, None, self.manager.config(), max_wait).await,
        }
    }

    /// Give up this client's claim on its bridge
    ///
    /// The shared bridge stops when its last client lets go; a per-user
    /// bridge stops immediately. Safe to call repeatedly or when never
    /// registered. A later query registers again.
    pub fn stop_bridge(&self) {
        let registered = {
            let mut state = self.state();
            state.bridge = None;
            std::mem::replace(&mut state.registered, false)
        };
        if registered {
            tracing::debug!(instance_id = %self.instance_id, "Releasing bridge");
            self.manager.release(&self.instance_id, &self.mode);
        }
    }
}

impl Drop for UAgentClient {
    /// Shared references are released on drop; per-user bridges outlive
    /// the client that created them
    fn drop(&mut self) {
        if self.mode.is_shared() {
            self.stop_bridge();
        }
    }
}

impl std::fmt::Debug for UAgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UAgentClient")
            .field("instance_id", &self.instance_id)
            .field("mode", &self.mode.key())
            .field("bridge_url", &self.bridge_url())
            .finish()
    }
}

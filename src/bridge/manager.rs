//! Bridge registry and lifecycle supervision
//!
//! The shared bridge is reference counted by the set of registered client
//! instances. Per-user bridges are keyed by the hash of their seed and
//! are not reference counted; releasing one stops it.
//!
//! When a bridge exits on its own, its handle leaves the registry but the
//! shared holders keep their references: `shared_refs()` still counts them,
//! and the next `register` from any holder spawns a replacement. Holders
//! only go away through `release` or `shutdown`.

use super::handle::BridgeHandle;
use super::launcher::{BridgeLauncher, LaunchSpec, LaunchedBridge, ProcessEvent, ProcessLauncher};
use super::probe::{local_http_client, probe, wait_until_answering, wait_until_ready};
use super::types::{BridgeKey, BridgeMode, InstanceId};
use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, OnceCell};

/// Spawn-once slot for one bridge key
type Slot = Arc<OnceCell<Arc<BridgeHandle>>>;

static GLOBAL: OnceLock<Arc<BridgeManager>> = OnceLock::new();

#[derive(Default)]
struct Registry {
    slots: HashMap<BridgeKey, Slot>,
    shared_holders: HashSet<InstanceId>,
}

impl Registry {
    fn is_current(&self, key: &BridgeKey, slot: &Slot) -> bool {
        self.slots
            .get(key)
            .map(|current| Arc::ptr_eq(current, slot))
            .unwrap_or(false)
    }

    /// Remove the slot for `handle`'s key if it still holds that handle
    fn detach(&mut self, handle: &Arc<BridgeHandle>) -> bool {
        let holds_handle = self
            .slots
            .get(handle.key())
            .and_then(|slot| slot.get())
            .map(|current| Arc::ptr_eq(current, handle))
            .unwrap_or(false);
        if holds_handle {
            self.slots.remove(handle.key());
        }
        holds_handle
    }
}

/// Owns every bridge process started on behalf of client instances
///
/// Spawning is idempotent under concurrent registration: each key has a
/// single spawn-once slot, so racing registrants share one launch.
pub struct BridgeManager {
    config: BridgeConfig,
    launcher: Arc<dyn BridgeLauncher>,
    http: reqwest::Client,
    registry: Arc<Mutex<Registry>>,
}

impl BridgeManager {
    /// Manager that launches real bridge processes
    pub fn new(config: BridgeConfig) -> Self {
        let launcher = Arc::new(ProcessLauncher::new(config.clone()));
        Self::with_launcher(config, launcher)
    }

    pub fn with_launcher(config: BridgeConfig, launcher: Arc<dyn BridgeLauncher>) -> Self {
        Self {
            config,
            launcher,
            http: local_http_client(),
            registry: Arc::new(Mutex::new(Registry::default())),
        }
    }

    /// Process-wide manager used by [`crate::UAgentClient::new`]
    ///
    /// Built from `BridgeConfig::default()` unless [`BridgeManager::init_global`]
    /// ran first. Hosts that need several configurations should build their
    /// own managers and use [`crate::UAgentClient::with_manager`].
    pub fn global() -> Arc<BridgeManager> {
        GLOBAL
            .get_or_init(|| Arc::new(BridgeManager::new(BridgeConfig::default())))
            .clone()
    }

    /// Configure the process-wide manager
    ///
    /// Returns false, leaving the existing manager in place, if the global
    /// manager was already created.
    pub fn init_global(config: BridgeConfig) -> bool {
        let installed = GLOBAL.set(Arc::new(BridgeManager::new(config))).is_ok();
        if !installed {
            tracing::warn!("Global bridge manager already initialized, keeping it");
        }
        installed
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register `instance` and return the bridge it should use
    ///
    /// Spawns the bridge if none exists for the mode's key. Returns once a
    /// handle exists; the bridge may still be starting.
    ///
    /// A stopped handle left behind by an earlier spawn is replaced once.
    /// A bridge this call spawned that stops before registration completes
    /// is a spawn failure.
    pub async fn register(
        &self,
        instance: &InstanceId,
        mode: &BridgeMode,
    ) -> Result<Arc<BridgeHandle>> {
        let key = mode.key();
        let mut replaced_stale = false;

        loop {
            let slot = {
                let mut registry = self.lock();
                if mode.is_shared() && registry.shared_holders.insert(instance.clone()) {
                    tracing::debug!(
                        instance_id = %instance,
                        refs = registry.shared_holders.len(),
                        "Registered shared bridge reference"
                    );
                }
                registry.slots.entry(key.clone()).or_default().clone()
            };

            let mut spawned = false;
            let init = slot
                .get_or_try_init(|| {
                    spawned = true;
                    self.spawn(&key, mode)
                })
                .await
                .map(Arc::clone);
            let handle = match init {
                Ok(handle) => handle,
                Err(e) => {
                    self.abandon(instance, mode, &key, &slot);
                    tracing::warn!(bridge = %key, instance_id = %instance, "Bridge start failed: {}", e);
                    return Err(e);
                }
            };

            let orphaned = {
                let mut registry = self.lock();
                if handle.is_stopped() {
                    registry.detach(&handle);
                    drop(registry);
                    if spawned || replaced_stale {
                        self.abandon(instance, mode, &key, &slot);
                        tracing::warn!(bridge = %key, instance_id = %instance, "Bridge exited during startup");
                        return Err(Error::Spawn("bridge exited during startup".to_string()));
                    }
                    // Left over from an earlier spawn; replace it once
                    replaced_stale = true;
                    continue;
                }
                !registry.is_current(&key, &slot)
            };

            if orphaned {
                // Released by every holder while the spawn was in flight
                tracing::debug!(bridge = %key, "Bridge spawned after release, stopping it");
                handle.terminate();
            }
            return Ok(handle);
        }
    }

    /// Undo a failed registration: drop the shared claim and an empty slot
    fn abandon(&self, instance: &InstanceId, mode: &BridgeMode, key: &BridgeKey, slot: &Slot) {
        let mut registry = self.lock();
        if mode.is_shared() {
            registry.shared_holders.remove(instance);
        }
        if registry.is_current(key, slot) && !slot.initialized() {
            registry.slots.remove(key);
        }
    }

    async fn spawn(&self, key: &BridgeKey, mode: &BridgeMode) -> Result<Arc<BridgeHandle>> {
        let spec = match mode {
            BridgeMode::Shared => LaunchSpec::Shared {
                port: self.config.shared_port,
            },
            BridgeMode::PerUser { seed, token, port } => LaunchSpec::PerUser {
                seed: seed.clone(),
                token: token.clone(),
                port: *port,
            },
        };

        tracing::info!(bridge = %key, "Starting bridge agent");
        let LaunchedBridge {
            port,
            descriptor,
            process,
            mut events,
        } = self.launcher.launch(&spec).await?;

        let handle = Arc::new(BridgeHandle::new(key.clone(), port, descriptor, process));

        // Events that arrived while launching
        while let Ok(event) = events.try_recv() {
            match event {
                ProcessEvent::Ready => {
                    handle.mark_ready();
                }
                ProcessEvent::Exited(code) => {
                    handle.mark_stopped();
                    return Err(Error::Spawn(format!(
                        "bridge exited during startup (exit code {:?})",
                        code
                    )));
                }
            }
        }

        self.spawn_event_monitor(handle.clone(), events);
        Ok(handle)
    }

    /// Drive the handle's state from process events and reconcile the
    /// registry when the process exits
    fn spawn_event_monitor(
        &self,
        handle: Arc<BridgeHandle>,
        mut events: mpsc::UnboundedReceiver<ProcessEvent>,
    ) {
        let registry = Arc::clone(&self.registry);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    ProcessEvent::Ready => {
                        handle.mark_ready();
                    }
                    ProcessEvent::Exited(code) => {
                        let requested = handle.is_stopped();
                        registry
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .detach(&handle);
                        handle.mark_stopped();
                        if !requested {
                            tracing::warn!(
                                bridge = %handle.key(),
                                exit_code = ?code,
                                "Bridge agent exited unexpectedly"
                            );
                        }
                        break;
                    }
                }
            }
        });
    }

    /// Drop `instance`'s claim on its bridge
    ///
    /// Shared: the bridge stops when the last holder releases; releasing an
    /// instance that holds no reference does nothing. Per-user: the bridge
    /// stops immediately.
    pub fn release(&self, instance: &InstanceId, mode: &BridgeMode) {
        let key = mode.key();
        let handle = {
            let mut registry = self.lock();
            if mode.is_shared() {
                if !registry.shared_holders.remove(instance) {
                    return;
                }
                if !registry.shared_holders.is_empty() {
                    tracing::debug!(
                        instance_id = %instance,
                        refs = registry.shared_holders.len(),
                        "Released shared bridge reference"
                    );
                    return;
                }
            }
            registry.slots.remove(&key).and_then(|slot| slot.get().cloned())
        };

        if let Some(handle) = handle {
            handle.terminate();
        }
    }

    /// Stop one bridge without waiting for it to exit
    pub fn terminate(&self, handle: &Arc<BridgeHandle>) {
        self.lock().detach(handle);
        handle.terminate();
    }

    /// Single liveness check against the bridge
    pub async fn probe(&self, handle: &BridgeHandle) -> bool {
        probe(&self.http, handle.base_url(), self.config.probe_timeout()).await
    }

    /// Wait until `url` answers on behalf of `handle`, up to `max_wait`
    ///
    /// Unlike [`BridgeManager::await_ready`], a readiness marker alone is not
    /// enough: the bridge may be listening somewhere other than `url`. The
    /// wait still ends early when the process stops.
    pub async fn await_ready_at(&self, handle: &BridgeHandle, url: &str, max_wait: Duration) -> bool {
        let ready = wait_until_answering(
            &self.http,
            url,
            Some(handle.subscribe()),
            &self.config,
            max_wait,
        )
        .await;
        if ready {
            handle.mark_ready();
        } else {
            tracing::debug!(bridge = %handle.key(), url = %url, state = ?handle.state(), "Bridge not answering");
        }
        ready
    }

    /// Wait for the bridge to become ready, up to `max_wait`
    pub async fn await_ready(&self, handle: &BridgeHandle, max_wait: Duration) -> bool {
        let ready = wait_until_ready(
            &self.http,
            handle.base_url(),
            Some(handle.subscribe()),
            &self.config,
            max_wait,
        )
        .await;
        if ready {
            handle.mark_ready();
        } else {
            tracing::debug!(bridge = %handle.key(), state = ?handle.state(), "Bridge not ready");
        }
        ready
    }

    pub fn lookup(&self, key: &BridgeKey) -> Option<Arc<BridgeHandle>> {
        self.lock()
            .slots
            .get(key)
            .and_then(|slot| slot.get().cloned())
    }

    /// Handles currently registered (starting or ready)
    pub fn active_bridges(&self) -> Vec<Arc<BridgeHandle>> {
        self.lock()
            .slots
            .values()
            .filter_map(|slot| slot.get().cloned())
            .collect()
    }

    /// Number of instances holding the shared bridge
    pub fn shared_refs(&self) -> usize {
        self.lock().shared_holders.len()
    }

    /// Stop every owned bridge and forget all registrations
    pub fn shutdown(&self) {
        let handles: Vec<Arc<BridgeHandle>> = {
            let mut registry = self.lock();
            registry.shared_holders.clear();
            registry
                .slots
                .drain()
                .filter_map(|(_, slot)| slot.get().cloned())
                .collect()
        };

        tracing::info!(bridges = handles.len(), "Shutting down bridge manager");
        for handle in handles {
            handle.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::mock::MockLauncher;
    use crate::bridge::types::{bridge_id, BridgeState};
    use crate::error::Error;
    use futures::future::join_all;

    fn fast_config() -> BridgeConfig {
        BridgeConfig {
            poll_interval_ms: 50,
            probe_timeout_ms: 200,
            ..Default::default()
        }
    }

    fn manager(launcher: Arc<MockLauncher>) -> BridgeManager {
        BridgeManager::with_launcher(fast_config(), launcher)
    }

    fn per_user(seed: &str) -> BridgeMode {
        BridgeMode::PerUser {
            seed: seed.to_string(),
            token: "token".to_string(),
            port: None,
        }
    }

    async fn closed_port() -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    async fn eventually(check: impl Fn() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_shared_refcount_single_spawn_single_terminate() {
        for n in [1usize, 2, 5, 16] {
            let launcher = Arc::new(MockLauncher::new(8000));
            let manager = manager(launcher.clone());
            let instances: Vec<InstanceId> = (0..n).map(|_| InstanceId::generate()).collect();

            let shared = BridgeMode::Shared;
            let handles = join_all(instances.iter().map(|id| manager.register(id, &shared))).await;
            let first = handles[0].as_ref().unwrap().clone();
            for handle in &handles {
                assert!(Arc::ptr_eq(handle.as_ref().unwrap(), &first));
            }
            assert_eq!(launcher.launches(), 1, "n = {}", n);
            assert_eq!(manager.shared_refs(), n);

            for id in &instances {
                manager.release(id, &BridgeMode::Shared);
            }
            assert_eq!(launcher.terminations(), 1, "n = {}", n);
            assert_eq!(manager.shared_refs(), 0);
            assert!(manager.lookup(&BridgeKey::Shared).is_none());
            assert_eq!(first.state(), BridgeState::Stopped);
        }
    }

    #[tokio::test]
    async fn test_shared_bridge_outlives_early_release() {
        let launcher = Arc::new(MockLauncher::new(8000));
        let manager = manager(launcher.clone());
        let a = InstanceId::from("a");
        let b = InstanceId::from("b");

        manager.register(&a, &BridgeMode::Shared).await.unwrap();
        manager.register(&b, &BridgeMode::Shared).await.unwrap();
        manager.release(&a, &BridgeMode::Shared);
        assert_eq!(launcher.terminations(), 0);
        assert!(manager.lookup(&BridgeKey::Shared).is_some());

        manager.release(&b, &BridgeMode::Shared);
        assert_eq!(launcher.terminations(), 1);
    }

    #[tokio::test]
    async fn test_double_release_is_noop() {
        let launcher = Arc::new(MockLauncher::new(8000));
        let manager = manager(launcher.clone());
        let a = InstanceId::from("a");
        let b = InstanceId::from("b");

        manager.register(&a, &BridgeMode::Shared).await.unwrap();
        manager.register(&b, &BridgeMode::Shared).await.unwrap();
        manager.release(&a, &BridgeMode::Shared);
        manager.release(&a, &BridgeMode::Shared);
        assert_eq!(launcher.terminations(), 0);
        assert_eq!(manager.shared_refs(), 1);
    }

    #[tokio::test]
    async fn test_release_unregistered_is_noop() {
        let launcher = Arc::new(MockLauncher::new(8000));
        let manager = manager(launcher.clone());
        manager.release(&InstanceId::from("ghost"), &BridgeMode::Shared);
        manager.release(&InstanceId::from("ghost"), &per_user("nobody"));
        assert_eq!(launcher.launches(), 0);
        assert_eq!(launcher.terminations(), 0);
    }

    #[tokio::test]
    async fn test_register_same_instance_twice_counts_once() {
        let launcher = Arc::new(MockLauncher::new(8000));
        let manager = manager(launcher.clone());
        let a = InstanceId::from("a");

        manager.register(&a, &BridgeMode::Shared).await.unwrap();
        manager.register(&a, &BridgeMode::Shared).await.unwrap();
        assert_eq!(manager.shared_refs(), 1);
        manager.release(&a, &BridgeMode::Shared);
        assert_eq!(launcher.terminations(), 1);
    }

    #[tokio::test]
    async fn test_per_user_keyed_by_seed() {
        let launcher = Arc::new(MockLauncher::new(8100));
        let manager = manager(launcher.clone());

        let first = manager
            .register(&InstanceId::from("a"), &per_user("alice"))
            .await
            .unwrap();
        let again = manager
            .register(&InstanceId::from("b"), &per_user("alice"))
            .await
            .unwrap();
        let other = manager
            .register(&InstanceId::from("c"), &per_user("bob"))
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(launcher.launches(), 2);
        assert_eq!(first.key(), &BridgeKey::User(bridge_id("alice")));
        assert_eq!(first.descriptor().unwrap().seed, "alice");
        assert_eq!(manager.active_bridges().len(), 2);
        // Per-user bridges are not reference counted
        assert_eq!(manager.shared_refs(), 0);
    }

    #[tokio::test]
    async fn test_per_user_release_stops_bridge() {
        let launcher = Arc::new(MockLauncher::new(8100));
        let manager = manager(launcher.clone());
        let a = InstanceId::from("a");

        let handle = manager.register(&a, &per_user("alice")).await.unwrap();
        manager.release(&a, &per_user("alice"));
        assert_eq!(launcher.terminations(), 1);
        assert!(handle.is_stopped());
        assert!(manager
            .lookup(&BridgeKey::User(bridge_id("alice")))
            .is_none());

        manager.release(&a, &per_user("alice"));
        assert_eq!(launcher.terminations(), 1);
    }

    #[tokio::test]
    async fn test_per_user_port_passed_through() {
        let launcher = Arc::new(MockLauncher::new(8100));
        let manager = manager(launcher.clone());
        let mode = BridgeMode::PerUser {
            seed: "alice".to_string(),
            token: "token".to_string(),
            port: Some(8555),
        };

        let handle = manager.register(&InstanceId::from("a"), &mode).await.unwrap();
        assert_eq!(handle.port(), 8555);
        assert_eq!(
            launcher.specs(),
            vec![LaunchSpec::PerUser {
                seed: "alice".to_string(),
                token: "token".to_string(),
                port: Some(8555),
            }]
        );
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces_and_releases_claim() {
        let launcher = Arc::new(MockLauncher::failing("bridge_agent.py"));
        let manager = manager(launcher.clone());
        let a = InstanceId::from("a");

        let err = manager.register(&a, &BridgeMode::Shared).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(manager.shared_refs(), 0);
        assert!(manager.active_bridges().is_empty());

        // A later registration tries again
        let _ = manager.register(&a, &BridgeMode::Shared).await;
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test]
    async fn test_ready_event_marks_handle_ready() {
        let launcher = Arc::new(MockLauncher::new(closed_port().await));
        let manager = manager(launcher.clone());

        let handle = manager
            .register(&InstanceId::from("a"), &BridgeMode::Shared)
            .await
            .unwrap();
        assert_eq!(handle.state(), BridgeState::Starting);

        launcher.emit(ProcessEvent::Ready);
        assert!(manager.await_ready(&handle, Duration::from_secs(2)).await);
        assert!(handle.is_ready());
    }

    #[tokio::test]
    async fn test_await_ready_times_out() {
        let launcher = Arc::new(MockLauncher::new(closed_port().await));
        let manager = manager(launcher.clone());

        let handle = manager
            .register(&InstanceId::from("a"), &BridgeMode::Shared)
            .await
            .unwrap();
        let started = std::time::Instant::now();
        assert!(!manager.await_ready(&handle, Duration::from_millis(300)).await);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!manager.probe(&handle).await);
    }

    #[tokio::test]
    async fn test_unexpected_exit_reconciles_registry() {
        let launcher = Arc::new(MockLauncher::new(8000));
        let manager = manager(launcher.clone());
        let a = InstanceId::from("a");

        let handle = manager.register(&a, &BridgeMode::Shared).await.unwrap();
        launcher.emit(ProcessEvent::Ready);
        assert!(eventually(|| handle.is_ready()).await);

        launcher.emit(ProcessEvent::Exited(Some(1)));
        assert!(eventually(|| handle.is_stopped()).await);
        assert!(eventually(|| manager.lookup(&BridgeKey::Shared).is_none()).await);
        // The holder keeps its claim and the next registration respawns
        assert_eq!(manager.shared_refs(), 1);

        let fresh = manager.register(&a, &BridgeMode::Shared).await.unwrap();
        assert!(!Arc::ptr_eq(&fresh, &handle));
        assert_eq!(fresh.state(), BridgeState::Starting);
        assert_eq!(launcher.launches(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bridge_exiting_on_launch_is_not_respawned() {
        let launcher = Arc::new(MockLauncher::crashing(8000));
        let manager = manager(launcher.clone());
        let a = InstanceId::from("a");

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            manager.register(&a, &BridgeMode::Shared),
        )
        .await
        .expect("register must not loop on a crashing bridge");
        let err = outcome.unwrap_err();
        assert!(matches!(err, Error::Spawn(_)));
        assert!(err.to_string().contains("exited during startup"));
        assert_eq!(launcher.launches(), 1);
        assert_eq!(manager.shared_refs(), 0);
        assert!(manager.active_bridges().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_per_user_bridge_exiting_on_launch_fails() {
        let launcher = Arc::new(MockLauncher::crashing(8100));
        let manager = manager(launcher.clone());

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            manager.register(&InstanceId::from("a"), &per_user("alice")),
        )
        .await
        .expect("register must not loop on a crashing bridge");
        assert!(matches!(outcome, Err(Error::Spawn(_))));
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_stale_stopped_handle_replaced_once() {
        let launcher = Arc::new(MockLauncher::new(8000));
        let manager = manager(launcher.clone());

        let first = manager
            .register(&InstanceId::from("a"), &BridgeMode::Shared)
            .await
            .unwrap();
        // Stopped but still registered, as before the exit event is handled
        first.terminate();
        assert!(manager.lookup(&BridgeKey::Shared).is_some());

        let fresh = manager
            .register(&InstanceId::from("b"), &BridgeMode::Shared)
            .await
            .unwrap();
        assert!(!Arc::ptr_eq(&first, &fresh));
        assert!(!fresh.is_stopped());
        assert_eq!(launcher.launches(), 2);
        assert_eq!(manager.shared_refs(), 2);
    }

    #[tokio::test]
    async fn test_replacement_that_exits_is_an_error() {
        let launcher = Arc::new(MockLauncher::new(8000));
        let manager = manager(launcher.clone());

        let first = manager
            .register(&InstanceId::from("a"), &BridgeMode::Shared)
            .await
            .unwrap();
        first.terminate();
        launcher.set_crash_on_launch(true);

        let err = manager
            .register(&InstanceId::from("b"), &BridgeMode::Shared)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Spawn(_)));
        assert_eq!(launcher.launches(), 2);
        // "a" keeps its claim; "b" never got one
        assert_eq!(manager.shared_refs(), 1);
    }

    #[tokio::test]
    async fn test_init_global_only_once() {
        let config = BridgeConfig {
            interpreter: "python3".to_string(),
            ..Default::default()
        };
        let installed = BridgeManager::init_global(config);
        if installed {
            assert_eq!(BridgeManager::global().config().interpreter, "python3");
        }
        assert!(!BridgeManager::init_global(BridgeConfig::default()));
        assert!(Arc::ptr_eq(&BridgeManager::global(), &BridgeManager::global()));
    }

    #[tokio::test]
    async fn test_shutdown_terminates_everything() {
        let launcher = Arc::new(MockLauncher::new(8000));
        let manager = manager(launcher.clone());

        manager
            .register(&InstanceId::from("a"), &BridgeMode::Shared)
            .await
            .unwrap();
        manager
            .register(&InstanceId::from("b"), &per_user("alice"))
            .await
            .unwrap();

        manager.shutdown();
        assert_eq!(launcher.terminations(), 2);
        assert!(manager.active_bridges().is_empty());
        assert_eq!(manager.shared_refs(), 0);

        manager.shutdown();
        assert_eq!(launcher.terminations(), 2);
    }

    #[tokio::test]
    async fn test_terminate_detaches_handle() {
        let launcher = Arc::new(MockLauncher::new(8000));
        let manager = manager(launcher.clone());

        let handle = manager
            .register(&InstanceId::from("a"), &per_user("alice"))
            .await
            .unwrap();
        manager.terminate(&handle);
        manager.terminate(&handle);
        assert_eq!(launcher.terminations(), 1);
        assert!(manager.active_bridges().is_empty());
    }
}

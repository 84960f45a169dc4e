//! Bridge module: local bridge agent process supervision
//!
//! Locates the bridge script, spawns it, detects readiness, shares one
//! process between client instances and stops it when the last one lets go.
//!
//! ## Architecture
//!
//! ```text
//! UAgentClient ──register/release──► BridgeManager ──launch──► BridgeLauncher
//!      │                                  │                        │
//!      │ await_ready / probe              │ registry               │ ProcessEvent
//!      ▼                                  ▼                        ▼
//!  GET /  (probe)                     BridgeHandle ◄──Ready/Exited── child process
//! ```

pub mod cleanup;
pub mod handle;
pub mod launcher;
pub mod locator;
pub mod manager;
pub mod probe;
pub mod types;

#[cfg(test)]
pub(crate) mod mock;

pub use handle::BridgeHandle;
pub use launcher::{
    BridgeLauncher, BridgeProcess, LaunchSpec, LaunchedBridge, ProcessEvent, ProcessLauncher,
};
pub use locator::BridgeLocator;
pub use manager::BridgeManager;
pub use types::{bridge_id, BridgeDescriptor, BridgeKey, BridgeMode, BridgeState, InstanceId};

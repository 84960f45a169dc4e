//! Bridge identity and state types

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a per-user bridge id in hex characters
pub const BRIDGE_ID_LEN: usize = 16;

/// Lifecycle state of one bridge process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    /// Process spawned, not yet accepting queries
    Starting,
    /// Process is accepting queries
    Ready,
    /// Process terminated or exited
    Stopped,
}

impl BridgeState {
    /// Whether `next` is a legal transition from this state
    pub fn can_transition_to(self, next: BridgeState) -> bool {
        matches!(
            (self, next),
            (BridgeState::Starting, BridgeState::Ready)
                | (BridgeState::Starting, BridgeState::Stopped)
                | (BridgeState::Ready, BridgeState::Stopped)
        )
    }
}

/// Registry key of a bridge
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum BridgeKey {
    /// The reference-counted bridge shared by all clients
    Shared,
    /// A dedicated bridge, keyed by [`bridge_id`] of the user seed
    User(String),
}

impl BridgeKey {
    pub fn for_seed(seed: &str) -> Self {
        BridgeKey::User(bridge_id(seed))
    }
}

impl fmt::Display for BridgeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeKey::Shared => write!(f, "shared"),
            BridgeKey::User(id) => write!(f, "user-{}", id),
        }
    }
}

/// How a client obtains its bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeMode {
    Shared,
    PerUser {
        seed: String,
        token: String,
        port: Option<u16>,
    },
}

impl BridgeMode {
    pub fn key(&self) -> BridgeKey {
        match self {
            BridgeMode::Shared => BridgeKey::Shared,
            BridgeMode::PerUser { seed, .. } => BridgeKey::for_seed(seed),
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, BridgeMode::Shared)
    }
}

/// Opaque identity of one client instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceId(String);

impl InstanceId {
    /// Random 8-hex-character id
    pub fn generate() -> Self {
        Self(format!("{:08x}", rand::random::<u32>()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for InstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity reported by a per-user bridge once it is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeDescriptor {
    pub name: String,
    #[serde(default)]
    pub address: String,
    pub port: u16,
    pub seed: String,
}

/// One line of the per-user creation side channel
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum DescriptorLine {
    Failed { error: String },
    Created(BridgeDescriptor),
}

/// Deterministic bridge id: SHA-256 of the seed, first 16 hex characters
pub fn bridge_id(seed: &str) -> String {
    let digest = Sha256::digest(seed.as_bytes());
    digest
        .iter()
        .take(BRIDGE_ID_LEN / 2)
        .map(|b| format!("{:02x}", b))
        .collect()
}

//! uAgent client configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration, as loaded from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UAgentConfig {
    /// Client configuration
    pub client: ClientConfig,

    /// Bridge supervision configuration
    pub bridge: BridgeConfig,
}

impl UAgentConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the client unusable
    pub fn validate(&self) -> Result<()> {
        if self.client.timeout_ms == 0 {
            return Err(Error::Config("client.timeout_ms must be positive".to_string()));
        }
        if self.bridge.poll_interval_ms == 0 {
            return Err(Error::Config(
                "bridge.poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.bridge.interpreter.trim().is_empty() {
            return Err(Error::Config("bridge.interpreter is empty".to_string()));
        }
        Ok(())
    }
}

/// Per-client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Bridge base URL (defaults to `http://localhost:{bridge_port}`)
    pub bridge_url: Option<String>,

    /// Request timeout in milliseconds
    pub timeout_ms: u64,

    /// Spawn the shared bridge automatically
    pub auto_start_bridge: bool,

    /// Port for the bridge agent
    pub bridge_port: u16,

    /// Seed for a dedicated per-user bridge
    pub user_seed: Option<String>,

    /// Bearer token for Agentverse registration of a per-user bridge
    pub agentverse_token: Option<String>,

    /// Ceiling for the readiness wait in milliseconds
    pub ready_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bridge_url: None,
            timeout_ms: 35_000,
            auto_start_bridge: true,
            bridge_port: 8000,
            user_seed: None,
            agentverse_token: None,
            ready_timeout_ms: 20_000,
        }
    }
}

impl ClientConfig {
    /// Effective bridge base URL, without a trailing slash
    pub fn resolved_bridge_url(&self) -> String {
        match &self.bridge_url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://localhost:{}", self.bridge_port),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Seed and token, when both are present and non-empty
    pub fn user_credentials(&self) -> Option<(&str, &str)> {
        match (self.user_seed.as_deref(), self.agentverse_token.as_deref()) {
            (Some(seed), Some(token)) if !seed.is_empty() && !token.is_empty() => {
                Some((seed, token))
            }
            _ => None,
        }
    }
}

/// Bridge process supervision configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Interpreter used to run the bridge script
    pub interpreter: String,

    /// File name of the bridge script
    pub script_name: String,

    /// Explicit script location, checked before every other candidate
    pub script_path: Option<PathBuf>,

    /// Package directory name used for the sibling and dependency candidates
    pub package_name: String,

    /// Port the shared bridge listens on
    pub shared_port: u16,

    /// Output lines that mark the bridge as listening
    pub ready_markers: Vec<String>,

    /// Interval between readiness probes in milliseconds
    pub poll_interval_ms: u64,

    /// Timeout of a single readiness probe in milliseconds
    pub probe_timeout_ms: u64,

    /// How long a per-user bridge may take to report its descriptor
    pub descriptor_timeout_ms: u64,

    /// Terminate owned bridges when the host receives SIGINT/SIGTERM
    pub handle_signals: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interpreter: "python".to_string(),
            script_name: "bridge_agent.py".to_string(),
            script_path: None,
            package_name: "uagent-client".to_string(),
            shared_port: 8000,
            ready_markers: vec![
                "Starting server on".to_string(),
                "Ready to receive queries".to_string(),
            ],
            poll_interval_ms: 1000,
            probe_timeout_ms: 3000,
            descriptor_timeout_ms: 10_000,
            handle_signals: true,
        }
    }
}

impl BridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn descriptor_timeout(&self) -> Duration {
        Duration::from_millis(self.descriptor_timeout_ms)
    }
}

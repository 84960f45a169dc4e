//! uAgent client - query uAgents through a local bridge agent
//!
//! Applications talk HTTP to a local bridge agent, which relays each query
//! to the target uAgent and returns its reply. This crate discovers and
//! spawns that bridge, shares one bridge process between every client in
//! the process, and correlates each query with its result.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ UAgentClient │  │ UAgentClient │  │ UAgentClient │
//! │   (shared)   │  │   (shared)   │  │  (per-user)  │
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        └────────┬────────┘                 │
//!                 ▼                          ▼
//! ┌─────────────────────────────────────────────────────┐
//! │                   BridgeManager                      │
//! │  - refcounted shared bridge                          │
//! │  - per-user bridges keyed by seed hash               │
//! │  - readiness markers, HTTP probing, exit reconcile   │
//! └──────────┬──────────────────────────────┬───────────┘
//!            ▼                              ▼
//!   bridge_agent.py (shared)     bridge_agent.py --create-bridge
//!            │                              │
//!            └──── POST /query ──► target uAgent
//! ```
//!
//! ## Modules
//!
//! - [`client`]: query API and request correlation
//! - [`bridge`]: bridge discovery, process supervision and registry
//! - [`config`]: configuration management
//! - [`error`]: error types

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;

pub use bridge::{bridge_id, BridgeManager};
pub use client::{QueryResult, UAgentClient};
pub use config::{BridgeConfig, ClientConfig, UAgentConfig};
pub use error::{Error, Result};

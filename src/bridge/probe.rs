//! Liveness probing and readiness polling

use super::types::BridgeState;
use crate::config::BridgeConfig;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// HTTP client for the local bridge; system proxies never apply to it
pub fn local_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build bridge HTTP client, using defaults: {}", e);
            reqwest::Client::new()
        })
}

/// One `GET /` against the bridge
///
/// Any HTTP response, whatever its status, means the bridge is alive.
/// Connection failures and timeouts mean it is not. Never fails.
pub async fn probe(http: &reqwest::Client, base_url: &str, timeout: Duration) -> bool {
    let url = format!("{}/", base_url.trim_end_matches('/'));
    match http.get(&url).timeout(timeout).send().await {
        Ok(response) => {
            tracing::trace!(url = %url, status = %response.status(), "Bridge probe answered");
            true
        }
        Err(e) => {
            tracing::trace!(url = %url, "Bridge probe failed: {}", e);
            false
        }
    }
}

/// Poll until the bridge is ready or `max_wait` elapses
///
/// Readiness is either a successful probe or, when a state receiver is
/// given, a transition to `Ready` (e.g. from an output marker). A
/// transition to `Stopped` ends the wait early with `false`. Between
/// probes the loop sleeps for the poll interval but wakes on any state
/// change.
pub async fn wait_until_ready(
    http: &reqwest::Client,
    base_url: &str,
    state: Option<watch::Receiver<BridgeState>>,
    config: &BridgeConfig,
    max_wait: Duration,
) -> bool {
    poll(http, base_url, state, config, max_wait, true).await
}

/// Poll until `base_url` answers or `max_wait` elapses
///
/// A `Ready` state does not end the wait; only a successful probe of
/// `base_url` does. A transition to `Stopped` still ends it with `false`.
pub async fn wait_until_answering(
    http: &reqwest::Client,
    base_url: &str,
    state: Option<watch::Receiver<BridgeState>>,
    config: &BridgeConfig,
    max_wait: Duration,
) -> bool {
    poll(http, base_url, state, config, max_wait, false).await
}

async fn poll(
    http: &reqwest::Client,
    base_url: &str,
    mut state: Option<watch::Receiver<BridgeState>>,
    config: &BridgeConfig,
    max_wait: Duration,
    accept_ready_state: bool,
) -> bool {
    let deadline = Instant::now() + max_wait;

    loop {
        if let Some(ref rx) = state {
            match *rx.borrow() {
                BridgeState::Ready if accept_ready_state => return true,
                BridgeState::Stopped => return false,
                _ => {}
            }
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        if probe(http, base_url, config.probe_timeout().min(remaining)).await {
            return true;
        }

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return false;
        }
        let pause = config.poll_interval().min(remaining);

        let closed = match state.as_mut() {
            Some(rx) => tokio::select! {
                _ = tokio::time::sleep(pause) => false,
                changed = rx.changed() => changed.is_err(),
            },
            None => {
                tokio::time::sleep(pause).await;
                false
            }
        };
        if closed {
            state = None;
        }
    }
}

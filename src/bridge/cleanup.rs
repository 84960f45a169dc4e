//! Host-exit cleanup of bridge processes
//!
//! Every spawned bridge pid is tracked here. The first spawn installs a
//! single SIGINT/SIGTERM listener for the whole host process; when it fires,
//! all tracked bridges receive SIGTERM and the host exits.

use std::collections::HashSet;
use std::sync::{Mutex, Once, OnceLock};

static INSTALL: Once = Once::new();

fn tracked() -> &'static Mutex<HashSet<u32>> {
    static PIDS: OnceLock<Mutex<HashSet<u32>>> = OnceLock::new();
    PIDS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Install the signal listener once per host process
///
/// Must be called from within a tokio runtime; outside one it is a no-op
/// and a later call may install it.
pub fn install_signal_handlers() {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return;
    };
    INSTALL.call_once(|| {
        runtime.spawn(async {
            let signal = wait_for_shutdown_signal().await;
            let pids = terminate_all();
            tracing::info!(signal, bridges = pids, "Host shutting down, bridges terminated");
            std::process::exit(0);
        });
        tracing::debug!("Bridge cleanup handlers installed");
    });
}

pub fn track(pid: u32) {
    if let Ok(mut pids) = tracked().lock() {
        pids.insert(pid);
    }
}

pub fn untrack(pid: u32) {
    if let Ok(mut pids) = tracked().lock() {
        pids.remove(&pid);
    }
}

pub fn is_tracked(pid: u32) -> bool {
    tracked().lock().map(|p| p.contains(&pid)).unwrap_or(false)
}

/// Send SIGTERM to every tracked bridge, returning how many were signalled
pub fn terminate_all() -> usize {
    let pids: Vec<u32> = match tracked().lock() {
        Ok(mut pids) => pids.drain().collect(),
        Err(_) => return 0,
    };
    for pid in &pids {
        send_terminate(*pid);
    }
    pids.len()
}

/// Graceful termination signal; returns false if the signal was not delivered
#[cfg(unix)]
pub fn send_terminate(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, libc::SIGTERM) == 0 }
}

#[cfg(not(unix))]
pub fn send_terminate(_pid: u32) -> bool {
    false
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            tracing::warn!("Failed to listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return "SIGINT";
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = term.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "CTRL_C"
}

/// Serializes tests that spawn tracked processes or drain the tracked set
#[cfg(test)]
pub(crate) fn tracking_guard() -> std::sync::MutexGuard<'static, ()> {
    static GUARD: Mutex<()> = Mutex::new(());
    GUARD.lock().unwrap_or_else(|e| e.into_inner())
}

//! Bridge script discovery

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Ordered list of places the bridge script may live
#[derive(Debug, Clone)]
pub struct BridgeLocator {
    candidates: Vec<PathBuf>,
}

impl BridgeLocator {
    pub fn new(candidates: Vec<PathBuf>) -> Self {
        Self { candidates }
    }

    /// Candidates derived from the running executable and working directory
    pub fn from_config(config: &BridgeConfig) -> Self {
        let module_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(candidate_paths(config, &module_dir, &cwd))
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// First candidate that exists on disk
    pub fn locate(&self) -> Result<PathBuf> {
        for candidate in &self.candidates {
            if candidate.is_file() {
                tracing::debug!(path = %candidate.display(), "Found bridge agent");
                return Ok(candidate.clone());
            }
        }

        let searched = self
            .candidates
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ");
        Err(Error::NotFound(format!("searched {}", searched)))
    }
}

/// Candidate order: explicit override, module-local directory, package
/// sibling directory, working directory, dependency directory.
pub fn candidate_paths(config: &BridgeConfig, module_dir: &Path, cwd: &Path) -> Vec<PathBuf> {
    let script = &config.script_name;
    let mut candidates = Vec::with_capacity(5);

    if let Some(ref explicit) = config.script_path {
        candidates.push(explicit.clone());
    }
    candidates.push(module_dir.join(script));
    candidates.push(module_dir.join("..").join(&config.package_name).join(script));
    candidates.push(cwd.join(script));
    candidates.push(
        cwd.join("node_modules")
            .join(&config.package_name)
            .join(script),
    );

    candidates
}

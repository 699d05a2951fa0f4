//! Runtime configuration.
//!
//! A small serde/TOML config covering the engine's tunables: the node-name
//! namespace, dependency await deadline, idle wake interval, frame pacing,
//! and where frame-channel backing files live.

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default namespace prefix for generated node names.
pub const DEFAULT_NAMESPACE: &str = "com.mediaflow";

/// Default deadline for awaiting an upstream dependency (ms).
pub const DEFAULT_DEPENDENCY_TIMEOUT_MS: u64 = 5_000;

/// Default interval at which an idle node thread wakes to re-check its
/// start trigger, pending params, and stop flag (ms).
pub const DEFAULT_WAKE_INTERVAL_MS: u64 = 50;

/// Default pacing between frames produced by a loop source (ms).
pub const DEFAULT_FRAME_INTERVAL_MS: u64 = 16;

/// Runtime settings for both managers and all node threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Namespace prefix used when generating node names.
    pub namespace: String,

    /// How long a node waits on an upstream dependency before surfacing a
    /// timeout instead of blocking forever.
    pub dependency_timeout_ms: u64,

    /// Idle poll interval for node threads blocked on their start trigger.
    pub wake_interval_ms: u64,

    /// Pacing between frames for loop sources.
    pub frame_interval_ms: u64,

    /// Directory holding frame-channel backing files.
    pub frame_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            dependency_timeout_ms: DEFAULT_DEPENDENCY_TIMEOUT_MS,
            wake_interval_ms: DEFAULT_WAKE_INTERVAL_MS,
            frame_interval_ms: DEFAULT_FRAME_INTERVAL_MS,
            frame_dir: std::env::temp_dir(),
        }
    }
}

impl RuntimeConfig {
    /// Load a config from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&text)
            .map_err(|e| FlowError::Params(format!("invalid config file: {e}")))
    }

    /// Save the config as TOML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = toml::to_string_pretty(self)
            .map_err(|e| FlowError::Params(format!("failed to serialize config: {e}")))?;
        std::fs::write(path.as_ref(), text)?;
        Ok(())
    }

    pub fn dependency_timeout(&self) -> Duration {
        Duration::from_millis(self.dependency_timeout_ms)
    }

    pub fn wake_interval(&self) -> Duration {
        Duration::from_millis(self.wake_interval_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

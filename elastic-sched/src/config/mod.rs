//! System configuration loading.
//!
//! One YAML file carries the resource pools the optimizer divides up and the
//! bounds-checked table limits:
//!
//! ```yaml
//! system:
//!   total_cpus: 8
//!   total_sms: 4
//!   max_tasks: 64
//!   max_modes: 16
//! ```
//!
//! Every field is optional; missing values fall back to the defaults below,
//! and a missing file altogether is handled by the caller (the CLI warns and
//! runs on defaults).

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Default CPU pool handed to the optimizer as `max_cpus`.
pub const DEFAULT_TOTAL_CPUS: usize = 8;

/// Default SM-partition pool handed to the optimizer as `max_sms`.
pub const DEFAULT_TOTAL_SMS: usize = 4;

/// Default cap on the number of registered tasks.
pub const DEFAULT_MAX_TASKS: usize = 64;

/// Default cap on modes per task.
pub const DEFAULT_MAX_MODES: usize = 16;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper matching the file layout; callers work with
/// [`SystemConfig`] instead.
#[derive(Debug, Deserialize)]
struct SystemConfigFile {
    system: SystemConfigEntry,
}

#[derive(Debug, Deserialize)]
struct SystemConfigEntry {
    #[serde(default = "default_total_cpus")]
    total_cpus: usize,
    #[serde(default = "default_total_sms")]
    total_sms: usize,
    #[serde(default = "default_max_tasks")]
    max_tasks: usize,
    #[serde(default = "default_max_modes")]
    max_modes: usize,
}

fn default_total_cpus() -> usize {
    DEFAULT_TOTAL_CPUS
}

fn default_total_sms() -> usize {
    DEFAULT_TOTAL_SMS
}

fn default_max_tasks() -> usize {
    DEFAULT_MAX_TASKS
}

fn default_max_modes() -> usize {
    DEFAULT_MAX_MODES
}

// ── SystemConfig ──────────────────────────────────────────────────────────────

/// Resource pools and table limits for one scheduler instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemConfig {
    /// CPU pool; the optimizer's default `max_cpus` bound.
    pub total_cpus: usize,
    /// SM-partition pool; the optimizer's default `max_sms` bound.
    pub total_sms: usize,
    /// Bounds-checked cap on registered tasks.
    pub max_tasks: usize,
    /// Per-task menu cap; more modes than this is a construction error.
    pub max_modes: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        SystemConfig {
            total_cpus: DEFAULT_TOTAL_CPUS,
            total_sms: DEFAULT_TOTAL_SMS,
            max_tasks: DEFAULT_MAX_TASKS,
            max_modes: DEFAULT_MAX_MODES,
        }
    }
}

impl SystemConfig {
    /// Parse `path` into a validated configuration.
    ///
    /// `total_sms` may be zero (a CPU-only deployment); `max_tasks` and
    /// `max_modes` must be at least one for the scheduler to hold anything.
    ///
    /// # Errors
    /// Open/parse failures and limit violations, with the offending path in
    /// the error chain.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading system configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: SystemConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let config = SystemConfig {
            total_cpus: file.system.total_cpus,
            total_sms: file.system.total_sms,
            max_tasks: file.system.max_tasks,
            max_modes: file.system.max_modes,
        };

        if config.max_tasks == 0 {
            bail!("{}: max_tasks must be at least 1", path.display());
        }
        if config.max_modes == 0 {
            bail!("{}: max_modes must be at least 1", path.display());
        }

        debug!(
            total_cpus = config.total_cpus,
            total_sms = config.total_sms,
            max_tasks = config.max_tasks,
            max_modes = config.max_modes,
            "system configuration loaded"
        );

        Ok(config)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

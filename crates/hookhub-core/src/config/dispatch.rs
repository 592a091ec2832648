//! Hook dispatch configuration.

use serde::{Deserialize, Serialize};

/// How plugins sharing a priority are ordered within a hook chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// Earlier registration runs first.
    #[default]
    RegistrationOrder,
    /// Alphabetical by plugin name, then registration order.
    Name,
}

/// Hook dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Default per-plugin hook invocation timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Timeout for `initialize` and `shutdown` calls in milliseconds.
    #[serde(default = "default_lifecycle_timeout_ms")]
    pub lifecycle_timeout_ms: u64,
    /// Ordering policy for equal priorities.
    #[serde(default)]
    pub tie_break: TieBreak,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            lifecycle_timeout_ms: default_lifecycle_timeout_ms(),
            tie_break: TieBreak::default(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_lifecycle_timeout_ms() -> u64 {
    30_000
}

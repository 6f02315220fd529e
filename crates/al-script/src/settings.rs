//! Engine settings

use serde::{Deserialize, Serialize};

fn default_tick_rate() -> u32 {
    60
}

fn default_max_steps_per_tick() -> usize {
    1000
}

fn default_max_nesting() -> usize {
    32
}

fn default_log_filter() -> String {
    "info".to_string()
}

/// Tunables of one engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Ticks per second driven by the runner
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,

    /// Seed for `set_random`; entropy when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Steps one instance may finish within a single tick
    #[serde(default = "default_max_steps_per_tick")]
    pub max_steps_per_tick: usize,

    /// Depth limit for skipping nested sub-sequences
    #[serde(default = "default_max_nesting")]
    pub max_nesting: usize,

    /// Default tracing filter when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_rate: default_tick_rate(),
            seed: None,
            max_steps_per_tick: default_max_steps_per_tick(),
            max_nesting: default_max_nesting(),
            log_filter: default_log_filter(),
        }
    }
}

impl EngineSettings {
    /// Seconds between ticks
    pub fn tick_interval(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}

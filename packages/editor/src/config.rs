use crate::EditorResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_NAME: &str = "arbor.config.json";

/// Editor tuning knobs, read from `arbor.config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorConfig {
    /// Undo levels kept (0 = unlimited)
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Window in which edits to the same slot coalesce into one undo step
    #[serde(default = "default_merge_window_ms")]
    pub merge_window_ms: u64,

    /// Quiet period after the last edit before derived work starts
    #[serde(default = "default_derived_debounce_ms")]
    pub derived_debounce_ms: u64,
}

fn default_history_limit() -> usize {
    100
}

fn default_merge_window_ms() -> u64 {
    300
}

fn default_derived_debounce_ms() -> u64 {
    400
}

impl EditorConfig {
    /// Load config from a directory, falling back to defaults when absent
    pub fn load(dir: impl AsRef<Path>) -> EditorResult<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_json_str(&content)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_json_str(json: &str) -> EditorResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_merge_window(mut self, window: Duration) -> Self {
        self.merge_window_ms = window.as_millis() as u64;
        self
    }

    pub fn with_derived_debounce(mut self, debounce: Duration) -> Self {
        self.derived_debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn merge_window(&self) -> Duration {
        Duration::from_millis(self.merge_window_ms)
    }

    pub fn derived_debounce(&self) -> Duration {
        Duration::from_millis(self.derived_debounce_ms)
    }
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            merge_window_ms: default_merge_window_ms(),
            derived_debounce_ms: default_derived_debounce_ms(),
        }
    }
}

//! Activator configuration.

use serde::{Deserialize, Serialize};

/// Depth bound used when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 10;

/// Event fired for every extension that should start with the host.
pub const STARTUP_EVENT: &str = "*";

/// `[activator]` table of the activation manifest
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ActivatorConfig {
    /// Resolution rounds allowed past the first before every remaining
    /// extension in a batch is failed (dependency cycle guard)
    pub max_depth: usize,
    /// Events the host fires once registration is complete
    pub startup_events: Vec<String>,
}

impl Default for ActivatorConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            startup_events: vec![STARTUP_EVENT.to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ActivatorConfig::default();
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.startup_events, vec!["*"]);
    }

    #[test]
    fn test_partial_table_keeps_defaults() {
        let config: ActivatorConfig = toml::from_str("max_depth = 4").unwrap();
        assert_eq!(config.max_depth, 4);
        assert_eq!(config.startup_events, vec!["*"]);
    }
}

//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use affirm_types::VerificationParams;
use affirm_utils::LogFormat;

use crate::NodeError;

/// Configuration for a verification node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for the LMDB environment.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size in MiB.
    #[serde(default = "default_map_size_mb")]
    pub map_size_mb: usize,

    /// Public base URL that verification links are built under.
    #[serde(default = "default_public_url")]
    pub public_url: String,

    /// Lifetime of a challenge's token and code, in seconds.
    #[serde(default = "default_lifespan")]
    pub challenge_lifespan_secs: u64,

    /// Lifetime of the browser-facing flow, in seconds.
    #[serde(default = "default_lifespan")]
    pub flow_lifespan_secs: u64,

    /// Wrong codes allowed per challenge. `0` disables the bound.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Log format: "human" or "json".
    #[serde(default)]
    pub log_format: LogFormat,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_data_dir() -> PathBuf {
    PathBuf::from("./affirm_data")
}

fn default_map_size_mb() -> usize {
    64
}

fn default_public_url() -> String {
    "http://127.0.0.1:4455/".to_string()
}

fn default_lifespan() -> u64 {
    3_600
}

fn default_max_attempts() -> u32 {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.as_ref().display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// LMDB map size in bytes.
    pub fn map_size(&self) -> usize {
        self.map_size_mb.saturating_mul(1024 * 1024)
    }

    /// The engine's verification policy.
    pub fn params(&self) -> VerificationParams {
        VerificationParams {
            challenge_lifespan_secs: self.challenge_lifespan_secs,
            flow_lifespan_secs: self.flow_lifespan_secs,
            max_attempts: (self.max_attempts > 0).then_some(self.max_attempts),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            map_size_mb: default_map_size_mb(),
            public_url: default_public_url(),
            challenge_lifespan_secs: default_lifespan(),
            flow_lifespan_secs: default_lifespan(),
            max_attempts: default_max_attempts(),
            log_format: LogFormat::default(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.challenge_lifespan_secs, 3_600);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.log_format, LogFormat::Human);
        assert_eq!(config.params(), VerificationParams::default());
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            public_url = "https://accounts.example.com/"
            flow_lifespan_secs = 600
            log_format = "json"
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.public_url, "https://accounts.example.com/");
        assert_eq!(config.flow_lifespan_secs, 600);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.challenge_lifespan_secs, 3_600); // default
    }

    #[test]
    fn zero_attempts_disables_bound() {
        let config = NodeConfig::from_toml_str("max_attempts = 0").unwrap();
        assert_eq!(config.params().max_attempts, None);
    }

    #[test]
    fn unknown_log_format_is_rejected() {
        assert!(matches!(
            NodeConfig::from_toml_str(r#"log_format = "xml""#),
            Err(NodeError::Config(_))
        ));
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/affirm.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}

//! Runtime configuration for kv-cache-compress.
//!
//! Configuration can be loaded from a JSON file or constructed
//! programmatically. Request size limits and engine tuning knobs live here;
//! per-request compression parameters arrive in the request payload.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::engine::attention::Aggregation;

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "kv-cache-compress",
    about = "Attention-based KV-cache compression server"
)]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address.
    #[arg(long, default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,

    /// Engine tuning.
    pub engine: EngineConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "0.0.0.0:8080").
    pub listen: String,

    /// Per-request deadline in seconds; compression past this returns 408.
    pub request_timeout_secs: u64,

    /// Maximum tokens (key/value rows) accepted in one request.
    pub max_tokens: usize,

    /// Maximum queries accepted in one request.
    pub max_queries: usize,

    /// Maximum vector dimension accepted in one request.
    pub max_dim: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_tokens: 65536,
            max_queries: 1024,
            max_dim: 8192,
        }
    }
}

/// Compression engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum M×N×d multiply-adds before attention scoring is
    /// parallelized across the rayon pool.
    pub parallel_min_work: usize,

    /// Aggregation used when a request does not specify one.
    pub default_aggregation: Aggregation,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_min_work: 4 * 1024 * 1024,
            default_aggregation: Aggregation::Mean,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults for
    /// missing fields.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let data = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.server.request_timeout_secs, 30);
        assert_eq!(cfg.engine.default_aggregation, Aggregation::Mean);
    }

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let cfg: Config = serde_json::from_str(r#"{"server": {"max_tokens": 128}}"#).unwrap();
        assert_eq!(cfg.server.max_tokens, 128);
        assert_eq!(cfg.server.max_queries, ServerConfig::default().max_queries);
        assert_eq!(
            cfg.engine.parallel_min_work,
            EngineConfig::default().parallel_min_work
        );
    }
}

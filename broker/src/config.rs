//! Configuration: a JSON file (the original's `JsonOptionSrc`) plus `argh`
//! CLI flags for the config path and a couple of operational overrides.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{BrokerError, BrokerResult};

fn default_port() -> u16 {
    7654
}
fn default_addr() -> String {
    "0.0.0.0".to_string()
}
fn default_ws_port() -> u16 {
    7655
}
fn default_ws_addr() -> String {
    "0.0.0.0".to_string()
}
fn default_buffer_size() -> usize {
    256
}
fn default_workers() -> usize {
    4
}
fn default_status_check_period() -> u64 {
    30
}
fn default_max_clients() -> usize {
    100_000
}
fn default_shard_size() -> u64 {
    100
}
fn default_key_dir() -> String {
    "keys".to_string()
}
fn default_node() -> String {
    "node-1".to_string()
}
fn default_true() -> bool {
    true
}

/// Mirrors the original's `options.SysOption`, deserialized straight from
/// the JSON config file named by `$CONF` (or `--config`).
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_addr")]
    pub addr: String,
    #[serde(default = "default_ws_port")]
    pub ws_port: u16,
    #[serde(default = "default_ws_addr")]
    pub ws_addr: String,
    #[serde(default)]
    pub ws_enabled: bool,
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_node")]
    pub node: String,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_true")]
    pub statistic: bool,
    #[serde(default = "default_status_check_period")]
    pub status_check_period: u64,
    #[serde(default)]
    pub count_worker_time: bool,
    #[serde(default = "default_key_dir")]
    pub key_dir: String,
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
    #[serde(default = "default_shard_size")]
    pub shard_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            addr: default_addr(),
            ws_port: default_ws_port(),
            ws_addr: default_ws_addr(),
            ws_enabled: false,
            buffer_size: default_buffer_size(),
            node: default_node(),
            workers: default_workers(),
            statistic: default_true(),
            status_check_period: default_status_check_period(),
            count_worker_time: false,
            key_dir: default_key_dir(),
            max_clients: default_max_clients(),
            shard_size: default_shard_size(),
        }
    }
}

impl Config {
    /// Loads and parses the JSON config file at `path`.
    pub fn load(path: impl AsRef<Path>) -> BrokerResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| BrokerError::Config(format!("{}: {}", path.display(), e)))?;
        serde_json::from_str(&content).map_err(|e| BrokerError::Config(e.to_string()))
    }

    /// The CSS/reply-registry shard count implied by `max_clients` and
    /// `shard_size`, at least 1.
    pub fn shard_count(&self) -> usize {
        ((self.max_clients as u64).div_ceil(self.shard_size.max(1))).max(1) as usize
    }

    pub fn key_dir_path(&self) -> PathBuf {
        PathBuf::from(&self.key_dir)
    }

    pub fn status_check_period_duration(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.status_check_period)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.port, default_port());
        assert_eq!(cfg.workers, default_workers());
        assert!(cfg.statistic);
    }

    #[test]
    fn parses_full_document() {
        let json = r#"{
            "port": 9000,
            "addr": "127.0.0.1",
            "ws_port": 9001,
            "ws_addr": "127.0.0.1",
            "buffer_size": 64,
            "node": "node-7",
            "workers": 8,
            "statistic": false,
            "status_check_period": 15,
            "count_worker_time": true
        }"#;
        let cfg: Config = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.addr, "127.0.0.1");
        assert_eq!(cfg.workers, 8);
        assert!(!cfg.statistic);
        assert!(cfg.count_worker_time);
    }

    #[test]
    fn shard_count_rounds_up() {
        let cfg = Config {
            max_clients: 250,
            shard_size: 100,
            ..Config::default()
        };
        assert_eq!(cfg.shard_count(), 3);
    }

    #[test]
    fn load_reports_missing_file_as_config_error() {
        let err = Config::load("/nonexistent/broker-config.json").unwrap_err();
        assert!(matches!(err, BrokerError::Config(_)));
    }
}

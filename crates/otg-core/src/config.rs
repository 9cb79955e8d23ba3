//! Configuration parsing for the gateway.
//!
//! A single JSON file describes every session the process hosts. The
//! top-level structure carries logging metadata and a `sessions` array.
//!
//! # Example config
//!
//! ```json
//! {
//!   "gateway": { "module_name": "otg", "log_path": "/tmp/log" },
//!   "sessions": [{
//!     "label": "sim-1",
//!     "login": { "aid": "req_login", "bid": "sim", "user_name": "u1", "password": "p" },
//!     "session": { "poll_interval_ms": 100, "worker_cpu_core": 3 },
//!     "driver": { "pre_balance": 1000000.0 }
//!   }]
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{GatewayError, Result};
use crate::types::ReqLogin;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    pub gateway: Option<ModuleMeta>,

    /// One entry per hosted session.
    #[serde(default)]
    pub sessions: Vec<SessionEntry>,
}

impl AppConfig {
    pub fn module_name(&self) -> String {
        self.gateway
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "otg".to_string())
    }

    pub fn log_path(&self) -> Option<String> {
        self.gateway.as_ref().and_then(|m| m.log_path.clone())
    }

    /// Check every entry; labels must be unique so log lines stay attributable.
    pub fn validate(&self) -> Result<()> {
        let mut seen = ahash::AHashSet::new();
        for entry in &self.sessions {
            if !seen.insert(entry.label.as_str()) {
                return Err(GatewayError::Config(format!("duplicate session label '{}'", entry.label)));
            }
            entry.session.validate()?;
            entry.login.validate()?;
        }
        Ok(())
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// One hosted session.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionEntry {
    /// Name used in log lines and thread names.
    pub label: String,

    /// Login replayed into `start`.
    pub login: ReqLogin,

    #[serde(default)]
    pub session: SessionConfig,

    /// Driver-specific block, parsed by the driver itself.
    #[serde(default)]
    pub driver: serde_json::Value,
}

/// Tunables of one session engine.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Bounded wait of the worker on the inbound channel, in milliseconds.
    /// Also the upper bound of `stop` latency and of the idle-hook period.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// CPU core to pin the worker thread to.
    #[serde(default)]
    pub worker_cpu_core: Option<i32>,

    /// Stack size of the worker thread in bytes; the platform default if unset.
    #[serde(default)]
    pub worker_stack_size: Option<usize>,
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(GatewayError::Config("poll_interval_ms must be positive".into()));
        }
        if self.worker_stack_size == Some(0) {
            return Err(GatewayError::Config("worker_stack_size must be positive".into()));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { poll_interval_ms: default_poll_interval_ms(), worker_cpu_core: None, worker_stack_size: None }
    }
}

fn default_poll_interval_ms() -> u64 {
    100
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "gateway": { "module_name": "otg-test" },
        "sessions": [
            { "label": "a", "login": { "bid": "sim", "user_name": "u1" } },
            { "label": "b", "login": { "bid": "sim", "user_name": "u2" },
              "session": { "poll_interval_ms": 20, "worker_cpu_core": 1 },
              "driver": { "pre_balance": 10.0 } }
        ]
    }"#;

    #[test]
    fn parses_with_defaults() {
        let cfg: AppConfig = serde_json::from_str(SAMPLE).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.module_name(), "otg-test");
        assert!(cfg.log_path().is_none());
        assert_eq!(cfg.sessions[0].session.poll_interval(), Duration::from_millis(100));
        assert!(cfg.sessions[0].driver.is_null());
        assert_eq!(cfg.sessions[1].session.worker_cpu_core, Some(1));
        assert_eq!(cfg.sessions[1].driver["pre_balance"], 10.0);
    }

    #[test]
    fn rejects_duplicate_labels_and_zero_poll() {
        let mut cfg: AppConfig = serde_json::from_str(SAMPLE).unwrap();
        cfg.sessions[1].label = "a".into();
        assert!(matches!(cfg.validate(), Err(GatewayError::Config(_))));

        let zero = SessionConfig { poll_interval_ms: 0, ..Default::default() };
        assert!(zero.validate().is_err());
        let no_stack = SessionConfig { worker_stack_size: Some(0), ..Default::default() };
        assert!(no_stack.validate().is_err());
    }
}

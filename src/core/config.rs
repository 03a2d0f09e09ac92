// Copyright (c) 2026 Credence
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Node configuration (TOML) with validated defaults.

use crate::core::consensus::engine::EngineParams;
use serde::{Deserialize, Serialize};
use std::{fs, path::Path, time::Duration};
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file unreadable.
    #[error("io")]
    Io,
    /// TOML syntax or shape error.
    #[error("parse")]
    Parse,
    /// A value is outside its allowed range.
    #[error("invalid value: {0}")]
    Invalid(&'static str),
}

/// Node configuration root.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Node settings.
    #[serde(default)]
    pub node: NodeSettings,
    /// HTTP endpoints.
    #[serde(default)]
    pub http: HttpConfig,
    /// Consensus engine settings.
    #[serde(default)]
    pub engine: EngineSettings,
    /// Policy numbers carried for callers; the core does not consume them.
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// Node settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Human-readable name.
    #[serde(default = "default_node_name")]
    pub name: String,
    /// Data directory (keys + audit log).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            data_dir: default_data_dir(),
        }
    }
}

/// HTTP config.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Metrics listen address, e.g. 0.0.0.0:9090.
    #[serde(default = "default_http_listen")]
    pub listen_addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_listen(),
        }
    }
}

/// Consensus engine settings. The allowed option set is closed; anything
/// outside it fails validation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Required share of total weight in (0.5, 1].
    #[serde(default = "default_quorum_threshold")]
    pub quorum_threshold: f64,
    /// Per-task response window in milliseconds.
    #[serde(default = "default_response_timeout_ms")]
    pub response_timeout_ms: u64,
    /// Staleness interval after which an operator is unhealthy.
    #[serde(default = "default_health_staleness_ms")]
    pub health_staleness_ms: u64,
    /// Interval between health sweeps.
    #[serde(default = "default_health_sweep_ms")]
    pub health_sweep_ms: u64,
    /// Stake amount that maps to a full stake share.
    #[serde(default = "default_reference_stake")]
    pub reference_stake: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            quorum_threshold: default_quorum_threshold(),
            response_timeout_ms: default_response_timeout_ms(),
            health_staleness_ms: default_health_staleness_ms(),
            health_sweep_ms: default_health_sweep_ms(),
            reference_stake: default_reference_stake(),
        }
    }
}

impl EngineSettings {
    /// Engine parameter view.
    pub fn params(&self) -> EngineParams {
        EngineParams {
            quorum_threshold: self.quorum_threshold,
            response_timeout_ms: self.response_timeout_ms,
            reference_stake: self.reference_stake,
        }
    }

    /// Response window as a duration.
    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }

    /// Health sweep interval as a duration.
    pub fn health_sweep(&self) -> Duration {
        Duration::from_millis(self.health_sweep_ms)
    }
}

/// Protocol policy numbers; consumed by callers, not by the core.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Minimum notional accepted by callers.
    #[serde(default)]
    pub min_notional: u64,
    /// Maximum notional accepted by callers (0 = unbounded).
    #[serde(default)]
    pub max_notional: u64,
    /// Base fee in protocol units.
    #[serde(default)]
    pub base_fee: u64,
    /// Fee cap in basis points.
    #[serde(default)]
    pub max_fee_bps: u16,
}

impl NodeConfig {
    /// Enforce the closed option set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let q = self.engine.quorum_threshold;
        if !q.is_finite() || q <= 0.5 || q > 1.0 {
            return Err(ConfigError::Invalid("engine.quorum_threshold"));
        }
        if self.engine.response_timeout_ms == 0 {
            return Err(ConfigError::Invalid("engine.response_timeout_ms"));
        }
        if self.engine.health_staleness_ms == 0 {
            return Err(ConfigError::Invalid("engine.health_staleness_ms"));
        }
        if self.engine.health_sweep_ms == 0 {
            return Err(ConfigError::Invalid("engine.health_sweep_ms"));
        }
        if self.engine.reference_stake == 0 {
            return Err(ConfigError::Invalid("engine.reference_stake"));
        }
        if self.policy.max_fee_bps > 10_000 {
            return Err(ConfigError::Invalid("policy.max_fee_bps"));
        }
        if self.policy.max_notional != 0 && self.policy.max_notional < self.policy.min_notional {
            return Err(ConfigError::Invalid("policy.max_notional"));
        }
        Ok(())
    }
}

fn default_node_name() -> String {
    "credence-operator".to_string()
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_http_listen() -> String {
    "0.0.0.0:9090".to_string()
}
fn default_quorum_threshold() -> f64 {
    2.0 / 3.0
}
fn default_response_timeout_ms() -> u64 {
    30_000
}
fn default_health_staleness_ms() -> u64 {
    5 * 60 * 1000
}
fn default_health_sweep_ms() -> u64 {
    30_000
}
fn default_reference_stake() -> u64 {
    100
}

/// Load and validate a config file.
pub fn load_config(path: &Path) -> Result<NodeConfig, ConfigError> {
    let text = fs::read_to_string(path).map_err(|_| ConfigError::Io)?;
    let cfg: NodeConfig = toml::from_str(&text).map_err(|_| ConfigError::Parse)?;
    cfg.validate()?;
    Ok(cfg)
}

/// Load a config file if present; otherwise the validated defaults.
pub fn load_or_default(path: &Path) -> Result<NodeConfig, ConfigError> {
    if path.exists() {
        return load_config(path);
    }
    let cfg = NodeConfig::default();
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        NodeConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let cfg: NodeConfig = toml::from_str(
            r#"
            [node]
            name = "op-7"

            [engine]
            quorum_threshold = 0.75
            "#,
        )
        .unwrap();
        assert_eq!(cfg.node.name, "op-7");
        assert_eq!(cfg.node.data_dir, "./data");
        assert_eq!(cfg.engine.quorum_threshold, 0.75);
        assert_eq!(cfg.engine.response_timeout_ms, 30_000);
        cfg.validate().unwrap();
    }

    #[test]
    fn majority_threshold_is_required() {
        let mut cfg = NodeConfig::default();
        cfg.engine.quorum_threshold = 0.5;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid("engine.quorum_threshold"))
        ));
        cfg.engine.quorum_threshold = 1.0;
        cfg.validate().unwrap();
        cfg.engine.quorum_threshold = 1.01;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn policy_bounds_are_checked() {
        let mut cfg = NodeConfig::default();
        cfg.policy.max_fee_bps = 10_001;
        assert!(cfg.validate().is_err());
        cfg.policy.max_fee_bps = 30;
        cfg.policy.min_notional = 10;
        cfg.policy.max_notional = 5;
        assert!(cfg.validate().is_err());
    }
}

// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Orchestrator configuration.
//!
//! One YAML file, loaded once into an immutable value at construction
//! time. There is deliberately no layering or merging here; whatever
//! composes configuration lives outside this crate and hands over the
//! final values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;

use crate::executor::RetryPolicy;
use crate::host::HostDescriptor;
use crate::ssh::pool::PoolConfig;
use crate::ssh::transport::ConnectOptions;

/// Immutable orchestrator configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Host specifications, `[user@]host[:port]`.
    #[serde(default)]
    pub hosts: Vec<String>,

    #[serde(default)]
    pub defaults: Defaults,

    #[serde(default)]
    pub pool: PoolSettings,

    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Global default settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Defaults {
    pub user: Option<String>,
    pub port: Option<u16>,
    /// SSH connect timeout in seconds.
    pub connect_timeout: Option<u64>,
    /// Command execution timeout in seconds. 0 means unlimited.
    pub command_timeout: Option<u64>,
    /// Overall batch deadline in seconds; unset means no deadline.
    pub batch_timeout: Option<u64>,
    /// SSH keepalive interval in seconds. Set to 0 to disable.
    pub server_alive_interval: Option<u64>,
}

/// Connection pool limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolSettings {
    pub max_per_host: Option<usize>,
    pub max_total: Option<usize>,
    /// Seconds to wait for pool capacity before giving up on a host.
    pub acquire_timeout: Option<u64>,
}

const DEFAULT_CONNECT_TIMEOUT: u64 = 30;
const DEFAULT_COMMAND_TIMEOUT: u64 = 300;
const DEFAULT_KEEPALIVE_INTERVAL: u64 = 60;

impl OrchestratorConfig {
    /// Load configuration from a YAML file. A missing file yields the
    /// defaults.
    pub async fn load(path: &Path) -> Result<Self> {
        let expanded_path = expand_tilde(path);

        if !expanded_path.exists() {
            tracing::debug!(
                "Config file not found at {:?}, using defaults",
                expanded_path
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&expanded_path).await.with_context(|| {
            format!(
                "Failed to read configuration file at {}",
                expanded_path.display()
            )
        })?;

        let config: OrchestratorConfig = serde_yaml::from_str(&content).with_context(|| {
            format!(
                "Failed to parse YAML configuration file at {}",
                expanded_path.display()
            )
        })?;

        Ok(config)
    }

    /// Parse the configured host list, applying the default user/port.
    pub fn host_descriptors(&self) -> Result<Vec<HostDescriptor>> {
        self.hosts
            .iter()
            .map(|spec| {
                HostDescriptor::parse(spec, self.defaults.user.as_deref(), self.defaults.port)
                    .with_context(|| format!("Invalid host specification '{spec}'"))
            })
            .collect()
    }

    pub fn connect_options(&self) -> ConnectOptions {
        let keepalive = self
            .defaults
            .server_alive_interval
            .unwrap_or(DEFAULT_KEEPALIVE_INTERVAL);
        ConnectOptions {
            connect_timeout: Duration::from_secs(
                self.defaults.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            ),
            keepalive_interval: (keepalive > 0).then(|| Duration::from_secs(keepalive)),
            ..ConnectOptions::default()
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        let defaults = PoolConfig::default();
        PoolConfig {
            max_per_host: self.pool.max_per_host.unwrap_or(defaults.max_per_host),
            max_total: self.pool.max_total.unwrap_or(defaults.max_total),
            acquire_timeout: self
                .pool
                .acquire_timeout
                .map(Duration::from_secs)
                .unwrap_or(defaults.acquire_timeout),
        }
    }

    /// Default per-command timeout; zero means unlimited.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(
            self.defaults
                .command_timeout
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
        )
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.defaults
            .batch_timeout
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
    }
}

/// Expand a leading `~/` to the home directory.
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
            return PathBuf::from(home).join(stripped);
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_empty() {
        let config: OrchestratorConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.hosts.is_empty());
        assert_eq!(config.command_timeout(), Duration::from_secs(300));
        assert_eq!(config.batch_timeout(), None);
        assert_eq!(config.pool_config().max_per_host, 4);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
hosts:
  - web1.example.com
  - admin@web2.example.com:2222

defaults:
  user: deploy
  connect_timeout: 10
  command_timeout: 120
  batch_timeout: 600
  server_alive_interval: 0

pool:
  max_per_host: 2
  max_total: 16
  acquire_timeout: 5

retry:
  max_attempts: 5
  base_delay_ms: 250
  max_delay_ms: 10000
"#;
        let config: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();

        let hosts = config.host_descriptors().unwrap();
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].username, "deploy");
        assert_eq!(hosts[0].port, 22);
        assert_eq!(hosts[1].username, "admin");
        assert_eq!(hosts[1].port, 2222);

        let options = config.connect_options();
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.keepalive_interval, None);

        assert_eq!(config.command_timeout(), Duration::from_secs(120));
        assert_eq!(config.batch_timeout(), Some(Duration::from_secs(600)));

        let pool = config.pool_config();
        assert_eq!(pool.max_per_host, 2);
        assert_eq!(pool.max_total, 16);
        assert_eq!(pool.acquire_timeout, Duration::from_secs(5));

        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.base_delay_ms, 250);
    }

    #[test]
    fn test_invalid_host_spec_is_an_error() {
        let config = OrchestratorConfig {
            hosts: vec!["web1.example.com:notaport".to_string()],
            ..OrchestratorConfig::default()
        };
        assert!(config.host_descriptors().is_err());
    }

    #[test]
    fn test_zero_command_timeout_means_unlimited() {
        let yaml = "defaults:\n  command_timeout: 0\n";
        let config: OrchestratorConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(config.command_timeout().is_zero());
    }
}

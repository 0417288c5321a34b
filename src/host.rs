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

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a remote host: address, port, and the user to connect as.
///
/// Immutable once constructed. The canonical rendering `user@host:port`
/// (see the `Display` impl) is the identity key used by the connection
/// pool registry and by [`BatchResult`](crate::executor::BatchResult).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostDescriptor {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl HostDescriptor {
    pub fn new(host: String, port: u16, username: String) -> Self {
        Self {
            host,
            port,
            username,
        }
    }

    /// Parse a host specification string.
    ///
    /// Accepted formats:
    /// - `host`
    /// - `host:port`
    /// - `user@host`
    /// - `user@host:port`
    ///
    /// Missing parts fall back to `default_user`/`default_port`, then to
    /// the `USER`/`USERNAME` environment and port 22.
    pub fn parse(
        spec: &str,
        default_user: Option<&str>,
        default_port: Option<u16>,
    ) -> Result<Self> {
        let (user_part, host_part) = if let Some(at_pos) = spec.find('@') {
            let user = &spec[..at_pos];
            let rest = &spec[at_pos + 1..];
            (Some(user), rest)
        } else {
            (None, spec)
        };

        let (host, port) = if let Some(colon_pos) = host_part.rfind(':') {
            let host = &host_part[..colon_pos];
            let port_str = &host_part[colon_pos + 1..];
            let port = port_str.parse::<u16>().context("Invalid port number")?;
            (host, port)
        } else {
            (host_part, default_port.unwrap_or(22))
        };

        if host.is_empty() {
            anyhow::bail!("Empty hostname in '{spec}'");
        }

        let username = user_part
            .or(default_user)
            .map(|s| s.to_string())
            .unwrap_or_else(|| {
                std::env::var("USER")
                    .or_else(|_| std::env::var("USERNAME"))
                    .unwrap_or_else(|_| "root".to_string())
            });

        Ok(HostDescriptor {
            host: host.to_string(),
            port,
            username,
        })
    }

    /// `host:port` without the username, for socket addressing.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Canonical identity string, equal to the `Display` rendering.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

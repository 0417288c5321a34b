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

//! The transport seam between the orchestrator core and the wire.
//!
//! A [`Transport`] opens authenticated sessions; a [`TransportSession`]
//! runs commands over one of them. The production implementation is
//! [`RusshTransport`](super::client::RusshTransport); tests substitute
//! scripted in-memory transports, which is what makes the concurrency and
//! retry properties of the dispatcher checkable without a network.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::host::HostDescriptor;
use crate::ssh::auth::{AuthMethod, HostKeyCheck};

/// Options applied to every connection a transport opens.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    pub connect_timeout: Duration,
    /// Keepalive probe interval; `None` disables keepalives.
    pub keepalive_interval: Option<Duration>,
    pub host_key_check: HostKeyCheck,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            keepalive_interval: Some(Duration::from_secs(60)),
            host_key_check: HostKeyCheck::default(),
        }
    }
}

/// Raw output of one executed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// The unix exit status (`$?`).
    pub exit_status: u32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Factory for authenticated sessions to remote hosts.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Establish and authenticate a session. Errors are classified into
    /// the `Auth` / `Unreachable` / `Timeout` variants of the taxonomy.
    async fn connect(
        &self,
        host: &HostDescriptor,
        auth: &AuthMethod,
        options: &ConnectOptions,
    ) -> Result<Box<dyn TransportSession>>;
}

/// One authenticated session. Runs a single command at a time; callers
/// serialize access (the pool guarantees exclusive hand-out).
#[async_trait]
pub trait TransportSession: Send {
    /// Execute a command and collect its output. Every invocation is a
    /// fresh shell context. A transport-level failure here means the
    /// session is no longer usable.
    async fn exec(&mut self, command: &str) -> Result<ExecOutput>;

    /// Tear the session down. Safe to call on an already-closed session.
    async fn close(&mut self) -> Result<()>;

    /// Whether the underlying transport still considers itself usable.
    fn is_open(&self) -> bool;
}

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

//! A single authenticated connection to one host.
//!
//! The connection is an explicit state machine; transitions are
//! serialized by `&mut` access (a connection is never shared between
//! concurrent commands — the pool hands each one out exclusively).

use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::command::CommandSpec;
use crate::error::{Error, Result};
use crate::executor::result_types::{AttemptOutcome, ExecutionAttempt};
use crate::host::HostDescriptor;
use crate::ssh::auth::AuthMethod;
use crate::ssh::transport::{ConnectOptions, Transport, TransportSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    /// A transport-level error was observed; the connection refuses
    /// further commands until reopened.
    Failed,
    Closed,
}

pub struct Connection {
    host: HostDescriptor,
    state: ConnectionState,
    session: Option<Box<dyn TransportSession>>,
}

impl Connection {
    pub fn new(host: HostDescriptor) -> Self {
        Self {
            host,
            state: ConnectionState::Disconnected,
            session: None,
        }
    }

    pub fn host(&self) -> &HostDescriptor {
        &self.host
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_ready(&self) -> bool {
        self.state == ConnectionState::Ready
    }

    /// Ready and the transport still reports the session usable.
    pub fn is_live(&self) -> bool {
        self.is_ready() && self.session.as_ref().is_some_and(|s| s.is_open())
    }

    /// Establish transport and authenticate. A no-op on a Ready
    /// connection; a Failed or Closed connection can be reopened.
    pub async fn open(
        &mut self,
        transport: &dyn Transport,
        auth: &AuthMethod,
        options: &ConnectOptions,
    ) -> Result<()> {
        if self.state == ConnectionState::Ready {
            return Ok(());
        }

        self.state = ConnectionState::Connecting;
        match transport.connect(&self.host, auth, options).await {
            Ok(session) => {
                debug!(host = %self.host, "connection ready");
                self.session = Some(session);
                self.state = ConnectionState::Ready;
                Ok(())
            }
            Err(e) => {
                self.state = ConnectionState::Failed;
                Err(e)
            }
        }
    }

    /// Run exactly one command, blocking until completion or the
    /// per-command timeout (`spec.timeout`, falling back to
    /// `default_timeout`; zero means unlimited).
    ///
    /// Always returns an attempt record; transport errors and timeouts
    /// are captured in it and move the connection to `Failed`.
    pub async fn execute(
        &mut self,
        attempt: u32,
        spec: &CommandSpec,
        default_timeout: Duration,
    ) -> ExecutionAttempt {
        let started_at = Utc::now();

        if self.state != ConnectionState::Ready {
            let err = Error::ConnectionLost(format!(
                "connection to {} refuses commands (state: {:?})",
                self.host, self.state
            ));
            return ExecutionAttempt::failed(
                attempt,
                started_at,
                AttemptOutcome::ConnectionLost,
                false,
                &err,
            );
        }
        let Some(session) = self.session.as_mut() else {
            let err = Error::ConnectionLost(format!(
                "connection to {} has no transport session",
                self.host
            ));
            return ExecutionAttempt::failed(
                attempt,
                started_at,
                AttemptOutcome::ConnectionLost,
                false,
                &err,
            );
        };

        let timeout = spec.timeout.unwrap_or(default_timeout);
        let exec = session.exec(&spec.command);

        let outcome = if timeout.is_zero() {
            // Unlimited
            exec.await
        } else {
            match tokio::time::timeout(timeout, exec).await {
                Ok(result) => result,
                Err(_) => {
                    // The channel is abandoned mid-command; the session
                    // cannot be trusted for further commands.
                    warn!(host = %self.host, ?timeout, command = %spec.command, "command timed out");
                    self.state = ConnectionState::Failed;
                    self.session = None;
                    let err = Error::Timeout {
                        operation: format!("command on {}", self.host),
                        seconds: timeout.as_secs(),
                    };
                    return ExecutionAttempt::failed(
                        attempt,
                        started_at,
                        AttemptOutcome::Timeout,
                        true,
                        &err,
                    );
                }
            }
        };

        match outcome {
            Ok(output) => ExecutionAttempt::completed(
                attempt,
                started_at,
                Some(output.exit_status),
                &output.stdout,
                &output.stderr,
            ),
            Err(e) => {
                warn!(host = %self.host, error = %e, "transport error during command");
                self.state = ConnectionState::Failed;
                self.session = None;
                ExecutionAttempt::failed(
                    attempt,
                    started_at,
                    AttemptOutcome::ConnectionLost,
                    true,
                    &e,
                )
            }
        }
    }

    /// Release the transport. Idempotent: closing an already-closed
    /// connection is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.close().await {
                debug!(host = %self.host, error = %e, "error while closing session");
            }
        }
        self.state = ConnectionState::Closed;
        Ok(())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("state", &self.state)
            .finish()
    }
}

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

//! Connection pooling keyed by host identity.
//!
//! The pool enforces two concurrency caps: `max_per_host` connections to
//! any one host identity, and `max_total` across the pool. Callers beyond
//! a cap wait rather than opening extra connections; a wait that exceeds
//! `acquire_timeout` fails with `PoolExhausted`. An acquired connection is
//! held exclusively through a [`PooledConnection`] guard whose semaphore
//! permits are not returned until the guard is released, evicted, or
//! dropped — that guard is what makes the per-host cap an invariant
//! rather than a best effort.
//!
//! The idle registry is the only shared mutable state; every mutation
//! happens under one async mutex, and the lock is never held across a
//! transport await.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::credentials::CredentialSource;
use crate::error::{Error, Result};
use crate::host::HostDescriptor;
use crate::ssh::connection::Connection;
use crate::ssh::transport::{ConnectOptions, Transport};

/// Concurrency and wait limits for a pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum concurrently-open connections per host identity.
    pub max_per_host: usize,
    /// Maximum concurrently-open connections across the whole pool.
    pub max_total: usize,
    /// How long `acquire` may wait for a permit before failing with
    /// `PoolExhausted`.
    pub acquire_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_per_host: 4,
            max_total: 32,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Default)]
struct PoolState {
    idle: HashMap<String, Vec<Connection>>,
    per_host: HashMap<String, Arc<Semaphore>>,
    shut_down: bool,
}

/// Pool of SSH connections, an owned and injectable instance (never a
/// process-wide singleton): multiple pools coexist in one process.
pub struct ConnectionPool {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    connect_options: ConnectOptions,
    config: PoolConfig,
    total: Arc<Semaphore>,
    state: Mutex<PoolState>,
}

impl ConnectionPool {
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
        connect_options: ConnectOptions,
        config: PoolConfig,
    ) -> Self {
        let total = Arc::new(Semaphore::new(config.max_total.max(1)));
        Self {
            transport,
            credentials,
            connect_options,
            config,
            total,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Get a Ready connection for `host`, reusing an idle one or opening
    /// a new one lazily. Waits for per-host and pool-wide capacity, up to
    /// the acquire deadline.
    pub async fn acquire(&self, host: &HostDescriptor) -> Result<PooledConnection> {
        let key = host.id();
        let deadline = Instant::now() + self.config.acquire_timeout;

        let host_sem = {
            let mut state = self.state.lock().await;
            if state.shut_down {
                return Err(Error::internal("pool is shut down"));
            }
            state
                .per_host
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(self.config.max_per_host.max(1))))
                .clone()
        };

        let exhausted = || Error::PoolExhausted { host: key.clone() };

        let total_permit = tokio::time::timeout_at(deadline, self.total.clone().acquire_owned())
            .await
            .map_err(|_| exhausted())?
            .map_err(|_| Error::internal("pool semaphore closed"))?;
        let host_permit = tokio::time::timeout_at(deadline, host_sem.acquire_owned())
            .await
            .map_err(|_| exhausted())?
            .map_err(|_| Error::internal("pool semaphore closed"))?;

        // Reuse an idle connection when one is still live; stale ones
        // are discarded and replaced.
        let reused = {
            let mut state = self.state.lock().await;
            state.idle.get_mut(&key).and_then(Vec::pop)
        };

        let mut connection = match reused {
            Some(conn) if conn.is_live() => {
                trace!(host = %host, "reusing idle connection");
                conn
            }
            Some(mut stale) => {
                debug!(host = %host, "discarding stale idle connection");
                let _ = stale.close().await;
                Connection::new(host.clone())
            }
            None => Connection::new(host.clone()),
        };

        if !connection.is_ready() {
            let auth = self.credentials.resolve(host)?;
            connection
                .open(self.transport.as_ref(), &auth, &self.connect_options)
                .await?;
        }

        Ok(PooledConnection {
            connection,
            _host_permit: host_permit,
            _total_permit: total_permit,
        })
    }

    /// Return a connection to the pool. Ready connections go back to the
    /// idle set for reuse; anything else is closed and discarded.
    pub async fn release(&self, pooled: PooledConnection) {
        let PooledConnection {
            mut connection,
            _host_permit,
            _total_permit,
        } = pooled;

        if connection.is_live() {
            let key = connection.host().id();
            let mut state = self.state.lock().await;
            if !state.shut_down {
                trace!(host = %connection.host(), "returning connection to idle set");
                state.idle.entry(key).or_default().push(connection);
                return;
            }
        }

        let _ = connection.close().await;
        // Permits drop here, freeing per-host and pool-wide capacity.
    }

    /// Close a connection and remove it from the pool permanently.
    pub async fn evict(&self, pooled: PooledConnection) {
        let PooledConnection {
            mut connection,
            _host_permit,
            _total_permit,
        } = pooled;
        debug!(host = %connection.host(), state = ?connection.state(), "evicting connection");
        let _ = connection.close().await;
    }

    /// Close all idle connections and refuse further acquisition. Safe
    /// to call more than once.
    pub async fn shutdown(&self) {
        let drained: Vec<Connection> = {
            let mut state = self.state.lock().await;
            state.shut_down = true;
            state.idle.drain().flat_map(|(_, conns)| conns).collect()
        };

        if !drained.is_empty() {
            debug!(count = drained.len(), "closing idle connections");
        }
        for mut conn in drained {
            if let Err(e) = conn.close().await {
                warn!(host = %conn.host(), error = %e, "error closing pooled connection");
            }
        }
    }

    /// Number of idle connections currently held.
    pub async fn idle_count(&self) -> usize {
        let state = self.state.lock().await;
        state.idle.values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("config", &self.config)
            .finish()
    }
}

/// Exclusive hand-out of one pooled connection.
///
/// Holds the pool's per-host and pool-wide permits for as long as it
/// lives. Prefer returning it through [`ConnectionPool::release`] or
/// [`ConnectionPool::evict`]; merely dropping the guard frees the
/// capacity but discards the connection without an orderly close.
pub struct PooledConnection {
    connection: Connection,
    _host_permit: OwnedSemaphorePermit,
    _total_permit: OwnedSemaphorePermit,
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.connection
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("connection", &self.connection)
            .finish()
    }
}

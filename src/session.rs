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

//! Top-level orchestrator façade.
//!
//! Composes the pool, the dispatcher, and the normalizer; this is the
//! only type external callers drive. Each `run` call is an independent
//! batch: Idle → Dispatching → {Completed, PartiallyFailed,
//! TotallyFailed}, with no state carried between batches beyond the
//! pooled connections themselves.

use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::command::CommandSpec;
use crate::config::OrchestratorConfig;
use crate::credentials::{CredentialSource, EnvCredentialSource};
use crate::executor::{BatchResult, Dispatcher, RetryPolicy};
use crate::host::HostDescriptor;
use crate::normalize::normalize;
use crate::ssh::client::RusshTransport;
use crate::ssh::pool::ConnectionPool;
use crate::ssh::transport::Transport;

/// Remote session orchestrator.
///
/// Owns the connection pool lifecycle: the pool is created lazily on the
/// first `run` and torn down by [`shutdown`](Self::shutdown). The
/// orchestrator is cheap to construct and safe to share behind an `Arc`;
/// concurrent `run` calls are independent batches drawing on the same
/// pool.
pub struct SessionOrchestrator {
    config: OrchestratorConfig,
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialSource>,
    pool: Mutex<Option<Arc<ConnectionPool>>>,
}

impl SessionOrchestrator {
    /// Build an orchestrator over an explicit transport and credential
    /// source. This is the constructor tests use to substitute scripted
    /// transports.
    pub fn new(
        config: OrchestratorConfig,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialSource>,
    ) -> Self {
        Self {
            config,
            transport,
            credentials,
            pool: Mutex::new(None),
        }
    }

    /// Build an orchestrator with the production SSH transport and
    /// environment-backed credentials.
    pub fn with_defaults(config: OrchestratorConfig) -> Self {
        Self::new(
            config,
            Arc::new(RusshTransport::new()),
            Arc::new(EnvCredentialSource::new()),
        )
    }

    /// Execute one command across `hosts` and collect the aggregate
    /// result. Never fails as a whole: per-host failures are recorded in
    /// the returned batch.
    pub async fn run(
        &self,
        hosts: &[HostDescriptor],
        spec: &CommandSpec,
        policy: &RetryPolicy,
    ) -> BatchResult {
        self.run_with_cancel(hosts, spec, policy, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), with a caller-held cancellation handle.
    /// Cancelling mid-batch makes every not-yet-completed host report a
    /// Cancelled outcome.
    pub async fn run_with_cancel(
        &self,
        hosts: &[HostDescriptor],
        spec: &CommandSpec,
        policy: &RetryPolicy,
        cancel: CancellationToken,
    ) -> BatchResult {
        let pool = self.pool_handle().await;
        let dispatcher = Dispatcher::new(pool, self.config.command_timeout());

        info!(
            hosts = hosts.len(),
            command = %spec.command,
            max_attempts = policy.effective_max_attempts(),
            "dispatching batch"
        );

        let mut batch = dispatcher
            .dispatch(hosts, spec, policy, &cancel, self.config.batch_timeout())
            .await;

        // Normalization runs after dispatch and never changes outcomes:
        // a schema violation is recorded next to the result it belongs to.
        for result in batch.results.values_mut() {
            if !result.is_success() {
                continue;
            }
            match normalize(result.final_attempt(), &spec.schema) {
                Ok(payload) => result.payload = Some(payload),
                Err(e) => {
                    warn!(host = %result.host, error = %e, "output failed validation");
                    result.validation_error = Some(e);
                }
            }
        }

        info!(
            state = ?batch.state,
            succeeded = batch.success_count(),
            failed = batch.failure_count(),
            "batch finished"
        );
        batch
    }

    /// Close all pooled connections. Safe to call multiple times; a
    /// subsequent `run` builds a fresh pool.
    pub async fn shutdown(&self) {
        let pool = self.pool.lock().await.take();
        if let Some(pool) = pool {
            pool.shutdown().await;
        }
    }

    async fn pool_handle(&self) -> Arc<ConnectionPool> {
        let mut slot = self.pool.lock().await;
        if let Some(pool) = slot.as_ref() {
            return Arc::clone(pool);
        }
        let pool = Arc::new(ConnectionPool::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.credentials),
            self.config.connect_options(),
            self.config.pool_config(),
        ));
        *slot = Some(Arc::clone(&pool));
        pool
    }
}

impl std::fmt::Debug for SessionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("config", &self.config)
            .finish()
    }
}

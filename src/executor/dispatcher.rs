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

//! Command fan-out across hosts.
//!
//! One tokio task per host; results are merged by a single collector so
//! no result state is shared during the fan-out. Backpressure comes from
//! the pool's concurrency caps, not from the spawn count. A host whose
//! every attempt fails contributes a failed entry without disturbing any
//! other host.

use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::command::CommandSpec;
use crate::error::{Error, ErrorKind};
use crate::executor::result_types::{
    AttemptOutcome, BatchResult, ExecutionAttempt, ExecutionResult,
};
use crate::executor::retry::{backoff_delay, should_retry, RetryPolicy};
use crate::host::HostDescriptor;
use crate::ssh::pool::ConnectionPool;

/// Fans a command out across a set of hosts through a shared pool.
pub struct Dispatcher {
    pool: Arc<ConnectionPool>,
    default_command_timeout: Duration,
}

impl Dispatcher {
    pub fn new(pool: Arc<ConnectionPool>, default_command_timeout: Duration) -> Self {
        Self {
            pool,
            default_command_timeout,
        }
    }

    /// Execute `spec` on every host, independently and concurrently.
    ///
    /// Returns one entry per requested host (duplicates collapse to one).
    /// `cancel` aborts in-flight work; hosts that have not completed when
    /// it fires contribute a Cancelled outcome. `batch_deadline`, when
    /// set, cancels the batch after the given duration.
    pub async fn dispatch(
        &self,
        hosts: &[HostDescriptor],
        spec: &CommandSpec,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        batch_deadline: Option<Duration>,
    ) -> BatchResult {
        let hosts = dedup_hosts(hosts);

        let watchdog = batch_deadline.map(|deadline| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                warn!(?deadline, "batch deadline elapsed, cancelling remaining hosts");
                cancel.cancel();
            })
        });

        let tasks: Vec<_> = hosts
            .iter()
            .map(|host| {
                let pool = Arc::clone(&self.pool);
                let host = host.clone();
                let spec = spec.clone();
                let policy = policy.clone();
                let cancel = cancel.clone();
                let default_timeout = self.default_command_timeout;

                tokio::spawn(async move {
                    run_host(pool, host, spec, policy, cancel, default_timeout).await
                })
            })
            .collect();

        let joined = join_all(tasks).await;

        if let Some(watchdog) = watchdog {
            watchdog.abort();
        }

        // Merge, synthesizing a failed entry for any task that panicked
        // so the one-entry-per-host invariant holds regardless.
        let mut results = Vec::with_capacity(hosts.len());
        for (host, task_result) in hosts.into_iter().zip(joined) {
            match task_result {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!(host = %host, error = %e, "host task failed");
                    let err = Error::internal(format!("host task failed: {e}"));
                    let attempt = ExecutionAttempt::failed(
                        1,
                        Utc::now(),
                        AttemptOutcome::Failure,
                        false,
                        &err,
                    );
                    results.push(ExecutionResult::new(host, vec![attempt]));
                }
            }
        }

        BatchResult::from_results(results)
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("default_command_timeout", &self.default_command_timeout)
            .finish()
    }
}

/// Drop duplicate host identities, keeping first-seen order.
fn dedup_hosts(hosts: &[HostDescriptor]) -> Vec<HostDescriptor> {
    let mut seen = HashSet::new();
    hosts
        .iter()
        .filter(|h| seen.insert(h.id()))
        .cloned()
        .collect()
}

/// Run the full attempt loop for one host.
async fn run_host(
    pool: Arc<ConnectionPool>,
    host: HostDescriptor,
    spec: CommandSpec,
    policy: RetryPolicy,
    cancel: CancellationToken,
    default_timeout: Duration,
) -> ExecutionResult {
    let mut attempts: Vec<ExecutionAttempt> = Vec::new();
    let max_attempts = policy.effective_max_attempts();

    for attempt_no in 1..=max_attempts {
        if cancel.is_cancelled() {
            attempts.push(ExecutionAttempt::cancelled(attempt_no));
            break;
        }

        let attempt = tokio::select! {
            _ = cancel.cancelled() => ExecutionAttempt::cancelled(attempt_no),
            attempt = run_attempt(&pool, &host, attempt_no, &spec, default_timeout) => attempt,
        };

        let retry = attempt.outcome != AttemptOutcome::Cancelled
            && should_retry(&attempt, &spec, &policy);
        let failed_outcome = attempt.outcome;
        attempts.push(attempt);

        if !retry {
            break;
        }

        let delay = backoff_delay(attempt_no, &policy);
        debug!(
            host = %host,
            attempt = attempt_no,
            outcome = ?failed_outcome,
            ?delay,
            "retrying after backoff"
        );
        tokio::select! {
            _ = cancel.cancelled() => {
                attempts.push(ExecutionAttempt::cancelled(attempt_no + 1));
                break;
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }

    ExecutionResult::new(host, attempts)
}

/// One attempt: acquire a connection, run the command, hand the
/// connection back (or evict it when it is no longer trustworthy).
async fn run_attempt(
    pool: &ConnectionPool,
    host: &HostDescriptor,
    attempt_no: u32,
    spec: &CommandSpec,
    default_timeout: Duration,
) -> ExecutionAttempt {
    let started_at = Utc::now();

    let mut pooled = match pool.acquire(host).await {
        Ok(pooled) => pooled,
        Err(e) => {
            warn!(host = %host, attempt = attempt_no, error = %e, "could not acquire connection");
            let outcome = match e.kind() {
                ErrorKind::Timeout => AttemptOutcome::Timeout,
                ErrorKind::Auth | ErrorKind::Unreachable | ErrorKind::ConnectionLost => {
                    AttemptOutcome::ConnectionLost
                }
                // Pool exhaustion and anything unclassified are final
                // for this host.
                _ => AttemptOutcome::Failure,
            };
            return ExecutionAttempt::failed(attempt_no, started_at, outcome, false, &e);
        }
    };

    let attempt = pooled.execute(attempt_no, spec, default_timeout).await;

    match attempt.outcome {
        // The connection survived the command; hand it back for reuse.
        AttemptOutcome::Success | AttemptOutcome::Failure => pool.release(pooled).await,
        _ => pool.evict(pooled).await,
    }

    attempt
}

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

//! Retry policy and the pure decision functions consuming it.
//!
//! The dispatcher never decides retries inline; it asks [`should_retry`]
//! and [`backoff_delay`], which are plain functions over values and can
//! be tested without any I/O.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::command::CommandSpec;
use crate::error::ErrorKind;
use crate::executor::result_types::{AttemptOutcome, ExecutionAttempt};

/// Retry/backoff configuration for a dispatch.
///
/// Delay between attempts grows exponentially: `base_delay_ms * 2^(n-1)`
/// for the n-th failed attempt, capped at `max_delay_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts per host, including the first. Values below 1 are
    /// treated as 1.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Decide whether the dispatcher should run another attempt after
/// `attempt` failed.
///
/// Retryable failures are `Timeout` and `ConnectionLost`, and only when
/// the command is idempotent or never started (a connection-phase failure
/// cannot have caused remote side effects). Auth rejections are
/// deterministic and never retried; pool exhaustion is final for the
/// host by policy. Logical command failures (`Failure`) and `Cancelled`
/// are never retried.
pub fn should_retry(attempt: &ExecutionAttempt, spec: &CommandSpec, policy: &RetryPolicy) -> bool {
    if attempt.attempt >= policy.effective_max_attempts() {
        return false;
    }

    match attempt.outcome {
        AttemptOutcome::Success | AttemptOutcome::Failure | AttemptOutcome::Cancelled => false,
        AttemptOutcome::Timeout | AttemptOutcome::ConnectionLost => {
            if matches!(
                attempt.error_kind(),
                Some(ErrorKind::Auth | ErrorKind::PoolExhausted)
            ) {
                return false;
            }
            spec.idempotent || !attempt.command_started
        }
    }
}

/// Backoff before the attempt following the `attempt`-th (1-based) failure.
pub fn backoff_delay(attempt: u32, policy: &RetryPolicy) -> Duration {
    // Shift is clamped so pathological policies cannot overflow u64.
    let exp = attempt.saturating_sub(1).min(20);
    let delay = policy.base_delay_ms.saturating_mul(1u64 << exp);
    Duration::from_millis(delay.min(policy.max_delay_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use chrono::Utc;

    fn lost_attempt(n: u32, command_started: bool) -> ExecutionAttempt {
        ExecutionAttempt::failed(
            n,
            Utc::now(),
            AttemptOutcome::ConnectionLost,
            command_started,
            &Error::ConnectionLost("peer reset".to_string()),
        )
    }

    fn timeout_attempt(n: u32, command_started: bool) -> ExecutionAttempt {
        ExecutionAttempt::failed(
            n,
            Utc::now(),
            AttemptOutcome::Timeout,
            command_started,
            &Error::Timeout {
                operation: "exec".to_string(),
                seconds: 5,
            },
        )
    }

    #[test]
    fn test_idempotent_retries_connection_lost() {
        let spec = CommandSpec::new("uptime").idempotent(true);
        let policy = RetryPolicy::default();

        assert!(should_retry(&lost_attempt(1, true), &spec, &policy));
        assert!(should_retry(&timeout_attempt(2, true), &spec, &policy));
        // Exhausted
        assert!(!should_retry(&lost_attempt(3, true), &spec, &policy));
    }

    #[test]
    fn test_non_idempotent_never_retries_started_command() {
        let spec = CommandSpec::new("rm -rf /tmp/scratch");
        let policy = RetryPolicy::default();

        assert!(!should_retry(&lost_attempt(1, true), &spec, &policy));
        assert!(!should_retry(&timeout_attempt(1, true), &spec, &policy));
    }

    #[test]
    fn test_connection_phase_failure_always_retryable() {
        // The command never reached the host, so even a non-idempotent
        // command is safe to try again.
        let spec = CommandSpec::new("rm -rf /tmp/scratch");
        let policy = RetryPolicy::default();

        assert!(should_retry(&lost_attempt(1, false), &spec, &policy));
        assert!(should_retry(&timeout_attempt(1, false), &spec, &policy));
    }

    #[test]
    fn test_auth_and_pool_exhaustion_are_final() {
        let spec = CommandSpec::new("uptime").idempotent(true);
        let policy = RetryPolicy::default();

        let auth = ExecutionAttempt::failed(
            1,
            Utc::now(),
            AttemptOutcome::ConnectionLost,
            false,
            &Error::Auth {
                host: "a".to_string(),
                reason: "bad key".to_string(),
            },
        );
        assert!(!should_retry(&auth, &spec, &policy));

        let exhausted = ExecutionAttempt::failed(
            1,
            Utc::now(),
            AttemptOutcome::Failure,
            false,
            &Error::PoolExhausted {
                host: "a".to_string(),
            },
        );
        assert!(!should_retry(&exhausted, &spec, &policy));
    }

    #[test]
    fn test_logical_failure_never_retried() {
        let spec = CommandSpec::new("uptime").idempotent(true);
        let policy = RetryPolicy::default();

        let failed = ExecutionAttempt::completed(1, Utc::now(), Some(1), b"", b"err");
        assert!(!should_retry(&failed, &spec, &policy));

        let succeeded = ExecutionAttempt::completed(1, Utc::now(), Some(0), b"ok", b"");
        assert!(!should_retry(&succeeded, &spec, &policy));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };

        assert_eq!(backoff_delay(1, &policy), Duration::from_millis(100));
        assert_eq!(backoff_delay(2, &policy), Duration::from_millis(200));
        assert_eq!(backoff_delay(3, &policy), Duration::from_millis(400));
        assert_eq!(backoff_delay(4, &policy), Duration::from_millis(800));
        // Capped
        assert_eq!(backoff_delay(5, &policy), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(40, &policy), Duration::from_millis(1_000));
    }

    #[test]
    fn test_zero_max_attempts_behaves_as_one() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.effective_max_attempts(), 1);

        let spec = CommandSpec::new("uptime").idempotent(true);
        assert!(!should_retry(&lost_attempt(1, false), &spec, &policy));
    }
}

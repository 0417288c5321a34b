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

//! Result types for dispatch operations.
//!
//! Everything here is `Serialize`: a `BatchResult` is the stable contract
//! handed to whatever renders or ships the data, independent of any
//! rendering choice.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{Error, ErrorKind, ValidationError};
use crate::host::HostDescriptor;
use crate::normalize::Payload;

/// Captured stdout/stderr are truncated to this many bytes per stream.
/// Keeps a runaway command from pinning the batch in memory.
pub const MAX_CAPTURE_BYTES: usize = 1024 * 1024;

/// Terminal classification of a single execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Command ran and exited 0.
    Success,
    /// Command ran and exited nonzero, or the attempt failed in a way
    /// that is final for this host (e.g. pool exhaustion).
    Failure,
    /// The connect or command deadline elapsed.
    Timeout,
    /// The transport failed before or during the command.
    ConnectionLost,
    /// The batch was cancelled before this attempt completed.
    Cancelled,
}

/// Classified error recorded on a failed attempt.
#[derive(Debug, Clone, Serialize)]
pub struct AttemptError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&Error> for AttemptError {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// One execution attempt against one host.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionAttempt {
    /// 1-based attempt number within the host's retry sequence.
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Exit status of the remote command, when it ran to completion.
    pub exit_status: Option<u32>,
    /// Captured stdout, lossily decoded, truncated at [`MAX_CAPTURE_BYTES`].
    pub stdout: String,
    /// Captured stderr, same bounds as stdout.
    pub stderr: String,
    pub outcome: AttemptOutcome,
    /// Whether the command was handed to the remote side before the
    /// attempt failed. Drives the retry decision for non-idempotent
    /// commands: a command that never started is always safe to retry.
    pub command_started: bool,
    pub error: Option<AttemptError>,
}

impl ExecutionAttempt {
    /// Attempt for a command that ran to completion (any exit status).
    pub fn completed(
        attempt: u32,
        started_at: DateTime<Utc>,
        exit_status: Option<u32>,
        stdout: &[u8],
        stderr: &[u8],
    ) -> Self {
        let outcome = match exit_status {
            Some(0) => AttemptOutcome::Success,
            _ => AttemptOutcome::Failure,
        };
        Self {
            attempt,
            started_at,
            finished_at: Utc::now(),
            exit_status,
            stdout: bounded_capture(stdout),
            stderr: bounded_capture(stderr),
            outcome,
            command_started: true,
            error: None,
        }
    }

    /// Attempt that failed with a classified error before or during the
    /// command.
    pub fn failed(
        attempt: u32,
        started_at: DateTime<Utc>,
        outcome: AttemptOutcome,
        command_started: bool,
        error: &Error,
    ) -> Self {
        Self {
            attempt,
            started_at,
            finished_at: Utc::now(),
            exit_status: None,
            stdout: String::new(),
            stderr: String::new(),
            outcome,
            command_started,
            error: Some(AttemptError::from(error)),
        }
    }

    /// Attempt recording a batch cancellation before the command ran.
    pub fn cancelled(attempt: u32) -> Self {
        let now = Utc::now();
        Self {
            attempt,
            started_at: now,
            finished_at: now,
            exit_status: None,
            stdout: String::new(),
            stderr: String::new(),
            outcome: AttemptOutcome::Cancelled,
            command_started: false,
            error: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Truncate then lossily decode a captured output stream.
pub(crate) fn bounded_capture(bytes: &[u8]) -> String {
    let slice = if bytes.len() > MAX_CAPTURE_BYTES {
        &bytes[..MAX_CAPTURE_BYTES]
    } else {
        bytes
    };
    String::from_utf8_lossy(slice).into_owned()
}

/// Full retry history and final state for one host in a batch.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub host: HostDescriptor,
    /// Non-empty, chronologically ordered. The last attempt's outcome is
    /// the result's final outcome.
    pub attempts: Vec<ExecutionAttempt>,
    /// Normalized payload of the final attempt, when it succeeded and
    /// validated against the command's schema.
    pub payload: Option<Payload>,
    /// Schema violation recorded by the normalizer; never affects the
    /// outcome.
    pub validation_error: Option<ValidationError>,
}

impl ExecutionResult {
    pub fn new(host: HostDescriptor, attempts: Vec<ExecutionAttempt>) -> Self {
        debug_assert!(!attempts.is_empty(), "attempt sequence must be non-empty");
        Self {
            host,
            attempts,
            payload: None,
            validation_error: None,
        }
    }

    pub fn final_attempt(&self) -> &ExecutionAttempt {
        self.attempts
            .last()
            .expect("attempt sequence is non-empty by construction")
    }

    pub fn outcome(&self) -> AttemptOutcome {
        self.final_attempt().outcome
    }

    pub fn is_success(&self) -> bool {
        self.outcome() == AttemptOutcome::Success
    }

    pub fn exit_status(&self) -> Option<u32> {
        self.final_attempt().exit_status
    }
}

/// Terminal state of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    /// Every host succeeded.
    Completed,
    /// Some hosts succeeded, some did not.
    PartiallyFailed,
    /// No host succeeded.
    TotallyFailed,
}

/// Aggregate result of one dispatch: exactly one entry per requested
/// host, keyed by the host's canonical identity.
#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub results: BTreeMap<String, ExecutionResult>,
    pub state: BatchState,
}

impl BatchResult {
    pub fn from_results(results: impl IntoIterator<Item = ExecutionResult>) -> Self {
        let results: BTreeMap<String, ExecutionResult> =
            results.into_iter().map(|r| (r.host.id(), r)).collect();

        let total = results.len();
        let succeeded = results.values().filter(|r| r.is_success()).count();
        let state = if succeeded == total {
            BatchState::Completed
        } else if succeeded == 0 {
            BatchState::TotallyFailed
        } else {
            BatchState::PartiallyFailed
        };

        Self { results, state }
    }

    pub fn get(&self, host: &HostDescriptor) -> Option<&ExecutionResult> {
        self.results.get(&host.id())
    }

    pub fn success_count(&self) -> usize {
        self.results.values().filter(|r| r.is_success()).count()
    }

    pub fn failure_count(&self) -> usize {
        self.results.len() - self.success_count()
    }

    pub fn cancelled_count(&self) -> usize {
        self.results
            .values()
            .filter(|r| r.outcome() == AttemptOutcome::Cancelled)
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.state == BatchState::Completed
    }
}

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

//! Error taxonomy for the orchestrator.
//!
//! The set of error variants is closed: anything a transport or the runtime
//! produces that does not map onto one of the named variants is wrapped as
//! [`Error::Internal`] so callers can match exhaustively.

use serde::Serialize;
use thiserror::Error;

/// Errors raised by connections, the pool, and the normalizer.
#[derive(Debug, Error)]
pub enum Error {
    /// Authentication was rejected by the remote host.
    #[error("authentication failed for {host}: {reason}")]
    Auth { host: String, reason: String },

    /// The host could not be reached (DNS failure, refused connection,
    /// unroutable network).
    #[error("host unreachable: {host}: {reason}")]
    Unreachable { host: String, reason: String },

    /// A connect or command deadline elapsed.
    #[error("timed out after {seconds}s: {operation}")]
    Timeout { operation: String, seconds: u64 },

    /// The transport dropped while a command was in flight, or a command
    /// was issued against a connection that is no longer usable.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// The pool could not grant a connection within the acquire deadline.
    #[error("connection pool exhausted for {host}")]
    PoolExhausted { host: String },

    /// Command output did not match the expected schema.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Anything that escaped classification. Keeps the taxonomy closed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Classification tag, stable across message formatting changes.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth { .. } => ErrorKind::Auth,
            Error::Unreachable { .. } => ErrorKind::Unreachable,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::ConnectionLost(_) => ErrorKind::ConnectionLost,
            Error::PoolExhausted { .. } => ErrorKind::PoolExhausted,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}

// Raw russh errors surface through the transport seam (e.g. from the
// host-key check handler). They carry no classification of their own,
// so they land in the ConnectionLost bucket until the connect/exec
// paths re-classify them.
impl From<russh::Error> for Error {
    fn from(e: russh::Error) -> Self {
        Error::ConnectionLost(e.to_string())
    }
}

/// Discriminant of [`Error`], recorded on execution attempts so retry
/// decisions and serialized results can refer to the class of a failure
/// without holding the error itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    Unreachable,
    Timeout,
    ConnectionLost,
    PoolExhausted,
    Validation,
    Internal,
}

/// Errors from normalizing command output against a schema.
///
/// Malformed output is distinguished from a correctly-empty result: empty
/// stdout never produces a `ValidationError`.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    /// A line did not contain the expected `key<separator>value` shape.
    #[error("line {line}: expected 'key{separator}value', got '{content}'")]
    MalformedKeyValue {
        line: usize,
        separator: char,
        content: String,
    },

    /// The same key appeared twice in key-value output.
    #[error("line {line}: duplicate key '{key}'")]
    DuplicateKey { line: usize, key: String },

    /// A table row had the wrong number of columns.
    #[error("line {line}: expected {expected} columns, found {found}")]
    ColumnCountMismatch {
        line: usize,
        expected: usize,
        found: usize,
    },

    /// The table header did not match the declared column names.
    #[error("header mismatch: expected {expected:?}, found {found:?}")]
    HeaderMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },
}

/// A result type using the orchestrator error taxonomy.
pub type Result<T> = std::result::Result<T, Error>;

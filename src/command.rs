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

use std::time::Duration;

use crate::normalize::OutputSchema;

/// A command to execute on remote hosts, with its execution policy knobs.
///
/// `idempotent` declares that re-running the command has no differing side
/// effects; only idempotent commands are retried after a failure that may
/// have already started the command (see
/// [`should_retry`](crate::executor::should_retry)).
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// The command line passed verbatim to the remote shell.
    pub command: String,
    /// Per-command timeout, overriding the orchestrator default.
    /// `Duration::ZERO` means unlimited.
    pub timeout: Option<Duration>,
    /// Whether the command is safe to execute more than once.
    pub idempotent: bool,
    /// Expected shape of stdout, applied by the normalizer.
    pub schema: OutputSchema,
}

impl CommandSpec {
    /// Create a spec with defaults: no timeout override, non-idempotent,
    /// raw output.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            timeout: None,
            idempotent: false,
            schema: OutputSchema::Raw,
        }
    }

    /// Set a per-command timeout override.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Mark the command as safe to retry.
    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    /// Set the expected output schema.
    pub fn with_schema(mut self, schema: OutputSchema) -> Self {
        self.schema = schema;
        self
    }
}

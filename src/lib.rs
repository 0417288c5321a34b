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

//! Remote session orchestration over SSH.
//!
//! The crate manages pooled SSH connections to a set of hosts, fans
//! commands out across them with timeout/retry/backoff handling, and
//! normalizes the captured output into validated, serializable records.
//! [`SessionOrchestrator`] is the entry point; everything else is the
//! machinery behind it.

pub mod command;
pub mod config;
pub mod credentials;
pub mod error;
pub mod executor;
pub mod host;
pub mod logging;
pub mod normalize;
pub mod session;
pub mod ssh;

pub use command::CommandSpec;
pub use config::OrchestratorConfig;
pub use credentials::{CredentialSource, EnvCredentialSource, StaticCredentialSource};
pub use error::{Error, ErrorKind, Result, ValidationError};
pub use executor::{
    AttemptOutcome, BatchResult, BatchState, Dispatcher, ExecutionAttempt, ExecutionResult,
    RetryPolicy,
};
pub use host::HostDescriptor;
pub use normalize::{normalize, OutputSchema, Payload};
pub use session::SessionOrchestrator;

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

//! Credential resolution for connection setup.
//!
//! The core only requires the capability "resolve credentials for a host";
//! it never stores authentication material beyond the handshake. Resolved
//! secrets are zeroized on drop (see [`AuthMethod`]).

use crate::error::{Error, Result};
use crate::host::HostDescriptor;
use crate::ssh::auth::AuthMethod;

/// Capability to produce authentication material for a host, consumed by
/// the pool each time it opens a connection.
pub trait CredentialSource: Send + Sync {
    fn resolve(&self, host: &HostDescriptor) -> Result<AuthMethod>;
}

/// Fixed authentication material for every host. The usual choice for
/// embedders that already hold credentials, and for tests.
#[derive(Debug, Clone)]
pub struct StaticCredentialSource {
    auth: AuthMethod,
}

impl StaticCredentialSource {
    pub fn new(auth: AuthMethod) -> Self {
        Self { auth }
    }
}

impl CredentialSource for StaticCredentialSource {
    fn resolve(&self, _host: &HostDescriptor) -> Result<AuthMethod> {
        Ok(self.auth.clone())
    }
}

/// Credentials from the process environment, optionally seeded from a
/// `.env` file next to the working directory.
///
/// Resolution order:
/// 1. `FLEETRUN_SSH_KEY` (with optional `FLEETRUN_SSH_KEY_PASSPHRASE`)
/// 2. `FLEETRUN_SSH_PASSWORD`
/// 3. The SSH agent, when `SSH_AUTH_SOCK` is set
#[derive(Debug, Default)]
pub struct EnvCredentialSource;

impl EnvCredentialSource {
    /// Load `.env` if present, then read from the process environment.
    pub fn new() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded environment file");
        }
        Self
    }
}

impl CredentialSource for EnvCredentialSource {
    fn resolve(&self, host: &HostDescriptor) -> Result<AuthMethod> {
        if let Ok(key_path) = std::env::var("FLEETRUN_SSH_KEY") {
            let passphrase = std::env::var("FLEETRUN_SSH_KEY_PASSPHRASE").ok();
            return Ok(AuthMethod::with_key_file(key_path, passphrase.as_deref()));
        }

        if let Ok(password) = std::env::var("FLEETRUN_SSH_PASSWORD") {
            return Ok(AuthMethod::with_password(&password));
        }

        #[cfg(not(target_os = "windows"))]
        if std::env::var("SSH_AUTH_SOCK").is_ok() {
            return Ok(AuthMethod::with_agent());
        }

        Err(Error::Auth {
            host: host.id(),
            reason: "no credentials configured (set FLEETRUN_SSH_KEY or FLEETRUN_SSH_PASSWORD, \
                     or run an SSH agent)"
                .to_string(),
        })
    }
}

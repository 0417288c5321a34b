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

//! Authentication material and host-key verification policy.
//!
//! Secret strings are wrapped in [`Zeroizing`] so they are wiped when the
//! method value is dropped; credential values live only for the duration
//! of a connection handshake.

use std::path::{Path, PathBuf};
use zeroize::Zeroizing;

/// An authentication token used when opening a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthMethod {
    Password(Zeroizing<String>),
    PrivateKeyFile {
        key_file_path: PathBuf,
        passphrase: Option<Zeroizing<String>>,
    },
    /// Authenticate with every identity the SSH agent offers, in order.
    /// Requires `SSH_AUTH_SOCK`.
    #[cfg(not(target_os = "windows"))]
    Agent,
}

impl AuthMethod {
    pub fn with_password(password: &str) -> Self {
        Self::Password(Zeroizing::new(password.to_string()))
    }

    pub fn with_key_file<T: AsRef<Path>>(key_file_path: T, passphrase: Option<&str>) -> Self {
        Self::PrivateKeyFile {
            key_file_path: key_file_path.as_ref().to_path_buf(),
            passphrase: passphrase.map(|p| Zeroizing::new(p.to_string())),
        }
    }

    #[cfg(not(target_os = "windows"))]
    pub fn with_agent() -> Self {
        Self::Agent
    }
}

/// How to verify the remote host key during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum HostKeyCheck {
    /// Accept any host key. Only for test rigs and throwaway hosts.
    Off,
    /// Check against `~/.ssh/known_hosts`.
    #[default]
    DefaultKnownHosts,
    /// Check against a specific known-hosts file.
    KnownHostsFile(PathBuf),
}

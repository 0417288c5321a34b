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

//! russh-backed [`Transport`] implementation.
//!
//! One [`RusshSession`] wraps one authenticated `russh` handle. Commands
//! run over per-exec channels; stdout/stderr/exit status are collected
//! from the channel message stream.

use async_trait::async_trait;
use russh::client::{Config, Handle, Handler};
use std::fmt::Debug;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::host::HostDescriptor;
use crate::ssh::auth::{AuthMethod, HostKeyCheck};
use crate::ssh::transport::{ConnectOptions, ExecOutput, Transport, TransportSession};

/// Production SSH transport.
#[derive(Debug, Default)]
pub struct RusshTransport;

impl RusshTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for RusshTransport {
    async fn connect(
        &self,
        host: &HostDescriptor,
        auth: &AuthMethod,
        options: &ConnectOptions,
    ) -> Result<Box<dyn TransportSession>> {
        let mut config = Config::default();
        config.keepalive_interval = options.keepalive_interval;
        let config = Arc::new(config);

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host.host.as_str(), host.port))
            .await
            .map_err(|e| Error::Unreachable {
                host: host.address(),
                reason: format!("could not resolve hostname: {e}"),
            })?
            .collect();

        if addrs.is_empty() {
            return Err(Error::Unreachable {
                host: host.address(),
                reason: "hostname resolved to no addresses".to_string(),
            });
        }

        // Try each resolved address; authentication runs on the first
        // address that accepts a TCP + SSH handshake.
        let mut last_err = Error::Unreachable {
            host: host.address(),
            reason: "no addresses attempted".to_string(),
        };
        for addr in addrs {
            let handler = ClientHandler {
                hostname: host.host.clone(),
                port: host.port,
                check: options.host_key_check.clone(),
            };

            let connect = russh::client::connect(config.clone(), addr, handler);
            match tokio::time::timeout(options.connect_timeout, connect).await {
                Ok(Ok(mut handle)) => {
                    debug!(host = %host, %addr, "transport established, authenticating");
                    authenticate(&mut handle, host, auth).await?;
                    return Ok(Box::new(RusshSession {
                        handle,
                        host: host.clone(),
                    }));
                }
                Ok(Err(e)) => {
                    last_err = Error::Unreachable {
                        host: host.address(),
                        reason: e.to_string(),
                    };
                }
                Err(_) => {
                    last_err = Error::Timeout {
                        operation: format!("connect to {}", host.address()),
                        seconds: options.connect_timeout.as_secs(),
                    };
                }
            }
        }

        Err(last_err)
    }
}

/// Authenticate an established handle with the given method.
async fn authenticate(
    handle: &mut Handle<ClientHandler>,
    host: &HostDescriptor,
    auth: &AuthMethod,
) -> Result<()> {
    let auth_err = |reason: &str| Error::Auth {
        host: host.id(),
        reason: reason.to_string(),
    };

    match auth {
        AuthMethod::Password(password) => {
            let result = handle
                .authenticate_password(&host.username, password.as_str())
                .await
                .map_err(|e| auth_err(&e.to_string()))?;
            if !result.success() {
                return Err(auth_err("password rejected"));
            }
        }
        AuthMethod::PrivateKeyFile {
            key_file_path,
            passphrase,
        } => {
            let key = russh::keys::load_secret_key(
                key_file_path,
                passphrase.as_ref().map(|p| p.as_str()),
            )
            .map_err(|e| auth_err(&format!("cannot load key: {e}")))?;

            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(|e| auth_err(&e.to_string()))?
                .flatten();
            let result = handle
                .authenticate_publickey(
                    &host.username,
                    russh::keys::PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
                .map_err(|e| auth_err(&e.to_string()))?;
            if !result.success() {
                return Err(auth_err("key rejected"));
            }
        }
        #[cfg(not(target_os = "windows"))]
        AuthMethod::Agent => {
            let mut agent = russh::keys::agent::client::AgentClient::connect_env()
                .await
                .map_err(|_| auth_err("SSH agent not available"))?;

            let identities = agent
                .request_identities()
                .await
                .map_err(|_| auth_err("could not list agent identities"))?;
            if identities.is_empty() {
                return Err(auth_err("no identities available in SSH agent"));
            }

            let hash_alg = handle
                .best_supported_rsa_hash()
                .await
                .map_err(|e| auth_err(&e.to_string()))?
                .flatten();

            let mut authenticated = false;
            for identity in identities {
                let result = handle
                    .authenticate_publickey_with(
                        &host.username,
                        identity.clone(),
                        hash_alg,
                        &mut agent,
                    )
                    .await;
                if let Ok(auth_result) = result {
                    if auth_result.success() {
                        authenticated = true;
                        break;
                    }
                }
            }
            if !authenticated {
                return Err(auth_err("all agent identities rejected"));
            }
        }
    }

    debug!(host = %host, "authenticated");
    Ok(())
}

struct RusshSession {
    handle: Handle<ClientHandler>,
    host: HostDescriptor,
}

#[async_trait]
impl TransportSession for RusshSession {
    async fn exec(&mut self, command: &str) -> Result<ExecOutput> {
        let lost = |e: russh::Error| Error::ConnectionLost(e.to_string());

        let mut channel = self.handle.channel_open_session().await.map_err(lost)?;
        channel.exec(true, command).await.map_err(lost)?;

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_status: Option<u32> = None;

        // Drain the channel until it closes. An ExitStatus message does
        // not end the stream; output may still be in flight after it.
        while let Some(msg) = channel.wait().await {
            match msg {
                russh::ChannelMsg::Data { ref data } => {
                    stdout.extend_from_slice(data);
                }
                russh::ChannelMsg::ExtendedData { ref data, ext } => {
                    if ext == 1 {
                        stderr.extend_from_slice(data);
                    }
                }
                russh::ChannelMsg::ExitStatus { exit_status: code } => {
                    exit_status = Some(code);
                }
                _ => {}
            }
        }

        match exit_status {
            Some(exit_status) => {
                trace!(host = %self.host, exit_status, "command completed");
                Ok(ExecOutput {
                    exit_status,
                    stdout,
                    stderr,
                })
            }
            None => Err(Error::ConnectionLost(
                "channel closed before reporting an exit status".to_string(),
            )),
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.handle.is_closed() {
            return Ok(());
        }
        self.handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(|e| Error::ConnectionLost(e.to_string()))
    }

    fn is_open(&self) -> bool {
        !self.handle.is_closed()
    }
}

impl Debug for RusshSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusshSession")
            .field("host", &self.host)
            .field("handle", &"Handle<ClientHandler>")
            .finish()
    }
}

#[derive(Debug, Clone)]
struct ClientHandler {
    hostname: String,
    port: u16,
    check: HostKeyCheck,
}

impl Handler for ClientHandler {
    type Error = Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match &self.check {
            HostKeyCheck::Off => Ok(true),
            HostKeyCheck::DefaultKnownHosts => {
                let known =
                    russh::keys::check_known_hosts(&self.hostname, self.port, server_public_key)
                        .map_err(|e| {
                            Error::ConnectionLost(format!("host key verification: {e}"))
                        })?;
                Ok(known)
            }
            HostKeyCheck::KnownHostsFile(path) => {
                let known = russh::keys::check_known_hosts_path(
                    &self.hostname,
                    self.port,
                    server_public_key,
                    path,
                )
                .map_err(|e| Error::ConnectionLost(format!("host key verification: {e}")))?;
                Ok(known)
            }
        }
    }
}

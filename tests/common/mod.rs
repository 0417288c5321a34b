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

//! Shared test rig: a scripted in-memory transport.
//!
//! Connections are driven per-host by a queue of [`Script`] steps, one
//! step per connection. Instrumentation counts concurrently-open
//! sessions so the pool's concurrency caps can be asserted directly.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fleetrun::error::{Error, Result};
use fleetrun::ssh::{AuthMethod, ConnectOptions, ExecOutput, Transport, TransportSession};
use fleetrun::HostDescriptor;

/// Behavior of one connection to a host.
#[derive(Debug, Clone)]
pub enum Script {
    /// Connect succeeds; every exec on this connection returns this.
    Output {
        exit_status: u32,
        stdout: &'static str,
    },
    /// Connect is refused (unreachable).
    RefuseConnect,
    /// Authentication is rejected.
    RejectAuth,
    /// Connect succeeds; exec fails mid-command and kills the session.
    DropDuringExec,
    /// Connect succeeds; exec blocks until cancelled or timed out.
    Hang,
}

pub fn ok_output(stdout: &'static str) -> Script {
    Script::Output {
        exit_status: 0,
        stdout,
    }
}

#[derive(Default)]
struct Instrumentation {
    active: HashMap<String, usize>,
    max_active: HashMap<String, usize>,
    active_total: usize,
    max_active_total: usize,
    connects: usize,
}

pub struct MockTransport {
    scripts: Mutex<HashMap<String, VecDeque<Script>>>,
    default_script: Script,
    instrumentation: Arc<Mutex<Instrumentation>>,
    /// Delay inside every successful exec, so concurrency is observable.
    pub exec_delay: Duration,
}

impl MockTransport {
    /// A transport where every command prints `ok` and exits 0.
    pub fn new() -> Self {
        Self::with_default(ok_output("ok\n"))
    }

    /// A transport whose unscripted connections follow `default_script`.
    pub fn with_default(default_script: Script) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            default_script,
            instrumentation: Arc::new(Mutex::new(Instrumentation::default())),
            exec_delay: Duration::from_millis(10),
        }
    }

    /// Script the next connections to `host`, one step per connection.
    /// Once the queue drains, the default script applies again.
    pub fn script_host(&self, host: &HostDescriptor, steps: Vec<Script>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(host.id())
            .or_default()
            .extend(steps);
    }

    /// Peak number of concurrently-open sessions to `host`.
    pub fn max_active(&self, host: &HostDescriptor) -> usize {
        self.instrumentation
            .lock()
            .unwrap()
            .max_active
            .get(&host.id())
            .copied()
            .unwrap_or(0)
    }

    /// Peak number of concurrently-open sessions across all hosts.
    pub fn max_active_total(&self) -> usize {
        self.instrumentation.lock().unwrap().max_active_total
    }

    /// Total successful connections made.
    pub fn connect_count(&self) -> usize {
        self.instrumentation.lock().unwrap().connects
    }

    fn next_script(&self, key: &str) -> Script {
        let mut scripts = self.scripts.lock().unwrap();
        scripts
            .get_mut(key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.default_script.clone())
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(
        &self,
        host: &HostDescriptor,
        _auth: &AuthMethod,
        _options: &ConnectOptions,
    ) -> Result<Box<dyn TransportSession>> {
        let key = host.id();
        match self.next_script(&key) {
            Script::RefuseConnect => Err(Error::Unreachable {
                host: host.address(),
                reason: "connection refused".to_string(),
            }),
            Script::RejectAuth => Err(Error::Auth {
                host: key,
                reason: "permission denied".to_string(),
            }),
            script => {
                {
                    let mut instr = self.instrumentation.lock().unwrap();
                    instr.connects += 1;
                    let active = instr.active.entry(key.clone()).or_insert(0);
                    *active += 1;
                    let active = *active;
                    let max = instr.max_active.entry(key.clone()).or_insert(0);
                    *max = (*max).max(active);
                    instr.active_total += 1;
                    instr.max_active_total = instr.max_active_total.max(instr.active_total);
                }
                Ok(Box::new(MockSession {
                    key,
                    script,
                    open: true,
                    exec_delay: self.exec_delay,
                    instrumentation: Arc::clone(&self.instrumentation),
                }))
            }
        }
    }
}

struct MockSession {
    key: String,
    script: Script,
    open: bool,
    exec_delay: Duration,
    instrumentation: Arc<Mutex<Instrumentation>>,
}

#[async_trait]
impl TransportSession for MockSession {
    async fn exec(&mut self, _command: &str) -> Result<ExecOutput> {
        if !self.open {
            return Err(Error::ConnectionLost("session closed".to_string()));
        }

        match &self.script {
            Script::Output {
                exit_status,
                stdout,
            } => {
                tokio::time::sleep(self.exec_delay).await;
                Ok(ExecOutput {
                    exit_status: *exit_status,
                    stdout: stdout.as_bytes().to_vec(),
                    stderr: Vec::new(),
                })
            }
            Script::DropDuringExec => {
                tokio::time::sleep(self.exec_delay).await;
                self.open = false;
                Err(Error::ConnectionLost("peer reset mid-command".to_string()))
            }
            Script::Hang => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Err(Error::ConnectionLost("hang elapsed".to_string()))
            }
            // Connect-level scripts never reach exec.
            Script::RefuseConnect | Script::RejectAuth => {
                Err(Error::ConnectionLost("unreachable script".to_string()))
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        let mut instr = self.instrumentation.lock().unwrap();
        if let Some(active) = instr.active.get_mut(&self.key) {
            *active = active.saturating_sub(1);
        }
        instr.active_total = instr.active_total.saturating_sub(1);
    }
}

/// Host addressed as `test@<name>:22`.
pub fn test_host(name: &str) -> HostDescriptor {
    HostDescriptor::new(name.to_string(), 22, "test".to_string())
}

/// Static password credentials accepted by the mock transport.
pub fn test_credentials() -> Arc<fleetrun::StaticCredentialSource> {
    Arc::new(fleetrun::StaticCredentialSource::new(
        AuthMethod::with_password("test"),
    ))
}

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

//! SSH connection layer: authentication material, the transport seam,
//! the russh-backed client, per-host connections, and the pool.

pub mod auth;
pub mod client;
pub mod connection;
pub mod pool;
pub mod transport;

pub use auth::{AuthMethod, HostKeyCheck};
pub use client::RusshTransport;
pub use connection::{Connection, ConnectionState};
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use transport::{ConnectOptions, ExecOutput, Transport, TransportSession};

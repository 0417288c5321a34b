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

//! Retry behavior of the dispatcher against scripted transports.

mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use common::{ok_output, test_credentials, test_host, MockTransport, Script};
use fleetrun::ssh::{ConnectOptions, ConnectionPool, PoolConfig};
use fleetrun::{AttemptOutcome, CommandSpec, Dispatcher, ErrorKind, RetryPolicy};

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay_ms: 1,
        max_delay_ms: 10,
    }
}

fn dispatcher_over(transport: Arc<MockTransport>) -> Dispatcher {
    let pool = Arc::new(ConnectionPool::new(
        transport,
        test_credentials(),
        ConnectOptions::default(),
        PoolConfig::default(),
    ));
    Dispatcher::new(pool, Duration::from_secs(5))
}

#[tokio::test]
async fn idempotent_command_retries_connection_failures_until_success() {
    let transport = Arc::new(MockTransport::new());
    let host = test_host("web1");
    // First two connections die mid-command, the third works.
    transport.script_host(
        &host,
        vec![
            Script::DropDuringExec,
            Script::DropDuringExec,
            ok_output("recovered\n"),
        ],
    );

    let dispatcher = dispatcher_over(Arc::clone(&transport));
    let spec = CommandSpec::new("uptime").idempotent(true);
    let batch = dispatcher
        .dispatch(
            std::slice::from_ref(&host),
            &spec,
            &fast_policy(3),
            &CancellationToken::new(),
            None,
        )
        .await;

    let result = batch.get(&host).unwrap();
    assert_eq!(result.attempts.len(), 3);
    assert_eq!(result.outcome(), AttemptOutcome::Success);
    assert_eq!(
        result.attempts[0].outcome,
        AttemptOutcome::ConnectionLost
    );
    assert_eq!(
        result.attempts[1].outcome,
        AttemptOutcome::ConnectionLost
    );
    assert!(result.is_success());
}

#[tokio::test]
async fn non_idempotent_command_is_not_retried_after_connection_loss() {
    let transport = Arc::new(MockTransport::new());
    let host = test_host("web1");
    // The command starts, then the connection drops. A retry would be
    // allowed to succeed, but must never happen.
    transport.script_host(&host, vec![Script::DropDuringExec, ok_output("ok\n")]);

    let dispatcher = dispatcher_over(Arc::clone(&transport));
    let spec = CommandSpec::new("mv /data/a /data/b");
    let batch = dispatcher
        .dispatch(
            std::slice::from_ref(&host),
            &spec,
            &fast_policy(3),
            &CancellationToken::new(),
            None,
        )
        .await;

    let result = batch.get(&host).unwrap();
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.outcome(), AttemptOutcome::ConnectionLost);
    assert!(result.attempts[0].command_started);
    assert!(!result.is_success());
}

#[tokio::test]
async fn connect_phase_failure_retries_even_non_idempotent_commands() {
    let transport = Arc::new(MockTransport::new());
    let host = test_host("web1");
    // The command never started, so the retry is safe regardless of the
    // idempotency flag.
    transport.script_host(&host, vec![Script::RefuseConnect, ok_output("done\n")]);

    let dispatcher = dispatcher_over(Arc::clone(&transport));
    let spec = CommandSpec::new("mv /data/a /data/b");
    let batch = dispatcher
        .dispatch(
            std::slice::from_ref(&host),
            &spec,
            &fast_policy(3),
            &CancellationToken::new(),
            None,
        )
        .await;

    let result = batch.get(&host).unwrap();
    assert_eq!(result.attempts.len(), 2);
    assert!(!result.attempts[0].command_started);
    assert_eq!(result.outcome(), AttemptOutcome::Success);
}

#[tokio::test]
async fn auth_rejection_is_final() {
    let transport = Arc::new(MockTransport::new());
    let host = test_host("web1");
    transport.script_host(&host, vec![Script::RejectAuth, ok_output("ok\n")]);

    let dispatcher = dispatcher_over(Arc::clone(&transport));
    let spec = CommandSpec::new("uptime").idempotent(true);
    let batch = dispatcher
        .dispatch(
            std::slice::from_ref(&host),
            &spec,
            &fast_policy(3),
            &CancellationToken::new(),
            None,
        )
        .await;

    let result = batch.get(&host).unwrap();
    assert_eq!(result.attempts.len(), 1);
    assert_eq!(result.attempts[0].error_kind(), Some(ErrorKind::Auth));
    assert!(!result.is_success());
}

#[tokio::test]
async fn command_timeout_is_retried_for_idempotent_commands() {
    let transport = Arc::new(MockTransport::new());
    let host = test_host("web1");
    transport.script_host(&host, vec![Script::Hang, ok_output("ok\n")]);

    let dispatcher = dispatcher_over(Arc::clone(&transport));
    let spec = CommandSpec::new("uptime")
        .idempotent(true)
        .with_timeout(Duration::from_millis(100));
    let batch = dispatcher
        .dispatch(
            std::slice::from_ref(&host),
            &spec,
            &fast_policy(2),
            &CancellationToken::new(),
            None,
        )
        .await;

    let result = batch.get(&host).unwrap();
    assert_eq!(result.attempts.len(), 2);
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::Timeout);
    assert_eq!(result.outcome(), AttemptOutcome::Success);
}

#[tokio::test]
async fn attempt_sequence_is_ordered_and_numbered() {
    let transport = Arc::new(MockTransport::new());
    let host = test_host("web1");
    transport.script_host(
        &host,
        vec![Script::RefuseConnect, Script::RefuseConnect, ok_output("ok\n")],
    );

    let dispatcher = dispatcher_over(Arc::clone(&transport));
    let spec = CommandSpec::new("uptime").idempotent(true);
    let batch = dispatcher
        .dispatch(
            std::slice::from_ref(&host),
            &spec,
            &fast_policy(3),
            &CancellationToken::new(),
            None,
        )
        .await;

    let result = batch.get(&host).unwrap();
    assert!(!result.attempts.is_empty());
    for (idx, attempt) in result.attempts.iter().enumerate() {
        assert_eq!(attempt.attempt, idx as u32 + 1);
        assert!(attempt.finished_at >= attempt.started_at);
    }
    for pair in result.attempts.windows(2) {
        assert!(pair[1].started_at >= pair[0].started_at);
    }
}

#[tokio::test]
async fn one_failing_host_does_not_disturb_the_others() {
    let transport = Arc::new(MockTransport::new());
    let dead = test_host("dead1");
    let live = test_host("live1");
    transport.script_host(
        &dead,
        vec![Script::RefuseConnect, Script::RefuseConnect, Script::RefuseConnect],
    );

    let dispatcher = dispatcher_over(Arc::clone(&transport));
    let spec = CommandSpec::new("uptime").idempotent(true);
    let batch = dispatcher
        .dispatch(
            &[dead.clone(), live.clone()],
            &spec,
            &fast_policy(3),
            &CancellationToken::new(),
            None,
        )
        .await;

    assert_eq!(batch.results.len(), 2);
    assert!(!batch.get(&dead).unwrap().is_success());
    assert_eq!(batch.get(&dead).unwrap().attempts.len(), 3);
    assert!(batch.get(&live).unwrap().is_success());
    assert_eq!(batch.failure_count(), 1);
    assert_eq!(batch.success_count(), 1);
}

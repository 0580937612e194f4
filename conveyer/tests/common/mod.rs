#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use conveyer::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use conveyer::error::ConveyerResult;
use conveyer::pipeline::Conveyer;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// Upper bound for any single wait in the integration tests.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Awaits `future`, failing the test if it does not complete within [`TEST_TIMEOUT`].
pub async fn within<F: Future>(future: F) -> F::Output {
    timeout(TEST_TIMEOUT, future)
        .await
        .expect("operation did not complete in time")
}

/// Starts `conveyer` on a background task and returns its shutdown handle and join handle.
pub fn spawn_run(conveyer: &Conveyer) -> (ShutdownTx, JoinHandle<ConveyerResult<()>>) {
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();
    let conveyer = conveyer.clone();
    let handle = tokio::spawn(async move { conveyer.run(shutdown_rx).await });

    (shutdown_tx, handle)
}

/// Waits for a spawned run to finish and returns its result.
pub async fn join_run(handle: JoinHandle<ConveyerResult<()>>) -> ConveyerResult<()> {
    within(handle).await.expect("conveyer run task panicked")
}

/// Receives `count` values from the channel registered under `name`.
pub async fn recv_many(conveyer: &Conveyer, name: &str, count: usize) -> Vec<String> {
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(within(conveyer.recv(name)).await.unwrap());
    }

    values
}

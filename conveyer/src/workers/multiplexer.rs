use tokio::task::JoinSet;
use tracing::{debug, error};

use crate::channel::Channel;
use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};
use crate::error::{ConveyerError, ConveyerResult};

/// Values containing this marker are dropped by the multiplexer.
pub const NO_MULTIPLEXER_SENTINEL: &str = "no multiplexer";

/// Fan-in multiplexer.
///
/// Spawns one reader per input channel, each forwarding values to `output` and skipping those
/// containing [`NO_MULTIPLEXER_SENTINEL`]. Values read from one input keep their relative order;
/// values from different inputs may interleave arbitrarily. Returns once every reader stopped,
/// which happens when its input is closed or shutdown is requested.
pub async fn multiplexer(
    shutdown_rx: ShutdownRx,
    inputs: Vec<Channel>,
    output: Channel,
) -> ConveyerResult<()> {
    let mut readers = JoinSet::new();
    for input in inputs {
        readers.spawn(forward(shutdown_rx.clone(), input, output.clone()));
    }

    let mut first_error: Option<ConveyerError> = None;
    while let Some(result) = readers.join_next().await {
        let result = match result {
            Ok(result) => result,
            Err(join_err) if join_err.is_cancelled() => {
                debug!("multiplexer reader was cancelled");
                continue;
            }
            Err(join_err) => Err(join_err.into()),
        };

        if let Err(err) = result {
            error!(error = %err, "multiplexer reader failed");

            // Remaining readers would keep forwarding into a stage that is about to fail.
            readers.abort_all();
            first_error.get_or_insert(err);
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// Forwards values from `input` to `output` until `input` is closed or shutdown is requested.
async fn forward(
    mut shutdown_rx: ShutdownRx,
    input: Channel,
    output: Channel,
) -> ConveyerResult<()> {
    loop {
        let value = match input.recv_until_shutdown(&mut shutdown_rx).await {
            ShutdownResult::Ok(Some(value)) => value,
            ShutdownResult::Ok(None) => {
                debug!(channel = %input.name(), "multiplexer input closed");
                return Ok(());
            }
            ShutdownResult::Shutdown => return Ok(()),
        };

        if value.contains(NO_MULTIPLEXER_SENTINEL) {
            continue;
        }

        match output.send_until_shutdown(value, &mut shutdown_rx).await {
            ShutdownResult::Ok(result) => result?,
            ShutdownResult::Shutdown => return Ok(()),
        }
    }
}

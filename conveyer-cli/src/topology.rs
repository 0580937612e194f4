use conveyer::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use conveyer::pipeline::{Conveyer, UNDEFINED};
use conveyer::workers::multiplexer::NO_MULTIPLEXER_SENTINEL;
use conveyer::workers::{decorator, multiplexer, separator};
use conveyer_config::shared::CliConfig;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::error::CliResult;

/// Channel fed with stdin lines.
pub const INPUT_CHANNEL: &str = "input";

/// Channel between the decorator and the separator.
pub const DECORATED_CHANNEL: &str = "decorated";

/// Channel printed to stdout.
pub const OUTPUT_CHANNEL: &str = "output";

/// Returns the names of the channels the separator distributes values to.
pub fn separator_channel_names(count: usize) -> Vec<String> {
    (0..count).map(|index| format!("out_{index}")).collect()
}

/// Builds the `input -> decorator -> separator -> multiplexer -> output` conveyer.
pub fn build_conveyer(config: &CliConfig) -> Conveyer {
    let conveyer = Conveyer::with_config(config.conveyer.clone());
    let outputs = separator_channel_names(config.separator_outputs);

    conveyer.register_decorator(decorator, INPUT_CHANNEL, DECORATED_CHANNEL);
    conveyer.register_separator(separator, DECORATED_CHANNEL, &outputs);
    conveyer.register_multiplexer(multiplexer, &outputs, OUTPUT_CHANNEL);

    conveyer
}

/// Runs the conveyer until stdin is exhausted and every expected value was printed, a stage fails,
/// or Ctrl-C is pressed.
pub async fn run(config: CliConfig) -> CliResult<()> {
    let conveyer = build_conveyer(&config);
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    info!(
        buffer_size = conveyer.buffer_size(),
        separator_outputs = config.separator_outputs,
        error_policy = ?conveyer.error_policy(),
        "starting conveyer"
    );

    let mut run_handle = tokio::spawn({
        let conveyer = conveyer.clone();
        async move { conveyer.run(shutdown_rx).await }
    });

    let (expected_tx, expected_rx) = oneshot::channel();
    let feeder = tokio::spawn(feed_stdin(conveyer.clone(), expected_tx, shutdown_tx.clone()));
    let printer = tokio::spawn(print_output(conveyer, expected_rx, shutdown_tx.clone()));

    let run_result = tokio::select! {
        result = &mut run_handle => result,
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, stopping conveyer");
            shutdown_tx.shutdown();
            run_handle.await
        }
    };

    // The feeder may still be blocked on stdin.
    feeder.abort();
    let feeder_result = feeder.await;
    let printer_result = printer.await;

    match run_result {
        Ok(result) => result?,
        Err(join_err) => return Err(conveyer::error::ConveyerError::from(join_err).into()),
    }
    if let Ok(Err(err)) = feeder_result {
        return Err(err);
    }
    if let Ok(Err(err)) = printer_result {
        return Err(err);
    }

    Ok(())
}

/// Sends every stdin line to [`INPUT_CHANNEL`] and reports how many of them should reach
/// [`OUTPUT_CHANNEL`] once stdin is exhausted.
async fn feed_stdin(
    conveyer: Conveyer,
    expected_tx: oneshot::Sender<usize>,
    shutdown_tx: ShutdownTx,
) -> CliResult<()> {
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut expected = 0usize;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(err) => {
                error!(error = %err, "failed to read stdin");
                shutdown_tx.shutdown();
                return Err(err.into());
            }
        };

        // The multiplexer drops these, so they never reach the output.
        if !line.contains(NO_MULTIPLEXER_SENTINEL) {
            expected += 1;
        }

        if let Err(err) = conveyer.send(INPUT_CHANNEL, line).await {
            debug!(error = %err, "conveyer stopped accepting input");
            return Ok(());
        }
    }

    debug!(expected, "stdin exhausted");
    let _ = expected_tx.send(expected);

    Ok(())
}

/// Prints values from [`OUTPUT_CHANNEL`] until the conveyer stops, requesting shutdown once the
/// expected number of values was printed.
async fn print_output(
    conveyer: Conveyer,
    mut expected_rx: oneshot::Receiver<usize>,
    shutdown_tx: ShutdownTx,
) -> CliResult<()> {
    let mut stdout = io::stdout();
    let mut printed = 0usize;
    let mut expected: Option<usize> = None;
    let mut awaiting_count = true;

    loop {
        if expected.is_some_and(|expected| printed >= expected) {
            debug!(printed, "every input value was printed, stopping conveyer");
            shutdown_tx.shutdown();
            return Ok(());
        }

        tokio::select! {
            count = &mut expected_rx, if awaiting_count => {
                awaiting_count = false;
                expected = count.ok();
            }

            value = conveyer.recv(OUTPUT_CHANNEL) => {
                let value = value?;
                if value == UNDEFINED {
                    return Ok(());
                }

                stdout.write_all(value.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
                printed += 1;
            }
        }
    }
}

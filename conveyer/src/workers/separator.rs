use tracing::debug;

use crate::bail;
use crate::channel::Channel;
use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};
use crate::error::{ConveyerResult, ErrorKind};

/// Round-robin separator.
///
/// Sends the `k`-th value read from `input` (zero-based) to `outputs[k % outputs.len()]`. Returns
/// successfully when `input` is closed or shutdown is requested.
///
/// Fails immediately with [`ErrorKind::EmptyOutputs`] when `outputs` is empty, since values
/// would otherwise be silently dropped.
pub async fn separator(
    mut shutdown_rx: ShutdownRx,
    input: Channel,
    outputs: Vec<Channel>,
) -> ConveyerResult<()> {
    if outputs.is_empty() {
        bail!(
            ErrorKind::EmptyOutputs,
            "Separator has no output channels",
            input.name()
        );
    }

    let mut index = 0usize;
    loop {
        let value = match input.recv_until_shutdown(&mut shutdown_rx).await {
            ShutdownResult::Ok(Some(value)) => value,
            ShutdownResult::Ok(None) => {
                debug!(channel = %input.name(), "separator input closed");
                return Ok(());
            }
            ShutdownResult::Shutdown => return Ok(()),
        };

        let output = &outputs[index];
        index = (index + 1) % outputs.len();

        match output.send_until_shutdown(value, &mut shutdown_rx).await {
            ShutdownResult::Ok(result) => result?,
            ShutdownResult::Shutdown => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelName;
    use crate::concurrency::shutdown::create_shutdown_channel;

    #[tokio::test]
    async fn empty_outputs_fail_fast() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let input = Channel::new(ChannelName::new("in"), 1);

        let err = separator(shutdown_rx, input, vec![]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyOutputs);
        assert_eq!(err.detail(), Some("in"));
    }

    #[tokio::test]
    async fn returns_when_input_is_closed() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let input = Channel::new(ChannelName::new("in"), 4);
        let outputs = vec![
            Channel::new(ChannelName::new("a"), 4),
            Channel::new(ChannelName::new("b"), 4),
        ];

        for value in ["1", "2", "3"] {
            input.send(value.to_owned()).await.unwrap();
        }
        input.close();

        separator(shutdown_rx, input, outputs.clone()).await.unwrap();

        assert_eq!(outputs[0].recv().await.as_deref(), Some("1"));
        assert_eq!(outputs[1].recv().await.as_deref(), Some("2"));
        assert_eq!(outputs[0].recv().await.as_deref(), Some("3"));
    }
}

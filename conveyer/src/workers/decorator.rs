use tracing::debug;

use crate::bail;
use crate::channel::Channel;
use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};
use crate::error::{ConveyerResult, ErrorKind};

/// Prefix added to every decorated value.
pub const DECORATED_PREFIX: &str = "decorated: ";

/// Values containing this marker make the decorator fail.
pub const NO_DECORATOR_SENTINEL: &str = "no decorator";

/// Returns `value` with [`DECORATED_PREFIX`] prepended, unless it already starts with it.
pub fn decorate(value: String) -> String {
    if value.starts_with(DECORATED_PREFIX) {
        return value;
    }

    format!("{DECORATED_PREFIX}{value}")
}

/// Prefix-tagging decorator.
///
/// Forwards every value from `input` to `output` with [`DECORATED_PREFIX`] applied. Fails with
/// [`ErrorKind::CantBeDecorated`] on a value containing [`NO_DECORATOR_SENTINEL`]. Returns
/// successfully when `input` is closed or shutdown is requested.
pub async fn decorator(
    mut shutdown_rx: ShutdownRx,
    input: Channel,
    output: Channel,
) -> ConveyerResult<()> {
    loop {
        let value = match input.recv_until_shutdown(&mut shutdown_rx).await {
            ShutdownResult::Ok(Some(value)) => value,
            ShutdownResult::Ok(None) => {
                debug!(channel = %input.name(), "decorator input closed");
                return Ok(());
            }
            ShutdownResult::Shutdown => return Ok(()),
        };

        if value.contains(NO_DECORATOR_SENTINEL) {
            bail!(
                ErrorKind::CantBeDecorated,
                "Value cannot be decorated",
                value
            );
        }

        match output
            .send_until_shutdown(decorate(value), &mut shutdown_rx)
            .await
        {
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

    #[test]
    fn decorate_is_idempotent() {
        assert_eq!(decorate("x".to_owned()), "decorated: x");
        assert_eq!(decorate("decorated: x".to_owned()), "decorated: x");
        assert_eq!(decorate(String::new()), "decorated: ");
    }

    #[test]
    fn prefix_must_be_at_the_start() {
        assert_eq!(
            decorate("not decorated: x".to_owned()),
            "decorated: not decorated: x"
        );
    }

    #[tokio::test]
    async fn returns_when_input_is_closed() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let input = Channel::new(ChannelName::new("in"), 4);
        let output = Channel::new(ChannelName::new("out"), 4);

        for value in ["a", "decorated: b"] {
            input.send(value.to_owned()).await.unwrap();
        }
        input.close();

        decorator(shutdown_rx, input, output.clone()).await.unwrap();

        assert_eq!(output.recv().await.as_deref(), Some("decorated: a"));
        assert_eq!(output.recv().await.as_deref(), Some("decorated: b"));
        output.close();
        assert_eq!(output.recv().await, None);
    }

    #[tokio::test]
    async fn sentinel_fails_without_forwarding() {
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let input = Channel::new(ChannelName::new("in"), 4);
        let output = Channel::new(ChannelName::new("out"), 4);

        input
            .send(format!("has {NO_DECORATOR_SENTINEL} inside"))
            .await
            .unwrap();
        input.send("never reached".to_owned()).await.unwrap();

        let err = decorator(shutdown_rx, input.clone(), output.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CantBeDecorated);
        assert_eq!(err.detail(), Some("has no decorator inside"));

        output.close();
        assert_eq!(output.recv().await, None);
        assert_eq!(input.recv().await.as_deref(), Some("never reached"));
    }
}

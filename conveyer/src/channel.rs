use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use metrics::{Counter, counter};
use tokio::sync::{Mutex, mpsc, watch};

use crate::bail;
use crate::concurrency::shutdown::{ShutdownResult, ShutdownRx};
use crate::error::{ConveyerResult, ErrorKind};
use crate::metrics::{
    CHANNEL_LABEL, CONVEYER_CHANNEL_MESSAGES_RECEIVED_TOTAL, CONVEYER_CHANNEL_MESSAGES_SENT_TOTAL,
};

/// Name under which a [`Channel`] is registered in a conveyer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelName(String);

impl ChannelName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ChannelName {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ChannelName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

struct ChannelInner {
    name: ChannelName,
    capacity: usize,
    tx: mpsc::Sender<String>,
    // Consumers take turns on the receiver, so several stages (or external callers) can read from
    // the same channel while each value is delivered exactly once.
    rx: Mutex<mpsc::Receiver<String>>,
    closed_tx: watch::Sender<bool>,
    // Bound to the recorder installed when the channel was created.
    sent_total: Counter,
    received_total: Counter,
}

impl fmt::Debug for ChannelInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelInner")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("closed", &*self.closed_tx.borrow())
            .finish_non_exhaustive()
    }
}

/// Bounded FIFO queue of text values shared by every stage referencing the same name.
///
/// Cloning a [`Channel`] yields another handle to the same queue. Once [`Channel::close`] was
/// called no value can be sent anymore, while already buffered values can still be received.
#[derive(Debug, Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Creates a new open channel buffering up to `capacity` values.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(name: ChannelName, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        let (closed_tx, _) = watch::channel(false);
        let sent_total = counter!(
            CONVEYER_CHANNEL_MESSAGES_SENT_TOTAL,
            CHANNEL_LABEL => name.to_string()
        );
        let received_total = counter!(
            CONVEYER_CHANNEL_MESSAGES_RECEIVED_TOTAL,
            CHANNEL_LABEL => name.to_string()
        );

        Self {
            inner: Arc::new(ChannelInner {
                name,
                capacity,
                tx,
                rx: Mutex::new(rx),
                closed_tx,
                sent_total,
                received_total,
            }),
        }
    }

    pub fn name(&self) -> &ChannelName {
        &self.inner.name
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed_tx.borrow()
    }

    /// Closes the channel.
    ///
    /// Returns `true` if this call closed the channel and `false` if it was already closed.
    pub fn close(&self) -> bool {
        !self.inner.closed_tx.send_replace(true)
    }

    /// Sends `value`, waiting for buffer space if the channel is full.
    ///
    /// Fails with [`ErrorKind::ChannelClosed`] if the channel is closed before the value could be
    /// enqueued.
    pub async fn send(&self, value: String) -> ConveyerResult<()> {
        let mut closed_rx = self.inner.closed_tx.subscribe();

        let sent = tokio::select! {
            biased;

            _ = wait_closed(&mut closed_rx) => false,
            result = self.inner.tx.send(value) => result.is_ok(),
        };

        if !sent {
            bail!(
                ErrorKind::ChannelClosed,
                "Cannot send on a closed channel",
                self.inner.name
            );
        }

        self.inner.sent_total.increment(1);

        Ok(())
    }

    /// Receives the next value, waiting until one is available.
    ///
    /// Returns [`None`] once the channel is closed and every buffered value was consumed.
    pub async fn recv(&self) -> Option<String> {
        let mut rx = self.inner.rx.lock().await;
        let mut closed_rx = self.inner.closed_tx.subscribe();

        let value = tokio::select! {
            biased;

            value = rx.recv() => value,
            _ = wait_closed(&mut closed_rx) => rx.try_recv().ok(),
        };

        if value.is_some() {
            self.inner.received_total.increment(1);
        }

        value
    }

    /// Receives the next value unless shutdown is requested first.
    pub async fn recv_until_shutdown(
        &self,
        shutdown_rx: &mut ShutdownRx,
    ) -> ShutdownResult<Option<String>> {
        tokio::select! {
            biased;

            _ = shutdown_rx.cancelled() => ShutdownResult::Shutdown,
            value = self.recv() => ShutdownResult::Ok(value),
        }
    }

    /// Sends `value` unless shutdown is requested first.
    pub async fn send_until_shutdown(
        &self,
        value: String,
        shutdown_rx: &mut ShutdownRx,
    ) -> ShutdownResult<ConveyerResult<()>> {
        tokio::select! {
            biased;

            _ = shutdown_rx.cancelled() => ShutdownResult::Shutdown,
            result = self.send(value) => ShutdownResult::Ok(result),
        }
    }
}

#[cfg(test)]
impl Channel {
    /// Returns `true` if both handles refer to the same underlying queue.
    pub(crate) fn same_channel(&self, other: &Channel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Waits until the closed flag observed by `closed_rx` is set.
async fn wait_closed(closed_rx: &mut watch::Receiver<bool>) {
    // The sender lives as long as the channel itself, so this can only fail once every handle is
    // gone, at which point nobody is waiting anymore.
    let _ = closed_rx.wait_for(|closed| *closed).await;
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    use metrics::{Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
    use tokio::time::timeout;

    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;

    fn channel(capacity: usize) -> Channel {
        Channel::new(ChannelName::new("test"), capacity)
    }

    #[tokio::test]
    async fn values_are_received_in_order() {
        let channel = channel(4);
        for value in ["a", "b", "c"] {
            channel.send(value.to_owned()).await.unwrap();
        }

        assert_eq!(channel.recv().await.as_deref(), Some("a"));
        assert_eq!(channel.recv().await.as_deref(), Some("b"));
        assert_eq!(channel.recv().await.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn closed_channel_is_drained_before_reporting_none() {
        let channel = channel(4);
        channel.send("left over".to_owned()).await.unwrap();

        assert!(channel.close());
        assert!(!channel.close());
        assert!(channel.is_closed());

        assert_eq!(channel.recv().await.as_deref(), Some("left over"));
        assert_eq!(channel.recv().await, None);
    }

    #[tokio::test]
    async fn send_on_closed_channel_fails() {
        let channel = channel(1);
        channel.close();

        let err = channel.send("late".to_owned()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ChannelClosed);
        assert_eq!(err.detail(), Some("test"));
    }

    #[tokio::test]
    async fn close_unblocks_pending_operations() {
        let channel = channel(1);
        channel.send("fills the buffer".to_owned()).await.unwrap();

        let blocked_sender = tokio::spawn({
            let channel = channel.clone();
            async move { channel.send("blocked".to_owned()).await }
        });

        let empty = self::channel(1);
        let blocked_receiver = tokio::spawn({
            let empty = empty.clone();
            async move { empty.recv().await }
        });

        tokio::task::yield_now().await;
        channel.close();
        empty.close();

        let send_result = timeout(Duration::from_secs(1), blocked_sender)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(send_result.unwrap_err().kind(), ErrorKind::ChannelClosed);

        let recv_result = timeout(Duration::from_secs(1), blocked_receiver)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(recv_result, None);
    }

    #[tokio::test]
    async fn shutdown_interrupts_blocked_operations() {
        let (shutdown_tx, mut shutdown_rx) = create_shutdown_channel();
        let channel = channel(1);
        channel.send("fills the buffer".to_owned()).await.unwrap();
        shutdown_tx.shutdown();

        let result = channel
            .send_until_shutdown("never sent".to_owned(), &mut shutdown_rx)
            .await;
        assert!(result.should_shutdown());

        let empty = self::channel(1);
        let result = empty.recv_until_shutdown(&mut shutdown_rx).await;
        assert!(result.should_shutdown());
    }

    #[derive(Default)]
    struct CountingRecorder {
        registrations: AtomicU64,
        sent: Arc<AtomicU64>,
        received: Arc<AtomicU64>,
    }

    impl Recorder for CountingRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            self.registrations.fetch_add(1, Ordering::Relaxed);
            match key.name() {
                CONVEYER_CHANNEL_MESSAGES_SENT_TOTAL => Counter::from_arc(self.sent.clone()),
                CONVEYER_CHANNEL_MESSAGES_RECEIVED_TOTAL => {
                    Counter::from_arc(self.received.clone())
                }
                _ => Counter::noop(),
            }
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[tokio::test]
    async fn counters_are_registered_once_per_channel() {
        let recorder = CountingRecorder::default();
        let channel = metrics::with_local_recorder(&recorder, || channel(4));
        assert_eq!(recorder.registrations.load(Ordering::Relaxed), 2);

        // Outside the local recorder scope, so only the handles taken at creation can count.
        channel.send("a".to_owned()).await.unwrap();
        channel.send("b".to_owned()).await.unwrap();
        channel.recv().await.unwrap();

        assert_eq!(recorder.sent.load(Ordering::Relaxed), 2);
        assert_eq!(recorder.received.load(Ordering::Relaxed), 1);
        assert_eq!(recorder.registrations.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn clones_share_the_same_queue() {
        let channel = channel(2);
        let clone = channel.clone();

        assert!(channel.same_channel(&clone));
        assert!(!channel.same_channel(&self::channel(2)));

        clone.send("shared".to_owned()).await.unwrap();
        assert_eq!(channel.recv().await.as_deref(), Some("shared"));
    }
}

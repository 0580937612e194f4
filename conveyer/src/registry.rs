use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

use crate::channel::{Channel, ChannelName};

/// Name to [`Channel`] mapping owned by a conveyer.
///
/// Channels are created lazily on first reference and live until the registry is dropped. A single
/// exclusive lock guards the map, which keeps lookup-or-create atomic when stages sharing a channel
/// name are registered concurrently.
#[derive(Debug)]
pub struct ChannelRegistry {
    capacity: usize,
    channels: Mutex<HashMap<ChannelName, Channel>>,
}

impl ChannelRegistry {
    /// Creates an empty registry whose channels buffer up to `capacity` values.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the channel registered under `name`, creating it if needed.
    ///
    /// Repeated calls with the same name return handles to the same channel.
    pub fn resolve(&self, name: &str) -> Channel {
        let mut channels = self.lock();

        if let Some(channel) = channels.get(name) {
            return channel.clone();
        }

        let name = ChannelName::new(name);
        let channel = Channel::new(name.clone(), self.capacity);
        channels.insert(name, channel.clone());

        debug!(channel = %channel.name(), capacity = self.capacity, "created channel");

        channel
    }

    /// Returns the channel registered under `name` without creating it.
    pub fn get(&self, name: &str) -> Option<Channel> {
        self.lock().get(name).cloned()
    }

    /// Closes every registered channel.
    ///
    /// Returns how many channels were closed by this call; channels that were already closed are
    /// not counted.
    pub fn close_all(&self) -> usize {
        self.lock()
            .values()
            .map(Channel::close)
            .filter(|closed| *closed)
            .count()
    }

    /// Returns the registered channel names in sorted order.
    pub fn names(&self) -> Vec<ChannelName> {
        let mut names: Vec<_> = self.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ChannelName, Channel>> {
        // A panic while holding the lock cannot leave the map half-updated, so a poisoned lock is
        // still safe to use.
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

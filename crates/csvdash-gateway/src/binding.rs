use std::sync::{Arc, PoisonError, RwLock};

use csvdash_types::events::EventMessage;

use crate::channel::{Channel, Handler, Subscription};

/// A screen's attachment to the shared channel.
///
/// Holds one subscription for its whole life and always dispatches to the
/// most recently set handler, so a re-rendered screen never ends up with
/// stale or duplicate callbacks.
pub struct ChannelBinding {
    channel: Channel,
    handler: Arc<RwLock<Handler>>,
    subscription: Option<Subscription>,
}

impl ChannelBinding {
    pub fn new<F>(channel: Channel, handler: F) -> Self
    where
        F: Fn(&EventMessage) + Send + Sync + 'static,
    {
        Self {
            channel,
            handler: Arc::new(RwLock::new(Arc::new(handler))),
            subscription: None,
        }
    }

    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&EventMessage) + Send + Sync + 'static,
    {
        let mut slot = self.handler.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(handler);
    }

    /// Bring the channel in line with the current credential: connect and
    /// subscribe when a token is present, otherwise disconnect.
    pub fn sync(&mut self, token: Option<&str>) {
        let Some(token) = token else {
            self.subscription = None;
            self.channel.disconnect();
            return;
        };

        self.channel.ensure_connected(token);
        if self.subscription.is_none() {
            let cell = self.handler.clone();
            self.subscription = Some(self.channel.subscribe(move |message| {
                let current = Arc::clone(&cell.read().unwrap_or_else(PoisonError::into_inner));
                current(message);
            }));
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}

impl Drop for ChannelBinding {
    fn drop(&mut self) {
        if self.subscription.take().is_some() && self.channel.subscriber_count() == 0 {
            self.channel.disconnect();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::backoff::ReconnectPolicy;
    use crate::channel::ChannelState;
    use crate::memory::MemoryConnector;

    use super::*;

    fn channel(connector: &MemoryConnector) -> Channel {
        Channel::new(
            "ws://localhost:8000/ws/csv-updates",
            ReconnectPolicy::default(),
            Arc::new(connector.clone()),
        )
    }

    async fn open(channel: &Channel, connector: &MemoryConnector, index: usize) {
        connector.accept(index);
        channel
            .watch_state()
            .wait_for(|s| *s == ChannelState::Open)
            .await
            .unwrap();
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn logger(log: &Arc<Mutex<Vec<String>>>, tag: &'static str) -> impl Fn(&EventMessage) + Send + Sync + 'static {
        let log = log.clone();
        move |m: &EventMessage| log.lock().unwrap().push(format!("{}:{}", tag, m.event))
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_to_latest_handler() {
        let connector = MemoryConnector::new();
        let ch = channel(&connector);
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut binding = ChannelBinding::new(ch.clone(), logger(&log, "first"));
        binding.sync(Some("tok"));
        open(&ch, &connector, 0).await;

        connector.push(0, r#"{"event":"one"}"#);
        settle().await;
        binding.set_handler(logger(&log, "second"));
        binding.sync(Some("tok"));
        connector.push(0, r#"{"event":"two"}"#);
        settle().await;

        assert_eq!(*log.lock().unwrap(), vec!["first:one", "second:two"]);
        assert_eq!(ch.subscriber_count(), 1);
        assert_eq!(connector.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_credential_disconnects() {
        let connector = MemoryConnector::new();
        let ch = channel(&connector);
        let mut binding = ChannelBinding::new(ch.clone(), |_| {});

        binding.sync(Some("tok"));
        assert!(binding.is_subscribed());
        binding.sync(None);

        assert!(!binding.is_subscribed());
        assert_eq!(ch.subscriber_count(), 0);
        assert_eq!(ch.state(), ChannelState::Idle);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.open_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn last_binding_dropped_disconnects() {
        let connector = MemoryConnector::new();
        let ch = channel(&connector);

        let mut first = ChannelBinding::new(ch.clone(), |_| {});
        let mut second = ChannelBinding::new(ch.clone(), |_| {});
        first.sync(Some("tok"));
        second.sync(Some("tok"));
        open(&ch, &connector, 0).await;

        drop(first);
        assert!(ch.is_connected());
        assert_eq!(ch.subscriber_count(), 1);

        drop(second);
        assert_eq!(ch.state(), ChannelState::Idle);
        assert_eq!(connector.live_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unsynced_binding_leaves_channel_alone() {
        let connector = MemoryConnector::new();
        let ch = channel(&connector);
        let mut active = ChannelBinding::new(ch.clone(), |_| {});
        active.sync(Some("tok"));

        drop(ChannelBinding::new(ch.clone(), |_| {}));
        assert_eq!(ch.state(), ChannelState::Connecting);
    }
}

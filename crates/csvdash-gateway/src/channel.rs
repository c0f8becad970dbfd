use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

use csvdash_types::events::{ClientCommand, EventMessage};

use crate::backoff::ReconnectPolicy;
use crate::transport::{Connector, TransportEvent};

pub type Handler = Arc<dyn Fn(&EventMessage) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// No credential, nothing scheduled.
    Idle,
    Connecting,
    Open,
    /// Transport lost; a reconnect may be pending.
    Closed,
    /// Retry budget exhausted. Only an explicit connect leaves this state.
    Abandoned,
}

/// The single realtime connection to the push endpoint.
///
/// Cheap to clone; all clones share one transport, one subscriber list and
/// one retry budget. Methods must be called from within a tokio runtime.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    endpoint: String,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    core: Mutex<Core>,
    /// Registration order is dispatch order
    subscribers: Mutex<Vec<(u64, Handler)>>,
    next_subscriber: AtomicU64,
    state_tx: watch::Sender<ChannelState>,
}

struct Core {
    state: ChannelState,
    token: Option<String>,
    /// Bumped on every open and teardown. Events carrying an older value
    /// come from a transport that is no longer ours.
    generation: u64,
    live: Option<LiveLink>,
    retries: u32,
    reconnect: Option<JoinHandle<()>>,
    disposed: bool,
}

struct LiveLink {
    outbound: mpsc::UnboundedSender<String>,
    driver: JoinHandle<()>,
}

impl Channel {
    pub fn new(endpoint: impl Into<String>, policy: ReconnectPolicy, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ChannelState::Idle);
        Self {
            inner: Arc::new(ChannelInner {
                endpoint: endpoint.into(),
                policy,
                connector,
                core: Mutex::new(Core {
                    state: ChannelState::Idle,
                    token: None,
                    generation: 0,
                    live: None,
                    retries: 0,
                    reconnect: None,
                    disposed: false,
                }),
                subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(1),
                state_tx,
            }),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    /// Open a fresh transport authenticated with `token`, replacing any
    /// existing one. Cancels a pending reconnect and resets the retry budget.
    pub fn connect(&self, token: &str) {
        let mut core = self.inner.lock_core();
        self.inner.connect_locked(&mut core, token);
    }

    /// Connect unless a transport for this token is already up, coming up,
    /// or about to be retried.
    pub fn ensure_connected(&self, token: &str) {
        let mut core = self.inner.lock_core();
        let same_token = core.token.as_deref() == Some(token);
        let active = match core.state {
            ChannelState::Connecting | ChannelState::Open => true,
            ChannelState::Closed => core.reconnect.is_some(),
            ChannelState::Idle | ChannelState::Abandoned => false,
        };
        if same_token && active {
            trace!("Realtime channel already active");
            return;
        }
        self.inner.connect_locked(&mut core, token);
    }

    /// Close the transport and cancel any pending reconnect. Idempotent.
    pub fn disconnect(&self) {
        let mut core = self.inner.lock_core();
        self.inner.disconnect_locked(&mut core);
    }

    /// Disconnect for good and drop every subscriber.
    pub fn dispose(&self) {
        {
            let mut core = self.inner.lock_core();
            self.inner.disconnect_locked(&mut core);
            core.disposed = true;
        }
        self.inner.lock_subscribers().clear();
        debug!("Realtime channel disposed");
    }

    /// Register a handler for every message received from now on.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&EventMessage) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner.lock_subscribers().push((id, Arc::new(handler)));
        trace!("Subscriber {} registered", id);
        Subscription {
            id,
            channel: Arc::downgrade(&self.inner),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.inner.lock_core().state
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Open
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.lock_core().retries
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock_subscribers().len()
    }
}

impl ChannelInner {
    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<(u64, Handler)>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, core: &mut Core, state: ChannelState) {
        core.state = state;
        self.state_tx.send_replace(state);
    }

    fn connect_locked(self: &Arc<Self>, core: &mut Core, token: &str) {
        if core.disposed {
            warn!("Ignoring connect on a disposed realtime channel");
            return;
        }
        self.teardown(core);
        core.token = Some(token.to_string());
        core.retries = 0;
        self.open(core);
    }

    fn disconnect_locked(&self, core: &mut Core) {
        let was_active = core.live.is_some() || core.reconnect.is_some();
        self.teardown(core);
        core.token = None;
        core.retries = 0;
        if was_active {
            info!("Realtime channel disconnected");
        }
        self.set_state(core, ChannelState::Idle);
    }

    /// Drop the current transport and any pending reconnect.
    fn teardown(&self, core: &mut Core) {
        core.generation += 1;
        if let Some(timer) = core.reconnect.take() {
            timer.abort();
        }
        if let Some(link) = core.live.take() {
            // Dropping the outbound sender closes the transport
            link.driver.abort();
        }
    }

    fn open(self: &Arc<Self>, core: &mut Core) {
        core.generation += 1;
        let generation = core.generation;
        let link = self.connector.open(&self.endpoint);
        self.set_state(core, ChannelState::Connecting);
        debug!("Connecting to {} (generation {})", self.endpoint, generation);

        let driver = tokio::spawn(drive(Arc::downgrade(self), generation, link.inbound));
        core.live = Some(LiveLink {
            outbound: link.outbound,
            driver,
        });
    }

    fn on_open(&self, generation: u64) {
        let mut core = self.lock_core();
        if core.generation != generation || core.state != ChannelState::Connecting {
            return;
        }
        let Some(token) = core.token.clone() else {
            return;
        };

        match serde_json::to_string(&ClientCommand::Auth { token }) {
            Ok(handshake) => {
                let sent = core
                    .live
                    .as_ref()
                    .is_some_and(|link| link.outbound.send(handshake).is_ok());
                if !sent {
                    warn!("Transport went away before the auth handshake");
                }
            }
            Err(e) => error!("Failed to encode auth handshake: {}", e),
        }

        core.retries = 0;
        self.set_state(&mut core, ChannelState::Open);
        info!("Realtime channel connected");
    }

    fn on_frame(&self, generation: u64, text: &str) {
        {
            let core = self.lock_core();
            if core.generation != generation || core.state != ChannelState::Open {
                trace!("Dropping frame from a stale transport");
                return;
            }
        }

        let message = match EventMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                let preview: String = text.chars().take(200).collect();
                debug!("Dropping malformed realtime message: {} -- raw: {}", e, preview);
                return;
            }
        };

        // Snapshot so handlers can subscribe or unsubscribe while we dispatch
        let handlers = self.lock_subscribers().clone();
        for (id, handler) in handlers {
            if panic::catch_unwind(AssertUnwindSafe(|| handler(&message))).is_err() {
                warn!("Subscriber {} panicked handling '{}'", id, message.event);
            }
        }
    }

    fn on_lost(self: &Arc<Self>, generation: u64) {
        let mut core = self.lock_core();
        let active = matches!(core.state, ChannelState::Connecting | ChannelState::Open);
        if core.generation != generation || !active {
            return;
        }
        core.live = None;
        info!("Realtime channel disconnected");
        self.set_state(&mut core, ChannelState::Closed);
        self.schedule_reconnect(&mut core);
    }

    fn schedule_reconnect(self: &Arc<Self>, core: &mut Core) {
        if core.token.is_none() {
            debug!("No credential held, not reconnecting");
            return;
        }
        if !self.policy.allows(core.retries) {
            error!(
                "Max reconnection attempts reached ({}), giving up",
                self.policy.max_retries
            );
            self.set_state(core, ChannelState::Abandoned);
            return;
        }

        let attempt = core.retries + 1;
        let delay = self.policy.next_delay(attempt);
        let generation = core.generation;
        let channel = Arc::downgrade(self);
        debug!(
            "Reconnecting in {:?} (attempt {}/{})",
            delay, attempt, self.policy.max_retries
        );
        core.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = channel.upgrade() {
                inner.reconnect(generation);
            }
        }));
    }

    fn reconnect(self: &Arc<Self>, generation: u64) {
        let mut core = self.lock_core();
        if core.generation != generation || core.state != ChannelState::Closed {
            return;
        }
        core.reconnect = None;
        if core.token.is_none() {
            return;
        }
        core.retries += 1;
        info!(
            "Attempting to reconnect ({}/{})",
            core.retries, self.policy.max_retries
        );
        self.open(&mut core);
    }

    fn remove_subscriber(&self, id: u64) {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        if subscribers.len() != before {
            trace!("Subscriber {} removed", id);
        }
    }
}

/// Forward transport events for one link until it ends or the channel goes
/// away.
async fn drive(
    channel: Weak<ChannelInner>,
    generation: u64,
    mut inbound: mpsc::UnboundedReceiver<TransportEvent>,
) {
    while let Some(event) = inbound.recv().await {
        let Some(inner) = channel.upgrade() else {
            return;
        };
        match event {
            TransportEvent::Opened => inner.on_open(generation),
            TransportEvent::Frame(text) => inner.on_frame(generation, &text),
            TransportEvent::Error(reason) => {
                warn!("Realtime transport error: {}", reason);
                inner.on_lost(generation);
                return;
            }
            TransportEvent::Closed => {
                inner.on_lost(generation);
                return;
            }
        }
    }
    if let Some(inner) = channel.upgrade() {
        inner.on_lost(generation);
    }
}

/// Handle returned by [`Channel::subscribe`]. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    channel: Weak<ChannelInner>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            inner.remove_subscriber(self.id);
        }
    }
}

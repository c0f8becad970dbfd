//! In-process connector. Every `open` is recorded and driven by hand, which
//! makes channel behavior observable without a server.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::time::Instant;

use crate::transport::{Connector, TransportEvent, TransportLink};

struct Peer {
    url: String,
    opened_at: Instant,
    events: mpsc::UnboundedSender<TransportEvent>,
    outbound: mpsc::UnboundedReceiver<String>,
    sent: Vec<String>,
    closed: bool,
}

impl Peer {
    fn drain(&mut self) {
        loop {
            match self.outbound.try_recv() {
                Ok(text) => self.sent.push(text),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.closed = true;
                    break;
                }
            }
        }
    }
}

#[derive(Default)]
struct Shared {
    peers: Vec<Peer>,
    refuse: bool,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose transports all close before opening.
    pub fn refusing() -> Self {
        let connector = Self::new();
        connector.set_refuse(true);
        connector
    }

    pub fn set_refuse(&self, refuse: bool) {
        self.lock().refuse = refuse;
    }

    pub fn open_count(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn opened_at(&self) -> Vec<Instant> {
        self.lock().peers.iter().map(|p| p.opened_at).collect()
    }

    pub fn url(&self, index: usize) -> Option<String> {
        self.lock().peers.get(index).map(|p| p.url.clone())
    }

    /// Transports the channel has not released yet.
    pub fn live_count(&self) -> usize {
        let mut shared = self.lock();
        shared.peers.iter_mut().for_each(Peer::drain);
        shared.peers.iter().filter(|p| !p.closed).count()
    }

    pub fn is_live(&self, index: usize) -> bool {
        let mut shared = self.lock();
        match shared.peers.get_mut(index) {
            Some(peer) => {
                peer.drain();
                !peer.closed
            }
            None => false,
        }
    }

    /// Frames the channel sent on transport `index`.
    pub fn sent(&self, index: usize) -> Vec<String> {
        let mut shared = self.lock();
        match shared.peers.get_mut(index) {
            Some(peer) => {
                peer.drain();
                peer.sent.clone()
            }
            None => Vec::new(),
        }
    }

    pub fn accept(&self, index: usize) {
        self.emit(index, TransportEvent::Opened);
    }

    pub fn push(&self, index: usize, frame: &str) {
        self.emit(index, TransportEvent::Frame(frame.to_string()));
    }

    pub fn fail(&self, index: usize, reason: &str) {
        self.emit(index, TransportEvent::Error(reason.to_string()));
    }

    pub fn close(&self, index: usize) {
        self.emit(index, TransportEvent::Closed);
    }

    fn emit(&self, index: usize, event: TransportEvent) {
        if let Some(peer) = self.lock().peers.get(index) {
            // The channel may already have let go of this transport
            let _ = peer.events.send(event);
        }
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MemoryConnector {
    fn open(&self, url: &str) -> TransportLink {
        let (link, outbound, events) = TransportLink::pair();
        let mut shared = self.lock();
        if shared.refuse {
            let _ = events.send(TransportEvent::Closed);
        }
        shared.peers.push(Peer {
            url: url.to_string(),
            opened_at: Instant::now(),
            events,
            outbound,
            sent: Vec::new(),
            closed: false,
        });
        link
    }
}

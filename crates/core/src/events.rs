//! Typed channels between the session list and its page.
//!
//! Inbound events have exactly one consumer, the session list, and are
//! queued without a bound so that no event is ever skipped. Outbound events
//! fan out to any number of subscribers.

use std::sync::{Arc, Mutex, PoisonError};

use packetview_api::{InboundEvent, OutboundEvent};
use tokio::sync::{broadcast, mpsc};

const DEFAULT_OUTBOUND_CAPACITY: usize = 64;

#[derive(Clone)]
pub struct EventBus {
    inbound: mpsc::UnboundedSender<InboundEvent>,
    /// Parked until the session list claims it.
    inbound_rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<InboundEvent>>>>,
    outbound: broadcast::Sender<OutboundEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_CAPACITY)
    }
}

impl EventBus {
    /// `outbound_capacity` bounds how far a slow outbound subscriber may lag.
    pub fn new(outbound_capacity: usize) -> Self {
        let (inbound, inbound_rx) = mpsc::unbounded_channel();
        let (outbound, _) = broadcast::channel(outbound_capacity);
        Self {
            inbound,
            inbound_rx: Arc::new(Mutex::new(Some(inbound_rx))),
            outbound,
        }
    }

    /// Queue an event for the session list. Events sent before it starts
    /// listening are delivered once it does; after it stops they are dropped.
    pub fn emit(&self, event: InboundEvent) {
        let _ = self.inbound.send(event);
    }

    pub fn broadcast(&self, event: OutboundEvent) {
        let _ = self.outbound.send(event);
    }

    /// Claim the inbound stream. Only the first caller gets it.
    pub fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<InboundEvent>> {
        self.inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn subscribe_outbound(&self) -> broadcast::Receiver<OutboundEvent> {
        self.outbound.subscribe()
    }

    /// Whether a claimed inbound stream is still being read.
    pub fn has_listener(&self) -> bool {
        let parked = self
            .inbound_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        !parked && !self.inbound.is_closed()
    }
}

//! Transfer lifecycle events

use std::fmt::Debug;

use tokio::sync::mpsc;
use tracing::trace;

use crate::app::resource::{ConcreteResource, Resource};

/// Something observable happened to a resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferEvent {
    /// Content was written into the cache
    Stored { resource: ConcreteResource },
    /// Content was removed from the cache
    Deleted { resource: ConcreteResource },
    /// Fetching or storing failed with an error
    AccessFailed {
        resource: ConcreteResource,
        error: String,
    },
    /// No candidate had the requested content
    NotFound { resource: Resource },
    /// Content was uploaded to the remote
    Published { resource: ConcreteResource },
}

/// Receives transfer events
pub trait EventDispatcher: Send + Sync + Debug {
    fn fire(&self, event: TransferEvent);
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NoOpEventDispatcher;

impl EventDispatcher for NoOpEventDispatcher {
    fn fire(&self, event: TransferEvent) {
        trace!("Dropping event {:?}", event);
    }
}

/// Forwards events to an unbounded channel
#[derive(Debug)]
pub struct ChannelEventDispatcher {
    sender: mpsc::UnboundedSender<TransferEvent>,
}

impl ChannelEventDispatcher {
    /// Dispatcher plus the receiving end of its channel
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventDispatcher for ChannelEventDispatcher {
    fn fire(&self, event: TransferEvent) {
        // A closed receiver means nobody is listening any more
        let _ = self.sender.send(event);
    }
}

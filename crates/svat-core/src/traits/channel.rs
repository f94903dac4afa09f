//! Duplex channel transport traits.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::Result;

/// An event produced by an open channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// A text frame from the remote side.
    Message(String),
    /// A transport fault. The connection is unusable afterwards.
    Error(String),
    /// The remote side closed the connection.
    Closed,
}

/// Inbound events of one connection. Ends when the connection is gone.
pub type ChannelEvents = Pin<Box<dyn Stream<Item = ChannelEvent> + Send>>;

/// The outbound half of an open channel.
#[async_trait]
pub trait ChannelSender: Send {
    async fn send(&mut self, payload: String) -> Result<()>;

    /// Close the connection. Closing twice is not an error.
    async fn close(&mut self) -> Result<()>;
}

/// An open channel: outbound sender plus inbound events.
pub struct ChannelConnection {
    pub sender: Box<dyn ChannelSender>,
    pub events: ChannelEvents,
}

impl ChannelConnection {
    pub fn new(sender: Box<dyn ChannelSender>, events: ChannelEvents) -> Self {
        Self { sender, events }
    }
}

impl std::fmt::Debug for ChannelConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelConnection").finish_non_exhaustive()
    }
}

/// Opens duplex channels.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    /// Open a channel to a URL that already embeds its credential.
    async fn open(&self, url: &str) -> Result<ChannelConnection>;
}

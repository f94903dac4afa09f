//! Multicast inbound message sequence.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{trace, warn};

use crate::Result;
use crate::error::{ChannelError, TerminationReason};

use super::Inbound;

type BusItem = Result<Inbound>;

/// Items buffered per subscriber before new ones are dropped for it.
pub const SUBSCRIBER_CAPACITY: usize = 256;

/// Fan-out of inbound items to every current subscriber.
///
/// Subscribers only see items published after they subscribed; nothing is
/// replayed. Each subscriber buffers up to [`SUBSCRIBER_CAPACITY`] items;
/// a subscriber that falls further behind misses the overflow, which is
/// logged. [`MessageBus::terminate`] latches: every subscriber, present or
/// future, receives exactly one terminal error and then the stream ends.
/// The terminal error is never lost to a full buffer.
#[derive(Clone, Default)]
pub struct MessageBus {
    inner: Arc<Mutex<BusState>>,
}

#[derive(Default)]
struct BusState {
    subscribers: Vec<mpsc::Sender<Inbound>>,
    terminal: Option<TerminationReason>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> MessageStream {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let mut state = self.lock();
        // After termination the sender is dropped here, so the stream goes
        // straight to the terminal error.
        if state.terminal.is_none() {
            state.subscribers.push(tx);
        }
        MessageStream::new(rx, Arc::clone(&self.inner))
    }

    /// Deliver an item to every live subscriber. Ignored once terminated.
    pub fn publish(&self, item: Inbound) {
        let mut state = self.lock();
        if state.terminal.is_some() {
            trace!("Bus terminated, dropping inbound item");
            return;
        }
        state
            .subscribers
            .retain(|subscriber| match subscriber.try_send(item.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    warn!(
                        capacity = SUBSCRIBER_CAPACITY,
                        "Subscriber is not keeping up, dropping inbound item"
                    );
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
    }

    /// Deliver the terminal signal and close every stream.
    ///
    /// Returns false if the bus was already terminated.
    pub fn terminate(&self, reason: TerminationReason) -> bool {
        let mut state = self.lock();
        if state.terminal.is_some() {
            return false;
        }
        state.terminal = Some(reason);
        // Dropping the senders ends each receiver once it has drained; the
        // stream then reads the reason from the shared state.
        state.subscribers.clear();
        true
    }

    pub fn termination(&self) -> Option<TerminationReason> {
        self.lock().terminal
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminal.is_some()
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.lock();
        state.subscribers.retain(|subscriber| !subscriber.is_closed());
        state.subscribers.len()
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for MessageBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MessageBus")
            .field("subscribers", &state.subscribers.len())
            .field("terminal", &state.terminal)
            .finish()
    }
}

/// One subscription to a channel's inbound items.
///
/// Yields `Ok` items in receipt order. A terminal
/// [`ChannelError::Terminated`] error is the last item.
pub struct MessageStream {
    inner: Pin<Box<dyn Stream<Item = BusItem> + Send>>,
}

impl MessageStream {
    fn new(mut rx: mpsc::Receiver<Inbound>, bus: Arc<Mutex<BusState>>) -> Self {
        let stream = async_stream::stream! {
            while let Some(item) = rx.recv().await {
                yield Ok(item);
            }
            let terminal = bus.lock().unwrap_or_else(PoisonError::into_inner).terminal;
            if let Some(reason) = terminal {
                yield Err(ChannelError::Terminated(reason).into());
            }
        };
        Self {
            inner: Box::pin(stream),
        }
    }
}

impl Stream for MessageStream {
    type Item = BusItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream").finish_non_exhaustive()
    }
}

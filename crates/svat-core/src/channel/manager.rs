//! Resilient duplex channel with bounded reconnects.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::{Error, TerminationReason, TransportError};
use crate::session::AuthGateway;
use crate::traits::{ChannelConnection, ChannelEvent, ChannelSender, ChannelTransport};
use crate::types::{ChannelEndpoint, ResourceId};

use super::{ConnectionState, Inbound, MessageBus, MessageStream, ReconnectPolicy};

/// Keeps one duplex channel open to a named resource.
///
/// Each [`connect`](Self::connect) starts a session driven by a background
/// task. The task opens the channel with the current access token (it never
/// refreshes), publishes inbound frames to the session's [`MessageBus`] and
/// reconnects after a failure with a delay of `base_delay * attempt`. Past
/// `max_attempts` the session terminates and subscribers receive one
/// terminal error.
///
/// [`disconnect`](Self::disconnect) always wins: once called no further
/// open is attempted and nothing more is delivered.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use futures_util::StreamExt;
/// use svat_core::channel::{ConnectionManager, ReconnectPolicy};
/// use svat_core::{AuthGateway, ChannelEndpoint, ResourceId};
/// # use svat_core::traits::ChannelTransport;
///
/// # async fn example(gateway: AuthGateway, transport: Arc<dyn ChannelTransport>) -> svat_core::Result<()> {
/// let endpoint = ChannelEndpoint::new("wss://api.example.com/ws")?;
/// let manager = ConnectionManager::new(endpoint, gateway, transport, ReconnectPolicy::default());
///
/// let mut messages = manager.connect(ResourceId::new("reports-42")?).await;
/// manager.send_message(&serde_json::json!({ "message": "What changed?" }));
/// while let Some(item) = messages.next().await {
///     println!("{:?}", item?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ConnectionManager {
    endpoint: ChannelEndpoint,
    gateway: AuthGateway,
    transport: Arc<dyn ChannelTransport>,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    session: Mutex<Option<Session>>,
    /// Serializes connect and disconnect.
    lifecycle: tokio::sync::Mutex<()>,
}

struct Session {
    resource: ResourceId,
    bus: MessageBus,
    commands: mpsc::UnboundedSender<Command>,
    driver: JoinHandle<()>,
}

#[derive(Debug)]
enum Command {
    Send(String),
    Disconnect,
}

impl ConnectionManager {
    pub fn new(
        endpoint: ChannelEndpoint,
        gateway: AuthGateway,
        transport: Arc<dyn ChannelTransport>,
        policy: ReconnectPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            endpoint,
            gateway,
            transport,
            policy,
            state: Arc::new(state),
            session: Mutex::new(None),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions. Intermediate states may be coalesced.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// The resource of the current session, if any.
    pub fn resource(&self) -> Option<ResourceId> {
        self.lock_session().as_ref().map(|s| s.resource.clone())
    }

    /// Open a channel to `resource` and subscribe to its messages.
    ///
    /// Connecting to the resource of a live session only adds a
    /// subscription. Any other session is torn down first and its
    /// subscribers receive a terminal error.
    #[instrument(skip(self), fields(resource = %resource))]
    pub async fn connect(&self, resource: ResourceId) -> MessageStream {
        let _lifecycle = self.lifecycle.lock().await;

        let previous = {
            let mut session = self.lock_session();
            if let Some(live) = session.as_ref()
                && live.resource == resource
                && !live.bus.is_terminated()
            {
                debug!("Already connected, adding subscriber");
                return live.bus.subscribe();
            }
            session.take()
        };

        if let Some(previous) = previous {
            info!(previous = %previous.resource, "Replacing channel session");
            previous.shutdown(&self.state, self.shutdown_grace()).await;
        }

        let bus = MessageBus::new();
        let messages = bus.subscribe();
        let (commands, commands_rx) = mpsc::unbounded_channel();

        self.state.send_replace(ConnectionState::Connecting);
        info!("Connecting channel");

        let driver = Driver {
            resource: resource.clone(),
            endpoint: self.endpoint.clone(),
            gateway: self.gateway.clone(),
            transport: self.transport.clone(),
            policy: self.policy,
            state: self.state.clone(),
            bus: bus.clone(),
            commands: commands_rx,
        };

        *self.lock_session() = Some(Session {
            resource,
            bus,
            commands,
            driver: tokio::spawn(driver.run()),
        });

        messages
    }

    /// An additional subscription to the current session.
    ///
    /// Returns `None` when there is no session. A terminated session yields
    /// its terminal error immediately.
    pub fn subscribe(&self) -> Option<MessageStream> {
        self.lock_session().as_ref().map(|s| s.bus.subscribe())
    }

    /// Send a JSON payload. Dropped silently unless the channel is open.
    pub fn send_message(&self, payload: &Value) {
        if !self.state().is_open() {
            debug!("Channel not open, dropping message");
            return;
        }
        if let Some(session) = self.lock_session().as_ref()
            && session.commands.send(Command::Send(payload.to_string())).is_err()
        {
            debug!("Channel driver gone, dropping message");
        }
    }

    /// End the session for good.
    ///
    /// Closes the open handle, cancels any pending reconnect or open and
    /// delivers a terminal error to subscribers. Idempotent.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock().await;
        let session = self.lock_session().take();
        match session {
            Some(session) => {
                info!(resource = %session.resource, "Disconnecting channel");
                session.shutdown(&self.state, self.shutdown_grace()).await;
            }
            None => {
                self.state.send_replace(ConnectionState::Terminated);
            }
        }
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// How long a shutdown waits for the driver before aborting it. Covers
    /// one bounded close plus scheduling slack.
    fn shutdown_grace(&self) -> Duration {
        self.policy.connect_timeout.saturating_mul(2)
    }
}

impl Session {
    async fn shutdown(self, state: &watch::Sender<ConnectionState>, grace: Duration) {
        state.send_if_modified(|current| {
            if current.is_terminated() {
                false
            } else {
                *current = ConnectionState::Closing;
                true
            }
        });
        self.bus.terminate(TerminationReason::Disconnected);
        let _ = self.commands.send(Command::Disconnect);

        let mut driver = self.driver;
        match tokio::time::timeout(grace, &mut driver).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Channel driver failed"),
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "Channel driver stuck, aborting");
                driver.abort();
            }
        }
        state.send_replace(ConnectionState::Terminated);
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("resource", &self.resource())
            .finish()
    }
}

/// Background task owning one channel session.
struct Driver {
    resource: ResourceId,
    endpoint: ChannelEndpoint,
    gateway: AuthGateway,
    transport: Arc<dyn ChannelTransport>,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    bus: MessageBus,
    commands: mpsc::UnboundedReceiver<Command>,
}

enum Opened {
    Ready(ChannelConnection),
    Failed(Error),
    Cancelled,
}

enum Pumped {
    Lost,
    Cancelled,
}

impl Driver {
    #[instrument(name = "channel", skip(self), fields(resource = %self.resource))]
    async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            match self.open().await {
                Opened::Cancelled => return self.finish(TerminationReason::Disconnected),
                Opened::Ready(connection) => {
                    attempt = 0;
                    self.advance(ConnectionState::Open);
                    info!("Channel open");
                    if let Pumped::Cancelled = self.pump(connection).await {
                        return self.finish(TerminationReason::Disconnected);
                    }
                }
                Opened::Failed(e) => warn!(error = %e, attempt, "Channel open failed"),
            }

            attempt += 1;
            if self.policy.exhausted(attempt) {
                warn!(
                    attempts = self.policy.max_attempts,
                    "Max reconnect attempts reached"
                );
                return self.finish(TerminationReason::RetriesExhausted {
                    attempts: self.policy.max_attempts,
                });
            }

            let delay = self.policy.delay_for(attempt);
            self.advance(ConnectionState::Reconnecting { attempt });
            info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting");

            if !self.wait(delay).await {
                return self.finish(TerminationReason::Disconnected);
            }
        }
    }

    async fn open(&mut self) -> Opened {
        let token = self.gateway.access_token();
        if token.is_none() {
            debug!("Opening channel without credentials");
        }
        let url = self.endpoint.channel_url(&self.resource, token.as_ref());

        let transport = self.transport.clone();
        let timeout = self.policy.connect_timeout;
        let open = tokio::time::timeout(timeout, transport.open(&url));
        tokio::pin!(open);

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Send(_)) => debug!("Channel not open, dropping message"),
                    Some(Command::Disconnect) | None => return Opened::Cancelled,
                },
                result = &mut open => {
                    return match result {
                        Ok(Ok(connection)) => Opened::Ready(connection),
                        Ok(Err(e)) => Opened::Failed(e),
                        Err(_) => Opened::Failed(
                            TransportError::Timeout {
                                duration_ms: timeout.as_millis() as u64,
                            }
                            .into(),
                        ),
                    };
                }
            }
        }
    }

    async fn pump(&mut self, connection: ChannelConnection) -> Pumped {
        let ChannelConnection {
            mut sender,
            mut events,
        } = connection;

        let mut backlog = VecDeque::new();

        let outcome = loop {
            if let Some(payload) = backlog.pop_front() {
                match self.deliver(sender.as_mut(), payload, &mut backlog).await {
                    Some(outcome) => break outcome,
                    None => continue,
                }
            }

            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Send(payload)) => backlog.push_back(payload),
                    Some(Command::Disconnect) | None => break Pumped::Cancelled,
                },
                event = events.next() => match event {
                    Some(ChannelEvent::Message(text)) => {
                        trace!("Received message");
                        self.bus.publish(Inbound::from_text(&text));
                    }
                    Some(ChannelEvent::Error(message)) => {
                        warn!(error = %message, "Channel transport error");
                        break Pumped::Lost;
                    }
                    Some(ChannelEvent::Closed) | None => {
                        info!("Channel closed by remote");
                        break Pumped::Lost;
                    }
                },
            }
        };

        let timeout = self.policy.connect_timeout;
        match tokio::time::timeout(timeout, sender.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Channel close failed"),
            Err(_) => warn!(timeout_ms = timeout.as_millis() as u64, "Channel close timed out"),
        }
        outcome
    }

    /// Send one payload. A send that outlives the connect timeout counts as
    /// a lost connection; a disconnect abandons it. Payloads queued meanwhile
    /// go to `backlog`.
    ///
    /// Returns `None` once the payload is sent.
    async fn deliver(
        &mut self,
        sender: &mut dyn ChannelSender,
        payload: String,
        backlog: &mut VecDeque<String>,
    ) -> Option<Pumped> {
        trace!("Sending message");
        let timeout = self.policy.connect_timeout;
        let send = tokio::time::timeout(timeout, sender.send(payload));
        tokio::pin!(send);

        loop {
            tokio::select! {
                biased;
                result = &mut send => {
                    return match result {
                        Ok(Ok(())) => None,
                        Ok(Err(e)) => {
                            warn!(error = %e, "Channel send failed");
                            Some(Pumped::Lost)
                        }
                        Err(_) => {
                            warn!(timeout_ms = timeout.as_millis() as u64, "Channel send timed out");
                            Some(Pumped::Lost)
                        }
                    };
                }
                command = self.commands.recv() => match command {
                    Some(Command::Send(payload)) => backlog.push_back(payload),
                    Some(Command::Disconnect) | None => return Some(Pumped::Cancelled),
                },
            }
        }
    }

    /// Sleep out a backoff delay. Returns false if cancelled.
    async fn wait(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(Command::Send(_)) => debug!("Channel not open, dropping message"),
                    Some(Command::Disconnect) | None => return false,
                },
                _ = &mut sleep => return true,
            }
        }
    }

    /// Move to `next` unless the session is already closing or terminated.
    fn advance(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if matches!(current, ConnectionState::Closing | ConnectionState::Terminated)
                || *current == next
            {
                return false;
            }
            debug!(from = %current, to = %next, "Channel state");
            *current = next;
            true
        });
    }

    fn finish(&self, reason: TerminationReason) {
        if self.bus.terminate(reason) {
            info!(%reason, "Channel terminated");
        }
        if let TerminationReason::RetriesExhausted { .. } = reason {
            self.state.send_replace(ConnectionState::Terminated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;
    use crate::credentials::{Activation, Credentials, Registration};
    use crate::error::{AuthError, ChannelError};
    use crate::session::CredentialStore;
    use crate::tokens::{AccessToken, CredentialPair, RefreshToken};
    use crate::traits::{ChannelSender, IdentityApi};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::Instant;

    const BASE: Duration = Duration::from_secs(1);

    /// How the fake transport answers the next open.
    enum Plan {
        Accept,
        /// Accept, but never complete a send.
        Stall,
        Refuse,
        Hang,
    }

    /// The remote end of an accepted fake connection.
    #[derive(Clone)]
    struct Remote {
        events: mpsc::UnboundedSender<ChannelEvent>,
        received: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl Remote {
        fn push(&self, text: &str) {
            let _ = self.events.send(ChannelEvent::Message(text.to_string()));
        }

        fn hang_up(&self) {
            let _ = self.events.send(ChannelEvent::Closed);
        }

        fn received(&self) -> Vec<String> {
            self.received.lock().unwrap().clone()
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct FakeSender {
        received: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
        stalled: bool,
    }

    #[async_trait]
    impl ChannelSender for FakeSender {
        async fn send(&mut self, payload: String) -> Result<()> {
            if self.stalled {
                std::future::pending::<()>().await;
            }
            self.received.lock().unwrap().push(payload);
            Ok(())
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Scripted transport. Once the script is exhausted every open is refused.
    #[derive(Default)]
    struct FakeTransport {
        script: Mutex<VecDeque<Plan>>,
        urls: Mutex<Vec<String>>,
        remotes: Mutex<Vec<Remote>>,
        /// Opens that started while an earlier handle was still open.
        overlapping: AtomicUsize,
    }

    impl FakeTransport {
        fn scripted(plans: impl IntoIterator<Item = Plan>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(plans.into_iter().collect()),
                ..Self::default()
            })
        }

        fn opens(&self) -> usize {
            self.urls.lock().unwrap().len()
        }

        fn urls(&self) -> Vec<String> {
            self.urls.lock().unwrap().clone()
        }

        fn remote(&self, index: usize) -> Remote {
            self.remotes.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl ChannelTransport for FakeTransport {
        async fn open(&self, url: &str) -> Result<ChannelConnection> {
            self.urls.lock().unwrap().push(url.to_string());
            if self.remotes.lock().unwrap().iter().any(|r| !r.is_closed()) {
                self.overlapping.fetch_add(1, Ordering::SeqCst);
            }

            let plan = self.script.lock().unwrap().pop_front().unwrap_or(Plan::Refuse);
            match plan {
                Plan::Refuse => Err(TransportError::Connection {
                    message: "connection refused".to_string(),
                }
                .into()),
                Plan::Hang => std::future::pending().await,
                Plan::Accept | Plan::Stall => {
                    let (events, mut rx) = mpsc::unbounded_channel();
                    let remote = Remote {
                        events,
                        received: Arc::default(),
                        closed: Arc::default(),
                    };
                    self.remotes.lock().unwrap().push(remote.clone());

                    let sender = FakeSender {
                        received: remote.received.clone(),
                        closed: remote.closed.clone(),
                        stalled: matches!(plan, Plan::Stall),
                    };
                    let events = async_stream::stream! {
                        while let Some(event) = rx.recv().await {
                            yield event;
                        }
                    };
                    Ok(ChannelConnection::new(Box::new(sender), Box::pin(events)))
                }
            }
        }
    }

    struct NoRefresh;

    #[async_trait]
    impl IdentityApi for NoRefresh {
        async fn login(&self, _credentials: &Credentials) -> Result<CredentialPair> {
            Err(AuthError::InvalidCredentials.into())
        }

        async fn refresh(&self, _refresh: &RefreshToken) -> Result<AccessToken> {
            panic!("the channel must never refresh");
        }

        async fn register(&self, _registration: &Registration) -> Result<()> {
            Ok(())
        }

        async fn activate(&self, _activation: &Activation) -> Result<()> {
            Ok(())
        }
    }

    fn manager(transport: Arc<FakeTransport>, policy: ReconnectPolicy) -> ConnectionManager {
        let store = CredentialStore::in_memory();
        store.set(CredentialPair::new(
            AccessToken::new("A1"),
            RefreshToken::new("R1"),
        ));
        let gateway = AuthGateway::new(Arc::new(NoRefresh), store);
        let endpoint = ChannelEndpoint::new("ws://localhost:8000/ws").unwrap();
        ConnectionManager::new(endpoint, gateway, transport, policy)
    }

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::default().with_base_delay(BASE)
    }

    fn resource(name: &str) -> ResourceId {
        ResourceId::new(name).unwrap()
    }

    async fn wait_for(manager: &ConnectionManager, expected: ConnectionState) {
        let mut changes = manager.state_changes();
        changes.wait_for(|state| *state == expected).await.unwrap();
    }

    fn terminated_with(item: Option<Result<Inbound>>, expected: TerminationReason) -> bool {
        matches!(
            item,
            Some(Err(Error::Channel(ChannelError::Terminated(reason)))) if reason == expected
        )
    }

    #[tokio::test(start_paused = true)]
    async fn reconnects_after_unexpected_close() {
        let transport = FakeTransport::scripted([Plan::Accept, Plan::Accept, Plan::Accept]);
        let manager = manager(transport.clone(), policy());

        let mut messages = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;
        assert_eq!(
            transport.urls()[0],
            "ws://localhost:8000/ws/chat/reports-42/?token=A1"
        );

        transport.remote(0).push(r#"{"message":"first"}"#);
        assert_eq!(
            messages.next().await.unwrap().unwrap(),
            Inbound::Message(json!({"message": "first"}))
        );

        let closed_at = Instant::now();
        transport.remote(0).hang_up();
        wait_for(&manager, ConnectionState::Reconnecting { attempt: 1 }).await;
        assert!(transport.remote(0).is_closed());

        wait_for(&manager, ConnectionState::Open).await;
        let elapsed = closed_at.elapsed();
        assert!(elapsed >= BASE && elapsed < BASE * 2, "elapsed {:?}", elapsed);
        assert_eq!(transport.opens(), 2);

        // Same subscription keeps receiving across the reconnect.
        transport.remote(1).push(r#"{"message":"second"}"#);
        assert_eq!(
            messages.next().await.unwrap().unwrap(),
            Inbound::Message(json!({"message": "second"}))
        );

        // The attempt counter was reset by the successful open.
        transport.remote(1).hang_up();
        wait_for(&manager, ConnectionState::Reconnecting { attempt: 1 }).await;
        wait_for(&manager, ConnectionState::Open).await;
        assert_eq!(transport.overlapping.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn terminates_once_past_the_ceiling() {
        let transport = FakeTransport::scripted([Plan::Accept]);
        let manager = manager(transport.clone(), policy());

        let mut messages = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;

        let lost_at = Instant::now();
        transport.remote(0).hang_up();
        wait_for(&manager, ConnectionState::Terminated).await;

        // 1 + 2 + 3 + 4 + 5 seconds of backoff.
        let elapsed = lost_at.elapsed();
        assert!(
            elapsed >= BASE * 15 && elapsed < BASE * 16,
            "elapsed {:?}",
            elapsed
        );
        assert_eq!(transport.opens(), 6);

        assert!(terminated_with(
            messages.next().await,
            TerminationReason::RetriesExhausted { attempts: 5 }
        ));
        assert!(messages.next().await.is_none());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(transport.opens(), 6);
        assert_eq!(manager.state(), ConnectionState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn delays_grow_linearly_within_an_outage() {
        let transport = Arc::new(FakeTransport::default());
        let manager = manager(transport.clone(), policy().with_max_attempts(3));
        let mut changes = manager.state_changes();

        let started = Instant::now();
        let _messages = manager.connect(resource("reports-42")).await;

        let mut seen = Vec::new();
        for attempt in 1..=3 {
            changes
                .wait_for(|s| *s == ConnectionState::Reconnecting { attempt })
                .await
                .unwrap();
            seen.push(started.elapsed());
        }
        wait_for(&manager, ConnectionState::Terminated).await;

        // Attempt k is scheduled after the previous k-1 delays have elapsed.
        assert_eq!(seen[0], Duration::ZERO);
        assert_eq!(seen[1], BASE);
        assert_eq!(seen[2], BASE * 3);
        assert_eq!(transport.opens(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let transport = FakeTransport::scripted([Plan::Accept, Plan::Accept]);
        let manager = manager(transport.clone(), policy());

        let mut messages = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;
        transport.remote(0).hang_up();
        wait_for(&manager, ConnectionState::Reconnecting { attempt: 1 }).await;

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Terminated);

        tokio::time::sleep(BASE * 10).await;
        assert_eq!(transport.opens(), 1);
        assert_eq!(manager.state(), ConnectionState::Terminated);

        assert!(terminated_with(
            messages.next().await,
            TerminationReason::Disconnected
        ));
        assert!(messages.next().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_hanging_open() {
        let transport = FakeTransport::scripted([Plan::Hang]);
        let manager = manager(transport.clone(), policy());

        let mut messages = manager.connect(resource("reports-42")).await;
        tokio::task::yield_now().await;
        assert_eq!(manager.state(), ConnectionState::Connecting);

        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Terminated);
        assert!(terminated_with(
            messages.next().await,
            TerminationReason::Disconnected
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_closes_open_handle() {
        let transport = FakeTransport::scripted([Plan::Accept]);
        let manager = manager(transport.clone(), policy());

        let _messages = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;

        manager.disconnect().await;
        assert!(transport.remote(0).is_closed());
        assert_eq!(manager.state(), ConnectionState::Terminated);
        assert!(manager.subscribe().is_none());

        // Idempotent.
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_timeout_counts_as_failure() {
        let transport = FakeTransport::scripted([Plan::Hang, Plan::Accept]);
        let policy = policy().with_connect_timeout(Duration::from_secs(10));
        let manager = manager(transport.clone(), policy);

        let started = Instant::now();
        let _messages = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Reconnecting { attempt: 1 }).await;
        assert_eq!(started.elapsed(), Duration::from_secs(10));

        wait_for(&manager, ConnectionState::Open).await;
        assert_eq!(transport.opens(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn messages_are_sent_only_while_open() {
        let transport = FakeTransport::scripted([Plan::Accept]);
        let manager = manager(transport.clone(), policy());

        // Before any session: dropped.
        manager.send_message(&json!({"message": "too early"}));

        let _messages = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;
        manager.send_message(&json!({"message": "hello"}));
        tokio::task::yield_now().await;

        let remote = transport.remote(0);
        assert_eq!(remote.received(), vec![r#"{"message":"hello"}"#.to_string()]);

        remote.hang_up();
        wait_for(&manager, ConnectionState::Reconnecting { attempt: 1 }).await;
        manager.send_message(&json!({"message": "during outage"}));
        tokio::task::yield_now().await;
        assert_eq!(remote.received().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn subscribers_see_only_later_messages() {
        let transport = FakeTransport::scripted([Plan::Accept]);
        let manager = manager(transport.clone(), policy());

        let mut first = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;
        let remote = transport.remote(0);

        remote.push(r#"{"n":1}"#);
        assert_eq!(first.next().await.unwrap().unwrap(), Inbound::Message(json!({"n": 1})));

        let mut second = manager.subscribe().unwrap();
        remote.push(r#"{"n":2}"#);
        remote.push(r#"{"error":"Collection not found"}"#);

        assert_eq!(first.next().await.unwrap().unwrap(), Inbound::Message(json!({"n": 2})));
        assert_eq!(second.next().await.unwrap().unwrap(), Inbound::Message(json!({"n": 2})));
        assert_eq!(
            second.next().await.unwrap().unwrap(),
            Inbound::Error("Collection not found".to_string())
        );
        assert_eq!(manager.state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn connecting_to_same_resource_shares_the_session() {
        let transport = FakeTransport::scripted([Plan::Accept]);
        let manager = manager(transport.clone(), policy());

        let _first = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;
        let _second = manager.connect(resource("reports-42")).await;

        assert_eq!(transport.opens(), 1);
        assert_eq!(manager.state(), ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn connecting_elsewhere_supersedes_the_old_session() {
        let transport = FakeTransport::scripted([Plan::Accept, Plan::Accept]);
        let manager = manager(transport.clone(), policy());

        let mut old = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;

        let _new = manager.connect(resource("reports-43")).await;
        assert!(transport.remote(0).is_closed());
        assert!(terminated_with(old.next().await, TerminationReason::Disconnected));
        assert!(old.next().await.is_none());

        wait_for(&manager, ConnectionState::Open).await;
        assert!(transport.urls()[1].contains("/chat/reports-43/"));
        assert_eq!(manager.resource(), Some(resource("reports-43")));
        assert_eq!(transport.overlapping.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn terminated_session_can_be_reconnected() {
        let transport = FakeTransport::scripted([Plan::Accept]);
        let manager = manager(transport.clone(), policy().with_max_attempts(1));

        let _messages = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;
        transport.remote(0).hang_up();
        wait_for(&manager, ConnectionState::Terminated).await;

        let mut late = manager.subscribe().unwrap();
        assert!(terminated_with(
            late.next().await,
            TerminationReason::RetriesExhausted { attempts: 1 }
        ));

        transport.script.lock().unwrap().push_back(Plan::Accept);
        let _fresh = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;
        assert_eq!(transport.opens(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_wins_over_a_stalled_send() {
        let transport = FakeTransport::scripted([Plan::Stall]);
        let manager = manager(transport.clone(), policy());

        let mut messages = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;
        manager.send_message(&json!({"message": "stuck"}));
        tokio::task::yield_now().await;

        let started = Instant::now();
        tokio::time::timeout(Duration::from_secs(600), manager.disconnect())
            .await
            .expect("disconnect must not wait on a stalled send");
        assert_eq!(started.elapsed(), Duration::ZERO);

        assert_eq!(manager.state(), ConnectionState::Terminated);
        assert!(transport.remote(0).is_closed());
        assert!(terminated_with(messages.next().await, TerminationReason::Disconnected));

        // The lifecycle lock was released: the manager is usable again.
        transport.script.lock().unwrap().push_back(Plan::Accept);
        let _fresh = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_send_counts_as_lost_connection() {
        let transport = FakeTransport::scripted([Plan::Stall, Plan::Accept]);
        let manager = manager(transport.clone(), policy());

        let _messages = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;

        let sent_at = Instant::now();
        manager.send_message(&json!({"message": "stuck"}));
        wait_for(&manager, ConnectionState::Reconnecting { attempt: 1 }).await;
        let timeout = manager.policy().connect_timeout;
        let elapsed = sent_at.elapsed();
        assert!(elapsed >= timeout && elapsed < timeout + BASE, "elapsed {:?}", elapsed);
        assert!(transport.remote(0).is_closed());

        wait_for(&manager, ConnectionState::Open).await;
        assert_eq!(transport.opens(), 2);

        manager.send_message(&json!({"message": "again"}));
        tokio::task::yield_now().await;
        assert_eq!(
            transport.remote(1).received(),
            vec![r#"{"message":"again"}"#.to_string()]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn queued_messages_keep_their_order() {
        let transport = FakeTransport::scripted([Plan::Accept]);
        let manager = manager(transport.clone(), policy());

        let _messages = manager.connect(resource("reports-42")).await;
        wait_for(&manager, ConnectionState::Open).await;
        for n in 0..3 {
            manager.send_message(&json!({ "n": n }));
        }
        tokio::task::yield_now().await;

        assert_eq!(
            transport.remote(0).received(),
            vec![
                r#"{"n":0}"#.to_string(),
                r#"{"n":1}"#.to_string(),
                r#"{"n":2}"#.to_string(),
            ]
        );
    }
}

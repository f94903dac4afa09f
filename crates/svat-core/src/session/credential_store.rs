//! Credential store with change notification.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::tokens::{AccessToken, CredentialPair, RefreshToken};
use crate::traits::KeyValueStore;

use super::MemoryStore;

/// Slot key holding the access token.
pub const ACCESS_KEY: &str = "access_token";

/// Slot key holding the refresh token.
pub const REFRESH_KEY: &str = "refresh_token";

const CHANGE_CAPACITY: usize = 16;

/// Holds the current credential pair and publishes every change.
///
/// The in-memory pair is authoritative. Each write is mirrored to the
/// injected [`KeyValueStore`]; a failing slot is logged and does not fail
/// the write. Writes are serialized under one lock and notifications are
/// sent under the same lock, so observers see changes in write order.
///
/// Cheap to clone; all clones share the same pair.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    slot: Arc<dyn KeyValueStore>,
    current: Mutex<Option<CredentialPair>>,
    changes: broadcast::Sender<Option<CredentialPair>>,
}

impl CredentialStore {
    /// Create a store backed by `slot`, restoring any pair it already holds.
    pub fn new(slot: Arc<dyn KeyValueStore>) -> Self {
        let current = load(slot.as_ref());
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                slot,
                current: Mutex::new(current),
                changes,
            }),
        }
    }

    /// Create a store that keeps credentials for the process lifetime only.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn get(&self) -> Option<CredentialPair> {
        self.lock().clone()
    }

    pub fn access_token(&self) -> Option<AccessToken> {
        self.lock().as_ref().map(|pair| pair.access.clone())
    }

    pub fn refresh_token(&self) -> Option<RefreshToken> {
        self.lock().as_ref().map(|pair| pair.refresh.clone())
    }

    /// True iff an access token is present.
    pub fn is_authenticated(&self) -> bool {
        self.lock().is_some()
    }

    /// Replace the stored pair. Last write wins.
    pub fn set(&self, pair: CredentialPair) {
        let mut current = self.lock();
        self.persist(Some(&pair));
        *current = Some(pair.clone());
        let _ = self.inner.changes.send(Some(pair));
        debug!("Stored credentials");
    }

    /// Remove the stored pair. Clearing an empty store notifies nobody.
    pub fn clear(&self) {
        let mut current = self.lock();
        self.persist(None);
        if current.take().is_some() {
            let _ = self.inner.changes.send(None);
            debug!("Cleared credentials");
        }
    }

    /// Swap in a new access token, but only while the pair still holds
    /// `expected` as its refresh token.
    ///
    /// Returns `None` when the pair was cleared or replaced in the meantime,
    /// e.g. by a logout racing a refresh.
    pub(crate) fn replace_access(
        &self,
        expected: &RefreshToken,
        access: AccessToken,
    ) -> Option<CredentialPair> {
        let mut current = self.lock();
        let refresh = match current.as_ref() {
            Some(pair) if &pair.refresh == expected => pair.refresh.clone(),
            _ => return None,
        };
        let pair = CredentialPair::new(access, refresh);
        self.persist(Some(&pair));
        *current = Some(pair.clone());
        let _ = self.inner.changes.send(Some(pair.clone()));
        Some(pair)
    }

    /// Observe the stored pair.
    ///
    /// The stream yields the current value first, then every later change.
    /// An observer that falls behind is resynchronized with the latest value.
    pub fn on_change(&self) -> CredentialChanges {
        let (initial, mut rx) = {
            let current = self.lock();
            (current.clone(), self.inner.changes.subscribe())
        };
        let store: Weak<StoreInner> = Arc::downgrade(&self.inner);

        let stream = async_stream::stream! {
            yield initial;
            loop {
                match rx.recv().await {
                    Ok(pair) => yield pair,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Credential observer lagged, resynchronizing");
                        let Some(inner) = store.upgrade() else { break };
                        // Writes notify under this lock, so the fresh receiver
                        // starts exactly after `latest`.
                        let latest = {
                            let current = inner
                                .current
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner);
                            rx = rx.resubscribe();
                            current.clone()
                        };
                        yield latest;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        CredentialChanges {
            inner: Box::pin(stream),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<CredentialPair>> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, pair: Option<&CredentialPair>) {
        let slot = self.inner.slot.as_ref();
        let result = match pair {
            Some(pair) => slot
                .set(ACCESS_KEY, pair.access.as_str())
                .and_then(|_| slot.set(REFRESH_KEY, pair.refresh.as_str())),
            None => slot.remove(ACCESS_KEY).and_then(|_| slot.remove(REFRESH_KEY)),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist credentials");
        }
    }
}

fn load(slot: &dyn KeyValueStore) -> Option<CredentialPair> {
    match (slot.get(ACCESS_KEY), slot.get(REFRESH_KEY)) {
        (Ok(Some(access)), Ok(Some(refresh))) => {
            debug!("Restored stored credentials");
            Some(CredentialPair::new(
                AccessToken::new(access),
                RefreshToken::new(refresh),
            ))
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "Failed to load stored credentials");
            None
        }
        _ => None,
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

/// A stream of credential pair changes; `None` means logged out.
pub struct CredentialChanges {
    inner: Pin<Box<dyn Stream<Item = Option<CredentialPair>> + Send>>,
}

impl Stream for CredentialChanges {
    type Item = Option<CredentialPair>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

//! Authentication gateway with single-flight refresh.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, instrument, warn};

use crate::credentials::{Activation, Credentials, Registration};
use crate::error::AuthError;
use crate::tokens::{AccessToken, CredentialPair};
use crate::traits::IdentityApi;
use crate::Result;

use super::CredentialStore;

type RefreshFlight = Shared<BoxFuture<'static, Result<CredentialPair>>>;

/// Login, logout, registration, activation and token refresh.
///
/// The gateway owns the single-flight refresh: while a refresh is in
/// progress every other caller of [`AuthGateway::refresh`] joins it and
/// observes the same pair or the same error. The pending slot is cleared by
/// the refresh itself, once, after it has updated the store.
///
/// Cheap to clone (internal `Arc`) and safe to share across tasks.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use svat_core::{AuthGateway, CredentialStore, Credentials};
/// # use svat_core::traits::IdentityApi;
///
/// # async fn example(identity: Arc<dyn IdentityApi>) -> svat_core::Result<()> {
/// let gateway = AuthGateway::new(identity, CredentialStore::in_memory());
/// gateway.login(&Credentials::new("alice@example.com", "hunter2")).await?;
/// assert!(gateway.is_authenticated());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct AuthGateway {
    inner: Arc<GatewayInner>,
}

struct GatewayInner {
    identity: Arc<dyn IdentityApi>,
    store: CredentialStore,
    pending: Mutex<Option<RefreshFlight>>,
}

impl AuthGateway {
    pub fn new(identity: Arc<dyn IdentityApi>, store: CredentialStore) -> Self {
        Self {
            inner: Arc::new(GatewayInner {
                identity,
                store,
                pending: Mutex::new(None),
            }),
        }
    }

    /// The credential store this gateway writes to.
    pub fn store(&self) -> &CredentialStore {
        &self.inner.store
    }

    /// True iff an access token is present.
    pub fn is_authenticated(&self) -> bool {
        self.inner.store.is_authenticated()
    }

    /// The current access token, if logged in.
    pub fn access_token(&self) -> Option<AccessToken> {
        self.inner.store.access_token()
    }

    /// Authenticate and store the resulting credential pair.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] if the identity endpoint
    /// refuses the credentials. The store is left untouched on any failure.
    #[instrument(skip(self, credentials), fields(identifier = %credentials.identifier()))]
    pub async fn login(&self, credentials: &Credentials) -> Result<CredentialPair> {
        info!("Logging in");
        let pair = self.inner.identity.login(credentials).await?;
        self.inner.store.set(pair.clone());
        debug!("Login succeeded");
        Ok(pair)
    }

    /// Create a new account. Does not touch the credential store.
    #[instrument(skip(self, registration), fields(identifier = %registration.identifier))]
    pub async fn register(&self, registration: &Registration) -> Result<()> {
        info!("Registering account");
        self.inner.identity.register(registration).await
    }

    /// Activate an account from its e-mailed link.
    #[instrument(skip(self, activation), fields(user_id = %activation.user_id))]
    pub async fn activate(&self, activation: &Activation) -> Result<()> {
        info!("Activating account");
        self.inner.identity.activate(activation).await
    }

    /// Obtain a new access token, sharing any refresh already in flight.
    ///
    /// On success the new access token is stored next to the existing
    /// refresh token.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::SessionExpired`] and clears the store when there
    /// is no refresh token or the identity endpoint rejects it. Transport
    /// failures are returned as-is and leave the store untouched.
    pub async fn refresh(&self) -> Result<CredentialPair> {
        let flight = {
            let mut pending = self.inner.lock_pending();
            match pending.as_ref() {
                Some(flight) => {
                    debug!("Joining in-flight refresh");
                    flight.clone()
                }
                None => {
                    let flight = run_refresh(self.inner.clone()).boxed().shared();
                    *pending = Some(flight.clone());
                    flight
                }
            }
        };
        flight.await
    }

    /// Forget the credential pair. Local only and idempotent.
    pub fn logout(&self) {
        info!("Logging out");
        self.inner.store.clear();
    }
}

impl GatewayInner {
    fn lock_pending(&self) -> MutexGuard<'_, Option<RefreshFlight>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[instrument(skip(self))]
    async fn refresh_once(&self) -> Result<CredentialPair> {
        info!("Refreshing access token");

        let Some(refresh) = self.store.refresh_token() else {
            warn!("No refresh token available");
            self.store.clear();
            return Err(AuthError::SessionExpired.into());
        };

        match self.identity.refresh(&refresh).await {
            Ok(access) => match self.store.replace_access(&refresh, access) {
                Some(pair) => {
                    debug!("Access token refreshed");
                    Ok(pair)
                }
                None => match self.store.get() {
                    // Someone logged in again while we were refreshing.
                    Some(pair) => Ok(pair),
                    None => Err(AuthError::SessionExpired.into()),
                },
            },
            Err(e) if e.is_refresh_rejection() || e.is_session_expired() => {
                warn!(error = %e, "Refresh token rejected, clearing session");
                self.store.clear();
                Err(AuthError::SessionExpired.into())
            }
            Err(e) => {
                warn!(error = %e, "Refresh failed");
                Err(e)
            }
        }
    }
}

async fn run_refresh(inner: Arc<GatewayInner>) -> Result<CredentialPair> {
    let outcome = inner.refresh_once().await;
    inner.lock_pending().take();
    outcome
}

impl std::fmt::Debug for AuthGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGateway")
            .field("store", &self.inner.store)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, FieldErrors, TransportError};
    use crate::tokens::RefreshToken;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Scripted identity endpoint.
    struct FakeIdentity {
        refresh_calls: AtomicUsize,
        refresh_result: Mutex<Result<AccessToken>>,
    }

    impl FakeIdentity {
        fn new(refresh_result: Result<AccessToken>) -> Arc<Self> {
            Arc::new(Self {
                refresh_calls: AtomicUsize::new(0),
                refresh_result: Mutex::new(refresh_result),
            })
        }

        fn refresh_calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IdentityApi for FakeIdentity {
        async fn login(&self, credentials: &Credentials) -> Result<CredentialPair> {
            if credentials.secret() == "right" {
                Ok(pair("A1", "R1"))
            } else {
                Err(AuthError::InvalidCredentials.into())
            }
        }

        async fn refresh(&self, refresh: &RefreshToken) -> Result<AccessToken> {
            assert_eq!(refresh.as_str(), "R1");
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.refresh_result.lock().unwrap().clone()
        }

        async fn register(&self, registration: &Registration) -> Result<()> {
            if registration.secret() == registration.secret_confirmation() {
                Ok(())
            } else {
                let mut fields = FieldErrors::default();
                fields.push("non_field_errors", "The two password fields didn't match.");
                Err(AuthError::Validation(fields).into())
            }
        }

        async fn activate(&self, activation: &Activation) -> Result<()> {
            if activation.token == "good" {
                Ok(())
            } else {
                Err(AuthError::Activation {
                    detail: "Stale token for given user.".to_string(),
                }
                .into())
            }
        }
    }

    fn pair(access: &str, refresh: &str) -> CredentialPair {
        CredentialPair::new(AccessToken::new(access), RefreshToken::new(refresh))
    }

    #[tokio::test]
    async fn login_stores_pair() {
        let gateway = AuthGateway::new(
            FakeIdentity::new(Ok(AccessToken::new("A2"))),
            CredentialStore::in_memory(),
        );
        let result = gateway.login(&Credentials::new("a@b.c", "right")).await.unwrap();
        assert_eq!(result, pair("A1", "R1"));
        assert_eq!(gateway.store().get(), Some(pair("A1", "R1")));
        assert!(gateway.is_authenticated());
    }

    #[tokio::test]
    async fn failed_login_leaves_store_untouched() {
        let store = CredentialStore::in_memory();
        store.set(pair("A0", "R0"));
        let gateway = AuthGateway::new(FakeIdentity::new(Ok(AccessToken::new("A2"))), store);

        let err = gateway
            .login(&Credentials::new("a@b.c", "wrong"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::InvalidCredentials)));
        assert_eq!(gateway.store().get(), Some(pair("A0", "R0")));
    }

    #[tokio::test]
    async fn register_surfaces_field_errors_and_skips_store() {
        let gateway = AuthGateway::new(
            FakeIdentity::new(Ok(AccessToken::new("A2"))),
            CredentialStore::in_memory(),
        );
        let err = gateway
            .register(&Registration::new("a@b.c", "A", "one", "two"))
            .await
            .unwrap_err();
        match err {
            Error::Auth(AuthError::Validation(fields)) => {
                assert!(fields.get("non_field_errors").is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!gateway.is_authenticated());
    }

    #[tokio::test]
    async fn activate_reports_activation_error() {
        let gateway = AuthGateway::new(
            FakeIdentity::new(Ok(AccessToken::new("A2"))),
            CredentialStore::in_memory(),
        );
        gateway.activate(&Activation::new("MQ", "good")).await.unwrap();
        let err = gateway
            .activate(&Activation::new("MQ", "stale"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::Activation { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn refresh_keeps_login_refresh_token() {
        let identity = FakeIdentity::new(Ok(AccessToken::new("A2")));
        let store = CredentialStore::in_memory();
        store.set(pair("A1", "R1"));
        let gateway = AuthGateway::new(identity.clone(), store);

        let refreshed = gateway.refresh().await.unwrap();
        assert_eq!(refreshed, pair("A2", "R1"));
        assert_eq!(gateway.store().get(), Some(pair("A2", "R1")));
        assert_eq!(identity.refresh_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_refreshes_share_one_call() {
        let identity = FakeIdentity::new(Ok(AccessToken::new("A2")));
        let store = CredentialStore::in_memory();
        store.set(pair("A1", "R1"));
        let gateway = AuthGateway::new(identity.clone(), store);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let gateway = gateway.clone();
                tokio::spawn(async move { gateway.refresh().await })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), pair("A2", "R1"));
        }
        assert_eq!(identity.refresh_calls(), 1);

        // The slot is free again once the flight has landed.
        gateway.refresh().await.unwrap();
        assert_eq!(identity.refresh_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_the_same_failure() {
        let identity = FakeIdentity::new(Err(AuthError::RefreshRejected.into()));
        let store = CredentialStore::in_memory();
        store.set(pair("A1", "R1"));
        let gateway = AuthGateway::new(identity.clone(), store);

        let (a, b) = tokio::join!(gateway.refresh(), gateway.refresh());
        assert!(a.unwrap_err().is_session_expired());
        assert!(b.unwrap_err().is_session_expired());
        assert_eq!(identity.refresh_calls(), 1);
        assert!(!gateway.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_keeps_session() {
        let identity = FakeIdentity::new(Err(TransportError::Connection {
            message: "connection refused".to_string(),
        }
        .into()));
        let store = CredentialStore::in_memory();
        store.set(pair("A1", "R1"));
        let gateway = AuthGateway::new(identity, store);

        let err = gateway.refresh().await.unwrap_err();
        assert!(err.is_transport());
        assert!(gateway.is_authenticated());
    }

    #[tokio::test]
    async fn refresh_without_session_expires() {
        let identity = FakeIdentity::new(Ok(AccessToken::new("A2")));
        let gateway = AuthGateway::new(identity.clone(), CredentialStore::in_memory());
        let err = gateway.refresh().await.unwrap_err();
        assert!(err.is_session_expired());
        assert_eq!(identity.refresh_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_during_refresh_wins() {
        let identity = FakeIdentity::new(Ok(AccessToken::new("A2")));
        let store = CredentialStore::in_memory();
        store.set(pair("A1", "R1"));
        let gateway = AuthGateway::new(identity, store);

        let pending = tokio::spawn({
            let gateway = gateway.clone();
            async move { gateway.refresh().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        gateway.logout();

        let err = pending.await.unwrap().unwrap_err();
        assert!(err.is_session_expired());
        assert!(!gateway.is_authenticated());
    }

    #[test]
    fn logout_is_idempotent() {
        let identity = FakeIdentity::new(Ok(AccessToken::new("A2")));
        let store = CredentialStore::in_memory();
        store.set(pair("A1", "R1"));
        let gateway = AuthGateway::new(identity, store);
        gateway.logout();
        gateway.logout();
        assert!(!gateway.is_authenticated());
    }
}

//! Identity endpoint trait.

use async_trait::async_trait;

use crate::credentials::{Activation, Credentials, Registration};
use crate::tokens::{AccessToken, CredentialPair, RefreshToken};
use crate::Result;

/// The identity endpoint: login, refresh, registration and activation.
///
/// Implementations map server refusals onto the typed taxonomy:
/// a refused login is [`AuthError::InvalidCredentials`], a refused refresh
/// token is [`AuthError::RefreshRejected`], registration field errors are
/// [`AuthError::Validation`] and a bad activation link is
/// [`AuthError::Activation`].
///
/// [`AuthError::InvalidCredentials`]: crate::error::AuthError::InvalidCredentials
/// [`AuthError::RefreshRejected`]: crate::error::AuthError::RefreshRejected
/// [`AuthError::Validation`]: crate::error::AuthError::Validation
/// [`AuthError::Activation`]: crate::error::AuthError::Activation
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Exchange credentials for a fresh credential pair.
    async fn login(&self, credentials: &Credentials) -> Result<CredentialPair>;

    /// Exchange a refresh token for a new access token.
    async fn refresh(&self, refresh: &RefreshToken) -> Result<AccessToken>;

    /// Create a new, inactive account.
    async fn register(&self, registration: &Registration) -> Result<()>;

    /// Activate an account from its e-mailed link.
    async fn activate(&self, activation: &Activation) -> Result<()>;
}

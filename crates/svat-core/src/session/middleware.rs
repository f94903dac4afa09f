//! Bearer-token request middleware with refresh-and-retry.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::error::AuthError;
use crate::request::{ApiRequest, ApiResponse};
use crate::tokens::AccessToken;
use crate::traits::RequestTransport;
use crate::Result;

use super::AuthGateway;

/// Attaches the current access token to outbound requests and recovers
/// from an expired token with exactly one refresh-and-retry.
///
/// Identity endpoints (`/auth/...`) pass through untouched: no bearer
/// header and no refresh on `401`.
///
/// Every status other than a final `401` is returned as a response for
/// the caller to interpret.
#[derive(Clone)]
pub struct RequestMiddleware {
    gateway: AuthGateway,
    transport: Arc<dyn RequestTransport>,
}

impl RequestMiddleware {
    pub fn new(gateway: AuthGateway, transport: Arc<dyn RequestTransport>) -> Self {
        Self { gateway, transport }
    }

    pub fn gateway(&self) -> &AuthGateway {
        &self.gateway
    }

    /// Send a request, refreshing the access token at most once.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Unauthorized`] if the retried request is still refused
    /// - [`AuthError::SessionExpired`] if the refresh token was rejected; the
    ///   session is logged out so later calls do not repeat the cycle
    /// - transport errors from either attempt
    #[instrument(skip(self, request), fields(path = %request.path))]
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        if request.is_identity_call() {
            debug!("Identity call, sending without credentials");
            return self.transport.send(&request).await;
        }

        let used = self.gateway.access_token();
        let response = self
            .transport
            .send(&with_bearer(&request, used.as_ref()))
            .await?;

        if !response.is_unauthorized() {
            return Ok(response);
        }

        debug!("Request unauthorized, refreshing");
        let token = match self.fresh_token(used.as_ref()).await {
            Ok(token) => token,
            Err(e) => {
                if e.is_session_expired() {
                    self.gateway.logout();
                }
                return Err(e);
            }
        };

        let retry = self
            .transport
            .send(&with_bearer(&request, Some(&token)))
            .await?;

        if retry.is_unauthorized() {
            warn!("Request still unauthorized after refresh");
            return Err(AuthError::Unauthorized.into());
        }

        Ok(retry)
    }

    /// A token newer than `used`: either one another request already
    /// installed, or the result of a (shared) refresh.
    async fn fresh_token(&self, used: Option<&AccessToken>) -> Result<AccessToken> {
        if let Some(current) = self.gateway.access_token()
            && used.is_some_and(|used| used != &current)
        {
            debug!("Access token already replaced, retrying without refresh");
            return Ok(current);
        }
        Ok(self.gateway.refresh().await?.access)
    }
}

fn with_bearer(request: &ApiRequest, token: Option<&AccessToken>) -> ApiRequest {
    match token {
        Some(token) => request.clone().with_header("authorization", token.bearer()),
        None => request.clone(),
    }
}

impl std::fmt::Debug for RequestMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestMiddleware")
            .field("gateway", &self.gateway)
            .finish_non_exhaustive()
    }
}

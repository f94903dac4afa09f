//! HTTP identity endpoint.

use async_trait::async_trait;
use tracing::{debug, instrument, warn};

use svat_core::error::{AuthError, FieldErrors};
use svat_core::request::ApiResponse;
use svat_core::traits::IdentityApi;
use svat_core::{
    AccessToken, Activation, ApiUrl, CredentialPair, Credentials, RefreshToken, Registration,
    Result,
};

use crate::client::{HttpClient, unexpected_status};
use crate::endpoints::*;

/// The `/auth/` identity endpoints over HTTP.
///
/// Refusals are mapped onto [`AuthError`]; any other non-success status is
/// a protocol error.
#[derive(Debug, Clone)]
pub struct HttpIdentity {
    client: HttpClient,
}

impl HttpIdentity {
    pub fn new(client: HttpClient) -> Self {
        Self { client }
    }

    pub fn for_api(api: ApiUrl) -> Result<Self> {
        Ok(Self::new(HttpClient::new(api)?))
    }
}

#[async_trait]
impl IdentityApi for HttpIdentity {
    #[instrument(skip(self, credentials), fields(identifier = %credentials.identifier()))]
    async fn login(&self, credentials: &Credentials) -> Result<CredentialPair> {
        let request = LoginRequest {
            email: credentials.identifier(),
            password: credentials.secret(),
        };
        let response = self.client.post_json(JWT_CREATE, &request).await?;

        match response.status {
            200..=299 => {
                let tokens: TokenPairResponse = response.json()?;
                debug!("Credential pair issued");
                Ok(CredentialPair::new(
                    AccessToken::new(tokens.access),
                    RefreshToken::new(tokens.refresh),
                ))
            }
            400 | 401 => Err(AuthError::InvalidCredentials.into()),
            _ => Err(unexpected_status(&response)),
        }
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh: &RefreshToken) -> Result<AccessToken> {
        let request = RefreshRequest {
            refresh: refresh.as_str(),
        };
        let response = self.client.post_json(JWT_REFRESH, &request).await?;

        match response.status {
            200..=299 => {
                let body: RefreshResponse = response.json()?;
                Ok(AccessToken::new(body.access))
            }
            400 | 401 => {
                warn!(status = response.status, "Refresh token rejected");
                Err(AuthError::RefreshRejected.into())
            }
            _ => Err(unexpected_status(&response)),
        }
    }

    #[instrument(skip(self, registration), fields(identifier = %registration.identifier))]
    async fn register(&self, registration: &Registration) -> Result<()> {
        let request = RegisterRequest {
            email: &registration.identifier,
            full_name: &registration.display_name,
            password: registration.secret(),
            re_password: registration.secret_confirmation(),
        };
        let response = self.client.post_json(USERS, &request).await?;

        match response.status {
            200..=299 => Ok(()),
            400 => Err(AuthError::Validation(FieldErrors::from_json(&body_json(&response))).into()),
            _ => Err(unexpected_status(&response)),
        }
    }

    #[instrument(skip(self, activation), fields(user_id = %activation.user_id))]
    async fn activate(&self, activation: &Activation) -> Result<()> {
        let request = ActivationRequest {
            uid: &activation.user_id,
            token: &activation.token,
        };
        let response = self.client.post_json(USERS_ACTIVATION, &request).await?;

        match response.status {
            200..=299 => Ok(()),
            400 | 403 | 404 => Err(AuthError::Activation {
                detail: activation_detail(&body_json(&response)),
            }
            .into()),
            _ => Err(unexpected_status(&response)),
        }
    }
}

fn body_json(response: &ApiResponse) -> serde_json::Value {
    serde_json::from_slice(&response.body).unwrap_or(serde_json::Value::Null)
}

fn activation_detail(body: &serde_json::Value) -> String {
    if let Some(detail) = body.get("detail").and_then(|d| d.as_str()) {
        return detail.to_string();
    }
    let fields = FieldErrors::from_json(body);
    if fields.is_empty() {
        "activation link is invalid or expired".to_string()
    } else {
        fields.to_string()
    }
}

//! svat-core - Session and connection layer for the svat API.
//!
//! This crate keeps a client authenticated against a bearer-token API whose
//! access tokens expire, and keeps a duplex message channel alive across
//! network interruptions. It is transport-agnostic: the HTTP identity
//! endpoint, the request transport, the channel transport and the credential
//! slot are injected through the traits in [`traits`].
//!
//! # Components
//!
//! - [`CredentialStore`] holds the access/refresh pair and publishes changes.
//! - [`AuthGateway`] logs in and out and owns the single-flight refresh.
//! - [`RequestMiddleware`] attaches the bearer token and retries once after
//!   a refresh.
//! - [`ConnectionManager`] opens and re-opens a channel with linear backoff.
//! - [`MessageBus`] fans inbound messages out to subscribers.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use svat_core::{ApiRequest, AuthGateway, CredentialStore, Credentials, RequestMiddleware};
//! # use svat_core::traits::{IdentityApi, RequestTransport};
//!
//! # async fn example(
//! #     identity: Arc<dyn IdentityApi>,
//! #     transport: Arc<dyn RequestTransport>,
//! # ) -> svat_core::Result<()> {
//! let gateway = AuthGateway::new(identity, CredentialStore::in_memory());
//! gateway.login(&Credentials::new("alice@example.com", "hunter2")).await?;
//!
//! let api = RequestMiddleware::new(gateway, transport);
//! let news = api.send(ApiRequest::get("/news/")).await?;
//! println!("{}", news.status);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod credentials;
pub mod error;
pub mod request;
pub mod session;
pub mod tokens;
pub mod traits;
pub mod types;

pub use channel::{
    ConnectionManager, ConnectionState, Inbound, MessageBus, MessageStream, ReconnectPolicy,
};
pub use credentials::{Activation, Credentials, Registration};
pub use error::Error;
pub use request::{ApiRequest, ApiResponse, FormPart, Method, RequestBody};
pub use session::{AuthGateway, CredentialChanges, CredentialStore, MemoryStore, RequestMiddleware};
pub use tokens::{AccessToken, CredentialPair, RefreshToken};
pub use traits::{ChannelTransport, IdentityApi, KeyValueStore, RequestTransport};
pub use types::{ApiUrl, ChannelEndpoint, ResourceId};

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

//! Wiring of the session layer for one CLI invocation.

pub mod storage;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use tracing::debug;

use svat_core::{ApiUrl, AuthGateway, ChannelEndpoint, CredentialStore, RequestMiddleware};
use svat_file::FileStore;
use svat_http::{HttpClient, HttpIdentity, SvatApi};

use crate::cli::Target;

/// Everything a command needs, built from the global options.
pub struct CliSession {
    pub gateway: AuthGateway,
    pub api: SvatApi,
    pub channel: ChannelEndpoint,
    pub slot: FileStore,
}

impl CliSession {
    /// Build the stack: file slot, credential store, identity endpoint,
    /// gateway, middleware.
    pub fn open(target: &Target) -> Result<Self> {
        let api_url = ApiUrl::new(&target.api_url).context("Invalid API URL")?;
        let channel = ChannelEndpoint::new(&target.ws_url).context("Invalid WebSocket URL")?;

        let slot = storage::open_slot()?;
        debug!(path = %slot.path().display(), api = %api_url, "Opening session");
        let store = CredentialStore::new(Arc::new(slot.clone()));

        let client = HttpClient::new(api_url).context("Failed to create HTTP client")?;
        let identity = HttpIdentity::new(client.clone());
        let gateway = AuthGateway::new(Arc::new(identity), store);
        let middleware = RequestMiddleware::new(gateway.clone(), Arc::new(client));

        Ok(Self {
            gateway,
            api: SvatApi::new(middleware),
            channel,
            slot,
        })
    }

    /// Like [`CliSession::open`], but fails unless credentials are stored.
    pub fn open_authenticated(target: &Target) -> Result<Self> {
        let session = Self::open(target)?;
        if !session.gateway.is_authenticated() {
            bail!("Not logged in. Run 'svat auth login' first.");
        }
        Ok(session)
    }
}

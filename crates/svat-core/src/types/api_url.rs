//! API and channel base URL types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;

use crate::error::{Error, InvalidInputError};
use crate::tokens::AccessToken;

use super::ResourceId;

/// A validated HTTP API base URL.
///
/// Network URLs must use HTTPS (or HTTP for localhost).
///
/// # Example
///
/// ```
/// use svat_core::ApiUrl;
///
/// let api = ApiUrl::new("https://svat.example.org/").unwrap();
/// assert_eq!(api.endpoint("/auth/jwt/create/"),
///            "https://svat.example.org/auth/jwt/create/");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ApiUrl(Url);

impl ApiUrl {
    /// Create a new API URL from a string, validating the format.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not valid or doesn't meet requirements.
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let s = s.as_ref();
        let url = parse(s)?;
        validate(&url, s, ("https", "http"))?;
        Ok(Self(url))
    }

    /// Returns the absolute URL for an endpoint path such as `/news/`.
    pub fn endpoint(&self, path: &str) -> String {
        join(&self.0, path)
    }

    /// Returns the base URL as a string.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the host string.
    pub fn host(&self) -> Option<&str> {
        self.0.host_str()
    }
}

/// A validated WebSocket base URL for duplex channels.
///
/// Must use WSS (or WS for localhost).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChannelEndpoint(Url);

impl ChannelEndpoint {
    pub fn new(s: impl AsRef<str>) -> Result<Self, Error> {
        let s = s.as_ref();
        let url = parse(s)?;
        validate(&url, s, ("wss", "ws"))?;
        Ok(Self(url))
    }

    /// Build the channel URL for a resource, embedding the access token.
    ///
    /// The result has the form `{base}/chat/{resource}/?token={access}`.
    /// When no token is available the query is omitted and the server is
    /// left to refuse the handshake.
    pub fn channel_url(&self, resource: &ResourceId, token: Option<&AccessToken>) -> String {
        let mut url = join(&self.0, &format!("/chat/{}/", resource.as_str()));
        if let Some(token) = token {
            let encoded: String =
                url::form_urlencoded::byte_serialize(token.as_str().as_bytes()).collect();
            url.push_str("?token=");
            url.push_str(&encoded);
        }
        url
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

fn parse(s: &str) -> Result<Url, Error> {
    Url::parse(s).map_err(|e| {
        InvalidInputError::Url {
            value: s.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

fn join(base: &Url, path: &str) -> String {
    // The URL crate always keeps a trailing slash on root paths
    let base = base.as_str().trim_end_matches('/');
    format!("{}/{}", base, path.trim_start_matches('/'))
}

fn validate(url: &Url, original: &str, (secure, plain): (&str, &str)) -> Result<(), Error> {
    if url.cannot_be_a_base() {
        return Err(InvalidInputError::Url {
            value: original.to_string(),
            reason: "must be an absolute URL".to_string(),
        }
        .into());
    }

    let scheme = url.scheme();
    let is_localhost = url
        .host_str()
        .is_some_and(|h| h == "localhost" || h == "127.0.0.1" || h == "[::1]" || h == "::1");

    if scheme != secure && !(scheme == plain && is_localhost) {
        return Err(InvalidInputError::Url {
            value: original.to_string(),
            reason: format!(
                "must use {} ({} allowed only for localhost)",
                secure.to_uppercase(),
                plain.to_uppercase()
            ),
        }
        .into());
    }

    if url.host_str().is_none() {
        return Err(InvalidInputError::Url {
            value: original.to_string(),
            reason: "must have a host".to_string(),
        }
        .into());
    }

    Ok(())
}

impl fmt::Display for ApiUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ChannelEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ApiUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl FromStr for ChannelEndpoint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for ApiUrl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.0.as_str())
    }
}

impl<'de> Deserialize<'de> for ApiUrl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        ApiUrl::new(&s).map_err(serde::de::Error::custom)
    }
}

//! Transport-neutral request and response descriptors.
//!
//! Requests are plain data so the middleware can re-issue them after a
//! token refresh without the body having been consumed.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use crate::error::{Error, InvalidInputError, ProtocolError};

/// Path prefix shared by all identity endpoints.
pub const IDENTITY_PREFIX: &str = "/auth/";

/// Path of the token refresh endpoint.
pub const REFRESH_PATH: &str = "/auth/jwt/refresh/";

/// HTTP method of an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// One part of a multipart form body.
#[derive(Debug, Clone, PartialEq)]
pub enum FormPart {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        filename: String,
        bytes: Vec<u8>,
    },
}

/// The body of an outbound request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Multipart(Vec<FormPart>),
}

/// An outbound API request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the API base, e.g. `/news/`.
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    pub fn with_form(mut self, parts: Vec<FormPart>) -> Self {
        self.body = RequestBody::Multipart(parts);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Returns the `Authorization` header value, if set.
    pub fn authorization(&self) -> Option<&str> {
        self.headers.get("authorization").map(String::as_str)
    }

    /// True for calls to the identity endpoints, which never carry a bearer
    /// token and never trigger a refresh.
    pub fn is_identity_call(&self) -> bool {
        self.path.starts_with(IDENTITY_PREFIX)
    }
}

/// A response from the request transport.
///
/// Any HTTP status is a response; only failures to get one are errors.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn json_body(status: u16, body: &serde_json::Value) -> Self {
        Self::new(status, body.to_string())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    /// Turn a non-success status into a [`ProtocolError`].
    pub fn error_for_status(self) -> Result<Self, Error> {
        if self.is_success() {
            Ok(self)
        } else {
            let body = serde_json::from_slice(&self.body).ok();
            Err(ProtocolError::new(self.status, body).into())
        }
    }

    /// Decode a success body as JSON, mapping non-success statuses to errors.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, Error> {
        let response = self.error_for_status()?;
        let body = if response.body.is_empty() {
            b"null".as_slice()
        } else {
            response.body.as_slice()
        };
        serde_json::from_slice(body).map_err(|e| {
            InvalidInputError::Other {
                message: format!("unexpected response body: {}", e),
            }
            .into()
        })
    }
}

//! reqwest-backed request transport.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use tracing::{debug, instrument, trace};

use svat_core::error::{Error, InvalidInputError, ProtocolError, TransportError};
use svat_core::request::{ApiRequest, ApiResponse, FormPart, Method, RequestBody};
use svat_core::traits::RequestTransport;
use svat_core::{ApiUrl, Result};

/// Default per-request timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client bound to one API base URL.
///
/// Sends [`ApiRequest`]s as-is: headers, including `Authorization`, are
/// the caller's business.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    api: ApiUrl,
    timeout: Duration,
}

impl HttpClient {
    pub fn new(api: ApiUrl) -> Result<Self> {
        Self::with_timeout(api, REQUEST_TIMEOUT)
    }

    pub fn with_timeout(api: ApiUrl, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("svat/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| transport_error(e, timeout))?;

        Ok(Self {
            client,
            api,
            timeout,
        })
    }

    /// Returns the API base URL this client is configured for.
    pub fn api(&self) -> &ApiUrl {
        &self.api
    }

    /// The per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST a JSON body without credentials.
    pub(crate) async fn post_json<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
    where
        B: Serialize,
    {
        let body = serde_json::to_value(body).map_err(|e| InvalidInputError::Other {
            message: e.to_string(),
        })?;
        self.execute(&ApiRequest::post(path).with_json(body)).await
    }

    #[instrument(skip(self, request), fields(method = ?request.method, path = %request.path))]
    pub async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.api.endpoint(&request.path);
        debug!("HTTP request");

        let mut builder = self.client.request(method(request.method), &url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(parts) => builder.multipart(form(parts)),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout))?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, self.timeout))?
            .to_vec();
        trace!(status, len = body.len(), "HTTP response");

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl RequestTransport for HttpClient {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        self.execute(request).await
    }
}

fn method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn form(parts: &[FormPart]) -> Form {
    parts.iter().fold(Form::new(), |form, part| match part {
        FormPart::Text { name, value } => form.text(name.clone(), value.clone()),
        FormPart::File {
            name,
            filename,
            bytes,
        } => form.part(
            name.clone(),
            Part::bytes(bytes.clone()).file_name(filename.clone()),
        ),
    })
}

/// Map a reqwest failure onto the transport taxonomy.
fn transport_error(err: reqwest::Error, timeout: Duration) -> Error {
    let err = if err.is_timeout() {
        TransportError::Timeout {
            duration_ms: timeout.as_millis() as u64,
        }
    } else if err.is_connect() {
        TransportError::Connection {
            message: err.to_string(),
        }
    } else {
        TransportError::Http {
            message: err.to_string(),
        }
    };
    Error::Transport(err)
}

/// A non-success response the caller has no specific mapping for.
pub(crate) fn unexpected_status(response: &ApiResponse) -> Error {
    let body = serde_json::from_slice(&response.body).ok();
    ProtocolError::new(response.status, body).into()
}

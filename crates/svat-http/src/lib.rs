//! svat-http - HTTP and WebSocket transports for the svat session layer.
//!
//! - [`HttpClient`] dispatches [`ApiRequest`](svat_core::ApiRequest)s with
//!   reqwest and is the [`RequestTransport`](svat_core::RequestTransport).
//! - [`HttpIdentity`] talks to the `/auth/` identity endpoints.
//! - [`WsTransport`] opens duplex channels with tokio-tungstenite.
//! - [`SvatApi`] wraps the application endpoints behind the
//!   [`RequestMiddleware`](svat_core::RequestMiddleware).

mod api;
mod client;
pub mod endpoints;
mod identity;
mod websocket;

pub use api::SvatApi;
pub use client::HttpClient;
pub use endpoints::{
    AnalysisResult, CodeUpload, NewsFeed, NewsItem, ReportOptions, ReportUpload, UploadFile,
    Vulnerability,
};
pub use identity::HttpIdentity;
pub use websocket::WsTransport;

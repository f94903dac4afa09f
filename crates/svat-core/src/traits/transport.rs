//! Request transport trait.

use async_trait::async_trait;

use crate::request::{ApiRequest, ApiResponse};
use crate::Result;

/// Dispatches API requests.
///
/// Every HTTP status, including `401`, comes back as an [`ApiResponse`];
/// only failing to obtain a response is an error.
#[async_trait]
pub trait RequestTransport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

//! Application endpoints behind the request middleware.

use tracing::{info, instrument};

use svat_core::error::InvalidInputError;
use svat_core::request::ApiRequest;
use svat_core::{RequestMiddleware, ResourceId, Result};

use crate::endpoints::*;

/// Typed access to the news, report, code analysis and result endpoints.
///
/// Every call goes through the [`RequestMiddleware`], so an expired access
/// token is refreshed once and the call retried. Non-success statuses come
/// back as protocol errors carrying the server's `error` text.
#[derive(Debug, Clone)]
pub struct SvatApi {
    middleware: RequestMiddleware,
}

impl SvatApi {
    pub fn new(middleware: RequestMiddleware) -> Self {
        Self { middleware }
    }

    pub fn middleware(&self) -> &RequestMiddleware {
        &self.middleware
    }

    #[instrument(skip(self))]
    pub async fn news(&self) -> Result<NewsFeed> {
        self.middleware.send(ApiRequest::get(NEWS)).await?.json()
    }

    #[instrument(skip(self), fields(collection = %collection))]
    pub async fn result(&self, collection: &ResourceId) -> Result<AnalysisResult> {
        self.middleware
            .send(ApiRequest::get(result_path(collection.as_str())))
            .await?
            .json()
    }

    /// Upload documents for analysis.
    ///
    /// Each uploaded document becomes a collection that can be opened as a
    /// chat channel.
    #[instrument(skip(self, upload), fields(files = upload.files.len()))]
    pub async fn process_report(&self, upload: &ReportUpload) -> Result<AnalysisResult> {
        if upload.is_empty() {
            return Err(InvalidInputError::Other {
                message: "no files or message provided".to_string(),
            }
            .into());
        }
        info!("Uploading report");
        self.middleware
            .send(ApiRequest::post(REPORT).with_form(upload.to_form()))
            .await?
            .json()
    }

    #[instrument(skip(self, upload), fields(model = %upload.model_name))]
    pub async fn analyze_code(&self, upload: &CodeUpload) -> Result<AnalysisResult> {
        if upload.is_empty() {
            return Err(InvalidInputError::Other {
                message: "either code or a code file must be provided".to_string(),
            }
            .into());
        }
        info!("Uploading code for analysis");
        self.middleware
            .send(ApiRequest::post(CODE_ANALYSIS).with_form(upload.to_form()))
            .await?
            .json()
    }
}

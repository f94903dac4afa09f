//! Endpoint paths and request/response types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use svat_core::request::FormPart;

// ============================================================================
// Endpoint Paths
// ============================================================================

/// Obtain a credential pair.
pub const JWT_CREATE: &str = "/auth/jwt/create/";

/// Exchange a refresh token for an access token.
pub const JWT_REFRESH: &str = svat_core::request::REFRESH_PATH;

/// Create an account.
pub const USERS: &str = "/auth/users/";

/// Activate an account.
pub const USERS_ACTIVATION: &str = "/auth/users/activation/";

/// Security news feed.
pub const NEWS: &str = "/news/";

/// Document analysis upload.
pub const REPORT: &str = "/report/";

/// Source code analysis upload.
pub const CODE_ANALYSIS: &str = "/code_analysis/";

/// Stored analysis result for a collection.
pub fn result_path(collection: &str) -> String {
    format!("/results/{}/", collection)
}

// ============================================================================
// Identity Types
// ============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenPairResponse {
    pub access: String,
    pub refresh: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshResponse {
    pub access: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct RegisterRequest<'a> {
    pub email: &'a str,
    pub full_name: &'a str,
    pub password: &'a str,
    pub re_password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct ActivationRequest<'a> {
    pub uid: &'a str,
    pub token: &'a str,
}

// ============================================================================
// Application Types
// ============================================================================

/// A file attached to an upload.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

impl std::fmt::Debug for UploadFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadFile")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Tuning knobs for document analysis. Defaults match the server's.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportOptions {
    pub chunk_size: u32,
    pub chunk_overlap: u32,
    pub llm_temperature: f32,
    pub max_tokens: u32,
    pub top_k: u32,
    pub model_name: String,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            chunk_overlap: 40,
            llm_temperature: 0.7,
            max_tokens: 1024,
            top_k: 3,
            model_name: "llama3.1:8b".to_string(),
        }
    }
}

/// Documents (and/or a question) to analyse.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReportUpload {
    pub files: Vec<UploadFile>,
    pub message: Option<String>,
    pub options: ReportOptions,
}

impl ReportUpload {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.message.as_deref().is_none_or(str::is_empty)
    }

    pub(crate) fn to_form(&self) -> Vec<FormPart> {
        let mut parts: Vec<FormPart> = self
            .files
            .iter()
            .map(|file| FormPart::File {
                name: "files".to_string(),
                filename: file.filename.clone(),
                bytes: file.bytes.clone(),
            })
            .collect();
        if let Some(message) = self.message.as_deref().filter(|m| !m.is_empty()) {
            parts.push(text("message", message));
        }
        let o = &self.options;
        parts.push(text("chunk_size", o.chunk_size));
        parts.push(text("chunk_overlap", o.chunk_overlap));
        parts.push(text("llm_temperature", o.llm_temperature));
        parts.push(text("max_tokens", o.max_tokens));
        parts.push(text("top_k", o.top_k));
        parts.push(text("model_name", &o.model_name));
        parts
    }
}

/// Source code to analyse, inline or as a file.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeUpload {
    pub code: Option<String>,
    pub code_file: Option<UploadFile>,
    pub model_name: String,
    pub temperature: f32,
}

impl CodeUpload {
    pub fn inline(code: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::default()
        }
    }

    pub fn file(file: UploadFile) -> Self {
        Self {
            code_file: Some(file),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.code_file.is_none() && self.code.as_deref().is_none_or(|c| c.trim().is_empty())
    }

    pub(crate) fn to_form(&self) -> Vec<FormPart> {
        let mut parts = Vec::new();
        match (&self.code_file, &self.code) {
            (Some(file), _) => parts.push(FormPart::File {
                name: "code_file".to_string(),
                filename: file.filename.clone(),
                bytes: file.bytes.clone(),
            }),
            (None, Some(code)) => parts.push(text("code", code)),
            (None, None) => {}
        }
        parts.push(text("model_name", &self.model_name));
        parts.push(text("temperature", self.temperature));
        parts
    }
}

impl Default for CodeUpload {
    fn default() -> Self {
        Self {
            code: None,
            code_file: None,
            model_name: "llama3.1:8b".to_string(),
            temperature: 0.7,
        }
    }
}

fn text(name: &str, value: impl ToString) -> FormPart {
    FormPart::Text {
        name: name.to_string(),
        value: value.to_string(),
    }
}

/// One finding in an analysis result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Vulnerability {
    pub vulnerability_name: String,
    pub cve_id: Option<String>,
    pub cwe_id: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub severity: Option<String>,
    pub risk: Option<String>,
    pub recommended_fix: Option<String>,
    pub cve_url: Option<String>,
    pub cwe_url: Option<String>,
}

/// The outcome of a report or code analysis, also returned by result lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResult {
    pub status: String,
    /// Collections created for the uploaded documents; each can be chatted with.
    pub collections: Vec<String>,
    pub vulnerabilities: Vec<Vulnerability>,
    pub message: String,
}

/// A single news entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewsItem {
    pub title: String,
    pub link: String,
    pub published: String,
}

/// News entries grouped by source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewsFeed {
    pub news: BTreeMap<String, Vec<NewsItem>>,
}

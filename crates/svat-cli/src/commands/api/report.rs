//! Report analysis command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use svat_http::{ReportOptions, ReportUpload};

use crate::cli::Target;
use crate::output;
use crate::session::CliSession;

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// Documents to upload
    pub files: Vec<PathBuf>,

    /// Question to ask about the documents
    #[arg(long, short)]
    pub message: Option<String>,

    /// Model used for the analysis
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub chunk_size: Option<u32>,

    #[arg(long)]
    pub chunk_overlap: Option<u32>,

    #[arg(long)]
    pub temperature: Option<f32>,

    #[arg(long)]
    pub max_tokens: Option<u32>,

    #[arg(long)]
    pub top_k: Option<u32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl ReportArgs {
    fn options(&self) -> ReportOptions {
        let defaults = ReportOptions::default();
        ReportOptions {
            chunk_size: self.chunk_size.unwrap_or(defaults.chunk_size),
            chunk_overlap: self.chunk_overlap.unwrap_or(defaults.chunk_overlap),
            llm_temperature: self.temperature.unwrap_or(defaults.llm_temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            top_k: self.top_k.unwrap_or(defaults.top_k),
            model_name: self.model.clone().unwrap_or(defaults.model_name),
        }
    }
}

pub async fn run(args: ReportArgs, target: &Target) -> Result<()> {
    if args.files.is_empty() && args.message.as_deref().is_none_or(str::is_empty) {
        bail!("Nothing to analyse: pass at least one file or --message");
    }

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        files.push(super::read_upload(path).await?);
    }
    let upload = ReportUpload {
        files,
        message: args.message.clone(),
        options: args.options(),
    };

    let session = CliSession::open_authenticated(target)?;
    output::note("Uploading report...");
    let result = session
        .api
        .process_report(&upload)
        .await
        .context("Failed to analyse report")?;

    super::print_result(&result, args.json)
}

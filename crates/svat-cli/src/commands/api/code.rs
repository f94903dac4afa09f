//! Code analysis command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;

use svat_http::CodeUpload;

use crate::cli::Target;
use crate::output;
use crate::session::CliSession;

#[derive(Args, Debug)]
#[group(required = true, multiple = false, id = "source")]
struct Source {
    /// Inline source code
    #[arg(long)]
    code: Option<String>,

    /// Source file to upload
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CodeArgs {
    #[command(flatten)]
    source: Source,

    /// Model used for the analysis
    #[arg(long)]
    pub model: Option<String>,

    #[arg(long)]
    pub temperature: Option<f32>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: CodeArgs, target: &Target) -> Result<()> {
    let mut upload = match (&args.source.file, args.source.code) {
        (Some(path), _) => CodeUpload::file(super::read_upload(path).await?),
        (None, Some(code)) => CodeUpload::inline(code),
        (None, None) => bail!("Pass --code or --file"),
    };
    if let Some(model) = args.model {
        upload.model_name = model;
    }
    if let Some(temperature) = args.temperature {
        upload.temperature = temperature;
    }

    let session = CliSession::open_authenticated(target)?;
    output::note("Analysing code...");
    let result = session
        .api
        .analyze_code(&upload)
        .await
        .context("Failed to analyse code")?;

    super::print_result(&result, args.json)
}

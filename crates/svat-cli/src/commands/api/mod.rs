//! API subcommand implementations.

mod code;
mod news;
mod report;
mod result;

use std::path::Path;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use svat_http::{AnalysisResult, UploadFile};

use crate::cli::Target;
use crate::output;

#[derive(Args, Debug)]
pub struct ApiCommand {
    #[command(subcommand)]
    pub command: ApiSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum ApiSubcommand {
    /// Show the latest security news
    News(news::NewsArgs),

    /// Fetch a stored analysis result
    Result(result::ResultArgs),

    /// Analyse documents and optionally ask a question about them
    Report(report::ReportArgs),

    /// Analyse source code for vulnerabilities
    Code(code::CodeArgs),
}

pub async fn handle(cmd: ApiCommand, target: &Target) -> Result<()> {
    match cmd.command {
        ApiSubcommand::News(args) => news::run(args, target).await,
        ApiSubcommand::Result(args) => result::run(args, target).await,
        ApiSubcommand::Report(args) => report::run(args, target).await,
        ApiSubcommand::Code(args) => code::run(args, target).await,
    }
}

async fn read_upload(path: &Path) -> Result<UploadFile> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(UploadFile::new(filename, bytes))
}

fn print_result(result: &AnalysisResult, json: bool) -> Result<()> {
    if json {
        return output::json_pretty(result);
    }

    if !result.status.is_empty() {
        output::field("Status", &result.status);
    }
    if !result.collections.is_empty() {
        output::field("Collections", &result.collections.join(", "));
    }
    if !result.message.is_empty() {
        println!();
        println!("{}", result.message);
    }
    for vuln in &result.vulnerabilities {
        println!();
        output::field("Vulnerability", &vuln.vulnerability_name);
        if let Some(severity) = &vuln.severity {
            output::field("  Severity", severity);
        }
        if let Some(cve) = &vuln.cve_id {
            output::field("  CVE", cve);
        }
        if let Some(cwe) = &vuln.cwe_id {
            output::field("  CWE", cwe);
        }
        if let Some(fix) = &vuln.recommended_fix {
            output::field("  Fix", fix);
        }
    }
    Ok(())
}

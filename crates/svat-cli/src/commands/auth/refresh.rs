//! Refresh command implementation.

use anyhow::{Context, Result};
use clap::Args;

use crate::cli::Target;
use crate::output;
use crate::session::CliSession;

#[derive(Args, Debug)]
pub struct RefreshArgs {}

pub async fn run(_args: RefreshArgs, target: &Target) -> Result<()> {
    let session = CliSession::open_authenticated(target)?;

    output::note("Refreshing session...");
    session
        .gateway
        .refresh()
        .await
        .context("Failed to refresh session")?;

    output::success("Session refreshed");
    Ok(())
}

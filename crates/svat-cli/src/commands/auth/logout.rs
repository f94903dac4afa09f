//! Logout command implementation.

use anyhow::Result;
use clap::Args;

use crate::cli::Target;
use crate::output;
use crate::session::CliSession;

#[derive(Args, Debug)]
pub struct LogoutArgs {}

pub async fn run(_args: LogoutArgs, target: &Target) -> Result<()> {
    let session = CliSession::open(target)?;
    if !session.gateway.is_authenticated() {
        output::note("No stored session.");
        return Ok(());
    }

    session.gateway.logout();
    output::success("Logged out");
    Ok(())
}

//! Status command implementation.

use anyhow::Result;
use chrono::Local;
use clap::Args;

use crate::cli::Target;
use crate::output;
use crate::session::CliSession;

#[derive(Args, Debug)]
pub struct StatusArgs {}

pub async fn run(_args: StatusArgs, target: &Target) -> Result<()> {
    let session = CliSession::open(target)?;

    let state = if session.gateway.is_authenticated() {
        "logged in"
    } else {
        "logged out"
    };
    output::field("Session", state);
    output::field("API", &target.api_url);
    output::field("Store", &session.slot.path().display().to_string());

    // A slot that cannot be read only hides the timestamp.
    if let Ok(Some(updated_at)) = session.slot.updated_at() {
        output::field(
            "Updated",
            &updated_at
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        );
    }

    Ok(())
}

//! Activate command implementation.

use anyhow::{Context, Result};
use clap::Args;

use svat_core::Activation;

use crate::cli::Target;
use crate::output;
use crate::session::CliSession;

#[derive(Args, Debug)]
pub struct ActivateArgs {
    /// User id from the activation link
    pub uid: String,

    /// Token from the activation link
    pub token: String,
}

pub async fn run(args: ActivateArgs, target: &Target) -> Result<()> {
    let session = CliSession::open(target)?;
    session
        .gateway
        .activate(&Activation::new(args.uid, args.token))
        .await
        .context("Failed to activate account")?;

    output::success("Account activated. You can now log in.");
    Ok(())
}

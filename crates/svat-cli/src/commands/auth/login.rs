//! Login command implementation.

use anyhow::{Context, Result};
use clap::Args;

use svat_core::Credentials;

use crate::cli::Target;
use crate::output;
use crate::session::CliSession;

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account e-mail address
    #[arg(long)]
    pub email: String,

    /// Account password (prompted for when omitted)
    #[arg(long, env = "SVAT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

pub async fn run(args: LoginArgs, target: &Target) -> Result<()> {
    let session = CliSession::open(target)?;
    let password = match args.password {
        Some(password) => password,
        None => super::read_secret("Password")?,
    };

    output::note("Logging in...");
    session
        .gateway
        .login(&Credentials::new(&args.email, password))
        .await
        .context("Failed to login")?;

    output::success("Logged in successfully");
    println!();
    output::field("Account", &args.email);
    output::field("API", &target.api_url);

    Ok(())
}

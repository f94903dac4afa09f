//! Register command implementation.

use anyhow::{Result, bail};
use clap::Args;

use svat_core::Registration;
use svat_core::error::{AuthError, Error};

use crate::cli::Target;
use crate::output;
use crate::session::CliSession;

#[derive(Args, Debug)]
pub struct RegisterArgs {
    /// Account e-mail address
    #[arg(long)]
    pub email: String,

    /// Full name shown on the account
    #[arg(long)]
    pub full_name: String,

    /// Account password (prompted for when omitted)
    #[arg(long, env = "SVAT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

pub async fn run(args: RegisterArgs, target: &Target) -> Result<()> {
    let session = CliSession::open(target)?;
    let (password, confirmation) = match args.password {
        Some(password) => (password.clone(), password),
        None => (
            super::read_secret("Password")?,
            super::read_secret("Repeat password")?,
        ),
    };

    let registration = Registration::new(&args.email, &args.full_name, password, confirmation);
    match session.gateway.register(&registration).await {
        Ok(()) => {
            output::success("Account created");
            output::note("Check your inbox for the activation link.");
            Ok(())
        }
        Err(Error::Auth(AuthError::Validation(fields))) => {
            output::error("Registration refused");
            for (field, messages) in fields.iter() {
                eprintln!("  {}: {}", field, messages.join(" "));
            }
            bail!("Registration failed")
        }
        Err(e) => Err(anyhow::Error::new(e).context("Failed to register")),
    }
}

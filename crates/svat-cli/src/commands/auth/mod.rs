//! Auth subcommand implementations.

mod activate;
mod login;
mod logout;
mod refresh;
mod register;
mod status;

use anyhow::Result;
use clap::{Args, Subcommand};

use crate::cli::Target;

#[derive(Args, Debug)]
pub struct AuthCommand {
    #[command(subcommand)]
    pub command: AuthSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum AuthSubcommand {
    /// Log in and store the session
    Login(login::LoginArgs),

    /// Create a new account
    Register(register::RegisterArgs),

    /// Activate an account from its e-mailed link
    Activate(activate::ActivateArgs),

    /// Forget the stored session
    Logout(logout::LogoutArgs),

    /// Show whether a session is stored
    Status(status::StatusArgs),

    /// Exchange the refresh token for a new access token
    Refresh(refresh::RefreshArgs),
}

pub async fn handle(cmd: AuthCommand, target: &Target) -> Result<()> {
    match cmd.command {
        AuthSubcommand::Login(args) => login::run(args, target).await,
        AuthSubcommand::Register(args) => register::run(args, target).await,
        AuthSubcommand::Activate(args) => activate::run(args, target).await,
        AuthSubcommand::Logout(args) => logout::run(args, target).await,
        AuthSubcommand::Status(args) => status::run(args, target).await,
        AuthSubcommand::Refresh(args) => refresh::run(args, target).await,
    }
}

/// Read a secret from stdin when it was not given on the command line.
fn read_secret(prompt: &str) -> Result<String> {
    use std::io::{BufRead, Write};

    eprint!("{}: ", prompt);
    std::io::stderr().flush()?;

    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    let secret = line.trim_end_matches(['\r', '\n']).to_string();
    if secret.is_empty() {
        anyhow::bail!("{} must not be empty", prompt);
    }
    Ok(secret)
}

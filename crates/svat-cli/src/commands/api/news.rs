//! News command implementation.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::cli::Target;
use crate::output;
use crate::session::CliSession;

#[derive(Args, Debug)]
pub struct NewsArgs {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Maximum entries to show per source
    #[arg(long, default_value_t = 5)]
    pub limit: usize,
}

pub async fn run(args: NewsArgs, target: &Target) -> Result<()> {
    let session = CliSession::open_authenticated(target)?;
    let feed = session.api.news().await.context("Failed to fetch news")?;

    if args.json {
        return output::json_pretty(&feed);
    }

    for (source, items) in &feed.news {
        println!("{}", source.bold());
        for item in items.iter().take(args.limit) {
            println!("  {} {}", item.published.dimmed(), item.title);
            println!("    {}", item.link.cyan());
        }
    }
    Ok(())
}

//! Result lookup command implementation.

use anyhow::{Context, Result};
use clap::Args;

use svat_core::ResourceId;

use crate::cli::Target;
use crate::session::CliSession;

#[derive(Args, Debug)]
pub struct ResultArgs {
    /// Collection name returned by a previous analysis
    pub collection: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ResultArgs, target: &Target) -> Result<()> {
    let collection = ResourceId::new(&args.collection).context("Invalid collection name")?;
    let session = CliSession::open_authenticated(target)?;

    let result = session
        .api
        .result(&collection)
        .await
        .context("Failed to fetch result")?;

    super::print_result(&result, args.json)
}

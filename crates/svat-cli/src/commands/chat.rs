//! Interactive chat over a collection's channel.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use futures_util::StreamExt;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};

use svat_core::{ConnectionManager, Inbound, ReconnectPolicy, ResourceId};
use svat_http::WsTransport;

use crate::cli::Target;
use crate::output;
use crate::session::CliSession;

#[derive(Args, Debug)]
pub struct ChatArgs {
    /// Collection to chat with
    pub collection: String,

    /// Base delay between reconnect attempts, in milliseconds
    #[arg(long, default_value_t = 1000)]
    pub reconnect_delay_ms: u64,

    /// Reconnect attempts before giving up
    #[arg(long, default_value_t = 5)]
    pub max_attempts: u32,

    /// Print raw JSON frames
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ChatArgs, target: &Target) -> Result<()> {
    let collection = ResourceId::new(&args.collection).context("Invalid collection name")?;
    let session = CliSession::open_authenticated(target)?;

    let policy = ReconnectPolicy::default()
        .with_base_delay(Duration::from_millis(args.reconnect_delay_ms))
        .with_max_attempts(args.max_attempts);
    let manager = ConnectionManager::new(
        session.channel.clone(),
        session.gateway.clone(),
        Arc::new(WsTransport::new()),
        policy,
    );

    output::note(&format!("Connecting to {}...", collection));
    output::note("Type a message and press Enter. Ctrl+D or Ctrl+C to quit.");

    let mut messages = manager.connect(collection).await;
    let mut states = manager.state_changes();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let outcome = loop {
        tokio::select! {
            item = messages.next() => match item {
                Some(Ok(inbound)) => print_inbound(&inbound, args.json),
                Some(Err(e)) => break Err(anyhow::Error::new(e).context("Chat ended")),
                None => break Ok(()),
            },
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if !manager.state().is_open() {
                        output::note("Not connected, message dropped.");
                    }
                    manager.send_message(&json!({ "message": line.trim() }));
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(anyhow::Error::new(e).context("Failed to read stdin")),
            },
            changed = states.changed() => {
                if changed.is_ok() {
                    let state = *states.borrow_and_update();
                    output::note(&format!("[{}]", state));
                }
            }
            _ = tokio::signal::ctrl_c() => break Ok(()),
        }
    };

    manager.disconnect().await;
    outcome
}

fn print_inbound(inbound: &Inbound, raw: bool) {
    match inbound {
        Inbound::Message(value) if raw => println!("{}", value),
        Inbound::Message(value) => print_answer(value),
        Inbound::Error(message) => output::error(message),
    }
}

fn print_answer(value: &Value) {
    let Some(answer) = value.get("message").and_then(Value::as_str) else {
        println!("{}", value);
        return;
    };
    println!("{} {}", ">".green(), answer);

    let sources = value.get("sources").and_then(Value::as_array);
    for source in sources.into_iter().flatten() {
        let page = source.get("page").and_then(Value::as_u64).unwrap_or_default();
        let content = source.get("content").and_then(Value::as_str).unwrap_or_default();
        let excerpt: String = content.chars().take(80).collect();
        println!("  {} {}", format!("p.{}", page).dimmed(), excerpt.dimmed());
    }
}

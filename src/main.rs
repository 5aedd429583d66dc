//! CLI entry point for the DocuTray client.

use anyhow::Result;
use clap::Parser;
use docutray::{AsyncPage, ClientConfig, ListQuery, OnUpdate, PollOptions, Transport};
use futures_util::StreamExt;
use serde_json::Value;
use tracing::{debug, info, warn};

mod cli;

use cli::{Args, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr; stdout carries JSON only
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig::builder(args.api_key.clone().unwrap_or_default())
        .base_url(args.base_url.clone())
        .max_retries(u32::from(args.max_retries))
        .log_retries(args.log_retries)
        .build()?;
    debug!(?config, command = ?args.command, "CLI arguments parsed");

    let transport = Transport::new(config);
    let outcome = run(&transport, args.command).await;
    transport.close();
    outcome
}

async fn run(transport: &Transport, command: Command) -> Result<()> {
    match command {
        Command::Status {
            kind,
            id,
            wait,
            poll_interval,
            timeout,
        } => {
            let mut status = transport.job_status(kind.into(), &id).await?;
            if wait {
                let options = PollOptions::new(poll_interval, timeout);
                status = status
                    .wait(
                        options,
                        OnUpdate::sync(|update| info!(id = update.id(), state = %update.state(), "job update")),
                    )
                    .await?;
            }
            if let Some(message) = status.error_message() {
                warn!(id = status.id(), error = %message, "job reported an error");
            }
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::List {
            path,
            params,
            limit,
            all,
        } => {
            let mut query = params
                .into_iter()
                .fold(ListQuery::new(path), |query, (key, value)| query.param(key, value));
            if let Some(limit) = limit {
                query = query.with_limit(limit);
            }

            let page: AsyncPage<Value> = transport.list(query).await?;
            info!(
                page = page.page_number(),
                items = page.len(),
                total = page.total(),
                has_next = page.has_next(),
                "Fetched page"
            );

            if all {
                let mut items = page.items();
                let mut printed = 0_u64;
                while let Some(item) = items.next().await {
                    println!("{}", serde_json::to_string(&item?)?);
                    printed += 1;
                }
                info!(printed, "Listing complete");
            } else {
                for item in page.data() {
                    println!("{}", serde_json::to_string(item)?);
                }
            }
        }
    }
    Ok(())
}

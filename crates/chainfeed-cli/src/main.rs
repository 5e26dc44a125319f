//! chainfeed CLI tool
//!
//! Reads, posts to and follows a feed on a running ledger-node.
//!
//! Usage:
//!   chainfeed init
//!   chainfeed read
//!   chainfeed post <text>
//!   chainfeed revoke <participant> <text>
//!   chainfeed watch
//!   chainfeed chat

use std::sync::Arc;

use anyhow::{Context, Result};
use chainfeed_cli::config::DEFAULT_LOG_FILTER;
use chainfeed_cli::{format_record, CliConfig, FeedClient, FileKeyStore};
use chainfeed_core::{display_name, Address};
use chainfeed_engine::FeedConfig;
use chainfeed_ledger::RemoteSession;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

enum Command {
    Init,
    Read,
    Post { text: String },
    Revoke { participant: Address, text: String },
    Watch,
    Chat,
}

fn print_usage() {
    eprintln!("chainfeed - Post to and follow a chainfeed");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  chainfeed init                          Fund, deploy and create the feed if needed");
    eprintln!("  chainfeed read                          Print every record");
    eprintln!("  chainfeed post <text>                   Append a record");
    eprintln!("  chainfeed revoke <participant> <text>   Append a record and bar a participant");
    eprintln!("  chainfeed watch                         Print the feed and follow new records");
    eprintln!("  chainfeed chat                          Follow the feed and post lines from stdin");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  CHAINFEED_SOCKET   Path to ledger socket (default: ./chainfeed-data/ledger.sock)");
    eprintln!("  CHAINFEED_STORE    Key and settings directory (default: ./chainfeed-data/store)");
    eprintln!("  CHAINFEED_AIRDROP  Lamports to request for the payer (default: 1000000)");
}

fn usage_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    print_usage();
    std::process::exit(1);
}

fn parse_args(args: &[String]) -> Command {
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "init" => Command::Init,
        "read" => Command::Read,
        "post" => {
            if args.len() < 3 {
                usage_error("post requires text");
            }
            Command::Post {
                text: args[2..].join(" "),
            }
        }
        "revoke" => {
            if args.len() < 4 {
                usage_error("revoke requires a participant and text");
            }
            let participant = match args[2].parse() {
                Ok(participant) => participant,
                Err(e) => usage_error(&format!("invalid participant {}: {}", args[2], e)),
            };
            Command::Revoke {
                participant,
                text: args[3..].join(" "),
            }
        }
        "watch" => Command::Watch,
        "chat" => Command::Chat,
        "-h" | "--help" | "help" => {
            print_usage();
            std::process::exit(0);
        }
        other => usage_error(&format!("unknown command: {}", other)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let command = parse_args(&args);

    let config = CliConfig::from_env()?;
    let store = FileKeyStore::open(&config.store_dir)?;
    let session = Arc::new(RemoteSession::new(&config.socket_path));
    let client = FeedClient::bootstrap(session, &store, config.airdrop_lamports, FeedConfig::default())
        .await
        .with_context(|| {
            format!(
                "could not set up the feed; is ledger-node listening on {}?",
                config.socket_path.display()
            )
        })?;

    match command {
        Command::Init => {
            println!("feed: {}", client.first());
            println!("user: {} ({})", display_name(&client.user()), client.user());
        }
        Command::Read => {
            for record in client.records().await? {
                println!("{}", format_record(&record));
            }
        }
        Command::Post { text } => {
            let address = client.post(&text, None, None).await?;
            println!("posted {}", address);
        }
        Command::Revoke { participant, text } => {
            let address = client.post(&text, Some(participant), None).await?;
            println!("revoked {} in {}", display_name(&participant), address);
        }
        Command::Watch => watch(&client, false).await?,
        Command::Chat => watch(&client, true).await?,
    }

    Ok(())
}

/// Print the feed, then follow it until Ctrl-C. With `chat`, every line read
/// from stdin is posted.
async fn watch(client: &FeedClient<RemoteSession>, chat: bool) -> Result<()> {
    let records = client.records().await?;
    for record in &records {
        println!("{}", format_record(record));
    }
    let tail = records.last().map_or(client.first(), |r| r.address);

    let handle = client.watch(tail, |record| println!("{}", format_record(record)));
    let cancel = handle.cancellation_token();
    let last_tail = handle.tail_updates();
    let monitor = handle.join();
    tokio::pin!(monitor);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = chat;
    loop {
        tokio::select! {
            result = &mut monitor => return result.context("feed monitor stopped"),
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line(), if stdin_open => match line? {
                None => stdin_open = false,
                Some(line) => {
                    let text = line.trim();
                    if text.is_empty() {
                        continue;
                    }
                    let hint = *last_tail.borrow();
                    if let Err(e) = client.post(text, None, Some(hint)).await {
                        eprintln!("Error: {:#}", e);
                    }
                }
            },
        }
    }

    cancel.cancel();
    monitor.await?;
    Ok(())
}

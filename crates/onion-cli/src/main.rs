//! Onion CLI tools: local network launcher, sending, directory inspection.

#![forbid(unsafe_code)]

mod launch;

use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use onion_common::{
    DirectoryClient, ErrorResponse, HopResolver, PortLayout, SendMessageRequest,
    SendMessageResponse,
};
use onion_core::{UserId, DEFAULT_CIRCUIT_LENGTH};
use onion_user::{SendSettings, DEFAULT_SEND_ATTEMPTS, DEFAULT_SEND_TIMEOUT};

use crate::launch::{launch, LaunchOptions};

#[derive(Parser, Debug)]
#[command(name = "onion")]
#[command(about = "Onion overlay CLI tools")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a directory, relays and users in this process
    Launch {
        /// Number of relays (ids 0..n)
        #[arg(long, default_value_t = 3)]
        relays: u32,

        /// Number of users (ids 0..m)
        #[arg(long, default_value_t = 2)]
        users: u32,

        /// Relays per circuit
        #[arg(long, default_value_t = DEFAULT_CIRCUIT_LENGTH)]
        circuit_length: usize,

        /// Relay timeout for handing an envelope to the next hop
        #[arg(long, default_value_t = 5_000)]
        forward_timeout_ms: u64,
    },

    /// Ask user `from` to send a message to user `to`
    Send {
        #[arg(long)]
        from: u32,

        #[arg(long)]
        to: u32,

        message: String,
    },

    /// List the relays registered with the directory
    Nodes,

    /// Show version information
    Version,
}

/// Whether `relays` cannot fill a single circuit of `circuit_length`.
fn too_few_relays(relays: u32, circuit_length: usize) -> bool {
    usize::try_from(relays).is_ok_and(|relays| relays < circuit_length)
}

/// Last `n` characters of a published key.
fn key_suffix(key: &str, n: usize) -> &str {
    let skip = key.chars().count().saturating_sub(n);
    match key.char_indices().nth(skip) {
        Some((start, _)) => &key[start..],
        None => "",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    onion_common::init_tracing();

    let args = Args::parse();
    let layout = PortLayout::from_env()?;

    match args.command {
        Command::Launch {
            relays,
            users,
            circuit_length,
            forward_timeout_ms,
        } => {
            if circuit_length == 0 {
                bail!("--circuit-length must be at least 1");
            }
            if too_few_relays(relays, circuit_length) {
                tracing::warn!(
                    "only {} relays for circuits of {}; sends will fail",
                    relays,
                    circuit_length
                );
            }

            launch(
                layout,
                LaunchOptions {
                    relays,
                    users,
                    forward_timeout: Duration::from_millis(forward_timeout_ms),
                    send: SendSettings {
                        circuit_length,
                        send_attempts: DEFAULT_SEND_ATTEMPTS,
                        send_timeout: DEFAULT_SEND_TIMEOUT,
                    },
                },
            )
            .await?;
        }
        Command::Send { from, to, message } => {
            let Some(url) = layout.user_url(UserId(from)) else {
                bail!("no port for user {} in the port layout", from);
            };

            let resp = reqwest::Client::new()
                .post(format!("{}/sendMessage", url))
                .json(&SendMessageRequest {
                    message,
                    destination_user_id: UserId(to),
                })
                .send()
                .await?;

            if resp.status().is_success() {
                let sent: SendMessageResponse = resp.json().await?;
                let path: Vec<String> = sent.circuit.iter().map(|id| id.to_string()).collect();
                println!("Delivered to user {} via relays {}", to, path.join(" -> "));
            } else {
                let status = resp.status();
                match resp.json::<ErrorResponse>().await {
                    Ok(err) => bail!("send failed ({}): {}", status, err.error),
                    Err(_) => bail!("send failed ({})", status),
                }
            }
        }
        Command::Nodes => {
            let nodes = DirectoryClient::new(layout.registry_url())
                .list_nodes()
                .await?;
            if nodes.is_empty() {
                println!("No relays registered");
            }
            for node in nodes {
                println!(
                    "relay {:>4}  key …{}",
                    node.node_id,
                    key_suffix(&node.pub_key, 16)
                );
            }
        }
        Command::Version => {
            println!("onion {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

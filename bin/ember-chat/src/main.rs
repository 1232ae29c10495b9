//! ember-chat – command-line client.
//!
//! ```text
//! ember-chat channels
//! ember-chat new-channel "Ideas"
//! ember-chat history  --channel <id>
//! ember-chat send     --channel <id> [--image <id>] [--follow-up <message-id>] <text>...
//! ```

use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use ember_client::{ApiClient, ChatSession, MessageSource, PollOutcome, Poller};
use ember_types::{Message, Role};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Debug, Parser)]
#[command(name = "ember-chat", version, about = "Chat with an ember server")]
struct Cli {
    /// Server base URL.
    #[arg(long, env = "EMBER_SERVER", default_value = "http://127.0.0.1:3000", global = true)]
    server: String,

    /// Delay between reply polls, in milliseconds.
    #[arg(long, default_value_t = 1500, global = true)]
    interval_ms: u64,

    /// Polls before giving up on a reply.
    #[arg(long, default_value_t = 40, global = true)]
    max_attempts: u32,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List channels, oldest first.
    Channels,
    /// Create a channel.
    NewChannel {
        /// Display name; the server picks a default when omitted.
        name: Option<String>,
    },
    /// Print a channel's messages.
    History {
        #[arg(long)]
        channel: String,
    },
    /// Send a turn and wait for the assistant's reply.
    Send {
        #[arg(long)]
        channel: String,
        /// Attach a stored image by id.
        #[arg(long)]
        image: Option<String>,
        /// Quote an earlier message of the channel as a follow-up.
        #[arg(long)]
        follow_up: Option<String>,
        /// Message text. Start it with /imagine to request an image.
        text: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let client = ApiClient::new(&cli.server);

    match cli.command {
        Command::Channels => {
            for channel in client.list_channels().await?.channels {
                println!("{}  {}", channel.id, channel.name);
            }
        }
        Command::NewChannel { name } => {
            let channel = client.create_channel(name).await?;
            println!("{}  {}", channel.id, channel.name);
        }
        Command::History { channel } => {
            for message in client.list_messages(&channel).await?.messages {
                print_message(&message);
            }
        }
        Command::Send { channel, image, follow_up, text } => {
            let poller = Poller::new(Duration::from_millis(cli.interval_ms), cli.max_attempts);
            let mut session = ChatSession::new(client, poller);
            session.select_channel(&channel);
            if let Some(image) = image {
                session.stage_image(image);
            }

            let mut composed = String::new();
            if let Some(id) = follow_up {
                let history = session.client().list_messages(&channel).await?;
                let quoted = history
                    .find(&id)
                    .with_context(|| format!("message {id} not found in channel {channel}"))?;
                match session.select_message(quoted) {
                    Some(prompt) => composed.push_str(&prompt),
                    None => bail!("message {id} has no text to follow up on"),
                }
            }
            composed.push_str(&text.join(" "));

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    on_ctrl_c.cancel();
                }
            });

            let (resp, outcome) = session.send_and_wait(&composed, cancel).await?;
            print_message(&resp.user_message);
            match outcome {
                PollOutcome::Resolved(reply) => {
                    print_message(&reply);
                    if reply.is_failed_reply() {
                        warn!(message_id = %reply.id, "assistant reply failed");
                    }
                }
                PollOutcome::GaveUp { attempts } => {
                    warn!(attempts, "reply still pending");
                    println!(
                        "(no reply after {attempts} checks; run `history` later to see it)"
                    );
                }
                PollOutcome::Cancelled => println!("(stopped waiting)"),
            }
        }
    }
    Ok(())
}

fn print_message(message: &Message) {
    let who = match message.role {
        Role::User => "You",
        Role::Assistant => "Assistant",
        Role::System => "System",
    };
    let when = message.created_at.format("%Y-%m-%d %H:%M:%S");
    let body = if message.pending { "…" } else { message.text.as_str() };
    println!("[{when}] {who}: {body}");
    if let Some(image) = &message.image_ref {
        let kind = if message.is_generated_image() { "generated image" } else { "image" };
        println!("    [{kind}: {image}]");
    }
}

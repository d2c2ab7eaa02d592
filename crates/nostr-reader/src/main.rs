use std::env;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use nostr_crypto::{PublicKey, SecretKey};
use nostr_session::{
    ChannelObserver, NotePublisher, PublisherConfig, RelaySession, SessionConfig, SessionEvent,
    SessionState,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "nostr-reader")]
#[command(about = "Read a follow-filtered Nostr feed, publish notes and inspect keys")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Stream notes from followed authors until Ctrl-C
    Listen(ListenArgs),
    /// Sign and publish a text note
    Publish(PublishArgs),
    /// Show the public key for a secret key, or generate a new one
    Keys(KeyArgs),
    /// Decrypt a NIP-04 direct-message payload
    Decrypt(DecryptArgs),
}

#[derive(Debug, Args)]
struct ListenArgs {
    /// Relay websocket URL. Falls back to NOSTR_RELAY_URL env.
    #[arg(long)]
    relay: Option<String>,

    /// Author whose follow and mute lists filter the feed (npub or hex).
    /// Falls back to NOSTR_AUTHOR env.
    #[arg(long)]
    author: Option<String>,

    /// Also show notes from authors that are not followed
    #[arg(long)]
    allow_others: bool,

    /// Subscribe to the author's relay list
    #[arg(long)]
    relay_list: bool,

    /// Keep the current list when an empty update arrives
    #[arg(long)]
    ignore_empty_lists: bool,
}

#[derive(Debug, Args)]
struct PublishArgs {
    /// Relay websocket URL. Falls back to NOSTR_RELAY_URL env.
    #[arg(long)]
    relay: Option<String>,

    /// Note text
    #[arg(long)]
    content: String,

    /// Secret key (nsec or hex). Falls back to NOSTR_SECRET_KEY env.
    #[arg(long)]
    nsec: Option<String>,

    /// Seconds to wait for the relay's OK
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

#[derive(Debug, Args)]
struct KeyArgs {
    /// Secret key (nsec or hex). A new key is generated when omitted.
    #[arg(long)]
    nsec: Option<String>,
}

#[derive(Debug, Args)]
struct DecryptArgs {
    /// `<base64 ciphertext>?iv=<base64 iv>`
    #[arg(long)]
    payload: String,

    /// The other party's public key (npub or hex)
    #[arg(long)]
    peer: String,

    /// Secret key (nsec or hex). Falls back to NOSTR_SECRET_KEY env.
    #[arg(long)]
    nsec: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Listen(args) => listen(args).await,
        Command::Publish(args) => publish(args).await,
        Command::Keys(args) => keys(args),
        Command::Decrypt(args) => decrypt(args),
    }
}

async fn listen(args: ListenArgs) -> Result<(), Box<dyn std::error::Error>> {
    let relay = flag_or_env(args.relay, "NOSTR_RELAY_URL")?;
    let author = flag_or_env(args.author, "NOSTR_AUTHOR")?;

    let mut config = match SessionConfig::from_env() {
        Ok(config) => config,
        Err(_) => SessionConfig::new(relay.clone(), author.clone()),
    };
    config.relay_url = relay;
    config.author = author;
    config.allow_others |= args.allow_others;
    config.subscribe_relay_list |= args.relay_list;
    config.ignore_empty_list_updates |= args.ignore_empty_lists;

    let (observer, mut events) = ChannelObserver::new();
    let session = RelaySession::new(config, Arc::new(observer))?;
    info!(author = %session.author(), "Starting relay session");
    let handle = session.spawn();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping session");
                break;
            }
            event = events.recv() => match event {
                Some(SessionEvent::NoteAccepted(note)) => {
                    let marker = if note.is_followed { "*" } else { " " };
                    println!("{marker} [{}] {}: {}", note.created_at, note.pubkey, note.content);
                }
                Some(SessionEvent::FollowListUpdated(count)) => info!(count, "Follow list updated"),
                Some(SessionEvent::MuteListUpdated(count)) => info!(count, "Mute list updated"),
                Some(SessionEvent::RelayListUpdated(relays)) => {
                    info!(count = relays.len(), relays = ?relays, "Relay list updated");
                }
                Some(SessionEvent::ConnectionFault(reason)) => {
                    warn!(reason = %reason, "Connection lost");
                    break;
                }
                None => break,
            },
        }
    }

    let report = handle.shutdown().await?;
    info!(state = ?report.state, stats = ?report.stats, "Session finished");
    match report.state {
        SessionState::Faulted => Err(report
            .fault
            .unwrap_or_else(|| "session faulted".to_string())
            .into()),
        _ => Ok(()),
    }
}

async fn publish(args: PublishArgs) -> Result<(), Box<dyn std::error::Error>> {
    let relay = flag_or_env(args.relay, "NOSTR_RELAY_URL")?;
    let key = SecretKey::parse(&flag_or_env(args.nsec, "NOSTR_SECRET_KEY")?)?;

    let mut config = PublisherConfig::new(relay);
    config.ack_timeout = Duration::from_secs(args.timeout_secs);

    let publisher = NotePublisher::new(config, key);
    let result = publisher.publish_note(&args.content).await?;
    if !result.accepted {
        return Err(format!("relay rejected {}: {}", result.event_id, result.message).into());
    }
    println!("{}", result.event_id);
    Ok(())
}

fn keys(args: KeyArgs) -> Result<(), Box<dyn std::error::Error>> {
    let key = match args.nsec {
        Some(value) => SecretKey::parse(&value)?,
        None => {
            let key = SecretKey::generate();
            println!("nsec: {}", key.to_nsec()?);
            key
        }
    };
    let public = key.public_key()?;
    println!("hex:  {}", public.to_hex());
    println!("npub: {}", public.to_npub()?);
    Ok(())
}

fn decrypt(args: DecryptArgs) -> Result<(), Box<dyn std::error::Error>> {
    let key = SecretKey::parse(&flag_or_env(args.nsec, "NOSTR_SECRET_KEY")?)?;
    let peer = PublicKey::parse(&args.peer)?;
    println!("{}", key.decrypt_from(&peer, &args.payload)?);
    Ok(())
}

fn flag_or_env(flag: Option<String>, var: &'static str) -> Result<String, String> {
    flag.or_else(|| env::var(var).ok())
        .ok_or_else(|| format!("missing value: pass the flag or set {var}"))
}

use anyhow::{anyhow, Result};
use clap::Parser;
use log::{error, info, LevelFilter};
use std::sync::Arc;
use std::time::Duration;

mod utils;

use chatpulse::api::{ChatGateway, RestGateway};
use chatpulse::chat::poller::IntervalPoller;
use chatpulse::session::{save_session, Session};
use chatpulse::{ChatClient, InteractionKind, Interactions, PollConfig};

/// Command line arguments for the chatpulse CLI
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "chatpulse: a polling-based chat client for the community API.",
    long_about = "chatpulse connects to the community REST API, polls for new direct \
    messages, and lets you send messages and toggle likes/bookmarks from the terminal.\n\n\
    Commands once connected:\n\
    @<user> <text>        send a message\n\
    /rooms                list conversation rooms\n\
    /read <room>          mark a room as read\n\
    /resend <room> <key>  retry a failed message\n\
    /like <post>          toggle a like\n\
    /bookmark <post>      toggle a bookmark\n\
    /quit                 disconnect and exit"
)]
struct Args {
    /// Base URL of the community API
    #[arg(long, default_value = "http://localhost:8080/api")]
    server_url: String,

    /// Bearer token; when omitted the saved session is used
    #[arg(long)]
    token: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<String>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    utils::setup_logging(args.log_file.as_deref(), level)?;

    let gateway = match &args.token {
        Some(token) => {
            let session = Session::new(token);
            if let Err(e) = save_session(&session) {
                error!("Could not persist session: {}", e);
            }
            RestGateway::new(&args.server_url, Some(session))
        }
        None => RestGateway::from_saved_session(&args.server_url)?,
    };

    let sender_id = gateway
        .sender_id()
        .ok_or_else(|| anyhow!("No usable session; pass --token with a valid JWT"))?;
    info!("Signed in as {}", sender_id);

    let gateway: Arc<dyn ChatGateway> = Arc::new(gateway);
    let client = Arc::new(ChatClient::new(
        gateway.clone(),
        &sender_id,
        PollConfig::default(),
    ));
    let interactions = Interactions::new(gateway.clone());

    let _on_message = client.on_message(|message| {
        println!(
            "[{}] {} -> {} ({:?}): {}",
            message.timestamp.format("%H:%M:%S"),
            message.sender_id,
            message.receiver_id,
            message.status,
            message.content
        );
    });
    let _on_typing = client.on_typing(|signal| {
        if signal.active {
            println!("{} is typing in {}...", signal.user_id, signal.room_id);
        }
    });
    let _on_read = client.on_read(|room_id| {
        println!("Room {} marked as read", room_id);
    });
    let _on_status = client.on_status_change(|user_id, online| {
        println!("{} is now {}", user_id, if online { "online" } else { "offline" });
    });

    client.connect();

    // Periodic unread badge refresh, on the same polling primitive the
    // message engine uses.
    let unread_gateway = gateway.clone();
    let unread_poller = IntervalPoller::start(Duration::from_secs(30), move || {
        let gateway = unread_gateway.clone();
        async move {
            match gateway.unread_count().await {
                Ok(count) if count > 0 => println!("({} unread)", count),
                Ok(_) => {}
                Err(e) => error!("Unread count refresh failed: {}", e),
            }
        }
    });

    println!("Connected. Type @<user> <message> to chat, /quit to exit.");

    loop {
        let line = tokio::task::spawn_blocking(utils::read_line).await??;
        if line.is_empty() {
            continue;
        }

        if let Some(rest) = line.strip_prefix('@') {
            let Some((user, text)) = rest.split_once(' ') else {
                println!("Usage: @<user> <message>");
                continue;
            };
            let sent = client.send_message(user, text.trim()).await;
            println!("-> {} [{:?}] key={}", sent.id, sent.status, sent.local_key);
            continue;
        }

        let mut parts = line.split_whitespace();
        match parts.next() {
            Some("/rooms") => {
                for room in client.rooms() {
                    println!(
                        "{}  {} ({} unread)  {}",
                        room.id, room.other_user_nickname, room.unread_count, room.last_message
                    );
                }
            }
            Some("/read") => match parts.next() {
                Some(room_id) => {
                    if let Err(e) = client.mark_read(room_id).await {
                        error!("Mark-read failed: {}", e);
                    }
                }
                None => println!("Usage: /read <room>"),
            },
            Some("/resend") => {
                let (room, key) = (parts.next(), parts.next().and_then(|k| k.parse().ok()));
                match (room, key) {
                    (Some(room_id), Some(local_key)) => {
                        match client.resend_message(room_id, local_key).await {
                            Ok(message) => println!("-> {} [{:?}]", message.id, message.status),
                            Err(e) => error!("Resend failed: {}", e),
                        }
                    }
                    _ => println!("Usage: /resend <room> <key>"),
                }
            }
            Some("/like") => match parts.next() {
                Some(post_id) => {
                    match interactions.toggle(InteractionKind::Like, post_id).await {
                        Ok(state) => println!("like={} count={}", state.active, state.count),
                        Err(_) => {
                            let state = interactions.state(InteractionKind::Like, post_id);
                            println!("toggle failed, still like={} count={}", state.active, state.count);
                        }
                    }
                }
                None => println!("Usage: /like <post>"),
            },
            Some("/bookmark") => match parts.next() {
                Some(post_id) => {
                    match interactions.toggle(InteractionKind::Bookmark, post_id).await {
                        Ok(state) => println!("bookmark={} count={}", state.active, state.count),
                        Err(_) => {
                            let state = interactions.state(InteractionKind::Bookmark, post_id);
                            println!(
                                "toggle failed, still bookmark={} count={}",
                                state.active, state.count
                            );
                        }
                    }
                }
                None => println!("Usage: /bookmark <post>"),
            },
            Some("/quit") => break,
            _ => println!("Unknown command: {}", line),
        }
    }

    unread_poller.stop();
    client.disconnect();
    Ok(())
}

//! # takibi-node
//!
//! Headless chat node for the takibi peer session protocol.
//!
//! This binary provides:
//! - **LAN discovery** via multicast presence beacons
//! - **Framed TCP sessions** with the readiness handshake
//! - A line-based console: bare lines are sent as chat messages, `/`
//!   commands drive the session manager

mod config;

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::oneshot;
use tracing::info;
use tracing_subscriber::EnvFilter;

use takibi_net::{
    spawn_manager, LanConfig, LanTransport, ManagerCommand, ManagerConfig, ManagerNotification,
    ManagerSnapshot,
};
use takibi_shared::{ChatMessage, EnvironmentTag, MemoryProfileStore, PeerIdentity, UserProfile};

use crate::config::NodeConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,takibi_node=debug,takibi_net=debug")),
        )
        .init();

    info!("Starting takibi node v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = NodeConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Bind the LAN transport and spawn the session manager
    // -----------------------------------------------------------------------
    let transport = LanTransport::bind(LanConfig {
        session_port: config.session_port,
        beacon_group: config.beacon_group,
        beacon_port: config.beacon_port,
    })
    .await
    .context("binding LAN transport")?;

    let store = Arc::new(MemoryProfileStore::new(UserProfile::new(
        config.display_name.clone(),
    )));

    let manager_config = ManagerConfig {
        service_tag: config.service_tag.clone(),
        environment: EnvironmentTag::Host,
        ..ManagerConfig::default()
    };

    let (commands, mut notifications, identity) =
        spawn_manager(Box::new(transport), store, manager_config).await?;

    info!(identity = %identity, "Node ready");

    commands
        .send(ManagerCommand::StartService)
        .await
        .map_err(|_| anyhow::anyhow!("manager terminated before start"))?;

    // -----------------------------------------------------------------------
    // 4. Print notifications as they arrive
    // -----------------------------------------------------------------------
    tokio::spawn(async move {
        while let Some(notification) = notifications.recv().await {
            print_notification(&notification);
        }
    });

    // -----------------------------------------------------------------------
    // 5. Console loop
    // -----------------------------------------------------------------------
    println!("takibi — /peers /log /invite <peer> /code /connect <code> /name <name> /quit");
    println!("anything else is sent as a message");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match parse_line(line) {
            Ok(Some(command)) => command,
            Ok(None) => break,
            Err(message) => {
                println!("{message}");
                continue;
            }
        };

        if commands.send(command).await.is_err() {
            break;
        }
    }

    let _ = commands.send(ManagerCommand::Shutdown).await;
    info!("Node stopped");
    Ok(())
}

/// Translate a console line into a manager command. `Ok(None)` means quit.
fn parse_line(line: &str) -> Result<Option<ManagerCommand>, String> {
    if !line.starts_with('/') {
        return Ok(Some(ManagerCommand::SendText(line.to_string())));
    }

    let (word, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();

    match word {
        "/quit" => Ok(None),
        "/peers" => {
            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                if let Ok(snapshot) = rx.await {
                    print_snapshot(&snapshot);
                }
            });
            Ok(Some(ManagerCommand::Snapshot(tx)))
        }
        "/log" => {
            let (tx, rx) = oneshot::channel::<Vec<ChatMessage>>();
            tokio::spawn(async move {
                if let Ok(messages) = rx.await {
                    for message in messages {
                        let text = message.text.as_deref().unwrap_or("[image]");
                        println!(
                            "{} [{}] {text}",
                            message.timestamp.to_rfc3339(),
                            message.sender_profile.display_name
                        );
                    }
                }
            });
            Ok(Some(ManagerCommand::Messages(tx)))
        }
        "/code" => {
            let (tx, rx) = oneshot::channel();
            tokio::spawn(async move {
                if let Ok(code) = rx.await {
                    println!("connect code: {code}");
                }
            });
            Ok(Some(ManagerCommand::ConnectionCode(tx)))
        }
        "/connect" if !rest.is_empty() => {
            Ok(Some(ManagerCommand::HandleConnectionCode(rest.to_string())))
        }
        "/invite" if !rest.is_empty() => match PeerIdentity::parse(rest) {
            Ok(peer) => Ok(Some(ManagerCommand::Invite(peer))),
            Err(error) => Err(format!("invalid peer name: {error}")),
        },
        "/name" if !rest.is_empty() => Ok(Some(ManagerCommand::UpdateProfile(
            UserProfile::new(rest.to_string()),
        ))),
        _ => Err(format!("unknown command: {line}")),
    }
}

fn print_notification(notification: &ManagerNotification) {
    match notification {
        ManagerNotification::PeerFound(peer) => {
            let nickname = peer
                .discovery_info
                .as_ref()
                .map(|info| info.nickname.as_str())
                .unwrap_or("?");
            println!("* found {} ({nickname})", peer.identity);
        }
        ManagerNotification::PeerLost(identity) => println!("* lost {identity}"),
        ManagerNotification::PeerConnected(identity) => println!("* connected {identity}"),
        ManagerNotification::PeerDisconnected(identity) => {
            println!("* disconnected {identity}");
        }
        ManagerNotification::PeerReady(identity) => println!("* ready {identity}"),
        ManagerNotification::MessageReceived(message) => {
            let text = message.text.as_deref().unwrap_or("");
            let attachment = if message.image_data.is_some() {
                " [image]"
            } else {
                ""
            };
            println!(
                "[{}] {text}{attachment}",
                message.sender_profile.display_name
            );
        }
        ManagerNotification::MessageQueued(id) => {
            println!("* message {id} queued until a peer is ready");
        }
        ManagerNotification::ServiceStateChanged { searching } => {
            println!("* {}", if *searching { "searching" } else { "idle" });
        }
        ManagerNotification::TransportFailed(error) => println!("* transport error: {error}"),
        ManagerNotification::SnapshotChanged(_) => {}
    }
}

fn print_snapshot(snapshot: &ManagerSnapshot) {
    println!("local: {}", snapshot.local_identity);
    println!(
        "searching: {}, connected: {}, pending: {}, messages: {}",
        snapshot.searching,
        snapshot.is_connected,
        snapshot.pending_count,
        snapshot.message_count
    );
    for peer in &snapshot.available {
        println!("  available {}", peer.identity);
    }
    for peer in &snapshot.connected {
        println!(
            "  connected {}{}",
            peer.identity,
            if peer.ready { " (ready)" } else { "" }
        );
    }
}

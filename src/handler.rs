//! TCP connection handler
//!
//! Handles individual client connections: line framing, message parsing,
//! and bidirectional communication with the ChatServer.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::codec::ChatLineCodec;
use crate::error::AppError;
use crate::message::{ClientMessage, ServerMessage};
use crate::server::ServerCommand;
use crate::types::SessionId;

/// Per-connection limits taken from the server configuration
#[derive(Debug, Clone, Copy)]
pub struct ConnectionSettings {
    /// Outbound queue size
    pub outbound_buffer: usize,
    /// Longest accepted inbound line
    pub max_line_length: usize,
}

/// Handle a new TCP connection
///
/// Registers a session, then runs a read task (lines -> ServerCommand) and
/// a write task (ServerMessage -> lines) until either side ends. The socket
/// is closed when this function returns, on every path.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    settings: ConnectionSettings,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    let (read_half, write_half) = stream.into_split();
    let mut lines_in = FramedRead::new(read_half, ChatLineCodec::new(settings.max_line_length));
    let mut lines_out = FramedWrite::new(write_half, LinesCodec::new());

    let session_id = SessionId::new();
    info!("Session {} connected from {}", session_id, peer_addr);

    // Create channel for server -> client messages
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(settings.outbound_buffer);
    // Cancelled by the server when this session's outbound queue overflows
    let kick = CancellationToken::new();

    // Register with ChatServer
    if cmd_tx
        .send(ServerCommand::Connect {
            session_id,
            sender: msg_tx,
            kick: kick.clone(),
        })
        .await
        .is_err()
    {
        error!("Failed to register session {} - server closed", session_id);
        return Err(AppError::ChannelSend);
    }

    let cmd_tx_read = cmd_tx.clone();

    // Spawn read task (lines -> ServerCommand)
    let mut read_task = tokio::spawn(async move {
        while let Some(line_result) = lines_in.next().await {
            match line_result {
                Ok(line) => match line.parse::<ClientMessage>() {
                    Ok(client_msg) => {
                        let Some(cmd) = client_message_to_command(session_id, client_msg) else {
                            info!("Session {} logged out", session_id);
                            break;
                        };
                        if cmd_tx_read.send(cmd).await.is_err() {
                            debug!("Server closed, ending read task for {}", session_id);
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Ignoring line from {}: {} ({:?})", session_id, e, line);
                    }
                },
                Err(e) => {
                    debug!("Read error for {}: {}", session_id, e);
                    break;
                }
            }
        }
        debug!("Read task ended for {}", session_id);
    });

    // Spawn write task (ServerMessage -> lines)
    let mut write_task = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                _ = kick.cancelled() => {
                    warn!("Session {} fell behind, closing connection", session_id);
                    break;
                }
                msg = msg_rx.recv() => match msg {
                    Some(msg) => msg,
                    None => break,
                }
            };
            if let Err(e) = lines_out.send(msg.to_string()).await {
                debug!("Send failed, ending write task: {}", e);
                break;
            }
        }
        debug!("Write task ended for {}", session_id);

        // Flush and shut down our half of the stream
        let _ = SinkExt::<String>::close(&mut lines_out).await;
    });

    tokio::select! {
        _ = &mut read_task => {
            debug!("Read task completed for {}", session_id);
            // The writer ends once the server drops the session's queue,
            // after flushing whatever was already queued
            if cmd_tx.send(ServerCommand::Disconnect { session_id }).await.is_err() {
                write_task.abort();
            }
            let _ = write_task.await;
        }
        _ = &mut write_task => {
            debug!("Write task completed for {}", session_id);
            read_task.abort();
            let _ = cmd_tx.send(ServerCommand::Disconnect { session_id }).await;
        }
    }

    info!("Session {} disconnected", session_id);

    Ok(())
}

/// Convert a ClientMessage to a ServerCommand
///
/// Returns None for LOGOUT, which ends the connection instead.
fn client_message_to_command(session_id: SessionId, msg: ClientMessage) -> Option<ServerCommand> {
    let cmd = match msg {
        ClientMessage::Login { username } => ServerCommand::Login {
            session_id,
            username,
        },
        ClientMessage::JoinRoom { room_id } => ServerCommand::JoinRoom {
            session_id,
            room_id,
        },
        ClientMessage::CreateRoom { name } => ServerCommand::CreateRoom { session_id, name },
        ClientMessage::LeaveRoom { room_id } => ServerCommand::LeaveRoom {
            session_id,
            room_id,
        },
        ClientMessage::Chat { sender, content } => ServerCommand::Chat {
            session_id,
            sender,
            content,
        },
        ClientMessage::Logout { .. } => return None,
    };
    Some(cmd)
}

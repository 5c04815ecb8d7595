//! Accept loop and server handle
//!
//! Binds the listening socket, starts the ChatServer actor and spawns one
//! handler task per accepted connection. The returned `ServerHandle` is
//! how the rest of the process talks to the running server.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::handler::{handle_connection, ConnectionSettings};
use crate::message::ServerMessage;
use crate::registry::RoomSummary;
use crate::server::{ChatServer, ServerCommand};

/// Handle to a running server
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    cmd_tx: mpsc::Sender<ServerCommand>,
    shutdown: CancellationToken,
    accept_task: JoinHandle<()>,
}

/// Bind the configured address and start serving
///
/// Failing to bind is the only startup error.
pub async fn start(config: ServerConfig) -> Result<ServerHandle, AppError> {
    let listener = TcpListener::bind(config.bind_addr()).await?;
    let local_addr = listener.local_addr()?;
    info!("Chat server listening on {}", local_addr);

    let (cmd_tx, cmd_rx) = mpsc::channel(config.command_buffer);
    tokio::spawn(ChatServer::new(cmd_rx, &config).run());

    let settings = ConnectionSettings {
        outbound_buffer: config.outbound_buffer,
        max_line_length: config.max_line_length,
    };
    let shutdown = CancellationToken::new();
    let accept_task = tokio::spawn(accept_loop(
        listener,
        cmd_tx.clone(),
        shutdown.clone(),
        settings,
    ));

    Ok(ServerHandle {
        local_addr,
        cmd_tx,
        shutdown,
        accept_task,
    })
}

/// Accept connections until `shutdown` is cancelled
///
/// A failed accept only affects that one connection attempt.
async fn accept_loop(
    listener: TcpListener,
    cmd_tx: mpsc::Sender<ServerCommand>,
    shutdown: CancellationToken,
    settings: ConnectionSettings,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = listener.accept() => match result {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    let cmd_tx = cmd_tx.clone();

                    // Spawn handler task for each connection
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, cmd_tx, settings).await {
                            error!("Connection handler error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    // Listener is dropped here, closing the accepting endpoint
    info!("Accept loop stopped");
}

impl ServerHandle {
    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Send a message to every connected session regardless of room
    pub async fn broadcast_to_all(&self, message: ServerMessage) -> Result<(), AppError> {
        self.cmd_tx
            .send(ServerCommand::BroadcastToAll { message })
            .await
            .map_err(|_| AppError::ChannelSend)
    }

    /// Snapshot of logged-in display names
    pub async fn online_users(&self) -> Result<Vec<String>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(ServerCommand::ListOnlineUsers { reply })
            .await
            .map_err(|_| AppError::ChannelSend)?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }

    /// Snapshot of the room listing
    pub async fn rooms(&self) -> Result<Vec<RoomSummary>, AppError> {
        let (reply, rx) = oneshot::channel();
        self.cmd_tx
            .send(ServerCommand::ListRooms { reply })
            .await
            .map_err(|_| AppError::ChannelSend)?;
        rx.await.map_err(|_| AppError::ChannelSend)
    }

    /// Stop accepting, notify every session and disconnect them
    pub async fn stop(self) -> Result<(), AppError> {
        info!("Stopping server");
        self.shutdown.cancel();
        if let Err(e) = self.accept_task.await {
            error!("Accept loop ended abnormally: {}", e);
        }

        let (done, rx) = oneshot::channel();
        self.cmd_tx
            .send(ServerCommand::Shutdown { done })
            .await
            .map_err(|_| AppError::ChannelSend)?;
        rx.await.map_err(|_| AppError::ChannelSend)?;

        info!("Server stopped");
        Ok(())
    }
}

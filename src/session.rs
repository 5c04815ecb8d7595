//! Session struct definition
//!
//! Represents one connected client: its identity, display name, current
//! room and the queue feeding its connection's writer task.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::SendError;
use crate::message::ServerMessage;
use crate::types::{RoomId, SessionId};

/// Protocol state of a session, derived from its fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, no LOGIN yet
    Unauthenticated,
    /// Logged in, not in any room
    Authenticated,
    /// Logged in and member of the given room
    InRoom(RoomId),
}

/// Handle to a session's outbound queue
///
/// Cloned into every room the session joins. Sending never blocks: a
/// broadcaster must not stall behind one slow reader. A reader that lets
/// its queue fill up is disconnected through `kick`.
#[derive(Debug, Clone)]
pub struct Outbox {
    session_id: SessionId,
    sender: mpsc::Sender<ServerMessage>,
    kick: CancellationToken,
}

impl Outbox {
    pub fn new(
        session_id: SessionId,
        sender: mpsc::Sender<ServerMessage>,
        kick: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            sender,
            kick,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Queue a message for this session's writer
    pub fn send(&self, msg: ServerMessage) -> Result<(), SendError> {
        self.sender.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Queue a message, logging instead of failing
    ///
    /// Used for fan-out where one failed recipient must not affect the rest.
    /// A full queue means the client stopped reading; its connection is
    /// closed rather than letting it miss messages silently.
    pub fn deliver(&self, msg: ServerMessage) {
        match self.send(msg) {
            Ok(()) => {}
            Err(SendError::QueueFull) => {
                if !self.kick.is_cancelled() {
                    warn!("Outbound queue full for {}, disconnecting", self.session_id);
                    self.kick.cancel();
                }
            }
            // Session is being torn down
            Err(SendError::ChannelClosed) => {}
        }
    }
}

/// Connected client information
#[derive(Debug)]
pub struct Session {
    /// Unique identifier for this session
    pub id: SessionId,
    /// Display name (None before LOGIN)
    pub username: Option<String>,
    /// Room this session is currently a member of
    pub current_room: Option<RoomId>,
    /// Server → Client message queue
    pub outbox: Outbox,
}

impl Session {
    /// Create a new session with the given ID, sender channel and the
    /// token that closes its connection
    pub fn new(
        id: SessionId,
        sender: mpsc::Sender<ServerMessage>,
        kick: CancellationToken,
    ) -> Self {
        Self {
            id,
            username: None,
            current_room: None,
            outbox: Outbox::new(id, sender, kick),
        }
    }

    pub fn state(&self) -> SessionState {
        match (&self.username, &self.current_room) {
            (None, _) => SessionState::Unauthenticated,
            (Some(_), None) => SessionState::Authenticated,
            (Some(_), Some(room_id)) => SessionState::InRoom(room_id.clone()),
        }
    }

    /// Get the display name for this session
    ///
    /// Returns the username if set, otherwise "Unknown".
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("Unknown")
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }

    pub fn set_username(&mut self, username: String) {
        self.username = Some(username);
    }

    pub fn send(&self, msg: ServerMessage) {
        self.outbox.deliver(msg);
    }
}

//! Error types for the chat server
//!
//! Defines application-level errors, protocol parse errors and
//! outbound send errors. Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// Covers both fatal errors (connection or startup termination) and
/// business errors (reported to the client as a SYSTEM notice).
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Channel send error (fatal - internal channel broken)
    #[error("Channel send error")]
    ChannelSend,

    /// Room not found with the given id
    #[error("Room not found: {0}")]
    RoomNotFound(String),

    /// Room already holds its maximum number of members
    #[error("Room is full")]
    RoomFull,

    /// Registry already holds its maximum number of rooms
    #[error("Room limit reached")]
    RoomLimitReached,

    /// Room operation attempted before LOGIN
    #[error("Login required")]
    LoginRequired,

    /// Session is already a member of the requested room
    #[error("Already in room")]
    AlreadyInRoom,
}

/// Malformed or unrecognized inbound line
///
/// Never fatal: the line is logged and dropped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("missing '|' separator")]
    MissingSeparator,

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("chat payload missing ':' separator")]
    MalformedChat,
}

/// Message send errors
///
/// Occurs when pushing to a session's outbound queue.
#[derive(Debug, Error)]
pub enum SendError {
    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,

    /// The outbound queue is full (slow reader)
    #[error("Outbound queue full")]
    QueueFull,
}

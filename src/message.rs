//! Message protocol definitions
//!
//! Line-based bidirectional protocol. Every record is one UTF-8 line of
//! the form `COMMAND|payload`. Structured server notices are modelled as
//! typed variants and only turned into free text when encoded.

use std::fmt;
use std::str::FromStr;

use crate::error::{AppError, ProtocolError};
use crate::registry::RoomSummary;

/// Client → Server message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    /// Set display name (`LOGIN|<name>`)
    Login { username: String },
    /// Join a room by id (`JOINROOM|<roomId>`)
    JoinRoom { room_id: String },
    /// Create a new room (`CREATEROOM|<name>`)
    CreateRoom { name: String },
    /// Leave the current room (`LEAVEROOM|<roomId>`)
    LeaveRoom { room_id: String },
    /// Chat line for the current room (`CHAT|<name>:<text>`)
    Chat { sender: String, content: String },
    /// Graceful disconnect (`LOGOUT|<name>`)
    Logout { username: String },
}

impl FromStr for ClientMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches('\r');
        let (command, payload) = line
            .split_once('|')
            .ok_or(ProtocolError::MissingSeparator)?;
        let payload = payload.to_string();

        match command {
            "LOGIN" => Ok(Self::Login { username: payload }),
            "JOINROOM" => Ok(Self::JoinRoom { room_id: payload }),
            "CREATEROOM" => Ok(Self::CreateRoom { name: payload }),
            "LEAVEROOM" => Ok(Self::LeaveRoom { room_id: payload }),
            "CHAT" => {
                let (sender, content) = payload
                    .split_once(':')
                    .ok_or(ProtocolError::MalformedChat)?;
                Ok(Self::Chat {
                    sender: sender.to_string(),
                    content: content.to_string(),
                })
            }
            "LOGOUT" => Ok(Self::Logout { username: payload }),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}

/// Server → Client message
///
/// Encoded with `Display`, one line per message (without the newline).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Greeting after LOGIN
    Welcome { username: String },
    /// Join succeeded, carries the room's display name
    Joined { room_name: String },
    /// Another member joined the room
    MemberJoined { username: String },
    /// Another member left the room
    MemberLeft { username: String },
    /// Departure confirmed to the leaving session
    Left,
    /// Room created, carries the new identifier
    RoomCreated { room_id: String },
    /// Relayed chat line
    Chat { sender: String, content: String },
    /// All online display names
    UserList { users: Vec<String> },
    /// All rooms with occupancy
    RoomList { rooms: Vec<RoomSummary> },
    /// Members of one room
    RoomUserList { room_id: String, users: Vec<String> },
    /// Server is going down
    Shutdown,
    /// Request rejected
    Error { code: ErrorCode },
}

/// Error codes for ServerMessage::Error
///
/// Each maps to a fixed SYSTEM notice text understood by existing clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Non-existent room id
    RoomNotFound,
    /// Room already holds its maximum number of members
    RoomFull,
    /// Registry already holds its maximum number of rooms
    RoomLimitReached,
    /// Room operation before LOGIN
    LoginRequired,
    /// Joining the room the session is already in
    AlreadyInRoom,
    /// Anything else
    Internal,
}

impl ErrorCode {
    pub fn text(&self) -> &'static str {
        match self {
            ErrorCode::RoomNotFound => "房间不存在",
            ErrorCode::RoomFull => "房间已满，无法加入",
            ErrorCode::RoomLimitReached => "房间创建失败，可能已达到最大房间数",
            ErrorCode::LoginRequired => "请先登录",
            ErrorCode::AlreadyInRoom => "你已经在该房间中",
            ErrorCode::Internal => "服务器内部错误",
        }
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Welcome { username } => {
                write!(f, "SYSTEM|欢迎加入聊天室，{}！请选择房间开始聊天", username)
            }
            ServerMessage::Joined { room_name } => write!(f, "SYSTEM|成功加入房间: {}", room_name),
            ServerMessage::MemberJoined { username } => write!(f, "SYSTEM|{} 加入了房间", username),
            ServerMessage::MemberLeft { username } => write!(f, "SYSTEM|{} 离开了房间", username),
            ServerMessage::Left => write!(f, "SYSTEM|已离开房间"),
            ServerMessage::RoomCreated { room_id } => {
                write!(f, "SYSTEM|房间创建成功，房间ID: {}", room_id)
            }
            ServerMessage::Chat { sender, content } => write!(f, "CHAT|{}:{}", sender, content),
            ServerMessage::UserList { users } => write!(f, "USERLIST|{}", users.join(",")),
            ServerMessage::RoomList { rooms } => {
                let entries: Vec<String> = rooms
                    .iter()
                    .map(|r| format!("{}:{}:{}", r.id, r.name, r.member_count))
                    .collect();
                write!(f, "ROOMLIST|{}", entries.join(","))
            }
            ServerMessage::RoomUserList { room_id, users } => {
                write!(f, "ROOMUSERLIST|{}|{}", room_id, users.join(","))
            }
            ServerMessage::Shutdown => write!(f, "SERVER|服务器即将关闭，连接将断开"),
            ServerMessage::Error { code } => write!(f, "SYSTEM|{}", code.text()),
        }
    }
}

/// Convert AppError to ServerMessage for client notification
impl From<AppError> for ServerMessage {
    fn from(err: AppError) -> Self {
        let code = match err {
            AppError::RoomNotFound(_) => ErrorCode::RoomNotFound,
            AppError::RoomFull => ErrorCode::RoomFull,
            AppError::RoomLimitReached => ErrorCode::RoomLimitReached,
            AppError::LoginRequired => ErrorCode::LoginRequired,
            AppError::AlreadyInRoom => ErrorCode::AlreadyInRoom,
            // Fatal errors are not typically converted (connection closes)
            _ => ErrorCode::Internal,
        };
        ServerMessage::Error { code }
    }
}

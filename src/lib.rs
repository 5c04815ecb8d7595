//! Multi-room Chat Server Library
//!
//! A line-based TCP chat server built on tokio using the Actor pattern
//! for state management.
//!
//! # Features
//! - Login with a display name (blank names get a guest name)
//! - Default rooms plus on-demand room creation (bounded count)
//! - Bounded room membership, one room per session
//! - Room-scoped chat relay and membership notices
//! - Room and online-user listings pushed to every client
//! - Graceful shutdown with a notice to every client
//!
//! # Architecture
//! Uses the Actor pattern with `mpsc` channels:
//! - `ChatServer` is the central actor owning the sessions and the room registry
//! - Each connection has a read task feeding commands to the actor and a
//!   write task draining the connection's own outbound queue
//! - No locks needed - all state access goes through message passing
//!
//! # Example
//! ```ignore
//! use chat_rooms::{listener, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = listener::start(ServerConfig::default()).await.unwrap();
//!     tokio::signal::ctrl_c().await.unwrap();
//!     handle.stop().await.unwrap();
//! }
//! ```

pub mod codec;
pub mod config;
pub mod console;
pub mod error;
pub mod handler;
pub mod listener;
pub mod message;
pub mod registry;
pub mod room;
pub mod server;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use config::ServerConfig;
pub use error::{AppError, ProtocolError, SendError};
pub use handler::handle_connection;
pub use listener::{start, ServerHandle};
pub use message::{ClientMessage, ErrorCode, ServerMessage};
pub use registry::{Registry, RoomSummary};
pub use room::Room;
pub use server::{ChatServer, ServerCommand};
pub use session::{Session, SessionState};
pub use types::{RoomId, SessionId};

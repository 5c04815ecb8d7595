//! Server configuration
//!
//! Defaults match the classic deployment (port 8888, 10 rooms of 10).
//! A JSON file may override any subset of the fields.

use std::path::Path;

use serde::Deserialize;

use crate::error::AppError;

/// Runtime configuration for the chat server
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: String,
    /// TCP port to listen on (0 picks an ephemeral port)
    pub port: u16,
    /// Maximum members per room
    pub room_capacity: usize,
    /// Maximum number of rooms, default rooms included
    pub max_rooms: usize,
    /// Rooms created at startup, in order (`room1`, `room2`, ...)
    pub default_rooms: Vec<String>,
    /// Prefix for generated names when LOGIN carries a blank name
    pub guest_prefix: String,
    /// Per-connection outbound queue size
    pub outbound_buffer: usize,
    /// Server actor command queue size
    pub command_buffer: usize,
    /// Longest accepted inbound line, in bytes
    pub max_line_length: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            room_capacity: 10,
            max_rooms: 10,
            default_rooms: vec![
                "大厅".to_string(),
                "技术交流".to_string(),
                "休闲娱乐".to_string(),
            ],
            guest_prefix: "游客".to_string(),
            outbound_buffer: 256,
            command_buffer: 256,
            max_line_length: 8192,
        }
    }
}

impl ServerConfig {
    /// Load a configuration file, falling back to defaults for missing fields
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, AppError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Address string for `TcpListener::bind`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

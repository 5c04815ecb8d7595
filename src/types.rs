//! Basic type definitions for the chat server
//!
//! Provides newtype wrappers for type safety:
//! - `SessionId`: UUID-based unique session identifier
//! - `RoomId`: sequential room identifier (`room1`, `room2`, ...)

use uuid::Uuid;

/// Unique session identifier (newtype pattern)
///
/// Wraps a UUID v4 for type-safe session identification.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Room identifier as it appears on the wire
///
/// Assigned by the registry from a monotonic counter and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomId(pub String);

impl RoomId {
    /// Build the identifier for the n-th room
    pub fn from_seq(seq: u32) -> Self {
        Self(format!("room{}", seq))
    }

    /// Wrap an identifier received from a client
    pub fn from_string(id: String) -> Self {
        Self(id.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Make a display name safe to embed in listings
///
/// `,` `:` and `|` delimit `ROOMLIST`, `USERLIST` and `ROOMUSERLIST`
/// entries, so they are replaced by their full-width forms.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            ',' => '，',
            ':' => '：',
            '|' => '｜',
            other => other,
        })
        .collect()
}

/// Generate a guest display name: prefix followed by 6 random alphanumerics
pub fn generate_guest_name(prefix: &str) -> String {
    use rand::Rng;
    let suffix: String = rand::thread_rng()
        .sample_iter(&rand::distributions::Alphanumeric)
        .take(6)
        .map(char::from)
        .collect::<String>()
        .to_uppercase();
    format!("{}{}", prefix, suffix)
}

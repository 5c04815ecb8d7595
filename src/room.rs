//! Room struct definition
//!
//! Represents a bounded chat room. Members are kept in join order, which
//! is the order used for member listings.

use crate::message::ServerMessage;
use crate::session::Outbox;
use crate::types::{RoomId, SessionId};

/// A member entry: who joined and where to deliver their messages
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub username: String,
    pub outbox: Outbox,
}

impl RoomMember {
    pub fn new(username: String, outbox: Outbox) -> Self {
        Self { username, outbox }
    }

    pub fn session_id(&self) -> SessionId {
        self.outbox.session_id()
    }
}

/// Multi-user chat room
///
/// Holds at most `capacity` members. Rooms are never removed once
/// created, even when they become empty.
#[derive(Debug)]
pub struct Room {
    /// Room identifier
    pub id: RoomId,
    /// Display name (not required to be unique)
    pub name: String,
    capacity: usize,
    members: Vec<RoomMember>,
}

impl Room {
    /// Create an empty room
    pub fn new(id: RoomId, name: String, capacity: usize) -> Self {
        Self {
            id,
            name,
            capacity,
            members: Vec::new(),
        }
    }

    /// Add a member
    ///
    /// Returns false if the room is full or the session is already a member.
    pub fn add_member(&mut self, member: RoomMember) -> bool {
        if self.is_full() || self.contains(member.session_id()) {
            return false;
        }
        self.members.push(member);
        true
    }

    /// Remove a member, returning whether it was present
    pub fn remove_member(&mut self, session_id: SessionId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m.session_id() != session_id);
        self.members.len() != before
    }

    /// Send `msg` to every member except `excluding`
    pub fn broadcast(&self, msg: &ServerMessage, excluding: Option<SessionId>) {
        for member in &self.members {
            if Some(member.session_id()) != excluding {
                member.outbox.deliver(msg.clone());
            }
        }
    }

    /// Send the current member listing to every member
    pub fn broadcast_member_list(&self) {
        let msg = ServerMessage::RoomUserList {
            room_id: self.id.to_string(),
            users: self.list_members(),
        };
        self.broadcast(&msg, None);
    }

    /// Display names of the members, in join order
    pub fn list_members(&self) -> Vec<String> {
        self.members.iter().map(|m| m.username.clone()).collect()
    }

    pub fn contains(&self, session_id: SessionId) -> bool {
        self.members.iter().any(|m| m.session_id() == session_id)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_full(&self) -> bool {
        self.members.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

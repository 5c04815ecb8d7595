//! Room registry
//!
//! The server's authoritative room directory. Room ids come from a
//! monotonic counter and are never reused.

use tracing::debug;

use crate::error::AppError;
use crate::room::Room;
use crate::types::{sanitize_name, RoomId};

/// Snapshot of one room for listings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub member_count: usize,
}

/// Room directory, bounded to `max_rooms` rooms in total
#[derive(Debug)]
pub struct Registry {
    /// Rooms in creation order
    rooms: Vec<Room>,
    /// Sequence number of the last allocated id
    last_seq: u32,
    max_rooms: usize,
    room_capacity: usize,
}

impl Registry {
    /// Create a registry seeded with `default_rooms`
    ///
    /// Default rooms beyond `max_rooms` are skipped.
    pub fn new<I, S>(default_rooms: I, max_rooms: usize, room_capacity: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self {
            rooms: Vec::new(),
            last_seq: 0,
            max_rooms,
            room_capacity,
        };
        for name in default_rooms {
            if registry.create_room(name.into()).is_err() {
                break;
            }
        }
        registry
    }

    /// Register a new room and return its id
    ///
    /// A blank name is replaced by the room id. Listing delimiters in the
    /// name are replaced (see `sanitize_name`).
    pub fn create_room(&mut self, name: String) -> Result<RoomId, AppError> {
        if self.rooms.len() >= self.max_rooms {
            return Err(AppError::RoomLimitReached);
        }

        self.last_seq += 1;
        let id = RoomId::from_seq(self.last_seq);
        let name = match name.trim() {
            "" => id.to_string(),
            trimmed => sanitize_name(trimmed),
        };

        debug!("Registering room {} ({})", id, name);
        self.rooms.push(Room::new(id.clone(), name, self.room_capacity));
        Ok(id)
    }

    pub fn get_room(&self, id: &RoomId) -> Result<&Room, AppError> {
        self.rooms
            .iter()
            .find(|r| &r.id == id)
            .ok_or_else(|| AppError::RoomNotFound(id.to_string()))
    }

    pub fn get_room_mut(&mut self, id: &RoomId) -> Result<&mut Room, AppError> {
        self.rooms
            .iter_mut()
            .find(|r| &r.id == id)
            .ok_or_else(|| AppError::RoomNotFound(id.to_string()))
    }

    /// Snapshot of all rooms in creation order
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        self.rooms
            .iter()
            .map(|r| RoomSummary {
                id: r.id.clone(),
                name: r.name.clone(),
                member_count: r.member_count(),
            })
            .collect()
    }

    pub fn rooms_mut(&mut self) -> impl Iterator<Item = &mut Room> {
        self.rooms.iter_mut()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_full(&self) -> bool {
        self.rooms.len() >= self.max_rooms
    }
}

//! ChatServer Actor implementation
//!
//! The central actor that owns all shared state: the session set and the
//! room registry. Every membership change, broadcast and listing runs
//! inside this one task, so a session's `current_room` and the room's
//! member list always change together.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::message::ServerMessage;
use crate::registry::{Registry, RoomSummary};
use crate::room::RoomMember;
use crate::session::Session;
use crate::types::{generate_guest_name, sanitize_name, RoomId, SessionId};

/// Commands sent from connection handlers and the server handle
#[derive(Debug)]
pub enum ServerCommand {
    /// New connection accepted
    Connect {
        session_id: SessionId,
        sender: mpsc::Sender<ServerMessage>,
        /// Cancelled to close the connection when its queue overflows
        kick: CancellationToken,
    },
    /// Connection closed (read failure, logout or shutdown)
    Disconnect {
        session_id: SessionId,
    },
    /// Set the session's display name
    Login {
        session_id: SessionId,
        username: String,
    },
    /// Join an existing room
    JoinRoom {
        session_id: SessionId,
        room_id: String,
    },
    /// Create a new room
    CreateRoom {
        session_id: SessionId,
        name: String,
    },
    /// Leave the current room
    LeaveRoom {
        session_id: SessionId,
        room_id: String,
    },
    /// Relay a chat line to the current room
    Chat {
        session_id: SessionId,
        sender: String,
        content: String,
    },
    /// Send a message to every connected session
    BroadcastToAll {
        message: ServerMessage,
    },
    /// Snapshot of online display names
    ListOnlineUsers {
        reply: oneshot::Sender<Vec<String>>,
    },
    /// Snapshot of the room listing
    ListRooms {
        reply: oneshot::Sender<Vec<RoomSummary>>,
    },
    /// Notify everyone and drop all sessions
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

/// The main ChatServer actor
pub struct ChatServer {
    /// All connected sessions: SessionId -> Session
    sessions: HashMap<SessionId, Session>,
    /// Room directory
    registry: Registry,
    /// Prefix for generated guest names
    guest_prefix: String,
    /// Set once shutdown has started; late connections are refused
    shutting_down: bool,
    /// Command receiver channel
    receiver: mpsc::Receiver<ServerCommand>,
}

impl ChatServer {
    /// Create a new ChatServer with the given command receiver
    pub fn new(receiver: mpsc::Receiver<ServerCommand>, config: &ServerConfig) -> Self {
        Self {
            sessions: HashMap::new(),
            registry: Registry::new(
                config.default_rooms.iter().cloned(),
                config.max_rooms,
                config.room_capacity,
            ),
            guest_prefix: config.guest_prefix.clone(),
            shutting_down: false,
            receiver,
        }
    }

    /// Run the ChatServer event loop
    ///
    /// Continuously receives and processes commands until all senders are dropped.
    pub async fn run(mut self) {
        info!(
            "ChatServer started with {} rooms",
            self.registry.room_count()
        );

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!("ChatServer shutting down");
    }

    /// Process a single command
    fn handle_command(&mut self, cmd: ServerCommand) {
        match cmd {
            ServerCommand::Connect {
                session_id,
                sender,
                kick,
            } => {
                self.handle_connect(session_id, sender, kick);
            }
            ServerCommand::Disconnect { session_id } => {
                self.remove_session(session_id);
            }
            ServerCommand::Login {
                session_id,
                username,
            } => {
                self.handle_login(session_id, username);
            }
            ServerCommand::JoinRoom {
                session_id,
                room_id,
            } => {
                self.handle_join_room(session_id, RoomId::from_string(room_id));
            }
            ServerCommand::CreateRoom { session_id, name } => {
                self.handle_create_room(session_id, name);
            }
            ServerCommand::LeaveRoom {
                session_id,
                room_id,
            } => {
                self.handle_leave_room(session_id, room_id);
            }
            ServerCommand::Chat {
                session_id,
                sender,
                content,
            } => {
                self.handle_chat(session_id, sender, content);
            }
            ServerCommand::BroadcastToAll { message } => {
                self.broadcast_to_all(&message);
            }
            ServerCommand::ListOnlineUsers { reply } => {
                let _ = reply.send(self.online_users());
            }
            ServerCommand::ListRooms { reply } => {
                let _ = reply.send(self.registry.list_rooms());
            }
            ServerCommand::Shutdown { done } => {
                self.handle_shutdown();
                let _ = done.send(());
            }
        }
    }

    /// Handle new connection
    fn handle_connect(
        &mut self,
        session_id: SessionId,
        sender: mpsc::Sender<ServerMessage>,
        kick: CancellationToken,
    ) {
        if self.shutting_down {
            // Dropping the sender ends the connection's writer
            debug!("Refusing session {} during shutdown", session_id);
            return;
        }

        debug!("Registering session {}", session_id);
        self.sessions
            .insert(session_id, Session::new(session_id, sender, kick));
        debug!(
            "Total sessions: {}, Total rooms: {}",
            self.sessions.len(),
            self.registry.room_count()
        );
    }

    /// Disconnect path: leave the current room, then forget the session
    fn remove_session(&mut self, session_id: SessionId) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };

        if let Some(room_id) = session.current_room.clone() {
            self.leave_room(session_id, &room_id, false);
        }

        let Some(session) = self.sessions.remove(&session_id) else {
            return;
        };
        info!(
            "Session {} ({}) disconnected",
            session_id,
            session.display_name()
        );

        if session.is_authenticated() {
            self.broadcast_user_list();
        }
        debug!("Total sessions: {}", self.sessions.len());
    }

    /// Handle LOGIN
    fn handle_login(&mut self, session_id: SessionId, username: String) {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return;
        };

        if session.is_authenticated() {
            warn!(
                "Session {} sent LOGIN while logged in as '{}', ignoring",
                session_id,
                session.display_name()
            );
            return;
        }

        let username = match username.trim() {
            "" => generate_guest_name(&self.guest_prefix),
            trimmed => sanitize_name(trimmed),
        };
        session.set_username(username.clone());
        info!("Session {} logged in as '{}'", session_id, username);

        session.send(ServerMessage::Welcome { username });
        session.send(ServerMessage::RoomList {
            rooms: self.registry.list_rooms(),
        });

        self.broadcast_user_list();
    }

    /// Handle JOINROOM
    fn handle_join_room(&mut self, session_id: SessionId, room_id: RoomId) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };

        if !session.is_authenticated() {
            session.send(AppError::LoginRequired.into());
            return;
        }

        // All checks run before any state changes
        let room = match self.registry.get_room(&room_id) {
            Ok(room) => room,
            Err(e) => {
                debug!("Session {} join failed: {}", session_id, e);
                session.send(e.into());
                return;
            }
        };

        if session.current_room.as_ref() == Some(&room_id) {
            session.send(AppError::AlreadyInRoom.into());
            return;
        }

        if room.is_full() {
            debug!("Session {} join failed: room {} is full", session_id, room_id);
            session.send(AppError::RoomFull.into());
            return;
        }

        if let Some(previous) = session.current_room.clone() {
            self.leave_room(session_id, &previous, true);
        }

        let (Some(session), Ok(room)) = (
            self.sessions.get_mut(&session_id),
            self.registry.get_room_mut(&room_id),
        ) else {
            return;
        };

        let username = session.display_name().to_string();
        if !room.add_member(RoomMember::new(username.clone(), session.outbox.clone())) {
            warn!("Session {} could not be added to {}", session_id, room_id);
            return;
        }
        session.current_room = Some(room_id.clone());

        info!("Session {} ({}) joined room {}", session_id, username, room_id);

        session.send(ServerMessage::Joined {
            room_name: room.name.clone(),
        });
        room.broadcast(&ServerMessage::MemberJoined { username }, Some(session_id));
        room.broadcast_member_list();

        self.broadcast_room_list();
    }

    /// Handle CREATEROOM
    fn handle_create_room(&mut self, session_id: SessionId, name: String) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };

        if !session.is_authenticated() {
            session.send(AppError::LoginRequired.into());
            return;
        }

        match self.registry.create_room(name) {
            Ok(room_id) => {
                info!("Session {} created room {}", session_id, room_id);
                session.send(ServerMessage::RoomCreated {
                    room_id: room_id.to_string(),
                });
                self.broadcast_room_list();
            }
            Err(e) => {
                debug!("Session {} create failed: {}", session_id, e);
                session.send(e.into());
            }
        }
    }

    /// Handle LEAVEROOM
    ///
    /// An empty room id means the current room. Naming any other room is a no-op.
    fn handle_leave_room(&mut self, session_id: SessionId, room_id: String) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };

        let Some(current) = session.current_room.clone() else {
            debug!("Session {} is not in a room, ignoring LEAVEROOM", session_id);
            return;
        };

        let target = match room_id.trim() {
            "" => current,
            other => RoomId::from_string(other.to_string()),
        };

        if !self.leave_room(session_id, &target, true) {
            debug!(
                "Session {} is not in room {}, ignoring LEAVEROOM",
                session_id, target
            );
        }
    }

    /// Remove a session from `room_id` and notify everyone concerned
    ///
    /// Returns false (and does nothing) unless the session is currently in that room.
    fn leave_room(&mut self, session_id: SessionId, room_id: &RoomId, confirm: bool) -> bool {
        let Some(session) = self.sessions.get_mut(&session_id) else {
            return false;
        };

        if session.current_room.as_ref() != Some(room_id) {
            return false;
        }
        session.current_room = None;
        let username = session.display_name().to_string();

        if let Ok(room) = self.registry.get_room_mut(room_id) {
            room.remove_member(session_id);
            room.broadcast(&ServerMessage::MemberLeft { username }, Some(session_id));
            room.broadcast_member_list();
        }
        info!("Session {} left room {}", session_id, room_id);

        self.broadcast_room_list();

        if confirm {
            if let Some(session) = self.sessions.get(&session_id) {
                session.send(ServerMessage::Left);
            }
        }
        true
    }

    /// Handle CHAT
    ///
    /// Relayed to the whole room, sender included. Ignored outside a room.
    fn handle_chat(&mut self, session_id: SessionId, sender: String, content: String) {
        let Some(session) = self.sessions.get(&session_id) else {
            return;
        };

        let Some(room_id) = &session.current_room else {
            debug!("Session {} is not in a room, dropping chat", session_id);
            return;
        };

        if let Ok(room) = self.registry.get_room(room_id) {
            debug!("Relaying chat from {} to room {}", sender, room_id);
            room.broadcast(&ServerMessage::Chat { sender, content }, None);
        }
    }

    /// Notify every session and drop them all
    ///
    /// Dropping the outbound senders lets each writer flush the notice and
    /// close its connection, which ends the blocked reads.
    fn handle_shutdown(&mut self) {
        info!("Disconnecting {} sessions", self.sessions.len());
        self.shutting_down = true;
        self.broadcast_to_all(&ServerMessage::Shutdown);

        for room in self.registry.rooms_mut() {
            for session_id in self.sessions.keys() {
                room.remove_member(*session_id);
            }
        }
        self.sessions.clear();
    }

    /// Send a message to every connected session regardless of room
    fn broadcast_to_all(&self, msg: &ServerMessage) {
        for session in self.sessions.values() {
            session.send(msg.clone());
        }
    }

    fn broadcast_room_list(&self) {
        self.broadcast_to_all(&ServerMessage::RoomList {
            rooms: self.registry.list_rooms(),
        });
    }

    fn broadcast_user_list(&self) {
        self.broadcast_to_all(&ServerMessage::UserList {
            users: self.online_users(),
        });
    }

    /// Display names of all logged-in sessions, sorted
    fn online_users(&self) -> Vec<String> {
        let mut users: Vec<String> = self
            .sessions
            .values()
            .filter_map(|s| s.username.clone())
            .collect();
        users.sort();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ErrorCode;
    use std::time::Duration;
    use tokio::time::timeout;

    struct TestClient {
        id: SessionId,
        rx: mpsc::Receiver<ServerMessage>,
    }

    impl TestClient {
        /// Receive until a message matching `pred` arrives
        async fn expect(&mut self, pred: impl Fn(&ServerMessage) -> bool) -> ServerMessage {
            loop {
                let msg = timeout(Duration::from_secs(2), self.rx.recv())
                    .await
                    .expect("timed out waiting for message")
                    .expect("channel closed");
                if pred(&msg) {
                    return msg;
                }
            }
        }

        fn drain(&mut self) -> Vec<ServerMessage> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    fn spawn_server(config: ServerConfig) -> mpsc::Sender<ServerCommand> {
        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(ChatServer::new(rx, &config).run());
        tx
    }

    async fn connect(tx: &mpsc::Sender<ServerCommand>) -> TestClient {
        let (sender, rx) = mpsc::channel(64);
        let id = SessionId::new();
        tx.send(ServerCommand::Connect {
            session_id: id,
            sender,
            kick: CancellationToken::new(),
        })
        .await
        .unwrap();
        TestClient { id, rx }
    }

    async fn login(tx: &mpsc::Sender<ServerCommand>, name: &str) -> TestClient {
        let mut client = connect(tx).await;
        tx.send(ServerCommand::Login {
            session_id: client.id,
            username: name.to_string(),
        })
        .await
        .unwrap();
        client
            .expect(|m| matches!(m, ServerMessage::Welcome { .. }))
            .await;
        client
    }

    async fn join(tx: &mpsc::Sender<ServerCommand>, client: &TestClient, room: &str) {
        tx.send(ServerCommand::JoinRoom {
            session_id: client.id,
            room_id: room.to_string(),
        })
        .await
        .unwrap();
    }

    /// Round-trip through the actor so every earlier command has been processed
    async fn rooms(tx: &mpsc::Sender<ServerCommand>) -> Vec<RoomSummary> {
        let (reply, rx) = oneshot::channel();
        tx.send(ServerCommand::ListRooms { reply }).await.unwrap();
        rx.await.unwrap()
    }

    async fn online_users(tx: &mpsc::Sender<ServerCommand>) -> Vec<String> {
        let (reply, rx) = oneshot::channel();
        tx.send(ServerCommand::ListOnlineUsers { reply })
            .await
            .unwrap();
        rx.await.unwrap()
    }

    fn count_of(rooms: &[RoomSummary], id: &str) -> usize {
        rooms
            .iter()
            .find(|r| r.id.as_str() == id)
            .map(|r| r.member_count)
            .unwrap()
    }

    #[tokio::test]
    async fn test_login_sends_welcome_and_room_list() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = connect(&tx).await;
        tx.send(ServerCommand::Login {
            session_id: alice.id,
            username: "Alice".to_string(),
        })
        .await
        .unwrap();

        assert_eq!(
            alice.expect(|_| true).await,
            ServerMessage::Welcome {
                username: "Alice".to_string()
            }
        );
        let list = alice.expect(|_| true).await;
        assert_eq!(list.to_string(), "ROOMLIST|room1:大厅:0,room2:技术交流:0,room3:休闲娱乐:0");
        assert_eq!(online_users(&tx).await, vec!["Alice".to_string()]);
    }

    #[tokio::test]
    async fn test_blank_login_gets_guest_name() {
        let config = ServerConfig {
            guest_prefix: "Guest-".to_string(),
            ..ServerConfig::default()
        };
        let tx = spawn_server(config);
        let _guest = login(&tx, "   ").await;

        let users = online_users(&tx).await;
        assert_eq!(users.len(), 1);
        assert!(users[0].starts_with("Guest-"));
    }

    #[tokio::test]
    async fn test_login_name_delimiters_replaced() {
        let tx = spawn_server(ServerConfig::default());
        let mut eve = login(&tx, "Ev,il:x|y").await;
        let mut bob = login(&tx, "Bob").await;
        join(&tx, &eve, "room1").await;
        join(&tx, &bob, "room1").await;

        let users = eve
            .expect(|m| m.to_string().starts_with("USERLIST|") && m.to_string().contains("Bob"))
            .await
            .to_string();
        let names: Vec<&str> = users["USERLIST|".len()..].split(',').collect();
        assert_eq!(names, vec!["Bob", "Ev，il：x｜y"]);

        let members = bob
            .expect(|m| m.to_string() == "ROOMUSERLIST|room1|Ev，il：x｜y,Bob")
            .await
            .to_string();
        let fields: Vec<&str> = members.split('|').collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields[2].split(',').count(), 2);
    }

    #[tokio::test]
    async fn test_second_login_is_ignored() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;
        tx.send(ServerCommand::Login {
            session_id: alice.id,
            username: "Mallory".to_string(),
        })
        .await
        .unwrap();

        assert_eq!(online_users(&tx).await, vec!["Alice".to_string()]);
        assert!(!alice
            .drain()
            .iter()
            .any(|m| matches!(m, ServerMessage::Welcome { .. })));
    }

    #[tokio::test]
    async fn test_room_ops_require_login() {
        let tx = spawn_server(ServerConfig::default());
        let mut anon = connect(&tx).await;
        join(&tx, &anon, "room1").await;

        assert_eq!(
            anon.expect(|_| true).await,
            ServerMessage::Error {
                code: ErrorCode::LoginRequired
            }
        );
        assert_eq!(count_of(&rooms(&tx).await, "room1"), 0);
    }

    #[tokio::test]
    async fn test_lounge_scenario() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;

        tx.send(ServerCommand::CreateRoom {
            session_id: alice.id,
            name: "Lounge".to_string(),
        })
        .await
        .unwrap();
        assert_eq!(
            alice
                .expect(|m| matches!(m, ServerMessage::RoomCreated { .. }))
                .await
                .to_string(),
            "SYSTEM|房间创建成功，房间ID: room4"
        );

        join(&tx, &alice, "room4").await;
        assert_eq!(
            alice
                .expect(|m| matches!(m, ServerMessage::Joined { .. }))
                .await
                .to_string(),
            "SYSTEM|成功加入房间: Lounge"
        );

        let mut bob = login(&tx, "Bob").await;
        join(&tx, &bob, "room4").await;

        alice
            .expect(|m| m.to_string() == "SYSTEM|Bob 加入了房间")
            .await;
        alice
            .expect(|m| m.to_string() == "ROOMUSERLIST|room4|Alice,Bob")
            .await;
        bob.expect(|m| m.to_string() == "ROOMUSERLIST|room4|Alice,Bob")
            .await;

        tx.send(ServerCommand::Chat {
            session_id: alice.id,
            sender: "Alice".to_string(),
            content: "hi".to_string(),
        })
        .await
        .unwrap();
        alice.expect(|m| m.to_string() == "CHAT|Alice:hi").await;
        bob.expect(|m| m.to_string() == "CHAT|Alice:hi").await;

        tx.send(ServerCommand::LeaveRoom {
            session_id: bob.id,
            room_id: "room4".to_string(),
        })
        .await
        .unwrap();
        alice
            .expect(|m| m.to_string() == "SYSTEM|Bob 离开了房间")
            .await;
        alice
            .expect(|m| m.to_string() == "ROOMUSERLIST|room4|Alice")
            .await;
        bob.expect(|m| *m == ServerMessage::Left).await;
    }

    #[tokio::test]
    async fn test_join_notice_excludes_joiner() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;
        join(&tx, &alice, "room1").await;
        rooms(&tx).await;

        let messages = alice.drain();
        assert!(messages.contains(&ServerMessage::Joined {
            room_name: "大厅".to_string()
        }));
        assert!(!messages
            .iter()
            .any(|m| matches!(m, ServerMessage::MemberJoined { .. })));
    }

    #[tokio::test]
    async fn test_full_room_rejects_join() {
        let tx = spawn_server(ServerConfig::default());
        let mut members = Vec::new();
        for i in 0..10 {
            let client = login(&tx, &format!("user{}", i)).await;
            join(&tx, &client, "room1").await;
            members.push(client);
        }
        assert_eq!(count_of(&rooms(&tx).await, "room1"), 10);

        let mut late = login(&tx, "late").await;
        join(&tx, &late, "room1").await;
        assert_eq!(
            late.expect(|m| matches!(m, ServerMessage::Error { .. }))
                .await
                .to_string(),
            "SYSTEM|房间已满，无法加入"
        );
        assert_eq!(count_of(&rooms(&tx).await, "room1"), 10);
    }

    #[tokio::test]
    async fn test_full_room_keeps_previous_membership() {
        let config = ServerConfig {
            room_capacity: 1,
            ..ServerConfig::default()
        };
        let tx = spawn_server(config);
        let alice = login(&tx, "Alice").await;
        join(&tx, &alice, "room1").await;

        let mut bob = login(&tx, "Bob").await;
        join(&tx, &bob, "room2").await;
        join(&tx, &bob, "room1").await;

        let listing = rooms(&tx).await;
        assert_eq!(count_of(&listing, "room1"), 1);
        assert_eq!(count_of(&listing, "room2"), 1);
        assert!(bob.drain().contains(&ServerMessage::Error {
            code: ErrorCode::RoomFull
        }));
    }

    #[tokio::test]
    async fn test_unknown_room() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;
        join(&tx, &alice, "room99").await;

        assert_eq!(
            alice
                .expect(|m| matches!(m, ServerMessage::Error { .. }))
                .await
                .to_string(),
            "SYSTEM|房间不存在"
        );
    }

    #[tokio::test]
    async fn test_switching_rooms_leaves_previous() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;
        let mut bob = login(&tx, "Bob").await;
        join(&tx, &alice, "room1").await;
        join(&tx, &bob, "room1").await;
        join(&tx, &alice, "room2").await;

        let listing = rooms(&tx).await;
        assert_eq!(count_of(&listing, "room1"), 1);
        assert_eq!(count_of(&listing, "room2"), 1);

        bob.expect(|m| m.to_string() == "SYSTEM|Alice 离开了房间")
            .await;
        bob.expect(|m| m.to_string() == "ROOMUSERLIST|room1|Bob")
            .await;

        let alice_msgs = alice.drain();
        let left = alice_msgs
            .iter()
            .position(|m| *m == ServerMessage::Left)
            .unwrap();
        let joined = alice_msgs
            .iter()
            .position(|m| matches!(m, ServerMessage::Joined { room_name } if room_name == "技术交流"))
            .unwrap();
        assert!(left < joined);
        assert!(alice_msgs.contains(&ServerMessage::RoomUserList {
            room_id: "room2".to_string(),
            users: vec!["Alice".to_string()],
        }));
    }

    #[tokio::test]
    async fn test_join_same_room_twice() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;
        join(&tx, &alice, "room1").await;
        join(&tx, &alice, "room1").await;

        alice
            .expect(|m| {
                *m == ServerMessage::Error {
                    code: ErrorCode::AlreadyInRoom,
                }
            })
            .await;
        assert_eq!(count_of(&rooms(&tx).await, "room1"), 1);
    }

    #[tokio::test]
    async fn test_leave_when_not_in_room_is_noop() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;
        let mut bob = login(&tx, "Bob").await;
        join(&tx, &bob, "room1").await;
        rooms(&tx).await;
        alice.drain();
        bob.drain();

        // Not in any room
        tx.send(ServerCommand::LeaveRoom {
            session_id: alice.id,
            room_id: "room1".to_string(),
        })
        .await
        .unwrap();
        // In room1, naming another room
        tx.send(ServerCommand::LeaveRoom {
            session_id: bob.id,
            room_id: "room2".to_string(),
        })
        .await
        .unwrap();
        let listing = rooms(&tx).await;

        assert!(alice.drain().is_empty());
        assert!(bob.drain().is_empty());
        assert_eq!(count_of(&listing, "room1"), 1);
    }

    #[tokio::test]
    async fn test_room_limit() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;

        for i in 0..8 {
            tx.send(ServerCommand::CreateRoom {
                session_id: alice.id,
                name: format!("extra{}", i),
            })
            .await
            .unwrap();
        }

        assert_eq!(rooms(&tx).await.len(), 10);
        let messages = alice.drain();
        let created = messages
            .iter()
            .filter(|m| matches!(m, ServerMessage::RoomCreated { .. }))
            .count();
        assert_eq!(created, 7);
        assert!(messages.contains(&ServerMessage::Error {
            code: ErrorCode::RoomLimitReached
        }));
    }

    #[tokio::test]
    async fn test_create_room_broadcasts_listing() {
        let tx = spawn_server(ServerConfig::default());
        let alice = login(&tx, "Alice").await;
        let mut bob = login(&tx, "Bob").await;

        tx.send(ServerCommand::CreateRoom {
            session_id: alice.id,
            name: "Lounge".to_string(),
        })
        .await
        .unwrap();

        bob.expect(|m| {
            matches!(m, ServerMessage::RoomList { rooms } if rooms.len() == 4 && rooms[3].name == "Lounge")
        })
        .await;
        assert_eq!(count_of(&rooms(&tx).await, "room4"), 0);
    }

    #[tokio::test]
    async fn test_chat_outside_room_is_ignored() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;
        let mut bob = login(&tx, "Bob").await;
        join(&tx, &bob, "room1").await;
        rooms(&tx).await;
        alice.drain();
        bob.drain();

        tx.send(ServerCommand::Chat {
            session_id: alice.id,
            sender: "Alice".to_string(),
            content: "anyone?".to_string(),
        })
        .await
        .unwrap();
        rooms(&tx).await;

        assert!(alice.drain().is_empty());
        assert!(bob.drain().is_empty());
    }

    #[tokio::test]
    async fn test_chat_scoped_to_room() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;
        let mut bob = login(&tx, "Bob").await;
        join(&tx, &alice, "room1").await;
        join(&tx, &bob, "room2").await;
        rooms(&tx).await;
        bob.drain();

        tx.send(ServerCommand::Chat {
            session_id: alice.id,
            sender: "Alice".to_string(),
            content: "hello".to_string(),
        })
        .await
        .unwrap();

        alice.expect(|m| m.to_string() == "CHAT|Alice:hello").await;
        rooms(&tx).await;
        assert!(!bob
            .drain()
            .iter()
            .any(|m| matches!(m, ServerMessage::Chat { .. })));
    }

    #[tokio::test]
    async fn test_disconnect_leaves_room() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;
        let bob = login(&tx, "Bob").await;
        join(&tx, &alice, "room1").await;
        join(&tx, &bob, "room1").await;

        tx.send(ServerCommand::Disconnect { session_id: bob.id })
            .await
            .unwrap();

        alice
            .expect(|m| m.to_string() == "SYSTEM|Bob 离开了房间")
            .await;
        alice
            .expect(|m| m.to_string() == "ROOMUSERLIST|room1|Alice")
            .await;
        alice.expect(|m| m.to_string() == "USERLIST|Alice").await;
        assert_eq!(count_of(&rooms(&tx).await, "room1"), 1);
        assert_eq!(online_users(&tx).await, vec!["Alice".to_string()]);
    }

    #[tokio::test]
    async fn test_member_list_matches_sessions() {
        let tx = spawn_server(ServerConfig::default());
        let mut clients = Vec::new();
        for (name, room) in [("a", "room1"), ("b", "room2"), ("c", "room1"), ("d", "room3")] {
            let client = login(&tx, name).await;
            join(&tx, &client, room).await;
            clients.push(client);
        }
        // "c" moves to room3
        join(&tx, &clients[2], "room3").await;

        let listing = rooms(&tx).await;
        assert_eq!(count_of(&listing, "room1"), 1);
        assert_eq!(count_of(&listing, "room2"), 1);
        assert_eq!(count_of(&listing, "room3"), 2);

        let d = &mut clients[3];
        let last = d
            .drain()
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::RoomUserList { .. }))
            .last()
            .unwrap();
        assert_eq!(last.to_string(), "ROOMUSERLIST|room3|d,c");
    }

    #[tokio::test]
    async fn test_broadcast_to_all() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;
        let mut anon = connect(&tx).await;

        tx.send(ServerCommand::BroadcastToAll {
            message: ServerMessage::Shutdown,
        })
        .await
        .unwrap();

        alice.expect(|m| *m == ServerMessage::Shutdown).await;
        anon.expect(|m| *m == ServerMessage::Shutdown).await;
    }

    #[tokio::test]
    async fn test_shutdown_notifies_and_drops_sessions() {
        let tx = spawn_server(ServerConfig::default());
        let mut alice = login(&tx, "Alice").await;
        join(&tx, &alice, "room1").await;

        let (done, done_rx) = oneshot::channel();
        tx.send(ServerCommand::Shutdown { done }).await.unwrap();
        done_rx.await.unwrap();

        alice.expect(|m| *m == ServerMessage::Shutdown).await;
        // Outbound queue closes once the server drops the session
        while alice.rx.recv().await.is_some() {}

        assert!(online_users(&tx).await.is_empty());
        assert_eq!(count_of(&rooms(&tx).await, "room1"), 0);

        // Late connections are refused
        let mut late = connect(&tx).await;
        rooms(&tx).await;
        assert!(late.rx.recv().await.is_none());
    }
}

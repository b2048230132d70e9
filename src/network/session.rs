//! Room Registry & Session Management
//!
//! `SessionManager` owns every room and every connection. It is driven one
//! event at a time (the server keeps it behind a single mutex), so no
//! method needs internal locking and a handler always runs to completion
//! before the next one starts.
//!
//! Timed effects are not scheduled here. Operations that need one return
//! [`DeferredBroadcast`] values; the caller waits out the delay and hands
//! them back to [`SessionManager::deliver_deferred`], which tolerates the
//! room having disappeared in the meantime.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, info};

use crate::core::rng::{derive_room_seed, entropy_seed, DeterministicRng};
use crate::game::room::{GameConfig, LeaveOutcome, Room, RoomError, Seat};
use crate::game::room_code::RoomCode;
use crate::game::tower::BlockId;
use crate::network::broadcast::{ClientRegistry, ClientSender, ConnectionId, SeatRef};
use crate::network::protocol::{
    BlockRemovedInfo, CollapseInfo, ErrorCode, Notice, PlayerSummary, RoomStateInfo,
    SeatAssignment, ServerMessage,
};

/// A room plus the connections seated in it.
pub struct RoomSession {
    /// Game state.
    pub room: Room,
    seats: BTreeMap<Seat, ConnectionId>,
}

impl RoomSession {
    fn new(room: Room, host: ConnectionId) -> Self {
        let mut seats = BTreeMap::new();
        seats.insert(Seat::One, host);
        Self { room, seats }
    }

    /// Connections seated here, in seat order.
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.seats.values().copied().collect()
    }

    /// Connection holding `seat`.
    pub fn connection(&self, seat: Seat) -> Option<ConnectionId> {
        self.seats.get(&seat).copied()
    }

    fn state_message(&self) -> ServerMessage {
        ServerMessage::RoomState(RoomStateInfo::from(&self.room))
    }
}

/// A broadcast to deliver to a room after a delay.
#[derive(Debug, Clone, PartialEq)]
pub struct DeferredBroadcast {
    /// Target room.
    pub room_code: RoomCode,
    /// How long to wait.
    pub delay: Duration,
    /// Payload, captured when the broadcast was scheduled.
    pub message: ServerMessage,
}

/// Session errors. Reported to the requesting connection only.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SessionError {
    /// No room has this code.
    #[error("Room not found!")]
    RoomNotFound(RoomCode),

    /// The connection holds no seat.
    #[error("You are not in a room!")]
    NotInRoom,

    /// The connection already holds a seat.
    #[error("You are already in a room!")]
    AlreadyInRoom,

    /// The room refused the request.
    #[error(transparent)]
    Room(#[from] RoomError),
}

impl SessionError {
    /// Stable code for the `error` event.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::RoomNotFound(_) => ErrorCode::RoomNotFound,
            SessionError::NotInRoom => ErrorCode::NotInRoom,
            SessionError::AlreadyInRoom => ErrorCode::AlreadyInRoom,
            SessionError::Room(RoomError::Full) => ErrorCode::RoomFull,
            SessionError::Room(RoomError::NotYourTurn) => ErrorCode::NotYourTurn,
            SessionError::Room(RoomError::GameNotActive) => ErrorCode::GameNotActive,
            SessionError::Room(RoomError::WaitingForOpponent) => ErrorCode::WaitingForOpponent,
            SessionError::Room(RoomError::Tower(_)) => ErrorCode::InvalidMove,
        }
    }

    /// The `error` event for this failure.
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::error(self.code(), self.to_string())
    }
}

/// Owns the room registry and all connection sessions.
pub struct SessionManager {
    config: GameConfig,
    rooms: BTreeMap<RoomCode, RoomSession>,
    clients: ClientRegistry,
    master_seed: u64,
    code_rng: DeterministicRng,
    rooms_created: u64,
}

impl SessionManager {
    /// Create a manager seeded from fresh entropy.
    pub fn new(config: GameConfig) -> Self {
        Self::with_seed(config, entropy_seed())
    }

    /// Create a manager whose room codes and collapse draws follow `seed`.
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self {
            config,
            rooms: BTreeMap::new(),
            clients: ClientRegistry::new(),
            master_seed: seed,
            code_rng: DeterministicRng::new(seed),
            rooms_created: 0,
        }
    }

    // -------------------------------------------------------------------------
    // Connection lifecycle
    // -------------------------------------------------------------------------

    /// Register a new connection.
    pub fn connect(&mut self, sender: ClientSender) -> ConnectionId {
        let id = self.clients.register(sender);
        debug!("{} connected", id);
        id
    }

    /// Tear down a connection and vacate its seat.
    ///
    /// The last player out destroys the room. Otherwise the game is
    /// abandoned and the remaining player is told.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        let Some(seat_ref) = self.clients.seat(conn).cloned() else {
            self.clients.unregister(conn);
            debug!("{} disconnected", conn);
            return;
        };

        if let Some(session) = self.rooms.get_mut(&seat_ref.room_code) {
            let recipients = session.connections();
            session.seats.remove(&seat_ref.seat);

            match session.room.leave(seat_ref.seat) {
                LeaveOutcome::Empty => {
                    self.rooms.remove(&seat_ref.room_code);
                    info!("Room {} closed", seat_ref.room_code);
                }
                LeaveOutcome::Remaining(_) => {
                    self.clients.broadcast_except(
                        recipients,
                        conn,
                        &ServerMessage::PlayerLeft(Notice::new("Opponent disconnected!")),
                    );
                    info!("Player {} left room {}", seat_ref.seat.number(), seat_ref.room_code);
                }
                LeaveOutcome::NotSeated => {}
            }
        }

        self.clients.unregister(conn);
        debug!("{} disconnected", conn);
    }

    // -------------------------------------------------------------------------
    // Requests
    // -------------------------------------------------------------------------

    /// Open a room with `conn` in seat 1.
    pub fn create_room(
        &mut self,
        conn: ConnectionId,
        name: Option<&str>,
    ) -> Result<RoomCode, SessionError> {
        if self.clients.seat(conn).is_some() {
            return Err(SessionError::AlreadyInRoom);
        }

        let rooms = &self.rooms;
        let code = RoomCode::generate(&mut self.code_rng, |c| rooms.contains_key(c));
        let seed = derive_room_seed(self.master_seed, code.as_str(), self.rooms_created);
        let rng = DeterministicRng::new(seed);
        self.rooms_created += 1;

        let room = Room::new(code.clone(), name, self.config.clone(), rng);
        self.rooms.insert(code.clone(), RoomSession::new(room, conn));
        self.clients.assign_seat(conn, SeatRef { room_code: code.clone(), seat: Seat::One });

        self.clients.send_to(
            conn,
            ServerMessage::RoomCreated(SeatAssignment {
                room_code: code.clone(),
                player_number: Seat::One,
            }),
        );
        info!("Room {} created", code);
        Ok(code)
    }

    /// Seat `conn` in the room typed as `raw_code` and start the game.
    pub fn join_room(
        &mut self,
        conn: ConnectionId,
        raw_code: &str,
        name: Option<&str>,
    ) -> Result<Seat, SessionError> {
        if self.clients.seat(conn).is_some() {
            return Err(SessionError::AlreadyInRoom);
        }

        let code = RoomCode::normalize(raw_code);
        let session = self
            .rooms
            .get_mut(&code)
            .ok_or_else(|| SessionError::RoomNotFound(code.clone()))?;

        let seat = session.room.join(name)?;
        session.seats.insert(seat, conn);
        self.clients.assign_seat(conn, SeatRef { room_code: code.clone(), seat });

        self.clients.send_to(
            conn,
            ServerMessage::RoomJoined(SeatAssignment {
                room_code: code.clone(),
                player_number: seat,
            }),
        );

        let first = session
            .room
            .player(Seat::One)
            .map(|p| p.name.clone())
            .unwrap_or_default();
        let recipients = session.connections();
        self.clients.broadcast(recipients.iter().copied(), &session.state_message());
        self.clients.broadcast(
            recipients,
            &ServerMessage::GameStart(Notice::new(format!("Game started! {first} goes first."))),
        );

        info!("Player {} joined room {}", seat.number(), code);
        Ok(seat)
    }

    /// Apply `conn`'s removal of `block_id`.
    ///
    /// Returns the delayed collapse announcement when the move toppled the
    /// tower.
    pub fn remove_block(
        &mut self,
        conn: ConnectionId,
        block_id: BlockId,
    ) -> Result<Option<DeferredBroadcast>, SessionError> {
        let seat_ref = self.clients.seat(conn).cloned().ok_or(SessionError::NotInRoom)?;
        let session = self
            .rooms
            .get_mut(&seat_ref.room_code)
            .ok_or(SessionError::NotInRoom)?;

        let removal = session.room.remove_block(seat_ref.seat, block_id)?;
        debug!(
            "Room {}: player {} removed block {} (+{}), hazard {:.2}",
            seat_ref.room_code,
            removal.seat.number(),
            removal.block_id,
            removal.points,
            removal.collapse.hazard,
        );

        let recipients = session.connections();
        self.clients.broadcast(
            recipients.iter().copied(),
            &ServerMessage::BlockRemoved(BlockRemovedInfo {
                block_id: removal.block_id,
                removed_by: removal.seat,
                player_name: removal.player_name.clone(),
            }),
        );

        if !removal.collapsed() {
            self.clients.broadcast(recipients, &session.state_message());
            return Ok(None);
        }

        let room = &session.room;
        let winner_name = removal
            .winner
            .and_then(|seat| room.player(seat))
            .map(|p| p.name.clone())
            .unwrap_or_else(|| String::from("Nobody"));
        info!(
            "Room {}: tower collapsed by player {}, winner {}",
            seat_ref.room_code,
            removal.seat.number(),
            winner_name,
        );

        Ok(Some(DeferredBroadcast {
            room_code: seat_ref.room_code,
            delay: self.config.collapse_broadcast_delay,
            message: ServerMessage::TowerCollapsed(CollapseInfo {
                collapsed_by: removal.seat,
                winner: removal.winner,
                winner_name,
                scores: room.players().iter().map(PlayerSummary::from).collect(),
            }),
        }))
    }

    /// Reset `conn`'s room to a fresh game.
    pub fn restart(&mut self, conn: ConnectionId) -> Result<(), SessionError> {
        let seat_ref = self.clients.seat(conn).cloned().ok_or(SessionError::NotInRoom)?;
        let session = self
            .rooms
            .get_mut(&seat_ref.room_code)
            .ok_or(SessionError::NotInRoom)?;

        session.room.restart()?;

        let recipients = session.connections();
        self.clients.broadcast(recipients.iter().copied(), &ServerMessage::GameRestart);
        self.clients.broadcast(recipients, &session.state_message());

        info!("Room {} restarted by player {}", seat_ref.room_code, seat_ref.seat.number());
        Ok(())
    }

    /// Deliver a broadcast whose delay has elapsed.
    ///
    /// Returns false (and sends nothing) if the room no longer exists.
    pub fn deliver_deferred(&mut self, deferred: DeferredBroadcast) -> bool {
        match self.rooms.get(&deferred.room_code) {
            Some(session) => {
                self.clients.broadcast(session.connections(), &deferred.message);
                true
            }
            None => {
                debug!("Room {} gone before deferred broadcast", deferred.room_code);
                false
            }
        }
    }

    /// Send an event to a single connection.
    pub fn send_to(&self, conn: ConnectionId, message: ServerMessage) {
        self.clients.send_to(conn, message);
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Look up a room.
    pub fn room(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code).map(|s| &s.room)
    }

    /// Look up a room with its seated connections.
    pub fn room_session(&self, code: &RoomCode) -> Option<&RoomSession> {
        self.rooms.get(code)
    }

    /// Seat held by a connection.
    pub fn seat_of(&self, conn: ConnectionId) -> Option<&SeatRef> {
        self.clients.seat(conn)
    }

    /// Number of live rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::collapse::CollapseConfig;
    use crate::game::room::RoomPhase;
    use crate::game::tower::{InvalidMove, TowerError};
    use tokio::sync::mpsc;

    type Inbox = mpsc::UnboundedReceiver<ServerMessage>;

    fn manager(collapse: CollapseConfig) -> SessionManager {
        let config = GameConfig {
            collapse,
            ..GameConfig::default()
        };
        SessionManager::with_seed(config, 42)
    }

    fn connect(mgr: &mut SessionManager) -> (ConnectionId, Inbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (mgr.connect(tx), rx)
    }

    fn drain(rx: &mut Inbox) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    /// Two players seated in a fresh game; inboxes drained.
    fn active_room(
        mgr: &mut SessionManager,
    ) -> (RoomCode, (ConnectionId, Inbox), (ConnectionId, Inbox)) {
        let (a, mut rx_a) = connect(mgr);
        let (b, mut rx_b) = connect(mgr);
        let code = mgr.create_room(a, Some("Alice")).unwrap();
        mgr.join_room(b, code.as_str(), Some("Bob")).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);
        (code, (a, rx_a), (b, rx_b))
    }

    #[test]
    fn test_create_room() {
        let mut mgr = manager(CollapseConfig::never());
        let (a, mut rx) = connect(&mut mgr);

        let code = mgr.create_room(a, Some("Alice")).unwrap();
        assert!(code.is_valid());
        assert_eq!(mgr.room_count(), 1);
        assert_eq!(mgr.room(&code).unwrap().phase(), RoomPhase::Lobby);
        assert_eq!(
            drain(&mut rx),
            vec![ServerMessage::RoomCreated(SeatAssignment {
                room_code: code,
                player_number: Seat::One,
            })]
        );
    }

    #[test]
    fn test_join_room_broadcasts_identical_state() {
        let mut mgr = manager(CollapseConfig::never());
        let (a, mut rx_a) = connect(&mut mgr);
        let (b, mut rx_b) = connect(&mut mgr);
        let code = mgr.create_room(a, Some("Alice")).unwrap();
        drain(&mut rx_a);

        let seat = mgr.join_room(b, &code.as_str().to_lowercase(), Some("Bob")).unwrap();
        assert_eq!(seat, Seat::Two);

        let to_a = drain(&mut rx_a);
        let to_b = drain(&mut rx_b);
        assert_eq!(
            to_b[0],
            ServerMessage::RoomJoined(SeatAssignment {
                room_code: code.clone(),
                player_number: Seat::Two,
            })
        );
        assert_eq!(to_a.len(), 2);
        assert_eq!(&to_b[1..], &to_a[..]);

        match &to_a[0] {
            ServerMessage::RoomState(state) => {
                assert!(state.game_started);
                assert_eq!(state.current_turn, Seat::One);
                assert_eq!(state.players.len(), 2);
            }
            other => panic!("expected room-state, got {other:?}"),
        }
        assert_eq!(
            to_a[1],
            ServerMessage::GameStart(Notice::new("Game started! Alice goes first."))
        );
    }

    #[test]
    fn test_join_errors() {
        let mut mgr = manager(CollapseConfig::never());
        let (code, _a, _b) = active_room(&mut mgr);
        let (c, mut rx_c) = connect(&mut mgr);

        let err = mgr.join_room(c, "0000", None).unwrap_err();
        assert_eq!(err.code(), ErrorCode::RoomNotFound);
        assert_eq!(err.to_string(), "Room not found!");

        let err = mgr.join_room(c, code.as_str(), None).unwrap_err();
        assert_eq!(err, SessionError::Room(RoomError::Full));
        assert_eq!(err.to_string(), "Room is full!");

        assert!(drain(&mut rx_c).is_empty());
        assert_eq!(mgr.seat_of(c), None);
    }

    #[test]
    fn test_already_in_room() {
        let mut mgr = manager(CollapseConfig::never());
        let (code, (a, _rx_a), _b) = active_room(&mut mgr);

        assert_eq!(mgr.create_room(a, None), Err(SessionError::AlreadyInRoom));
        assert_eq!(mgr.join_room(a, code.as_str(), None), Err(SessionError::AlreadyInRoom));
        assert_eq!(mgr.room_count(), 1);
    }

    #[test]
    fn test_requests_without_room() {
        let mut mgr = manager(CollapseConfig::never());
        let (a, _rx) = connect(&mut mgr);

        assert_eq!(mgr.remove_block(a, 0), Err(SessionError::NotInRoom));
        assert_eq!(mgr.restart(a), Err(SessionError::NotInRoom));
    }

    #[test]
    fn test_remove_block_flow() {
        let mut mgr = manager(CollapseConfig::never());
        let (code, (a, mut rx_a), (_b, mut rx_b)) = active_room(&mut mgr);

        let deferred = mgr.remove_block(a, 4).unwrap();
        assert!(deferred.is_none());

        let room = mgr.room(&code).unwrap();
        assert_eq!(room.current_turn(), Seat::Two);
        assert_eq!(room.player(Seat::One).unwrap().score, 20);

        for rx in [&mut rx_a, &mut rx_b] {
            let msgs = drain(rx);
            assert_eq!(msgs.len(), 2);
            assert_eq!(
                msgs[0],
                ServerMessage::BlockRemoved(BlockRemovedInfo {
                    block_id: 4,
                    removed_by: Seat::One,
                    player_name: "Alice".into(),
                })
            );
            assert!(matches!(&msgs[1], ServerMessage::RoomState(s) if s.current_turn == Seat::Two));
        }
    }

    #[test]
    fn test_wrong_turn_reported_to_requester_only() {
        let mut mgr = manager(CollapseConfig::never());
        let (code, (_a, mut rx_a), (b, mut rx_b)) = active_room(&mut mgr);

        let err = mgr.remove_block(b, 0).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotYourTurn);
        assert_eq!(mgr.room(&code).unwrap().tower().removed_count(), 0);

        // The session layer itself sends nothing on failure; the handler does.
        assert!(drain(&mut rx_a).is_empty());
        assert!(drain(&mut rx_b).is_empty());
    }

    #[test]
    fn test_invalid_move_messages() {
        let mut mgr = manager(CollapseConfig::never());
        let (_code, (a, _rx_a), (b, _rx_b)) = active_room(&mut mgr);

        let err = mgr.remove_block(a, 53).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidMove);
        assert_eq!(err.to_string(), "Can't remove from top layer!");

        mgr.remove_block(a, 0).unwrap();
        mgr.remove_block(b, 1).unwrap();
        let err = mgr.remove_block(a, 2).unwrap_err();
        let last_in_layer = TowerError::InvalidMove(InvalidMove::LastInLayer);
        assert_eq!(err, SessionError::Room(RoomError::Tower(last_in_layer)));
        assert_eq!(err.to_string(), "Last block in this layer!");
    }

    #[test]
    fn test_collapse_is_deferred() {
        let collapse = CollapseConfig {
            structural_probability: 1.0,
            ..CollapseConfig::never()
        };
        let mut mgr = manager(collapse);
        let (code, (a, mut rx_a), (b, mut rx_b)) = active_room(&mut mgr);

        assert!(mgr.remove_block(a, 0).unwrap().is_none());
        drain(&mut rx_a);
        drain(&mut rx_b);

        let deferred = mgr.remove_block(b, 1).unwrap().expect("collapse scheduled");
        assert_eq!(deferred.delay, Duration::from_millis(500));
        assert_eq!(deferred.room_code, code);

        let room = mgr.room(&code).unwrap();
        assert_eq!(room.phase(), RoomPhase::Finished);
        assert_eq!(room.winner(), Some(Seat::One));

        // Only the removal goes out immediately.
        let now = drain(&mut rx_a);
        assert_eq!(now.len(), 1);
        assert!(matches!(now[0], ServerMessage::BlockRemoved(_)));

        assert!(mgr.deliver_deferred(deferred));
        match drain(&mut rx_b).last() {
            Some(ServerMessage::TowerCollapsed(info)) => {
                assert_eq!(info.collapsed_by, Seat::Two);
                assert_eq!(info.winner, Some(Seat::One));
                assert_eq!(info.winner_name, "Alice");
                assert_eq!(info.scores.len(), 2);
                assert_eq!(info.scores[0].score, 10);
                assert_eq!(info.scores[1].score, 10);
            }
            other => panic!("expected tower-collapsed, got {other:?}"),
        }
    }

    #[test]
    fn test_deferred_broadcast_after_room_destroyed() {
        let collapse = CollapseConfig {
            structural_probability: 1.0,
            ..CollapseConfig::never()
        };
        let mut mgr = manager(collapse);
        let (_code, (a, _rx_a), (b, _rx_b)) = active_room(&mut mgr);

        mgr.remove_block(a, 0).unwrap();
        let deferred = mgr.remove_block(b, 1).unwrap().unwrap();

        mgr.disconnect(a);
        mgr.disconnect(b);
        assert_eq!(mgr.room_count(), 0);
        assert!(!mgr.deliver_deferred(deferred));
    }

    #[test]
    fn test_restart() {
        let mut mgr = manager(CollapseConfig::never());
        let (code, (a, mut rx_a), (b, mut rx_b)) = active_room(&mut mgr);
        mgr.remove_block(a, 0).unwrap();
        drain(&mut rx_a);
        drain(&mut rx_b);

        mgr.restart(b).unwrap();
        let room = mgr.room(&code).unwrap();
        assert_eq!(room.tower().removed_count(), 0);
        assert_eq!(room.current_turn(), Seat::One);

        let msgs = drain(&mut rx_a);
        assert_eq!(msgs[0], ServerMessage::GameRestart);
        assert!(matches!(
            &msgs[1],
            ServerMessage::RoomState(s) if s.players.iter().all(|p| p.score == 0)
        ));
    }

    #[test]
    fn test_disconnect_lifecycle() {
        let mut mgr = manager(CollapseConfig::never());
        let (code, (a, _rx_a), (b, mut rx_b)) = active_room(&mut mgr);

        mgr.disconnect(a);
        assert_eq!(
            drain(&mut rx_b),
            vec![ServerMessage::PlayerLeft(Notice::new("Opponent disconnected!"))]
        );
        let room = mgr.room(&code).expect("room kept for remaining player");
        assert!(!room.game_started());
        assert!(room.game_over());
        assert_eq!(mgr.connection_count(), 1);

        mgr.disconnect(b);
        assert!(mgr.room(&code).is_none());
        assert_eq!(mgr.connection_count(), 0);

        let (c, _rx_c) = connect(&mut mgr);
        assert_eq!(mgr.join_room(c, code.as_str(), None), Err(SessionError::RoomNotFound(code)));
    }

    #[test]
    fn test_lobby_host_leaving_closes_room() {
        let mut mgr = manager(CollapseConfig::never());
        let (a, _rx) = connect(&mut mgr);
        mgr.create_room(a, None).unwrap();

        mgr.disconnect(a);
        assert_eq!(mgr.room_count(), 0);
    }

    #[test]
    fn test_new_opponent_after_abandon() {
        let mut mgr = manager(CollapseConfig::never());
        let (code, (a, _rx_a), (b, _rx_b)) = active_room(&mut mgr);
        mgr.disconnect(a);

        let (c, _rx_c) = connect(&mut mgr);
        assert_eq!(mgr.join_room(c, code.as_str(), Some("Carol")), Ok(Seat::One));

        let session = mgr.room_session(&code).unwrap();
        assert_eq!(session.connection(Seat::One), Some(c));
        assert_eq!(session.connection(Seat::Two), Some(b));
        assert_eq!(session.room.phase(), RoomPhase::Active);
    }

    #[test]
    fn test_seeded_managers_agree() {
        let mut first = manager(CollapseConfig::default());
        let mut second = manager(CollapseConfig::default());
        let (a1, _r1) = connect(&mut first);
        let (a2, _r2) = connect(&mut second);

        assert_eq!(first.create_room(a1, None), second.create_room(a2, None));
    }
}

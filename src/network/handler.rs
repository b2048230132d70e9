//! Connection Protocol Handler
//!
//! Parses inbound frames, routes them to the session manager, and turns
//! failures into `error` events for the requester. Unparseable input is
//! dropped without a reply.

use tracing::debug;

use crate::network::broadcast::ConnectionId;
use crate::network::protocol::ClientMessage;
use crate::network::session::{DeferredBroadcast, SessionError, SessionManager};

/// Handle one raw text frame from `conn`.
///
/// Returns any broadcasts the caller must deliver later.
pub fn handle_text(
    sessions: &mut SessionManager,
    conn: ConnectionId,
    text: &str,
) -> Vec<DeferredBroadcast> {
    match ClientMessage::from_json(text) {
        Ok(message) => handle_message(sessions, conn, message),
        Err(e) => {
            debug!("Dropped malformed message from {}: {}", conn, e);
            Vec::new()
        }
    }
}

/// Handle one parsed message from `conn`.
pub fn handle_message(
    sessions: &mut SessionManager,
    conn: ConnectionId,
    message: ClientMessage,
) -> Vec<DeferredBroadcast> {
    let result: Result<Option<DeferredBroadcast>, SessionError> = match message {
        ClientMessage::CreateRoom(req) => sessions
            .create_room(conn, req.name.as_deref())
            .map(|_| None),
        ClientMessage::JoinRoom(req) => sessions
            .join_room(conn, &req.room_code, req.name.as_deref())
            .map(|_| None),
        ClientMessage::RemoveBlock(req) => sessions.remove_block(conn, req.block_id),
        ClientMessage::Restart => sessions.restart(conn).map(|_| None),
    };

    match result {
        Ok(deferred) => deferred.into_iter().collect(),
        Err(e) => {
            debug!("Rejected request from {}: {}", conn, e);
            sessions.send_to(conn, e.to_message());
            Vec::new()
        }
    }
}

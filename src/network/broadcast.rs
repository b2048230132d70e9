//! State Broadcaster
//!
//! Tracks every live connection's outbound channel and fans messages out
//! to room members. Sends are synchronous pushes onto unbounded channels,
//! so the order in which a handler emits messages is the order every
//! recipient's writer task sees them.

use std::collections::BTreeMap;

use tokio::sync::mpsc;
use tracing::trace;

use crate::game::room::Seat;
use crate::game::room_code::RoomCode;
use crate::network::protocol::ServerMessage;

/// Outbound channel to one connection's writer task.
pub type ClientSender = mpsc::UnboundedSender<ServerMessage>;

/// Opaque handle for a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Where a connection is seated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatRef {
    /// Room the connection belongs to.
    pub room_code: RoomCode,
    /// Seat it holds there.
    pub seat: Seat,
}

struct ConnectedClient {
    sender: ClientSender,
    seat: Option<SeatRef>,
}

/// Registry of live connections.
#[derive(Default)]
pub struct ClientRegistry {
    clients: BTreeMap<ConnectionId, ConnectedClient>,
    next_id: u64,
}

impl ClientRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and hand back its id.
    pub fn register(&mut self, sender: ClientSender) -> ConnectionId {
        self.next_id += 1;
        let id = ConnectionId(self.next_id);
        self.clients.insert(id, ConnectedClient { sender, seat: None });
        id
    }

    /// Forget a connection, returning the seat it held.
    pub fn unregister(&mut self, id: ConnectionId) -> Option<SeatRef> {
        self.clients.remove(&id).and_then(|c| c.seat)
    }

    /// Seat held by `id`.
    pub fn seat(&self, id: ConnectionId) -> Option<&SeatRef> {
        self.clients.get(&id).and_then(|c| c.seat.as_ref())
    }

    /// Record that `id` now holds a seat.
    pub fn assign_seat(&mut self, id: ConnectionId, seat: SeatRef) {
        if let Some(client) = self.clients.get_mut(&id) {
            client.seat = Some(seat);
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// True if nobody is connected.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    /// Send to a single connection.
    ///
    /// Unknown or closed connections are skipped silently; the transport
    /// reports the disconnect on its own.
    pub fn send_to(&self, id: ConnectionId, message: ServerMessage) {
        if let Some(client) = self.clients.get(&id) {
            if client.sender.send(message).is_err() {
                trace!("Dropped message for closed {}", id);
            }
        }
    }

    /// Send the same message to every listed connection, in order.
    pub fn broadcast<I>(&self, recipients: I, message: &ServerMessage)
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        for id in recipients {
            self.send_to(id, message.clone());
        }
    }

    /// Like [`ClientRegistry::broadcast`], skipping `excluded`.
    pub fn broadcast_except<I>(
        &self,
        recipients: I,
        excluded: ConnectionId,
        message: &ServerMessage,
    ) where
        I: IntoIterator<Item = ConnectionId>,
    {
        self.broadcast(recipients.into_iter().filter(|id| *id != excluded), message);
    }
}

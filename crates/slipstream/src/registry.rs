//! Connection registry: per-connection outbound queues and fan-out.
//!
//! Every accepted connection registers an unbounded sender here; a writer
//! task on the other end drains the queue onto the socket. All broadcast
//! paths go through the registry, so the lock discipline is simple: lock,
//! enqueue, unlock — actual socket writes happen in the writer tasks.

use std::collections::HashMap;
use std::sync::Arc;

use slipstream_protocol::{PlayerNumber, ServerCommand};
use slipstream_transport::ConnectionId;
use tokio::sync::mpsc;

/// Channel sender for delivering outbound commands to one connection.
pub type PeerSender = mpsc::UnboundedSender<ServerCommand>;

/// Shared handle to a connection's current player number.
///
/// The handler owns one and reads it on every command; the registry
/// holds a clone of the same handle, so binding a number on join and
/// clearing an ended roster on race teardown are visible to the handler
/// immediately. A number is `Some` exactly while the lobby or the active
/// race recognizes this connection as its holder.
pub type PlayerSlot = Arc<std::sync::Mutex<Option<PlayerNumber>>>;

/// One registered connection.
struct Peer {
    slot: PlayerSlot,
    sender: PeerSender,
}

impl Peer {
    fn number(&self) -> Option<PlayerNumber> {
        self.slot.lock().map(|n| *n).unwrap_or(None)
    }
}

/// All live connections, keyed by connection id.
#[derive(Default)]
pub struct Registry {
    peers: HashMap<ConnectionId, Peer>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly accepted connection and its number slot.
    pub fn insert(
        &mut self,
        id: ConnectionId,
        slot: PlayerSlot,
        sender: PeerSender,
    ) {
        self.peers.insert(id, Peer { slot, sender });
    }

    /// Unregisters a connection. Returns `false` if it was already gone,
    /// which lets the disconnect cascade run exactly once per peer.
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        self.peers.remove(&id).is_some()
    }

    /// Records the player number a connection was issued on lobby join.
    /// Writes through the shared slot, so the handler sees it too.
    pub fn bind_number(&mut self, id: ConnectionId, number: PlayerNumber) {
        if let Some(peer) = self.peers.get(&id) {
            if let Ok(mut slot) = peer.slot.lock() {
                *slot = Some(number);
            }
        }
    }

    /// Clears the number binding of every connection holding one of the
    /// given numbers. Called when a race session ends: the lobby's pool
    /// has been reset, so an ex-racer's number may be reissued and must
    /// not linger on the old connection.
    pub fn clear_numbers(&mut self, numbers: &[PlayerNumber]) {
        for peer in self.peers.values() {
            if let Ok(mut slot) = peer.slot.lock() {
                if let Some(number) = *slot {
                    if numbers.contains(&number) {
                        *slot = None;
                    }
                }
            }
        }
    }

    /// Enqueues a command for every registered connection.
    pub fn send_to_all(&self, command: &ServerCommand) {
        for peer in self.peers.values() {
            let _ = peer.sender.send(command.clone());
        }
    }

    /// Enqueues a command for every registered connection except `origin`.
    pub fn broadcast_except(
        &self,
        origin: ConnectionId,
        command: &ServerCommand,
    ) {
        for (id, peer) in &self.peers {
            if *id != origin {
                let _ = peer.sender.send(command.clone());
            }
        }
    }

    /// Enqueues a command for the connection bound to `number`, if any.
    /// Silently drops otherwise (the player already disconnected).
    pub fn send_to_number(
        &self,
        number: PlayerNumber,
        command: &ServerCommand,
    ) {
        for peer in self.peers.values() {
            if peer.number() == Some(number) {
                let _ = peer.sender.send(command.clone());
            }
        }
    }

    /// Enqueues a command for each of the given player numbers.
    pub fn send_to_numbers(
        &self,
        numbers: &[PlayerNumber],
        command: &ServerCommand,
    ) {
        for number in numbers {
            self.send_to_number(*number, command);
        }
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Returns `true` if no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

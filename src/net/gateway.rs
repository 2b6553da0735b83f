//! Session gateway: connection registry, display-name sanitising and
//! classification of decoded client messages
//!
//! A connection becomes an entity only after a successful join; until then
//! gameplay intents from it are dropped.

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::mpsc;

use crate::game::constants::net::MAX_NAME_LEN;
use crate::game::state::PlayerId;
use crate::net::dos_protection::ConnectionId;
use crate::net::protocol::ClientMessage;
use crate::util::clock::Millis;

/// Encoded bytes queued for a connection's writer task
#[derive(Debug, Clone)]
pub enum Outbound {
    /// Framed onto the control stream
    Reliable(Arc<Vec<u8>>),
    /// Sent as a datagram; may be lost
    Datagram(Arc<Vec<u8>>),
}

impl Outbound {
    pub fn len(&self) -> usize {
        match self {
            Outbound::Reliable(bytes) | Outbound::Datagram(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type ClientSink = mpsc::UnboundedSender<Outbound>;

/// How a message reached the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Stream,
    Datagram,
}

/// What the gateway should do with a decoded message
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    Join(String),
    Intent(ClientMessage),
    Leave,
    Ignore,
}

/// Lifecycle messages only count on the reliable stream; datagrams may carry
/// high-frequency, loss-tolerant intents (moves and pings) and nothing else.
pub fn classify(message: ClientMessage, channel: Channel) -> Route {
    match (channel, message) {
        (Channel::Stream, ClientMessage::Join { display_name }) => Route::Join(display_name),
        (Channel::Stream, ClientMessage::Leave) => Route::Leave,
        (Channel::Stream, intent) => Route::Intent(intent),
        (Channel::Datagram, intent @ (ClientMessage::Move { .. } | ClientMessage::Ping { .. })) => {
            Route::Intent(intent)
        }
        (Channel::Datagram, _) => Route::Ignore,
    }
}

/// Make an untrusted display name safe to show other players.
/// Returns `None` when nothing printable is left.
pub fn sanitize_display_name(raw: &str) -> Option<String> {
    let filtered: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_control())
        .filter(|c| !matches!(c, '<' | '>' | '&'))
        .collect();
    let collapsed = filtered.split_whitespace().collect::<Vec<_>>().join(" ");
    let name: String = collapsed.chars().take(MAX_NAME_LEN).collect();
    let name = name.trim_end().to_string();
    (!name.is_empty()).then_some(name)
}

/// Per-connection bookkeeping
#[derive(Debug)]
pub struct ConnectionEntry {
    pub sink: ClientSink,
    pub player: Option<PlayerId>,
    pub name: Option<String>,
    /// Largest datagram the peer accepts; 0 means stream only
    pub datagram_limit: usize,
    pub opened_at: Millis,
    pub messages_in: u64,
    pub bytes_in: u64,
}

/// Maps connections to the players they control, in both directions
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    players: HashMap<PlayerId, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, id: ConnectionId, sink: ClientSink, datagram_limit: usize, now: Millis) {
        self.connections.insert(
            id,
            ConnectionEntry {
                sink,
                player: None,
                name: None,
                datagram_limit,
                opened_at: now,
                messages_in: 0,
                bytes_in: 0,
            },
        );
    }

    /// Attach a joined player; false if the connection is unknown or already bound
    pub fn bind(&mut self, id: ConnectionId, player: PlayerId, name: String) -> bool {
        let Some(entry) = self.connections.get_mut(&id) else {
            return false;
        };
        if entry.player.is_some() {
            return false;
        }
        entry.player = Some(player);
        entry.name = Some(name);
        self.players.insert(player, id);
        true
    }

    /// Forget a connection, returning its entry for cleanup
    pub fn close(&mut self, id: ConnectionId) -> Option<ConnectionEntry> {
        let entry = self.connections.remove(&id)?;
        if let Some(player) = entry.player {
            self.players.remove(&player);
        }
        Some(entry)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&ConnectionEntry> {
        self.connections.get(&id)
    }

    pub fn player_of(&self, id: ConnectionId) -> Option<PlayerId> {
        self.connections.get(&id).and_then(|e| e.player)
    }

    pub fn connection_of(&self, player: PlayerId) -> Option<ConnectionId> {
        self.players.get(&player).copied()
    }

    pub fn record_inbound(&mut self, id: ConnectionId, bytes: usize) {
        if let Some(entry) = self.connections.get_mut(&id) {
            entry.messages_in += 1;
            entry.bytes_in += bytes as u64;
        }
    }

    /// Joined connections with their player ids
    pub fn joined(&self) -> impl Iterator<Item = (PlayerId, &ConnectionEntry)> {
        self.connections
            .values()
            .filter_map(|entry| entry.player.map(|player| (player, entry)))
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn joined_count(&self) -> usize {
        self.players.len()
    }
}

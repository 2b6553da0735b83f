//! Per-tick output queues
//!
//! Best-effort streams are coalesced: a newer message of the same
//! `StreamKind` replaces the older one, and dropping either is harmless.
//! Reliable messages are append-only and must all be delivered in order.

use crate::game::state::PlayerId;
use crate::net::protocol::ServerMessage;

/// Overwritable best-effort streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Entities,
    Food,
    Projectiles,
}

impl StreamKind {
    const COUNT: usize = 3;

    fn index(self) -> usize {
        match self {
            StreamKind::Entities => 0,
            StreamKind::Food => 1,
            StreamKind::Projectiles => 2,
        }
    }
}

/// Who receives a reliable message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Only(PlayerId),
    AllExcept(PlayerId),
}

impl Recipient {
    pub fn includes(&self, player_id: PlayerId) -> bool {
        match self {
            Recipient::All => true,
            Recipient::Only(id) => *id == player_id,
            Recipient::AllExcept(id) => *id != player_id,
        }
    }
}

/// Drained contents of an `Outbox`
#[derive(Debug, Default)]
pub struct Flush {
    pub best_effort: Vec<ServerMessage>,
    pub reliable: Vec<(Recipient, ServerMessage)>,
}

impl Flush {
    pub fn is_empty(&self) -> bool {
        self.best_effort.is_empty() && self.reliable.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Outbox {
    latest: [Option<ServerMessage>; StreamKind::COUNT],
    reliable: Vec<(Recipient, ServerMessage)>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the pending best-effort message for `kind`
    pub fn overwrite(&mut self, kind: StreamKind, message: ServerMessage) {
        self.latest[kind.index()] = Some(message);
    }

    pub fn push(&mut self, to: Recipient, message: ServerMessage) {
        self.reliable.push((to, message));
    }

    pub fn broadcast(&mut self, message: ServerMessage) {
        self.push(Recipient::All, message);
    }

    pub fn send_to(&mut self, player_id: PlayerId, message: ServerMessage) {
        self.push(Recipient::Only(player_id), message);
    }

    pub fn latest(&self, kind: StreamKind) -> Option<&ServerMessage> {
        self.latest[kind.index()].as_ref()
    }

    pub fn reliable(&self) -> &[(Recipient, ServerMessage)] {
        &self.reliable
    }

    pub fn is_empty(&self) -> bool {
        self.reliable.is_empty() && self.latest.iter().all(Option::is_none)
    }

    /// Take everything queued so far, leaving the outbox empty
    pub fn take(&mut self) -> Flush {
        Flush {
            best_effort: self.latest.iter_mut().filter_map(Option::take).collect(),
            reliable: std::mem::take(&mut self.reliable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn pong(n: u64) -> ServerMessage {
        ServerMessage::Pong {
            client_timestamp: n,
            server_timestamp: n,
        }
    }

    #[test]
    fn test_overwrite_keeps_latest_only() {
        let mut outbox = Outbox::new();
        outbox.overwrite(StreamKind::Entities, ServerMessage::EntityStates(vec![]));
        outbox.overwrite(StreamKind::Food, ServerMessage::FoodPositions(vec![]));
        outbox.overwrite(StreamKind::Entities, pong(7));

        let flush = outbox.take();
        assert_eq!(flush.best_effort.len(), 2);
        assert!(flush.best_effort.contains(&pong(7)));
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_reliable_preserves_order() {
        let mut outbox = Outbox::new();
        let id = Uuid::new_v4();
        outbox.broadcast(pong(1));
        outbox.send_to(id, pong(2));
        outbox.push(Recipient::AllExcept(id), pong(3));

        let flush = outbox.take();
        let order: Vec<_> = flush.reliable.iter().map(|(_, m)| m.clone()).collect();
        assert_eq!(order, vec![pong(1), pong(2), pong(3)]);
        assert!(outbox.take().is_empty());
    }

    #[test]
    fn test_recipient_filter() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert!(Recipient::All.includes(a));
        assert!(Recipient::Only(a).includes(a));
        assert!(!Recipient::Only(a).includes(b));
        assert!(!Recipient::AllExcept(a).includes(a));
        assert!(Recipient::AllExcept(a).includes(b));
    }
}

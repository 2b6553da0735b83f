//! Routes client intents to the system that owns them

use tracing::{debug, info};

use crate::game::abilities;
use crate::game::game_loop::{init_tables, snapshot};
use crate::game::state::{GameState, PlayerId};
use crate::game::systems::{combat, feeding, movement};
use crate::net::outbox::{Outbox, Recipient};
use crate::net::protocol::{ClientMessage, EntityInfo, LeaveReason, ServerMessage};
use crate::util::clock::Millis;
use crate::util::vec2::Vec2;

/// The connection an intent arrived on
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub id: PlayerId,
    /// Sanitized display name, reused on respawn
    pub name: &'a str,
}

/// Create the player and send it everything it needs to render the world
pub fn join(state: &mut GameState, out: &mut Outbox, id: PlayerId, name: String, now: Millis) {
    let info = EntityInfo::from_player(state.spawn_player(id, name, now));
    info!("Player {} ({}) joined", info.name, id);

    out.send_to(id, ServerMessage::JoinAccepted { player_id: id });
    out.send_to(id, ServerMessage::Init(init_tables(state)));
    out.send_to(id, ServerMessage::Snapshot(snapshot(state, now)));
    out.push(Recipient::AllExcept(id), ServerMessage::EntityJoined(info));
}

/// Remove a departing player; true if it was still in the world
pub fn leave(state: &mut GameState, out: &mut Outbox, id: PlayerId) -> bool {
    if state.remove_player(id).is_none() {
        return false;
    }
    out.broadcast(ServerMessage::EntityLeft {
        id,
        reason: LeaveReason::Disconnected,
    });
    true
}

/// Bring a dead (or already removed) player back at level 1
pub fn respawn(state: &mut GameState, out: &mut Outbox, actor: Actor<'_>, now: Millis) -> bool {
    if state.players.get(&actor.id).is_some_and(|p| p.alive) {
        return false;
    }
    state.ledger.forget(actor.id);
    let info = EntityInfo::from_player(state.spawn_player(actor.id, actor.name.to_string(), now));
    debug!("Player {} respawned", actor.id);
    out.broadcast(ServerMessage::EntityJoined(info));
    true
}

/// Apply one intent. Returns false when it was ignored.
pub fn dispatch(
    state: &mut GameState,
    out: &mut Outbox,
    actor: Actor<'_>,
    message: ClientMessage,
    now: Millis,
) -> bool {
    match message {
        ClientMessage::Move { x, y, angle } => {
            movement::handle_move(state, out, actor.id, Vec2::new(x, y), angle, now).is_some()
        }
        ClientMessage::Shoot { target_x, target_y } => {
            combat::shoot(state, actor.id, Vec2::new(target_x, target_y), now).is_some()
        }
        ClientMessage::Eat { food_id } => feeding::eat(state, out, actor.id, food_id).is_some(),
        ClientMessage::ActivateAbility { ability } => abilities::activate(state, out, actor.id, ability, now),
        ClientMessage::Respawn => respawn(state, out, actor, now),
        ClientMessage::DevLevelUp => dev_level_up(state, out, actor.id),
        ClientMessage::Ping { timestamp } => {
            out.send_to(
                actor.id,
                ServerMessage::Pong {
                    client_timestamp: timestamp,
                    server_timestamp: now,
                },
            );
            true
        }
        ClientMessage::Join { .. } | ClientMessage::Leave => {
            // Connection lifecycle is handled by the gateway
            debug!("Ignoring lifecycle message from {} in dispatch", actor.id);
            false
        }
    }
}

#[cfg(feature = "dev_commands")]
fn dev_level_up(state: &mut GameState, out: &mut Outbox, id: PlayerId) -> bool {
    crate::game::progression::level_up(state, out, id)
}

#[cfg(not(feature = "dev_commands"))]
fn dev_level_up(_state: &mut GameState, _out: &mut Outbox, id: PlayerId) -> bool {
    debug!("Ignoring devLevelUp from {}: dev commands disabled", id);
    false
}

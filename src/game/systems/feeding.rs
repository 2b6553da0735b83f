//! Eating food and keeping the population constant

use tracing::debug;

use crate::game::progression;
use crate::game::state::{EntityId, GameState, PlayerId};
use crate::net::outbox::Outbox;
use crate::net::protocol::{FoodState, ServerMessage};

/// Furthest centre distance at which `player_id` may eat
pub fn eat_reach(state: &GameState, player_id: PlayerId) -> Option<f32> {
    let player = state.players.get(&player_id)?;
    Some(
        player.hit_radius(state.hitbox_ratio())
            + state.config.world.food_footprint * 0.5
            + state.config.feeding.eat_tolerance,
    )
}

/// Handle an eat intent. Returns the replacement food id on success.
pub fn eat(
    state: &mut GameState,
    out: &mut Outbox,
    player_id: PlayerId,
    food_id: EntityId,
) -> Option<EntityId> {
    let player = state.players.get(&player_id)?;
    if !player.alive {
        return None;
    }
    let Some(food) = state.food.get(&food_id) else {
        // Someone else got there first
        debug!("Player {} tried to eat missing food {}", player_id, food_id);
        return None;
    };
    let reach = eat_reach(state, player_id)?;
    let distance = player.center().distance_to(food.position);
    if distance > reach {
        debug!(
            "Eat rejected for {}: food {} is {:.1} away (reach {:.1})",
            player_id, food_id, distance, reach
        );
        return None;
    }
    consume_food(state, out, food_id, Some(player_id))
}

/// Remove a food item, spawn its replacement and credit the eater.
///
/// The replacement appears at a random position with no school; the steering
/// pass assigns one later.
pub fn consume_food(
    state: &mut GameState,
    out: &mut Outbox,
    food_id: EntityId,
    eaten_by: Option<PlayerId>,
) -> Option<EntityId> {
    state.food.remove(&food_id)?;
    let spawned_id = state.spawn_food_random();
    let spawned = state.food.get(&spawned_id).map(FoodState::from_food)?;
    out.broadcast(ServerMessage::FoodRespawned {
        consumed: food_id,
        eaten_by,
        spawned,
    });
    if let Some(player_id) = eaten_by {
        let gain = state.config.feeding.food_score;
        progression::award_score(state, out, player_id, gain);
    }
    Some(spawned_id)
}

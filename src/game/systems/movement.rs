//! Server-side validation of client-proposed moves
//!
//! A proposal is clamped to the map, then truncated to what the player
//! could have covered since its last accepted move. Any shape overlap with
//! another live player after that is resolved by pushing both apart.

use tracing::debug;

use crate::game::abilities::AbilityKind;
use crate::game::mask::overlaps;
use crate::game::state::{GameState, PlayerId};
use crate::game::systems::combat;
use crate::net::outbox::Outbox;
use crate::util::clock::{ms_to_secs, Millis};
use crate::util::vec2::Vec2;

/// Result of a validated move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveOutcome {
    /// Top-left position after validation and collision response
    pub position: Vec2,
    /// Proposal was shortened by the speed check
    pub speed_capped: bool,
    /// Number of players bumped into
    pub collisions: usize,
}

/// Longest distance allowed for a move covering `elapsed_ms`
pub fn max_move_distance(state: &GameState, elapsed_ms: u64, dashing: bool) -> f32 {
    let cfg = state.config.movement;
    let elapsed = elapsed_ms.min(cfg.max_elapsed_ms);
    let boost = if dashing {
        state.config.abilities.dash_multiplier
    } else {
        1.0
    };
    cfg.base_speed * ms_to_secs(elapsed) * cfg.speed_tolerance * boost
}

/// Validate and apply a proposed pose. Dead players and non-finite input are ignored.
pub fn handle_move(
    state: &mut GameState,
    out: &mut Outbox,
    player_id: PlayerId,
    proposed: Vec2,
    angle: f32,
    now: Millis,
) -> Option<MoveOutcome> {
    if !proposed.is_finite() || !angle.is_finite() {
        debug!("Dropping non-finite move from {}", player_id);
        return None;
    }
    let player = state.players.get(&player_id)?;
    if !player.alive {
        return None;
    }

    let target = state.clamp_top_left(proposed, player.footprint);
    let dashing = player.abilities.is_active(AbilityKind::Dash, now);
    let limit = max_move_distance(state, now.saturating_sub(player.last_move_at), dashing);
    let delta = target - player.position;
    let speed_capped = delta.length() > limit;
    // Both endpoints are inside the map box, so the truncated point is too
    let accepted = player.position + delta.clamp_length(limit);

    if let Some(player) = state.players.get_mut(&player_id) {
        player.position = accepted;
        player.angle = angle;
        player.last_move_at = now;
    }

    let collisions = resolve_collisions(state, out, player_id, now);
    let position = state.players.get(&player_id)?.position;
    Some(MoveOutcome {
        position,
        speed_capped,
        collisions,
    })
}

/// Push `mover` and everything its shape overlaps apart, applying contact damage
pub fn resolve_collisions(state: &mut GameState, out: &mut Outbox, mover_id: PlayerId, now: Millis) -> usize {
    let radius = state.masks.config().sample_radius;
    let ratio = state.hitbox_ratio();

    let Some(mover) = state.players.get(&mover_id) else {
        return 0;
    };
    let mover_pose = state.pose_for(mover);
    let mover_mask = state.mask_for(mover);
    // Every contact in this move is judged against immunity from before it
    let mover_immune = mover.is_collision_immune(now);
    let mover_reach = mover.footprint;

    let hits: Vec<PlayerId> = state
        .alive_players()
        .filter(|other| other.id != mover_id)
        .filter(|other| {
            // Broadphase on circles that enclose both footprints
            let reach = (mover_reach + other.footprint) * std::f32::consts::FRAC_1_SQRT_2;
            other.center().distance_to(mover_pose.center) <= reach
        })
        .filter(|other| {
            overlaps(
                mover_mask,
                &mover_pose,
                state.mask_for(other),
                &state.pose_for(other),
                radius,
            )
        })
        .map(|other| other.id)
        .collect();

    let collision = state.config.collision;
    let mut resolved = 0;
    for other_id in hits {
        let (Some(mover), Some(other)) = (state.players.get(&mover_id), state.players.get(&other_id)) else {
            continue;
        };
        if !mover.alive || !other.alive {
            continue;
        }
        let (a, b) = (mover.center(), other.center());
        let axis = {
            let d = a - b;
            if d.length_sq() > 1e-6 {
                d.normalize()
            } else {
                Vec2::from_angle(mover.angle + std::f32::consts::PI)
            }
        };
        let needed = mover.hit_radius(ratio) + other.hit_radius(ratio);
        let shift = collision.knockback.max((needed - a.distance_to(b)) * 0.5);
        let damaging = !mover_immune && !other.is_collision_immune(now);

        push_center(state, mover_id, a + axis * shift);
        push_center(state, other_id, b - axis * shift);
        resolved += 1;

        if damaging {
            for id in [mover_id, other_id] {
                if let Some(p) = state.players.get_mut(&id) {
                    p.collision_immune_until = now + collision.immunity_ms;
                }
            }
            combat::apply_damage(state, out, other_id, Some(mover_id), collision.damage, now);
            if combat::apply_damage(state, out, mover_id, Some(other_id), collision.damage, now) {
                break;
            }
        }
    }
    resolved
}

fn push_center(state: &mut GameState, player_id: PlayerId, center: Vec2) {
    let map = state.map_size();
    if let Some(player) = state.players.get_mut(&player_id) {
        player.set_center(center);
        let max = (map - player.footprint).max(0.0);
        player.position = player.position.clamp(Vec2::ZERO, Vec2::new(max, max));
    }
}

//! Score, levels and visual variant swaps

use tracing::{debug, info};

use crate::config::ProgressionConfig;
use crate::game::constants::net::NOTIFICATION_TTL_MS;
use crate::game::state::{GameState, PlayerId};
use crate::net::outbox::Outbox;
use crate::net::protocol::{NotificationKind, ServerMessage, VariantInfo};
use crate::util::vec2::Vec2;

/// Level reached at `score`: one plus the number of thresholds met
pub fn level_for_score(steps: &[u32], score: u32) -> u32 {
    1 + steps.iter().take_while(|&&step| score >= step).count() as u32
}

/// Variant index for `level`, saturating at the last variant
pub fn variant_for_level(config: &ProgressionConfig, level: u32) -> usize {
    let per = config.levels_per_variant.max(1);
    let index = (level.saturating_sub(1) / per) as usize;
    index.min(config.variants.len().saturating_sub(1))
}

/// Geometry table entry for a variant, anchors scaled to its footprint
pub fn variant_info(state: &GameState, index: usize) -> VariantInfo {
    let spec = state.variant_spec(index);
    let mask = state.masks.get(&spec.key);
    let footprint = state.footprint_for(index);
    let cell = footprint / mask.resolution().max(1) as f32;
    VariantInfo {
        index: index as u8,
        key: spec.key.clone(),
        scale: spec.scale,
        footprint,
        front_anchor: mask.front_anchor() * cell,
        rear_anchor: mask.rear_anchor() * cell,
    }
}

pub fn variant_table(state: &GameState) -> Vec<VariantInfo> {
    (0..state.config.progression.variants.len())
        .map(|i| variant_info(state, i))
        .collect()
}

/// Add `gain` to a player's score and apply any level change
pub fn award_score(state: &mut GameState, out: &mut Outbox, player_id: PlayerId, gain: u32) {
    if gain == 0 {
        return;
    }
    let Some(player) = state.players.get_mut(&player_id) else {
        return;
    };
    player.score = player.score.saturating_add(gain);
    let (score, health) = (player.score, player.health);
    out.broadcast(ServerMessage::Vitals {
        id: player_id,
        health,
        score,
    });
    sync_level(state, out, player_id);
}

/// Recompute the level from the score; emits events only on change
pub fn sync_level(state: &mut GameState, out: &mut Outbox, player_id: PlayerId) -> bool {
    let Some(player) = state.players.get(&player_id) else {
        return false;
    };
    let level = level_for_score(&state.config.progression.level_steps, player.score);
    if level == player.level {
        return false;
    }
    set_level(state, out, player_id, level);
    true
}

fn set_level(state: &mut GameState, out: &mut Outbox, player_id: PlayerId, level: u32) {
    let variant = variant_for_level(&state.config.progression, level);
    let key = state.variant_spec(variant).key.clone();
    if !state.masks.ensure(&key) {
        debug!("Mask '{}' not resident yet, fallback geometry in use", key);
    }
    let footprint = state.footprint_for(variant);
    let max = (state.map_size() - footprint).max(0.0);

    let Some(player) = state.players.get_mut(&player_id) else {
        return;
    };
    let previous = player.level;
    player.level = level;
    if player.variant != variant {
        // Grow or shrink around the centre, then keep the box on the map
        let center = player.center();
        player.variant = variant;
        player.footprint = footprint;
        player.set_center(center);
        player.position = player.position.clamp(Vec2::ZERO, Vec2::new(max, max));
        info!("Player {} is now variant '{}' (level {})", player_id, key, level);
    }

    out.broadcast(ServerMessage::LevelChanged {
        id: player_id,
        level,
        variant: variant_info(state, variant),
    });
    if level > previous {
        out.send_to(
            player_id,
            ServerMessage::Notification {
                text: format!("Level {}!", level),
                kind: NotificationKind::LevelUp,
                ttl_ms: NOTIFICATION_TTL_MS,
            },
        );
    }
}

/// Jump straight to the next level threshold
#[cfg_attr(not(feature = "dev_commands"), allow(dead_code))]
pub fn level_up(state: &mut GameState, out: &mut Outbox, player_id: PlayerId) -> bool {
    let Some(player) = state.players.get(&player_id) else {
        return false;
    };
    if !player.alive {
        return false;
    }
    let steps = &state.config.progression.level_steps;
    let Some(&next) = steps.iter().find(|&&step| step > player.score) else {
        return false;
    };
    let gain = next - player.score;
    award_score(state, out, player_id, gain);
    true
}

/// Announce variants whose masks just finished loading (tick step)
pub fn publish_loaded_masks(state: &mut GameState, out: &mut Outbox) -> usize {
    let loaded = state.masks.drain_completed();
    for key in &loaded {
        let indices: Vec<usize> = state
            .config
            .progression
            .variants
            .iter()
            .enumerate()
            .filter(|(_, v)| &v.key == key)
            .map(|(i, _)| i)
            .collect();
        for index in indices {
            out.broadcast(ServerMessage::VariantGeometry(variant_info(state, index)));
        }
    }
    loaded.len()
}

//! Fixed-rate tick pipeline and the broadcast views it produces
//!
//! Order per tick: sanitize, projectiles, food steering, ability expiry,
//! removal of expired dead players, mask announcements, ledger pruning,
//! stream broadcasts, sanitize.

use tracing::debug;

use crate::game::abilities;
use crate::game::constants::{net, tick};
use crate::game::dispatch::{self, Actor};
use crate::game::progression;
use crate::game::state::{GameState, PlayerId};
use crate::game::systems::{combat, steering};
use crate::net::outbox::{Flush, Outbox, StreamKind};
use crate::net::protocol::{
    ClientMessage, EntityInfo, EntityState, FoodState, InitTables, LeaderboardEntry, ProjectileState,
    ServerMessage, WorldSnapshot,
};
use crate::util::clock::{ms_to_secs, Millis};

/// Longest simulated step for food after a stall
const MAX_STEP_MS: u64 = tick::TICK_DURATION_MS * 4;

/// Counters from one tick, for logging and metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub players: usize,
    pub alive: usize,
    pub food: usize,
    pub projectiles: usize,
    pub removed_dead: usize,
    pub masks_loaded: usize,
    pub repaired: usize,
}

/// Owns the world and the per-tick outbox; the single writer of game state
pub struct GameLoop {
    state: GameState,
    outbox: Outbox,
    last_tick_at: Option<Millis>,
}

impl GameLoop {
    pub fn new(state: GameState) -> Self {
        Self {
            state,
            outbox: Outbox::new(),
            last_tick_at: None,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut GameState {
        &mut self.state
    }

    pub fn join(&mut self, id: PlayerId, name: String, now: Millis) {
        dispatch::join(&mut self.state, &mut self.outbox, id, name, now);
    }

    pub fn leave(&mut self, id: PlayerId) -> bool {
        dispatch::leave(&mut self.state, &mut self.outbox, id)
    }

    pub fn handle(&mut self, actor: Actor<'_>, message: ClientMessage, now: Millis) -> bool {
        dispatch::dispatch(&mut self.state, &mut self.outbox, actor, message, now)
    }

    pub fn tick(&mut self, now: Millis) -> TickReport {
        let dt_ms = match self.last_tick_at {
            Some(last) => now.saturating_sub(last).min(MAX_STEP_MS),
            None => tick::TICK_DURATION_MS,
        };
        self.last_tick_at = Some(now);
        run_tick(&mut self.state, &mut self.outbox, now, dt_ms)
    }

    /// Everything queued since the last call
    pub fn take_output(&mut self) -> Flush {
        self.outbox.take()
    }
}

/// One simulation step over `state`, writing events into `out`
pub fn run_tick(state: &mut GameState, out: &mut Outbox, now: Millis, dt_ms: u64) -> TickReport {
    let mut report = TickReport {
        repaired: state.sanitize(),
        ..TickReport::default()
    };
    state.tick += 1;

    combat::advance_projectiles(state, out, now);
    steering::update(state, ms_to_secs(dt_ms));
    abilities::expire(state, out, now);
    report.removed_dead = combat::remove_expired_dead(state, out, now);
    report.masks_loaded = progression::publish_loaded_masks(state, out);
    state.ledger.prune(now, state.config.combat.assist_window_ms);

    out.overwrite(StreamKind::Entities, ServerMessage::EntityStates(entity_states(state)));
    out.overwrite(
        StreamKind::Projectiles,
        ServerMessage::ProjectilePositions(projectile_states(state)),
    );
    if state.tick % tick::FOOD_BROADCAST_EVERY == 0 {
        out.overwrite(StreamKind::Food, ServerMessage::FoodPositions(food_states(state)));
    }
    if state.tick % tick::LEADERBOARD_EVERY == 0 {
        out.broadcast(ServerMessage::Leaderboard(leaderboard(state)));
    }

    report.repaired += state.sanitize();
    report.tick = state.tick;
    report.players = state.players.len();
    report.alive = state.alive_count();
    report.food = state.food.len();
    report.projectiles = state.projectiles.len();
    if report.removed_dead > 0 || report.masks_loaded > 0 {
        debug!(
            "Tick {}: removed {} dead, {} masks loaded",
            report.tick, report.removed_dead, report.masks_loaded
        );
    }
    report
}

pub fn entity_states(state: &GameState) -> Vec<EntityState> {
    state.players.values().map(EntityState::from_player).collect()
}

pub fn food_states(state: &GameState) -> Vec<FoodState> {
    state.food.values().map(FoodState::from_food).collect()
}

pub fn projectile_states(state: &GameState) -> Vec<ProjectileState> {
    state.projectiles.iter().map(ProjectileState::from_projectile).collect()
}

/// Top players by score, names breaking ties
pub fn leaderboard(state: &GameState) -> Vec<LeaderboardEntry> {
    let mut entries: Vec<LeaderboardEntry> = state
        .players
        .values()
        .map(|p| LeaderboardEntry {
            id: p.id,
            name: p.name.clone(),
            score: p.score,
            level: p.level,
        })
        .collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.name.cmp(&b.name)));
    entries.truncate(net::LEADERBOARD_SIZE);
    entries
}

pub fn snapshot(state: &GameState, now: Millis) -> WorldSnapshot {
    WorldSnapshot {
        server_time: now,
        entities: state.players.values().map(EntityInfo::from_player).collect(),
        food: food_states(state),
        projectiles: projectile_states(state),
    }
}

/// Tables a client needs once: level thresholds and variant geometry
pub fn init_tables(state: &GameState) -> InitTables {
    #[cfg(feature = "debug_masks")]
    let grids = state
        .config
        .progression
        .variants
        .iter()
        .map(|v| {
            let mask = state.masks.get(&v.key);
            crate::net::protocol::MaskGrid {
                key: v.key.clone(),
                resolution: mask.resolution() as u32,
                bits: mask.packed_bits(),
            }
        })
        .collect();
    #[cfg(not(feature = "debug_masks"))]
    let grids = Vec::new();

    InitTables {
        map_size: state.map_size(),
        tick_rate: tick::TICK_RATE,
        level_steps: state.config.progression.level_steps.clone(),
        levels_per_variant: state.config.progression.levels_per_variant,
        variants: progression::variant_table(state),
        grids,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::tests::{add_player_at, create_empty_state, create_test_state};
    use crate::game::state::Projectile;
    use crate::util::vec2::Vec2;

    #[test]
    fn test_tick_emits_entity_and_projectile_streams() {
        let (state, _) = create_test_state();
        let mut game = GameLoop::new(state);
        let report = game.tick(0);
        assert_eq!(report.tick, 1);
        assert_eq!(report.players, 1);

        let flush = game.take_output();
        assert!(flush
            .best_effort
            .iter()
            .any(|m| matches!(m, ServerMessage::EntityStates(v) if v.len() == 1)));
        assert!(flush
            .best_effort
            .iter()
            .any(|m| matches!(m, ServerMessage::ProjectilePositions(_))));
    }

    #[test]
    fn test_food_stream_reduced_cadence() {
        let mut game = GameLoop::new(create_empty_state());
        let mut food_ticks = Vec::new();
        for i in 0..9u64 {
            game.tick(i * tick::TICK_DURATION_MS);
            let flush = game.take_output();
            if flush
                .best_effort
                .iter()
                .any(|m| matches!(m, ServerMessage::FoodPositions(_)))
            {
                food_ticks.push(game.state().tick);
            }
        }
        assert_eq!(food_ticks, vec![3, 6, 9]);
    }

    #[test]
    fn test_leaderboard_once_per_second() {
        let (state, _) = create_test_state();
        let mut game = GameLoop::new(state);
        let mut boards = 0;
        for i in 0..tick::LEADERBOARD_EVERY {
            game.tick(i * tick::TICK_DURATION_MS);
            boards += game
                .take_output()
                .reliable
                .iter()
                .filter(|(_, m)| matches!(m, ServerMessage::Leaderboard(_)))
                .count();
        }
        assert_eq!(boards, 1);
    }

    #[test]
    fn test_leaderboard_sorted_and_truncated() {
        let mut state = create_empty_state();
        for i in 0..15u32 {
            let id = add_player_at(&mut state, &format!("p{:02}", i), Vec2::new(100.0 + i as f32 * 200.0, 500.0));
            state.players.get_mut(&id).unwrap().score = i;
        }
        let board = leaderboard(&state);
        assert_eq!(board.len(), net::LEADERBOARD_SIZE);
        assert_eq!(board[0].score, 14);
        assert!(board.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_tick_removes_projectile_past_lifetime() {
        let (mut state, id) = create_test_state();
        let pid = state.next_entity_id();
        state.projectiles.push(Projectile {
            id: pid,
            owner: id,
            position: Vec2::new(100.0, 100.0),
            velocity: Vec2::new(10.0, 0.0),
            updated_at: 0,
            expires_at: 50,
            launched: true,
        });
        let mut game = GameLoop::new(state);
        game.tick(0);
        assert_eq!(game.state().projectiles.len(), 1);
        game.tick(5_000);
        assert!(game.state().projectiles.is_empty());
    }

    #[test]
    fn test_tick_repairs_corrupt_state() {
        let (mut state, id) = create_test_state();
        state.players.get_mut(&id).unwrap().position = Vec2::new(f32::NAN, f32::NAN);
        let mut game = GameLoop::new(state);
        let report = game.tick(0);
        assert!(report.repaired >= 1);
        assert!(game.state().players[&id].position.is_finite());
    }

    #[test]
    fn test_init_tables_cover_all_variants() {
        let (state, _) = create_test_state();
        let init = init_tables(&state);
        assert_eq!(init.variants.len(), state.config.progression.variants.len());
        assert_eq!(init.level_steps, state.config.progression.level_steps);
        assert_eq!(init.tick_rate, tick::TICK_RATE);
        #[cfg(not(feature = "debug_masks"))]
        assert!(init.grids.is_empty());
    }

    #[test]
    fn test_snapshot_contains_everything() {
        let (mut state, _) = create_test_state();
        state.spawn_food_random();
        let snap = snapshot(&state, 42);
        assert_eq!(snap.server_time, 42);
        assert_eq!(snap.entities.len(), 1);
        assert_eq!(snap.food.len(), 1);
    }
}

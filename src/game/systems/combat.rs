//! Projectiles, damage and death
//!
//! Shots spawn at the shooter's front anchor and are advanced with a
//! sampled sweep so fast projectiles cannot tunnel through thin shapes.

use std::f32::consts::{PI, TAU};

use tracing::{debug, info};

use crate::game::abilities::{self, AbilityKind};
use crate::game::constants::net::NOTIFICATION_TTL_MS;
use crate::game::ledger::{split_kill, KillSplit};
use crate::game::progression;
use crate::game::state::{EntityId, GameState, PlayerId, Projectile};
use crate::game::systems::feeding;
use crate::net::outbox::Outbox;
use crate::net::protocol::{KillReport, LeaveReason, NotificationKind, ServerMessage};
use crate::util::clock::Millis;
use crate::util::vec2::Vec2;

/// What a projectile ran into
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Hit {
    Player(PlayerId),
    Food(EntityId),
}

/// Wrap an angle into (-PI, PI]
fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Clamp `desired` to within `arc` radians of `facing`
pub fn clamp_to_arc(facing: f32, desired: f32, arc: f32) -> f32 {
    let diff = wrap_angle(desired - facing).clamp(-arc, arc);
    facing + diff
}

/// Handle a shoot intent; returns the new projectile id if one was spawned
pub fn shoot(
    state: &mut GameState,
    shooter_id: PlayerId,
    target: Vec2,
    now: Millis,
) -> Option<EntityId> {
    let cfg = state.config.combat;
    let player = state.players.get(&shooter_id)?;
    if !player.alive || !target.is_finite() {
        return None;
    }
    let ready_at = cfg.fire_cooldown_ms.saturating_sub(cfg.latency_shave_ms);
    if let Some(last) = player.last_shot_at {
        if now.saturating_sub(last) < ready_at {
            debug!("Shot from {} rejected: cooling down", shooter_id);
            return None;
        }
    }

    let pose = state.pose_for(player);
    let origin = pose.to_world(state.mask_for(player).front_anchor());
    let aim = target - pose.center;
    let desired = if aim.length_sq() > 1e-6 {
        aim.angle()
    } else {
        player.angle
    };
    let direction = Vec2::from_angle(clamp_to_arc(player.angle, desired, cfg.firing_arc));

    let id = state.next_entity_id();
    state.projectiles.push(Projectile {
        id,
        owner: shooter_id,
        position: origin,
        velocity: direction * cfg.projectile_speed,
        updated_at: now,
        expires_at: now + cfg.projectile_ttl_ms,
        launched: false,
    });
    if let Some(player) = state.players.get_mut(&shooter_id) {
        player.last_shot_at = Some(now);
    }
    Some(id)
}

/// First thing hit along `from -> to`, checked at evenly spaced samples.
///
/// Samples are never further apart than half the smallest body, so a long
/// segment after a stalled tick cannot skip over a target. `include_start`
/// also tests `from` itself, for a projectile's first step out of the muzzle.
pub fn sweep(state: &GameState, owner: PlayerId, from: Vec2, to: Vec2, include_start: bool) -> Option<Hit> {
    let world = state.config.world;
    let spacing = (world.food_footprint.min(world.base_footprint) * 0.5).max(1.0);
    let needed = (from.distance_to(to) / spacing).ceil() as usize;
    let samples = state.config.combat.sweep_samples.max(needed).max(1);
    let radius = state.masks.config().sample_radius;
    let food_mask = state.food_mask();
    let food_reach = world.food_footprint;
    let first = if include_start { 0 } else { 1 };

    for i in first..=samples {
        let point = from.lerp(to, i as f32 / samples as f32);

        for player in state.alive_players() {
            if player.id == owner {
                continue;
            }
            if player.center().distance_to(point) > player.footprint {
                continue;
            }
            let pose = state.pose_for(player);
            if state.mask_for(player).contains_point(&pose, point, radius) {
                return Some(Hit::Player(player.id));
            }
        }

        for food in state.food.values() {
            if food.position.distance_to(point) > food_reach {
                continue;
            }
            if food_mask.contains_point(&state.food_pose(food), point, radius) {
                return Some(Hit::Food(food.id));
            }
        }
    }
    None
}

/// Move every projectile forward to `now`, resolving hits and expiry (tick step)
pub fn advance_projectiles(state: &mut GameState, out: &mut Outbox, now: Millis) {
    let map = state.map_size();
    let projectiles = std::mem::take(&mut state.projectiles);
    let mut survivors = Vec::with_capacity(projectiles.len());

    for mut projectile in projectiles {
        // Never simulate past the lifetime, even after a long stall
        let until = now.min(projectile.expires_at);
        let dt = until.saturating_sub(projectile.updated_at) as f32 / 1000.0;
        let from = projectile.position;
        let to = from + projectile.velocity * dt;

        if let Some(hit) = sweep(state, projectile.owner, from, to, !projectile.launched) {
            out.broadcast(ServerMessage::ProjectileRemoved { id: projectile.id });
            match hit {
                Hit::Player(victim) => {
                    projectile_hit_player(state, out, projectile.owner, victim, now);
                }
                Hit::Food(food_id) => {
                    // Shooting food feeds the shooter
                    feeding::consume_food(state, out, food_id, Some(projectile.owner));
                }
            }
            continue;
        }

        projectile.position = to;
        projectile.updated_at = until;
        projectile.launched = true;
        let inside = to.x >= 0.0 && to.y >= 0.0 && to.x <= map && to.y <= map;
        if until < projectile.expires_at && inside {
            survivors.push(projectile);
        }
    }

    // Shots fired from inside a hit handler would land in state.projectiles
    survivors.append(&mut state.projectiles);
    state.projectiles = survivors;
}

fn projectile_hit_player(
    state: &mut GameState,
    out: &mut Outbox,
    shooter: PlayerId,
    victim: PlayerId,
    now: Millis,
) {
    let deflected = state
        .players
        .get(&victim)
        .is_some_and(|p| p.abilities.is_active(AbilityKind::Deflect, now));
    if deflected {
        abilities::consume_deflect(state, out, victim, now);
        return;
    }
    let damage = state.config.combat.bullet_damage;
    apply_damage(state, out, victim, Some(shooter), damage, now);
}

/// Apply damage, record attribution and resolve death. Returns true if lethal.
pub fn apply_damage(
    state: &mut GameState,
    out: &mut Outbox,
    victim: PlayerId,
    attacker: Option<PlayerId>,
    amount: f32,
    now: Millis,
) -> bool {
    let Some(player) = state.players.get_mut(&victim) else {
        return false;
    };
    if !player.alive {
        return false;
    }
    let lethal = player.take_damage(amount);
    let (health, score) = (player.health, player.score);
    if let Some(attacker) = attacker {
        state.ledger.record(victim, attacker, amount, now);
    }
    out.broadcast(ServerMessage::Vitals {
        id: victim,
        health,
        score,
    });
    if lethal {
        resolve_death(state, out, victim, now);
    }
    lethal
}

/// Mark the victim dead, pay out its score and announce the kill
pub fn resolve_death(state: &mut GameState, out: &mut Outbox, victim_id: PlayerId, now: Millis) {
    let Some(victim) = state.players.get_mut(&victim_id) else {
        return;
    };
    victim.alive = false;
    victim.health = 0.0;
    victim.died_at = Some(now);
    victim.deaths += 1;
    let victim_score = victim.score;
    let victim_name = victim.name.clone();

    let split = {
        let players = &state.players;
        split_kill(
            state.ledger.contributions(victim_id),
            victim_score,
            now,
            &state.config.combat,
            |id| id != victim_id && players.contains_key(&id),
        )
    };
    state.ledger.clear_victim(victim_id);

    let name_of = |state: &GameState, id: PlayerId| state.players.get(&id).map(|p| p.name.clone());
    let report = match split {
        KillSplit::Unattributed => KillReport {
            victim: victim_id,
            victim_name,
            killer: None,
            killer_name: None,
            assister: None,
            assister_name: None,
            killer_gain: 0,
            assister_gain: 0,
            shared: false,
        },
        KillSplit::Solo { killer, award } => {
            credit(state, out, killer, award, NotificationKind::Kill, &victim_name);
            KillReport {
                victim: victim_id,
                killer: Some(killer),
                killer_name: name_of(state, killer),
                assister: None,
                assister_name: None,
                killer_gain: award,
                assister_gain: 0,
                shared: false,
                victim_name,
            }
        }
        KillSplit::Assisted {
            killer,
            killer_award,
            assister,
            assist_award,
        } => {
            credit(state, out, killer, killer_award, NotificationKind::Kill, &victim_name);
            credit(state, out, assister, assist_award, NotificationKind::Assist, &victim_name);
            KillReport {
                victim: victim_id,
                killer: Some(killer),
                killer_name: name_of(state, killer),
                assister: Some(assister),
                assister_name: name_of(state, assister),
                killer_gain: killer_award,
                assister_gain: assist_award,
                shared: false,
                victim_name,
            }
        }
        KillSplit::Shared {
            first,
            second,
            award,
        } => {
            credit(state, out, first, award, NotificationKind::SharedKill, &victim_name);
            credit(state, out, second, award, NotificationKind::SharedKill, &victim_name);
            KillReport {
                victim: victim_id,
                killer: Some(first),
                killer_name: name_of(state, first),
                assister: Some(second),
                assister_name: name_of(state, second),
                killer_gain: award,
                assister_gain: award,
                shared: true,
                victim_name,
            }
        }
    };

    let death_text = match &report.killer_name {
        Some(name) => format!("Eaten by {}", name),
        None => "You died".to_string(),
    };
    info!(
        "Player {} died (killer: {:?}, gain: {})",
        victim_id,
        report.killer,
        split.total()
    );
    out.broadcast(ServerMessage::KillFeed(report));
    out.send_to(
        victim_id,
        ServerMessage::Notification {
            text: death_text,
            kind: NotificationKind::Death,
            ttl_ms: NOTIFICATION_TTL_MS,
        },
    );
}

fn credit(
    state: &mut GameState,
    out: &mut Outbox,
    player_id: PlayerId,
    award: u32,
    kind: NotificationKind,
    victim_name: &str,
) {
    if let Some(player) = state.players.get_mut(&player_id) {
        if kind != NotificationKind::Assist {
            player.kills += 1;
        }
    }
    progression::award_score(state, out, player_id, award);
    let text = match kind {
        NotificationKind::Assist => format!("Assist on {} +{}", victim_name, award),
        NotificationKind::SharedKill => format!("Shared kill on {} +{}", victim_name, award),
        _ => format!("Ate {} +{}", victim_name, award),
    };
    out.send_to(
        player_id,
        ServerMessage::Notification {
            text,
            kind,
            ttl_ms: NOTIFICATION_TTL_MS,
        },
    );
}

/// Remove players whose death grace period has elapsed (tick step)
pub fn remove_expired_dead(state: &mut GameState, out: &mut Outbox, now: Millis) -> usize {
    let grace = state.config.combat.death_grace_ms;
    let expired: Vec<PlayerId> = state
        .players
        .values()
        .filter(|p| p.died_at.is_some_and(|at| now.saturating_sub(at) >= grace))
        .map(|p| p.id)
        .collect();
    for id in &expired {
        state.remove_player(*id);
        out.broadcast(ServerMessage::EntityLeft {
            id: *id,
            reason: LeaveReason::Died,
        });
    }
    expired.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::tests::{add_player_at, create_empty_state, create_test_state};

    fn face(state: &mut GameState, id: PlayerId, angle: f32) {
        state.players.get_mut(&id).unwrap().angle = angle;
    }

    fn kill_feeds(out: &Outbox) -> Vec<KillReport> {
        out.reliable()
            .iter()
            .filter_map(|(_, m)| match m {
                ServerMessage::KillFeed(r) => Some(r.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_clamp_to_arc() {
        assert!((clamp_to_arc(0.0, 0.3, PI / 2.0) - 0.3).abs() < 1e-6);
        assert!((clamp_to_arc(0.0, PI, PI / 2.0) - PI / 2.0).abs() < 1e-6);
        assert!((clamp_to_arc(0.0, -2.5, PI / 2.0) + PI / 2.0).abs() < 1e-6);
        // Wraps across the +-PI seam
        let clamped = clamp_to_arc(3.0, -3.0, 0.5);
        assert!((clamped - (3.0 + (TAU - 6.0))).abs() < 1e-4);
    }

    #[test]
    fn test_shoot_spawns_at_front_anchor() {
        let (mut state, id) = create_test_state();
        face(&mut state, id, 0.0);
        let center = state.players[&id].center();

        let pid = shoot(&mut state, id, center + Vec2::new(500.0, 0.0), 1000).unwrap();
        let projectile = state.projectiles.iter().find(|p| p.id == pid).unwrap();
        assert!(projectile.position.x > center.x + 20.0);
        assert!(projectile.velocity.x > 0.0);
        assert_eq!(projectile.expires_at, 1000 + state.config.combat.projectile_ttl_ms);
    }

    #[test]
    fn test_shoot_cooldown_with_latency_shave() {
        let (mut state, id) = create_test_state();
        let target = Vec2::new(3000.0, 2000.0);
        assert!(shoot(&mut state, id, target, 1000).is_some());
        assert!(shoot(&mut state, id, target, 1200).is_none());
        // 500ms cooldown minus 50ms shave
        assert!(shoot(&mut state, id, target, 1450).is_some());
    }

    #[test]
    fn test_shoot_behind_is_clamped_to_arc() {
        let (mut state, id) = create_test_state();
        face(&mut state, id, 0.0);
        let center = state.players[&id].center();
        shoot(&mut state, id, center - Vec2::new(500.0, 0.0), 0).unwrap();
        let v = state.projectiles[0].velocity;
        assert!(v.x >= -1e-3);
    }

    #[test]
    fn test_dead_cannot_shoot() {
        let (mut state, id) = create_test_state();
        state.players.get_mut(&id).unwrap().alive = false;
        assert!(shoot(&mut state, id, Vec2::ZERO, 0).is_none());
        assert!(shoot(&mut state, id, Vec2::new(f32::NAN, 0.0), 0).is_none());
    }

    #[test]
    fn test_projectile_expires_after_ttl() {
        let (mut state, id) = create_test_state();
        let mut out = Outbox::new();
        face(&mut state, id, -PI / 2.0);
        let center = state.players[&id].center();
        shoot(&mut state, id, center - Vec2::new(0.0, 100.0), 0).unwrap();
        let ttl = state.config.combat.projectile_ttl_ms;

        advance_projectiles(&mut state, &mut out, ttl / 2);
        assert_eq!(state.projectiles.len(), 1);
        // A stalled tick still cannot carry it past its lifetime
        advance_projectiles(&mut state, &mut out, ttl * 10);
        assert!(state.projectiles.is_empty());
    }

    #[test]
    fn test_projectile_hits_target_and_reports_removal() {
        let (mut state, shooter) = create_test_state();
        let target = add_player_at(&mut state, "target", Vec2::new(2200.0, 2000.0));
        let mut out = Outbox::new();
        face(&mut state, shooter, 0.0);

        let pid = shoot(&mut state, shooter, Vec2::new(2200.0, 2000.0), 0).unwrap();
        advance_projectiles(&mut state, &mut out, 300);

        assert!(state.projectiles.is_empty());
        let damage = state.config.combat.bullet_damage;
        assert_eq!(state.players[&target].health, 100.0 - damage);
        assert!(out
            .reliable()
            .iter()
            .any(|(_, m)| *m == ServerMessage::ProjectileRemoved { id: pid }));
        assert_eq!(state.ledger.contributions(target)[0].attacker, shooter);
    }

    #[test]
    fn test_projectile_never_hits_owner() {
        let (mut state, shooter) = create_test_state();
        let mut out = Outbox::new();
        let center = state.players[&shooter].center();
        state.projectiles.push(Projectile {
            id: 99,
            owner: shooter,
            position: center - Vec2::new(10.0, 0.0),
            velocity: Vec2::new(100.0, 0.0),
            updated_at: 0,
            expires_at: 1000,
            launched: true,
        });
        advance_projectiles(&mut state, &mut out, 200);
        assert_eq!(state.players[&shooter].health, 100.0);
        assert_eq!(state.projectiles.len(), 1);
    }

    #[test]
    fn test_stalled_step_still_hits() {
        let (mut state, shooter) = create_test_state();
        let target = add_player_at(&mut state, "target", Vec2::new(1000.0, 1000.0));
        face(&mut state, target, 0.0);
        let mut out = Outbox::new();
        state.projectiles.push(Projectile {
            id: 77,
            owner: shooter,
            position: Vec2::new(1000.0, 915.0),
            velocity: Vec2::new(0.0, 900.0),
            updated_at: 0,
            expires_at: 2000,
            launched: true,
        });

        // One late step covers 270 units, well past the far side of the body
        advance_projectiles(&mut state, &mut out, 300);
        assert!(state.players[&target].health < 100.0);
        assert!(state.projectiles.is_empty());
    }

    #[test]
    fn test_first_step_checks_muzzle_point() {
        let (mut state, shooter) = create_test_state();
        let target = add_player_at(&mut state, "target", Vec2::new(1000.0, 1000.0));
        let center = state.players[&target].center();
        let radius = state.masks.config().sample_radius;

        // Walk down from the centre to the last solid point of the body
        let player = &state.players[&target];
        let (pose, mask) = (state.pose_for(player), state.mask_for(player));
        let mut from = center;
        while mask.contains_point(&pose, from + Vec2::new(0.0, 1.0), radius) {
            from.y += 1.0;
        }
        let to = from + Vec2::new(0.0, 400.0);
        assert_eq!(sweep(&state, shooter, from, to, true), Some(Hit::Player(target)));
        // Without the start sample the first point is already clear of the body
        assert_eq!(sweep(&state, shooter, from, to, false), None);
    }

    #[test]
    fn test_deflect_absorbs_hit() {
        let (mut state, shooter) = create_test_state();
        let target = add_player_at(&mut state, "target", Vec2::new(2200.0, 2000.0));
        let mut out = Outbox::new();
        face(&mut state, shooter, 0.0);
        abilities::activate(&mut state, &mut out, target, 1, 0);

        shoot(&mut state, shooter, Vec2::new(2200.0, 2000.0), 0).unwrap();
        advance_projectiles(&mut state, &mut out, 300);

        let victim = &state.players[&target];
        assert_eq!(victim.health, 100.0);
        assert!(!victim.abilities.is_active(AbilityKind::Deflect, 300));
        assert!(state.projectiles.is_empty());
        assert!(out.reliable().iter().any(|(_, m)| matches!(
            m,
            ServerMessage::AbilityDeactivated {
                reason: crate::net::protocol::DeactivationReason::ConsumedByHit,
                ..
            }
        )));
    }

    #[test]
    fn test_projectile_hitting_food_feeds_shooter() {
        let (mut state, shooter) = create_test_state();
        let food_id = state.spawn_food_at(Vec2::new(2150.0, 2000.0), None);
        let mut out = Outbox::new();
        face(&mut state, shooter, 0.0);

        shoot(&mut state, shooter, Vec2::new(2150.0, 2000.0), 0).unwrap();
        // Short steps: food is small and its heading is random
        for now in (10..=300).step_by(10) {
            advance_projectiles(&mut state, &mut out, now);
        }

        assert!(!state.food.contains_key(&food_id));
        assert_eq!(state.food.len(), 1);
        assert_eq!(state.players[&shooter].score, state.config.feeding.food_score);
    }

    #[test]
    fn test_solo_kill_awards_half_score() {
        let (mut state, killer) = create_test_state();
        let victim = add_player_at(&mut state, "victim", Vec2::new(500.0, 500.0));
        state.players.get_mut(&victim).unwrap().score = 15;
        let mut out = Outbox::new();

        for _ in 0..4 {
            apply_damage(&mut state, &mut out, victim, Some(killer), 25.0, 1000);
        }

        assert!(!state.players[&victim].alive);
        assert_eq!(state.players[&killer].score, 7);
        assert_eq!(state.players[&killer].kills, 1);
        let feeds = kill_feeds(&out);
        assert_eq!(feeds.len(), 1);
        assert_eq!(feeds[0].killer, Some(killer));
        assert_eq!(feeds[0].killer_gain, 7);
    }

    #[test]
    fn test_tied_double_kill_shares_quarter() {
        let (mut state, a) = create_test_state();
        let b = add_player_at(&mut state, "b", Vec2::new(800.0, 800.0));
        let victim = add_player_at(&mut state, "victim", Vec2::new(500.0, 500.0));
        state.players.get_mut(&victim).unwrap().score = 10;
        let mut out = Outbox::new();

        apply_damage(&mut state, &mut out, victim, Some(a), 50.0, 1000);
        apply_damage(&mut state, &mut out, victim, Some(b), 50.0, 1100);

        assert_eq!(state.players[&a].score, 2);
        assert_eq!(state.players[&b].score, 2);
        assert!(kill_feeds(&out)[0].shared);
    }

    #[test]
    fn test_disconnected_contributor_is_skipped() {
        let (mut state, a) = create_test_state();
        let b = add_player_at(&mut state, "b", Vec2::new(800.0, 800.0));
        let victim = add_player_at(&mut state, "victim", Vec2::new(500.0, 500.0));
        state.players.get_mut(&victim).unwrap().score = 20;
        let mut out = Outbox::new();

        apply_damage(&mut state, &mut out, victim, Some(b), 60.0, 1000);
        state.players.remove(&b);
        apply_damage(&mut state, &mut out, victim, Some(a), 40.0, 1100);

        assert_eq!(state.players[&a].score, 10);
        assert!(state.ledger.contributions(victim).is_empty());
    }

    #[test]
    fn test_dead_removed_after_grace() {
        let (mut state, killer) = create_test_state();
        let victim = add_player_at(&mut state, "victim", Vec2::new(500.0, 500.0));
        let mut out = Outbox::new();
        apply_damage(&mut state, &mut out, victim, Some(killer), 200.0, 1000);
        let grace = state.config.combat.death_grace_ms;

        assert_eq!(remove_expired_dead(&mut state, &mut out, 1000 + grace - 1), 0);
        assert!(state.players.contains_key(&victim));
        assert_eq!(remove_expired_dead(&mut state, &mut out, 1000 + grace), 1);
        assert!(!state.players.contains_key(&victim));
        assert!(out.reliable().iter().any(|(_, m)| *m
            == ServerMessage::EntityLeft {
                id: victim,
                reason: LeaveReason::Died
            }));
    }

    #[test]
    fn test_damage_to_dead_is_ignored() {
        let mut state = create_empty_state();
        let victim = add_player_at(&mut state, "v", Vec2::new(500.0, 500.0));
        let mut out = Outbox::new();
        assert!(apply_damage(&mut state, &mut out, victim, None, 500.0, 0));
        assert!(!apply_damage(&mut state, &mut out, victim, None, 5.0, 10));
        assert_eq!(kill_feeds(&out).len(), 1);
        assert_eq!(state.players[&victim].deaths, 1);
    }
}

//! Food movement: wander, flee from nearby players, drift back to the school
//!
//! Force computation is a pure function over a snapshot of predator
//! positions, so the per-food update runs in parallel.

use rand::Rng;
use rayon::iter::ParallelIterator;

use crate::config::SteeringConfig;
use crate::game::state::{Food, GameState};
use crate::util::vec2::Vec2;

/// Steering components acting on one food item
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringForces {
    pub flee: Vec2,
    pub cohesion: Vec2,
    pub fleeing: bool,
}

/// A live player as seen by food: centre and hit radius
#[derive(Debug, Clone, Copy)]
pub struct Predator {
    pub center: Vec2,
    pub radius: f32,
}

/// Flee and cohesion accelerations for `food`.
///
/// Flee grows as the nearest predator gets closer. Cohesion always pulls
/// toward the school anchor; while fleeing it is scaled down, never to zero.
pub fn steering_forces(
    position: Vec2,
    anchor: Option<Vec2>,
    predators: &[Predator],
    config: &SteeringConfig,
) -> SteeringForces {
    let nearest = predators
        .iter()
        .map(|p| (p, (position.distance_to(p.center) - p.radius).max(0.0)))
        .filter(|(_, gap)| *gap <= config.flee_radius)
        .min_by(|a, b| a.1.total_cmp(&b.1));

    let (flee, fleeing) = match nearest {
        Some((predator, gap)) => {
            let away = position - predator.center;
            let dir = if away.length_sq() > 1e-6 {
                away.normalize()
            } else {
                Vec2::new(1.0, 0.0)
            };
            let proximity = 1.0 - gap / config.flee_radius.max(1e-3);
            // A predator right at the edge of the radius still produces a nudge
            (dir * (config.flee_accel * proximity.max(0.1)), true)
        }
        None => (Vec2::ZERO, false),
    };

    let cohesion = match anchor {
        Some(anchor) => {
            let toward = anchor - position;
            if toward.length_sq() > 1e-6 {
                let factor = if fleeing {
                    config.cohesion_flee_factor.max(0.01)
                } else {
                    1.0
                };
                toward.normalize() * (config.cohesion_accel * factor)
            } else {
                Vec2::ZERO
            }
        }
        None => Vec2::ZERO,
    };

    SteeringForces {
        flee,
        cohesion,
        fleeing,
    }
}

/// Give every unassigned food item the least-populated school
pub fn assign_schools(state: &mut GameState) -> usize {
    if state.schools.is_empty() {
        return 0;
    }
    let mut population = vec![0usize; state.schools.len()];
    for food in state.food.values() {
        if let Some(school) = food.school {
            if let Some(count) = population.get_mut(school) {
                *count += 1;
            }
        }
    }

    let mut assigned = 0;
    for food in state.food.values_mut().filter(|f| f.school.is_none()) {
        let (school, _) = population
            .iter()
            .enumerate()
            .min_by_key(|(_, count)| **count)
            .unwrap_or((0, &0));
        food.school = Some(school);
        population[school] += 1;
        assigned += 1;
    }
    assigned
}

fn step_food(
    food: &mut Food,
    anchor: Option<Vec2>,
    predators: &[Predator],
    config: &SteeringConfig,
    bounds: (f32, f32),
    dt: f32,
) {
    let (half, map) = bounds;
    let mut rng = rand::thread_rng();
    food.heading += rng.gen_range(-1.0f32..=1.0) * config.wander_jitter * dt;
    let wander = Vec2::from_angle(food.heading) * config.wander_accel;

    let forces = steering_forces(food.position, anchor, predators, config);
    let accel = wander + forces.flee + forces.cohesion;
    let cap = if forces.fleeing {
        config.flee_speed_cap
    } else {
        config.wander_speed_cap
    };
    food.velocity = (food.velocity + accel * dt).clamp_length(cap);
    food.position += food.velocity * dt;

    // Elastic bounce off the map edges
    if food.position.x < half {
        food.position.x = half;
        food.velocity.x = food.velocity.x.abs();
    } else if food.position.x > map - half {
        food.position.x = map - half;
        food.velocity.x = -food.velocity.x.abs();
    }
    if food.position.y < half {
        food.position.y = half;
        food.velocity.y = food.velocity.y.abs();
    } else if food.position.y > map - half {
        food.position.y = map - half;
        food.velocity.y = -food.velocity.y.abs();
    }
}

/// Advance all food by `dt` seconds (tick step)
pub fn update(state: &mut GameState, dt: f32) {
    assign_schools(state);

    let ratio = state.hitbox_ratio();
    let predators: Vec<Predator> = state
        .alive_players()
        .map(|p| Predator {
            center: p.center(),
            radius: p.hit_radius(ratio),
        })
        .collect();
    let anchors: Vec<Vec2> = state.schools.iter().map(|s| s.anchor).collect();
    let config = state.config.steering;
    let map = state.map_size();
    let half = state.config.world.food_footprint * 0.5;

    state.food.par_values_mut().for_each(|food| {
        let anchor = food.school.and_then(|s| anchors.get(s).copied());
        step_food(food, anchor, &predators, &config, (half, map), dt);
    });
}

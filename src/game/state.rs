//! Game state definitions and structures
//!
//! Contains all entities (players, food, projectiles) and the world registry.

use hashbrown::HashMap;
use rand::Rng;
use tracing::warn;
use uuid::Uuid;

use crate::config::{GameConfig, VariantSpec};
use crate::game::abilities::AbilitySet;
use crate::game::constants::{combat, mask as mask_consts, world};
use crate::game::ledger::DamageLedger;
use crate::game::mask::{MaskLibrary, OccupancyMask, Pose};
use crate::util::clock::Millis;
use crate::util::vec2::Vec2;

/// Unique player identifier, stable across respawns
pub type PlayerId = Uuid;

/// Entity identifier for non-player entities
pub type EntityId = u64;

pub type SchoolId = usize;

/// Player state
#[derive(Debug, Clone)]
pub struct Player {
    /// Top-left corner of the footprint box
    pub position: Vec2,
    /// Facing angle (radians)
    pub angle: f32,
    pub health: f32,
    pub alive: bool,
    /// Edge of the square footprint, `base_footprint * variant scale`
    pub footprint: f32,
    pub abilities: AbilitySet,
    pub collision_immune_until: Millis,
    pub last_move_at: Millis,
    pub last_shot_at: Option<Millis>,
    pub died_at: Option<Millis>,

    pub score: u32,
    pub level: u32,
    /// Index into the configured variant list
    pub variant: usize,
    pub kills: u32,
    pub deaths: u32,

    pub id: PlayerId,
    pub name: String,
}

impl Player {
    pub fn new(id: PlayerId, name: String, position: Vec2, footprint: f32, now: Millis) -> Self {
        Self {
            position,
            angle: 0.0,
            health: combat::MAX_HEALTH,
            alive: true,
            footprint,
            abilities: AbilitySet::default(),
            collision_immune_until: 0,
            last_move_at: now,
            last_shot_at: None,
            died_at: None,
            score: 0,
            level: 1,
            variant: 0,
            kills: 0,
            deaths: 0,
            id,
            name,
        }
    }

    pub fn center(&self) -> Vec2 {
        let half = self.footprint * 0.5;
        self.position + Vec2::new(half, half)
    }

    pub fn set_center(&mut self, center: Vec2) {
        let half = self.footprint * 0.5;
        self.position = center - Vec2::new(half, half);
    }

    /// Circle used for broadphase and separation
    pub fn hit_radius(&self, hitbox_ratio: f32) -> f32 {
        self.footprint * 0.5 * hitbox_ratio
    }

    pub fn is_collision_immune(&self, now: Millis) -> bool {
        now < self.collision_immune_until
    }

    /// Subtract `amount` from health; true if this hit was lethal
    pub fn take_damage(&mut self, amount: f32) -> bool {
        if !self.alive {
            return false;
        }
        self.health = (self.health - amount).clamp(0.0, combat::MAX_HEALTH);
        self.health <= 0.0
    }
}

/// Ambient resource. Position is the centre of its footprint.
#[derive(Debug, Clone)]
pub struct Food {
    pub id: EntityId,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Wander heading (radians)
    pub heading: f32,
    /// Assigned lazily by the steering pass
    pub school: Option<SchoolId>,
}

impl Food {
    pub fn new(id: EntityId, position: Vec2, school: Option<SchoolId>) -> Self {
        Self {
            id,
            position,
            velocity: Vec2::ZERO,
            heading: rand::thread_rng().gen_range(-std::f32::consts::PI..std::f32::consts::PI),
            school,
        }
    }
}

/// Group anchor that food drifts around
#[derive(Debug, Clone)]
pub struct School {
    pub id: SchoolId,
    pub anchor: Vec2,
    pub radius: f32,
}

#[derive(Debug, Clone)]
pub struct Projectile {
    pub id: EntityId,
    pub owner: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
    /// Time `position` was last advanced to
    pub updated_at: Millis,
    pub expires_at: Millis,
    /// Set after the first advance; until then the muzzle point is swept too
    pub launched: bool,
}

/// Complete world state owned by the tick scheduler
pub struct GameState {
    pub config: GameConfig,
    pub masks: MaskLibrary,
    pub players: HashMap<PlayerId, Player>,
    pub food: HashMap<EntityId, Food>,
    pub schools: Vec<School>,
    pub projectiles: Vec<Projectile>,
    pub ledger: DamageLedger,
    pub tick: u64,
    next_entity_id: EntityId,
}

impl GameState {
    /// New world with schools placed and the food population seeded
    pub fn new(config: GameConfig, masks: MaskLibrary) -> Self {
        let mut state = Self {
            config,
            masks,
            players: HashMap::new(),
            food: HashMap::new(),
            schools: Vec::new(),
            projectiles: Vec::new(),
            ledger: DamageLedger::new(),
            tick: 0,
            next_entity_id: 1,
        };
        state.place_schools();
        state.seed_food();
        state
    }

    pub fn next_entity_id(&mut self) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        id
    }

    pub fn map_size(&self) -> f32 {
        self.config.world.map_size
    }

    /// Keep a footprint box fully inside the map
    pub fn clamp_top_left(&self, position: Vec2, footprint: f32) -> Vec2 {
        let max = (self.map_size() - footprint).max(0.0);
        position.clamp(Vec2::ZERO, Vec2::new(max, max))
    }

    pub fn variant_spec(&self, index: usize) -> &VariantSpec {
        let variants = &self.config.progression.variants;
        &variants[index.min(variants.len().saturating_sub(1))]
    }

    pub fn footprint_for(&self, variant: usize) -> f32 {
        self.config.world.base_footprint * self.variant_spec(variant).scale
    }

    pub fn hitbox_ratio(&self) -> f32 {
        self.config.world.hitbox_ratio
    }

    pub fn mask_for(&self, player: &Player) -> &OccupancyMask {
        self.masks.get(&self.variant_spec(player.variant).key)
    }

    pub fn pose_for(&self, player: &Player) -> Pose {
        Pose::new(
            player.center(),
            player.angle,
            player.footprint,
            self.mask_for(player).resolution(),
        )
    }

    pub fn food_mask(&self) -> &OccupancyMask {
        self.masks.get(mask_consts::FOOD_KEY)
    }

    pub fn food_pose(&self, food: &Food) -> Pose {
        let heading = if food.velocity.length_sq() > 1e-6 {
            food.velocity.angle()
        } else {
            food.heading
        };
        Pose::new(
            food.position,
            heading,
            self.config.world.food_footprint,
            self.food_mask().resolution(),
        )
    }

    pub fn alive_players(&self) -> impl Iterator<Item = &Player> {
        self.players.values().filter(|p| p.alive)
    }

    pub fn alive_count(&self) -> usize {
        self.alive_players().count()
    }

    /// Pick a top-left position away from other live players.
    ///
    /// After `SPAWN_ATTEMPTS` misses the last candidate is used anyway.
    pub fn random_spawn_position(&self, footprint: f32) -> Vec2 {
        let mut rng = rand::thread_rng();
        let max = (self.map_size() - footprint).max(0.0);
        let clearance = self.config.world.spawn_clearance;
        let mut candidate = Vec2::ZERO;
        for _ in 0..world::SPAWN_ATTEMPTS {
            candidate = Vec2::new(rng.gen_range(0.0..=max), rng.gen_range(0.0..=max));
            let center = candidate + Vec2::new(footprint * 0.5, footprint * 0.5);
            let crowded = self
                .alive_players()
                .any(|p| p.center().distance_to(center) < clearance + p.footprint * 0.5);
            if !crowded {
                return candidate;
            }
        }
        candidate
    }

    /// Create (or recreate) a level-1 player at a safe position
    pub fn spawn_player(&mut self, id: PlayerId, name: String, now: Millis) -> &Player {
        let footprint = self.footprint_for(0);
        let position = self.random_spawn_position(footprint);
        self.players
            .entry(id)
            .insert(Player::new(id, name, position, footprint, now))
            .into_mut()
    }

    /// Remove a player and everything that references it
    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let removed = self.players.remove(&id);
        self.projectiles.retain(|p| p.owner != id);
        self.ledger.forget(id);
        removed
    }

    pub fn spawn_food_at(&mut self, position: Vec2, school: Option<SchoolId>) -> EntityId {
        let id = self.next_entity_id();
        self.food.insert(id, Food::new(id, position, school));
        id
    }

    /// Respawn a food item anywhere on the map, unassigned to a school
    pub fn spawn_food_random(&mut self) -> EntityId {
        let half = self.config.world.food_footprint * 0.5;
        let max = self.map_size() - half;
        let mut rng = rand::thread_rng();
        let position = Vec2::new(rng.gen_range(half..=max), rng.gen_range(half..=max));
        self.spawn_food_at(position, None)
    }

    fn place_schools(&mut self) {
        let cfg = self.config.steering;
        let margin = (cfg.school_radius + self.config.world.food_footprint).min(self.map_size() * 0.5);
        let max = self.map_size() - margin;
        let mut rng = rand::thread_rng();
        self.schools = (0..cfg.school_count)
            .map(|id| School {
                id,
                anchor: Vec2::new(rng.gen_range(margin..=max), rng.gen_range(margin..=max)),
                radius: cfg.school_radius,
            })
            .collect();
    }

    fn seed_food(&mut self) {
        let count = self.config.steering.food_count;
        let half = self.config.world.food_footprint * 0.5;
        let limit = self.map_size() - half;
        let mut rng = rand::thread_rng();
        for i in 0..count {
            if self.schools.is_empty() {
                self.spawn_food_random();
                continue;
            }
            let school = &self.schools[i % self.schools.len()];
            let offset = Vec2::from_angle(rng.gen_range(-std::f32::consts::PI..std::f32::consts::PI))
                * rng.gen_range(0.0..school.radius);
            let position = (school.anchor + offset).clamp(Vec2::new(half, half), Vec2::new(limit, limit));
            let school_id = school.id;
            self.spawn_food_at(position, Some(school_id));
        }
    }

    /// Repair values that would poison the simulation.
    ///
    /// Returns the number of fields that had to be fixed.
    pub fn sanitize(&mut self) -> usize {
        let map = self.map_size();
        let food_half = self.config.world.food_footprint * 0.5;
        let mut fixed = 0;

        for player in self.players.values_mut() {
            if !player.position.is_finite() {
                warn!("Player {} had non-finite position, recentring", player.id);
                player.set_center(Vec2::new(map * 0.5, map * 0.5));
                fixed += 1;
            }
            if !player.angle.is_finite() {
                player.angle = 0.0;
                fixed += 1;
            }
            if !player.health.is_finite() {
                player.health = if player.alive { combat::MAX_HEALTH } else { 0.0 };
                fixed += 1;
            } else if !(0.0..=combat::MAX_HEALTH).contains(&player.health) {
                player.health = player.health.clamp(0.0, combat::MAX_HEALTH);
                fixed += 1;
            }
            let max = (map - player.footprint).max(0.0);
            let clamped = player.position.clamp(Vec2::ZERO, Vec2::new(max, max));
            if clamped != player.position {
                player.position = clamped;
                fixed += 1;
            }
        }

        for food in self.food.values_mut() {
            if !food.position.is_finite() || !food.velocity.is_finite() {
                food.position = Vec2::new(map * 0.5, map * 0.5);
                food.velocity = Vec2::ZERO;
                fixed += 1;
            }
            food.position = food
                .position
                .clamp(Vec2::new(food_half, food_half), Vec2::new(map - food_half, map - food_half));
        }

        let before = self.projectiles.len();
        self.projectiles
            .retain(|p| p.position.is_finite() && p.velocity.is_finite());
        fixed += before - self.projectiles.len();

        if fixed > 0 {
            warn!("Sanitized {} invalid values in game state", fixed);
        }
        fixed
    }
}

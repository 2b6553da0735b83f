use serde::{Deserialize, Serialize};

use crate::game::abilities::{AbilityKind, AbilityTimer};
use crate::game::constants::combat::MAX_HEALTH;
use crate::game::state::{EntityId, Food, Player, PlayerId, Projectile};
use crate::util::clock::Millis;
use crate::util::vec2::Vec2;

/// Messages from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Request to join with an already-resolved display name
    Join { display_name: String },
    /// Proposed pose (top-left position, facing angle)
    Move { x: f32, y: f32, angle: f32 },
    /// Fire toward a world-space target
    Shoot { target_x: f32, target_y: f32 },
    /// Ask to consume a food item
    Eat { food_id: EntityId },
    /// Activate ability by wire id (0 = dash, 1 = deflect)
    ActivateAbility { ability: u8 },
    /// Come back after death
    Respawn,
    /// Privileged: jump to the next level
    DevLevelUp,
    /// Ping for latency measurement
    Ping { timestamp: u64 },
    /// Request to leave the game
    Leave,
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    JoinAccepted { player_id: PlayerId },
    JoinRejected { reason: String },
    /// One-time tables sent right after joining
    Init(InitTables),
    /// Full world state sent on join
    Snapshot(WorldSnapshot),
    /// Best-effort, every tick
    EntityStates(Vec<EntityState>),
    /// Best-effort, reduced cadence
    FoodPositions(Vec<FoodState>),
    /// Best-effort, every tick
    ProjectilePositions(Vec<ProjectileState>),
    /// Sent the moment a projectile hits something
    ProjectileRemoved { id: EntityId },
    EntityJoined(EntityInfo),
    EntityLeft { id: PlayerId, reason: LeaveReason },
    /// Health or score changed
    Vitals { id: PlayerId, health: f32, score: u32 },
    FoodRespawned {
        consumed: EntityId,
        eaten_by: Option<PlayerId>,
        spawned: FoodState,
    },
    LevelChanged {
        id: PlayerId,
        level: u32,
        variant: VariantInfo,
    },
    /// A variant's mask finished loading; anchors may have moved
    VariantGeometry(VariantInfo),
    AbilityActivated {
        id: PlayerId,
        ability: AbilityKind,
        active_until: Millis,
        cooldown_until: Millis,
    },
    AbilityDeactivated {
        id: PlayerId,
        ability: AbilityKind,
        reason: DeactivationReason,
        cooldown_until: Millis,
    },
    KillFeed(KillReport),
    Leaderboard(Vec<LeaderboardEntry>),
    /// Personal, time-bounded message
    Notification {
        text: String,
        kind: NotificationKind,
        ttl_ms: u64,
    },
    Pong {
        client_timestamp: u64,
        server_timestamp: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LeaveReason {
    Disconnected,
    Died,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeactivationReason {
    Expired,
    ConsumedByHit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    Kill,
    Assist,
    SharedKill,
    Death,
    LevelUp,
}

/// Per-entity state carried by the tick stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub id: PlayerId,
    pub position: Vec2,
    pub angle: f32,
    pub health: f32,
    pub score: u32,
    pub level: u32,
    pub variant: u8,
    pub dead: bool,
    pub abilities: [AbilityTimer; 2],
}

impl EntityState {
    pub fn from_player(player: &Player) -> Self {
        Self {
            id: player.id,
            position: player.position,
            angle: player.angle,
            health: player.health.clamp(0.0, MAX_HEALTH),
            score: player.score,
            level: player.level,
            variant: player.variant as u8,
            dead: !player.alive,
            abilities: [
                player.abilities.get(AbilityKind::Dash),
                player.abilities.get(AbilityKind::Deflect),
            ],
        }
    }
}

/// Entity state plus the fields that only change on join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub name: String,
    pub state: EntityState,
}

impl EntityInfo {
    pub fn from_player(player: &Player) -> Self {
        Self {
            name: player.name.clone(),
            state: EntityState::from_player(player),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoodState {
    pub id: EntityId,
    pub position: Vec2,
    pub velocity: Vec2,
}

impl FoodState {
    pub fn from_food(food: &Food) -> Self {
        Self {
            id: food.id,
            position: food.position,
            velocity: food.velocity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectileState {
    pub id: EntityId,
    pub owner: PlayerId,
    pub position: Vec2,
    pub velocity: Vec2,
}

impl ProjectileState {
    pub fn from_projectile(projectile: &Projectile) -> Self {
        Self {
            id: projectile.id,
            owner: projectile.owner,
            position: projectile.position,
            velocity: projectile.velocity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub server_time: Millis,
    pub entities: Vec<EntityInfo>,
    pub food: Vec<FoodState>,
    pub projectiles: Vec<ProjectileState>,
}

/// Geometry of one visual variant, anchors in unrotated world units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantInfo {
    pub index: u8,
    pub key: String,
    pub scale: f32,
    pub footprint: f32,
    pub front_anchor: Vec2,
    pub rear_anchor: Vec2,
}

/// Raw occupancy grid for debug overlays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskGrid {
    pub key: String,
    pub resolution: u32,
    pub bits: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitTables {
    pub map_size: f32,
    pub tick_rate: u32,
    pub level_steps: Vec<u32>,
    pub levels_per_variant: u32,
    pub variants: Vec<VariantInfo>,
    /// Empty unless the server was built with `debug_masks`
    pub grids: Vec<MaskGrid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillReport {
    pub victim: PlayerId,
    pub victim_name: String,
    pub killer: Option<PlayerId>,
    pub killer_name: Option<String>,
    pub assister: Option<PlayerId>,
    pub assister_name: Option<String>,
    pub killer_gain: u32,
    pub assister_gain: u32,
    pub shared: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub id: PlayerId,
    pub name: String,
    pub score: u32,
    pub level: u32,
}

/// Encode a message using bincode
/// Uses legacy config for fixed-size integers (compatible with TypeScript client)
pub fn encode<T: Serialize>(message: &T) -> Result<Vec<u8>, EncodeError> {
    bincode::serde::encode_to_vec(message, bincode::config::legacy())
        .map_err(|e| EncodeError(e.to_string()))
}

/// Decode a message using bincode
/// Uses legacy config for fixed-size integers (compatible with TypeScript client)
pub fn decode<T: for<'de> Deserialize<'de>>(data: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(msg, _)| msg)
        .map_err(|e| DecodeError(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
#[error("Encode error: {0}")]
pub struct EncodeError(String);

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);

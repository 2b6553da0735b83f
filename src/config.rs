use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::game::constants::{
    abilities, collision, combat, feeding, mask, movement, progression, steering, world,
};

/// Configuration loading and validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub bind_address: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Maximum concurrently joined players
    pub max_players: usize,
    /// Directory holding `<variant>.png` sprite masks
    pub asset_dir: PathBuf,
    /// Port for the Prometheus endpoint
    pub metrics_port: u16,
    /// Path to TLS certificate file
    pub tls_cert_path: Option<String>,
    /// Path to TLS key file
    pub tls_key_path: Option<String>,
    /// Optional JSON file overriding `GameConfig` defaults
    pub game_config_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 4433,
            max_players: 64,
            asset_dir: PathBuf::from("assets/masks"),
            metrics_port: 9090,
            tls_cert_path: None,
            tls_key_path: None,
            game_config_path: None,
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            if let Ok(parsed) = addr.parse() {
                config.bind_address = parsed;
            } else {
                tracing::warn!("Invalid BIND_ADDRESS '{}', using default", addr);
            }
        }

        if let Some(port) = parse_env::<u16>("PORT") {
            if port > 0 {
                config.port = port;
            } else {
                tracing::warn!("PORT must be > 0, using default");
            }
        }

        if let Some(max_players) = parse_env::<usize>("MAX_PLAYERS") {
            if (1..=1000).contains(&max_players) {
                config.max_players = max_players;
            } else {
                tracing::warn!("MAX_PLAYERS must be 1-1000, using default");
            }
        }

        if let Some(port) = parse_env::<u16>("METRICS_PORT") {
            config.metrics_port = port;
        }

        if let Ok(dir) = std::env::var("ASSET_DIR") {
            config.asset_dir = PathBuf::from(dir);
        }

        if let Ok(cert_path) = std::env::var("TLS_CERT_PATH") {
            config.tls_cert_path = Some(cert_path);
        }

        if let Ok(key_path) = std::env::var("TLS_KEY_PATH") {
            config.tls_key_path = Some(key_path);
        }

        if let Ok(path) = std::env::var("GAME_CONFIG") {
            config.game_config_path = Some(PathBuf::from(path));
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid("port cannot be 0".into()));
        }
        if self.max_players == 0 {
            return Err(ConfigError::Invalid("max_players must be at least 1".into()));
        }
        if self.metrics_port == self.port {
            return Err(ConfigError::Invalid(
                "metrics_port must differ from the game port".into(),
            ));
        }
        if self.tls_cert_path.is_some() != self.tls_key_path.is_some() {
            return Err(ConfigError::Invalid(
                "TLS_CERT_PATH and TLS_KEY_PATH must be set together".into(),
            ));
        }
        Ok(())
    }

    /// Game tunables: defaults, or the JSON override file when configured
    pub fn game_config(&self) -> Result<GameConfig, ConfigError> {
        match &self.game_config_path {
            Some(path) => GameConfig::from_file(path),
            None => Ok(GameConfig::default()),
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid {} '{}', using default", key, raw);
            None
        }
    }
}

/// Simulation tunables. Every field falls back to `game::constants`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub world: WorldConfig,
    pub mask: MaskConfig,
    pub movement: MovementConfig,
    pub collision: CollisionConfig,
    pub combat: CombatConfig,
    pub steering: SteeringConfig,
    pub feeding: FeedingConfig,
    pub abilities: AbilityConfig,
    pub progression: ProgressionConfig,
}

impl GameConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: GameConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        tracing::info!("Loaded game config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.world.map_size <= self.world.base_footprint * 4.0 {
            return Err(ConfigError::Invalid("map_size too small for entities".into()));
        }
        let w = &self.world;
        if w.food_footprint <= 0.0 || w.base_footprint <= 0.0 || w.map_size <= w.food_footprint * 2.0 {
            return Err(ConfigError::Invalid("footprints must be positive and fit the map".into()));
        }
        let s = &self.steering;
        if !s.school_radius.is_finite() || s.school_radius <= 0.0 {
            return Err(ConfigError::Invalid("steering.school_radius must be positive".into()));
        }
        if s.school_count == 0 && s.food_count > 0 {
            return Err(ConfigError::Invalid("food needs at least one school".into()));
        }
        if self.mask.resolution < 8 {
            return Err(ConfigError::Invalid("mask resolution must be at least 8".into()));
        }
        let c = &self.combat;
        if c.solo_share > 1.0 || c.majority_share + c.assist_share > 1.0 || c.shared_share > 0.5 {
            return Err(ConfigError::Invalid("kill shares would inflate score".into()));
        }
        let p = &self.progression;
        if p.variants.is_empty() {
            return Err(ConfigError::Invalid("at least one variant is required".into()));
        }
        if p.variants.iter().any(|v| v.scale <= 0.0 || v.key.is_empty()) {
            return Err(ConfigError::Invalid("variant keys must be named with positive scale".into()));
        }
        if p.level_steps.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::Invalid("level steps must be strictly increasing".into()));
        }
        if p.levels_per_variant == 0 {
            return Err(ConfigError::Invalid("levels_per_variant must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub map_size: f32,
    pub base_footprint: f32,
    pub hitbox_ratio: f32,
    pub food_footprint: f32,
    pub spawn_clearance: f32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            map_size: world::MAP_SIZE,
            base_footprint: world::BASE_FOOTPRINT,
            hitbox_ratio: world::HITBOX_RATIO,
            food_footprint: world::FOOD_FOOTPRINT,
            spawn_clearance: world::SPAWN_CLEARANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    pub resolution: usize,
    pub alpha_threshold: u8,
    pub sample_radius: i32,
    pub outline_stride: usize,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            resolution: mask::RESOLUTION,
            alpha_threshold: mask::ALPHA_THRESHOLD,
            sample_radius: mask::SAMPLE_RADIUS,
            outline_stride: mask::OUTLINE_STRIDE,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementConfig {
    pub base_speed: f32,
    pub speed_tolerance: f32,
    pub max_elapsed_ms: u64,
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            base_speed: movement::BASE_SPEED,
            speed_tolerance: movement::SPEED_TOLERANCE,
            max_elapsed_ms: movement::MAX_ELAPSED_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    pub knockback: f32,
    pub damage: f32,
    pub immunity_ms: u64,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            knockback: collision::KNOCKBACK,
            damage: collision::DAMAGE,
            immunity_ms: collision::IMMUNITY_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CombatConfig {
    pub fire_cooldown_ms: u64,
    pub latency_shave_ms: u64,
    pub projectile_speed: f32,
    pub projectile_ttl_ms: u64,
    pub sweep_samples: usize,
    pub bullet_damage: f32,
    pub firing_arc: f32,
    pub assist_window_ms: u64,
    pub assist_damage_threshold: f32,
    pub shared_kill_delta: f32,
    pub solo_share: f32,
    pub majority_share: f32,
    pub assist_share: f32,
    pub shared_share: f32,
    pub death_grace_ms: u64,
}

impl Default for CombatConfig {
    fn default() -> Self {
        Self {
            fire_cooldown_ms: combat::FIRE_COOLDOWN_MS,
            latency_shave_ms: combat::LATENCY_SHAVE_MS,
            projectile_speed: combat::PROJECTILE_SPEED,
            projectile_ttl_ms: combat::PROJECTILE_TTL_MS,
            sweep_samples: combat::SWEEP_SAMPLES,
            bullet_damage: combat::BULLET_DAMAGE,
            firing_arc: combat::FIRING_ARC,
            assist_window_ms: combat::ASSIST_WINDOW_MS,
            assist_damage_threshold: combat::ASSIST_DAMAGE_THRESHOLD,
            shared_kill_delta: combat::SHARED_KILL_DELTA,
            solo_share: combat::SOLO_SHARE,
            majority_share: combat::MAJORITY_SHARE,
            assist_share: combat::ASSIST_SHARE,
            shared_share: combat::SHARED_SHARE,
            death_grace_ms: combat::DEATH_GRACE_MS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    pub food_count: usize,
    pub school_count: usize,
    pub school_radius: f32,
    pub flee_radius: f32,
    pub flee_accel: f32,
    pub cohesion_accel: f32,
    pub cohesion_flee_factor: f32,
    pub wander_jitter: f32,
    pub wander_accel: f32,
    pub wander_speed_cap: f32,
    pub flee_speed_cap: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            food_count: steering::FOOD_COUNT,
            school_count: steering::SCHOOL_COUNT,
            school_radius: steering::SCHOOL_RADIUS,
            flee_radius: steering::FLEE_RADIUS,
            flee_accel: steering::FLEE_ACCEL,
            cohesion_accel: steering::COHESION_ACCEL,
            cohesion_flee_factor: steering::COHESION_FLEE_FACTOR,
            wander_jitter: steering::WANDER_JITTER,
            wander_accel: steering::WANDER_ACCEL,
            wander_speed_cap: steering::WANDER_SPEED_CAP,
            flee_speed_cap: steering::FLEE_SPEED_CAP,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedingConfig {
    pub food_score: u32,
    pub eat_tolerance: f32,
}

impl Default for FeedingConfig {
    fn default() -> Self {
        Self {
            food_score: feeding::FOOD_SCORE,
            eat_tolerance: feeding::EAT_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityConfig {
    pub dash_active_ms: u64,
    pub dash_cooldown_ms: u64,
    pub dash_multiplier: f32,
    pub deflect_active_ms: u64,
    pub deflect_cooldown_ms: u64,
}

impl Default for AbilityConfig {
    fn default() -> Self {
        Self {
            dash_active_ms: abilities::DASH_ACTIVE_MS,
            dash_cooldown_ms: abilities::DASH_COOLDOWN_MS,
            dash_multiplier: abilities::DASH_MULTIPLIER,
            deflect_active_ms: abilities::DEFLECT_ACTIVE_MS,
            deflect_cooldown_ms: abilities::DEFLECT_COOLDOWN_MS,
        }
    }
}

/// One visual variant: mask key plus footprint scale
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    pub key: String,
    pub scale: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressionConfig {
    pub level_steps: Vec<u32>,
    pub levels_per_variant: u32,
    pub variants: Vec<VariantSpec>,
}

impl Default for ProgressionConfig {
    fn default() -> Self {
        Self {
            level_steps: progression::LEVEL_STEPS.to_vec(),
            levels_per_variant: progression::LEVELS_PER_VARIANT,
            variants: progression::VARIANTS
                .iter()
                .map(|(key, scale)| VariantSpec {
                    key: (*key).to_string(),
                    scale: *scale,
                })
                .collect(),
        }
    }
}

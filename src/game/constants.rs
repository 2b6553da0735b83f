//! Default tunables grouped by subsystem.
//!
//! These seed `GameConfig`; runtime code reads the config, not these
//! constants, so a JSON override file can retune a running deployment.

/// Tick scheduling
pub mod tick {
    /// Server tick rate in Hz
    pub const TICK_RATE: u32 = 30;
    /// Tick duration in milliseconds
    pub const TICK_DURATION_MS: u64 = 1000 / TICK_RATE as u64;
    /// Resource positions go out every N ticks
    pub const FOOD_BROADCAST_EVERY: u64 = 3;
    /// Leaderboard goes out every N ticks (once per second)
    pub const LEADERBOARD_EVERY: u64 = TICK_RATE as u64;
    /// Status log interval
    pub const STATUS_LOG_SECS: u64 = 30;
}

/// World geometry
pub mod world {
    /// Square map edge length in world units
    pub const MAP_SIZE: f32 = 4000.0;
    /// Footprint edge of a scale-1.0 entity
    pub const BASE_FOOTPRINT: f32 = 64.0;
    /// Hit radius as a fraction of half the footprint
    pub const HITBOX_RATIO: f32 = 0.8;
    /// Food footprint edge
    pub const FOOD_FOOTPRINT: f32 = 24.0;
    /// Spawn attempts before accepting an unsafe position
    pub const SPAWN_ATTEMPTS: usize = 16;
    /// Minimum centre distance to other entities for a safe spawn
    pub const SPAWN_CLEARANCE: f32 = 180.0;
}

/// Occupancy mask construction
pub mod mask {
    /// Square grid resolution (cells per edge)
    pub const RESOLUTION: usize = 128;
    /// Alpha strictly above this counts as solid
    pub const ALPHA_THRESHOLD: u8 = 200;
    /// Neighbourhood radius (cells) sampled by point tests
    pub const SAMPLE_RADIUS: i32 = 1;
    /// Keep every Nth boundary cell as an outline sample point
    pub const OUTLINE_STRIDE: usize = 2;
    /// Mask key used by all food
    pub const FOOD_KEY: &str = "food";
    /// Procedural ellipse semi-axes as fractions of the resolution
    pub const FALLBACK_SEMI_MAJOR: f32 = 0.46;
    pub const FALLBACK_SEMI_MINOR: f32 = 0.28;
}

/// Movement validation
pub mod movement {
    /// Base speed in world units per second
    pub const BASE_SPEED: f32 = 300.0;
    /// Slack over the base speed absorbed as jitter
    pub const SPEED_TOLERANCE: f32 = 1.5;
    /// Elapsed time credited to a single move is capped at this
    pub const MAX_ELAPSED_MS: u64 = 1000;
}

/// Solid-body collision
pub mod collision {
    /// Distance each body is pushed away from the other
    pub const KNOCKBACK: f32 = 40.0;
    /// Damage both bodies take per contact
    pub const DAMAGE: f32 = 10.0;
    /// No further contact damage for this long after a collision
    pub const IMMUNITY_MS: u64 = 500;
}

/// Projectiles and kill attribution
pub mod combat {
    use std::f32::consts::FRAC_PI_2;

    pub const FIRE_COOLDOWN_MS: u64 = 500;
    /// Shaved off the cooldown to tolerate network jitter
    pub const LATENCY_SHAVE_MS: u64 = 50;
    pub const PROJECTILE_SPEED: f32 = 900.0;
    pub const PROJECTILE_TTL_MS: u64 = 1200;
    /// Interpolated points tested along each projectile step
    pub const SWEEP_SAMPLES: usize = 5;
    pub const BULLET_DAMAGE: f32 = 20.0;
    /// Half-angle of the firing arc around the facing direction
    pub const FIRING_ARC: f32 = FRAC_PI_2;
    /// Ledger contributions older than this do not count
    pub const ASSIST_WINDOW_MS: u64 = 10_000;
    /// Second contributor needs this much damage to earn an assist
    pub const ASSIST_DAMAGE_THRESHOLD: f32 = 35.0;
    /// Half-difference under which two contributors share the kill
    pub const SHARED_KILL_DELTA: f32 = 1.0;
    pub const SOLO_SHARE: f32 = 0.5;
    pub const MAJORITY_SHARE: f32 = 0.35;
    pub const ASSIST_SHARE: f32 = 0.15;
    pub const SHARED_SHARE: f32 = 0.25;
    /// Dead entities stay visible this long before removal
    pub const DEATH_GRACE_MS: u64 = 1500;
    pub const MAX_HEALTH: f32 = 100.0;
}

/// Resource steering and population
pub mod steering {
    pub const FOOD_COUNT: usize = 120;
    pub const SCHOOL_COUNT: usize = 6;
    pub const SCHOOL_RADIUS: f32 = 250.0;
    pub const FLEE_RADIUS: f32 = 220.0;
    pub const FLEE_ACCEL: f32 = 600.0;
    pub const COHESION_ACCEL: f32 = 60.0;
    /// Cohesion multiplier while fleeing (never zero)
    pub const COHESION_FLEE_FACTOR: f32 = 0.3;
    /// Max random heading change per second (radians)
    pub const WANDER_JITTER: f32 = 1.2;
    pub const WANDER_ACCEL: f32 = 40.0;
    pub const WANDER_SPEED_CAP: f32 = 60.0;
    pub const FLEE_SPEED_CAP: f32 = 220.0;
}

/// Eating
pub mod feeding {
    /// Score granted per food
    pub const FOOD_SCORE: u32 = 1;
    /// Extra reach beyond the sum of radii
    pub const EAT_TOLERANCE: f32 = 24.0;
}

/// Timed abilities
pub mod abilities {
    pub const DASH_ACTIVE_MS: u64 = 3000;
    pub const DASH_COOLDOWN_MS: u64 = 8000;
    pub const DASH_MULTIPLIER: f32 = 2.0;
    pub const DEFLECT_ACTIVE_MS: u64 = 5000;
    pub const DEFLECT_COOLDOWN_MS: u64 = 12_000;
}

/// Levels and visual variants
pub mod progression {
    /// Cumulative score needed to reach level N+2 (level 1 needs 0)
    pub const LEVEL_STEPS: [u32; 14] = [
        5, 12, 20, 30, 42, 56, 72, 90, 110, 135, 160, 190, 225, 260,
    ];
    /// Variant changes every N levels
    pub const LEVELS_PER_VARIANT: u32 = 3;
    /// Variant keys and their footprint scales, smallest first
    pub const VARIANTS: [(&str, f32); 5] = [
        ("minnow", 1.0),
        ("perch", 1.2),
        ("pike", 1.45),
        ("barracuda", 1.7),
        ("shark", 2.0),
    ];
}

/// Network limits
pub mod net {
    /// Maximum reliable message size
    pub const MAX_MESSAGE_SIZE: usize = 65536;
    /// Maximum datagram (unreliable) size
    pub const MAX_DATAGRAM_SIZE: usize = 1200;
    pub const MAX_NAME_LEN: usize = 16;
    pub const LEADERBOARD_SIZE: usize = 10;
    pub const NOTIFICATION_TTL_MS: u64 = 3000;
}

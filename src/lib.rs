//! Shoal Arena Server Library
//!
//! Authoritative server for a 2D arena where players grow by eating food
//! and fighting each other, played over WebTransport.
//!
//! # Features
//!
//! - `dos_ratelimit` - Per-connection message rate limiting (enabled by default)
//! - `dev_commands` - Accept the privileged level-up intent, for local testing
//! - `debug_masks` - Send raw occupancy grids to clients for debug overlays

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod metrics;

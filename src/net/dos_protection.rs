//! Connection and message flood limits applied before anything reaches the game
//!
//! Connection caps are always enforced. Per-message rate limiting is behind
//! the `dos_ratelimit` feature. Times are passed in so the guard can be
//! driven deterministically.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::game::constants::net::MAX_MESSAGE_SIZE;
use crate::util::clock::Millis;

pub type ConnectionId = u64;

#[derive(Debug, Clone)]
pub struct FloodConfig {
    pub max_connections_total: usize,
    pub max_connections_per_ip: usize,
    /// Messages allowed per connection within one window
    pub max_messages_per_window: u32,
    pub window_ms: u64,
    pub max_message_size: usize,
    /// Windows overrun before the connection is dropped and its IP banned
    pub strikes_before_ban: u32,
    pub ban_ms: u64,
}

impl Default for FloodConfig {
    fn default() -> Self {
        Self {
            max_connections_total: 500,
            max_connections_per_ip: 4,
            // Moves at 60 Hz plus shots and pings
            max_messages_per_window: 120,
            window_ms: 1_000,
            max_message_size: MAX_MESSAGE_SIZE,
            strikes_before_ban: 5,
            ban_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum FloodError {
    #[error("address banned until {0}")]
    Banned(Millis),
    #[error("server connection limit reached")]
    ServerFull,
    #[error("too many connections from this address")]
    TooManyFromAddress,
    #[error("message of {0} bytes exceeds limit")]
    MessageTooLarge(usize),
    #[error("message rate exceeded")]
    RateExceeded,
    #[error("repeated flooding, connection dropped")]
    Kicked,
}

impl FloodError {
    /// Errors after which the connection should be closed
    pub fn is_fatal(&self) -> bool {
        matches!(self, FloodError::Kicked | FloodError::MessageTooLarge(_))
    }
}

#[derive(Debug)]
struct MessageWindow {
    ip: IpAddr,
    started_at: Millis,
    count: u32,
    strikes: u32,
}

pub struct FloodGuard {
    config: FloodConfig,
    per_ip: HashMap<IpAddr, usize>,
    windows: HashMap<ConnectionId, MessageWindow>,
    bans: HashMap<IpAddr, Millis>,
}

impl FloodGuard {
    pub fn new(config: FloodConfig) -> Self {
        Self {
            config,
            per_ip: HashMap::new(),
            windows: HashMap::new(),
            bans: HashMap::new(),
        }
    }

    pub fn check_connection(&self, ip: IpAddr, now: Millis) -> Result<(), FloodError> {
        if let Some(&until) = self.bans.get(&ip) {
            if now < until {
                return Err(FloodError::Banned(until));
            }
        }
        if self.windows.len() >= self.config.max_connections_total {
            return Err(FloodError::ServerFull);
        }
        if self.connections_from(ip) >= self.config.max_connections_per_ip {
            return Err(FloodError::TooManyFromAddress);
        }
        Ok(())
    }

    /// Admit a connection and hand back its id
    pub fn register(&mut self, ip: IpAddr, now: Millis) -> Result<ConnectionId, FloodError> {
        self.check_connection(ip, now)?;

        let id = loop {
            let candidate = rand::random::<ConnectionId>();
            if !self.windows.contains_key(&candidate) {
                break candidate;
            }
        };
        *self.per_ip.entry(ip).or_insert(0) += 1;
        self.windows.insert(
            id,
            MessageWindow {
                ip,
                started_at: now,
                count: 0,
                strikes: 0,
            },
        );
        Ok(id)
    }

    pub fn unregister(&mut self, id: ConnectionId) {
        let Some(window) = self.windows.remove(&id) else {
            return;
        };
        if let Some(count) = self.per_ip.get_mut(&window.ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.per_ip.remove(&window.ip);
            }
        }
    }

    /// Account for one inbound message of `size` bytes
    pub fn check_message(&mut self, id: ConnectionId, size: usize, now: Millis) -> Result<(), FloodError> {
        if size > self.config.max_message_size {
            return Err(FloodError::MessageTooLarge(size));
        }
        if !cfg!(feature = "dos_ratelimit") {
            return Ok(());
        }
        let Some(window) = self.windows.get_mut(&id) else {
            return Ok(());
        };
        if window.strikes >= self.config.strikes_before_ban {
            return Err(FloodError::Kicked);
        }

        if now.saturating_sub(window.started_at) >= self.config.window_ms {
            window.started_at = now;
            window.count = 0;
        }
        window.count += 1;
        if window.count <= self.config.max_messages_per_window {
            return Ok(());
        }

        // One strike per overrun window, not per dropped message
        if window.count == self.config.max_messages_per_window + 1 {
            window.strikes += 1;
        }
        if window.strikes >= self.config.strikes_before_ban {
            let ip = window.ip;
            self.bans.insert(ip, now + self.config.ban_ms);
            return Err(FloodError::Kicked);
        }
        Err(FloodError::RateExceeded)
    }

    pub fn is_banned(&self, ip: IpAddr, now: Millis) -> bool {
        self.bans.get(&ip).is_some_and(|&until| now < until)
    }

    /// Drop bans that have run out; returns how many
    pub fn prune_bans(&mut self, now: Millis) -> usize {
        let before = self.bans.len();
        self.bans.retain(|_, until| now < *until);
        before - self.bans.len()
    }

    pub fn connection_count(&self) -> usize {
        self.windows.len()
    }

    pub fn connections_from(&self, ip: IpAddr) -> usize {
        self.per_ip.get(&ip).copied().unwrap_or(0)
    }
}

impl Default for FloodGuard {
    fn default() -> Self {
        Self::new(FloodConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, last))
    }

    #[test]
    fn test_register_and_unregister() {
        let mut guard = FloodGuard::default();
        let id = guard.register(ip(1), 0).unwrap();
        assert_eq!(guard.connection_count(), 1);
        assert_eq!(guard.connections_from(ip(1)), 1);

        guard.unregister(id);
        guard.unregister(id);
        assert_eq!(guard.connection_count(), 0);
        assert_eq!(guard.connections_from(ip(1)), 0);
    }

    #[test]
    fn test_per_address_cap() {
        let mut guard = FloodGuard::new(FloodConfig {
            max_connections_per_ip: 2,
            ..Default::default()
        });
        guard.register(ip(1), 0).unwrap();
        guard.register(ip(1), 0).unwrap();
        assert_eq!(guard.register(ip(1), 0), Err(FloodError::TooManyFromAddress));
        assert!(guard.register(ip(2), 0).is_ok());
    }

    #[test]
    fn test_total_cap() {
        let mut guard = FloodGuard::new(FloodConfig {
            max_connections_total: 2,
            ..Default::default()
        });
        guard.register(ip(1), 0).unwrap();
        guard.register(ip(2), 0).unwrap();
        assert_eq!(guard.register(ip(3), 0), Err(FloodError::ServerFull));
    }

    #[test]
    fn test_oversized_message_is_fatal() {
        let mut guard = FloodGuard::new(FloodConfig {
            max_message_size: 100,
            ..Default::default()
        });
        let id = guard.register(ip(1), 0).unwrap();
        assert!(guard.check_message(id, 100, 0).is_ok());
        let err = guard.check_message(id, 101, 0).unwrap_err();
        assert!(err.is_fatal());
    }

    #[cfg(feature = "dos_ratelimit")]
    #[test]
    fn test_rate_window_resets() {
        let mut guard = FloodGuard::new(FloodConfig {
            max_messages_per_window: 3,
            ..Default::default()
        });
        let id = guard.register(ip(1), 0).unwrap();
        for _ in 0..3 {
            assert!(guard.check_message(id, 10, 100).is_ok());
        }
        assert_eq!(guard.check_message(id, 10, 200), Err(FloodError::RateExceeded));
        assert!(guard.check_message(id, 10, 1_100).is_ok());
    }

    #[cfg(feature = "dos_ratelimit")]
    #[test]
    fn test_repeat_offender_is_kicked_and_banned() {
        let mut guard = FloodGuard::new(FloodConfig {
            max_messages_per_window: 1,
            strikes_before_ban: 2,
            ban_ms: 10_000,
            ..Default::default()
        });
        let id = guard.register(ip(1), 0).unwrap();

        guard.check_message(id, 1, 0).unwrap();
        assert_eq!(guard.check_message(id, 1, 0), Err(FloodError::RateExceeded));
        // Extra messages in the same window do not add strikes
        assert_eq!(guard.check_message(id, 1, 0), Err(FloodError::RateExceeded));

        guard.check_message(id, 1, 1_000).unwrap();
        assert_eq!(guard.check_message(id, 1, 1_000), Err(FloodError::Kicked));
        assert!(guard.is_banned(ip(1), 1_000));

        guard.unregister(id);
        assert_eq!(guard.register(ip(1), 2_000), Err(FloodError::Banned(11_000)));
        assert!(guard.register(ip(1), 11_000).is_ok());
        assert_eq!(guard.prune_bans(11_000), 1);
    }

    #[cfg(not(feature = "dos_ratelimit"))]
    #[test]
    fn test_rate_limit_disabled() {
        let mut guard = FloodGuard::new(FloodConfig {
            max_messages_per_window: 1,
            ..Default::default()
        });
        let id = guard.register(ip(1), 0).unwrap();
        for _ in 0..10 {
            assert!(guard.check_message(id, 1, 0).is_ok());
        }
    }
}

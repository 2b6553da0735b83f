//! Timed abilities
//!
//! Each ability stores two absolute timestamps fixed at activation; its
//! phase (idle, active, cooling down) is derived from `now`.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AbilityConfig;
use crate::game::state::{GameState, PlayerId};
use crate::net::outbox::Outbox;
use crate::net::protocol::{DeactivationReason, ServerMessage};
use crate::util::clock::Millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AbilityKind {
    /// Temporary movement-speed multiplier
    Dash,
    /// Absorbs the next projectile hit
    Deflect,
}

impl AbilityKind {
    pub const ALL: [AbilityKind; 2] = [AbilityKind::Dash, AbilityKind::Deflect];

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(AbilityKind::Dash),
            1 => Some(AbilityKind::Deflect),
            _ => None,
        }
    }

    /// (active, cooldown) durations in milliseconds
    pub fn durations(self, config: &AbilityConfig) -> (u64, u64) {
        match self {
            AbilityKind::Dash => (config.dash_active_ms, config.dash_cooldown_ms),
            AbilityKind::Deflect => (config.deflect_active_ms, config.deflect_cooldown_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbilityPhase {
    Idle,
    Active,
    CoolingDown,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbilityTimer {
    pub active_until: Millis,
    pub cooldown_until: Millis,
    /// Set while a natural expiry has not been reported yet
    #[serde(skip)]
    expiry_pending: bool,
}

impl AbilityTimer {
    pub fn phase(&self, now: Millis) -> AbilityPhase {
        if now < self.active_until {
            AbilityPhase::Active
        } else if now < self.cooldown_until {
            AbilityPhase::CoolingDown
        } else {
            AbilityPhase::Idle
        }
    }

    pub fn is_active(&self, now: Millis) -> bool {
        self.phase(now) == AbilityPhase::Active
    }

    /// Start the active window; only accepted from idle
    pub fn activate(&mut self, now: Millis, active_ms: u64, cooldown_ms: u64) -> bool {
        if self.phase(now) != AbilityPhase::Idle {
            return false;
        }
        self.active_until = now + active_ms;
        self.cooldown_until = self.active_until + cooldown_ms;
        self.expiry_pending = true;
        true
    }

    /// End the active window early and start a full cooldown
    pub fn consume(&mut self, now: Millis, cooldown_ms: u64) {
        self.active_until = now;
        self.cooldown_until = now + cooldown_ms;
        self.expiry_pending = false;
    }

    /// True exactly once after the active window lapses on its own
    pub fn take_expiry(&mut self, now: Millis) -> bool {
        if self.expiry_pending && now >= self.active_until {
            self.expiry_pending = false;
            return true;
        }
        false
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbilitySet {
    dash: AbilityTimer,
    deflect: AbilityTimer,
}

impl AbilitySet {
    pub fn get(&self, kind: AbilityKind) -> AbilityTimer {
        match kind {
            AbilityKind::Dash => self.dash,
            AbilityKind::Deflect => self.deflect,
        }
    }

    pub fn get_mut(&mut self, kind: AbilityKind) -> &mut AbilityTimer {
        match kind {
            AbilityKind::Dash => &mut self.dash,
            AbilityKind::Deflect => &mut self.deflect,
        }
    }

    pub fn is_active(&self, kind: AbilityKind, now: Millis) -> bool {
        self.get(kind).is_active(now)
    }
}

/// Handle an activation intent. Unknown ids and non-idle abilities are ignored.
pub fn activate(
    state: &mut GameState,
    out: &mut Outbox,
    player_id: PlayerId,
    ability_id: u8,
    now: Millis,
) -> bool {
    let Some(kind) = AbilityKind::from_id(ability_id) else {
        debug!("Ignoring unknown ability id {} from {}", ability_id, player_id);
        return false;
    };
    let (active_ms, cooldown_ms) = kind.durations(&state.config.abilities);
    let Some(player) = state.players.get_mut(&player_id) else {
        return false;
    };
    if !player.alive {
        return false;
    }
    let timer = player.abilities.get_mut(kind);
    if !timer.activate(now, active_ms, cooldown_ms) {
        return false;
    }
    out.broadcast(ServerMessage::AbilityActivated {
        id: player_id,
        ability: kind,
        active_until: timer.active_until,
        cooldown_until: timer.cooldown_until,
    });
    true
}

/// Force deflect back to cooldown after it absorbed a hit
pub fn consume_deflect(state: &mut GameState, out: &mut Outbox, player_id: PlayerId, now: Millis) {
    let cooldown_ms = state.config.abilities.deflect_cooldown_ms;
    if let Some(player) = state.players.get_mut(&player_id) {
        let timer = player.abilities.get_mut(AbilityKind::Deflect);
        timer.consume(now, cooldown_ms);
        out.broadcast(ServerMessage::AbilityDeactivated {
            id: player_id,
            ability: AbilityKind::Deflect,
            reason: DeactivationReason::ConsumedByHit,
            cooldown_until: timer.cooldown_until,
        });
    }
}

/// Report natural expiries (tick step)
pub fn expire(state: &mut GameState, out: &mut Outbox, now: Millis) {
    for player in state.players.values_mut() {
        for kind in AbilityKind::ALL {
            let timer = player.abilities.get_mut(kind);
            if timer.take_expiry(now) {
                out.broadcast(ServerMessage::AbilityDeactivated {
                    id: player.id,
                    ability: kind,
                    reason: DeactivationReason::Expired,
                    cooldown_until: timer.cooldown_until,
                });
            }
        }
    }
}

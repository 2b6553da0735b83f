//! Damage attribution for kill and assist scoring

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::config::CombatConfig;
use crate::game::state::PlayerId;
use crate::util::clock::Millis;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contribution {
    pub attacker: PlayerId,
    pub damage: f32,
    pub last_at: Millis,
}

/// victim -> attacker contributions
#[derive(Debug, Default)]
pub struct DamageLedger {
    entries: FxHashMap<PlayerId, SmallVec<[Contribution; 4]>>,
}

impl DamageLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accumulate damage dealt by `attacker` to `victim`. Self-damage is not tracked.
    pub fn record(&mut self, victim: PlayerId, attacker: PlayerId, damage: f32, now: Millis) {
        if victim == attacker || damage <= 0.0 {
            return;
        }
        let list = self.entries.entry(victim).or_default();
        match list.iter_mut().find(|c| c.attacker == attacker) {
            Some(existing) => {
                existing.damage += damage;
                existing.last_at = now;
            }
            None => list.push(Contribution {
                attacker,
                damage,
                last_at: now,
            }),
        }
    }

    pub fn contributions(&self, victim: PlayerId) -> &[Contribution] {
        self.entries.get(&victim).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Drop contributions older than `window`
    pub fn prune(&mut self, now: Millis, window: u64) {
        self.entries.retain(|_, list| {
            list.retain(|c| now.saturating_sub(c.last_at) <= window);
            !list.is_empty()
        });
    }

    pub fn clear_victim(&mut self, victim: PlayerId) {
        self.entries.remove(&victim);
    }

    /// Remove every trace of `player_id`, as victim and as attacker
    pub fn forget(&mut self, player_id: PlayerId) {
        self.entries.remove(&player_id);
        self.entries.retain(|_, list| {
            list.retain(|c| c.attacker != player_id);
            !list.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How a victim's score is divided among contributors
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KillSplit {
    /// Nobody eligible dealt damage in the window
    Unattributed,
    Solo {
        killer: PlayerId,
        award: u32,
    },
    Assisted {
        killer: PlayerId,
        killer_award: u32,
        assister: PlayerId,
        assist_award: u32,
    },
    Shared {
        first: PlayerId,
        second: PlayerId,
        award: u32,
    },
}

impl KillSplit {
    pub fn total(&self) -> u32 {
        match *self {
            KillSplit::Unattributed => 0,
            KillSplit::Solo { award, .. } => award,
            KillSplit::Assisted {
                killer_award,
                assist_award,
                ..
            } => killer_award + assist_award,
            KillSplit::Shared { award, .. } => award * 2,
        }
    }
}

/// floor(score * fraction), with the fraction taken to a thousandth so that
/// 0.35 means exactly 350/1000
fn share(score: u32, fraction: f32) -> u32 {
    let permille = (fraction.clamp(0.0, 1.0) * 1000.0).round() as u64;
    (score as u64 * permille / 1000) as u32
}

/// Rank recent contributors and split `victim_score` between the top two.
///
/// Contributors failing `eligible` (disconnected, or the victim itself) are
/// skipped, so their share is never paid out.
pub fn split_kill(
    contributions: &[Contribution],
    victim_score: u32,
    now: Millis,
    config: &CombatConfig,
    eligible: impl Fn(PlayerId) -> bool,
) -> KillSplit {
    let mut ranked: SmallVec<[Contribution; 4]> = contributions
        .iter()
        .filter(|c| now.saturating_sub(c.last_at) <= config.assist_window_ms)
        .filter(|c| eligible(c.attacker))
        .copied()
        .collect();
    // Highest damage first; most recent hit breaks ties
    ranked.sort_by(|a, b| {
        b.damage
            .total_cmp(&a.damage)
            .then_with(|| b.last_at.cmp(&a.last_at))
    });

    let Some(top) = ranked.first().copied() else {
        return KillSplit::Unattributed;
    };
    let runner_up = ranked
        .get(1)
        .copied()
        .filter(|c| c.damage >= config.assist_damage_threshold);

    match runner_up {
        None => KillSplit::Solo {
            killer: top.attacker,
            award: share(victim_score, config.solo_share),
        },
        Some(second) if (top.damage - second.damage) / 2.0 <= config.shared_kill_delta => {
            KillSplit::Shared {
                first: top.attacker,
                second: second.attacker,
                award: share(victim_score, config.shared_share),
            }
        }
        Some(second) => KillSplit::Assisted {
            killer: top.attacker,
            killer_award: share(victim_score, config.majority_share),
            assister: second.attacker,
            assist_award: share(victim_score, config.assist_share),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn contribution(attacker: PlayerId, damage: f32, last_at: Millis) -> Contribution {
        Contribution {
            attacker,
            damage,
            last_at,
        }
    }

    #[test]
    fn test_record_accumulates_per_attacker() {
        let mut ledger = DamageLedger::new();
        let victim = Uuid::new_v4();
        let attacker = Uuid::new_v4();
        ledger.record(victim, attacker, 20.0, 100);
        ledger.record(victim, attacker, 15.0, 200);
        ledger.record(victim, victim, 50.0, 200);

        let list = ledger.contributions(victim);
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].damage, 35.0);
        assert_eq!(list[0].last_at, 200);
    }

    #[test]
    fn test_prune_and_forget() {
        let mut ledger = DamageLedger::new();
        let victim = Uuid::new_v4();
        let old = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        ledger.record(victim, old, 10.0, 0);
        ledger.record(victim, fresh, 10.0, 9_000);
        ledger.prune(12_000, 10_000);
        assert_eq!(ledger.contributions(victim).len(), 1);

        ledger.forget(fresh);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_solo_kill_awards_half() {
        let killer = Uuid::new_v4();
        let split = split_kill(
            &[contribution(killer, 100.0, 1000)],
            15,
            1000,
            &CombatConfig::default(),
            |_| true,
        );
        assert_eq!(split, KillSplit::Solo { killer, award: 7 });
    }

    #[test]
    fn test_small_runner_up_gets_nothing() {
        let killer = Uuid::new_v4();
        let chip = Uuid::new_v4();
        let split = split_kill(
            &[contribution(killer, 80.0, 1000), contribution(chip, 20.0, 900)],
            40,
            1000,
            &CombatConfig::default(),
            |_| true,
        );
        assert_eq!(split, KillSplit::Solo { killer, award: 20 });
    }

    #[test]
    fn test_majority_and_assist() {
        let killer = Uuid::new_v4();
        let assister = Uuid::new_v4();
        let split = split_kill(
            &[contribution(assister, 40.0, 900), contribution(killer, 60.0, 1000)],
            100,
            1000,
            &CombatConfig::default(),
            |_| true,
        );
        assert_eq!(
            split,
            KillSplit::Assisted {
                killer,
                killer_award: 35,
                assister,
                assist_award: 15,
            }
        );
    }

    #[test]
    fn test_tied_damage_shares_quarter_each() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let split = split_kill(
            &[contribution(a, 50.0, 1000), contribution(b, 50.0, 1000)],
            10,
            1000,
            &CombatConfig::default(),
            |_| true,
        );
        match split {
            KillSplit::Shared { award, .. } => assert_eq!(award, 2),
            other => panic!("expected shared kill, got {:?}", other),
        }
    }

    #[test]
    fn test_stale_and_ineligible_contributors_skipped() {
        let stale = Uuid::new_v4();
        let gone = Uuid::new_v4();
        let live = Uuid::new_v4();
        let split = split_kill(
            &[
                contribution(stale, 90.0, 0),
                contribution(gone, 80.0, 15_000),
                contribution(live, 10.0, 15_000),
            ],
            30,
            15_000,
            &CombatConfig::default(),
            |id| id != gone,
        );
        assert_eq!(
            split,
            KillSplit::Solo {
                killer: live,
                award: 15
            }
        );
    }

    #[test]
    fn test_no_contributors_is_unattributed() {
        let split = split_kill(&[], 50, 0, &CombatConfig::default(), |_| true);
        assert_eq!(split, KillSplit::Unattributed);
        assert_eq!(split.total(), 0);
    }

    #[test]
    fn test_awards_never_exceed_victim_score() {
        let config = CombatConfig::default();
        for score in [0u32, 1, 3, 7, 99, 1000] {
            for (da, db) in [(100.0, 0.0), (60.0, 40.0), (50.0, 50.0)] {
                let a = Uuid::new_v4();
                let b = Uuid::new_v4();
                let split = split_kill(
                    &[contribution(a, da, 0), contribution(b, db, 0)],
                    score,
                    0,
                    &config,
                    |_| true,
                );
                assert!(split.total() <= score);
            }
        }
    }
}

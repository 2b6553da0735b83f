//! Tick budget tracking for admission control
//!
//! New players are turned away while recent ticks are eating most of the
//! tick budget, so a crowded arena degrades by refusing joins instead of
//! slowing the simulation for everyone.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Fewer samples than this and the status stays at its previous value
const MIN_SAMPLES: usize = 10;

/// Load levels derived from average tick time over the budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Under half the budget
    Comfortable,
    /// Between half and the overload threshold
    Busy,
    /// Ticks are close to (or over) the budget
    Overloaded,
}

impl LoadStatus {
    pub fn can_accept_players(&self) -> bool {
        !matches!(self, LoadStatus::Overloaded)
    }
}

pub struct TickBudget {
    durations: VecDeque<Duration>,
    max_samples: usize,
    budget: Duration,
    /// Fraction of the budget at which joins are refused
    overload_ratio: f32,
    status: LoadStatus,
    started_at: Option<Instant>,
}

impl TickBudget {
    pub fn new(tick_rate: u32) -> Self {
        let max_samples = (tick_rate.max(1) as usize) * 2;
        Self {
            durations: VecDeque::with_capacity(max_samples),
            max_samples,
            budget: Duration::from_secs_f32(1.0 / tick_rate.max(1) as f32),
            overload_ratio: 0.9,
            status: LoadStatus::Comfortable,
            started_at: None,
        }
    }

    pub fn tick_start(&mut self) {
        self.started_at = Some(Instant::now());
    }

    /// Close the tick opened by `tick_start`; returns its duration
    pub fn tick_end(&mut self) -> Option<Duration> {
        let elapsed = self.started_at.take()?.elapsed();
        self.record(elapsed);
        Some(elapsed)
    }

    pub fn record(&mut self, duration: Duration) {
        self.durations.push_back(duration);
        while self.durations.len() > self.max_samples {
            self.durations.pop_front();
        }
        if self.durations.len() < MIN_SAMPLES {
            return;
        }
        let ratio = self.usage_ratio();
        self.status = if ratio < 0.5 {
            LoadStatus::Comfortable
        } else if ratio < self.overload_ratio {
            LoadStatus::Busy
        } else {
            LoadStatus::Overloaded
        };
    }

    pub fn average(&self) -> Duration {
        if self.durations.is_empty() {
            return Duration::ZERO;
        }
        self.durations.iter().sum::<Duration>() / self.durations.len() as u32
    }

    /// Average tick time as a fraction of the budget
    pub fn usage_ratio(&self) -> f32 {
        self.average().as_secs_f32() / self.budget.as_secs_f32()
    }

    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn can_accept_players(&self) -> bool {
        self.status.can_accept_players()
    }

    pub fn status_message(&self) -> String {
        format!("{:?} ({:.1}% of tick budget)", self.status, self.usage_ratio() * 100.0)
    }
}

impl Default for TickBudget {
    fn default() -> Self {
        Self::new(crate::game::constants::tick::TICK_RATE)
    }
}

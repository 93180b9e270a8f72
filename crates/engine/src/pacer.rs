//! Turn pacing decoupled from wall-clock sleeps.

use std::time::Duration;

use tokio::time::{interval, Interval, MissedTickBehavior};

/// Scheduler tick driving the turn loop.
///
/// Production nodes pace turns with an interval; tests use
/// [`TurnPacer::immediate`] so pacing never depends on wall-clock time.
#[derive(Debug)]
pub enum TurnPacer {
    /// Fire once per fixed period.
    Interval(Interval),
    /// Fire immediately every time.
    Immediate,
}

impl TurnPacer {
    /// Tick once per `period`.
    pub fn every(period: Duration) -> Self {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self::Interval(interval)
    }

    /// Never wait.
    pub fn immediate() -> Self {
        Self::Immediate
    }

    /// Wait for the next tick.
    pub async fn tick(&mut self) {
        if let Self::Interval(interval) = self {
            interval.tick().await;
        }
    }
}

//! Local round countdown.

use std::time::Duration;

use tokio::time::Instant;

use oekaki_core::ids::RoundId;
use oekaki_core::round::Round;
use oekaki_core::time::Timestamp;

/// Predictive countdown for the active round.
///
/// Expiry is only a hint that the coordinator should be asked to advance; the
/// coordinator decides. The timer fires at most once per arming.
#[derive(Debug, Default)]
pub struct LocalRoundTimer {
    armed: Option<Armed>,
}

#[derive(Debug, Clone, Copy)]
struct Armed {
    round_id: RoundId,
    deadline: Instant,
    fired: bool,
}

impl LocalRoundTimer {
    /// Count down `round`, which started at `started_at` (server time), as observed at
    /// local wall-clock `now`. Re-arming for the round already being counted keeps
    /// the existing deadline.
    pub fn arm(&mut self, round: &Round, round_time: Duration, now: Timestamp) {
        if self.round() == Some(round.id) {
            return;
        }
        let Some(started_at) = round.started_at else {
            self.cancel();
            return;
        };
        let elapsed = now.since(started_at).min(round_time);
        self.armed = Some(Armed {
            round_id: round.id,
            deadline: Instant::now() + (round_time - elapsed),
            fired: false,
        });
    }

    /// Fire again for the same round after `delay`.
    pub fn retry_in(&mut self, delay: Duration) {
        if let Some(armed) = &mut self.armed {
            armed.deadline = Instant::now() + delay;
            armed.fired = false;
        }
    }

    pub fn cancel(&mut self) {
        self.armed = None;
    }

    pub fn round(&self) -> Option<RoundId> {
        self.armed.map(|a| a.round_id)
    }

    /// Time left on the countdown, zero once expired.
    pub fn remaining(&self) -> Option<Duration> {
        self.armed
            .map(|a| a.deadline.saturating_duration_since(Instant::now()))
    }

    /// Resolves when the countdown runs out; pending forever while disarmed or after
    /// it already fired.
    pub async fn expired(&mut self) -> RoundId {
        match self.armed {
            Some(armed) if !armed.fired => {
                tokio::time::sleep_until(armed.deadline).await;
                if let Some(a) = &mut self.armed {
                    a.fired = true;
                }
                armed.round_id
            },
            _ => std::future::pending().await,
        }
    }
}

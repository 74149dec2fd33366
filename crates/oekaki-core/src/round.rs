//! Rounds and their lifecycle.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ids::{MemberId, PromptId, RoomId, RoundId};
use crate::time::Timestamp;

/// Round state machine: `Pending -> Active -> {Ended | Skipped}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    Pending,
    Active,
    /// Won by a correct guess.
    Ended,
    /// Timed out, or abandoned by its drawer.
    Skipped,
}

impl RoundStatus {
    pub fn is_concluded(self) -> bool {
        matches!(self, RoundStatus::Ended | RoundStatus::Skipped)
    }

    pub fn can_transition_to(self, next: RoundStatus) -> bool {
        matches!(
            (self, next),
            (RoundStatus::Pending, RoundStatus::Active)
                | (RoundStatus::Pending, RoundStatus::Skipped)
                | (RoundStatus::Active, RoundStatus::Ended)
                | (RoundStatus::Active, RoundStatus::Skipped)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub id: RoundId,
    pub room_id: RoomId,
    /// 1-based, unique per room.
    pub number: u8,
    pub status: RoundStatus,
    /// Chosen when the round activates.
    #[serde(default)]
    pub drawer: Option<MemberId>,
    #[serde(default)]
    pub prompt: Option<PromptId>,
    /// Earliest time a pending round may activate.
    pub scheduled_at: Timestamp,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub ended_at: Option<Timestamp>,
    /// Reference to the rendered drawing, handed off by the drawer.
    #[serde(default)]
    pub artifact_ref: Option<String>,
}

impl Round {
    pub fn is_active(&self) -> bool {
        self.status == RoundStatus::Active
    }

    /// Whether an active round has used up its time at `now`.
    pub fn has_timed_out(&self, round_time: Duration, now: Timestamp) -> bool {
        match (self.status, self.started_at) {
            (RoundStatus::Active, Some(started)) => now.since(started) >= round_time,
            _ => false,
        }
    }

    /// When an active round times out.
    pub fn deadline(&self, round_time: Duration) -> Option<Timestamp> {
        match (self.status, self.started_at) {
            (RoundStatus::Active, Some(started)) => Some(started.plus(round_time)),
            _ => None,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        Some(self.ended_at?.since(self.started_at?))
    }
}

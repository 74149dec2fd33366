use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ids::{MemberId, RoomId};
use crate::time::Timestamp;

/// Hard ceiling on active members in any room.
pub const MAX_ROOM_MEMBERS: u8 = 20;

/// Lifecycle of a room. Only moves forward: lobby, then in progress, then finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Lobby,
    InProgress,
    Finished,
}

impl RoomStatus {
    pub fn can_transition_to(self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (RoomStatus::Lobby, RoomStatus::InProgress)
                | (RoomStatus::Lobby, RoomStatus::Finished)
                | (RoomStatus::InProgress, RoomStatus::Finished)
        )
    }

    /// Finished rooms release their name for reuse.
    pub fn is_active(self) -> bool {
        self != RoomStatus::Finished
    }
}

/// Points awarded when a round is won. Stamped onto the room at creation so that
/// score totals can always be re-derived from round history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringRule {
    pub guesser_points: u32,
    pub drawer_points: u32,
}

impl Default for ScoringRule {
    fn default() -> Self {
        Self {
            guesser_points: 5,
            drawer_points: 3,
        }
    }
}

/// A game room. The password hash is kept by the store, never on this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub status: RoomStatus,
    pub rounds_total: u8,
    pub round_time_sec: u16,
    pub max_players: u8,
    pub host_member: MemberId,
    pub scoring: ScoringRule,
    pub created_at: Timestamp,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    #[serde(default)]
    pub finished_at: Option<Timestamp>,
    /// Most recent mutation, used for idle expiry.
    pub updated_at: Timestamp,
}

impl Room {
    pub fn round_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.round_time_sec))
    }

    /// Name of the broadcast channel carrying raw strokes for this room.
    pub fn stroke_channel(&self) -> String {
        format!("room:{}", self.id)
    }
}

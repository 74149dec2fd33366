//! Archived session records. Written once per finished room and never edited
//! afterwards; every write is an upsert keyed by room so retries are harmless.

use serde::{Deserialize, Serialize};

use crate::ids::{MemberId, RoomId, RoundId, SessionId};
use crate::round::RoundStatus;
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub room_id: RoomId,
    pub room_name: String,
    pub host_username: String,
    pub rounds_total: u8,
    pub round_time_sec: u16,
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    pub finished_at: Timestamp,
    pub archived_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub member_id: MemberId,
    pub username: String,
    pub is_host: bool,
    pub score: u32,
    pub joined_at: Timestamp,
    #[serde(default)]
    pub left_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub round_id: RoundId,
    pub number: u8,
    pub status: RoundStatus,
    #[serde(default)]
    pub drawer_username: Option<String>,
    #[serde(default)]
    pub prompt_word: Option<String>,
    #[serde(default)]
    pub winner_username: Option<String>,
    #[serde(default)]
    pub winning_guess: Option<String>,
    #[serde(default)]
    pub artifact_ref: Option<String>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
}

/// Everything archived for one finished room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionHistory {
    pub summary: SessionSummary,
    pub participants: Vec<ParticipantRecord>,
    pub rounds: Vec<RoundSnapshot>,
    /// Set once every part has been written.
    pub completed: bool,
}

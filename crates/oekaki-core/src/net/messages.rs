//! Request and response bodies of the coordinator's HTTP surface.

use serde::{Deserialize, Serialize};

use crate::guess::Guess;
use crate::ids::{MemberId, RoomId};
use crate::member::Member;
use crate::prompt::PromptView;
use crate::room::Room;
use crate::round::Round;

/// Fields are optional so a missing one maps to `missing_params` rather than a
/// generic deserialization failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateRoomRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub host_username: Option<String>,
    #[serde(default)]
    pub rounds_total: Option<u32>,
    #[serde(default)]
    pub round_time_sec: Option<u32>,
    #[serde(default)]
    pub max_players: Option<u32>,
    /// Account reference of an authenticated caller, if any.
    #[serde(default)]
    pub account: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRoomRequest {
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub account: Option<String>,
}

/// Returned by create and join: the caller's member row plus the bearer token
/// that authenticates it on later requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResponse {
    pub room: Room,
    pub member: Member,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitGuessRequest {
    pub member_id: MemberId,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRequest {
    pub reference: String,
}

/// What a call to `advance_round` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AdvanceOutcome {
    /// Nothing to do yet, or somebody else already advanced.
    Noop,
    /// The active round timed out.
    Skipped { number: u8 },
    /// The next round was queued behind the result display.
    Scheduled { number: u8 },
    /// A pending round became active.
    Started { number: u8 },
    /// The last round concluded and the room finished.
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceResponse {
    pub room_id: RoomId,
    #[serde(flatten)]
    pub outcome: AdvanceOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessResponse {
    pub guess: Guess,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub member_id: MemberId,
    pub username: String,
    pub points: u32,
}

/// Authoritative snapshot of a room, tailored to the viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomStateView {
    pub room: Room,
    /// Active members only.
    pub members: Vec<Member>,
    /// Highest-numbered round, whatever its status.
    #[serde(default)]
    pub current_round: Option<Round>,
    #[serde(default)]
    pub prompt: Option<PromptView>,
    pub scores: Vec<ScoreEntry>,
    pub stroke_channel: String,
    /// The most recently concluded round. The next round may already be pending
    /// by the time a client fetches, so `current_round` alone can skip past it.
    #[serde(default)]
    pub last_result: Option<ConcludedRound>,
}

/// A finished round together with its revealed answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcludedRound {
    pub round: Round,
    #[serde(default)]
    pub answer: Option<String>,
}

impl RoomStateView {
    pub fn active_round(&self) -> Option<&Round> {
        self.current_round.as_ref().filter(|r| r.is_active())
    }

    pub fn points_of(&self, member: MemberId) -> u32 {
        self.scores
            .iter()
            .find(|s| s.member_id == member)
            .map_or(0, |s| s.points)
    }
}

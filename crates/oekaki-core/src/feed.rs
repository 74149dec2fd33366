//! Change-feed schema: insert/update/delete notifications filtered by room.

use serde::{Deserialize, Serialize};

use crate::guess::Guess;
use crate::ids::RoomId;
use crate::member::Member;
use crate::room::{Room, RoomStatus};
use crate::round::Round;

/// One row-level change committed by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "row", rename_all = "snake_case")]
pub enum Change {
    RoomUpdated(Room),
    RoomDeleted,
    MemberChanged(Member),
    RoundChanged(Round),
    GuessInserted(Guess),
    /// The room will be force-ended after `seconds` unless a guest rejoins.
    Disbanding { seconds: u32 },
    DisbandCancelled,
    /// The subscription fell behind and `missed` events were dropped. Not a row
    /// change; the subscriber must fetch the room state again.
    Resync { missed: u64 },
}

/// A change as delivered to subscribers. `seq` is assigned at commit time and is
/// strictly increasing across the whole store; delivery may still duplicate or
/// reorder events, so clients only use it for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedEvent {
    pub seq: u64,
    pub room_id: RoomId,
    pub change: Change,
}

impl FeedEvent {
    /// Whether this event reports a transition that clients must resync on:
    /// a winning guess, a round concluding, or a room status change.
    pub fn is_decisive(&self) -> bool {
        match &self.change {
            Change::GuessInserted(guess) => guess.is_winner,
            Change::RoundChanged(round) => round.status.is_concluded(),
            Change::RoomUpdated(room) => room.status == RoomStatus::Finished,
            Change::RoomDeleted => true,
            Change::MemberChanged(_)
            | Change::Disbanding { .. }
            | Change::DisbandCancelled
            | Change::Resync { .. } => false,
        }
    }

    /// SSE event name.
    pub fn kind(&self) -> &'static str {
        match self.change {
            Change::RoomUpdated(_) => "room_updated",
            Change::RoomDeleted => "room_deleted",
            Change::MemberChanged(_) => "member_changed",
            Change::RoundChanged(_) => "round_changed",
            Change::GuessInserted(_) => "guess_inserted",
            Change::Disbanding { .. } => "disbanding",
            Change::DisbandCancelled => "disband_cancelled",
            Change::Resync { .. } => "resync",
        }
    }
}

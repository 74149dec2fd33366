use serde::{Deserialize, Serialize};

use crate::ids::{GuessId, MemberId, RoomId, RoundId};
use crate::time::Timestamp;

/// Longest accepted guess, in characters.
pub const MAX_GUESS_CHARS: usize = 64;

/// A recorded guess. Every submission is stored, whether or not it scored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guess {
    pub id: GuessId,
    pub room_id: RoomId,
    pub round_id: RoundId,
    pub member_id: MemberId,
    pub content: String,
    /// Normalized text matched the prompt.
    pub is_correct: bool,
    /// The single reward-triggering guess of its round.
    pub is_winner: bool,
    pub created_at: Timestamp,
}

use serde::{Deserialize, Serialize};

use crate::ids::{MemberId, RoomId};
use crate::time::Timestamp;

/// Longest accepted username, in characters.
pub const MAX_USERNAME_CHARS: usize = 20;

/// Who is behind a member. Accounts are managed elsewhere; the coordinator only
/// records the account reference handed to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "account", rename_all = "snake_case")]
pub enum Identity {
    Anonymous,
    Account(String),
}

/// A room-scoped participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub room_id: RoomId,
    pub identity: Identity,
    pub username: String,
    pub is_host: bool,
    pub joined_at: Timestamp,
    /// Set on soft removal; the row stays so rounds and guesses keep resolving.
    #[serde(default)]
    pub left_at: Option<Timestamp>,
}

impl Member {
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}

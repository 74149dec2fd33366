//! Score derivation. Totals are never stored; they are recomputed from winning
//! guesses and the scoring rule stamped on the room.

use std::collections::HashMap;

use oekaki_core::ids::{MemberId, RoomId};
use oekaki_core::net::messages::ScoreEntry;

use crate::coordinator::Coordinator;
use crate::error::CoordinatorError;
use crate::store::Txn;

impl Coordinator {
    /// Current totals of every member who ever sat in `room_id`, highest first.
    pub fn scores(&self, room_id: RoomId) -> Result<Vec<ScoreEntry>, CoordinatorError> {
        self.store().read(|txn| {
            txn.room(room_id).ok_or(CoordinatorError::RoomNotFound)?;
            Ok(Self::score_table(txn, room_id))
        })
    }

    pub(crate) fn score_table(txn: &Txn<'_>, room_id: RoomId) -> Vec<ScoreEntry> {
        let Some(room) = txn.room(room_id) else {
            return Vec::new();
        };
        let mut points: HashMap<MemberId, u32> = HashMap::new();
        for guess in txn.winning_guesses(room_id) {
            *points.entry(guess.member_id).or_default() += room.scoring.guesser_points;
            if let Some(drawer) = txn.round(guess.round_id).and_then(|r| r.drawer) {
                *points.entry(drawer).or_default() += room.scoring.drawer_points;
            }
        }

        let mut table: Vec<ScoreEntry> = txn
            .members_of(room_id)
            .into_iter()
            .map(|m| ScoreEntry {
                member_id: m.id,
                username: m.username.clone(),
                points: points.get(&m.id).copied().unwrap_or(0),
            })
            .collect();
        table.sort_by(|a, b| {
            b.points
                .cmp(&a.points)
                .then_with(|| a.username.cmp(&b.username))
        });
        table
    }
}

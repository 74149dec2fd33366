//! Session archiving.
//!
//! A finished room is written out as a summary, one record per participant and
//! one snapshot per round. Each part is its own upsert, so an interrupted archive
//! is completed by simply running it again.

use std::collections::HashMap;

use oekaki_core::history::{ParticipantRecord, RoundSnapshot, SessionHistory, SessionSummary};
use oekaki_core::ids::{MemberId, RoomId, SessionId};
use oekaki_core::room::{Room, RoomStatus};

use crate::coordinator::{Coordinator, lock};
use crate::error::CoordinatorError;
use crate::store::Txn;

impl Coordinator {
    /// Archive a finished room. Safe to call any number of times.
    pub fn archive_session(&self, room_id: RoomId) -> Result<SessionHistory, CoordinatorError> {
        let already = lock(&self.inner.archived).contains(&room_id);
        let state = self.store().read(|txn| {
            (
                txn.room(room_id).cloned(),
                txn.is_archive_completed(room_id),
            )
        });
        match state {
            (None, _) => return self.session_history(room_id),
            (Some(room), _) if room.status != RoomStatus::Finished => {
                return Err(CoordinatorError::BadRequest("room is not finished".into()));
            },
            (Some(_), true) => {
                lock(&self.inner.archived).insert(room_id);
                return self.session_history(room_id);
            },
            (Some(_), false) if already => return self.session_history(room_id),
            (Some(_), false) => {},
        }

        self.write_summary(room_id)?;
        self.write_participants(room_id)?;
        self.write_snapshots(room_id)?;
        self.store().transaction(|txn| -> Result<_, CoordinatorError> {
            txn.mark_archive_completed(room_id);
            Ok(())
        })?;
        lock(&self.inner.archived).insert(room_id);
        tracing::info!(room = %room_id, "Session archived");
        self.session_history(room_id)
    }

    /// Archived history of a room, complete or not.
    pub fn session_history(&self, room_id: RoomId) -> Result<SessionHistory, CoordinatorError> {
        self.store()
            .read(|txn| txn.history(room_id))
            .ok_or(CoordinatorError::RoomNotFound)
    }

    pub(crate) fn write_summary(&self, room_id: RoomId) -> Result<SessionSummary, CoordinatorError> {
        let now = self.now();
        self.store().transaction(|txn| -> Result<_, CoordinatorError> {
            let room = finished_room(txn, room_id)?;
            let host_username = txn
                .member(room.host_member)
                .map(|m| m.username.clone())
                .unwrap_or_default();
            Ok(txn.upsert_summary(SessionSummary {
                session_id: SessionId::new(),
                room_id,
                room_name: room.name.clone(),
                host_username,
                rounds_total: room.rounds_total,
                round_time_sec: room.round_time_sec,
                started_at: room.started_at,
                finished_at: room.finished_at.unwrap_or(now),
                archived_at: now,
            }))
        })
    }

    pub(crate) fn write_participants(&self, room_id: RoomId) -> Result<(), CoordinatorError> {
        self.store().transaction(|txn| -> Result<_, CoordinatorError> {
            finished_room(txn, room_id)?;
            let scores: HashMap<MemberId, u32> = Self::score_table(txn, room_id)
                .into_iter()
                .map(|s| (s.member_id, s.points))
                .collect();
            let records: Vec<ParticipantRecord> = txn
                .members_of(room_id)
                .into_iter()
                .map(|m| ParticipantRecord {
                    member_id: m.id,
                    username: m.username.clone(),
                    is_host: m.is_host,
                    score: scores.get(&m.id).copied().unwrap_or(0),
                    joined_at: m.joined_at,
                    left_at: m.left_at,
                })
                .collect();
            for record in records {
                txn.upsert_participant(room_id, record);
            }
            Ok(())
        })
    }

    pub(crate) fn write_snapshots(&self, room_id: RoomId) -> Result<(), CoordinatorError> {
        self.store().transaction(|txn| -> Result<_, CoordinatorError> {
            finished_room(txn, room_id)?;
            let username = |txn: &Txn<'_>, id: Option<MemberId>| {
                id.and_then(|id| txn.member(id)).map(|m| m.username.clone())
            };
            let snapshots: Vec<RoundSnapshot> = txn
                .rounds_of(room_id)
                .into_iter()
                .map(|round| {
                    let winner = txn
                        .guesses_of_round(round.id)
                        .into_iter()
                        .find(|g| g.is_winner);
                    RoundSnapshot {
                        round_id: round.id,
                        number: round.number,
                        status: round.status,
                        drawer_username: username(txn, round.drawer),
                        prompt_word: round
                            .prompt
                            .and_then(|id| self.inner.prompts.get(id))
                            .map(|p| p.word.clone()),
                        winner_username: username(txn, winner.map(|g| g.member_id)),
                        winning_guess: winner.map(|g| g.content.clone()),
                        artifact_ref: round.artifact_ref.clone(),
                        duration_ms: round
                            .duration()
                            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
                    }
                })
                .collect();
            for snapshot in snapshots {
                txn.upsert_snapshot(room_id, snapshot);
            }
            Ok(())
        })
    }
}

fn finished_room(txn: &Txn<'_>, room_id: RoomId) -> Result<Room, CoordinatorError> {
    let room = txn
        .room(room_id)
        .cloned()
        .ok_or(CoordinatorError::RoomNotFound)?;
    if room.status != RoomStatus::Finished {
        return Err(CoordinatorError::BadRequest("room is not finished".into()));
    }
    Ok(room)
}

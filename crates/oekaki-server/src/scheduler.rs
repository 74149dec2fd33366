//! Round state machine and timing.
//!
//! `Pending -> Active -> {Ended | Skipped}`, then either the next round is queued
//! as `Pending` behind the result display or the room finishes. `advance_round`
//! is the only entry point for time-driven transitions and is idempotent: it
//! inspects the latest round and does at most one step.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use oekaki_core::ids::{MemberId, RoomId, RoundId};
use oekaki_core::net::messages::AdvanceOutcome;
use oekaki_core::room::{Room, RoomStatus};
use oekaki_core::rotation::select_drawer;
use oekaki_core::round::{Round, RoundStatus};
use oekaki_core::time::Timestamp;

use crate::coordinator::{Coordinator, lock};
use crate::error::CoordinatorError;
use crate::store::{RotationState, Txn};

/// Lower bound on driver sleeps, so a clock that lags the timer cannot spin it.
const MIN_DRIVER_SLEEP: Duration = Duration::from_millis(10);

/// How a round was concluded, as reported by the transaction that did it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Conclusion {
    NextScheduled(u8),
    RoomFinished,
}

impl Coordinator {
    /// Host-only. Moves the room out of the lobby and activates round 1.
    pub fn start_game(&self, room_id: RoomId, actor: MemberId) -> Result<Round, CoordinatorError> {
        let now = self.now();
        let round = self
            .store()
            .transaction(|txn| -> Result<_, CoordinatorError> {
                let mut room = txn
                    .room(room_id)
                    .cloned()
                    .ok_or(CoordinatorError::RoomNotFound)?;
                if room.host_member != actor {
                    return Err(CoordinatorError::Forbidden);
                }
                if room.status != RoomStatus::Lobby {
                    return Err(CoordinatorError::BadRequest("game already started".into()));
                }
                let active: Vec<MemberId> =
                    txn.active_members(room_id).iter().map(|m| m.id).collect();
                if active.len() < 2 {
                    return Err(CoordinatorError::BadRequest("need at least 2 players".into()));
                }

                room.status = RoomStatus::InProgress;
                room.started_at = Some(now);
                room.updated_at = now;
                txn.update_room(room.clone())?;
                txn.set_rotation(
                    room_id,
                    RotationState {
                        undrawn: active.into_iter().collect(),
                        last_drawer: None,
                    },
                );
                txn.reset_used_prompts(room_id);

                let pending = Round {
                    id: RoundId::new(),
                    room_id,
                    number: 1,
                    status: RoundStatus::Pending,
                    drawer: None,
                    prompt: None,
                    scheduled_at: now,
                    started_at: None,
                    ended_at: None,
                    artifact_ref: None,
                };
                txn.insert_round(pending.clone())?;
                self.activate_round(txn, &room, pending, now)?
                    .ok_or(CoordinatorError::BadRequest("no players to draw".into()))
            })?;

        tracing::info!(
            room = %room_id,
            round = round.number,
            drawer = ?round.drawer,
            "Game started"
        );
        self.ensure_driver(room_id);
        Ok(round)
    }

    /// Perform the next time-driven step of `room_id`, if one is due.
    ///
    /// Duplicate or concurrent calls are safe: whichever call commits first makes
    /// the step, the others observe the new state and return `Noop`.
    pub fn advance_round(&self, room_id: RoomId) -> Result<AdvanceOutcome, CoordinatorError> {
        let now = self.now();
        let outcome = self
            .store()
            .transaction(|txn| -> Result<_, CoordinatorError> {
                let room = txn
                    .room(room_id)
                    .cloned()
                    .ok_or(CoordinatorError::RoomNotFound)?;
                if room.status != RoomStatus::InProgress {
                    return Ok(AdvanceOutcome::Noop);
                }
                let Some(mut round) = txn.latest_round(room_id).cloned() else {
                    return Ok(AdvanceOutcome::Noop);
                };

                let outcome = match round.status {
                    RoundStatus::Active => {
                        if !round.has_timed_out(room.round_duration(), now) {
                            return Ok(AdvanceOutcome::Noop);
                        }
                        let number = round.number;
                        round.status = RoundStatus::Skipped;
                        round.ended_at = Some(now);
                        txn.update_round(round.clone())?;
                        match self.conclude_round(txn, &room, &round, now)? {
                            Conclusion::RoomFinished => AdvanceOutcome::Finished,
                            Conclusion::NextScheduled(_) => AdvanceOutcome::Skipped { number },
                        }
                    },
                    RoundStatus::Pending => {
                        if now < round.scheduled_at {
                            return Ok(AdvanceOutcome::Noop);
                        }
                        match self.activate_round(txn, &room, round, now)? {
                            Some(active) => AdvanceOutcome::Started {
                                number: active.number,
                            },
                            None => {
                                self.finish_room_in(txn, room, now)?;
                                AdvanceOutcome::Finished
                            },
                        }
                    },
                    RoundStatus::Ended | RoundStatus::Skipped => {
                        match self.conclude_round(txn, &room, &round, now)? {
                            Conclusion::RoomFinished => AdvanceOutcome::Finished,
                            Conclusion::NextScheduled(number) => {
                                AdvanceOutcome::Scheduled { number }
                            },
                        }
                    },
                };
                txn.touch_room(room_id, now);
                Ok(outcome)
            })?;

        match outcome {
            AdvanceOutcome::Noop => {
                tracing::debug!(room = %room_id, "advance_round: nothing to do");
            },
            AdvanceOutcome::Finished => {
                tracing::info!(room = %room_id, "Last round concluded, room finished");
                self.after_finish(room_id);
            },
            other => {
                tracing::info!(room = %room_id, outcome = ?other, "Round advanced");
                self.wake_driver(room_id);
            },
        }
        Ok(outcome)
    }

    /// Host-only. Terminates the room whatever its state.
    pub fn end_game(&self, room_id: RoomId, actor: MemberId) -> Result<Room, CoordinatorError> {
        let now = self.now();
        let (room, changed) = self
            .store()
            .transaction(|txn| -> Result<_, CoordinatorError> {
                let room = txn
                    .room(room_id)
                    .cloned()
                    .ok_or(CoordinatorError::RoomNotFound)?;
                if room.host_member != actor {
                    return Err(CoordinatorError::Forbidden);
                }
                if room.status == RoomStatus::Finished {
                    return Ok((room, false));
                }
                Ok((self.finish_room_in(txn, room, now)?, true))
            })?;
        if changed {
            tracing::info!(room = %room_id, "Game ended by host");
            self.after_finish(room_id);
        } else {
            tracing::debug!(room = %room_id, "end_game: room already finished");
        }
        Ok(room)
    }

    /// Activate `round`: pick the drawer and an unused prompt. Returns `None` when
    /// nobody is left to draw.
    pub(crate) fn activate_round(
        &self,
        txn: &mut Txn<'_>,
        room: &Room,
        mut round: Round,
        now: Timestamp,
    ) -> Result<Option<Round>, CoordinatorError> {
        let active: Vec<MemberId> = txn.active_members(room.id).iter().map(|m| m.id).collect();
        let rotation = txn.rotation(room.id);
        let mut rng = self.rng();
        let Some(pick) = select_drawer(&active, &rotation.undrawn, rotation.last_drawer, &mut *rng)
        else {
            return Ok(None);
        };

        let mut used = txn.used_prompts(room.id);
        if self.inner.prompts.pick_unused(&used, &mut *rng).is_none() {
            // Every prompt was used this session; start over.
            txn.reset_used_prompts(room.id);
            used.clear();
        }
        let prompt = self
            .inner
            .prompts
            .pick_unused(&used, &mut *rng)
            .map(|p| p.id);
        drop(rng);

        txn.set_rotation(
            room.id,
            RotationState {
                undrawn: pick.undrawn,
                last_drawer: Some(pick.drawer),
            },
        );
        if let Some(prompt) = prompt {
            txn.mark_prompt_used(room.id, prompt);
        }

        round.status = RoundStatus::Active;
        round.drawer = Some(pick.drawer);
        round.prompt = prompt;
        round.started_at = Some(now);
        txn.update_round(round.clone())?;
        tracing::debug!(
            room = %room.id,
            round = round.number,
            drawer = %pick.drawer,
            "Round activated"
        );
        Ok(Some(round))
    }

    /// After `round` ended or was skipped: finish the room on the last round,
    /// otherwise queue the next one behind the result display.
    pub(crate) fn conclude_round(
        &self,
        txn: &mut Txn<'_>,
        room: &Room,
        round: &Round,
        now: Timestamp,
    ) -> Result<Conclusion, CoordinatorError> {
        if round.number >= room.rounds_total {
            self.finish_room_in(txn, room.clone(), now)?;
            return Ok(Conclusion::RoomFinished);
        }
        let number = round.number + 1;
        let next = Round {
            id: RoundId::new(),
            room_id: room.id,
            number,
            status: RoundStatus::Pending,
            drawer: None,
            prompt: None,
            scheduled_at: now.plus(self.config().rounds.result_delay()),
            started_at: None,
            ended_at: None,
            artifact_ref: None,
        };
        txn.insert_round(next)?;
        Ok(Conclusion::NextScheduled(number))
    }

    /// Mark the room finished, closing any round still open.
    pub(crate) fn finish_room_in(
        &self,
        txn: &mut Txn<'_>,
        mut room: Room,
        now: Timestamp,
    ) -> Result<Room, CoordinatorError> {
        let open: Vec<Round> = txn
            .rounds_of(room.id)
            .into_iter()
            .filter(|r| !r.status.is_concluded())
            .cloned()
            .collect();
        for mut round in open {
            round.status = RoundStatus::Skipped;
            round.ended_at = Some(now);
            txn.update_round(round)?;
        }
        room.status = RoomStatus::Finished;
        room.finished_at = Some(now);
        room.updated_at = now;
        txn.update_room(room.clone())?;
        Ok(room)
    }

    /// Side effects that follow a committed finish.
    pub(crate) fn after_finish(&self, room_id: RoomId) {
        self.cancel_disband_silently(room_id);
        self.wake_driver(room_id);
        if let Err(e) = self.archive_session(room_id) {
            // A later explicit archive call retries.
            tracing::warn!(room = %room_id, error = %e, "Archiving failed");
        }
    }

    /// Next instant the driver of `room_id` should act, or `None` once the room no
    /// longer needs one.
    fn next_deadline(&self, room_id: RoomId) -> Option<Timestamp> {
        let now = self.now();
        self.store().read(|txn| {
            let room = txn.room(room_id)?;
            if room.status != RoomStatus::InProgress {
                return None;
            }
            let round = txn.latest_round(room_id)?;
            match round.status {
                RoundStatus::Active => round.deadline(room.round_duration()),
                RoundStatus::Pending => Some(round.scheduled_at),
                RoundStatus::Ended | RoundStatus::Skipped => Some(now),
            }
        })
    }

    /// Start the background driver for `room_id` unless one is running.
    pub(crate) fn ensure_driver(&self, room_id: RoomId) {
        if !self.config().rounds.auto_advance {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(room = %room_id, "No tokio runtime, round driver not started");
            return;
        };
        let notify = {
            let mut drivers = lock(&self.inner.drivers);
            if drivers.contains_key(&room_id) {
                return;
            }
            let notify = Arc::new(Notify::new());
            drivers.insert(room_id, Arc::clone(&notify));
            notify
        };
        let coordinator = self.clone();
        runtime.spawn(async move { coordinator.drive_room(room_id, notify).await });
    }

    /// Re-evaluate the driver's deadline after a state change.
    pub(crate) fn wake_driver(&self, room_id: RoomId) {
        if let Some(notify) = lock(&self.inner.drivers).get(&room_id) {
            notify.notify_one();
        }
    }

    async fn drive_room(self, room_id: RoomId, notify: Arc<Notify>) {
        tracing::debug!(room = %room_id, "Round driver started");
        while let Some(deadline) = self.next_deadline(room_id) {
            let wait = deadline.since(self.now()).max(MIN_DRIVER_SLEEP);
            tokio::select! {
                () = tokio::time::sleep(wait) => {
                    if let Err(e) = self.advance_round(room_id) {
                        tracing::warn!(room = %room_id, error = %e, "Round driver stopping");
                        break;
                    }
                },
                () = notify.notified() => {},
                () = self.inner.shutdown.cancelled() => break,
            }
        }
        let mut drivers = lock(&self.inner.drivers);
        if drivers
            .get(&room_id)
            .is_some_and(|current| Arc::ptr_eq(current, &notify))
        {
            drivers.remove(&room_id);
        }
        tracing::debug!(room = %room_id, "Round driver stopped");
    }
}

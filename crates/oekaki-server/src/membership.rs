//! Leaving, the disband countdown and idle room expiry.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use oekaki_core::feed::Change;
use oekaki_core::ids::{MemberId, RoomId};
use oekaki_core::room::RoomStatus;
use oekaki_core::round::RoundStatus;

use crate::coordinator::{Coordinator, lock};
use crate::error::CoordinatorError;

/// What a leave did to the room, decided inside the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LeaveEffect {
    None,
    /// The host left; the room was force-ended.
    RoomFinished,
    /// Only the host remains of an unfinished room.
    Disband,
    /// The drawer left mid-round; the round was skipped.
    RoundSkipped,
}

impl Coordinator {
    /// Soft-remove `member_id` from `room_id`.
    ///
    /// A departing drawer skips the active round as if it timed out. A departing
    /// host ends the room. If a lobby or running game is left with only its
    /// host, a disband countdown starts.
    pub fn leave_room(&self, room_id: RoomId, member_id: MemberId) -> Result<(), CoordinatorError> {
        let now = self.now();
        let delay_secs = self.config().rooms.disband_delay_secs;
        let effect = self
            .store()
            .transaction(|txn| -> Result<_, CoordinatorError> {
                let room = txn
                    .room(room_id)
                    .cloned()
                    .ok_or(CoordinatorError::RoomNotFound)?;
                let mut member = txn
                    .member(member_id)
                    .cloned()
                    .ok_or(CoordinatorError::MemberNotFound)?;
                if member.room_id != room_id {
                    return Err(CoordinatorError::Forbidden);
                }
                if !member.is_active() {
                    return Ok(LeaveEffect::None);
                }
                let before = txn.active_members(room_id).len();
                member.left_at = Some(now);
                txn.update_member(member.clone())?;
                txn.touch_room(room_id, now);

                let mut rotation = txn.rotation(room_id);
                if rotation.undrawn.remove(&member_id) {
                    txn.set_rotation(room_id, rotation);
                }

                if room.status == RoomStatus::Finished {
                    return Ok(LeaveEffect::None);
                }
                if member.is_host {
                    self.finish_room_in(txn, room, now)?;
                    return Ok(LeaveEffect::RoomFinished);
                }

                let mut effect = LeaveEffect::None;
                if room.status == RoomStatus::InProgress
                    && let Some(mut round) = txn.latest_round(room_id).cloned()
                    && round.status == RoundStatus::Active
                    && round.drawer == Some(member_id)
                {
                    round.status = RoundStatus::Skipped;
                    round.ended_at = Some(now);
                    txn.update_round(round.clone())?;
                    if self.conclude_round(txn, &room, &round, now)?
                        == crate::scheduler::Conclusion::RoomFinished
                    {
                        return Ok(LeaveEffect::RoomFinished);
                    }
                    effect = LeaveEffect::RoundSkipped;
                }

                let remaining = txn.active_members(room_id);
                if before >= 2 && remaining.len() == 1 && remaining[0].is_host {
                    txn.emit(
                        room_id,
                        Change::Disbanding {
                            seconds: u32::try_from(delay_secs).unwrap_or(u32::MAX),
                        },
                    );
                    return Ok(LeaveEffect::Disband);
                }
                Ok(effect)
            })?;

        tracing::info!(room = %room_id, member = %member_id, effect = ?effect, "Member left");
        match effect {
            LeaveEffect::None => {},
            LeaveEffect::RoomFinished => self.after_finish(room_id),
            LeaveEffect::RoundSkipped => self.wake_driver(room_id),
            LeaveEffect::Disband => {
                self.wake_driver(room_id);
                self.begin_disband(room_id, Duration::from_secs(delay_secs));
            },
        }
        Ok(())
    }

    fn begin_disband(&self, room_id: RoomId, delay: Duration) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(room = %room_id, "No tokio runtime, disbanding immediately");
            self.complete_disband(room_id);
            return;
        };
        let token = CancellationToken::new();
        if let Some(previous) = lock(&self.inner.disbands).insert(room_id, token.clone()) {
            previous.cancel();
        }
        tracing::info!(room = %room_id, delay_secs = delay.as_secs(), "Disband countdown started");
        let coordinator = self.clone();
        let shutdown = self.inner.shutdown.clone();
        runtime.spawn(async move {
            tokio::select! {
                () = token.cancelled() => {
                    tracing::debug!(room = %room_id, "Disband countdown cancelled");
                },
                () = shutdown.cancelled() => {},
                () = tokio::time::sleep(delay) => {
                    lock(&coordinator.inner.disbands).remove(&room_id);
                    coordinator.complete_disband(room_id);
                },
            }
        });
    }

    /// Force-end the room if it is still down to its host.
    fn complete_disband(&self, room_id: RoomId) {
        let now = self.now();
        let result = self
            .store()
            .transaction(|txn| -> Result<_, CoordinatorError> {
                let Some(room) = txn.room(room_id).cloned() else {
                    return Ok(false);
                };
                let active = txn.active_members(room_id);
                let host_alone = active.len() == 1 && active[0].is_host;
                if room.status == RoomStatus::Finished || !host_alone {
                    return Ok(false);
                }
                self.finish_room_in(txn, room, now)?;
                Ok(true)
            });
        match result {
            Ok(true) => {
                tracing::info!(room = %room_id, "Room disbanded");
                self.after_finish(room_id);
            },
            Ok(false) => tracing::debug!(room = %room_id, "Disband no longer applies"),
            Err(e) => tracing::warn!(room = %room_id, error = %e, "Disband failed"),
        }
    }

    /// Cancel a pending disband because somebody joined; tells subscribers.
    pub(crate) fn cancel_disband(&self, room_id: RoomId) {
        if !self.cancel_disband_silently(room_id) {
            return;
        }
        let _ = self.store().transaction(|txn| {
            txn.emit(room_id, Change::DisbandCancelled);
            Ok::<_, CoordinatorError>(())
        });
        tracing::info!(room = %room_id, "Disband cancelled by a new member");
    }

    pub(crate) fn cancel_disband_silently(&self, room_id: RoomId) -> bool {
        match lock(&self.inner.disbands).remove(&room_id) {
            Some(token) => {
                token.cancel();
                true
            },
            None => false,
        }
    }

    /// Delete rooms idle past the configured timeout. Returns the deleted ids.
    pub fn expire_idle(&self) -> Vec<RoomId> {
        let now = self.now();
        let timeout = Duration::from_secs(self.config().rooms.idle_timeout_secs);
        let expired = self
            .store()
            .transaction(|txn| {
                let stale: Vec<RoomId> = txn
                    .rooms()
                    .filter(|r| now.since(r.updated_at) >= timeout)
                    .map(|r| r.id)
                    .collect();
                for id in &stale {
                    txn.delete_room(*id);
                }
                Ok::<_, CoordinatorError>(stale)
            })
            .unwrap_or_default();
        for id in &expired {
            self.cancel_disband_silently(*id);
            self.wake_driver(*id);
            tracing::info!(room = %id, "Idle room expired");
        }
        expired
    }

    /// Periodically run [`Coordinator::expire_idle`] until shutdown.
    pub fn spawn_idle_sweeper(&self) {
        let coordinator = self.clone();
        let interval = Duration::from_secs(self.config().rooms.idle_check_interval_secs);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let expired = coordinator.expire_idle();
                        if !expired.is_empty() {
                            tracing::info!(count = expired.len(), "Idle sweep removed rooms");
                        }
                    },
                    () = coordinator.inner.shutdown.cancelled() => break,
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use oekaki_core::feed::Change;
    use oekaki_core::room::RoomStatus;
    use oekaki_core::round::RoundStatus;

    use crate::coordinator::test_support::*;
    use crate::error::CoordinatorError;

    #[test]
    fn leave_is_a_soft_removal() {
        let h = harness();
        let (alice, bob) = panda_lobby(&h, 3);
        h.coordinator
            .join_room("panda", join_request("carol"))
            .unwrap();
        h.coordinator.leave_room(alice.room.id, bob.member.id).unwrap();
        let member = h
            .coordinator
            .store()
            .read(|txn| txn.member(bob.member.id).cloned())
            .unwrap();
        assert!(member.left_at.is_some());
        let state = h.coordinator.room_state(alice.room.id, alice.member.id).unwrap();
        assert_eq!(state.members.len(), 2);
        assert_eq!(state.room.status, RoomStatus::Lobby);

        // The username is free again.
        assert!(h.coordinator.join_room("panda", join_request("bob")).is_ok());
    }

    #[test]
    fn leaving_twice_is_harmless() {
        let h = harness();
        let (alice, bob) = panda_lobby(&h, 3);
        h.coordinator.leave_room(alice.room.id, bob.member.id).unwrap();
        h.coordinator.leave_room(alice.room.id, bob.member.id).unwrap();
    }

    #[test]
    fn host_leaving_ends_the_room() {
        let h = harness();
        let (alice, _) = panda_lobby(&h, 3);
        h.coordinator
            .leave_room(alice.room.id, alice.member.id)
            .unwrap();
        let room = h.coordinator.lookup_room("panda").unwrap();
        assert_eq!(room.status, RoomStatus::Finished);
    }

    #[test]
    fn member_of_another_room_cannot_leave_this_one() {
        let h = harness();
        let (alice, _) = panda_lobby(&h, 3);
        let other = h
            .coordinator
            .create_room(create_request("koala", "carol", 1))
            .unwrap();
        assert_eq!(
            h.coordinator.leave_room(alice.room.id, other.member.id),
            Err(CoordinatorError::Forbidden)
        );
    }

    #[test]
    fn drawer_leaving_skips_the_round() {
        let h = harness();
        let (alice, _) = panda_lobby(&h, 3);
        h.coordinator
            .join_room("panda", join_request("carol"))
            .unwrap();
        let room_id = alice.room.id;
        let mut round = h.coordinator.start_game(room_id, alice.member.id).unwrap();
        if round.drawer == Some(alice.member.id) {
            // Drawers never repeat back to back, so round 2 belongs to a guest.
            h.advance(Duration::from_secs(60));
            h.coordinator.advance_round(room_id).unwrap();
            h.advance(Duration::from_secs(5));
            h.coordinator.advance_round(room_id).unwrap();
            round = h
                .coordinator
                .room_state(room_id, alice.member.id)
                .unwrap()
                .current_round
                .unwrap();
        }
        let drawer = round.drawer.unwrap();
        assert_ne!(drawer, alice.member.id);

        h.coordinator.leave_room(room_id, drawer).unwrap();
        let skipped = h
            .coordinator
            .store()
            .read(|txn| txn.round(round.id).cloned())
            .unwrap();
        assert_eq!(skipped.status, RoundStatus::Skipped);
        let state = h.coordinator.room_state(room_id, alice.member.id).unwrap();
        assert_eq!(state.current_round.unwrap().number, round.number + 1);
        assert_eq!(state.room.status, RoomStatus::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn host_left_alone_is_disbanded_after_countdown() {
        let h = harness();
        let (alice, bob) = panda_lobby(&h, 3);
        let room_id = alice.room.id;
        h.coordinator.start_game(room_id, alice.member.id).unwrap();
        let mut feed = h.coordinator.subscribe();

        h.coordinator.leave_room(room_id, bob.member.id).unwrap();
        let mut saw_countdown = false;
        while let Ok(event) = feed.try_recv() {
            if let Change::Disbanding { seconds } = event.change {
                assert_eq!(seconds, 5);
                saw_countdown = true;
            }
        }
        assert!(saw_countdown);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(
            h.coordinator.lookup_room("panda").unwrap().status,
            RoomStatus::InProgress
        );
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            h.coordinator.lookup_room("panda").unwrap().status,
            RoomStatus::Finished
        );
        assert!(h.coordinator.session_history(room_id).unwrap().completed);
    }

    #[tokio::test(start_paused = true)]
    async fn host_left_alone_in_lobby_is_disbanded() {
        let h = harness();
        let (alice, bob) = panda_lobby(&h, 3);
        let room_id = alice.room.id;
        let mut feed = h.coordinator.subscribe();

        h.coordinator.leave_room(room_id, bob.member.id).unwrap();
        let mut saw_countdown = false;
        while let Ok(event) = feed.try_recv() {
            if let Change::Disbanding { seconds } = event.change {
                assert_eq!(seconds, 5);
                saw_countdown = true;
            }
        }
        assert!(saw_countdown);
        assert_eq!(
            h.coordinator.lookup_room("panda").unwrap().status,
            RoomStatus::Lobby
        );

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(
            h.coordinator.lookup_room("panda").unwrap().status,
            RoomStatus::Finished
        );
    }

    #[tokio::test(start_paused = true)]
    async fn join_in_lobby_cancels_the_countdown() {
        let h = harness();
        let (alice, bob) = panda_lobby(&h, 3);
        h.coordinator.leave_room(alice.room.id, bob.member.id).unwrap();
        h.coordinator
            .join_room("panda", join_request("carol"))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            h.coordinator.lookup_room("panda").unwrap().status,
            RoomStatus::Lobby
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejoin_cancels_the_countdown() {
        let h = harness_with(|c| c.rooms.allow_join_in_progress = true);
        let (alice, bob) = panda_lobby(&h, 3);
        let room_id = alice.room.id;
        h.coordinator.start_game(room_id, alice.member.id).unwrap();
        h.coordinator.leave_room(room_id, bob.member.id).unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        h.coordinator
            .join_room("panda", join_request("bob"))
            .unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            h.coordinator.lookup_room("panda").unwrap().status,
            RoomStatus::InProgress
        );
    }

    #[test]
    fn idle_rooms_expire_with_cascade() {
        let h = harness();
        let (alice, bob) = panda_lobby(&h, 3);
        h.advance(Duration::from_secs(3599));
        assert!(h.coordinator.expire_idle().is_empty());
        h.advance(Duration::from_secs(1));
        assert_eq!(h.coordinator.expire_idle(), vec![alice.room.id]);
        assert_eq!(
            h.coordinator.lookup_room("panda"),
            Err(CoordinatorError::RoomNotFound)
        );
        assert_eq!(
            h.coordinator.authenticate(Some(&bob.token)),
            Err(CoordinatorError::Unauthorized)
        );
        assert_eq!(h.coordinator.stats().active_members, 0);
    }
}

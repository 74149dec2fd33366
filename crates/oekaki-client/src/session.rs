//! Per-client room view, rebuilt from every authoritative snapshot.

use std::time::Duration;

use tokio::time::Instant;

use oekaki_core::ids::{MemberId, RoomId, RoundId};
use oekaki_core::member::Member;
use oekaki_core::net::messages::{ConcludedRound, RoomStateView, SessionResponse};
use oekaki_core::round::Round;
use oekaki_core::time::Timestamp;

use crate::timer::LocalRoundTimer;

/// Everything one client knows about the room it sits in: the last authoritative
/// snapshot, the local countdown and the suppression window.
#[derive(Debug)]
pub struct ClientSession {
    pub room_id: RoomId,
    pub member: Member,
    pub token: String,
    view: Option<RoomStateView>,
    last_round: Option<RoundId>,
    reported: Option<RoundId>,
    suppressed_until: Option<Instant>,
    pub(crate) timer: LocalRoundTimer,
}

/// What changed when a fresh snapshot was applied.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ViewDelta {
    /// The latest round is a different one than before.
    pub new_round: bool,
    /// The round that just concluded, if this snapshot is the first to show it so.
    pub concluded: Option<ConcludedRound>,
}

impl ClientSession {
    pub fn new(session: SessionResponse) -> Self {
        Self {
            room_id: session.room.id,
            member: session.member,
            token: session.token,
            view: None,
            last_round: None,
            reported: None,
            suppressed_until: None,
            timer: LocalRoundTimer::default(),
        }
    }

    pub fn member_id(&self) -> MemberId {
        self.member.id
    }

    pub fn is_host(&self) -> bool {
        self.member.is_host
    }

    pub fn view(&self) -> Option<&RoomStateView> {
        self.view.as_ref()
    }

    pub fn active_round(&self) -> Option<&Round> {
        self.view.as_ref()?.active_round()
    }

    pub fn is_drawer(&self) -> bool {
        self.active_round()
            .is_some_and(|r| r.drawer == Some(self.member.id))
    }

    pub fn countdown(&self) -> Option<Duration> {
        self.timer.remaining()
    }

    /// Replace the snapshot and bring the countdown in line with it. A result
    /// already concluded before the first snapshot is not reported.
    pub fn apply(&mut self, view: RoomStateView, now: Timestamp) -> ViewDelta {
        let latest = view.current_round.as_ref().map(|r| r.id);
        let mut delta = ViewDelta {
            new_round: latest != self.last_round,
            concluded: None,
        };
        if let Some(result) = &view.last_result
            && self.reported != Some(result.round.id)
        {
            if self.view.is_some() {
                delta.concluded = Some(result.clone());
            }
            self.reported = Some(result.round.id);
        }

        match view.active_round() {
            Some(round) => self.timer.arm(round, view.room.round_duration(), now),
            None => self.timer.cancel(),
        }
        self.last_round = latest;
        self.view = Some(view);
        delta
    }

    pub fn suppress_until(&mut self, until: Instant) {
        self.suppressed_until = Some(until);
    }

    pub fn suppressed_until(&self) -> Option<Instant> {
        self.suppressed_until
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed_until.is_some_and(|until| Instant::now() < until)
    }

    pub fn end_suppression(&mut self) {
        self.suppressed_until = None;
    }
}

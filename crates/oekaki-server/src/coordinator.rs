//! The game session coordinator.
//!
//! Operations are split by concern across `registry`, `membership`, `scheduler`,
//! `arbiter`, `ledger` and `archive`; each is an `impl Coordinator` block. Every
//! mutating operation is a single store transaction.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tokio::sync::{Notify, broadcast};
use tokio_util::sync::CancellationToken;

use oekaki_core::feed::FeedEvent;
use oekaki_core::ids::{MemberId, RoomId};
use oekaki_core::member::Member;
use oekaki_core::net::messages::{ConcludedRound, RoomStateView};
use oekaki_core::prompt::PromptView;
use oekaki_core::time::{Clock, SystemClock, Timestamp};

use crate::config::ServerConfig;
use crate::error::CoordinatorError;
use crate::prompts::PromptCatalog;
use crate::store::{MemoryStore, StoreStats};

pub(crate) struct Inner {
    pub(crate) store: MemoryStore,
    pub(crate) config: Arc<ServerConfig>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) prompts: PromptCatalog,
    rng: Mutex<StdRng>,
    /// Wake handles of the running round drivers.
    pub(crate) drivers: Mutex<HashMap<RoomId, Arc<Notify>>>,
    /// Pending disband countdowns.
    pub(crate) disbands: Mutex<HashMap<RoomId, CancellationToken>>,
    /// Rooms this process has fully archived.
    pub(crate) archived: Mutex<HashSet<RoomId>>,
    pub(crate) shutdown: CancellationToken,
}

/// Cheap to clone; all clones share one store.
#[derive(Clone)]
pub struct Coordinator {
    pub(crate) inner: Arc<Inner>,
}

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Coordinator {
    pub fn new(config: ServerConfig) -> Self {
        let prompts = PromptCatalog::load(&config.prompts);
        Self::with_parts(config, Arc::new(SystemClock), prompts, StdRng::from_os_rng())
    }

    /// Build a coordinator with an explicit clock, catalog and random source.
    pub fn with_parts(
        config: ServerConfig,
        clock: Arc<dyn Clock>,
        prompts: PromptCatalog,
        rng: StdRng,
    ) -> Self {
        let store = MemoryStore::new(config.limits.broadcast_capacity);
        Self {
            inner: Arc::new(Inner {
                store,
                config: Arc::new(config),
                clock,
                prompts,
                rng: Mutex::new(rng),
                drivers: Mutex::new(HashMap::new()),
                disbands: Mutex::new(HashMap::new()),
                archived: Mutex::new(HashSet::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub(crate) fn store(&self) -> &MemoryStore {
        &self.inner.store
    }

    pub(crate) fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    pub(crate) fn rng(&self) -> MutexGuard<'_, StdRng> {
        lock(&self.inner.rng)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.store.subscribe()
    }

    pub fn stats(&self) -> StoreStats {
        self.inner.store.stats()
    }

    pub fn prompt_count(&self) -> usize {
        self.inner.prompts.len()
    }

    /// Stop background drivers and pending countdowns.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }

    /// Resolve a bearer token to the member it was issued to.
    pub fn authenticate(&self, token: Option<&str>) -> Result<Member, CoordinatorError> {
        let token = token.ok_or(CoordinatorError::Unauthorized)?;
        self.store().read(|txn| {
            let (_, member_id) = txn.session(token).ok_or(CoordinatorError::Unauthorized)?;
            txn.member(member_id)
                .cloned()
                .ok_or(CoordinatorError::Unauthorized)
        })
    }

    /// Authoritative snapshot of `room_id` as seen by `viewer`.
    pub fn room_state(
        &self,
        room_id: RoomId,
        viewer: MemberId,
    ) -> Result<RoomStateView, CoordinatorError> {
        self.store().read(|txn| {
            let room = txn.room(room_id).ok_or(CoordinatorError::RoomNotFound)?;
            let viewer = txn.member(viewer).ok_or(CoordinatorError::MemberNotFound)?;
            if viewer.room_id != room_id {
                return Err(CoordinatorError::Forbidden);
            }
            let current_round = txn.latest_round(room_id).cloned();
            let prompt = current_round.as_ref().and_then(|round| {
                let prompt = self.inner.prompts.get(round.prompt?)?;
                // The answer is revealed to everyone once the round is over.
                let sees_word = round.status.is_concluded() || round.drawer == Some(viewer.id);
                Some(PromptView::for_viewer(prompt, sees_word))
            });
            let last_result = txn
                .rounds_of(room_id)
                .into_iter()
                .rev()
                .find(|round| round.status.is_concluded())
                .map(|round| ConcludedRound {
                    round: round.clone(),
                    answer: round
                        .prompt
                        .and_then(|id| self.inner.prompts.get(id))
                        .map(|p| p.word.clone()),
                });
            Ok(RoomStateView {
                room: room.clone(),
                members: txn.active_members(room_id).into_iter().cloned().collect(),
                current_round,
                prompt,
                scores: Self::score_table(txn, room_id),
                stroke_channel: room.stroke_channel(),
                last_result,
            })
        })
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn authenticate_resolves_issued_tokens_only() {
        let h = harness();
        let (alice, _) = panda_lobby(&h, 3);
        let member = h.coordinator.authenticate(Some(&alice.token)).unwrap();
        assert_eq!(member.id, alice.member.id);
        assert_eq!(
            h.coordinator.authenticate(Some("nope")),
            Err(CoordinatorError::Unauthorized)
        );
        assert_eq!(
            h.coordinator.authenticate(None),
            Err(CoordinatorError::Unauthorized)
        );
    }

    #[test]
    fn only_the_drawer_sees_the_word() {
        let h = harness();
        let (alice, bob) = panda_lobby(&h, 3);
        let round = h
            .coordinator
            .start_game(alice.room.id, alice.member.id)
            .unwrap();
        let drawer = round.drawer.unwrap();
        let guesser = if drawer == alice.member.id {
            bob.member.id
        } else {
            alice.member.id
        };

        let as_drawer = h.coordinator.room_state(alice.room.id, drawer).unwrap();
        let as_guesser = h.coordinator.room_state(alice.room.id, guesser).unwrap();
        assert!(as_drawer.prompt.unwrap().word.is_some());
        let hidden = as_guesser.prompt.unwrap();
        assert!(hidden.word.is_none());
        assert!(hidden.length > 0);
        assert_eq!(as_guesser.stroke_channel, format!("room:{}", alice.room.id));
        assert_eq!(as_guesser.members.len(), 2);
    }

    #[test]
    fn last_result_survives_the_next_round_being_queued() {
        let h = harness();
        let (alice, bob) = panda_lobby(&h, 3);
        let room_id = alice.room.id;
        let round = h.coordinator.start_game(room_id, alice.member.id).unwrap();
        let guesser = if round.drawer == Some(alice.member.id) {
            bob.member.id
        } else {
            alice.member.id
        };
        assert!(h
            .coordinator
            .room_state(room_id, guesser)
            .unwrap()
            .last_result
            .is_none());

        let word = h
            .coordinator
            .inner
            .prompts
            .get(round.prompt.unwrap())
            .unwrap()
            .word
            .clone();
        h.coordinator.submit_guess(round.id, guesser, &word).unwrap();

        let view = h.coordinator.room_state(room_id, guesser).unwrap();
        assert_eq!(view.current_round.unwrap().number, 2);
        let result = view.last_result.unwrap();
        assert_eq!(result.round.id, round.id);
        assert_eq!(result.answer.as_deref(), Some(word.as_str()));
    }

    #[test]
    fn members_of_other_rooms_cannot_view_state() {
        let h = harness();
        let (alice, _) = panda_lobby(&h, 3);
        let other = h
            .coordinator
            .create_room(create_request("koala", "carol", 1))
            .unwrap();
        assert_eq!(
            h.coordinator.room_state(alice.room.id, other.member.id),
            Err(CoordinatorError::Forbidden)
        );
    }
}

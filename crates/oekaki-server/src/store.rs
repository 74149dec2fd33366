//! In-memory transactional store.
//!
//! Every coordinator operation runs as one closure under [`MemoryStore::transaction`].
//! Transactions are serialized. Each write records the prior value of the row it
//! touches in an undo log that is replayed backwards if the closure returns `Err`.
//! Unique indexes and status transitions are checked on every insert or update.
//! Row changes are buffered and published on the change feed only after the
//! closure commits.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::Hash;
use std::sync::{Mutex, PoisonError};

use tokio::sync::broadcast;

use oekaki_core::feed::{Change, FeedEvent};
use oekaki_core::guess::Guess;
use oekaki_core::history::{ParticipantRecord, RoundSnapshot, SessionHistory, SessionSummary};
use oekaki_core::ids::{MemberId, PromptId, RoomId, RoundId};
use oekaki_core::member::Member;
use oekaki_core::room::{Room, RoomStatus};
use oekaki_core::round::{Round, RoundStatus};
use oekaki_core::time::Timestamp;

use crate::auth::PasswordHash;

/// Active room names are unique.
pub const ROOMS_NAME_KEY: &str = "rooms_name_key";
/// Active usernames are unique within a room (case-sensitive).
pub const MEMBERS_USERNAME_KEY: &str = "members_room_username_key";
/// Round numbers are unique within a room.
pub const ROUNDS_NUMBER_KEY: &str = "rounds_room_number_key";
/// At most one active round per room.
pub const ROUNDS_ACTIVE_KEY: &str = "rounds_room_active_key";
/// At most one winning guess per round.
pub const GUESSES_WINNER_KEY: &str = "guesses_round_winner_key";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    UniqueViolation(&'static str),
    NotFound(&'static str),
    /// A status update that the row's lifecycle does not allow.
    InvalidTransition(&'static str),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UniqueViolation(index) => write!(f, "unique violation on {index}"),
            Self::NotFound(table) => write!(f, "row not found in {table}"),
            Self::InvalidTransition(table) => write!(f, "invalid status transition in {table}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Per-room drawer rotation state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationState {
    pub undrawn: BTreeSet<MemberId>,
    pub last_drawer: Option<MemberId>,
}

/// Row counts for the health endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub rooms: usize,
    pub rooms_in_progress: usize,
    pub active_members: usize,
    pub active_rounds: usize,
    pub archived_sessions: usize,
    /// Sequence number of the last committed feed event.
    pub last_seq: u64,
}

#[derive(Debug, Default)]
struct Tables {
    rooms: HashMap<RoomId, Room>,
    credentials: HashMap<RoomId, PasswordHash>,
    members: HashMap<MemberId, Member>,
    rounds: HashMap<RoundId, Round>,
    /// Per room; insertion order is acceptance order.
    guesses: HashMap<RoomId, Vec<Guess>>,
    rotations: HashMap<RoomId, RotationState>,
    used_prompts: HashMap<RoomId, HashSet<PromptId>>,
    sessions: HashMap<String, (RoomId, MemberId)>,
    // Archive tables outlive the rooms they describe.
    summaries: HashMap<RoomId, SessionSummary>,
    participants: HashMap<RoomId, BTreeMap<MemberId, ParticipantRecord>>,
    snapshots: HashMap<RoomId, BTreeMap<u8, RoundSnapshot>>,
    archives_completed: HashSet<RoomId>,
}

/// Prior state of one row, recorded before a write.
#[derive(Debug)]
enum Undo {
    Room(RoomId, Option<Room>),
    Credential(RoomId, Option<PasswordHash>),
    Member(MemberId, Option<Member>),
    Round(RoundId, Option<Round>),
    GuessPushed(RoomId),
    Guesses(RoomId, Option<Vec<Guess>>),
    Rotation(RoomId, Option<RotationState>),
    UsedPrompts(RoomId, Option<HashSet<PromptId>>),
    Session(String, Option<(RoomId, MemberId)>),
    Summary(RoomId, Option<SessionSummary>),
    Participant(RoomId, MemberId, Option<ParticipantRecord>),
    Snapshot(RoomId, u8, Option<RoundSnapshot>),
    ArchiveCompleted(RoomId, bool),
}

fn restore<K: Hash + Eq, V>(map: &mut HashMap<K, V>, key: K, prior: Option<V>) {
    match prior {
        Some(value) => {
            map.insert(key, value);
        },
        None => {
            map.remove(&key);
        },
    }
}

fn restore_nested<K: Ord, V>(
    map: &mut HashMap<RoomId, BTreeMap<K, V>>,
    room: RoomId,
    key: K,
    prior: Option<V>,
) {
    let rows = map.entry(room).or_default();
    match prior {
        Some(value) => {
            rows.insert(key, value);
        },
        None => {
            rows.remove(&key);
        },
    }
    if rows.is_empty() {
        map.remove(&room);
    }
}

impl Undo {
    fn revert(self, tables: &mut Tables) {
        match self {
            Undo::Room(id, prior) => restore(&mut tables.rooms, id, prior),
            Undo::Credential(id, prior) => restore(&mut tables.credentials, id, prior),
            Undo::Member(id, prior) => restore(&mut tables.members, id, prior),
            Undo::Round(id, prior) => restore(&mut tables.rounds, id, prior),
            Undo::GuessPushed(room) => {
                if let Some(guesses) = tables.guesses.get_mut(&room) {
                    guesses.pop();
                    if guesses.is_empty() {
                        tables.guesses.remove(&room);
                    }
                }
            },
            Undo::Guesses(room, prior) => restore(&mut tables.guesses, room, prior),
            Undo::Rotation(room, prior) => restore(&mut tables.rotations, room, prior),
            Undo::UsedPrompts(room, prior) => restore(&mut tables.used_prompts, room, prior),
            Undo::Session(token, prior) => restore(&mut tables.sessions, token, prior),
            Undo::Summary(room, prior) => restore(&mut tables.summaries, room, prior),
            Undo::Participant(room, member, prior) => {
                restore_nested(&mut tables.participants, room, member, prior);
            },
            Undo::Snapshot(room, number, prior) => {
                restore_nested(&mut tables.snapshots, room, number, prior);
            },
            Undo::ArchiveCompleted(room, was_completed) => {
                if !was_completed {
                    tables.archives_completed.remove(&room);
                }
            },
        }
    }
}

struct Inner {
    tables: Tables,
    next_seq: u64,
}

pub struct MemoryStore {
    inner: Mutex<Inner>,
    feed: broadcast::Sender<FeedEvent>,
}

impl MemoryStore {
    pub fn new(broadcast_capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(broadcast_capacity);
        Self {
            inner: Mutex::new(Inner {
                tables: Tables::default(),
                next_seq: 0,
            }),
            feed,
        }
    }

    /// Subscribe to committed changes of every room.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.feed.subscribe()
    }

    /// Run `f` atomically. On `Err` every write made by `f` is rolled back and no
    /// change is published.
    pub fn transaction<T, E>(&self, f: impl FnOnce(&mut Txn<'_>) -> Result<T, E>) -> Result<T, E> {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Inner { tables, next_seq } = &mut *guard;
        let mut txn = Txn {
            tables,
            undo: Vec::new(),
            changes: Vec::new(),
        };
        match f(&mut txn) {
            Ok(value) => {
                for (room_id, change) in std::mem::take(&mut txn.changes) {
                    *next_seq += 1;
                    // No subscribers is fine.
                    let _ = self.feed.send(FeedEvent {
                        seq: *next_seq,
                        room_id,
                        change,
                    });
                }
                Ok(value)
            },
            Err(e) => {
                while let Some(undo) = txn.undo.pop() {
                    undo.revert(txn.tables);
                }
                Err(e)
            },
        }
    }

    /// Read-only access.
    pub fn read<T>(&self, f: impl FnOnce(&Txn<'_>) -> T) -> T {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let txn = Txn {
            tables: &mut guard.tables,
            undo: Vec::new(),
            changes: Vec::new(),
        };
        f(&txn)
    }

    pub fn stats(&self) -> StoreStats {
        let guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let tables = &guard.tables;
        StoreStats {
            rooms: tables.rooms.len(),
            rooms_in_progress: tables
                .rooms
                .values()
                .filter(|r| r.status == RoomStatus::InProgress)
                .count(),
            active_members: tables.members.values().filter(|m| m.is_active()).count(),
            active_rounds: tables
                .rounds
                .values()
                .filter(|r| r.status == RoundStatus::Active)
                .count(),
            archived_sessions: tables.archives_completed.len(),
            last_seq: guard.next_seq,
        }
    }
}

/// A view of the tables inside one transaction.
pub struct Txn<'a> {
    tables: &'a mut Tables,
    undo: Vec<Undo>,
    changes: Vec<(RoomId, Change)>,
}

impl Txn<'_> {
    fn put_room(&mut self, room: Room) {
        let prior = self.tables.rooms.insert(room.id, room.clone());
        self.undo.push(Undo::Room(room.id, prior));
    }

    fn put_member(&mut self, member: Member) {
        let prior = self.tables.members.insert(member.id, member.clone());
        self.undo.push(Undo::Member(member.id, prior));
    }

    fn put_round(&mut self, round: Round) {
        let prior = self.tables.rounds.insert(round.id, round.clone());
        self.undo.push(Undo::Round(round.id, prior));
    }

    /// Queue a feed event that has no row of its own.
    pub fn emit(&mut self, room_id: RoomId, change: Change) {
        self.changes.push((room_id, change));
    }

    // ---- rooms ----

    pub fn room(&self, id: RoomId) -> Option<&Room> {
        self.tables.rooms.get(&id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.tables.rooms.values()
    }

    pub fn active_room_by_name(&self, name: &str) -> Option<&Room> {
        self.tables
            .rooms
            .values()
            .find(|r| r.status.is_active() && r.name == name)
    }

    fn check_room_name(&self, room: &Room) -> Result<(), StoreError> {
        if room.status.is_active()
            && self
                .tables
                .rooms
                .values()
                .any(|r| r.id != room.id && r.status.is_active() && r.name == room.name)
        {
            return Err(StoreError::UniqueViolation(ROOMS_NAME_KEY));
        }
        Ok(())
    }

    pub fn insert_room(&mut self, room: Room, password: PasswordHash) -> Result<(), StoreError> {
        self.check_room_name(&room)?;
        let prior = self.tables.credentials.insert(room.id, password);
        self.undo.push(Undo::Credential(room.id, prior));
        self.put_room(room.clone());
        self.emit(room.id, Change::RoomUpdated(room));
        Ok(())
    }

    pub fn update_room(&mut self, room: Room) -> Result<(), StoreError> {
        let Some(stored) = self.tables.rooms.get(&room.id) else {
            return Err(StoreError::NotFound("rooms"));
        };
        if stored.status != room.status && !stored.status.can_transition_to(room.status) {
            return Err(StoreError::InvalidTransition("rooms"));
        }
        self.check_room_name(&room)?;
        self.put_room(room.clone());
        self.emit(room.id, Change::RoomUpdated(room));
        Ok(())
    }

    /// Record activity without publishing a change.
    pub fn touch_room(&mut self, id: RoomId, now: Timestamp) {
        if let Some(room) = self.tables.rooms.get_mut(&id) {
            let prior = room.clone();
            room.updated_at = now;
            self.undo.push(Undo::Room(id, Some(prior)));
        }
    }

    /// Delete a room and everything it owns. Archived history is kept.
    pub fn delete_room(&mut self, id: RoomId) -> bool {
        if !self.tables.rooms.contains_key(&id) {
            return false;
        }
        let tables = &mut *self.tables;
        let undo = &mut self.undo;
        undo.push(Undo::Room(id, tables.rooms.remove(&id)));
        undo.push(Undo::Credential(id, tables.credentials.remove(&id)));
        tables.members.retain(|member_id, m| {
            let keep = m.room_id != id;
            if !keep {
                undo.push(Undo::Member(*member_id, Some(m.clone())));
            }
            keep
        });
        tables.rounds.retain(|round_id, r| {
            let keep = r.room_id != id;
            if !keep {
                undo.push(Undo::Round(*round_id, Some(r.clone())));
            }
            keep
        });
        undo.push(Undo::Guesses(id, tables.guesses.remove(&id)));
        undo.push(Undo::Rotation(id, tables.rotations.remove(&id)));
        undo.push(Undo::UsedPrompts(id, tables.used_prompts.remove(&id)));
        tables.sessions.retain(|token, entry| {
            let keep = entry.0 != id;
            if !keep {
                undo.push(Undo::Session(token.clone(), Some(*entry)));
            }
            keep
        });
        self.emit(id, Change::RoomDeleted);
        true
    }

    pub fn credential(&self, room: RoomId) -> Option<&PasswordHash> {
        self.tables.credentials.get(&room)
    }

    // ---- members ----

    pub fn member(&self, id: MemberId) -> Option<&Member> {
        self.tables.members.get(&id)
    }

    /// Every member that ever joined `room`, in join order.
    pub fn members_of(&self, room: RoomId) -> Vec<&Member> {
        let mut members: Vec<&Member> = self
            .tables
            .members
            .values()
            .filter(|m| m.room_id == room)
            .collect();
        members.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| b.is_host.cmp(&a.is_host))
                .then_with(|| a.username.cmp(&b.username))
        });
        members
    }

    pub fn active_members(&self, room: RoomId) -> Vec<&Member> {
        let mut members = self.members_of(room);
        members.retain(|m| m.is_active());
        members
    }

    fn check_username(&self, member: &Member) -> Result<(), StoreError> {
        if member.is_active()
            && self.tables.members.values().any(|m| {
                m.id != member.id
                    && m.room_id == member.room_id
                    && m.is_active()
                    && m.username == member.username
            })
        {
            return Err(StoreError::UniqueViolation(MEMBERS_USERNAME_KEY));
        }
        Ok(())
    }

    pub fn insert_member(&mut self, member: Member) -> Result<(), StoreError> {
        self.check_username(&member)?;
        self.put_member(member.clone());
        self.emit(member.room_id, Change::MemberChanged(member));
        Ok(())
    }

    pub fn update_member(&mut self, member: Member) -> Result<(), StoreError> {
        if !self.tables.members.contains_key(&member.id) {
            return Err(StoreError::NotFound("members"));
        }
        self.check_username(&member)?;
        self.put_member(member.clone());
        self.emit(member.room_id, Change::MemberChanged(member));
        Ok(())
    }

    // ---- rounds ----

    pub fn round(&self, id: RoundId) -> Option<&Round> {
        self.tables.rounds.get(&id)
    }

    /// Rounds of `room` ordered by number.
    pub fn rounds_of(&self, room: RoomId) -> Vec<&Round> {
        let mut rounds: Vec<&Round> = self
            .tables
            .rounds
            .values()
            .filter(|r| r.room_id == room)
            .collect();
        rounds.sort_by_key(|r| r.number);
        rounds
    }

    pub fn latest_round(&self, room: RoomId) -> Option<&Round> {
        self.tables
            .rounds
            .values()
            .filter(|r| r.room_id == room)
            .max_by_key(|r| r.number)
    }

    fn check_round(&self, round: &Round) -> Result<(), StoreError> {
        for other in self.tables.rounds.values() {
            if other.id == round.id || other.room_id != round.room_id {
                continue;
            }
            if other.number == round.number {
                return Err(StoreError::UniqueViolation(ROUNDS_NUMBER_KEY));
            }
            if round.status == RoundStatus::Active && other.status == RoundStatus::Active {
                return Err(StoreError::UniqueViolation(ROUNDS_ACTIVE_KEY));
            }
        }
        Ok(())
    }

    pub fn insert_round(&mut self, round: Round) -> Result<(), StoreError> {
        self.check_round(&round)?;
        self.put_round(round.clone());
        self.emit(round.room_id, Change::RoundChanged(round));
        Ok(())
    }

    pub fn update_round(&mut self, round: Round) -> Result<(), StoreError> {
        let Some(stored) = self.tables.rounds.get(&round.id) else {
            return Err(StoreError::NotFound("rounds"));
        };
        if stored.status != round.status && !stored.status.can_transition_to(round.status) {
            return Err(StoreError::InvalidTransition("rounds"));
        }
        self.check_round(&round)?;
        self.put_round(round.clone());
        self.emit(round.room_id, Change::RoundChanged(round));
        Ok(())
    }

    // ---- guesses ----

    /// Guesses of one round in acceptance order.
    pub fn guesses_of_round(&self, round: RoundId) -> Vec<&Guess> {
        let in_room = self.tables.rounds.get(&round).map(|r| r.room_id);
        self.tables
            .guesses
            .iter()
            .filter(|(room, _)| in_room.is_none_or(|id| id == **room))
            .flat_map(|(_, guesses)| guesses)
            .filter(|g| g.round_id == round)
            .collect()
    }

    pub fn winning_guesses(&self, room: RoomId) -> Vec<&Guess> {
        self.tables
            .guesses
            .get(&room)
            .map(|guesses| guesses.iter().filter(|g| g.is_winner).collect())
            .unwrap_or_default()
    }

    pub fn insert_guess(&mut self, guess: Guess) -> Result<(), StoreError> {
        if guess.is_winner
            && self
                .tables
                .guesses
                .get(&guess.room_id)
                .is_some_and(|g| g.iter().any(|g| g.round_id == guess.round_id && g.is_winner))
        {
            return Err(StoreError::UniqueViolation(GUESSES_WINNER_KEY));
        }
        self.tables
            .guesses
            .entry(guess.room_id)
            .or_default()
            .push(guess.clone());
        self.undo.push(Undo::GuessPushed(guess.room_id));
        self.emit(guess.room_id, Change::GuessInserted(guess));
        Ok(())
    }

    // ---- rotation and prompts ----

    pub fn rotation(&self, room: RoomId) -> RotationState {
        self.tables.rotations.get(&room).cloned().unwrap_or_default()
    }

    pub fn set_rotation(&mut self, room: RoomId, state: RotationState) {
        let prior = self.tables.rotations.insert(room, state);
        self.undo.push(Undo::Rotation(room, prior));
    }

    pub fn used_prompts(&self, room: RoomId) -> HashSet<PromptId> {
        self.tables.used_prompts.get(&room).cloned().unwrap_or_default()
    }

    pub fn mark_prompt_used(&mut self, room: RoomId, prompt: PromptId) {
        let used = self.tables.used_prompts.entry(room).or_default();
        if !used.contains(&prompt) {
            let prior = (!used.is_empty()).then(|| used.clone());
            used.insert(prompt);
            self.undo.push(Undo::UsedPrompts(room, prior));
        }
    }

    pub fn reset_used_prompts(&mut self, room: RoomId) {
        let prior = self.tables.used_prompts.remove(&room);
        self.undo.push(Undo::UsedPrompts(room, prior));
    }

    // ---- sessions ----

    pub fn insert_session(&mut self, token: String, room: RoomId, member: MemberId) {
        let prior = self.tables.sessions.insert(token.clone(), (room, member));
        self.undo.push(Undo::Session(token, prior));
    }

    pub fn session(&self, token: &str) -> Option<(RoomId, MemberId)> {
        self.tables.sessions.get(token).copied()
    }

    // ---- archive ----

    pub fn summary(&self, room: RoomId) -> Option<&SessionSummary> {
        self.tables.summaries.get(&room)
    }

    /// Insert or replace the summary of `room`, keeping the session id of an
    /// earlier write.
    pub fn upsert_summary(&mut self, mut summary: SessionSummary) -> SessionSummary {
        if let Some(existing) = self.tables.summaries.get(&summary.room_id) {
            summary.session_id = existing.session_id;
            summary.archived_at = existing.archived_at;
        }
        let prior = self
            .tables
            .summaries
            .insert(summary.room_id, summary.clone());
        self.undo.push(Undo::Summary(summary.room_id, prior));
        summary
    }

    pub fn upsert_participant(&mut self, room: RoomId, record: ParticipantRecord) {
        let member = record.member_id;
        let prior = self
            .tables
            .participants
            .entry(room)
            .or_default()
            .insert(member, record);
        self.undo.push(Undo::Participant(room, member, prior));
    }

    pub fn upsert_snapshot(&mut self, room: RoomId, snapshot: RoundSnapshot) {
        let number = snapshot.number;
        let prior = self
            .tables
            .snapshots
            .entry(room)
            .or_default()
            .insert(number, snapshot);
        self.undo.push(Undo::Snapshot(room, number, prior));
    }

    pub fn mark_archive_completed(&mut self, room: RoomId) {
        let was_completed = !self.tables.archives_completed.insert(room);
        self.undo.push(Undo::ArchiveCompleted(room, was_completed));
    }

    pub fn is_archive_completed(&self, room: RoomId) -> bool {
        self.tables.archives_completed.contains(&room)
    }

    pub fn history(&self, room: RoomId) -> Option<SessionHistory> {
        let summary = self.tables.summaries.get(&room)?.clone();
        let participants = self
            .tables
            .participants
            .get(&room)
            .map(|p| p.values().cloned().collect())
            .unwrap_or_default();
        let rounds = self
            .tables
            .snapshots
            .get(&room)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default();
        Some(SessionHistory {
            summary,
            participants,
            rounds,
            completed: self.is_archive_completed(room),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oekaki_core::ids::GuessId;
    use oekaki_core::room::RoomStatus;
    use oekaki_core::test_helpers::{make_active_round, make_members, make_room};

    fn store() -> MemoryStore {
        MemoryStore::new(64)
    }

    fn seed_room(store: &MemoryStore, name: &str) -> Room {
        let room = make_room(name, Timestamp(0));
        store
            .transaction(|txn| txn.insert_room(room.clone(), PasswordHash::new("1234")))
            .unwrap();
        room
    }

    #[test]
    fn active_room_names_are_unique() {
        let store = store();
        seed_room(&store, "panda");
        let dup = make_room("panda", Timestamp(1));
        let err = store
            .transaction(|txn| txn.insert_room(dup, PasswordHash::new("x")))
            .unwrap_err();
        assert_eq!(err, StoreError::UniqueViolation(ROOMS_NAME_KEY));
    }

    #[test]
    fn finished_rooms_release_their_name() {
        let store = store();
        let mut room = seed_room(&store, "panda");
        room.status = RoomStatus::Finished;
        store.transaction(|txn| txn.update_room(room)).unwrap();
        let again = make_room("panda", Timestamp(1));
        assert!(
            store
                .transaction(|txn| txn.insert_room(again, PasswordHash::new("x")))
                .is_ok()
        );
    }

    #[test]
    fn failed_transaction_rolls_back_and_publishes_nothing() {
        let store = store();
        let mut rx = store.subscribe();
        let room = make_room("koala", Timestamp(0));
        let result: Result<(), StoreError> = store.transaction(|txn| {
            txn.insert_room(room.clone(), PasswordHash::new("1234"))?;
            Err(StoreError::NotFound("rollback"))
        });
        assert!(result.is_err());
        assert!(store.read(|txn| txn.room(room.id).is_none()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn rollback_restores_every_touched_row() {
        let store = store();
        let room = seed_room(&store, "panda");
        let members = make_members(&room, 2);
        let round = make_active_round(&room, 1, members[0].id, PromptId(1), Timestamp(0));
        let guess = Guess {
            id: GuessId::new(),
            room_id: room.id,
            round_id: round.id,
            member_id: members[1].id,
            content: "いぬ".into(),
            is_correct: false,
            is_winner: false,
            created_at: Timestamp(1),
        };
        store
            .transaction(|txn| {
                for m in &members {
                    txn.insert_member(m.clone())?;
                }
                txn.insert_round(round.clone())?;
                txn.insert_guess(guess.clone())?;
                txn.insert_session("tok".into(), room.id, members[0].id);
                txn.mark_prompt_used(room.id, PromptId(1));
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let result: Result<(), StoreError> = store.transaction(|txn| {
            txn.touch_room(room.id, Timestamp(99));
            let mut left = members[1].clone();
            left.left_at = Some(Timestamp(99));
            txn.update_member(left)?;
            txn.insert_guess(Guess {
                id: GuessId::new(),
                ..guess.clone()
            })?;
            txn.mark_prompt_used(room.id, PromptId(2));
            txn.set_rotation(room.id, RotationState::default());
            txn.mark_archive_completed(room.id);
            assert!(txn.delete_room(room.id));
            Err(StoreError::NotFound("rollback"))
        });
        assert!(result.is_err());

        store.read(|txn| {
            assert_eq!(txn.room(room.id).unwrap().updated_at, Timestamp(0));
            assert!(txn.credential(room.id).is_some());
            assert_eq!(txn.active_members(room.id).len(), 2);
            assert_eq!(txn.round(round.id), Some(&round));
            assert_eq!(txn.guesses_of_round(round.id), vec![&guess]);
            assert_eq!(txn.session("tok"), Some((room.id, members[0].id)));
            assert_eq!(txn.used_prompts(room.id), HashSet::from([PromptId(1)]));
            assert!(!txn.is_archive_completed(room.id));
        });
    }

    #[test]
    fn statuses_only_move_forward() {
        let store = store();
        let mut room = seed_room(&store, "panda");
        let round = make_active_round(&room, 1, room.host_member, PromptId(1), Timestamp(0));
        store.transaction(|txn| txn.insert_round(round.clone())).unwrap();

        let mut back = round.clone();
        back.status = RoundStatus::Pending;
        assert_eq!(
            store.transaction(|txn| txn.update_round(back)),
            Err(StoreError::InvalidTransition("rounds"))
        );
        let mut ended = round.clone();
        ended.status = RoundStatus::Ended;
        store.transaction(|txn| txn.update_round(ended.clone())).unwrap();
        // Same-status writes are plain field updates.
        ended.artifact_ref = Some("drawings/1.png".into());
        store.transaction(|txn| txn.update_round(ended.clone())).unwrap();
        ended.status = RoundStatus::Skipped;
        assert_eq!(
            store.transaction(|txn| txn.update_round(ended)),
            Err(StoreError::InvalidTransition("rounds"))
        );

        room.status = RoomStatus::Finished;
        store.transaction(|txn| txn.update_room(room.clone())).unwrap();
        room.status = RoomStatus::Lobby;
        assert_eq!(
            store.transaction(|txn| txn.update_room(room)),
            Err(StoreError::InvalidTransition("rooms"))
        );
    }

    #[test]
    fn committed_changes_are_published_in_order() {
        let store = store();
        let mut rx = store.subscribe();
        let room = seed_room(&store, "panda");
        let members = make_members(&room, 2);
        store
            .transaction(|txn| {
                for m in &members {
                    txn.insert_member(m.clone())?;
                }
                Ok::<_, StoreError>(())
            })
            .unwrap();

        let first = rx.try_recv().unwrap();
        assert!(matches!(first.change, Change::RoomUpdated(_)));
        let second = rx.try_recv().unwrap();
        let third = rx.try_recv().unwrap();
        assert!(first.seq < second.seq && second.seq < third.seq);
        assert_eq!(third.room_id, room.id);
    }

    #[test]
    fn usernames_unique_among_active_members_only() {
        let store = store();
        let room = seed_room(&store, "panda");
        let mut members = make_members(&room, 2);
        members[1].username = members[0].username.clone();
        store
            .transaction(|txn| txn.insert_member(members[0].clone()))
            .unwrap();
        let err = store
            .transaction(|txn| txn.insert_member(members[1].clone()))
            .unwrap_err();
        assert_eq!(err, StoreError::UniqueViolation(MEMBERS_USERNAME_KEY));

        let mut left = members[0].clone();
        left.left_at = Some(Timestamp(10));
        store.transaction(|txn| txn.update_member(left)).unwrap();
        assert!(
            store
                .transaction(|txn| txn.insert_member(members[1].clone()))
                .is_ok()
        );
    }

    #[test]
    fn usernames_are_case_sensitive() {
        let store = store();
        let room = seed_room(&store, "panda");
        let mut members = make_members(&room, 2);
        members[0].username = "Alice".into();
        members[1].username = "alice".into();
        for m in members {
            assert!(store.transaction(|txn| txn.insert_member(m)).is_ok());
        }
    }

    #[test]
    fn only_one_active_round_per_room() {
        let store = store();
        let room = seed_room(&store, "panda");
        let drawer = room.host_member;
        let r1 = make_active_round(&room, 1, drawer, PromptId(1), Timestamp(0));
        let r2 = make_active_round(&room, 2, drawer, PromptId(2), Timestamp(0));
        store.transaction(|txn| txn.insert_round(r1)).unwrap();
        let err = store.transaction(|txn| txn.insert_round(r2)).unwrap_err();
        assert_eq!(err, StoreError::UniqueViolation(ROUNDS_ACTIVE_KEY));
    }

    #[test]
    fn one_winner_per_round() {
        let store = store();
        let room = seed_room(&store, "panda");
        let round = make_active_round(&room, 1, room.host_member, PromptId(1), Timestamp(0));
        let guess = |winner| Guess {
            id: GuessId::new(),
            room_id: room.id,
            round_id: round.id,
            member_id: MemberId::new(),
            content: "ねこ".into(),
            is_correct: true,
            is_winner: winner,
            created_at: Timestamp(1),
        };
        store.transaction(|txn| txn.insert_guess(guess(true))).unwrap();
        let err = store
            .transaction(|txn| txn.insert_guess(guess(true)))
            .unwrap_err();
        assert_eq!(err, StoreError::UniqueViolation(GUESSES_WINNER_KEY));
        store.transaction(|txn| txn.insert_guess(guess(false))).unwrap();
        assert_eq!(store.read(|txn| txn.guesses_of_round(round.id).len()), 2);
    }

    #[test]
    fn delete_cascades_but_keeps_archive() {
        let store = store();
        let room = seed_room(&store, "panda");
        let members = make_members(&room, 2);
        let summary = SessionSummary {
            session_id: oekaki_core::ids::SessionId::new(),
            room_id: room.id,
            room_name: room.name.clone(),
            host_username: "player1".into(),
            rounds_total: 3,
            round_time_sec: 60,
            started_at: None,
            finished_at: Timestamp(5),
            archived_at: Timestamp(5),
        };
        store
            .transaction(|txn| {
                for m in &members {
                    txn.insert_member(m.clone())?;
                }
                txn.insert_session("tok".into(), room.id, members[0].id);
                txn.upsert_summary(summary.clone());
                Ok::<_, StoreError>(())
            })
            .unwrap();

        assert!(store.transaction(|txn| Ok::<_, StoreError>(txn.delete_room(room.id))).unwrap());
        store.read(|txn| {
            assert!(txn.room(room.id).is_none());
            assert!(txn.members_of(room.id).is_empty());
            assert!(txn.session("tok").is_none());
            assert!(txn.summary(room.id).is_some());
        });
        assert_eq!(store.stats().rooms, 0);
    }

    #[test]
    fn summary_upsert_keeps_session_id() {
        let store = store();
        let room_id = RoomId::new();
        let summary = |at| SessionSummary {
            session_id: oekaki_core::ids::SessionId::new(),
            room_id,
            room_name: "panda".into(),
            host_username: "alice".into(),
            rounds_total: 1,
            round_time_sec: 60,
            started_at: None,
            finished_at: Timestamp(at),
            archived_at: Timestamp(at),
        };
        let a = store
            .transaction(|txn| Ok::<_, StoreError>(txn.upsert_summary(summary(1))))
            .unwrap();
        let b = store
            .transaction(|txn| Ok::<_, StoreError>(txn.upsert_summary(summary(2))))
            .unwrap();
        assert_eq!(a.session_id, b.session_id);
        assert_eq!(b.archived_at, Timestamp(1));
    }
}

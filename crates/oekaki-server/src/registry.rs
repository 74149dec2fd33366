//! Room creation, lookup and joining.

use oekaki_core::ids::{MemberId, RoomId};
use oekaki_core::member::{Identity, MAX_USERNAME_CHARS, Member};
use oekaki_core::net::messages::{CreateRoomRequest, JoinRoomRequest, SessionResponse};
use oekaki_core::room::{MAX_ROOM_MEMBERS, Room, RoomStatus};

use crate::auth::{PasswordHash, new_session_token};
use crate::coordinator::Coordinator;
use crate::error::CoordinatorError;
use crate::store::{MEMBERS_USERNAME_KEY, ROOMS_NAME_KEY, StoreError, Txn};

pub const ROOM_NAME_CHARS: (usize, usize) = (2, 24);
pub const PASSWORD_CHARS: (usize, usize) = (4, 16);
pub const USERNAME_CHARS: (usize, usize) = (1, MAX_USERNAME_CHARS);

/// Trimmed value of a required text field.
fn required<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, CoordinatorError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(CoordinatorError::MissingParams(field)),
    }
}

fn check_chars(
    value: &str,
    (min, max): (usize, usize),
    field: &'static str,
) -> Result<(), CoordinatorError> {
    let n = value.chars().count();
    if n < min || n > max {
        return Err(CoordinatorError::InvalidInput(field));
    }
    Ok(())
}

fn identity(account: Option<&str>) -> Identity {
    match account.map(str::trim) {
        Some(a) if !a.is_empty() => Identity::Account(a.to_string()),
        _ => Identity::Anonymous,
    }
}

fn issue_session(txn: &mut Txn<'_>, room: RoomId, member: MemberId) -> String {
    let token = new_session_token();
    txn.insert_session(token.clone(), room, member);
    token
}

impl Coordinator {
    /// Create a room in the lobby together with its host member.
    pub fn create_room(&self, req: CreateRoomRequest) -> Result<SessionResponse, CoordinatorError> {
        let name = required(req.name.as_deref(), "name")?;
        let password = required(req.password.as_deref(), "password")?;
        let host_username = required(req.host_username.as_deref(), "host_username")?;
        let rounds_total = req
            .rounds_total
            .ok_or(CoordinatorError::MissingParams("rounds_total"))?;
        let round_time_sec = req
            .round_time_sec
            .ok_or(CoordinatorError::MissingParams("round_time_sec"))?;

        check_chars(name, ROOM_NAME_CHARS, "name")?;
        check_chars(password, PASSWORD_CHARS, "password")?;
        check_chars(host_username, USERNAME_CHARS, "host_username")?;

        let rounds_cfg = &self.config().rounds;
        let rounds_total = u8::try_from(rounds_total)
            .ok()
            .filter(|n| (1..=rounds_cfg.max_rounds).contains(n))
            .ok_or(CoordinatorError::InvalidInput("rounds_total"))?;
        let round_time_sec = u16::try_from(round_time_sec)
            .ok()
            .filter(|n| (rounds_cfg.min_round_time_sec..=rounds_cfg.max_round_time_sec).contains(n))
            .ok_or(CoordinatorError::InvalidInput("round_time_sec"))?;
        let max_players = match req.max_players {
            None => self.config().rooms.default_max_players,
            Some(n) => u8::try_from(n)
                .ok()
                .filter(|n| (2..=MAX_ROOM_MEMBERS).contains(n))
                .ok_or(CoordinatorError::InvalidInput("max_players"))?,
        };

        let now = self.now();
        let host_id = MemberId::new();
        let room = Room {
            id: RoomId::new(),
            name: name.to_string(),
            status: RoomStatus::Lobby,
            rounds_total,
            round_time_sec,
            max_players,
            host_member: host_id,
            scoring: self.config().scoring.rule(),
            created_at: now,
            started_at: None,
            finished_at: None,
            updated_at: now,
        };
        let host = Member {
            id: host_id,
            room_id: room.id,
            identity: identity(req.account.as_deref()),
            username: host_username.to_string(),
            is_host: true,
            joined_at: now,
            left_at: None,
        };
        let credential = PasswordHash::new(password);

        let token = self.store().transaction(|txn| -> Result<_, CoordinatorError> {
            // The unique index decides; there is no prior existence check.
            txn.insert_room(room.clone(), credential)
                .map_err(|e| match e {
                    StoreError::UniqueViolation(ROOMS_NAME_KEY) => CoordinatorError::RoomNameTaken,
                    other => other.into(),
                })?;
            txn.insert_member(host.clone())?;
            Ok(issue_session(txn, room.id, host.id))
        })?;

        tracing::info!(
            room = %room.id,
            name = %room.name,
            host = %host.username,
            rounds = room.rounds_total,
            round_time = room.round_time_sec,
            "Room created"
        );
        Ok(SessionResponse {
            room,
            member: host,
            token,
        })
    }

    /// Look up a room by name. An active room wins over finished ones.
    pub fn lookup_room(&self, name: &str) -> Result<Room, CoordinatorError> {
        let name = name.trim();
        self.store()
            .read(|txn| Self::find_room_by_name(txn, name).cloned())
            .ok_or(CoordinatorError::RoomNotFound)
    }

    fn find_room_by_name<'t>(txn: &'t Txn<'_>, name: &str) -> Option<&'t Room> {
        txn.active_room_by_name(name).or_else(|| {
            txn.rooms()
                .filter(|r| r.name == name)
                .max_by_key(|r| r.created_at)
        })
    }

    /// Join an existing room as a guest.
    pub fn join_room(
        &self,
        name: &str,
        req: JoinRoomRequest,
    ) -> Result<SessionResponse, CoordinatorError> {
        let name = required(Some(name), "name")?;
        let password = required(req.password.as_deref(), "password")?;
        let username = required(req.username.as_deref(), "username")?;
        check_chars(username, USERNAME_CHARS, "username")?;
        let identity = identity(req.account.as_deref());
        let allow_in_progress = self.config().rooms.allow_join_in_progress;
        let now = self.now();

        let (room, member, token) = self.store().transaction(|txn| -> Result<_, CoordinatorError> {
            let room = Self::find_room_by_name(txn, name)
                .cloned()
                .ok_or(CoordinatorError::RoomNotFound)?;
            let credential = txn.credential(room.id).ok_or(CoordinatorError::RoomNotFound)?;
            if !credential.verify(password) {
                return Err(CoordinatorError::InvalidPassword);
            }
            match room.status {
                RoomStatus::Lobby => {},
                RoomStatus::InProgress if allow_in_progress => {},
                RoomStatus::InProgress | RoomStatus::Finished => {
                    return Err(CoordinatorError::RoomNotJoinable);
                },
            }

            let active = txn.active_members(room.id);
            if active.len() >= usize::from(room.max_players) {
                return Err(CoordinatorError::RoomFull);
            }
            if let Identity::Account(account) = &identity
                && active
                    .iter()
                    .any(|m| matches!(&m.identity, Identity::Account(a) if a == account))
            {
                // One seat per account.
                return Err(CoordinatorError::Forbidden);
            }

            let member = Member {
                id: MemberId::new(),
                room_id: room.id,
                identity: identity.clone(),
                username: username.to_string(),
                is_host: false,
                joined_at: now,
                left_at: None,
            };
            txn.insert_member(member.clone()).map_err(|e| match e {
                StoreError::UniqueViolation(MEMBERS_USERNAME_KEY) => {
                    CoordinatorError::DuplicateUsername
                },
                other => other.into(),
            })?;

            if room.status == RoomStatus::InProgress {
                // Late joiners draw within the current cycle.
                let mut rotation = txn.rotation(room.id);
                rotation.undrawn.insert(member.id);
                txn.set_rotation(room.id, rotation);
            }
            txn.touch_room(room.id, now);
            let token = issue_session(txn, room.id, member.id);
            Ok((room, member, token))
        })?;

        tracing::info!(
            room = %room.id,
            member = %member.id,
            username = %member.username,
            "Member joined"
        );
        self.cancel_disband(room.id);
        Ok(SessionResponse {
            room,
            member,
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::coordinator::test_support::*;
    use crate::error::CoordinatorError;

    #[test]
    fn create_puts_room_in_lobby_with_host() {
        let h = harness();
        let resp = h
            .coordinator
            .create_room(create_request("panda", "alice", 3))
            .unwrap();
        assert_eq!(resp.room.status, oekaki_core::room::RoomStatus::Lobby);
        assert_eq!(resp.room.rounds_total, 3);
        assert_eq!(resp.room.round_time_sec, 60);
        assert_eq!(resp.room.max_players, 20);
        assert!(resp.member.is_host);
        assert_eq!(resp.room.host_member, resp.member.id);
        assert_eq!(h.coordinator.lookup_room("panda").unwrap().id, resp.room.id);
    }

    #[test]
    fn duplicate_name_is_taken() {
        let h = harness();
        h.coordinator
            .create_room(create_request("panda", "alice", 3))
            .unwrap();
        let err = h
            .coordinator
            .create_room(create_request("panda", "zed", 1))
            .unwrap_err();
        assert_eq!(err, CoordinatorError::RoomNameTaken);
    }

    #[test]
    fn concurrent_creates_have_exactly_one_winner() {
        let h = harness();
        let coordinator = h.coordinator.clone();
        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let c = coordinator.clone();
                    s.spawn(move || c.create_room(create_request("panda", &format!("host{i}"), 3)))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let taken = results
            .iter()
            .filter(|r| matches!(r, Err(CoordinatorError::RoomNameTaken)))
            .count();
        assert_eq!(ok, 1);
        assert_eq!(taken, 7);
    }

    #[test]
    fn missing_and_invalid_params() {
        let h = harness();
        let mut req = create_request("panda", "alice", 3);
        req.password = Some("   ".into());
        assert_eq!(
            h.coordinator.create_room(req),
            Err(CoordinatorError::MissingParams("password"))
        );

        let mut req = create_request("panda", "alice", 3);
        req.rounds_total = None;
        assert_eq!(
            h.coordinator.create_room(req),
            Err(CoordinatorError::MissingParams("rounds_total"))
        );

        let req = create_request("p", "alice", 3);
        assert_eq!(
            h.coordinator.create_room(req),
            Err(CoordinatorError::InvalidInput("name"))
        );

        let req = create_request("panda", "alice", 0);
        assert_eq!(
            h.coordinator.create_room(req),
            Err(CoordinatorError::InvalidInput("rounds_total"))
        );

        let mut req = create_request("panda", "alice", 3);
        req.round_time_sec = Some(5);
        assert_eq!(
            h.coordinator.create_room(req),
            Err(CoordinatorError::InvalidInput("round_time_sec"))
        );

        let mut req = create_request("panda", "alice", 3);
        req.max_players = Some(21);
        assert_eq!(
            h.coordinator.create_room(req),
            Err(CoordinatorError::InvalidInput("max_players"))
        );
    }

    #[test]
    fn names_are_trimmed() {
        let h = harness();
        h.coordinator
            .create_room(create_request("  panda  ", "alice", 3))
            .unwrap();
        assert!(h.coordinator.lookup_room("panda").is_ok());
        assert_eq!(
            h.coordinator.lookup_room("koala"),
            Err(CoordinatorError::RoomNotFound)
        );
    }

    #[test]
    fn join_errors() {
        let h = harness();
        h.coordinator
            .create_room(create_request("panda", "alice", 3))
            .unwrap();

        assert_eq!(
            h.coordinator.join_room("koala", join_request("bob")),
            Err(CoordinatorError::RoomNotFound)
        );

        let mut wrong = join_request("bob");
        wrong.password = Some("0000".into());
        assert_eq!(
            h.coordinator.join_room("panda", wrong),
            Err(CoordinatorError::InvalidPassword)
        );

        assert_eq!(
            h.coordinator.join_room("panda", join_request("alice")),
            Err(CoordinatorError::DuplicateUsername)
        );

        let mut missing = join_request("bob");
        missing.username = None;
        assert_eq!(
            h.coordinator.join_room("panda", missing),
            Err(CoordinatorError::MissingParams("username"))
        );

        let long = "x".repeat(21);
        assert_eq!(
            h.coordinator.join_room("panda", join_request(&long)),
            Err(CoordinatorError::InvalidInput("username"))
        );
    }

    #[test]
    fn twenty_first_member_is_refused() {
        let h = harness();
        h.coordinator
            .create_room(create_request("panda", "host", 1))
            .unwrap();
        for i in 1..20 {
            h.coordinator
                .join_room("panda", join_request(&format!("guest{i}")))
                .unwrap();
        }
        assert_eq!(
            h.coordinator.join_room("panda", join_request("late")),
            Err(CoordinatorError::RoomFull)
        );
        assert_eq!(h.coordinator.stats().active_members, 20);
    }

    #[test]
    fn concurrent_joins_never_exceed_capacity() {
        let h = harness();
        let mut req = create_request("panda", "host", 1);
        req.max_players = Some(5);
        h.coordinator.create_room(req).unwrap();
        let joined = std::thread::scope(|s| {
            let handles: Vec<_> = (0..12)
                .map(|i| {
                    let c = h.coordinator.clone();
                    s.spawn(move || c.join_room("panda", join_request(&format!("g{i}"))).is_ok())
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or(false))
                .filter(|joined| *joined)
                .count()
        });
        assert_eq!(joined, 4);
    }

    #[test]
    fn join_after_start_follows_policy() {
        let h = harness();
        let (alice, _) = panda_lobby(&h, 3);
        h.coordinator
            .start_game(alice.room.id, alice.member.id)
            .unwrap();
        assert_eq!(
            h.coordinator.join_room("panda", join_request("carol")),
            Err(CoordinatorError::RoomNotJoinable)
        );

        let h = harness_with(|c| c.rooms.allow_join_in_progress = true);
        let (alice, _) = panda_lobby(&h, 3);
        h.coordinator
            .start_game(alice.room.id, alice.member.id)
            .unwrap();
        assert!(h.coordinator.join_room("panda", join_request("carol")).is_ok());
    }

    #[test]
    fn finished_rooms_are_not_joinable() {
        let h = harness_with(|c| c.rooms.allow_join_in_progress = true);
        let (alice, _) = panda_lobby(&h, 3);
        h.coordinator
            .end_game(alice.room.id, alice.member.id)
            .unwrap();
        assert_eq!(
            h.coordinator.join_room("panda", join_request("carol")),
            Err(CoordinatorError::RoomNotJoinable)
        );
    }

    #[test]
    fn one_seat_per_account() {
        let h = harness();
        let mut req = create_request("panda", "alice", 1);
        req.account = Some("acct-1".into());
        h.coordinator.create_room(req).unwrap();
        let mut join = join_request("alice2");
        join.account = Some("acct-1".into());
        assert_eq!(
            h.coordinator.join_room("panda", join),
            Err(CoordinatorError::Forbidden)
        );
    }
}

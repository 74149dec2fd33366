pub mod error;
pub mod feed;
pub mod guess;
pub mod history;
pub mod ids;
pub mod member;
pub mod net;
pub mod normalize;
pub mod prompt;
pub mod room;
pub mod rotation;
pub mod round;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use crate::ids::{MemberId, PromptId, RoomId, RoundId};
    use crate::member::{Identity, Member};
    use crate::room::{MAX_ROOM_MEMBERS, Room, RoomStatus, ScoringRule};
    use crate::round::{Round, RoundStatus};
    use crate::time::Timestamp;

    /// A lobby room with a fresh id and host, 3 rounds of 60 seconds.
    pub fn make_room(name: &str, created_at: Timestamp) -> Room {
        Room {
            id: RoomId::new(),
            name: name.to_string(),
            status: RoomStatus::Lobby,
            rounds_total: 3,
            round_time_sec: 60,
            max_players: MAX_ROOM_MEMBERS,
            host_member: MemberId::new(),
            scoring: ScoringRule::default(),
            created_at,
            started_at: None,
            finished_at: None,
            updated_at: created_at,
        }
    }

    /// Create `n` anonymous members of `room`; the first one reuses the room's host id.
    pub fn make_members(room: &Room, n: usize) -> Vec<Member> {
        (0..n)
            .map(|i| Member {
                id: if i == 0 {
                    room.host_member
                } else {
                    MemberId::new()
                },
                room_id: room.id,
                identity: Identity::Anonymous,
                username: format!("player{}", i + 1),
                is_host: i == 0,
                joined_at: room.created_at,
                left_at: None,
            })
            .collect()
    }

    /// An active round started at `started_at`.
    pub fn make_active_round(
        room: &Room,
        number: u8,
        drawer: MemberId,
        prompt: PromptId,
        started_at: Timestamp,
    ) -> Round {
        Round {
            id: RoundId::new(),
            room_id: room.id,
            number,
            status: RoundStatus::Active,
            drawer: Some(drawer),
            prompt: Some(prompt),
            scheduled_at: started_at,
            started_at: Some(started_at),
            ended_at: None,
            artifact_ref: None,
        }
    }
}

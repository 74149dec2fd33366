use std::future::Future;

use tokio::sync::mpsc;

use oekaki_core::feed::FeedEvent;
use oekaki_core::guess::Guess;
use oekaki_core::ids::{MemberId, RoomId, RoundId};
use oekaki_core::net::messages::{AdvanceOutcome, RoomStateView};

use crate::error::ClientError;

/// The coordinator operations a seated client needs while a game runs.
pub trait CoordinatorApi: Send + Sync {
    /// Authoritative snapshot of the room, tailored to this member.
    fn room_state(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<RoomStateView, ClientError>> + Send;

    /// Idempotent; a duplicate call returns [`AdvanceOutcome::Noop`].
    fn advance_round(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<AdvanceOutcome, ClientError>> + Send;

    fn submit_guess(
        &self,
        round_id: RoundId,
        member_id: MemberId,
        content: &str,
    ) -> impl Future<Output = Result<Guess, ClientError>> + Send;

    /// Open the change feed of `room_id`. Events arrive at most once per delivery
    /// but may be duplicated or reordered across reconnects.
    fn subscribe(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<mpsc::Receiver<FeedEvent>, ClientError>> + Send;
}

impl<T: CoordinatorApi> CoordinatorApi for std::sync::Arc<T> {
    fn room_state(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<RoomStateView, ClientError>> + Send {
        T::room_state(self, room_id)
    }

    fn advance_round(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<AdvanceOutcome, ClientError>> + Send {
        T::advance_round(self, room_id)
    }

    fn submit_guess(
        &self,
        round_id: RoundId,
        member_id: MemberId,
        content: &str,
    ) -> impl Future<Output = Result<Guess, ClientError>> + Send {
        T::submit_guess(self, round_id, member_id, content)
    }

    fn subscribe(
        &self,
        room_id: RoomId,
    ) -> impl Future<Output = Result<mpsc::Receiver<FeedEvent>, ClientError>> + Send {
        T::subscribe(self, room_id)
    }
}

//! Server-sent change feed, one stream per room subscriber.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;

use oekaki_core::feed::{Change, FeedEvent};
use oekaki_core::ids::RoomId;

use crate::auth::bearer_token;
use crate::error::CoordinatorError;
use crate::state::{AppState, ConnectionGuard};

/// GET /api/v1/rooms/{room_id}/feed: Committed row changes of one room.
///
/// Subscribers see only changes committed after they connected. A subscriber
/// that falls behind gets a `resync` event in place of the dropped changes.
pub async fn room_feed(
    State(state): State<AppState>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, Response> {
    let room_id: RoomId = room
        .parse()
        .map_err(|_| CoordinatorError::InvalidInput("room_id").into_response())?;
    let member = state
        .coordinator
        .authenticate(bearer_token(&headers))
        .map_err(IntoResponse::into_response)?;
    if member.room_id != room_id {
        return Err(CoordinatorError::Forbidden.into_response());
    }

    let max_sse = state.config.limits.max_sse_subscribers;
    let current = state.sse_subscriber_count.load(Ordering::Relaxed);
    if current >= max_sse {
        tracing::warn!(current, max = max_sse, "SSE subscriber limit reached");
        return Err(StatusCode::SERVICE_UNAVAILABLE.into_response());
    }

    let guard = ConnectionGuard::new(Arc::clone(&state.sse_subscriber_count));
    let rx = state.coordinator.subscribe();

    let stream = BroadcastStream::new(rx).filter_map(move |result| {
        let _guard = &guard;
        relay(result, room_id).map(|event| Ok(to_sse(&event)))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Keep events of `room_id`; turn a lag into a resync notice for it.
fn relay(result: Result<FeedEvent, BroadcastStreamRecvError>, room_id: RoomId) -> Option<FeedEvent> {
    match result {
        Ok(event) if event.room_id == room_id => Some(event),
        Ok(_) => None,
        Err(BroadcastStreamRecvError::Lagged(missed)) => {
            tracing::warn!(room = %room_id, missed, "SSE subscriber lagged, asking for resync");
            Some(FeedEvent {
                seq: 0,
                room_id,
                change: Change::Resync { missed },
            })
        },
    }
}

fn to_sse(event: &FeedEvent) -> SseEvent {
    let json = serde_json::to_string(event).unwrap_or_default();
    SseEvent::default()
        .event(event.kind())
        .data(json)
        .id(event.seq.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(room_id: RoomId) -> FeedEvent {
        FeedEvent {
            seq: 7,
            room_id,
            change: Change::DisbandCancelled,
        }
    }

    #[test]
    fn only_the_subscribed_room_is_relayed() {
        let room = RoomId::new();
        assert_eq!(relay(Ok(event(room)), room), Some(event(room)));
        assert_eq!(relay(Ok(event(RoomId::new())), room), None);
    }

    #[test]
    fn lag_becomes_a_resync_notice() {
        let room = RoomId::new();
        let notice = relay(Err(BroadcastStreamRecvError::Lagged(3)), room).unwrap();
        assert_eq!(notice.room_id, room);
        assert_eq!(notice.change, Change::Resync { missed: 3 });
        assert_eq!(notice.kind(), "resync");
    }

    #[tokio::test]
    async fn lagging_receiver_yields_resync_then_resumes() {
        let (tx, rx) = tokio::sync::broadcast::channel(2);
        let room = RoomId::new();
        for seq in 1..=5 {
            tx.send(FeedEvent { seq, ..event(room) }).unwrap();
        }
        let mut stream = BroadcastStream::new(rx).filter_map(move |r| relay(r, room));
        let first = stream.next().await.unwrap();
        assert_eq!(first.change, Change::Resync { missed: 3 });
        assert_eq!(stream.next().await.unwrap().seq, 4);
        assert_eq!(stream.next().await.unwrap().seq, 5);
    }
}

//! JSON handlers for the room, round and guess routes. Each handler
//! authenticates, delegates to the coordinator and maps errors to the
//! standard error body.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Json;

use oekaki_core::history::SessionHistory;
use oekaki_core::ids::{RoomId, RoundId};
use oekaki_core::member::Member;
use oekaki_core::net::messages::{
    AdvanceResponse, ArtifactRequest, CreateRoomRequest, GuessResponse, JoinRoomRequest,
    RoomStateView, ScoreEntry, SessionResponse, SubmitGuessRequest,
};
use oekaki_core::room::Room;
use oekaki_core::round::Round;

use crate::auth::bearer_token;
use crate::error::CoordinatorError;
use crate::state::AppState;

type ApiResult<T> = Result<T, CoordinatorError>;

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| CoordinatorError::BadRequest(rejection.body_text()))
}

fn parse_room(raw: &str) -> ApiResult<RoomId> {
    raw.parse().map_err(|_| CoordinatorError::InvalidInput("room_id"))
}

fn parse_round(raw: &str) -> ApiResult<RoundId> {
    raw.parse().map_err(|_| CoordinatorError::InvalidInput("round_id"))
}

/// The caller, who must be seated in `room_id`.
fn member_of(state: &AppState, headers: &HeaderMap, room_id: RoomId) -> ApiResult<Member> {
    let member = state.coordinator.authenticate(bearer_token(headers))?;
    if member.room_id != room_id {
        return Err(CoordinatorError::Forbidden);
    }
    Ok(member)
}

/// POST /api/v1/rooms: Create a room and seat its host.
pub async fn create_room(
    State(state): State<AppState>,
    payload: Result<Json<CreateRoomRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    let session = state.coordinator.create_room(body(payload)?)?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/v1/rooms/{name}
pub async fn lookup_room(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Room>> {
    state.coordinator.lookup_room(&name).map(Json)
}

/// POST /api/v1/rooms/{name}/join
pub async fn join_room(
    State(state): State<AppState>,
    Path(name): Path<String>,
    payload: Result<Json<JoinRoomRequest>, JsonRejection>,
) -> ApiResult<Json<SessionResponse>> {
    state.coordinator.join_room(&name, body(payload)?).map(Json)
}

/// POST /api/v1/rooms/{room_id}/start: Host only.
pub async fn start_game(
    State(state): State<AppState>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Round>> {
    let room_id = parse_room(&room)?;
    let member = member_of(&state, &headers, room_id)?;
    state.coordinator.start_game(room_id, member.id).map(Json)
}

/// POST /api/v1/rooms/{room_id}/advance: Any seated member may nudge the room.
pub async fn advance_round(
    State(state): State<AppState>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<AdvanceResponse>> {
    let room_id = parse_room(&room)?;
    member_of(&state, &headers, room_id)?;
    let outcome = state.coordinator.advance_round(room_id)?;
    Ok(Json(AdvanceResponse { room_id, outcome }))
}

/// POST /api/v1/rooms/{room_id}/end: Host only.
pub async fn end_game(
    State(state): State<AppState>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Room>> {
    let room_id = parse_room(&room)?;
    let member = member_of(&state, &headers, room_id)?;
    state.coordinator.end_game(room_id, member.id).map(Json)
}

/// POST /api/v1/rooms/{room_id}/leave
pub async fn leave_room(
    State(state): State<AppState>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let room_id = parse_room(&room)?;
    let member = member_of(&state, &headers, room_id)?;
    state.coordinator.leave_room(room_id, member.id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/rooms/{room_id}/archive
pub async fn archive_session(
    State(state): State<AppState>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<SessionHistory>> {
    let room_id = parse_room(&room)?;
    member_of(&state, &headers, room_id)?;
    state.coordinator.archive_session(room_id).map(Json)
}

/// GET /api/v1/rooms/{room_id}/state
pub async fn room_state(
    State(state): State<AppState>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<RoomStateView>> {
    let room_id = parse_room(&room)?;
    let member = member_of(&state, &headers, room_id)?;
    state.coordinator.room_state(room_id, member.id).map(Json)
}

/// GET /api/v1/rooms/{room_id}/scores
pub async fn scores(
    State(state): State<AppState>,
    Path(room): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<ScoreEntry>>> {
    let room_id = parse_room(&room)?;
    member_of(&state, &headers, room_id)?;
    state.coordinator.scores(room_id).map(Json)
}

/// POST /api/v1/rounds/{round_id}/guesses
pub async fn submit_guess(
    State(state): State<AppState>,
    Path(round): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<SubmitGuessRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<GuessResponse>)> {
    let round_id = parse_round(&round)?;
    let member = state.coordinator.authenticate(bearer_token(&headers))?;
    let request = body(payload)?;
    if request.member_id != member.id {
        return Err(CoordinatorError::Forbidden);
    }
    let guess = state
        .coordinator
        .submit_guess(round_id, member.id, &request.content)?;
    Ok((StatusCode::CREATED, Json(GuessResponse { guess })))
}

/// POST /api/v1/rounds/{round_id}/artifact: Drawer only.
pub async fn record_artifact(
    State(state): State<AppState>,
    Path(round): Path<String>,
    headers: HeaderMap,
    payload: Result<Json<ArtifactRequest>, JsonRejection>,
) -> ApiResult<Json<Round>> {
    let round_id = parse_round(&round)?;
    let member = state.coordinator.authenticate(bearer_token(&headers))?;
    let request = body(payload)?;
    state
        .coordinator
        .record_artifact(round_id, member.id, &request.reference)
        .map(Json)
}

/// GET /api/v1/history/{room_id}
pub async fn session_history(
    State(state): State<AppState>,
    Path(room): Path<String>,
) -> ApiResult<Json<SessionHistory>> {
    let room_id = parse_room(&room)?;
    state.coordinator.session_history(room_id).map(Json)
}

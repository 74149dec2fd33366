//! HTTP transport: JSON requests against the coordinator and an SSE reader for
//! the room feed.

use std::time::Duration;

use futures::StreamExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::mpsc;

use oekaki_core::error::ErrorBody;
use oekaki_core::feed::FeedEvent;
use oekaki_core::guess::Guess;
use oekaki_core::history::SessionHistory;
use oekaki_core::ids::{MemberId, RoomId, RoundId};
use oekaki_core::net::messages::{
    AdvanceOutcome, AdvanceResponse, CreateRoomRequest, GuessResponse, JoinRoomRequest,
    RoomStateView, ScoreEntry, SessionResponse, SubmitGuessRequest,
};
use oekaki_core::room::Room;
use oekaki_core::round::Round;

use crate::api::CoordinatorApi;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::retry::RetryPolicy;

/// [`CoordinatorApi`] over the coordinator's HTTP surface.
#[derive(Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    config: ClientConfig,
    token: Option<String>,
    retry: RetryPolicy,
}

impl HttpApi {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("oekaki-client/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        let retry = RetryPolicy::new(
            config.retry_attempts,
            Duration::from_millis(config.retry_backoff_ms),
        );
        Ok(Self {
            client,
            config,
            token: None,
            retry,
        })
    }

    /// Act as the member the token was issued to.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.config.api_url(path))
            .timeout(Duration::from_secs(self.config.request_timeout_secs));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::GET, path)
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.request(reqwest::Method::POST, path)
    }

    pub async fn create_room(&self, req: &CreateRoomRequest) -> Result<SessionResponse, ClientError> {
        decode(self.post("/rooms").json(req).send().await?).await
    }

    pub async fn join_room(
        &self,
        name: &str,
        req: &JoinRoomRequest,
    ) -> Result<SessionResponse, ClientError> {
        decode(self.post(&format!("/rooms/{name}/join")).json(req).send().await?).await
    }

    pub async fn lookup_room(&self, name: &str) -> Result<Room, ClientError> {
        decode(self.get(&format!("/rooms/{name}")).send().await?).await
    }

    pub async fn start_game(&self, room_id: RoomId) -> Result<Round, ClientError> {
        decode(self.post(&format!("/rooms/{room_id}/start")).send().await?).await
    }

    pub async fn end_game(&self, room_id: RoomId) -> Result<Room, ClientError> {
        decode(self.post(&format!("/rooms/{room_id}/end")).send().await?).await
    }

    pub async fn leave_room(&self, room_id: RoomId) -> Result<(), ClientError> {
        let resp = self.post(&format!("/rooms/{room_id}/leave")).send().await?;
        if resp.status().is_success() {
            return Ok(());
        }
        Err(error_of(resp).await)
    }

    pub async fn scores(&self, room_id: RoomId) -> Result<Vec<ScoreEntry>, ClientError> {
        self.retry
            .run("scores", move || async move {
                decode(self.get(&format!("/rooms/{room_id}/scores")).send().await?).await
            })
            .await
    }

    pub async fn record_artifact(
        &self,
        round_id: RoundId,
        reference: &str,
    ) -> Result<Round, ClientError> {
        let body = json!({ "reference": reference });
        decode(
            self.post(&format!("/rounds/{round_id}/artifact"))
                .json(&body)
                .send()
                .await?,
        )
        .await
    }

    pub async fn archive_session(&self, room_id: RoomId) -> Result<SessionHistory, ClientError> {
        self.retry
            .run("archive_session", move || async move {
                decode(self.post(&format!("/rooms/{room_id}/archive")).send().await?).await
            })
            .await
    }

    pub async fn session_history(&self, room_id: RoomId) -> Result<SessionHistory, ClientError> {
        decode(self.get(&format!("/history/{room_id}")).send().await?).await
    }
}

impl CoordinatorApi for HttpApi {
    async fn room_state(&self, room_id: RoomId) -> Result<RoomStateView, ClientError> {
        self.retry
            .run("room_state", move || async move {
                decode(self.get(&format!("/rooms/{room_id}/state")).send().await?).await
            })
            .await
    }

    async fn advance_round(&self, room_id: RoomId) -> Result<AdvanceOutcome, ClientError> {
        let resp: AdvanceResponse = self
            .retry
            .run("advance_round", move || async move {
                decode(self.post(&format!("/rooms/{room_id}/advance")).send().await?).await
            })
            .await?;
        Ok(resp.outcome)
    }

    async fn submit_guess(
        &self,
        round_id: RoundId,
        member_id: MemberId,
        content: &str,
    ) -> Result<Guess, ClientError> {
        let body = SubmitGuessRequest {
            member_id,
            content: content.to_string(),
        };
        // Not retried: a duplicate submission would be recorded twice.
        let resp: GuessResponse = decode(
            self.post(&format!("/rounds/{round_id}/guesses"))
                .json(&body)
                .send()
                .await?,
        )
        .await?;
        Ok(resp.guess)
    }

    async fn subscribe(&self, room_id: RoomId) -> Result<mpsc::Receiver<FeedEvent>, ClientError> {
        let resp = self
            .retry
            .run("subscribe", move || async move {
                // No request timeout: the feed stays open.
                let mut builder = self
                    .client
                    .get(self.config.api_url(&format!("/rooms/{room_id}/feed")));
                if let Some(token) = &self.token {
                    builder = builder.bearer_auth(token);
                }
                let resp = builder.send().await?;
                if resp.status().is_success() {
                    Ok(resp)
                } else {
                    Err(error_of(resp).await)
                }
            })
            .await?;

        let (tx, rx) = mpsc::channel(self.config.feed_buffer.max(1));
        tokio::spawn(async move {
            let mut stream = resp.bytes_stream();
            let mut parser = SseParser::default();
            while let Some(chunk) = stream.next().await {
                match chunk {
                    Ok(bytes) => {
                        for event in parser.push(&bytes) {
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                    },
                    Err(e) => {
                        tracing::warn!(room = %room_id, error = %e, "Feed connection lost");
                        break;
                    },
                }
            }
            tracing::debug!(room = %room_id, "Feed closed");
        });
        Ok(rx)
    }
}

async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    if !resp.status().is_success() {
        return Err(error_of(resp).await);
    }
    resp.json::<T>()
        .await
        .map_err(|e| ClientError::Decode(e.to_string()))
}

async fn error_of(resp: Response) -> ClientError {
    let status = resp.status();
    match resp.json::<ErrorBody>().await {
        Ok(body) => ClientError::Api(body.error),
        Err(_) if status == StatusCode::SERVICE_UNAVAILABLE || status.is_server_error() => {
            ClientError::Transient(format!("HTTP {status}"))
        },
        Err(_) => ClientError::Decode(format!("HTTP {status} without error code")),
    }
}

/// Incremental `text/event-stream` decoder yielding feed events.
#[derive(Debug, Default)]
pub struct SseParser {
    pending: Vec<u8>,
    data: String,
}

impl SseParser {
    /// Feed raw bytes; returns the events completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<FeedEvent> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                if !self.data.is_empty() {
                    self.data.push('\n');
                }
                self.data.push_str(data.strip_prefix(' ').unwrap_or(data));
            }
            // `event:`, `id:` and `:` keep-alive comments carry nothing the payload lacks.
        }
        events
    }

    fn dispatch(&mut self) -> Option<FeedEvent> {
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data);
        match serde_json::from_str(&data) {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!(error = %e, "Undecodable feed event");
                None
            },
        }
    }
}

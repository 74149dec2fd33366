//! Client-side reconciliation against the coordinator's change feed.
//!
//! Feed events are processed one at a time from a single queue. They are only
//! hints: anything that affects round state is answered by re-fetching the
//! authoritative snapshot. After a decisive event the reconciler suppresses
//! further feed-triggered refreshes for a fixed window and re-fetches exactly once
//! when the window closes, whether or not anything else arrived.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use oekaki_core::error::ErrorKind;
use oekaki_core::feed::{Change, FeedEvent};
use oekaki_core::guess::Guess;
use oekaki_core::ids::RoundId;
use oekaki_core::net::messages::{AdvanceOutcome, ConcludedRound, RoomStateView};
use oekaki_core::time::{Clock, SystemClock};

use crate::api::CoordinatorApi;
use crate::config::{AdvancePolicy, ClientConfig};
use crate::session::ClientSession;

/// What the UI should render next.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// A fresh authoritative snapshot.
    State(Box<RoomStateView>),
    /// A round just concluded; show its result and answer for `display_for`.
    RoundResult {
        result: ConcludedRound,
        display_for: Duration,
    },
    /// A guess that did not end the round, for the chat log.
    Guess(Guess),
    Disbanding { seconds: u32 },
    DisbandCancelled,
    /// The room is gone or the feed cannot be restored.
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

pub struct ChangeFeedReconciler<A> {
    api: A,
    config: ClientConfig,
    clock: Arc<dyn Clock>,
    session: ClientSession,
    updates: mpsc::UnboundedSender<Update>,
    suppressed_events: u64,
}

impl<A: CoordinatorApi> ChangeFeedReconciler<A> {
    pub fn new(
        api: A,
        config: ClientConfig,
        session: ClientSession,
        updates: mpsc::UnboundedSender<Update>,
    ) -> Self {
        Self::with_clock(api, config, session, updates, Arc::new(SystemClock))
    }

    pub fn with_clock(
        api: A,
        config: ClientConfig,
        session: ClientSession,
        updates: mpsc::UnboundedSender<Update>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            api,
            config,
            clock,
            session,
            updates,
            suppressed_events: 0,
        }
    }

    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Feed events dropped by the suppression filter so far.
    pub fn suppressed_events(&self) -> u64 {
        self.suppressed_events
    }

    /// Process the feed until the room goes away or `shutdown` fires. Returns the
    /// session with its final state.
    pub async fn run(
        mut self,
        mut feed: mpsc::Receiver<FeedEvent>,
        shutdown: CancellationToken,
    ) -> ClientSession {
        let room = self.session.room_id;
        tracing::debug!(room = %room, member = %self.session.member_id(), "Reconciler started");
        if self.resync().await == Flow::Stop {
            return self.session;
        }

        loop {
            let window_end = self.session.suppressed_until();
            tokio::select! {
                () = shutdown.cancelled() => break,
                () = sleep_until(window_end) => {
                    self.session.end_suppression();
                    tracing::debug!(room = %room, "Suppression window closed");
                    if self.resync().await == Flow::Stop {
                        break;
                    }
                },
                event = feed.recv() => {
                    let flow = match event {
                        Some(event) => self.handle(event).await,
                        None => match self.reconnect().await {
                            Some(rx) => {
                                feed = rx;
                                Flow::Continue
                            },
                            None => Flow::Stop,
                        },
                    };
                    if flow == Flow::Stop {
                        break;
                    }
                },
                round_id = self.session.timer.expired() => {
                    if self.on_local_timeout(round_id).await == Flow::Stop {
                        break;
                    }
                },
            }
        }
        tracing::debug!(room = %room, "Reconciler stopped");
        self.session
    }

    async fn handle(&mut self, event: FeedEvent) -> Flow {
        if event.room_id != self.session.room_id {
            return Flow::Continue;
        }
        match &event.change {
            Change::RoomDeleted => {
                self.send(Update::Closed);
                return Flow::Stop;
            },
            Change::Disbanding { seconds } => {
                self.send(Update::Disbanding { seconds: *seconds });
                return Flow::Continue;
            },
            Change::DisbandCancelled => {
                self.send(Update::DisbandCancelled);
                return Flow::Continue;
            },
            Change::GuessInserted(guess) if !guess.is_winner => {
                self.send(Update::Guess(guess.clone()));
                return Flow::Continue;
            },
            _ => {},
        }

        if self.session.is_suppressed() {
            self.suppressed_events += 1;
            tracing::debug!(seq = event.seq, kind = event.kind(), "Suppressed feed event");
            return Flow::Continue;
        }
        if event.is_decisive() {
            self.open_window();
        }
        self.resync().await
    }

    fn open_window(&mut self) {
        self.session
            .suppress_until(Instant::now() + self.config.suppression_window());
    }

    /// Fetch the authoritative snapshot and publish it.
    async fn resync(&mut self) -> Flow {
        let room = self.session.room_id;
        match self.api.room_state(room).await {
            Ok(view) => {
                let delta = self.session.apply(view.clone(), self.clock.now());
                if let Some(result) = delta.concluded {
                    self.send(Update::RoundResult {
                        result,
                        display_for: self.config.result_display(),
                    });
                }
                self.send(Update::State(Box::new(view)));
                Flow::Continue
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(room = %room, error = %e, "Room is gone");
                self.send(Update::Closed);
                Flow::Stop
            },
            Err(e) => {
                tracing::warn!(room = %room, error = %e, "Resync failed");
                Flow::Continue
            },
        }
    }

    /// The local countdown ran out. Ask the coordinator to advance if this client
    /// is allowed to; the coordinator decides whether anything happens.
    async fn on_local_timeout(&mut self, round_id: RoundId) -> Flow {
        let room = self.session.room_id;
        let may_advance = match self.config.advance_policy {
            AdvancePolicy::AnyClient => true,
            AdvancePolicy::HostOnly => self.session.is_host(),
        };
        if !may_advance {
            return Flow::Continue;
        }

        match self.api.advance_round(room).await {
            Ok(AdvanceOutcome::Noop) => {
                tracing::debug!(room = %room, round = %round_id, "Advance was a no-op");
                let flow = self.resync().await;
                if self.session.timer.round() == Some(round_id) {
                    // Still active server-side; clocks disagree.
                    self.session.timer.retry_in(self.config.advance_grace());
                }
                flow
            },
            Ok(outcome) => {
                tracing::info!(room = %room, round = %round_id, ?outcome, "Advanced round");
                if matches!(
                    outcome,
                    AdvanceOutcome::Skipped { .. } | AdvanceOutcome::Finished
                ) {
                    self.open_window();
                }
                self.resync().await
            },
            Err(e) if e.is_benign() => {
                tracing::debug!(room = %room, error = %e, "Advance no longer applicable");
                Flow::Continue
            },
            Err(e) => {
                tracing::warn!(room = %room, error = %e, "Advance request failed");
                Flow::Continue
            },
        }
    }

    /// The feed closed; open a new one and catch up on whatever was missed.
    async fn reconnect(&mut self) -> Option<mpsc::Receiver<FeedEvent>> {
        let room = self.session.room_id;
        match self.api.subscribe(room).await {
            Ok(rx) => {
                tracing::info!(room = %room, "Feed reconnected");
                (self.resync().await == Flow::Continue).then_some(rx)
            },
            Err(e) => {
                tracing::warn!(room = %room, error = %e, "Feed cannot be restored");
                self.send(Update::Closed);
                None
            },
        }
    }

    fn send(&self, update: Update) {
        // A dropped receiver only means nobody renders anymore.
        let _ = self.updates.send(update);
    }
}

impl<A: CoordinatorApi + 'static> ChangeFeedReconciler<A> {
    /// Subscribe to the room feed and run the reconciler on its own task.
    pub async fn start(
        self,
        shutdown: CancellationToken,
    ) -> Result<JoinHandle<ClientSession>, crate::error::ClientError> {
        let feed = self.api.subscribe(self.session.room_id).await?;
        Ok(tokio::spawn(self.run(feed, shutdown)))
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

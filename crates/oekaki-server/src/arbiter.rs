//! Guess evaluation and winner resolution.

use oekaki_core::guess::Guess;
use oekaki_core::ids::{GuessId, MemberId, RoundId};
use oekaki_core::normalize::matches_answer;
use oekaki_core::round::{Round, RoundStatus};

use crate::coordinator::Coordinator;
use crate::error::CoordinatorError;
use crate::scheduler::Conclusion;
use crate::store::{GUESSES_WINNER_KEY, StoreError};

const MAX_ARTIFACT_REF_CHARS: usize = 512;

impl Coordinator {
    /// Record a guess and, if it is the first correct one of an active round, make
    /// it the winner: the round ends and points are awarded in the same commit.
    ///
    /// Every guess is stored. The one-winner-per-round index is the final arbiter;
    /// a correct guess that loses the race is kept as a non-winner.
    pub fn submit_guess(
        &self,
        round_id: RoundId,
        member_id: MemberId,
        content: &str,
    ) -> Result<Guess, CoordinatorError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(CoordinatorError::MissingParams("content"));
        }
        if content.chars().count() > self.config().limits.max_guess_chars {
            return Err(CoordinatorError::InvalidInput("content"));
        }
        let now = self.now();

        let (guess, conclusion) = self
            .store()
            .transaction(|txn| -> Result<_, CoordinatorError> {
                let mut round = txn
                    .round(round_id)
                    .cloned()
                    .ok_or(CoordinatorError::RoundNotFound)?;
                let room = txn
                    .room(round.room_id)
                    .cloned()
                    .ok_or(CoordinatorError::RoomNotFound)?;
                let member = txn
                    .member(member_id)
                    .ok_or(CoordinatorError::MemberNotFound)?;
                if member.room_id != room.id || !member.is_active() {
                    return Err(CoordinatorError::Forbidden);
                }

                let is_correct = round
                    .prompt
                    .and_then(|id| self.inner.prompts.get(id))
                    .is_some_and(|prompt| matches_answer(content, &prompt.word));
                let eligible = is_correct
                    && round.is_active()
                    && !round.has_timed_out(room.round_duration(), now)
                    && round.drawer != Some(member_id);

                let mut guess = Guess {
                    id: GuessId::new(),
                    room_id: room.id,
                    round_id,
                    member_id,
                    content: content.to_string(),
                    is_correct,
                    is_winner: eligible,
                    created_at: now,
                };
                match txn.insert_guess(guess.clone()) {
                    Ok(()) => {},
                    Err(StoreError::UniqueViolation(GUESSES_WINNER_KEY)) => {
                        guess.is_winner = false;
                        txn.insert_guess(guess.clone())?;
                    },
                    Err(e) => return Err(e.into()),
                }
                txn.touch_room(room.id, now);

                if !guess.is_winner {
                    return Ok((guess, None));
                }
                round.status = RoundStatus::Ended;
                round.ended_at = Some(now);
                txn.update_round(round.clone())?;
                let conclusion = self.conclude_round(txn, &room, &round, now)?;
                Ok((guess, Some(conclusion)))
            })?;

        match conclusion {
            None => {
                tracing::debug!(
                    round = %round_id,
                    member = %member_id,
                    correct = guess.is_correct,
                    "Guess recorded"
                );
            },
            Some(conclusion) => {
                tracing::info!(
                    room = %guess.room_id,
                    round = %round_id,
                    member = %member_id,
                    "Round won"
                );
                match conclusion {
                    Conclusion::RoomFinished => self.after_finish(guess.room_id),
                    Conclusion::NextScheduled(_) => self.wake_driver(guess.room_id),
                }
            },
        }
        Ok(guess)
    }

    /// The drawer hands off a reference to the rendered canvas of its round.
    pub fn record_artifact(
        &self,
        round_id: RoundId,
        actor: MemberId,
        reference: &str,
    ) -> Result<Round, CoordinatorError> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(CoordinatorError::MissingParams("reference"));
        }
        if reference.chars().count() > MAX_ARTIFACT_REF_CHARS {
            return Err(CoordinatorError::InvalidInput("reference"));
        }
        self.store().transaction(|txn| -> Result<_, CoordinatorError> {
            let mut round = txn
                .round(round_id)
                .cloned()
                .ok_or(CoordinatorError::RoundNotFound)?;
            if round.drawer != Some(actor) {
                return Err(CoordinatorError::Forbidden);
            }
            if round.status == RoundStatus::Pending {
                return Err(CoordinatorError::BadRequest("round has not started".into()));
            }
            round.artifact_ref = Some(reference.to_string());
            txn.update_round(round.clone())?;
            Ok(round)
        })
    }
}

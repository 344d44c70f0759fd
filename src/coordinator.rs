// src/coordinator.rs
//! Optimistic voting for one viewer on one poll.
//!
//! A submission moves `Idle -> Pending`, publishes the tentative tally right
//! away, then waits on the vote writer. Success settles in `Committed`;
//! any failure restores the pre-vote tally and settles in `RolledBack` with
//! the selection kept for a retry.

use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::error::{TallyError, WriteFailure};
use crate::models::{LoadedPoll, OptionId, PollId, Viewer, VoteRequest};
use crate::store::VoteWriter;
use crate::tally::{compute_tally, Tally};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VotePhase {
    Idle,
    Pending,
    Committed,
    RolledBack { reason: String },
}

/// What the display layer renders.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteView {
    pub phase: VotePhase,
    pub tally: Tally,
    pub intent: Option<OptionId>,
    pub has_voted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    NoSelection,
    AlreadyPending,
    AlreadyVoted,
    UnknownOption,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectOutcome {
    Selected,
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Committed(Tally),
    RolledBack { failure: WriteFailure, restored: Tally },
    Ignored(IgnoreReason),
}

/// Held only while a write is in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeculativeState {
    pub previous: Tally,
    pub tentative: Tally,
}

#[derive(Debug)]
struct Session {
    phase: VotePhase,
    tally: Tally,
    intent: Option<OptionId>,
    has_voted: bool,
    speculative: Option<SpeculativeState>,
}

impl Session {
    fn view(&self) -> VoteView {
        VoteView {
            phase: self.phase.clone(),
            tally: self.tally.clone(),
            intent: self.intent,
            has_voted: self.has_voted,
        }
    }
}

pub struct VoteCoordinator<W> {
    poll_id: PollId,
    viewer: Viewer,
    writer: W,
    session: Mutex<Session>,
    views: watch::Sender<VoteView>,
}

impl<W: VoteWriter> VoteCoordinator<W> {
    pub fn new(loaded: LoadedPoll, viewer: Viewer, writer: W) -> Result<Self, TallyError> {
        let tally = compute_tally(&loaded.poll.options, &loaded.counts, loaded.viewer_vote)?;
        let session = Session {
            phase: VotePhase::Idle,
            tally,
            intent: None,
            has_voted: loaded.viewer_vote.is_some(),
            speculative: None,
        };
        let (views, _) = watch::channel(session.view());

        Ok(Self {
            poll_id: loaded.poll.id,
            viewer,
            writer,
            session: Mutex::new(session),
            views,
        })
    }

    pub fn view(&self) -> VoteView {
        self.session().view()
    }

    /// Every state change is published here, including the tentative tally
    /// before the writer answers.
    pub fn subscribe(&self) -> watch::Receiver<VoteView> {
        self.views.subscribe()
    }

    pub fn speculative(&self) -> Option<SpeculativeState> {
        self.session().speculative.clone()
    }

    /// Record the viewer's choice, replacing any earlier unsubmitted one.
    pub fn select(&self, option_id: OptionId) -> SelectOutcome {
        let mut session = self.session();

        if session.phase == VotePhase::Pending {
            return SelectOutcome::Ignored(IgnoreReason::AlreadyPending);
        }
        if session.has_voted {
            return SelectOutcome::Ignored(IgnoreReason::AlreadyVoted);
        }
        if session.tally.entry(option_id).is_none() {
            return SelectOutcome::Ignored(IgnoreReason::UnknownOption);
        }

        session.intent = Some(option_id);
        if matches!(session.phase, VotePhase::RolledBack { .. }) {
            session.phase = VotePhase::Idle;
        }
        self.publish(&session);
        SelectOutcome::Selected
    }

    pub async fn submit(&self) -> SubmitOutcome {
        let vote = match self.begin() {
            Ok(vote) => vote,
            Err(reason) => {
                debug!(poll_id = %self.poll_id, ?reason, "vote submission ignored");
                return SubmitOutcome::Ignored(reason);
            }
        };

        match self.writer.cast_vote(&vote).await {
            Ok(()) => self.commit(),
            Err(failure) => self.roll_back(failure),
        }
    }

    fn begin(&self) -> Result<VoteRequest, IgnoreReason> {
        let mut session = self.session();

        if session.phase == VotePhase::Pending {
            return Err(IgnoreReason::AlreadyPending);
        }
        if session.has_voted {
            return Err(IgnoreReason::AlreadyVoted);
        }
        let option_id = session.intent.ok_or(IgnoreReason::NoSelection)?;
        let tentative = session
            .tally
            .with_vote(option_id)
            .ok_or(IgnoreReason::UnknownOption)?;

        session.speculative = Some(SpeculativeState {
            previous: session.tally.clone(),
            tentative: tentative.clone(),
        });
        session.tally = tentative;
        session.phase = VotePhase::Pending;
        self.publish(&session);

        debug!(poll_id = %self.poll_id, %option_id, "vote pending");

        Ok(VoteRequest {
            poll_id: self.poll_id,
            option_id,
            viewer_id: self.viewer.id,
        })
    }

    fn commit(&self) -> SubmitOutcome {
        let mut session = self.session();

        if let Some(speculative) = session.speculative.take() {
            session.tally = speculative.tentative;
        }
        session.phase = VotePhase::Committed;
        session.has_voted = true;
        session.intent = None;
        self.publish(&session);

        debug!(poll_id = %self.poll_id, total_votes = session.tally.total_votes, "vote committed");
        SubmitOutcome::Committed(session.tally.clone())
    }

    fn roll_back(&self, failure: WriteFailure) -> SubmitOutcome {
        let mut session = self.session();

        if let Some(speculative) = session.speculative.take() {
            session.tally = speculative.previous;
        }
        session.phase = VotePhase::RolledBack { reason: failure.reason() };
        self.publish(&session);

        warn!(poll_id = %self.poll_id, viewer_id = %self.viewer.id, error = %failure, "vote rolled back");
        SubmitOutcome::RolledBack {
            failure,
            restored: session.tally.clone(),
        }
    }

    fn publish(&self, session: &Session) {
        self.views.send_replace(session.view());
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

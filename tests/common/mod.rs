//! Test doubles for the external store.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use poll_tally::models::{
    EditPoll, LoadedPoll, NewPoll, OptionId, Poll, PollId, PollOption, PollSummary, Role, Viewer, ViewerId,
    VoteCounts, VoteRequest,
};
use poll_tally::store::{removed_options, validate_edit_poll, validate_new_poll};
use poll_tally::{PollLoader, PollStore, StoreError, VoteWriter, WriteFailure};

pub fn viewer(role: Role) -> Viewer {
    Viewer { id: ViewerId(Uuid::new_v4()), role }
}

pub fn poll_with_options(creator: ViewerId, texts: &[(i32, &str)]) -> Poll {
    Poll {
        id: PollId(Uuid::new_v4()),
        title: "Favourite letter".into(),
        description: "Pick one".into(),
        creator_id: creator,
        options: texts
            .iter()
            .map(|(id, text)| PollOption { id: OptionId(*id), text: text.to_string() })
            .collect(),
        created_at: Utc::now(),
    }
}

/// Options `[{1, "A"}, {2, "B"}]` with 3 and 1 votes.
pub fn three_to_one() -> LoadedPoll {
    let poll = poll_with_options(ViewerId(Uuid::new_v4()), &[(1, "A"), (2, "B")]);
    let counts: VoteCounts = [(OptionId(1), 3), (OptionId(2), 1)].into_iter().collect();
    LoadedPoll { poll, counts, viewer_vote: None }
}

/// Holds every write until the test releases it.
pub struct GatedWriter {
    calls: AtomicUsize,
    gate: tokio::sync::Mutex<Option<oneshot::Receiver<Result<(), WriteFailure>>>>,
}

impl GatedWriter {
    pub fn new() -> (Self, oneshot::Sender<Result<(), WriteFailure>>) {
        let (tx, rx) = oneshot::channel();
        let writer = Self {
            calls: AtomicUsize::new(0),
            gate: tokio::sync::Mutex::new(Some(rx)),
        };
        (writer, tx)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoteWriter for GatedWriter {
    async fn cast_vote(&self, _vote: &VoteRequest) -> Result<(), WriteFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().await.take();
        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(WriteFailure::Network("gate dropped".into()))),
            None => Ok(()),
        }
    }
}

struct StoredPoll {
    poll: Poll,
    votes: HashMap<ViewerId, OptionId>,
}

/// In-memory stand-in for the hosted store.
#[derive(Default)]
pub struct MemoryStore {
    polls: Mutex<Vec<StoredPoll>>,
    next_option_id: AtomicI32,
    fail_next_write: Mutex<Option<WriteFailure>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { next_option_id: AtomicI32::new(100), ..Default::default() }
    }

    pub fn seed(&self, poll: Poll, votes: &[(ViewerId, OptionId)]) {
        self.polls.lock().unwrap().push(StoredPoll {
            poll,
            votes: votes.iter().copied().collect(),
        });
    }

    pub fn fail_next_write(&self, failure: WriteFailure) {
        *self.fail_next_write.lock().unwrap() = Some(failure);
    }

    pub fn vote_count(&self, poll_id: PollId) -> usize {
        self.polls
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.poll.id == poll_id)
            .map(|p| p.votes.len())
            .unwrap_or(0)
    }

    pub fn contains(&self, poll_id: PollId) -> bool {
        self.polls.lock().unwrap().iter().any(|p| p.poll.id == poll_id)
    }
}

fn counts_of(stored: &StoredPoll) -> VoteCounts {
    let mut counts = VoteCounts::new();
    for option_id in stored.votes.values() {
        *counts.entry(*option_id).or_insert(0) += 1;
    }
    counts
}

#[async_trait]
impl PollLoader for MemoryStore {
    async fn load_poll(
        &self,
        poll_id: PollId,
        viewer_id: Option<ViewerId>,
    ) -> Result<LoadedPoll, StoreError> {
        let polls = self.polls.lock().unwrap();
        let stored = polls
            .iter()
            .find(|p| p.poll.id == poll_id)
            .ok_or(StoreError::NotFound(poll_id))?;

        Ok(LoadedPoll {
            poll: stored.poll.clone(),
            counts: counts_of(stored),
            viewer_vote: viewer_id.and_then(|id| stored.votes.get(&id).copied()),
        })
    }
}

#[async_trait]
impl VoteWriter for MemoryStore {
    async fn cast_vote(&self, vote: &VoteRequest) -> Result<(), WriteFailure> {
        if let Some(failure) = self.fail_next_write.lock().unwrap().take() {
            return Err(failure);
        }

        let mut polls = self.polls.lock().unwrap();
        let stored = polls
            .iter_mut()
            .find(|p| p.poll.id == vote.poll_id)
            .ok_or_else(|| WriteFailure::Rejected("poll does not exist".into()))?;
        if !stored.poll.options.iter().any(|o| o.id == vote.option_id) {
            return Err(WriteFailure::Rejected("option is not part of this poll".into()));
        }
        if stored.votes.contains_key(&vote.viewer_id) {
            return Err(WriteFailure::Duplicate);
        }
        stored.votes.insert(vote.viewer_id, vote.option_id);
        Ok(())
    }
}

#[async_trait]
impl PollStore for MemoryStore {
    async fn list_polls(&self, creator: Option<ViewerId>) -> Result<Vec<PollSummary>, StoreError> {
        Ok(self
            .polls
            .lock()
            .unwrap()
            .iter()
            .filter(|p| creator.map_or(true, |c| p.poll.creator_id == c))
            .map(|p| PollSummary {
                id: p.poll.id,
                creator_id: p.poll.creator_id,
                title: p.poll.title.clone(),
                description: p.poll.description.clone(),
                created_at: p.poll.created_at,
                total_votes: p.votes.len() as u64,
            })
            .collect())
    }

    async fn create_poll(&self, creator: ViewerId, poll: NewPoll) -> Result<Poll, StoreError> {
        let poll = validate_new_poll(poll)?;
        let created = Poll {
            id: PollId(Uuid::new_v4()),
            title: poll.title,
            description: poll.description,
            creator_id: creator,
            options: poll
                .options
                .into_iter()
                .map(|text| PollOption {
                    id: OptionId(self.next_option_id.fetch_add(1, Ordering::SeqCst)),
                    text,
                })
                .collect(),
            created_at: Utc::now(),
        };
        self.seed(created.clone(), &[]);
        Ok(created)
    }

    async fn update_poll(&self, poll_id: PollId, edit: EditPoll) -> Result<Poll, StoreError> {
        let edit = validate_edit_poll(edit)?;
        let mut polls = self.polls.lock().unwrap();
        let stored = polls
            .iter_mut()
            .find(|p| p.poll.id == poll_id)
            .ok_or(StoreError::NotFound(poll_id))?;

        let existing: Vec<OptionId> = stored.poll.options.iter().map(|o| o.id).collect();
        let removed = removed_options(&existing, &edit)?;
        if let Some(voted) = removed.iter().find(|id| stored.votes.values().any(|v| v == *id)) {
            return Err(StoreError::Invalid(format!(
                "option {voted} has votes and cannot be removed"
            )));
        }

        let mut options: Vec<PollOption> = stored
            .poll
            .options
            .iter()
            .filter(|o| !removed.contains(&o.id))
            .cloned()
            .collect();
        for option in edit.options {
            match option.id {
                Some(id) => {
                    if let Some(existing) = options.iter_mut().find(|o| o.id == id) {
                        existing.text = option.text;
                    }
                }
                None => options.push(PollOption {
                    id: OptionId(self.next_option_id.fetch_add(1, Ordering::SeqCst)),
                    text: option.text,
                }),
            }
        }

        stored.poll.title = edit.title;
        if let Some(description) = edit.description {
            stored.poll.description = description;
        }
        stored.poll.options = options;
        Ok(stored.poll.clone())
    }

    async fn delete_poll(&self, poll_id: PollId) -> Result<(), StoreError> {
        let mut polls = self.polls.lock().unwrap();
        let before = polls.len();
        polls.retain(|p| p.poll.id != poll_id);
        if polls.len() == before {
            return Err(StoreError::NotFound(poll_id));
        }
        Ok(())
    }
}

// src/store.rs
//! Contracts with the external store. The core only ever talks to the store
//! through these traits, so the coordinator and handlers can run against any
//! backend, including test fakes.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{StoreError, WriteFailure};
use crate::models::{
    EditOption, EditPoll, LoadedPoll, NewPoll, OptionId, Poll, PollId, PollSummary, ViewerId,
    VoteRequest,
};

#[async_trait]
pub trait PollLoader: Send + Sync {
    /// Load a poll with its aggregated counts and, when a viewer is given,
    /// the option that viewer voted for.
    async fn load_poll(
        &self,
        poll_id: PollId,
        viewer_id: Option<ViewerId>,
    ) -> Result<LoadedPoll, StoreError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoteWriter: Send + Sync {
    /// Persist one vote. A second vote by the same viewer on the same poll
    /// must fail with [`WriteFailure::Duplicate`].
    async fn cast_vote(&self, vote: &VoteRequest) -> Result<(), WriteFailure>;
}

#[async_trait]
pub trait PollStore: PollLoader + VoteWriter {
    /// All polls, or only those created by `creator` when given.
    async fn list_polls(&self, creator: Option<ViewerId>) -> Result<Vec<PollSummary>, StoreError>;

    async fn create_poll(&self, creator: ViewerId, poll: NewPoll) -> Result<Poll, StoreError>;

    /// Retitle a poll and reconcile its options: rename by id, insert those
    /// without an id, drop the ones left out. An option that has votes cannot
    /// be dropped.
    async fn update_poll(&self, poll_id: PollId, edit: EditPoll) -> Result<Poll, StoreError>;

    /// Remove a poll with its votes and options.
    async fn delete_poll(&self, poll_id: PollId) -> Result<(), StoreError>;
}

#[async_trait]
impl<T: VoteWriter + ?Sized> VoteWriter for Arc<T> {
    async fn cast_vote(&self, vote: &VoteRequest) -> Result<(), WriteFailure> {
        (**self).cast_vote(vote).await
    }
}

/// Trim and validate a creation payload.
pub fn validate_new_poll(poll: NewPoll) -> Result<NewPoll, StoreError> {
    let title = poll.title.trim().to_string();
    if title.is_empty() {
        return Err(StoreError::Invalid("title must not be empty".into()));
    }

    let options: Vec<String> = poll
        .options
        .iter()
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect();
    if options.is_empty() {
        return Err(StoreError::Invalid("a poll needs at least one option".into()));
    }

    Ok(NewPoll {
        title,
        description: poll.description.trim().to_string(),
        options,
    })
}

/// Trim and validate an edit payload. Blank options are dropped, which
/// removes them if they already exist.
pub fn validate_edit_poll(edit: EditPoll) -> Result<EditPoll, StoreError> {
    let title = edit.title.trim().to_string();
    if title.is_empty() {
        return Err(StoreError::Invalid("title must not be empty".into()));
    }

    let mut ids = HashSet::new();
    let mut options = Vec::with_capacity(edit.options.len());
    for option in edit.options {
        if let Some(id) = option.id {
            if !ids.insert(id) {
                return Err(StoreError::Invalid(format!("option {id} listed twice")));
            }
        }
        let text = option.text.trim().to_string();
        if !text.is_empty() {
            options.push(EditOption { id: option.id, text });
        }
    }
    if options.is_empty() {
        return Err(StoreError::Invalid("a poll needs at least one option".into()));
    }

    Ok(EditPoll {
        title,
        description: edit.description.map(|d| d.trim().to_string()),
        options,
    })
}

/// Ids of `existing` options that the edit leaves out. Fails if the edit
/// names an id the poll does not have.
pub fn removed_options(existing: &[OptionId], edit: &EditPoll) -> Result<Vec<OptionId>, StoreError> {
    let kept: HashSet<OptionId> = edit.options.iter().filter_map(|o| o.id).collect();
    if let Some(unknown) = kept.iter().find(|id| !existing.contains(id)) {
        return Err(StoreError::Invalid(format!(
            "option {unknown} is not part of this poll"
        )));
    }

    Ok(existing
        .iter()
        .filter(|id| !kept.contains(id))
        .copied()
        .collect())
}

// src/handlers.rs
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::MaybeViewer;
use crate::coordinator::{IgnoreReason, SelectOutcome, SubmitOutcome, VoteCoordinator};
use crate::error::{AppError, WriteFailure};
use crate::models::{EditPoll, NewPoll, OptionId, Poll, PollId, PollSummary, Viewer};
use crate::store::{PollLoader, PollStore};
use crate::tally::{compute_tally, orphaned_options, SortOrder, TallyEntry};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PollStore>,
}

impl AppState {
    pub fn new(store: Arc<dyn PollStore>) -> Self {
        Self { store }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DisplayParams {
    #[serde(default)]
    pub sort: SortOrder,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PollView {
    pub poll: Poll,
    pub results: Vec<TallyEntry>,
    pub total_votes: u64,
    pub has_voted: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    /// Only the requesting viewer's own polls.
    #[serde(default)]
    pub mine: bool,
}

#[derive(Debug, Deserialize)]
pub struct VoteBody {
    pub option_id: OptionId,
}

#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub results: Vec<TallyEntry>,
    pub total_votes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// List polls, newest first. `?mine=true` restricts to the viewer's own.
pub async fn list_polls(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
    MaybeViewer(viewer): MaybeViewer,
) -> Result<Json<Vec<PollSummary>>, AppError> {
    let creator = if params.mine {
        Some(viewer.ok_or(AppError::Unauthorized)?.id)
    } else {
        None
    };
    Ok(Json(state.store.list_polls(creator).await?))
}

pub async fn create_poll(
    State(state): State<AppState>,
    viewer: Viewer,
    Json(new_poll): Json<NewPoll>,
) -> Result<(StatusCode, Json<Poll>), AppError> {
    let poll = state.store.create_poll(viewer.id, new_poll).await?;
    Ok((StatusCode::CREATED, Json(poll)))
}

/// Get a poll with its tally, sorted and truncated for display
pub async fn get_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    Query(params): Query<DisplayParams>,
    MaybeViewer(viewer): MaybeViewer,
) -> Result<Json<PollView>, AppError> {
    let loaded = state
        .store
        .load_poll(PollId(poll_id), viewer.map(|v| v.id))
        .await?;

    let orphans = orphaned_options(&loaded.poll.options, &loaded.counts);
    if !orphans.is_empty() {
        warn!(%poll_id, ?orphans, "vote counts reference options missing from poll");
    }

    let tally = compute_tally(&loaded.poll.options, &loaded.counts, loaded.viewer_vote)?;

    Ok(Json(PollView {
        results: tally.display(params.sort, params.limit),
        total_votes: tally.total_votes,
        has_voted: loaded.viewer_vote.is_some(),
        poll: loaded.poll,
    }))
}

/// Vote for an option. Responds with the tally as it stands after the write,
/// or with the restored pre-vote tally if the write failed.
pub async fn vote(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    viewer: Viewer,
    Json(body): Json<VoteBody>,
) -> Result<Response, AppError> {
    let loaded = state.store.load_poll(PollId(poll_id), Some(viewer.id)).await?;
    let coordinator = VoteCoordinator::new(loaded, viewer, state.store.clone())?;

    if let SelectOutcome::Ignored(reason) = coordinator.select(body.option_id) {
        return Err(ignored(reason));
    }

    match coordinator.submit().await {
        SubmitOutcome::Committed(tally) => {
            info!(%poll_id, option_id = %body.option_id, "vote recorded");
            Ok(Json(VoteResponse {
                results: tally.entries,
                total_votes: tally.total_votes,
                error: None,
            })
            .into_response())
        }
        SubmitOutcome::RolledBack { failure, restored } => {
            let status = match failure {
                WriteFailure::Duplicate => StatusCode::CONFLICT,
                WriteFailure::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
                WriteFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
                WriteFailure::Network(_) => StatusCode::BAD_GATEWAY,
            };
            let body = VoteResponse {
                results: restored.entries,
                total_votes: restored.total_votes,
                error: Some(failure.reason()),
            };
            Ok((status, Json(body)).into_response())
        }
        SubmitOutcome::Ignored(reason) => Err(ignored(reason)),
    }
}

/// Edit a poll's title and options (creator or admin only)
pub async fn update_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    viewer: Viewer,
    Json(edit): Json<EditPoll>,
) -> Result<Json<Poll>, AppError> {
    let poll_id = PollId(poll_id);
    let loaded = state.store.load_poll(poll_id, None).await?;
    if !viewer.can_manage(&loaded.poll) {
        return Err(AppError::Forbidden);
    }

    Ok(Json(state.store.update_poll(poll_id, edit).await?))
}

/// Delete a poll (creator or admin only)
pub async fn delete_poll(
    State(state): State<AppState>,
    Path(poll_id): Path<Uuid>,
    viewer: Viewer,
) -> Result<StatusCode, AppError> {
    let poll_id = PollId(poll_id);
    let loaded = state.store.load_poll(poll_id, None).await?;
    if !viewer.can_manage(&loaded.poll) {
        return Err(AppError::Forbidden);
    }

    state.store.delete_poll(poll_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn ignored(reason: IgnoreReason) -> AppError {
    match reason {
        IgnoreReason::AlreadyVoted => AppError::Conflict("already voted on this poll".into()),
        IgnoreReason::AlreadyPending => AppError::Conflict("a vote is already in flight".into()),
        IgnoreReason::UnknownOption => AppError::BadRequest("option is not part of this poll".into()),
        IgnoreReason::NoSelection => AppError::BadRequest("no option selected".into()),
    }
}

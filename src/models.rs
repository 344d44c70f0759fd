// src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(pub i32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PollId(pub Uuid);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewerId(pub Uuid);

impl fmt::Display for OptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for PollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ViewerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Raw aggregated vote counts keyed by option. Signed so that a bad
/// aggregate can be rejected instead of wrapping.
pub type VoteCounts = HashMap<OptionId, i64>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: OptionId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: PollId,
    pub title: String,
    pub description: String,
    pub creator_id: ViewerId,
    pub options: Vec<PollOption>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl Role {
    /// Any role satisfies `User`; only `Admin` satisfies `Admin`.
    pub fn satisfies(self, required: Role) -> bool {
        match required {
            Role::User => true,
            Role::Admin => self == Role::Admin,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    pub id: ViewerId,
    #[serde(default)]
    pub role: Role,
}

impl Viewer {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Creators may manage their own polls, admins may manage any poll.
    pub fn can_manage(&self, poll: &Poll) -> bool {
        self.is_admin() || self.id == poll.creator_id
    }
}

/// Everything the poll loader hands to the core for one viewer.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedPoll {
    pub poll: Poll,
    pub counts: VoteCounts,
    pub viewer_vote: Option<OptionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRequest {
    pub poll_id: PollId,
    pub option_id: OptionId,
    pub viewer_id: ViewerId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewPoll {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub options: Vec<String>,
}

/// One option in an edit payload. Options without an id are new; options
/// of the poll that are left out are removed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EditOption {
    #[serde(default)]
    pub id: Option<OptionId>,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditPoll {
    pub title: String,
    /// Left unchanged when absent.
    #[serde(default)]
    pub description: Option<String>,
    pub options: Vec<EditOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollSummary {
    pub id: PollId,
    pub creator_id: ViewerId,
    pub title: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub total_votes: u64,
}

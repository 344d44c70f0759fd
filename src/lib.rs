// src/lib.rs
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod store;
pub mod tally;

pub use coordinator::{SubmitOutcome, VoteCoordinator, VotePhase, VoteView};
pub use error::{AppError, StoreError, TallyError, WriteFailure};
pub use store::{PollLoader, PollStore, VoteWriter};
pub use tally::{compute_tally, SortOrder, Tally, TallyEntry};

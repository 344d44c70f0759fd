// src/db.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{StoreError, WriteFailure};
use crate::models::{
    EditPoll, LoadedPoll, NewPoll, OptionId, Poll, PollId, PollOption, PollSummary, ViewerId,
    VoteCounts, VoteRequest,
};
use crate::store::{
    removed_options, validate_edit_poll, validate_new_poll, PollLoader, PollStore, VoteWriter,
};

pub async fn create_pool(config: &Config) -> Result<Pool<Postgres>, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
}

/// Postgres-backed store. Expects `polls`, `poll_options` and `poll_votes`
/// tables, with a unique `(poll_id, user_id)` constraint on `poll_votes`.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
    write_timeout: Duration,
}

#[derive(sqlx::FromRow)]
struct PollRow {
    id: Uuid,
    title: String,
    description: Option<String>,
    user_id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OptionRow {
    id: i32,
    option_text: String,
}

#[derive(sqlx::FromRow)]
struct SummaryRow {
    id: Uuid,
    user_id: Uuid,
    title: String,
    description: Option<String>,
    created_at: DateTime<Utc>,
    total_votes: i64,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>, write_timeout: Duration) -> Self {
        Self { pool, write_timeout }
    }

    async fn insert_vote(&self, vote: &VoteRequest) -> Result<u64, sqlx::Error> {
        // The option must belong to the poll being voted on.
        let result = sqlx::query(
            "INSERT INTO poll_votes (poll_id, option_id, user_id) \
             SELECT $1, id, $3 FROM poll_options WHERE id = $2 AND poll_id = $1",
        )
        .bind(vote.poll_id.0)
        .bind(vote.option_id.0)
        .bind(vote.viewer_id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

/// Run a vote insert under `limit`. Zero inserted rows means the option did
/// not belong to the poll.
async fn timed_write<F>(limit: Duration, write: F) -> Result<(), WriteFailure>
where
    F: Future<Output = Result<u64, sqlx::Error>>,
{
    let inserted = tokio::time::timeout(limit, write)
        .await
        .map_err(|_| WriteFailure::Timeout)?
        .map_err(classify_write_error)?;

    if inserted == 0 {
        return Err(WriteFailure::Rejected("option is not part of this poll".into()));
    }
    Ok(())
}

fn classify_write_error(err: sqlx::Error) -> WriteFailure {
    match err {
        sqlx::Error::Database(db) if db.is_unique_violation() => WriteFailure::Duplicate,
        sqlx::Error::Database(db) => WriteFailure::Rejected(db.message().to_string()),
        sqlx::Error::Io(e) => WriteFailure::Network(e.to_string()),
        sqlx::Error::PoolTimedOut => WriteFailure::Network("connection pool timed out".into()),
        sqlx::Error::PoolClosed => WriteFailure::Network("connection pool closed".into()),
        other => WriteFailure::Rejected(other.to_string()),
    }
}

#[async_trait]
impl PollLoader for PgStore {
    async fn load_poll(
        &self,
        poll_id: PollId,
        viewer_id: Option<ViewerId>,
    ) -> Result<LoadedPoll, StoreError> {
        let row = sqlx::query_as::<_, PollRow>(
            "SELECT id, title, description, user_id, created_at FROM polls WHERE id = $1",
        )
        .bind(poll_id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(poll_id))?;

        let options = sqlx::query_as::<_, OptionRow>(
            "SELECT id, option_text FROM poll_options WHERE poll_id = $1 ORDER BY id",
        )
        .bind(poll_id.0)
        .fetch_all(&self.pool)
        .await?;

        let counts: VoteCounts = sqlx::query_as::<_, (i32, i64)>(
            "SELECT option_id, COUNT(*) AS vote_count FROM poll_votes \
             WHERE poll_id = $1 GROUP BY option_id",
        )
        .bind(poll_id.0)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(option_id, count)| (OptionId(option_id), count))
        .collect();

        let viewer_vote = match viewer_id {
            Some(viewer_id) => sqlx::query_scalar::<_, i32>(
                "SELECT option_id FROM poll_votes WHERE poll_id = $1 AND user_id = $2",
            )
            .bind(poll_id.0)
            .bind(viewer_id.0)
            .fetch_optional(&self.pool)
            .await?
            .map(OptionId),
            None => None,
        };

        debug!(%poll_id, options = options.len(), "loaded poll");

        Ok(LoadedPoll {
            poll: Poll {
                id: PollId(row.id),
                title: row.title,
                description: row.description.unwrap_or_default(),
                creator_id: ViewerId(row.user_id),
                options: options
                    .into_iter()
                    .map(|o| PollOption { id: OptionId(o.id), text: o.option_text })
                    .collect(),
                created_at: row.created_at,
            },
            counts,
            viewer_vote,
        })
    }
}

#[async_trait]
impl VoteWriter for PgStore {
    async fn cast_vote(&self, vote: &VoteRequest) -> Result<(), WriteFailure> {
        timed_write(self.write_timeout, self.insert_vote(vote))
            .await
            .inspect_err(|failure| {
                warn!(poll_id = %vote.poll_id, option_id = %vote.option_id, error = %failure, "vote write failed");
            })
    }
}

#[async_trait]
impl PollStore for PgStore {
    async fn list_polls(&self, creator: Option<ViewerId>) -> Result<Vec<PollSummary>, StoreError> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT p.id, p.user_id, p.title, p.description, p.created_at, \
                    COUNT(v.option_id) AS total_votes \
             FROM polls p LEFT JOIN poll_votes v ON v.poll_id = p.id \
             WHERE $1::uuid IS NULL OR p.user_id = $1 \
             GROUP BY p.id ORDER BY p.created_at DESC",
        )
        .bind(creator.map(|c| c.0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PollSummary {
                id: PollId(row.id),
                creator_id: ViewerId(row.user_id),
                title: row.title,
                description: row.description.unwrap_or_default(),
                created_at: row.created_at,
                total_votes: u64::try_from(row.total_votes).unwrap_or(0),
            })
            .collect())
    }

    async fn create_poll(&self, creator: ViewerId, poll: NewPoll) -> Result<Poll, StoreError> {
        let poll = validate_new_poll(poll)?;
        let id = PollId(Uuid::new_v4());

        let mut tx = self.pool.begin().await?;

        let created_at = sqlx::query_scalar::<_, DateTime<Utc>>(
            "INSERT INTO polls (id, title, description, user_id) VALUES ($1, $2, $3, $4) \
             RETURNING created_at",
        )
        .bind(id.0)
        .bind(&poll.title)
        .bind(&poll.description)
        .bind(creator.0)
        .fetch_one(&mut *tx)
        .await?;

        let mut options = Vec::with_capacity(poll.options.len());
        for text in poll.options {
            let option_id = sqlx::query_scalar::<_, i32>(
                "INSERT INTO poll_options (poll_id, option_text) VALUES ($1, $2) RETURNING id",
            )
            .bind(id.0)
            .bind(&text)
            .fetch_one(&mut *tx)
            .await?;
            options.push(PollOption { id: OptionId(option_id), text });
        }

        tx.commit().await?;
        info!(poll_id = %id, options = options.len(), "poll created");

        Ok(Poll {
            id,
            title: poll.title,
            description: poll.description,
            creator_id: creator,
            options,
            created_at,
        })
    }

    async fn update_poll(&self, poll_id: PollId, edit: EditPoll) -> Result<Poll, StoreError> {
        let edit = validate_edit_poll(edit)?;

        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query(
            "UPDATE polls SET title = $2, description = COALESCE($3, description) WHERE id = $1",
        )
        .bind(poll_id.0)
        .bind(&edit.title)
        .bind(edit.description.as_deref())
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if updated == 0 {
            return Err(StoreError::NotFound(poll_id));
        }

        let existing: Vec<OptionId> =
            sqlx::query_scalar::<_, i32>("SELECT id FROM poll_options WHERE poll_id = $1")
                .bind(poll_id.0)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .map(OptionId)
                .collect();

        for option_id in removed_options(&existing, &edit)? {
            let votes = sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM poll_votes WHERE option_id = $1",
            )
            .bind(option_id.0)
            .fetch_one(&mut *tx)
            .await?;
            if votes > 0 {
                return Err(StoreError::Invalid(format!(
                    "option {option_id} has votes and cannot be removed"
                )));
            }
            sqlx::query("DELETE FROM poll_options WHERE id = $1")
                .bind(option_id.0)
                .execute(&mut *tx)
                .await?;
        }

        for option in &edit.options {
            match option.id {
                Some(option_id) => {
                    sqlx::query(
                        "UPDATE poll_options SET option_text = $3 WHERE id = $1 AND poll_id = $2",
                    )
                    .bind(option_id.0)
                    .bind(poll_id.0)
                    .bind(&option.text)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query("INSERT INTO poll_options (poll_id, option_text) VALUES ($1, $2)")
                        .bind(poll_id.0)
                        .bind(&option.text)
                        .execute(&mut *tx)
                        .await?;
                }
            }
        }

        tx.commit().await?;
        info!(%poll_id, options = edit.options.len(), "poll updated");

        Ok(self.load_poll(poll_id, None).await?.poll)
    }

    async fn delete_poll(&self, poll_id: PollId) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Votes and options reference the poll, so they go first.
        sqlx::query("DELETE FROM poll_votes WHERE poll_id = $1")
            .bind(poll_id.0)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM poll_options WHERE poll_id = $1")
            .bind(poll_id.0)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM polls WHERE id = $1")
            .bind(poll_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(StoreError::NotFound(poll_id));
        }

        tx.commit().await?;
        info!(%poll_id, "poll deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn connection_errors_are_network_failures() {
        let reset = sqlx::Error::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer"));
        assert_eq!(classify_write_error(reset), WriteFailure::Network("reset by peer".into()));

        assert!(matches!(
            classify_write_error(sqlx::Error::PoolTimedOut),
            WriteFailure::Network(_)
        ));
        assert!(matches!(
            classify_write_error(sqlx::Error::PoolClosed),
            WriteFailure::Network(_)
        ));
    }

    #[test]
    fn other_errors_are_rejections() {
        assert!(matches!(
            classify_write_error(sqlx::Error::RowNotFound),
            WriteFailure::Rejected(_)
        ));
    }

    #[tokio::test]
    async fn stalled_write_times_out() {
        let stalled = std::future::pending::<Result<u64, sqlx::Error>>();

        let result = timed_write(Duration::from_millis(20), stalled).await;

        assert_eq!(result, Err(WriteFailure::Timeout));
    }

    #[tokio::test]
    async fn write_outcomes_are_classified() {
        assert_eq!(timed_write(Duration::from_secs(1), async { Ok(1) }).await, Ok(()));
        assert_eq!(
            timed_write(Duration::from_secs(1), async { Ok(0) }).await,
            Err(WriteFailure::Rejected("option is not part of this poll".into()))
        );
        assert!(matches!(
            timed_write(Duration::from_secs(1), async { Err(sqlx::Error::PoolClosed) }).await,
            Err(WriteFailure::Network(_))
        ));
    }
}

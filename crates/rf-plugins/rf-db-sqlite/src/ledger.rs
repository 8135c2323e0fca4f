//! Vote ledger and tally maintenance.
//!
//! Every ledger write runs in a transaction that ends with [`resum`], so the
//! cached `votes` column is derived from the ledger rows visible to that same
//! transaction and is committed (or rolled back) together with them.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use log::debug;
use rf_core::error::{AppError, Result};
use rf_core::models::{ContentKind, ContentRef, Vote, VoteValue};
use rf_core::traits::VoteLedger;
use sqlx::sqlite::{Sqlite, SqliteConnection};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use crate::{db_error, is_unique_violation, read_uuid, uuid_to_blob, SqliteForumRepo, BIND_CHUNK};

/// Table holding the content rows of a kind.
pub(crate) fn table_of(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Post => "posts",
        ContentKind::Comment => "comments",
    }
}

pub(crate) async fn insert_vote(conn: &mut SqliteConnection, vote: &Vote) -> Result<()> {
    sqlx::query("INSERT INTO votes (voter_id, target_kind, target_id, value) VALUES (?, ?, ?, ?)")
        .bind(uuid_to_blob(vote.voter_id))
        .bind(vote.target.kind().as_str())
        .bind(uuid_to_blob(vote.target.id()))
        .bind(vote.value.as_i64())
        .execute(&mut *conn)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::DuplicateVote(format!("{} has already voted on {}", vote.voter_id, vote.target))
            } else {
                db_error(err)
            }
        })?;
    Ok(())
}

/// Recomputes the target's cached tally from the ledger and returns it.
/// Fails with `NotFound` when the target row does not exist.
pub(crate) async fn resum(conn: &mut SqliteConnection, target: ContentRef) -> Result<i64> {
    let sql = format!(
        "UPDATE {} SET votes = (SELECT COALESCE(SUM(value), 0) FROM votes WHERE target_kind = ? AND target_id = ?) \
         WHERE id = ? RETURNING votes",
        table_of(target.kind())
    );
    let row = sqlx::query(&sql)
        .bind(target.kind().as_str())
        .bind(uuid_to_blob(target.id()))
        .bind(uuid_to_blob(target.id()))
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;

    match row {
        Some(row) => row.try_get::<i64, _>("votes").map_err(db_error),
        None => Err(AppError::not_found(target.kind().as_str(), target.id())),
    }
}

fn read_kind(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<ContentKind> {
    let kind: String = row.try_get("target_kind")?;
    Ok(kind.parse::<ContentKind>()?)
}

fn read_value(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<VoteValue> {
    let value: i64 = row.try_get("value")?;
    Ok(VoteValue::try_from(value)?)
}

#[async_trait]
impl VoteLedger for SqliteForumRepo {
    async fn find_vote(&self, voter_id: Uuid, target: ContentRef) -> Result<Option<Vote>> {
        let row = sqlx::query("SELECT value FROM votes WHERE voter_id = ? AND target_kind = ? AND target_id = ?")
            .bind(uuid_to_blob(voter_id))
            .bind(target.kind().as_str())
            .bind(uuid_to_blob(target.id()))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match row {
            Some(row) => Ok(Some(Vote { voter_id, target, value: read_value(&row)? })),
            None => Ok(None),
        }
    }

    async fn record(&self, vote: &Vote) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        insert_vote(&mut tx, vote).await?;
        let score = resum(&mut tx, vote.target).await?;
        tx.commit().await.map_err(db_error)?;

        debug!("recorded {:+} by {} on {}, tally {}", vote.value.as_i64(), vote.voter_id, vote.target, score);
        Ok(score)
    }

    async fn amend(&self, vote: &Vote, new_value: VoteValue) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let updated = sqlx::query("UPDATE votes SET value = ? WHERE voter_id = ? AND target_kind = ? AND target_id = ?")
            .bind(new_value.as_i64())
            .bind(uuid_to_blob(vote.voter_id))
            .bind(vote.target.kind().as_str())
            .bind(uuid_to_blob(vote.target.id()))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        if updated.rows_affected() == 0 {
            return Err(AppError::not_found("vote", vote.target));
        }
        let score = resum(&mut tx, vote.target).await?;
        tx.commit().await.map_err(db_error)?;

        debug!("amended vote by {} on {} to {:+}, tally {}", vote.voter_id, vote.target, new_value.as_i64(), score);
        Ok(score)
    }

    async fn remove(&self, vote: &Vote) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let deleted = sqlx::query("DELETE FROM votes WHERE voter_id = ? AND target_kind = ? AND target_id = ?")
            .bind(uuid_to_blob(vote.voter_id))
            .bind(vote.target.kind().as_str())
            .bind(uuid_to_blob(vote.target.id()))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        if deleted.rows_affected() == 0 {
            return Err(AppError::not_found("vote", vote.target));
        }
        let score = resum(&mut tx, vote.target).await?;
        tx.commit().await.map_err(db_error)?;

        debug!("removed vote by {} on {}, tally {}", vote.voter_id, vote.target, score);
        Ok(score)
    }

    async fn cached_tally(&self, target: ContentRef) -> Result<Option<i64>> {
        let sql = format!("SELECT votes FROM {} WHERE id = ?", table_of(target.kind()));
        let row = sqlx::query(&sql)
            .bind(uuid_to_blob(target.id()))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        row.map(|row| row.try_get::<i64, _>("votes")).transpose().map_err(db_error)
    }

    async fn votes_for(&self, target: ContentRef) -> Result<Vec<Vote>> {
        let rows = sqlx::query("SELECT voter_id, value FROM votes WHERE target_kind = ? AND target_id = ? ORDER BY id")
            .bind(target.kind().as_str())
            .bind(uuid_to_blob(target.id()))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter()
            .map(|row| -> Result<Vote> {
                Ok(Vote { voter_id: read_uuid(row, "voter_id")?, target, value: read_value(row)? })
            })
            .collect()
    }

    async fn votes_by(&self, voter_id: Uuid, targets: &[ContentRef]) -> Result<HashMap<ContentRef, VoteValue>> {
        if targets.is_empty() {
            return Ok(HashMap::new());
        }

        let wanted: HashSet<&ContentRef> = targets.iter().collect();
        let mut votes = HashMap::new();

        for chunk in targets.chunks(BIND_CHUNK) {
            let mut query: QueryBuilder<Sqlite> =
                QueryBuilder::new("SELECT target_kind, target_id, value FROM votes WHERE voter_id = ");
            query.push_bind(uuid_to_blob(voter_id));
            query.push(" AND target_id IN (");
            let mut ids = query.separated(", ");
            for target in chunk {
                ids.push_bind(uuid_to_blob(target.id()));
            }
            ids.push_unseparated(")");

            let rows = query.build().fetch_all(&self.pool).await.map_err(db_error)?;
            for row in &rows {
                let target = ContentRef::new(read_kind(row)?, read_uuid(row, "target_id")?);
                if wanted.contains(&target) {
                    votes.insert(target, read_value(row)?);
                }
            }
        }
        Ok(votes)
    }
}

//! # rf-db-sqlite Implementation
//!
//! This module implements the data mapping between the SQLite relational model
//! and the `rf-core` domain models.
//!
//! Multi-row writes run inside a single `pool.begin()` transaction so the
//! content row, its text, the author's self-vote, the grants and the cached
//! tally are committed together or not at all.

mod content;
mod ledger;
mod schema;

use std::str::FromStr;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::info;
use rf_core::error::{AppError, Result};
use rf_core::models::{Capability, Session, Subreddit, User};
use rf_core::traits::{CapabilityStore, CommunityRepo, SessionRepo, UserRepo};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

/// Most ids bound into one `IN (...)` list. SQLite caps host parameters
/// per statement, so longer lists are split across queries.
pub(crate) const BIND_CHUNK: usize = 500;

pub struct SqliteForumRepo {
    pool: SqlitePool,
}

impl SqliteForumRepo {
    /// Opens (creating if needed) the database at `url` and applies the
    /// schema. `sqlite::memory:` gives a private in-memory database.
    pub async fn new(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        // each in-memory connection is its own database, so pin exactly one
        let in_memory = url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(options).await?;

        schema::initialize(&pool).await?;
        info!("sqlite store ready at {url}");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

// Helpers for UUID and timestamp conversion
pub(crate) fn uuid_to_blob(id: Uuid) -> Vec<u8> {
    id.as_bytes().to_vec()
}

pub(crate) fn read_uuid(row: &SqliteRow, column: &str) -> anyhow::Result<Uuid> {
    let blob: Vec<u8> = row.try_get(column)?;
    Ok(Uuid::from_slice(&blob)?)
}

pub(crate) fn read_opt_uuid(row: &SqliteRow, column: &str) -> anyhow::Result<Option<Uuid>> {
    let blob: Option<Vec<u8>> = row.try_get(column)?;
    Ok(blob.map(|b| Uuid::from_slice(&b)).transpose()?)
}

pub(crate) fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn read_time(row: &SqliteRow, column: &str) -> anyhow::Result<DateTime<Utc>> {
    let micros: i64 = row.try_get(column)?;
    DateTime::from_timestamp_micros(micros).ok_or_else(|| anyhow!("column {column} holds out-of-range timestamp {micros}"))
}

pub(crate) fn db_error(err: sqlx::Error) -> AppError {
    AppError::Internal(format!("database error: {err}"))
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn user_from_row(row: &SqliteRow) -> anyhow::Result<User> {
    Ok(User {
        id: read_uuid(row, "id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        signup_time: read_time(row, "signup_time")?,
        is_active: row.try_get("is_active")?,
    })
}

fn subreddit_from_row(row: &SqliteRow) -> anyhow::Result<Subreddit> {
    Ok(Subreddit {
        id: read_uuid(row, "id")?,
        name: row.try_get("name")?,
        creator_id: read_uuid(row, "creator_id")?,
        created_at: read_time(row, "created_at")?,
        is_deleted: row.try_get("is_deleted")?,
    })
}

fn session_from_row(row: &SqliteRow) -> anyhow::Result<Session> {
    Ok(Session {
        token_digest: row.try_get("token_digest")?,
        user_id: read_uuid(row, "user_id")?,
        issued_at: read_time(row, "issued_at")?,
        expires_at: read_time(row, "expires_at")?,
    })
}

#[async_trait]
impl UserRepo for SqliteForumRepo {
    async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, signup_time, is_active) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(uuid_to_blob(user.id))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(to_micros(user.signup_time))
        .bind(user.is_active)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                AppError::NameConflict(format!("username '{}' is taken", user.username))
            } else {
                db_error(err)
            }
        })?;
        Ok(())
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut users = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(BIND_CHUNK) {
            let mut query: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT * FROM users WHERE id IN (");
            let mut separated = query.separated(", ");
            for id in chunk {
                separated.push_bind(uuid_to_blob(*id));
            }
            separated.push_unseparated(")");

            let rows = query.build().fetch_all(&self.pool).await.map_err(db_error)?;
            for row in &rows {
                users.push(user_from_row(row)?);
            }
        }
        Ok(users)
    }

    async fn update_credentials(&self, id: Uuid, email: &str, password_hash: &str) -> Result<()> {
        let updated = sqlx::query("UPDATE users SET email = ?, password_hash = ? WHERE id = ?")
            .bind(email)
            .bind(password_hash)
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if updated.rows_affected() == 0 {
            return Err(AppError::not_found("user", id));
        }
        Ok(())
    }

    async fn deactivate_user(&self, id: Uuid) -> Result<()> {
        let updated = sqlx::query("UPDATE users SET is_active = 0 WHERE id = ?")
            .bind(uuid_to_blob(id))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        if updated.rows_affected() == 0 {
            return Err(AppError::not_found("user", id));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRepo for SqliteForumRepo {
    async fn create_session(&self, session: &Session) -> Result<()> {
        sqlx::query("INSERT INTO sessions (token_digest, user_id, issued_at, expires_at) VALUES (?, ?, ?, ?)")
            .bind(&session.token_digest)
            .bind(uuid_to_blob(session.user_id))
            .bind(to_micros(session.issued_at))
            .bind(to_micros(session.expires_at))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn find_session(&self, token_digest: &str) -> Result<Option<Session>> {
        let row = sqlx::query("SELECT * FROM sessions WHERE token_digest = ?")
            .bind(token_digest)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.as_ref().map(session_from_row).transpose()?)
    }

    async fn delete_sessions_for(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE user_id = ?")
            .bind(uuid_to_blob(user_id))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }
}

#[async_trait]
impl CommunityRepo for SqliteForumRepo {
    /// The community row and its creator's subscription and moderator rows
    /// are written in one transaction.
    async fn create_subreddit(&self, subreddit: &Subreddit) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query("INSERT INTO subreddits (id, name, creator_id, created_at, is_deleted) VALUES (?, ?, ?, ?, ?)")
            .bind(uuid_to_blob(subreddit.id))
            .bind(&subreddit.name)
            .bind(uuid_to_blob(subreddit.creator_id))
            .bind(to_micros(subreddit.created_at))
            .bind(subreddit.is_deleted)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    AppError::NameConflict(format!("subreddit '{}' already exists", subreddit.name))
                } else {
                    db_error(err)
                }
            })?;

        for table in ["subscriptions", "moderators"] {
            let sql = format!("INSERT INTO {table} (subreddit_id, user_id) VALUES (?, ?)");
            sqlx::query(&sql)
                .bind(uuid_to_blob(subreddit.id))
                .bind(uuid_to_blob(subreddit.creator_id))
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn find_subreddit(&self, name: &str) -> Result<Option<Subreddit>> {
        let row = sqlx::query("SELECT * FROM subreddits WHERE name = ? AND is_deleted = 0")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.as_ref().map(subreddit_from_row).transpose()?)
    }

    async fn get_subreddit(&self, id: Uuid) -> Result<Option<Subreddit>> {
        let row = sqlx::query("SELECT * FROM subreddits WHERE id = ?")
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.as_ref().map(subreddit_from_row).transpose()?)
    }

    async fn set_subscription(&self, subreddit_id: Uuid, user_id: Uuid, subscribed: bool) -> Result<()> {
        let sql = if subscribed {
            "INSERT OR IGNORE INTO subscriptions (subreddit_id, user_id) VALUES (?, ?)"
        } else {
            "DELETE FROM subscriptions WHERE subreddit_id = ? AND user_id = ?"
        };
        sqlx::query(sql)
            .bind(uuid_to_blob(subreddit_id))
            .bind(uuid_to_blob(user_id))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn subscribers(&self, subreddit_id: Uuid) -> Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT user_id FROM subscriptions WHERE subreddit_id = ?")
            .bind(uuid_to_blob(subreddit_id))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.iter().map(|row| read_uuid(row, "user_id")).collect::<anyhow::Result<Vec<_>>>()?)
    }

    async fn moderators(&self, subreddit_id: Uuid) -> Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT user_id FROM moderators WHERE subreddit_id = ?")
            .bind(uuid_to_blob(subreddit_id))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.iter().map(|row| read_uuid(row, "user_id")).collect::<anyhow::Result<Vec<_>>>()?)
    }
}

#[async_trait]
impl CapabilityStore for SqliteForumRepo {
    async fn has_capability(&self, capability: &Capability) -> Result<bool> {
        sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM capabilities \
             WHERE principal_id = ? AND object_kind = ? AND object_id = ? AND action = ?)",
        )
        .bind(uuid_to_blob(capability.principal_id))
        .bind(capability.object.kind().as_str())
        .bind(uuid_to_blob(capability.object.id()))
        .bind(capability.action.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)
    }
}

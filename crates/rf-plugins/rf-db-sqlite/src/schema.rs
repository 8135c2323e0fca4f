//! Table layout. Statements are idempotent and run on every start-up.
//!
//! Timestamps are stored as INTEGER microseconds since the epoch so that SQL
//! ordering matches chronological ordering. UUIDs are 16-byte BLOBs.

use anyhow::Context;
use sqlx::sqlite::SqlitePool;

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            BLOB PRIMARY KEY,
        username      TEXT NOT NULL UNIQUE,
        email         TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        signup_time   INTEGER NOT NULL,
        is_active     INTEGER NOT NULL DEFAULT 1
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        token_digest TEXT PRIMARY KEY,
        user_id      BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        issued_at    INTEGER NOT NULL,
        expires_at   INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subreddits (
        id         BLOB PRIMARY KEY,
        name       TEXT NOT NULL,
        creator_id BLOB NOT NULL REFERENCES users(id),
        created_at INTEGER NOT NULL,
        is_deleted INTEGER NOT NULL DEFAULT 0
    )
    "#,
    // names are unique among live communities only
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_subreddits_live_name ON subreddits(name) WHERE is_deleted = 0",
    r#"
    CREATE TABLE IF NOT EXISTS subscriptions (
        subreddit_id BLOB NOT NULL REFERENCES subreddits(id) ON DELETE CASCADE,
        user_id      BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        PRIMARY KEY (subreddit_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS moderators (
        subreddit_id BLOB NOT NULL REFERENCES subreddits(id) ON DELETE CASCADE,
        user_id      BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
        PRIMARY KEY (subreddit_id, user_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id           BLOB PRIMARY KEY,
        subreddit_id BLOB NOT NULL REFERENCES subreddits(id),
        author_id    BLOB NOT NULL REFERENCES users(id),
        slug         TEXT NOT NULL,
        is_link      INTEGER NOT NULL,
        link         TEXT,
        created_at   INTEGER NOT NULL,
        is_deleted   INTEGER NOT NULL DEFAULT 0,
        votes        INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_posts_rank ON posts(subreddit_id, votes DESC, created_at ASC)",
    r#"
    CREATE TABLE IF NOT EXISTS comments (
        id         BLOB PRIMARY KEY,
        post_id    BLOB NOT NULL REFERENCES posts(id),
        parent_id  BLOB REFERENCES comments(id),
        author_id  BLOB NOT NULL REFERENCES users(id),
        created_at INTEGER NOT NULL,
        is_deleted INTEGER NOT NULL DEFAULT 0,
        votes      INTEGER NOT NULL DEFAULT 0
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id)",
    // text sub-entity, keyed by the id of the post or comment that owns it
    r#"
    CREATE TABLE IF NOT EXISTS texts (
        content_id    BLOB PRIMARY KEY,
        title         TEXT,
        body          TEXT NOT NULL,
        last_modified INTEGER NOT NULL
    )
    "#,
    "CREATE TRIGGER IF NOT EXISTS trg_posts_drop_text AFTER DELETE ON posts BEGIN DELETE FROM texts WHERE content_id = OLD.id; END",
    "CREATE TRIGGER IF NOT EXISTS trg_comments_drop_text AFTER DELETE ON comments BEGIN DELETE FROM texts WHERE content_id = OLD.id; END",
    r#"
    CREATE TABLE IF NOT EXISTS votes (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        voter_id    BLOB NOT NULL REFERENCES users(id),
        target_kind TEXT NOT NULL CHECK (target_kind IN ('post', 'comment')),
        target_id   BLOB NOT NULL,
        value       INTEGER NOT NULL CHECK (value IN (-1, 1)),
        UNIQUE (voter_id, target_kind, target_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_votes_target ON votes(target_kind, target_id)",
    r#"
    CREATE TABLE IF NOT EXISTS capabilities (
        principal_id BLOB NOT NULL REFERENCES users(id),
        object_kind  TEXT NOT NULL CHECK (object_kind IN ('post', 'comment')),
        object_id    BLOB NOT NULL,
        action       TEXT NOT NULL CHECK (action IN ('edit', 'delete')),
        PRIMARY KEY (principal_id, object_kind, object_id, action)
    )
    "#,
];

pub async fn initialize(pool: &SqlitePool) -> anyhow::Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("failed to apply schema statement: {}", statement.trim()))?;
    }
    Ok(())
}

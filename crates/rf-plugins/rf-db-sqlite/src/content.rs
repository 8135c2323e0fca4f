//! Posts, comments and their text rows.

use async_trait::async_trait;
use log::debug;
use rf_core::error::{AppError, Result};
use rf_core::models::{Comment, ContentRef, ListedPost, Page, Post, Seed, Text};
use rf_core::traits::ContentRepo;
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use uuid::Uuid;

use crate::ledger::{insert_vote, resum, table_of};
use crate::{db_error, read_opt_uuid, read_time, read_uuid, to_micros, uuid_to_blob, SqliteForumRepo};

const POST_COLUMNS: &str = "p.id, p.subreddit_id, p.author_id, p.slug, p.is_link, p.link, p.created_at, \
                            p.is_deleted, p.votes, t.title, t.body, t.last_modified";

const COMMENT_COLUMNS: &str = "c.id, c.post_id, c.parent_id, c.author_id, c.created_at, c.is_deleted, c.votes, \
                               t.title, t.body, t.last_modified";

fn text_from_row(row: &SqliteRow) -> anyhow::Result<Text> {
    Ok(Text {
        title: row.try_get("title")?,
        body: row.try_get("body")?,
        last_modified: read_time(row, "last_modified")?,
    })
}

fn post_from_row(row: &SqliteRow) -> anyhow::Result<Post> {
    Ok(Post {
        id: read_uuid(row, "id")?,
        subreddit_id: read_uuid(row, "subreddit_id")?,
        author_id: read_uuid(row, "author_id")?,
        created_at: read_time(row, "created_at")?,
        is_link: row.try_get("is_link")?,
        link: row.try_get("link")?,
        slug: row.try_get("slug")?,
        text: text_from_row(row)?,
        is_deleted: row.try_get("is_deleted")?,
        votes: row.try_get("votes")?,
    })
}

fn comment_from_row(row: &SqliteRow) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: read_uuid(row, "id")?,
        post_id: read_uuid(row, "post_id")?,
        parent_id: read_opt_uuid(row, "parent_id")?,
        author_id: read_uuid(row, "author_id")?,
        created_at: read_time(row, "created_at")?,
        text: text_from_row(row)?,
        is_deleted: row.try_get("is_deleted")?,
        votes: row.try_get("votes")?,
    })
}

async fn insert_text(conn: &mut SqliteConnection, content_id: Uuid, text: &Text) -> Result<()> {
    sqlx::query("INSERT INTO texts (content_id, title, body, last_modified) VALUES (?, ?, ?, ?)")
        .bind(uuid_to_blob(content_id))
        .bind(text.title.as_deref())
        .bind(&text.body)
        .bind(to_micros(text.last_modified))
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    Ok(())
}

/// Writes the self-vote and grants of freshly inserted content and returns
/// the re-summed tally.
/// Explains why a guarded text update touched no row.
async fn frozen_or_missing(conn: &mut SqliteConnection, target: ContentRef) -> AppError {
    let sql = format!("SELECT is_deleted FROM {} WHERE id = ?", table_of(target.kind()));
    let found = sqlx::query_scalar::<_, bool>(&sql)
        .bind(uuid_to_blob(target.id()))
        .fetch_optional(&mut *conn)
        .await;
    match found {
        Ok(Some(true)) => AppError::Forbidden(format!("{target} has been deleted")),
        Ok(_) => AppError::not_found(target.kind().as_str(), target.id()),
        Err(err) => db_error(err),
    }
}

async fn plant_seed(conn: &mut SqliteConnection, seed: &Seed) -> Result<i64> {
    insert_vote(conn, &seed.self_vote).await?;
    for grant in &seed.grants {
        sqlx::query("INSERT OR IGNORE INTO capabilities (principal_id, object_kind, object_id, action) VALUES (?, ?, ?, ?)")
            .bind(uuid_to_blob(grant.principal_id))
            .bind(grant.object.kind().as_str())
            .bind(uuid_to_blob(grant.object.id()))
            .bind(grant.action.as_str())
            .execute(&mut *conn)
            .await
            .map_err(db_error)?;
    }
    resum(conn, seed.self_vote.target).await
}

#[async_trait]
impl ContentRepo for SqliteForumRepo {
    /// The post row, its text, the self-vote and the author's grants land in
    /// one transaction; a failure anywhere leaves nothing behind.
    async fn create_post(&self, post: &Post, seed: &Seed) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            "INSERT INTO posts (id, subreddit_id, author_id, slug, is_link, link, created_at, is_deleted, votes) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(uuid_to_blob(post.id))
        .bind(uuid_to_blob(post.subreddit_id))
        .bind(uuid_to_blob(post.author_id))
        .bind(&post.slug)
        .bind(post.is_link)
        .bind(post.link.as_deref())
        .bind(to_micros(post.created_at))
        .bind(post.is_deleted)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        insert_text(&mut tx, post.id, &post.text).await?;
        let score = plant_seed(&mut tx, seed).await?;

        tx.commit().await.map_err(db_error)?;
        debug!("stored post {} with tally {}", post.id, score);
        Ok(score)
    }

    async fn create_comment(&self, comment: &Comment, seed: &Seed) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        sqlx::query(
            "INSERT INTO comments (id, post_id, parent_id, author_id, created_at, is_deleted, votes) \
             VALUES (?, ?, ?, ?, ?, ?, 0)",
        )
        .bind(uuid_to_blob(comment.id))
        .bind(uuid_to_blob(comment.post_id))
        .bind(comment.parent_id.map(uuid_to_blob))
        .bind(uuid_to_blob(comment.author_id))
        .bind(to_micros(comment.created_at))
        .bind(comment.is_deleted)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;

        insert_text(&mut tx, comment.id, &comment.text).await?;
        let score = plant_seed(&mut tx, seed).await?;

        tx.commit().await.map_err(db_error)?;
        debug!("stored comment {} on post {} with tally {}", comment.id, comment.post_id, score);
        Ok(score)
    }

    async fn get_post(&self, id: Uuid) -> Result<Option<Post>> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts p JOIN texts t ON t.content_id = p.id WHERE p.id = ?");
        let row = sqlx::query(&sql)
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.as_ref().map(post_from_row).transpose()?)
    }

    async fn get_comment(&self, id: Uuid) -> Result<Option<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments c JOIN texts t ON t.content_id = c.id WHERE c.id = ?");
        let row = sqlx::query(&sql)
            .bind(uuid_to_blob(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(row.as_ref().map(comment_from_row).transpose()?)
    }

    async fn update_post_text(&self, id: Uuid, text: &Text, slug: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let updated = sqlx::query("UPDATE posts SET slug = ? WHERE id = ? AND is_deleted = 0")
            .bind(slug)
            .bind(uuid_to_blob(id))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;
        if updated.rows_affected() == 0 {
            return Err(frozen_or_missing(&mut *tx, ContentRef::Post(id)).await);
        }

        sqlx::query("UPDATE texts SET title = ?, body = ?, last_modified = ? WHERE content_id = ?")
            .bind(text.title.as_deref())
            .bind(&text.body)
            .bind(to_micros(text.last_modified))
            .bind(uuid_to_blob(id))
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)?;
        Ok(())
    }

    async fn update_comment_text(&self, id: Uuid, text: &Text) -> Result<()> {
        let updated = sqlx::query(
            "UPDATE texts SET body = ?, last_modified = ? \
             WHERE content_id = ? AND EXISTS (SELECT 1 FROM comments WHERE id = texts.content_id AND is_deleted = 0)",
        )
        .bind(&text.body)
        .bind(to_micros(text.last_modified))
        .bind(uuid_to_blob(id))
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        if updated.rows_affected() == 0 {
            let mut conn = self.pool.acquire().await.map_err(db_error)?;
            return Err(frozen_or_missing(&mut *conn, ContentRef::Comment(id)).await);
        }
        Ok(())
    }

    async fn soft_delete(&self, target: ContentRef) -> Result<()> {
        let sql = format!("UPDATE {} SET is_deleted = 1 WHERE id = ?", table_of(target.kind()));
        let updated = sqlx::query(&sql)
            .bind(uuid_to_blob(target.id()))
            .execute(&self.pool)
            .await
            .map_err(db_error)?;

        if updated.rows_affected() == 0 {
            return Err(AppError::not_found(target.kind().as_str(), target.id()));
        }
        debug!("soft-deleted {}", target);
        Ok(())
    }

    async fn list_posts(&self, subreddit_id: Option<Uuid>, page: Page) -> Result<Vec<ListedPost>> {
        let sql = format!(
            "SELECT {POST_COLUMNS}, s.name AS subreddit_name, \
                    (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS num_comments \
             FROM posts p \
             JOIN texts t ON t.content_id = p.id \
             JOIN subreddits s ON s.id = p.subreddit_id \
             WHERE s.is_deleted = 0 AND (? IS NULL OR p.subreddit_id = ?) \
             ORDER BY p.votes DESC, p.created_at ASC, p.id ASC \
             LIMIT ? OFFSET ?"
        );
        let filter = subreddit_id.map(uuid_to_blob);
        let rows = sqlx::query(&sql)
            .bind(filter.clone())
            .bind(filter)
            .bind(page.limit)
            .bind(page.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        rows.iter()
            .map(|row| -> Result<ListedPost> {
                Ok(ListedPost {
                    post: post_from_row(row)?,
                    subreddit: row.try_get("subreddit_name").map_err(db_error)?,
                    num_comments: row.try_get("num_comments").map_err(db_error)?,
                })
            })
            .collect()
    }

    async fn list_comments(&self, post_id: Uuid) -> Result<Vec<Comment>> {
        let sql = format!("SELECT {COMMENT_COLUMNS} FROM comments c JOIN texts t ON t.content_id = c.id WHERE c.post_id = ?");
        let rows = sqlx::query(&sql)
            .bind(uuid_to_blob(post_id))
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;

        Ok(rows.iter().map(comment_from_row).collect::<anyhow::Result<Vec<_>>>()?)
    }
}

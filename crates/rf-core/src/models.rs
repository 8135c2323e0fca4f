//! # Domain Models
//!
//! These structs represent the core entities of Rusty-Forum.
//! We use UUID v7 for time-ordered, globally unique identification.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// A registered account. Redaction flips `is_active` and nothing else, so
/// authorship, votes and capabilities keep pointing at the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub signup_time: DateTime<Utc>,
    pub is_active: bool,
}

/// The authenticated caller, as handed to the core by the auth layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub is_active: bool,
}

impl From<&User> for Principal {
    fn from(user: &User) -> Self {
        Self { id: user.id, is_active: user.is_active }
    }
}

/// A bearer-token session. Only the digest of the token is persisted.
#[derive(Debug, Clone)]
pub struct Session {
    pub token_digest: String,
    pub user_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A named community (e.g., r/rust).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subreddit {
    pub id: Uuid,
    pub name: String,
    pub creator_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
}

/// The editable part of a post or comment. Kept apart from the content row so
/// that "edited" can be judged on text changes alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Text {
    /// Only posts carry a title.
    pub title: Option<String>,
    pub body: String,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub subreddit_id: Uuid,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub is_link: bool,
    pub link: Option<String>,
    /// Always `slug::slugify(title)`.
    pub slug: String,
    pub text: Text,
    pub is_deleted: bool,
    /// Cached sum of the vote ledger for this post.
    pub votes: i64,
}

impl Post {
    pub fn title(&self) -> &str {
        self.text.title.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: Uuid,
    pub post_id: Uuid,
    /// `None` for top-level comments.
    pub parent_id: Option<Uuid>,
    pub author_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub text: Text,
    pub is_deleted: bool,
    /// Cached sum of the vote ledger for this comment.
    pub votes: i64,
}

/// A post row joined with what a listing needs to show.
#[derive(Debug, Clone)]
pub struct ListedPost {
    pub post: Post,
    pub subreddit: String,
    pub num_comments: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Post,
    Comment,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Post => "post",
            ContentKind::Comment => "comment",
        }
    }
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(ContentKind::Post),
            "comment" => Ok(ContentKind::Comment),
            other => Err(AppError::ValidationError(format!("unknown content kind '{other}'"))),
        }
    }
}

/// A reference to exactly one post or exactly one comment. Used both as a
/// vote target and as the object of a capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum ContentRef {
    Post(Uuid),
    Comment(Uuid),
}

impl ContentRef {
    pub fn kind(&self) -> ContentKind {
        match self {
            ContentRef::Post(_) => ContentKind::Post,
            ContentRef::Comment(_) => ContentKind::Comment,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            ContentRef::Post(id) | ContentRef::Comment(id) => *id,
        }
    }

    pub fn new(kind: ContentKind, id: Uuid) -> Self {
        match kind {
            ContentKind::Post => ContentRef::Post(id),
            ContentKind::Comment => ContentRef::Comment(id),
        }
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.id())
    }
}

/// The only two values a stored vote may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum VoteValue {
    Up,
    Down,
}

impl VoteValue {
    pub fn as_i64(self) -> i64 {
        match self {
            VoteValue::Up => 1,
            VoteValue::Down => -1,
        }
    }
}

impl TryFrom<i64> for VoteValue {
    type Error = AppError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VoteValue::Up),
            -1 => Ok(VoteValue::Down),
            other => Err(AppError::InvalidValue(other)),
        }
    }
}

impl From<VoteValue> for i64 {
    fn from(value: VoteValue) -> Self {
        value.as_i64()
    }
}

/// One row of the vote ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub voter_id: Uuid,
    pub target: ContentRef,
    pub value: VoteValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Edit,
    Delete,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Edit => "edit",
            Action::Delete => "delete",
        }
    }
}

/// A per-object grant: `principal` may perform `action` on `object`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capability {
    pub principal_id: Uuid,
    pub object: ContentRef,
    pub action: Action,
}

/// Everything a new post or comment brings with it, written in the same
/// transaction as the content row.
#[derive(Debug, Clone)]
pub struct Seed {
    pub self_vote: Vote,
    pub grants: Vec<Capability>,
}

// ── Payloads ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewPost {
    pub title: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    pub is_link: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostEdit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewComment {
    pub post_id: Uuid,
    #[serde(default)]
    pub parent_comment_id: Option<Uuid>,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentEdit {
    pub text: String,
}

/// Account changes. Absent fields are left as they are.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

/// A vote as submitted by a client. The target may be given either as a
/// `(target_kind, target_id)` pair or through `post_id` / `comment_id`.
/// `value` is -1, 0 (retract) or 1.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoteRequest {
    #[serde(default)]
    pub target_id: Option<Uuid>,
    #[serde(default)]
    pub target_kind: Option<ContentKind>,
    #[serde(default)]
    pub post_id: Option<Uuid>,
    #[serde(default)]
    pub comment_id: Option<Uuid>,
    pub value: i64,
}

/// Listing window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl Page {
    pub const DEFAULT_LIMIT: i64 = 25;
    pub const MAX_LIMIT: i64 = 100;

    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self {
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT),
            offset: offset.unwrap_or(0).max(0),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

// ── Rendered output ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentView {
    pub id: Uuid,
    pub post_id: Uuid,
    pub author: String,
    pub text: String,
    pub created: DateTime<Utc>,
    pub edited: bool,
    pub created_time_ago: String,
    pub edited_time_ago: Option<String>,
    pub is_deleted: bool,
    pub score: i64,
    pub upvoted: bool,
    pub downvoted: bool,
    pub children: Vec<CommentView>,
    /// Direct replies left out because the thread hit the render depth cap.
    /// Fetch them through the comment's own endpoint.
    pub more_replies: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostView {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub subreddit: String,
    pub author: String,
    pub text: String,
    pub link: Option<String>,
    pub is_link: bool,
    pub created: DateTime<Utc>,
    pub edited: bool,
    pub created_time_ago: String,
    pub edited_time_ago: Option<String>,
    pub is_deleted: bool,
    pub score: i64,
    pub num_comments: i64,
    pub upvoted: bool,
    pub downvoted: bool,
    pub comments: Vec<CommentView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubredditView {
    pub name: String,
    pub creator: String,
    pub created: DateTime<Utc>,
    pub subscribers: i64,
    pub moderators: Vec<String>,
}

/// Result of a vote operation: the caller's standing vote (0 when retracted)
/// and the target's tally as persisted by the same transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VoteOutcome {
    pub target_id: Uuid,
    pub target_kind: ContentKind,
    pub value: i64,
    pub score: i64,
}

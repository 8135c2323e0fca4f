//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the binary.
//! Multi-row writes named here are atomic: an implementation either applies
//! all of them or none.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Capability, Comment, ContentRef, ListedPost, Page, Post, Seed, Session, Subreddit, Text, User,
    Vote, VoteValue,
};

/// Account persistence.
#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `NameConflict` when the username is taken.
    async fn create_user(&self, user: &User) -> Result<()>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn users_by_ids(&self, ids: &[Uuid]) -> Result<Vec<User>>;
    async fn update_credentials(&self, id: Uuid, email: &str, password_hash: &str) -> Result<()>;
    /// Redacts the account. The row and every reference to it survive.
    async fn deactivate_user(&self, id: Uuid) -> Result<()>;
}

/// Bearer-token sessions.
#[async_trait]
pub trait SessionRepo: Send + Sync {
    async fn create_session(&self, session: &Session) -> Result<()>;
    async fn find_session(&self, token_digest: &str) -> Result<Option<Session>>;
    async fn delete_sessions_for(&self, user_id: Uuid) -> Result<()>;
}

/// Subreddits, their subscribers and moderators.
#[async_trait]
pub trait CommunityRepo: Send + Sync {
    /// Inserts the community and adds its creator as subscriber and
    /// moderator. Fails with `NameConflict` when a live community already
    /// has this name.
    async fn create_subreddit(&self, subreddit: &Subreddit) -> Result<()>;
    /// Live (non-deleted) community by name.
    async fn find_subreddit(&self, name: &str) -> Result<Option<Subreddit>>;
    async fn get_subreddit(&self, id: Uuid) -> Result<Option<Subreddit>>;
    async fn set_subscription(&self, subreddit_id: Uuid, user_id: Uuid, subscribed: bool) -> Result<()>;
    async fn subscribers(&self, subreddit_id: Uuid) -> Result<Vec<Uuid>>;
    async fn moderators(&self, subreddit_id: Uuid) -> Result<Vec<Uuid>>;
}

/// Post and comment persistence.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Inserts the post, its text, the self-vote and the author grants, then
    /// re-sums the post's tally. Returns the persisted tally.
    async fn create_post(&self, post: &Post, seed: &Seed) -> Result<i64>;
    /// Same contract as `create_post`, for comments.
    async fn create_comment(&self, comment: &Comment, seed: &Seed) -> Result<i64>;
    async fn get_post(&self, id: Uuid) -> Result<Option<Post>>;
    async fn get_comment(&self, id: Uuid) -> Result<Option<Comment>>;
    /// Replaces the text sub-entity and the slug. Touches nothing else.
    async fn update_post_text(&self, id: Uuid, text: &Text, slug: &str) -> Result<()>;
    async fn update_comment_text(&self, id: Uuid, text: &Text) -> Result<()>;
    /// Sets the delete flag. Votes, text and children are kept.
    async fn soft_delete(&self, target: ContentRef) -> Result<()>;
    /// Posts ranked by (votes desc, created asc). `None` lists every live
    /// community.
    async fn list_posts(&self, subreddit_id: Option<Uuid>, page: Page) -> Result<Vec<ListedPost>>;
    /// Every comment of a post, in no particular order.
    async fn list_comments(&self, post_id: Uuid) -> Result<Vec<Comment>>;
}

/// The vote ledger. Every mutation re-sums the target's cached tally in the
/// same transaction and returns it.
#[async_trait]
pub trait VoteLedger: Send + Sync {
    async fn find_vote(&self, voter_id: Uuid, target: ContentRef) -> Result<Option<Vote>>;
    /// Fails with `DuplicateVote` if (voter, target) already has a row.
    async fn record(&self, vote: &Vote) -> Result<i64>;
    /// Fails with `NotFound` if (voter, target) has no row.
    async fn amend(&self, vote: &Vote, new_value: VoteValue) -> Result<i64>;
    /// Fails with `NotFound` if (voter, target) has no row.
    async fn remove(&self, vote: &Vote) -> Result<i64>;
    /// The cached tally column of the target.
    async fn cached_tally(&self, target: ContentRef) -> Result<Option<i64>>;
    /// Every ledger row referencing the target.
    async fn votes_for(&self, target: ContentRef) -> Result<Vec<Vote>>;
    /// The voter's own votes among `targets`.
    async fn votes_by(&self, voter_id: Uuid, targets: &[ContentRef]) -> Result<HashMap<ContentRef, VoteValue>>;
}

/// Per-object capability table.
#[async_trait]
pub trait CapabilityStore: Send + Sync {
    async fn has_capability(&self, capability: &Capability) -> Result<bool>;
}

/// Everything the `Forum` service needs from a database plugin.
pub trait ForumStore: UserRepo + SessionRepo + CommunityRepo + ContentRepo + VoteLedger + CapabilityStore {}

impl<T> ForumStore for T where T: UserRepo + SessionRepo + CommunityRepo + ContentRepo + VoteLedger + CapabilityStore {}

/// Identity contract.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Produces a self-describing password hash for storage.
    fn hash_password(&self, password: &str) -> anyhow::Result<String>;

    /// Verifies a password against a stored hash.
    async fn verify_password(&self, password: &str, hash: &str) -> bool;

    /// Generates a fresh opaque bearer token.
    fn issue_token(&self) -> anyhow::Result<String>;

    /// The form of a token that is safe to persist and look up.
    fn token_digest(&self, token: &str) -> String;
}

/// Source of "now". Swapped for a fixed clock in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

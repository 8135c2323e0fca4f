//! # Forum Service
//!
//! Coordinates the rules, the ownership gate and the store for every
//! operation the API exposes. Each write that has derived effects (self-vote,
//! grants, slug, re-summed tally) hands them to the store as one unit and
//! returns the entity as persisted.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Duration;
use log::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{
    Action, Comment, CommentEdit, CommentView, ContentRef, ListedPost, NewComment, NewPost, Page,
    Post, PostEdit, PostView, Principal, Seed, Session, Subreddit, SubredditView, Text, User,
    UserUpdate, VoteOutcome, VoteRequest, VoteValue,
};
use crate::permissions::{authorize, author_grants};
use crate::rules::{self, VoteIntent};
use crate::slug::slugify;
use crate::traits::{AuthProvider, Clock, ForumStore, SystemClock};
use crate::tree::{default_edit_grace, sort_ranked, Authors, CommentArena, RenderContext};

pub const MAX_TITLE_LEN: usize = 300;
pub const MAX_LINK_LEN: usize = 2000;
pub const MAX_SUBREDDIT_NAME_LEN: usize = 25;
pub const MAX_USERNAME_LEN: usize = 150;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

/// Tunables read from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ForumSettings {
    pub session_ttl: Duration,
    pub edit_grace: Duration,
}

impl Default for ForumSettings {
    fn default() -> Self {
        Self { session_ttl: Duration::days(14), edit_grace: default_edit_grace() }
    }
}

pub struct Forum {
    store: Arc<dyn ForumStore>,
    auth: Arc<dyn AuthProvider>,
    clock: Arc<dyn Clock>,
    settings: ForumSettings,
}

impl Forum {
    pub fn new(store: Arc<dyn ForumStore>, auth: Arc<dyn AuthProvider>, settings: ForumSettings) -> Self {
        Self { store, auth, clock: Arc::new(SystemClock), settings }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &dyn ForumStore {
        self.store.as_ref()
    }

    // ── Accounts ────────────────────────────────────────────────────────────

    /// Creates an account and opens its first session.
    pub async fn register(&self, username: &str, email: &str, password: &str) -> Result<(User, String)> {
        validate_username(username)?;
        validate_email(email)?;
        validate_password(password)?;

        if self.store.find_user_by_username(username).await?.is_some() {
            return Err(AppError::NameConflict(format!("username '{username}' is taken")));
        }

        let user = User {
            id: Uuid::now_v7(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: self.auth.hash_password(password)?,
            signup_time: self.clock.now(),
            is_active: true,
        };
        self.store.create_user(&user).await?;
        info!("registered user {} ({})", user.username, user.id);

        let token = self.start_session(user.id).await?;
        Ok((user, token))
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<(User, String)> {
        let rejected = || AppError::Unauthorized("a user with this username and password was not found".into());

        let user = self.store.find_user_by_username(username).await?.ok_or_else(rejected)?;
        if !self.auth.verify_password(password, &user.password_hash).await {
            return Err(rejected());
        }
        if !user.is_active {
            return Err(AppError::Unauthorized("this user has been deactivated".into()));
        }

        let token = self.start_session(user.id).await?;
        Ok((user, token))
    }

    /// Resolves a bearer token to the principal it was issued to.
    pub async fn authenticate(&self, token: &str) -> Result<Principal> {
        let digest = self.auth.token_digest(token);
        let session = self
            .store
            .find_session(&digest)
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid token".into()))?;
        if session.is_expired(self.clock.now()) {
            return Err(AppError::Unauthorized("token has expired".into()));
        }

        let user = self
            .store
            .get_user(session.user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid token".into()))?;
        if !user.is_active {
            return Err(AppError::Unauthorized("this user has been deactivated".into()));
        }
        Ok(Principal::from(&user))
    }

    pub async fn current_user(&self, principal: &Principal) -> Result<User> {
        self.store
            .get_user(principal.id)
            .await?
            .ok_or_else(|| AppError::not_found("user", principal.id))
    }

    /// Changes the caller's email or password. Sessions already issued stay
    /// valid.
    pub async fn update_user(&self, principal: &Principal, update: UserUpdate) -> Result<User> {
        ensure_active(principal)?;
        let mut user = self.current_user(principal).await?;

        if let Some(email) = update.email {
            validate_email(&email)?;
            user.email = email;
        }
        if let Some(password) = update.password {
            validate_password(&password)?;
            user.password_hash = self.auth.hash_password(&password)?;
        }

        self.store.update_credentials(user.id, &user.email, &user.password_hash).await?;
        info!("updated account {}", user.id);
        Ok(user)
    }

    /// Redacts the caller. Their content, votes and grants stay attributed to
    /// the same id; rendering shows `[deleted]` from now on.
    pub async fn redact_user(&self, principal: &Principal) -> Result<()> {
        ensure_active(principal)?;
        self.store.deactivate_user(principal.id).await?;
        self.store.delete_sessions_for(principal.id).await?;
        info!("redacted user {}", principal.id);
        Ok(())
    }

    async fn start_session(&self, user_id: Uuid) -> Result<String> {
        let now = self.clock.now();
        let expires_at = now
            .checked_add_signed(self.settings.session_ttl)
            .ok_or_else(|| AppError::Internal("session lifetime overflows the calendar".into()))?;
        let token = self.auth.issue_token()?;
        let session = Session { token_digest: self.auth.token_digest(&token), user_id, issued_at: now, expires_at };
        self.store.create_session(&session).await?;
        Ok(token)
    }

    // ── Communities ─────────────────────────────────────────────────────────

    pub async fn create_subreddit(&self, principal: &Principal, name: &str) -> Result<Subreddit> {
        ensure_active(principal)?;
        validate_subreddit_name(name)?;

        if self.store.find_subreddit(name).await?.is_some() {
            return Err(AppError::NameConflict(format!("subreddit '{name}' already exists")));
        }

        let subreddit = Subreddit {
            id: Uuid::now_v7(),
            name: name.to_string(),
            creator_id: principal.id,
            created_at: self.clock.now(),
            is_deleted: false,
        };
        self.store.create_subreddit(&subreddit).await?;
        info!("created r/{} by {}", subreddit.name, principal.id);
        Ok(subreddit)
    }

    pub async fn set_subscription(&self, principal: &Principal, name: &str, subscribed: bool) -> Result<()> {
        ensure_active(principal)?;
        let subreddit = self.live_subreddit(name).await?;
        self.store.set_subscription(subreddit.id, principal.id, subscribed).await
    }

    pub async fn subreddit_details(&self, name: &str) -> Result<SubredditView> {
        let subreddit = self.live_subreddit(name).await?;
        let subscribers = self.store.subscribers(subreddit.id).await?;
        let moderator_ids = self.store.moderators(subreddit.id).await?;

        let mut ids = moderator_ids.clone();
        ids.push(subreddit.creator_id);
        let authors = self.authors_for(ids).await?;

        let mut moderators: Vec<String> =
            moderator_ids.iter().map(|id| authors.display(*id).to_string()).collect();
        moderators.sort();

        Ok(SubredditView {
            name: subreddit.name,
            creator: authors.display(subreddit.creator_id).to_string(),
            created: subreddit.created_at,
            subscribers: subscribers.len() as i64,
            moderators,
        })
    }

    async fn live_subreddit(&self, name: &str) -> Result<Subreddit> {
        self.store
            .find_subreddit(name)
            .await?
            .ok_or_else(|| AppError::not_found("subreddit", name))
    }

    // ── Posts ───────────────────────────────────────────────────────────────

    /// Creates a post with its self-vote and author grants. The returned post
    /// already carries the persisted tally.
    pub async fn create_post(&self, principal: &Principal, subreddit: &str, payload: NewPost) -> Result<Post> {
        ensure_active(principal)?;
        let subreddit = self.live_subreddit(subreddit).await?;

        let title = validate_title(&payload.title)?;
        let (body, link) = validate_post_body(payload.is_link, payload.text, payload.link)?;

        let now = self.clock.now();
        let id = Uuid::now_v7();
        let mut post = Post {
            id,
            subreddit_id: subreddit.id,
            author_id: principal.id,
            created_at: now,
            is_link: payload.is_link,
            link,
            slug: slugify(&title),
            text: Text { title: Some(title), body, last_modified: now },
            is_deleted: false,
            votes: 0,
        };

        let seed = seed_for(principal.id, ContentRef::Post(id));
        post.votes = self.store.create_post(&post, &seed).await?;
        info!("created post {} in r/{} by {}", post.id, subreddit.name, principal.id);
        Ok(post)
    }

    /// Updates title and/or body. The slug follows the title.
    pub async fn edit_post(&self, principal: &Principal, id: Uuid, edit: PostEdit) -> Result<Post> {
        ensure_active(principal)?;
        let mut post = self.get_post(id).await?;
        authorize(self.store.as_ref(), principal, Action::Edit, ContentRef::Post(id)).await?;
        if post.is_deleted {
            return Err(AppError::Forbidden("deleted posts cannot be edited".into()));
        }
        if edit.title.is_none() && edit.text.is_none() {
            return Err(AppError::ValidationError("nothing to edit".into()));
        }

        let mut changed = false;
        if let Some(title) = edit.title {
            let title = validate_title(&title)?;
            if post.text.title.as_deref() != Some(title.as_str()) {
                post.slug = slugify(&title);
                post.text.title = Some(title);
                changed = true;
            }
        }
        if let Some(body) = edit.text {
            if post.is_link && !body.trim().is_empty() {
                return Err(AppError::ValidationError("link posts have no text body".into()));
            }
            if post.text.body != body {
                post.text.body = body;
                changed = true;
            }
        }

        if changed {
            post.text.last_modified = self.clock.now();
            self.store.update_post_text(id, &post.text, &post.slug).await?;
            debug!("edited post {}", id);
        }
        Ok(post)
    }

    pub async fn delete_post(&self, principal: &Principal, id: Uuid) -> Result<()> {
        ensure_active(principal)?;
        let post = self.get_post(id).await?;
        authorize(self.store.as_ref(), principal, Action::Delete, ContentRef::Post(id)).await?;
        if post.is_deleted {
            return Err(AppError::Forbidden("post is already deleted".into()));
        }
        self.store.soft_delete(ContentRef::Post(id)).await?;
        info!("deleted post {}", id);
        Ok(())
    }

    async fn get_post(&self, id: Uuid) -> Result<Post> {
        self.store.get_post(id).await?.ok_or_else(|| AppError::not_found("post", id))
    }

    // ── Comments ────────────────────────────────────────────────────────────

    /// Creates a comment with its self-vote and author grants. Deleted posts
    /// and deleted parents still accept replies.
    pub async fn create_comment(&self, principal: &Principal, payload: NewComment) -> Result<Comment> {
        ensure_active(principal)?;
        let post = self.get_post(payload.post_id).await?;

        if let Some(parent_id) = payload.parent_comment_id {
            let parent = self.get_comment(parent_id).await?;
            if parent.post_id != post.id {
                return Err(AppError::not_found("comment", parent_id));
            }
        }
        let body = validate_comment_text(payload.text)?;

        let now = self.clock.now();
        let id = Uuid::now_v7();
        let mut comment = Comment {
            id,
            post_id: post.id,
            parent_id: payload.parent_comment_id,
            author_id: principal.id,
            created_at: now,
            text: Text { title: None, body, last_modified: now },
            is_deleted: false,
            votes: 0,
        };

        let seed = seed_for(principal.id, ContentRef::Comment(id));
        comment.votes = self.store.create_comment(&comment, &seed).await?;
        info!("created comment {} on post {} by {}", comment.id, post.id, principal.id);
        Ok(comment)
    }

    pub async fn edit_comment(&self, principal: &Principal, id: Uuid, edit: CommentEdit) -> Result<Comment> {
        ensure_active(principal)?;
        let mut comment = self.get_comment(id).await?;
        authorize(self.store.as_ref(), principal, Action::Edit, ContentRef::Comment(id)).await?;
        if comment.is_deleted {
            return Err(AppError::Forbidden("deleted comments cannot be edited".into()));
        }

        let body = validate_comment_text(edit.text)?;
        if comment.text.body != body {
            comment.text.body = body;
            comment.text.last_modified = self.clock.now();
            self.store.update_comment_text(id, &comment.text).await?;
            debug!("edited comment {}", id);
        }
        Ok(comment)
    }

    pub async fn delete_comment(&self, principal: &Principal, id: Uuid) -> Result<()> {
        ensure_active(principal)?;
        let comment = self.get_comment(id).await?;
        authorize(self.store.as_ref(), principal, Action::Delete, ContentRef::Comment(id)).await?;
        if comment.is_deleted {
            return Err(AppError::Forbidden("comment is already deleted".into()));
        }
        self.store.soft_delete(ContentRef::Comment(id)).await?;
        info!("deleted comment {}", id);
        Ok(())
    }

    async fn get_comment(&self, id: Uuid) -> Result<Comment> {
        self.store.get_comment(id).await?.ok_or_else(|| AppError::not_found("comment", id))
    }

    // ── Votes ───────────────────────────────────────────────────────────────

    /// Casts, changes or retracts (value 0) the caller's vote on one post or
    /// comment. Repeating the standing value is a duplicate creation.
    pub async fn cast_vote(&self, principal: &Principal, request: VoteRequest) -> Result<VoteOutcome> {
        ensure_active(principal)?;
        let intent = VoteIntent::from_payload(request.value)?;
        let target = rules::target_of(&request)?;
        self.ensure_target_exists(target).await?;

        let existing = self.store.find_vote(principal.id, target).await?;
        let (value, score) = match (intent, existing) {
            (VoteIntent::Retract, Some(vote)) => (0, self.store.remove(&vote).await?),
            (VoteIntent::Retract, None) => return Err(AppError::not_found("vote", target)),
            (VoteIntent::Cast(value), Some(vote)) if vote.value != value => {
                let amended = rules::validate_amend(&vote, value.as_i64())?;
                (amended.value.as_i64(), self.store.amend(&vote, amended.value).await?)
            }
            (VoteIntent::Cast(value), existing) => {
                let vote = rules::validate(principal.id, value.as_i64(), target, existing.as_ref())?;
                (vote.value.as_i64(), self.store.record(&vote).await?)
            }
        };

        debug!("vote by {} on {} -> {} (score {})", principal.id, target, value, score);
        Ok(VoteOutcome { target_id: target.id(), target_kind: target.kind(), value, score })
    }

    async fn ensure_target_exists(&self, target: ContentRef) -> Result<()> {
        let exists = match target {
            ContentRef::Post(id) => self.store.get_post(id).await?.is_some(),
            ContentRef::Comment(id) => self.store.get_comment(id).await?.is_some(),
        };
        if exists {
            Ok(())
        } else {
            Err(AppError::not_found(target.kind().as_str(), target.id()))
        }
    }

    // ── Reads ───────────────────────────────────────────────────────────────

    /// Ranked posts, globally or for one community. Comment trees are not
    /// included.
    pub async fn list_posts(&self, viewer: Option<&Principal>, subreddit: Option<&str>, page: Page) -> Result<Vec<PostView>> {
        let subreddit_id = match subreddit {
            Some(name) => Some(self.live_subreddit(name).await?.id),
            None => None,
        };

        let mut listed = self.store.list_posts(subreddit_id, page).await?;
        sort_ranked(&mut listed);

        let authors = self.authors_for(listed.iter().map(|l| l.post.author_id).collect()).await?;
        let targets: Vec<ContentRef> = listed.iter().map(|l| ContentRef::Post(l.post.id)).collect();
        let votes = self.viewer_votes(viewer, &targets).await?;
        let ctx = self.render_context(&authors, &votes);

        Ok(listed.iter().map(|l| ctx.render_post(l, Vec::new())).collect())
    }

    /// A post with its full comment tree. When `subreddit` is given the post
    /// must live there.
    pub async fn post_thread(&self, viewer: Option<&Principal>, post_id: Uuid, subreddit: Option<&str>) -> Result<PostView> {
        let post = self.get_post(post_id).await?;
        let community = self
            .store
            .get_subreddit(post.subreddit_id)
            .await?
            .filter(|s| !s.is_deleted)
            .ok_or_else(|| AppError::not_found("post", post_id))?;
        if subreddit.is_some_and(|name| name != community.name) {
            return Err(AppError::not_found("post", post_id));
        }

        let arena = CommentArena::new(self.store.list_comments(post.id).await?);

        let mut author_ids: Vec<Uuid> = arena.author_ids().collect();
        author_ids.push(post.author_id);
        let authors = self.authors_for(author_ids).await?;

        let mut targets = arena.targets();
        targets.push(ContentRef::Post(post.id));
        let votes = self.viewer_votes(viewer, &targets).await?;

        let ctx = self.render_context(&authors, &votes);
        let comments = arena.render_roots(&ctx);
        let listed = ListedPost { post, subreddit: community.name, num_comments: arena.len() as i64 };
        Ok(ctx.render_post(&listed, comments))
    }

    /// One comment with its replies.
    pub async fn comment_thread(&self, viewer: Option<&Principal>, id: Uuid) -> Result<CommentView> {
        let comment = self.get_comment(id).await?;
        let arena = CommentArena::new(self.store.list_comments(comment.post_id).await?);

        let authors = self.authors_for(arena.author_ids().collect()).await?;
        let votes = self.viewer_votes(viewer, &arena.targets()).await?;
        let ctx = self.render_context(&authors, &votes);

        arena
            .render_subtree(id, &ctx)
            .ok_or_else(|| AppError::not_found("comment", id))
    }

    async fn authors_for(&self, ids: Vec<Uuid>) -> Result<Authors> {
        let unique: Vec<Uuid> = ids.into_iter().collect::<HashSet<_>>().into_iter().collect();
        let users = self.store.users_by_ids(&unique).await?;
        Ok(Authors::from_users(users))
    }

    async fn viewer_votes(&self, viewer: Option<&Principal>, targets: &[ContentRef]) -> Result<HashMap<ContentRef, VoteValue>> {
        match viewer {
            Some(principal) if !targets.is_empty() => self.store.votes_by(principal.id, targets).await,
            _ => Ok(HashMap::new()),
        }
    }

    fn render_context<'a>(&self, authors: &'a Authors, votes: &'a HashMap<ContentRef, VoteValue>) -> RenderContext<'a> {
        RenderContext { authors, viewer_votes: votes, now: self.clock.now(), edit_grace: self.settings.edit_grace }
    }
}

fn seed_for(author_id: Uuid, object: ContentRef) -> Seed {
    Seed { self_vote: rules::self_vote(author_id, object), grants: author_grants(author_id, object) }
}

fn ensure_active(principal: &Principal) -> Result<()> {
    if principal.is_active {
        Ok(())
    } else {
        Err(AppError::Unauthorized("this user has been deactivated".into()))
    }
}

// ── Payload validation ──────────────────────────────────────────────────────

fn validate_username(username: &str) -> Result<()> {
    let valid_chars = username.chars().all(|c| c.is_ascii_alphanumeric() || "@.+-_".contains(c));
    if username.is_empty() || username.chars().count() > MAX_USERNAME_LEN || !valid_chars {
        return Err(AppError::ValidationError(format!(
            "username must be 1-{MAX_USERNAME_LEN} letters, digits or @.+-_"
        )));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<()> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') && !email.contains(char::is_whitespace) => Ok(()),
        _ => Err(AppError::ValidationError("a valid email address is required".into())),
    }
}

fn validate_password(password: &str) -> Result<()> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(AppError::ValidationError(format!(
            "password must be {MIN_PASSWORD_LEN}-{MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn validate_subreddit_name(name: &str) -> Result<()> {
    let valid_chars = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if name.is_empty() || name.len() > MAX_SUBREDDIT_NAME_LEN || !valid_chars {
        return Err(AppError::ValidationError(format!(
            "subreddit name must be 1-{MAX_SUBREDDIT_NAME_LEN} letters, digits or underscores"
        )));
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::ValidationError("a title is required".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::ValidationError(format!("title is longer than {MAX_TITLE_LEN} characters")));
    }
    Ok(title.to_string())
}

/// Returns the (body, link) pair to store.
fn validate_post_body(is_link: bool, text: Option<String>, link: Option<String>) -> Result<(String, Option<String>)> {
    let text = text.unwrap_or_default();
    let link = link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());

    if !is_link {
        if link.is_some() {
            return Err(AppError::ValidationError("text posts cannot carry a link".into()));
        }
        return Ok((text, None));
    }

    let link = link.ok_or_else(|| AppError::ValidationError("link posts require a link".into()))?;
    if !text.trim().is_empty() {
        return Err(AppError::ValidationError("link posts have no text body".into()));
    }
    if link.len() > MAX_LINK_LEN {
        return Err(AppError::ValidationError(format!("link is longer than {MAX_LINK_LEN} characters")));
    }
    if !(link.starts_with("http://") || link.starts_with("https://")) {
        return Err(AppError::ValidationError("link must be an http(s) URL".into()));
    }
    Ok((String::new(), Some(link)))
}

fn validate_comment_text(text: String) -> Result<String> {
    if text.trim().is_empty() {
        return Err(AppError::ValidationError("comment text is required".into()));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_rules() {
        assert!(validate_username("user_1").is_ok());
        assert!(validate_username("a.b+c@d-e").is_ok());
        assert!(validate_username("").is_err());
        assert!(validate_username("has space").is_err());
        assert!(validate_username(&"x".repeat(MAX_USERNAME_LEN + 1)).is_err());
    }

    #[test]
    fn email_and_password_rules() {
        assert!(validate_email("user1@example.com").is_ok());
        assert!(validate_email("user1@localhost").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_password("password1").is_ok());
        assert!(validate_password("short").is_err());
    }

    #[test]
    fn subreddit_name_rules() {
        assert!(validate_subreddit_name("TestSubreddit").is_ok());
        assert!(validate_subreddit_name("rust_lang").is_ok());
        assert!(validate_subreddit_name("no spaces").is_err());
        assert!(validate_subreddit_name(&"a".repeat(26)).is_err());
    }

    #[test]
    fn title_is_trimmed_and_bounded() {
        assert_eq!(validate_title("  Hello World ").unwrap(), "Hello World");
        assert!(validate_title("   ").is_err());
        assert!(validate_title(&"t".repeat(MAX_TITLE_LEN + 1)).is_err());
    }

    #[test]
    fn link_and_text_posts() {
        let (body, link) = validate_post_body(false, Some("body".into()), None).unwrap();
        assert_eq!((body.as_str(), link), ("body", None));

        let (body, link) = validate_post_body(true, None, Some(" https://www.rust-lang.org ".into())).unwrap();
        assert_eq!(body, "");
        assert_eq!(link.as_deref(), Some("https://www.rust-lang.org"));

        assert!(validate_post_body(true, None, None).is_err());
        assert!(validate_post_body(true, Some("body".into()), Some("https://x.org".into())).is_err());
        assert!(validate_post_body(true, None, Some("ftp://x.org".into())).is_err());
        assert!(validate_post_body(false, None, Some("https://x.org".into())).is_err());
    }

    #[test]
    fn comment_text_required() {
        assert!(validate_comment_text("  ".into()).is_err());
        assert_eq!(validate_comment_text("first!".into()).unwrap(), "first!");
    }
}

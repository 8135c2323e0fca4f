//! End-to-end checks of the forum service over a real SQLite store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rf_core::traits::{AuthProvider, Clock, VoteLedger};
use rf_core::{
    AppError, CommentEdit, ContentRef, Forum, ForumSettings, NewComment, NewPost, Page, PostEdit,
    Principal, UserUpdate, VoteRequest,
};
use rf_db_sqlite::SqliteForumRepo;
use uuid::Uuid;

/// Stores passwords verbatim and hands out sequential tokens. Hashing is not
/// what these tests are about.
#[derive(Default)]
struct PlainAuth {
    issued: Mutex<u64>,
}

#[async_trait]
impl AuthProvider for PlainAuth {
    fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        Ok(format!("plain:{password}"))
    }

    async fn verify_password(&self, password: &str, hash: &str) -> bool {
        hash == format!("plain:{password}")
    }

    fn issue_token(&self) -> anyhow::Result<String> {
        let mut issued = self.issued.lock().unwrap();
        *issued += 1;
        Ok(format!("token-{issued}"))
    }

    fn token_digest(&self, token: &str) -> String {
        format!("digest:{token}")
    }
}

struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn advance(&self, by: Duration) {
        *self.0.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

struct Harness {
    forum: Forum,
    clock: Arc<ManualClock>,
}

async fn harness() -> Harness {
    let store = SqliteForumRepo::new("sqlite::memory:").await.unwrap();
    let clock = Arc::new(ManualClock(Mutex::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())));
    let forum = Forum::new(Arc::new(store), Arc::new(PlainAuth::default()), ForumSettings::default())
        .with_clock(clock.clone());
    Harness { forum, clock }
}

async fn member(forum: &Forum, name: &str) -> (Principal, String) {
    let (user, token) = forum.register(name, &format!("{name}@example.com"), "password1").await.unwrap();
    (Principal::from(&user), token)
}

fn text_post(title: &str) -> NewPost {
    NewPost { title: title.into(), text: Some("body".into()), link: None, is_link: false }
}

fn vote_on(target: ContentRef, value: i64) -> VoteRequest {
    VoteRequest { target_id: Some(target.id()), target_kind: Some(target.kind()), value, ..Default::default() }
}

async fn ledger_sum(forum: &Forum, target: ContentRef) -> i64 {
    forum.store().votes_for(target).await.unwrap().iter().map(|v| v.value.as_i64()).sum()
}

#[tokio::test]
async fn new_post_starts_with_author_upvote() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();

    let post = h.forum.create_post(&alice, "rust", text_post("Hello World")).await.unwrap();
    assert_eq!(post.votes, 1);
    assert_eq!(post.slug, "hello-world");

    let votes = h.forum.store().votes_for(ContentRef::Post(post.id)).await.unwrap();
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].voter_id, alice.id);

    let view = h.forum.post_thread(Some(&alice), post.id, Some("rust")).await.unwrap();
    assert_eq!(view.score, 1);
    assert!(view.upvoted);
    assert!(!view.edited);
}

#[tokio::test]
async fn vote_sequence_keeps_tally_equal_to_ledger() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    let (bob, _) = member(&h.forum, "bob").await;
    let (carol, _) = member(&h.forum, "carol").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();
    let post = h.forum.create_post(&alice, "rust", text_post("Votes")).await.unwrap();
    let target = ContentRef::Post(post.id);

    let outcome = h.forum.cast_vote(&bob, vote_on(target, 1)).await.unwrap();
    assert_eq!(outcome.score, 2);

    // flipping +1 to -1 moves the tally by -2
    let outcome = h.forum.cast_vote(&bob, vote_on(target, -1)).await.unwrap();
    assert_eq!((outcome.value, outcome.score), (-1, 0));

    let outcome = h.forum.cast_vote(&carol, vote_on(target, -1)).await.unwrap();
    assert_eq!(outcome.score, -1);

    // retracting removes exactly the retracted value
    let outcome = h.forum.cast_vote(&carol, vote_on(target, 0)).await.unwrap();
    assert_eq!((outcome.value, outcome.score), (0, 0));

    let cached = h.forum.store().cached_tally(target).await.unwrap();
    assert_eq!(cached, Some(ledger_sum(&h.forum, target).await));
}

#[tokio::test]
async fn repeated_vote_is_rejected_and_tally_unchanged() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    let (bob, _) = member(&h.forum, "bob").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();
    let post = h.forum.create_post(&alice, "rust", text_post("Once")).await.unwrap();
    let target = ContentRef::Post(post.id);

    h.forum.cast_vote(&bob, vote_on(target, 1)).await.unwrap();
    let err = h.forum.cast_vote(&bob, vote_on(target, 1)).await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateVote(_)));
    assert_eq!(h.forum.store().cached_tally(target).await.unwrap(), Some(2));

    // the author's own self-vote counts as a standing vote too
    let err = h.forum.cast_vote(&alice, vote_on(target, 1)).await.unwrap_err();
    assert!(matches!(err, AppError::DuplicateVote(_)));
}

#[tokio::test]
async fn malformed_votes_are_rejected_before_touching_the_ledger() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();
    let post = h.forum.create_post(&alice, "rust", text_post("Bad votes")).await.unwrap();
    let target = ContentRef::Post(post.id);

    let err = h.forum.cast_vote(&alice, vote_on(target, 5)).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidValue(5)));

    let err = h.forum.cast_vote(&alice, VoteRequest { value: 1, ..Default::default() }).await.unwrap_err();
    assert!(matches!(err, AppError::MissingTarget));

    let both = VoteRequest { post_id: Some(post.id), comment_id: Some(Uuid::now_v7()), value: 1, ..Default::default() };
    let err = h.forum.cast_vote(&alice, both).await.unwrap_err();
    assert!(matches!(err, AppError::AmbiguousTarget));

    let err = h.forum.cast_vote(&alice, vote_on(ContentRef::Comment(Uuid::now_v7()), 1)).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_, _)));

    assert_eq!(ledger_sum(&h.forum, target).await, 1);
}

#[tokio::test]
async fn deleting_a_comment_keeps_the_tree_and_score() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    let (bob, _) = member(&h.forum, "bob").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();
    let post = h.forum.create_post(&alice, "rust", text_post("Thread")).await.unwrap();

    let top = h
        .forum
        .create_comment(&alice, NewComment { post_id: post.id, parent_comment_id: None, text: "top".into() })
        .await
        .unwrap();
    let reply = h
        .forum
        .create_comment(&bob, NewComment { post_id: post.id, parent_comment_id: Some(top.id), text: "reply".into() })
        .await
        .unwrap();
    h.forum.cast_vote(&bob, vote_on(ContentRef::Comment(top.id), 1)).await.unwrap();

    h.forum.delete_comment(&alice, top.id).await.unwrap();

    let view = h.forum.post_thread(None, post.id, None).await.unwrap();
    assert_eq!(view.num_comments, 2);
    let root = &view.comments[0];
    assert!(root.is_deleted);
    assert_eq!(root.text, "[deleted]");
    assert_eq!(root.author, "[deleted]");
    assert_eq!(root.score, 2);
    assert_eq!(root.children.len(), 1);
    assert_eq!(root.children[0].id, reply.id);
    assert_eq!(root.children[0].text, "reply");

    // deleted content can no longer be edited or deleted
    let err = h.forum.edit_comment(&alice, top.id, CommentEdit { text: "again".into() }).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let err = h.forum.delete_comment(&alice, top.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn comments_rank_by_score_then_age() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    let (bob, _) = member(&h.forum, "bob").await;
    let (carol, _) = member(&h.forum, "carol").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();
    let post = h.forum.create_post(&alice, "rust", text_post("Ranking")).await.unwrap();

    let mut ids = Vec::new();
    for text in ["oldest", "middle", "newest"] {
        h.clock.advance(Duration::minutes(1));
        let c = h
            .forum
            .create_comment(&alice, NewComment { post_id: post.id, parent_comment_id: None, text: text.into() })
            .await
            .unwrap();
        ids.push(c.id);
    }
    // newest climbs to 3; the two older ones stay at 1
    for voter in [&bob, &carol] {
        h.forum.cast_vote(voter, vote_on(ContentRef::Comment(ids[2]), 1)).await.unwrap();
    }

    let view = h.forum.post_thread(None, post.id, Some("rust")).await.unwrap();
    let order: Vec<Uuid> = view.comments.iter().map(|c| c.id).collect();
    assert_eq!(order, vec![ids[2], ids[0], ids[1]]);
}

#[tokio::test]
async fn posts_list_by_score_then_age() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    let (bob, _) = member(&h.forum, "bob").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();
    h.forum.create_subreddit(&alice, "go").await.unwrap();

    let first = h.forum.create_post(&alice, "rust", text_post("First")).await.unwrap();
    h.clock.advance(Duration::seconds(30));
    let second = h.forum.create_post(&alice, "go", text_post("Second")).await.unwrap();
    h.clock.advance(Duration::seconds(30));
    let third = h.forum.create_post(&alice, "rust", text_post("Third")).await.unwrap();
    h.forum.cast_vote(&bob, vote_on(ContentRef::Post(third.id), 1)).await.unwrap();

    let all = h.forum.list_posts(Some(&bob), None, Page::default()).await.unwrap();
    let order: Vec<Uuid> = all.iter().map(|p| p.id).collect();
    assert_eq!(order, vec![third.id, first.id, second.id]);
    assert!(all[0].upvoted);
    assert!(!all[1].upvoted);

    let rust = h.forum.list_posts(None, Some("rust"), Page::new(Some(1), Some(1))).await.unwrap();
    assert_eq!(rust.len(), 1);
    assert_eq!(rust[0].id, first.id);
    assert_eq!(rust[0].subreddit, "rust");
}

#[tokio::test]
async fn editing_the_title_recomputes_the_slug() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();
    let post = h.forum.create_post(&alice, "rust", text_post("Hello World")).await.unwrap();

    let edit = PostEdit { title: Some("Goodbye World".into()), text: None };
    let edited = h.forum.edit_post(&alice, post.id, edit).await.unwrap();
    assert_eq!(edited.slug, "goodbye-world");
    assert_eq!(edited.votes, 1);

    let view = h.forum.post_thread(None, post.id, None).await.unwrap();
    assert_eq!(view.title, "Goodbye World");
    assert_eq!(view.slug, "goodbye-world");
    assert_eq!(view.text, "body");
}

#[tokio::test]
async fn body_only_edit_keeps_the_slug() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();
    let post = h.forum.create_post(&alice, "rust", text_post("Hello World")).await.unwrap();

    let edit = PostEdit { title: None, text: Some("new body".into()) };
    let edited = h.forum.edit_post(&alice, post.id, edit).await.unwrap();
    assert_eq!(edited.slug, "hello-world");

    let view = h.forum.post_thread(None, post.id, Some("rust")).await.unwrap();
    assert_eq!(view.title, "Hello World");
    assert_eq!(view.slug, "hello-world");
    assert_eq!(view.text, "new body");
}

#[tokio::test]
async fn edited_flag_respects_grace_window() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();
    let post = h.forum.create_post(&alice, "rust", text_post("Grace")).await.unwrap();
    let quick = h
        .forum
        .create_comment(&alice, NewComment { post_id: post.id, parent_comment_id: None, text: "quick".into() })
        .await
        .unwrap();
    let slow = h
        .forum
        .create_comment(&alice, NewComment { post_id: post.id, parent_comment_id: None, text: "slow".into() })
        .await
        .unwrap();

    h.clock.advance(Duration::minutes(2));
    h.forum.edit_comment(&alice, quick.id, CommentEdit { text: "quick, fixed".into() }).await.unwrap();
    h.clock.advance(Duration::minutes(8));
    h.forum.edit_comment(&alice, slow.id, CommentEdit { text: "slow, fixed".into() }).await.unwrap();

    let quick_view = h.forum.comment_thread(None, quick.id).await.unwrap();
    assert!(!quick_view.edited);
    assert!(quick_view.edited_time_ago.is_none());

    let slow_view = h.forum.comment_thread(None, slow.id).await.unwrap();
    assert!(slow_view.edited);
    assert_eq!(slow_view.created_time_ago, "10 minutes ago");
    assert_eq!(slow_view.edited_time_ago.as_deref(), Some("just now"));
}

#[tokio::test]
async fn only_the_author_may_edit_or_delete() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    let (bob, _) = member(&h.forum, "bob").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();
    let post = h.forum.create_post(&alice, "rust", text_post("Mine")).await.unwrap();

    let edit = PostEdit { title: Some("Yours".into()), text: Some("rewritten".into()) };
    assert!(matches!(h.forum.edit_post(&bob, post.id, edit).await, Err(AppError::Forbidden(_))));
    assert!(matches!(h.forum.delete_post(&bob, post.id).await, Err(AppError::Forbidden(_))));

    let untouched = h.forum.post_thread(None, post.id, None).await.unwrap();
    assert_eq!(untouched.title, "Mine");
    assert_eq!(untouched.slug, "mine");
    assert_eq!(untouched.text, "body");
    assert!(!untouched.is_deleted);
    assert!(!untouched.edited);

    h.forum.delete_post(&alice, post.id).await.unwrap();
    let view = h.forum.post_thread(None, post.id, None).await.unwrap();
    assert!(view.is_deleted);
    assert_eq!(view.title, "Mine");
    assert_eq!(view.text, "[deleted]");
}

#[tokio::test]
async fn community_names_are_unique() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    let (bob, _) = member(&h.forum, "bob").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();

    let err = h.forum.create_subreddit(&bob, "rust").await.unwrap_err();
    assert!(matches!(err, AppError::NameConflict(_)));

    h.forum.set_subscription(&bob, "rust", true).await.unwrap();
    let about = h.forum.subreddit_details("rust").await.unwrap();
    assert_eq!(about.creator, "alice");
    assert_eq!(about.subscribers, 2);
    assert_eq!(about.moderators, vec!["alice".to_string()]);
}

#[tokio::test]
async fn sessions_expire_and_die_with_redaction() {
    let h = harness().await;
    let (alice, token) = member(&h.forum, "alice").await;
    assert_eq!(h.forum.authenticate(&token).await.unwrap(), alice);

    let err = h.forum.authenticate("not-a-token").await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    let (_, second) = h.forum.login("alice", "password1").await.unwrap();
    assert!(matches!(h.forum.login("alice", "wrong-password").await, Err(AppError::Unauthorized(_))));

    h.clock.advance(ForumSettings::default().session_ttl);
    assert!(matches!(h.forum.authenticate(&token).await, Err(AppError::Unauthorized(_))));
    assert!(matches!(h.forum.authenticate(&second).await, Err(AppError::Unauthorized(_))));

    let (_, fresh) = h.forum.login("alice", "password1").await.unwrap();
    h.forum.redact_user(&alice).await.unwrap();
    assert!(matches!(h.forum.authenticate(&fresh).await, Err(AppError::Unauthorized(_))));
    assert!(matches!(h.forum.login("alice", "password1").await, Err(AppError::Unauthorized(_))));
}

#[tokio::test]
async fn account_update_rehashes_the_password() {
    let h = harness().await;
    let (alice, token) = member(&h.forum, "alice").await;

    let update = UserUpdate { email: Some("alice@rust.example.org".into()), password: Some("password2".into()) };
    let user = h.forum.update_user(&alice, update).await.unwrap();
    assert_eq!(user.email, "alice@rust.example.org");
    assert_eq!(user.password_hash, "plain:password2");

    assert!(matches!(h.forum.login("alice", "password1").await, Err(AppError::Unauthorized(_))));
    h.forum.login("alice", "password2").await.unwrap();
    assert_eq!(h.forum.authenticate(&token).await.unwrap(), alice);

    let short = UserUpdate { password: Some("short".into()), ..Default::default() };
    assert!(matches!(h.forum.update_user(&alice, short).await, Err(AppError::ValidationError(_))));
    let stored = h.forum.current_user(&alice).await.unwrap();
    assert_eq!(stored.password_hash, "plain:password2");
}

#[tokio::test]
async fn session_lifetime_past_the_calendar_is_an_error() {
    let store = SqliteForumRepo::new("sqlite::memory:").await.unwrap();
    let settings = ForumSettings { session_ttl: Duration::MAX, ..ForumSettings::default() };
    let forum = Forum::new(Arc::new(store), Arc::new(PlainAuth::default()), settings);

    let err = forum.register("alice", "alice@example.com", "password1").await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));
}

#[tokio::test]
async fn redacted_authors_render_as_deleted() {
    let h = harness().await;
    let (alice, _) = member(&h.forum, "alice").await;
    let (bob, _) = member(&h.forum, "bob").await;
    h.forum.create_subreddit(&alice, "rust").await.unwrap();
    let post = h.forum.create_post(&bob, "rust", text_post("Before I go")).await.unwrap();

    h.forum.redact_user(&bob).await.unwrap();

    let view = h.forum.post_thread(None, post.id, None).await.unwrap();
    assert_eq!(view.author, "[deleted]");
    assert_eq!(view.text, "body");
    assert_eq!(view.score, 1);
}

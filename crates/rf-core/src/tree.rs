//! # Content Tree
//!
//! Ranking, redaction and rendering of posts and comment threads.
//!
//! Comments are held in a flat arena keyed by id with parent links. Threads
//! are rendered by an explicit pre-order walk followed by a bottom-up build.
//! The rendered view is nested, and serializing or dropping it recurses, so a
//! render stops [`MAX_RENDER_DEPTH`] levels below its starting comments.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::models::{Comment, CommentView, ContentRef, ListedPost, Post, PostView, User, VoteValue};

/// Shown in place of a redacted author or a deleted body.
pub const DELETED: &str = "[deleted]";

/// Deepest level a single render reaches. Replies below it are counted in
/// `more_replies` instead.
pub const MAX_RENDER_DEPTH: usize = 100;

/// Text saved within this window of creation does not count as an edit.
pub fn default_edit_grace() -> Duration {
    Duration::minutes(5)
}

pub fn is_edited(created: DateTime<Utc>, last_modified: DateTime<Utc>, grace: Duration) -> bool {
    last_modified - created > grace
}

/// "3 minutes ago", "1 day ago". Future instants read as "just now".
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now - then;
    let (count, unit) = if elapsed < Duration::minutes(1) {
        return "just now".to_string();
    } else if elapsed < Duration::hours(1) {
        (elapsed.num_minutes(), "minute")
    } else if elapsed < Duration::days(1) {
        (elapsed.num_hours(), "hour")
    } else if elapsed < Duration::days(30) {
        (elapsed.num_days(), "day")
    } else if elapsed < Duration::days(365) {
        (elapsed.num_days() / 30, "month")
    } else {
        (elapsed.num_days() / 365, "year")
    };
    let plural = if count == 1 { "" } else { "s" };
    format!("{count} {unit}{plural} ago")
}

/// Anything listed by score.
pub trait Ranked {
    fn score(&self) -> i64;
    fn created(&self) -> DateTime<Utc>;
    fn rank_id(&self) -> Uuid;
}

impl Ranked for Post {
    fn score(&self) -> i64 {
        self.votes
    }
    fn created(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn rank_id(&self) -> Uuid {
        self.id
    }
}

impl Ranked for Comment {
    fn score(&self) -> i64 {
        self.votes
    }
    fn created(&self) -> DateTime<Utc> {
        self.created_at
    }
    fn rank_id(&self) -> Uuid {
        self.id
    }
}

impl Ranked for ListedPost {
    fn score(&self) -> i64 {
        self.post.votes
    }
    fn created(&self) -> DateTime<Utc> {
        self.post.created_at
    }
    fn rank_id(&self) -> Uuid {
        self.post.id
    }
}

/// Highest score first; older first among equals; id as the last resort so
/// the order is total.
pub fn rank_cmp<T: Ranked>(a: &T, b: &T) -> Ordering {
    b.score()
        .cmp(&a.score())
        .then_with(|| a.created().cmp(&b.created()))
        .then_with(|| a.rank_id().cmp(&b.rank_id()))
}

pub fn sort_ranked<T: Ranked>(items: &mut [T]) {
    items.sort_by(rank_cmp);
}

/// Display names of active users. Anyone missing from it renders as
/// [`DELETED`].
#[derive(Debug, Default, Clone)]
pub struct Authors {
    names: HashMap<Uuid, String>,
}

impl Authors {
    pub fn from_users<I: IntoIterator<Item = User>>(users: I) -> Self {
        let names = users
            .into_iter()
            .filter(|user| user.is_active)
            .map(|user| (user.id, user.username))
            .collect();
        Self { names }
    }

    pub fn display(&self, id: Uuid) -> &str {
        self.names.get(&id).map(String::as_str).unwrap_or(DELETED)
    }
}

/// Per-request rendering inputs.
pub struct RenderContext<'a> {
    pub authors: &'a Authors,
    /// The viewer's own votes; empty for anonymous viewers.
    pub viewer_votes: &'a HashMap<ContentRef, VoteValue>,
    pub now: DateTime<Utc>,
    pub edit_grace: Duration,
}

struct Timing {
    edited: bool,
    created_time_ago: String,
    edited_time_ago: Option<String>,
}

impl RenderContext<'_> {
    fn flags(&self, target: ContentRef) -> (bool, bool) {
        match self.viewer_votes.get(&target) {
            Some(VoteValue::Up) => (true, false),
            Some(VoteValue::Down) => (false, true),
            None => (false, false),
        }
    }

    fn timing(&self, created: DateTime<Utc>, last_modified: DateTime<Utc>) -> Timing {
        let edited = is_edited(created, last_modified, self.edit_grace);
        Timing {
            edited,
            created_time_ago: time_ago(created, self.now),
            edited_time_ago: edited.then(|| time_ago(last_modified, self.now)),
        }
    }

    pub fn render_comment(&self, comment: &Comment, children: Vec<CommentView>, more_replies: usize) -> CommentView {
        let (upvoted, downvoted) = self.flags(ContentRef::Comment(comment.id));
        let timing = self.timing(comment.created_at, comment.text.last_modified);
        let (author, text) = if comment.is_deleted {
            (DELETED.to_string(), DELETED.to_string())
        } else {
            (self.authors.display(comment.author_id).to_string(), comment.text.body.clone())
        };

        CommentView {
            id: comment.id,
            post_id: comment.post_id,
            author,
            text,
            created: comment.created_at,
            edited: timing.edited,
            created_time_ago: timing.created_time_ago,
            edited_time_ago: timing.edited_time_ago,
            is_deleted: comment.is_deleted,
            score: comment.votes,
            upvoted,
            downvoted,
            children,
            more_replies,
        }
    }

    pub fn render_post(&self, listed: &ListedPost, comments: Vec<CommentView>) -> PostView {
        let post = &listed.post;
        let (upvoted, downvoted) = self.flags(ContentRef::Post(post.id));
        let timing = self.timing(post.created_at, post.text.last_modified);
        let (author, text, link) = if post.is_deleted {
            (DELETED.to_string(), DELETED.to_string(), None)
        } else {
            (
                self.authors.display(post.author_id).to_string(),
                post.text.body.clone(),
                post.link.clone(),
            )
        };

        PostView {
            id: post.id,
            title: post.title().to_string(),
            slug: post.slug.clone(),
            subreddit: listed.subreddit.clone(),
            author,
            text,
            link,
            is_link: post.is_link,
            created: post.created_at,
            edited: timing.edited,
            created_time_ago: timing.created_time_ago,
            edited_time_ago: timing.edited_time_ago,
            is_deleted: post.is_deleted,
            score: post.votes,
            num_comments: listed.num_comments,
            upvoted,
            downvoted,
            comments,
        }
    }
}

/// Flat storage for one post's comments.
pub struct CommentArena {
    comments: Vec<Comment>,
    index: HashMap<Uuid, usize>,
    /// Ranked child indices per parent; `None` holds the roots.
    children: HashMap<Option<Uuid>, Vec<usize>>,
}

impl CommentArena {
    pub fn new(comments: Vec<Comment>) -> Self {
        let index: HashMap<Uuid, usize> =
            comments.iter().enumerate().map(|(i, c)| (c.id, i)).collect();

        let mut children: HashMap<Option<Uuid>, Vec<usize>> = HashMap::new();
        for (i, comment) in comments.iter().enumerate() {
            // a parent outside this set is treated as absent
            let parent = comment.parent_id.filter(|p| index.contains_key(p));
            children.entry(parent).or_default().push(i);
        }
        for siblings in children.values_mut() {
            siblings.sort_by(|&a, &b| rank_cmp(&comments[a], &comments[b]));
        }

        Self { comments, index, children }
    }

    pub fn len(&self) -> usize {
        self.comments.len()
    }

    pub fn targets(&self) -> Vec<ContentRef> {
        self.comments.iter().map(|c| ContentRef::Comment(c.id)).collect()
    }

    pub fn author_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
        self.comments.iter().map(|c| c.author_id)
    }

    fn children_of(&self, i: usize) -> &[usize] {
        self.children
            .get(&Some(self.comments[i].id))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Every top-level thread, ranked.
    pub fn render_roots(&self, ctx: &RenderContext<'_>) -> Vec<CommentView> {
        let roots = self.children.get(&None).map(Vec::as_slice).unwrap_or_default();
        self.render_from(roots, ctx)
    }

    /// One comment with everything below it.
    pub fn render_subtree(&self, id: Uuid, ctx: &RenderContext<'_>) -> Option<CommentView> {
        let start = *self.index.get(&id)?;
        self.render_from(&[start], ctx).pop()
    }

    fn render_from(&self, starts: &[usize], ctx: &RenderContext<'_>) -> Vec<CommentView> {
        let mut visited = vec![false; self.comments.len()];
        let mut truncated = vec![false; self.comments.len()];
        let mut order = Vec::with_capacity(self.comments.len());
        let mut stack: Vec<(usize, usize)> = starts.iter().rev().map(|&i| (i, 1)).collect();

        while let Some((i, depth)) = stack.pop() {
            if std::mem::replace(&mut visited[i], true) {
                continue;
            }
            order.push(i);
            if depth >= MAX_RENDER_DEPTH {
                truncated[i] = true;
                continue;
            }
            stack.extend(self.children_of(i).iter().rev().map(|&child| (child, depth + 1)));
        }

        let mut built: Vec<Option<CommentView>> = vec![None; self.comments.len()];
        for &i in order.iter().rev() {
            let view = if truncated[i] {
                ctx.render_comment(&self.comments[i], Vec::new(), self.children_of(i).len())
            } else {
                let children = self
                    .children_of(i)
                    .iter()
                    .filter_map(|&child| built[child].take())
                    .collect();
                ctx.render_comment(&self.comments[i], children, 0)
            };
            built[i] = Some(view);
        }

        starts.iter().filter_map(|&i| built[i].take()).collect()
    }
}

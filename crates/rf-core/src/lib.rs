//! rusty-forum/crates/rf-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Rusty-Forum.

pub mod error;
pub mod models;
pub mod permissions;
pub mod rules;
pub mod score;
pub mod service;
pub mod slug;
pub mod traits;
pub mod tree;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use service::{Forum, ForumSettings};
pub use traits::*;

#[cfg(test)]
mod tests {
    use super::models::*;
    use uuid::Uuid;

    #[test]
    fn test_post_creation_v7() {
        let id = Uuid::now_v7();
        let now = chrono::Utc::now();
        let post = Post {
            id,
            subreddit_id: Uuid::now_v7(),
            author_id: Uuid::now_v7(),
            created_at: now,
            is_link: false,
            link: None,
            slug: crate::slug::slugify("Hello Rust!"),
            text: Text { title: Some("Hello Rust!".to_string()), body: String::new(), last_modified: now },
            is_deleted: false,
            votes: 0,
        };
        assert_eq!(post.id, id);
        assert_eq!(post.title(), "Hello Rust!");
        assert_eq!(post.slug, "hello-rust");
    }

    #[test]
    fn vote_value_wire_form() {
        assert_eq!(serde_json::to_string(&VoteValue::Down).unwrap(), "-1");
        assert_eq!(serde_json::from_str::<VoteValue>("1").unwrap(), VoteValue::Up);
        assert!(serde_json::from_str::<VoteValue>("0").is_err());
    }

    #[test]
    fn vote_request_accepts_tagged_target() {
        let id = Uuid::now_v7();
        let body = format!(r#"{{"target_id":"{id}","target_kind":"comment","value":-1}}"#);
        let request: VoteRequest = serde_json::from_str(&body).unwrap();
        assert_eq!(request.target_kind, Some(ContentKind::Comment));
        assert_eq!(request.target_id, Some(id));
        assert_eq!(request.value, -1);
    }

    #[test]
    fn page_is_clamped() {
        assert_eq!(Page::new(None, None), Page { limit: Page::DEFAULT_LIMIT, offset: 0 });
        assert_eq!(Page::new(Some(1000), Some(-5)), Page { limit: Page::MAX_LIMIT, offset: 0 });
    }
}

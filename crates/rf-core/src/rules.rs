//! # Vote Rules
//!
//! Validation that runs before anything touches the ledger. Creation goes
//! through [`validate`]; changes to an existing row go through
//! [`validate_amend`], which re-checks the value domain but not
//! duplicate-ness.

use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{ContentKind, ContentRef, Vote, VoteRequest, VoteValue};

/// What a client vote payload asks for once its value has been read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteIntent {
    Cast(VoteValue),
    /// Payload value 0.
    Retract,
}

impl VoteIntent {
    pub fn from_payload(value: i64) -> Result<Self> {
        match value {
            0 => Ok(VoteIntent::Retract),
            other => VoteValue::try_from(other).map(VoteIntent::Cast),
        }
    }
}

/// Exactly one of `post` / `comment` must be present.
pub fn resolve_target(post: Option<Uuid>, comment: Option<Uuid>) -> Result<ContentRef> {
    match (post, comment) {
        (Some(id), None) => Ok(ContentRef::Post(id)),
        (None, Some(id)) => Ok(ContentRef::Comment(id)),
        (None, None) => Err(AppError::MissingTarget),
        (Some(_), Some(_)) => Err(AppError::AmbiguousTarget),
    }
}

/// Folds the payload's two ways of naming a target into one.
pub fn target_of(request: &VoteRequest) -> Result<ContentRef> {
    let mut post = request.post_id;
    let mut comment = request.comment_id;

    match (request.target_kind, request.target_id) {
        (Some(kind), Some(id)) => {
            let slot = match kind {
                ContentKind::Post => &mut post,
                ContentKind::Comment => &mut comment,
            };
            let current = *slot;
            match current {
                Some(existing) if existing != id => return Err(AppError::AmbiguousTarget),
                _ => *slot = Some(id),
            }
        }
        (None, None) => {}
        // half a target is no target
        _ => return Err(AppError::MissingTarget),
    }

    resolve_target(post, comment)
}

/// Creation-path check. `existing` is the voter's current row for this
/// target, if any.
pub fn validate(voter_id: Uuid, value: i64, target: ContentRef, existing: Option<&Vote>) -> Result<Vote> {
    let value = VoteValue::try_from(value)?;
    if existing.is_some() {
        return Err(AppError::DuplicateVote(format!("{voter_id} has already voted on {target}")));
    }
    Ok(Vote { voter_id, target, value })
}

/// Value-change check for an existing row. Returns the row as it will
/// read after the change.
pub fn validate_amend(vote: &Vote, value: i64) -> Result<Vote> {
    let value = VoteValue::try_from(value)?;
    Ok(Vote { value, ..*vote })
}

/// The vote every new post or comment starts with.
pub fn self_vote(author_id: Uuid, target: ContentRef) -> Vote {
    Vote { voter_id: author_id, target, value: VoteValue::Up }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_domain() {
        let voter = Uuid::now_v7();
        let target = ContentRef::Post(Uuid::now_v7());
        assert!(validate(voter, 1, target, None).is_ok());
        assert!(validate(voter, -1, target, None).is_ok());
        assert!(matches!(validate(voter, 0, target, None), Err(AppError::InvalidValue(0))));
        assert!(matches!(validate(voter, 2, target, None), Err(AppError::InvalidValue(2))));
    }

    #[test]
    fn duplicate_on_creation_path() {
        let voter = Uuid::now_v7();
        let target = ContentRef::Comment(Uuid::now_v7());
        let existing = Vote { voter_id: voter, target, value: VoteValue::Up };
        let err = validate(voter, -1, target, Some(&existing)).unwrap_err();
        assert_eq!(err.kind(), "duplicate_vote");
    }

    #[test]
    fn value_is_checked_before_duplicate() {
        let voter = Uuid::now_v7();
        let target = ContentRef::Comment(Uuid::now_v7());
        let existing = Vote { voter_id: voter, target, value: VoteValue::Up };
        assert!(matches!(validate(voter, 5, target, Some(&existing)), Err(AppError::InvalidValue(5))));
    }

    #[test]
    fn amend_rechecks_value_only() {
        let vote = Vote {
            voter_id: Uuid::now_v7(),
            target: ContentRef::Post(Uuid::now_v7()),
            value: VoteValue::Up,
        };
        let amended = validate_amend(&vote, -1).unwrap();
        assert_eq!(amended.value, VoteValue::Down);
        assert_eq!(amended.target, vote.target);
        assert_eq!(validate_amend(&vote, 1).unwrap().value, VoteValue::Up);
        assert!(matches!(validate_amend(&vote, 3), Err(AppError::InvalidValue(3))));
    }

    #[test]
    fn target_resolution() {
        let id = Uuid::now_v7();
        assert_eq!(resolve_target(Some(id), None).unwrap(), ContentRef::Post(id));
        assert_eq!(resolve_target(None, Some(id)).unwrap(), ContentRef::Comment(id));
        assert!(matches!(resolve_target(None, None), Err(AppError::MissingTarget)));
        assert!(matches!(resolve_target(Some(id), Some(id)), Err(AppError::AmbiguousTarget)));
    }

    #[test]
    fn payload_target_forms() {
        let id = Uuid::now_v7();
        let tagged = VoteRequest {
            target_id: Some(id),
            target_kind: Some(ContentKind::Comment),
            value: 1,
            ..Default::default()
        };
        assert_eq!(target_of(&tagged).unwrap(), ContentRef::Comment(id));

        let same_twice = VoteRequest { post_id: Some(id), target_kind: Some(ContentKind::Post), ..tagged.clone() };
        assert_eq!(target_of(&same_twice).unwrap(), ContentRef::Post(id));

        let both = VoteRequest { post_id: Some(Uuid::now_v7()), ..tagged.clone() };
        assert!(matches!(target_of(&both), Err(AppError::AmbiguousTarget)));

        let kind_only = VoteRequest { target_kind: Some(ContentKind::Post), value: 1, ..Default::default() };
        assert!(matches!(target_of(&kind_only), Err(AppError::MissingTarget)));

        let empty = VoteRequest { value: 1, ..Default::default() };
        assert!(matches!(target_of(&empty), Err(AppError::MissingTarget)));
    }

    #[test]
    fn zero_means_retract() {
        assert_eq!(VoteIntent::from_payload(0).unwrap(), VoteIntent::Retract);
        assert_eq!(VoteIntent::from_payload(-1).unwrap(), VoteIntent::Cast(VoteValue::Down));
        assert!(matches!(VoteIntent::from_payload(7), Err(AppError::InvalidValue(7))));
    }
}

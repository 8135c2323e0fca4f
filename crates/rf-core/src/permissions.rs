//! # Ownership Gate
//!
//! Edit and delete rights are per-object capabilities granted to the author
//! when the object is created. There is no role-based path: moderators get
//! nothing here.

use log::warn;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{Action, Capability, ContentRef, Principal};
use crate::traits::CapabilityStore;

/// The grants written alongside a new post or comment.
pub fn author_grants(author_id: Uuid, object: ContentRef) -> Vec<Capability> {
    [Action::Edit, Action::Delete]
        .into_iter()
        .map(|action| Capability { principal_id: author_id, object, action })
        .collect()
}

/// Succeeds iff `principal` holds `action` on exactly `object`.
pub async fn authorize<S>(
    store: &S,
    principal: &Principal,
    action: Action,
    object: ContentRef,
) -> Result<()>
where
    S: CapabilityStore + ?Sized,
{
    let capability = Capability { principal_id: principal.id, object, action };
    if store.has_capability(&capability).await? {
        Ok(())
    } else {
        warn!("denied {} on {} to {}", action.as_str(), object, principal.id);
        Err(AppError::Forbidden(format!("you may not {} this {}", action.as_str(), object.kind())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct Grants(HashSet<Capability>);

    #[async_trait]
    impl CapabilityStore for Grants {
        async fn has_capability(&self, capability: &Capability) -> Result<bool> {
            Ok(self.0.contains(capability))
        }
    }

    #[test]
    fn author_gets_edit_and_delete() {
        let author = Uuid::now_v7();
        let post = ContentRef::Post(Uuid::now_v7());
        let grants = author_grants(author, post);
        assert_eq!(grants.len(), 2);
        assert!(grants.iter().all(|g| g.principal_id == author && g.object == post));
        assert!(grants.iter().any(|g| g.action == Action::Edit));
        assert!(grants.iter().any(|g| g.action == Action::Delete));
    }

    #[tokio::test]
    async fn capabilities_are_per_object() {
        let author = Uuid::now_v7();
        let mine = ContentRef::Comment(Uuid::now_v7());
        let other = ContentRef::Comment(Uuid::now_v7());
        let store = Grants(author_grants(author, mine).into_iter().collect());
        let principal = Principal { id: author, is_active: true };
        let stranger = Principal { id: Uuid::now_v7(), is_active: true };

        assert!(authorize(&store, &principal, Action::Edit, mine).await.is_ok());
        assert!(authorize(&store, &principal, Action::Delete, mine).await.is_ok());
        assert!(matches!(
            authorize(&store, &principal, Action::Edit, other).await,
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            authorize(&store, &stranger, Action::Delete, mine).await,
            Err(AppError::Forbidden(_))
        ));
    }
}

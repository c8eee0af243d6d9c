//! Professional profiles and their moderator approval flow.
//!
//! A submission waits in `pending_profiles.json` until a moderator approves
//! it (copied verbatim into `profiles.json`) or denies it (discarded).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

use crate::error::{ProfileError, StoreError};
use crate::store::permissions::{AuthPolicy, Caller};
use crate::store::JsonStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub skills: String,
    pub portfolio: String,
    pub experience: String,
    pub certification: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Review {
    Approved,
    Denied,
}

pub struct ProfileBook {
    approved: JsonStore<HashMap<String, Profile>>,
    pending: JsonStore<HashMap<String, Profile>>,
}

impl ProfileBook {
    pub async fn open(data_dir: &Path) -> Self {
        Self {
            approved: JsonStore::open(data_dir.join("profiles.json")).await,
            pending: JsonStore::open(data_dir.join("pending_profiles.json")).await,
        }
    }

    /// Queues a submission for review, replacing any earlier pending one.
    pub async fn submit(&self, user_id: u64, profile: Profile) -> Result<(), StoreError> {
        self.pending
            .update(|p| {
                p.insert(user_id.to_string(), profile);
                Ok(())
            })
            .await
    }

    pub async fn pending(&self, user_id: u64) -> Option<Profile> {
        let key = user_id.to_string();
        self.pending.read(|p| p.get(&key).cloned()).await
    }

    /// Resolves a pending submission. Only authorized moderators may review.
    pub async fn review(
        &self,
        policy: &dyn AuthPolicy,
        moderator: &Caller,
        user_id: u64,
        decision: Review,
    ) -> Result<Profile, ProfileError> {
        if !policy.is_authorized(moderator).await {
            return Err(ProfileError::Unauthorized);
        }

        // Taking the submission out first makes the review single-shot: a
        // concurrent second review finds nothing pending.
        let key = user_id.to_string();
        let profile = self
            .pending
            .update(|p| p.remove(&key).ok_or(ProfileError::NoSubmission(user_id)))
            .await?;

        if decision == Review::Approved {
            let approved = profile.clone();
            let written = self
                .approved
                .update(|p| {
                    p.insert(key.clone(), approved);
                    Ok::<_, ProfileError>(())
                })
                .await;

            if let Err(e) = written {
                let restored = profile.clone();
                if let Err(restore) = self
                    .pending
                    .update(|p| {
                        p.insert(key, restored);
                        Ok::<_, ProfileError>(())
                    })
                    .await
                {
                    warn!("Failed to restore pending profile of {}: {}", user_id, restore);
                }
                return Err(e);
            }
        }

        info!(
            "Profile of {} {:?} by {}",
            user_id, decision, moderator.user_id
        );
        Ok(profile)
    }

    pub async fn get(&self, user_id: u64) -> Option<Profile> {
        let key = user_id.to_string();
        self.approved.read(|p| p.get(&key).cloned()).await
    }

    /// Returns `false` when there was no approved profile to delete.
    pub async fn delete(&self, user_id: u64) -> Result<bool, StoreError> {
        let key = user_id.to_string();
        self.approved.update(|p| Ok(p.remove(&key).is_some())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::async_trait;

    struct Fixed(bool);

    #[async_trait]
    impl AuthPolicy for Fixed {
        async fn is_authorized(&self, _caller: &Caller) -> bool {
            self.0
        }
    }

    fn sample() -> Profile {
        Profile {
            name: "Rahim".into(),
            skills: "Rust, Figma".into(),
            portfolio: "https://example.com/rahim".into(),
            experience: "4 years".into(),
            certification: "None".into(),
        }
    }

    #[tokio::test]
    async fn approval_copies_fields_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let book = ProfileBook::open(dir.path()).await;

        book.submit(7, sample()).await.unwrap();
        assert!(book.get(7).await.is_none());

        let reviewed = book
            .review(&Fixed(true), &Caller::new(1), 7, Review::Approved)
            .await
            .unwrap();
        assert_eq!(reviewed, sample());
        assert_eq!(book.get(7).await, Some(sample()));
        assert!(book.pending(7).await.is_none());

        let reopened = ProfileBook::open(dir.path()).await;
        assert_eq!(reopened.get(7).await, Some(sample()));
    }

    #[tokio::test]
    async fn unauthorized_review_changes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let book = ProfileBook::open(dir.path()).await;
        book.submit(7, sample()).await.unwrap();

        let err = book
            .review(&Fixed(false), &Caller::new(7), 7, Review::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::Unauthorized));
        assert!(book.get(7).await.is_none());
        assert_eq!(book.pending(7).await, Some(sample()));
    }

    #[tokio::test]
    async fn denial_discards_submission() {
        let dir = tempfile::tempdir().unwrap();
        let book = ProfileBook::open(dir.path()).await;
        book.submit(7, sample()).await.unwrap();

        book.review(&Fixed(true), &Caller::new(1), 7, Review::Denied)
            .await
            .unwrap();
        assert!(book.get(7).await.is_none());
        assert!(book.pending(7).await.is_none());

        let again = book
            .review(&Fixed(true), &Caller::new(1), 7, Review::Approved)
            .await;
        assert!(matches!(again, Err(ProfileError::NoSubmission(7))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reviews_resolve_once() {
        let dir = tempfile::tempdir().unwrap();
        let book = std::sync::Arc::new(ProfileBook::open(dir.path()).await);

        for user_id in 0..50 {
            book.submit(user_id, sample()).await.unwrap();

            let (a, b) = (book.clone(), book.clone());
            let approve = tokio::spawn(async move {
                a.review(&Fixed(true), &Caller::new(1), user_id, Review::Approved).await
            });
            let deny = tokio::spawn(async move {
                b.review(&Fixed(true), &Caller::new(2), user_id, Review::Denied).await
            });
            let (approve, deny) = (approve.await.unwrap(), deny.await.unwrap());
            let approved = approve.is_ok();

            assert!(approve.is_ok() != deny.is_ok(), "user {user_id}: exactly one review wins");
            let loser = if approve.is_ok() { deny } else { approve };
            assert!(matches!(loser, Err(ProfileError::NoSubmission(id)) if id == user_id));
            assert_eq!(book.get(user_id).await.is_some(), approved);
            assert!(book.pending(user_id).await.is_none());
        }
    }

    #[tokio::test]
    async fn failed_approval_keeps_the_submission() {
        let dir = tempfile::tempdir().unwrap();
        let book = ProfileBook::open(dir.path()).await;
        book.submit(7, sample()).await.unwrap();

        // A directory where the temp file goes makes the approved write fail.
        std::fs::create_dir(dir.path().join("profiles.json.tmp")).unwrap();

        let err = book
            .review(&Fixed(true), &Caller::new(1), 7, Review::Approved)
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileError::Store(_)));
        assert!(book.get(7).await.is_none());
        assert_eq!(book.pending(7).await, Some(sample()));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let book = ProfileBook::open(dir.path()).await;
        book.submit(7, sample()).await.unwrap();
        book.review(&Fixed(true), &Caller::new(1), 7, Review::Approved)
            .await
            .unwrap();

        assert!(book.delete(7).await.unwrap());
        assert!(book.get(7).await.is_none());
        assert!(!book.delete(7).await.unwrap());
    }
}

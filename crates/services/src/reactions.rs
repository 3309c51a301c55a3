//! # Reactions
//!
//! Toggle protocol for likes (posts and comments) and favorites (posts).
//! Each toggle runs in one transaction: lock the existing row, delete it or
//! insert a new one, resync the like counter, commit, then invalidate the
//! cached views of the owning post.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use domains::{
    DomainError, Favorite, FavoriteId, FavoriteState, ForumStore, Post, PostId, Principal,
    Reaction, ReactionId, Result, StorageError, StoreTransaction, TargetRef, ToggleState, UserId,
};

use crate::cache::ResponseCache;
use crate::counters::CounterSynchronizer;
use crate::metrics::CoreMetrics;

pub struct ReactionStore {
    store: Arc<dyn ForumStore>,
    counters: Arc<CounterSynchronizer>,
    cache: Arc<ResponseCache>,
    metrics: CoreMetrics,
}

impl ReactionStore {
    pub fn new(
        store: Arc<dyn ForumStore>,
        counters: Arc<CounterSynchronizer>,
        cache: Arc<ResponseCache>,
        metrics: CoreMetrics,
    ) -> Self {
        Self {
            store,
            counters,
            cache,
            metrics,
        }
    }

    /// Likes `target` if `user` has not, unlikes it otherwise.
    ///
    /// Losing an insert race to a concurrent toggle yields
    /// `DuplicateReaction`; the caller may re-query the current state.
    pub async fn toggle(&self, user: UserId, target: TargetRef) -> Result<ToggleState> {
        let mut tx = self.store.begin().await?;
        let owner = owning_post(tx.as_mut(), target).await?;

        let state = match tx.lock_reaction(user, target).await? {
            Some(existing) => {
                tx.delete_reaction(existing.id).await?;
                ToggleState::Unliked
            }
            None => {
                let reaction = Reaction {
                    id: ReactionId::generate(),
                    user_id: user,
                    target,
                    created_at: Utc::now(),
                };
                match tx.insert_reaction(&reaction).await {
                    Ok(()) => ToggleState::Liked,
                    Err(StorageError::UniqueViolation(detail)) => {
                        self.metrics.duplicate_reactions.inc();
                        warn!(user_id = %user, %target, %detail, "reaction insert lost a race");
                        return Err(DomainError::DuplicateReaction { user, target });
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        let likes = self.counters.resync_in(tx.as_mut(), target.likes_counter()).await?;
        tx.commit().await?;
        info!(user_id = %user, %target, ?state, likes, "reaction toggled");

        self.cache.invalidate_post_views(&owner).await;
        Ok(state)
    }

    /// Favorites `post` if `user` has not, removes the favorite otherwise.
    /// Favorites feed no counter; only the post detail view goes stale.
    pub async fn toggle_favorite(&self, user: UserId, post: PostId) -> Result<FavoriteState> {
        let mut tx = self.store.begin().await?;
        if tx.fetch_post(post).await?.is_none() {
            return Err(DomainError::NotFound("Post", post.to_string()));
        }

        let state = match tx.lock_favorite(user, post).await? {
            Some(existing) => {
                tx.delete_favorite(existing.id).await?;
                FavoriteState::Unfavorited
            }
            None => {
                let favorite = Favorite {
                    id: FavoriteId::generate(),
                    user_id: user,
                    post_id: post,
                    created_at: Utc::now(),
                };
                match tx.insert_favorite(&favorite).await {
                    Ok(()) => FavoriteState::Favorited,
                    Err(StorageError::UniqueViolation(detail)) => {
                        self.metrics.duplicate_reactions.inc();
                        warn!(user_id = %user, post_id = %post, %detail, "favorite insert lost a race");
                        return Err(DomainError::DuplicateFavorite { user, post });
                    }
                    Err(err) => return Err(err.into()),
                }
            }
        };

        tx.commit().await?;
        info!(user_id = %user, post_id = %post, ?state, "favorite toggled");

        self.cache.invalidate_post_detail(post).await;
        Ok(state)
    }

    /// Anonymous principals have liked nothing.
    pub async fn like_status(&self, principal: &Principal, target: TargetRef) -> Result<bool> {
        match principal.user_id() {
            Some(user) => Ok(self.store.find_reaction(user, target).await?.is_some()),
            None => Ok(false),
        }
    }

    pub async fn favorite_status(&self, principal: &Principal, post: PostId) -> Result<bool> {
        match principal.user_id() {
            Some(user) => Ok(self.store.find_favorite(user, post).await?.is_some()),
            None => Ok(false),
        }
    }
}

/// Resolves the post whose views a reaction on `target` affects.
async fn owning_post(tx: &mut dyn StoreTransaction, target: TargetRef) -> Result<Post> {
    let post_id = match target {
        TargetRef::Post(id) => id,
        TargetRef::Comment(id) => {
            tx.fetch_comment(id)
                .await?
                .ok_or_else(|| DomainError::NotFound("Comment", id.to_string()))?
                .post_id
        }
    };

    tx.fetch_post(post_id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Post", post_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheTtls;
    use domains::mocks::{MockCache, MockStore, MockTx};
    use domains::{BoardId, CounterRef};

    fn post(id: PostId) -> Post {
        Post {
            id,
            board_id: BoardId::generate(),
            author_id: UserId::generate(),
            title: "t".into(),
            content: "c".into(),
            likes_count: 0,
            comments_count: 0,
            is_pinned: false,
            is_featured: false,
            created_at: Utc::now(),
        }
    }

    fn reactions_with(tx: MockTx, metrics: CoreMetrics, cache: MockCache) -> ReactionStore {
        let mut store = MockStore::new();
        let mut tx = Some(tx);
        store.expect_begin().times(1).returning(move || {
            let tx = tx.take().expect("begin called once");
            Ok(Box::new(tx) as Box<dyn StoreTransaction>)
        });
        let store: Arc<dyn ForumStore> = Arc::new(store);
        let counters = Arc::new(CounterSynchronizer::new(store.clone(), metrics.clone()));
        let cache = Arc::new(ResponseCache::new(
            Arc::new(cache),
            CacheTtls::default(),
            metrics.clone(),
        ));
        ReactionStore::new(store, counters, cache, metrics)
    }

    #[tokio::test]
    async fn lost_insert_race_reports_duplicate_without_commit() {
        let post_id = PostId::generate();
        let mut tx = MockTx::new();
        tx.expect_fetch_post().returning(move |id| Ok(Some(post(id))));
        tx.expect_lock_reaction().returning(|_, _| Ok(None));
        tx.expect_insert_reaction()
            .returning(|_| Err(StorageError::UniqueViolation("likes_user_target_key".into())));
        tx.expect_commit().never();

        let metrics = CoreMetrics::default();
        let reactions = reactions_with(tx, metrics.clone(), MockCache::new());

        let user = UserId::generate();
        let err = reactions
            .toggle(user, TargetRef::Post(post_id))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(matches!(
            err,
            DomainError::DuplicateReaction { target: TargetRef::Post(id), .. } if id == post_id
        ));
        assert_eq!(metrics.duplicate_reactions.get(), 1);
    }

    #[tokio::test]
    async fn failed_resync_fails_the_toggle_and_skips_commit() {
        let post_id = PostId::generate();
        let mut tx = MockTx::new();
        tx.expect_fetch_post().returning(move |id| Ok(Some(post(id))));
        tx.expect_lock_reaction().returning(|_, _| Ok(None));
        tx.expect_insert_reaction().returning(|_| Ok(()));
        tx.expect_lock_counter_owner().returning(|_| Ok(()));
        tx.expect_count_reactions().returning(|_| Ok(1));
        tx.expect_store_counter()
            .returning(|_, _| Err(StorageError::Database("lock timeout".into())));
        tx.expect_commit().never();

        let reactions = reactions_with(tx, CoreMetrics::default(), MockCache::new());
        let err = reactions
            .toggle(UserId::generate(), TargetRef::Post(post_id))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::CounterResyncFailed { counter: CounterRef::PostLikes(id), .. } if id == post_id
        ));
    }

    #[tokio::test]
    async fn reaction_on_missing_comment_is_not_found() {
        let mut tx = MockTx::new();
        tx.expect_fetch_comment().returning(|_| Ok(None));
        tx.expect_lock_reaction().never();

        let reactions = reactions_with(tx, CoreMetrics::default(), MockCache::new());
        let err = reactions
            .toggle(UserId::generate(), TargetRef::Comment(domains::CommentId::generate()))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound("Comment", _)));
    }

    #[tokio::test]
    async fn anonymous_status_queries_skip_the_store() {
        let metrics = CoreMetrics::default();
        let store: Arc<dyn ForumStore> = Arc::new(MockStore::new());
        let counters = Arc::new(CounterSynchronizer::new(store.clone(), metrics.clone()));
        let cache = Arc::new(ResponseCache::new(
            Arc::new(MockCache::new()),
            CacheTtls::default(),
            metrics.clone(),
        ));
        let reactions = ReactionStore::new(store, counters, cache, metrics);

        let post = PostId::generate();
        assert!(!reactions
            .like_status(&Principal::Anonymous, TargetRef::Post(post))
            .await
            .unwrap());
        assert!(!reactions
            .favorite_status(&Principal::Anonymous, post)
            .await
            .unwrap());
    }
}

//! Post mutations that affect cached feeds: publish, delete, pin, feature.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use domains::{
    BoardId, DomainError, ForumStore, Post, PostId, Result, StoreTransaction, TargetRef, UserId,
};

use crate::cache::ResponseCache;

pub struct PostLifecycle {
    store: Arc<dyn ForumStore>,
    cache: Arc<ResponseCache>,
}

impl PostLifecycle {
    pub fn new(store: Arc<dyn ForumStore>, cache: Arc<ResponseCache>) -> Self {
        Self { store, cache }
    }

    pub async fn publish_post(
        &self,
        board_id: BoardId,
        author: UserId,
        title: &str,
        content: &str,
    ) -> Result<Post> {
        let title = title.trim();
        if title.is_empty() {
            return Err(DomainError::Validation("post title must not be empty".into()));
        }
        if self.store.fetch_board(board_id).await?.is_none() {
            return Err(DomainError::NotFound("Board", board_id.to_string()));
        }

        let post = Post {
            id: PostId::generate(),
            board_id,
            author_id: author,
            title: title.to_string(),
            content: content.to_string(),
            likes_count: 0,
            comments_count: 0,
            is_pinned: false,
            is_featured: false,
            created_at: Utc::now(),
        };

        let mut tx = self.store.begin().await?;
        tx.insert_post(&post).await?;
        tx.commit().await?;
        info!(post_id = %post.id, board_id = %board_id, "post published");

        self.cache.invalidate_post_views(&post).await;
        Ok(post)
    }

    /// Removes the post with its comments, favorites and every like on the
    /// post or on one of its comments.
    pub async fn delete_post(&self, id: PostId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let post = lock(tx.as_mut(), id).await?;

        let mut removed_likes = tx.delete_reactions_for(TargetRef::Post(id)).await?;
        let comments = tx.list_post_comment_ids(id).await?;
        for comment in &comments {
            removed_likes += tx.delete_reactions_for(TargetRef::Comment(*comment)).await?;
        }
        tx.delete_post(id).await?;
        tx.commit().await?;
        info!(
            post_id = %id,
            board_id = %post.board_id,
            comments = comments.len(),
            removed_likes,
            "post deleted"
        );

        self.cache.invalidate_post_views(&post).await;
        Ok(())
    }

    /// Flips the pinned flag and returns the new value.
    pub async fn toggle_pin(&self, id: PostId) -> Result<bool> {
        self.update_flags(id, |post| post.is_pinned = !post.is_pinned)
            .await
            .map(|post| post.is_pinned)
    }

    /// Flips the featured flag and returns the new value.
    pub async fn toggle_feature(&self, id: PostId) -> Result<bool> {
        self.update_flags(id, |post| post.is_featured = !post.is_featured)
            .await
            .map(|post| post.is_featured)
    }

    async fn update_flags(&self, id: PostId, change: impl FnOnce(&mut Post)) -> Result<Post> {
        let mut tx = self.store.begin().await?;
        let mut post = lock(tx.as_mut(), id).await?;
        change(&mut post);
        tx.update_post_flags(id, post.is_pinned, post.is_featured)
            .await?;
        tx.commit().await?;
        info!(post_id = %id, pinned = post.is_pinned, featured = post.is_featured, "post flags updated");

        self.cache.invalidate_post_views(&post).await;
        Ok(post)
    }
}

/// Loads the post under a row lock, so flag flips and deletes of one post
/// run one after another.
async fn lock(tx: &mut dyn StoreTransaction, id: PostId) -> Result<Post> {
    tx.lock_post(id)
        .await?
        .ok_or_else(|| DomainError::NotFound("Post", id.to_string()))
}

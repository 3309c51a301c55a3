//! # Comment tree
//!
//! A post owns its comments; `parent_id` is only a weak reference to another
//! comment of the same post. Rendering groups the flat list by parent in one
//! pass and walks it iteratively, so malformed data (a parent cycle written
//! straight into storage) can neither hang the renderer nor overflow the
//! stack.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use domains::{
    Comment, CommentId, CommentNode, CounterRef, DomainError, ForumStore, PostId, Result,
    TargetRef, UserId,
};

use crate::cache::ResponseCache;
use crate::counters::CounterSynchronizer;

/// Replies deeper than this are rendered as siblings of the deepest allowed
/// ancestor.
pub const MAX_RENDER_DEPTH: usize = 64;

pub struct CommentTree {
    store: Arc<dyn ForumStore>,
    counters: Arc<CounterSynchronizer>,
    cache: Arc<ResponseCache>,
}

impl CommentTree {
    pub fn new(
        store: Arc<dyn ForumStore>,
        counters: Arc<CounterSynchronizer>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        Self {
            store,
            counters,
            cache,
        }
    }

    /// Inserts a comment (or a reply when `parent` is given) and resyncs the
    /// post's comment counter in the same transaction.
    pub async fn create_comment(
        &self,
        post_id: PostId,
        parent: Option<CommentId>,
        author: UserId,
        content: &str,
    ) -> Result<Comment> {
        let content = content.trim();
        if content.is_empty() {
            return Err(DomainError::Validation("comment content must not be empty".into()));
        }

        let mut tx = self.store.begin().await?;
        let post = tx
            .fetch_post(post_id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Post", post_id.to_string()))?;

        if let Some(parent_id) = parent {
            let parent_comment = tx
                .fetch_comment(parent_id)
                .await?
                .ok_or_else(|| DomainError::NotFound("Comment", parent_id.to_string()))?;
            if parent_comment.post_id != post_id {
                return Err(DomainError::CrossPostParent {
                    parent: parent_id,
                    post: post_id,
                });
            }
        }

        let comment = Comment {
            id: CommentId::generate(),
            post_id,
            user_id: author,
            parent_id: parent,
            content: content.to_string(),
            likes_count: 0,
            created_at: Utc::now(),
        };
        tx.insert_comment(&comment).await?;
        let total = self
            .counters
            .resync_in(tx.as_mut(), CounterRef::PostComments(post_id))
            .await?;
        tx.commit().await?;
        info!(comment_id = %comment.id, post_id = %post_id, parent_id = ?parent, comments = total, "comment created");

        self.cache.invalidate_post_views(&post).await;
        Ok(comment)
    }

    /// Deletes a comment. Its direct replies are re-parented to the top
    /// level; its likes are removed with it.
    pub async fn delete_comment(&self, id: CommentId) -> Result<()> {
        let mut tx = self.store.begin().await?;
        let comment = tx
            .fetch_comment(id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Comment", id.to_string()))?;
        let post = tx.fetch_post(comment.post_id).await?;

        let orphaned = tx.detach_replies(id).await?;
        let likes = tx.delete_reactions_for(TargetRef::Comment(id)).await?;
        tx.delete_comment(id).await?;
        let total = self
            .counters
            .resync_in(tx.as_mut(), CounterRef::PostComments(comment.post_id))
            .await?;
        tx.commit().await?;
        info!(
            comment_id = %id,
            post_id = %comment.post_id,
            orphaned_replies = orphaned,
            removed_likes = likes,
            comments = total,
            "comment deleted"
        );

        if let Some(post) = post {
            self.cache.invalidate_post_views(&post).await;
        }
        Ok(())
    }

    /// Root comments of the post, oldest first, each carrying its replies.
    pub async fn render_tree(&self, post_id: PostId) -> Result<Vec<CommentNode>> {
        if self.store.fetch_post(post_id).await?.is_none() {
            return Err(DomainError::NotFound("Post", post_id.to_string()));
        }
        let comments = self.store.list_post_comments(post_id).await?;
        Ok(build_forest(comments))
    }
}

/// Builds the reply forest from a flat comment list.
///
/// A comment whose parent is absent from the list is treated as a root.
/// Comments caught in a parent cycle cannot be reached from any root and are
/// left out of the result.
pub fn build_forest(comments: Vec<Comment>) -> Vec<CommentNode> {
    let total = comments.len();
    let mut by_id: HashMap<CommentId, Comment> =
        comments.into_iter().map(|c| (c.id, c)).collect();

    let mut children: HashMap<CommentId, Vec<CommentId>> = HashMap::new();
    let mut roots: Vec<CommentId> = Vec::new();
    for comment in by_id.values() {
        match comment.parent_id {
            Some(parent) if by_id.contains_key(&parent) => {
                children.entry(parent).or_default().push(comment.id);
            }
            _ => roots.push(comment.id),
        }
    }

    // Pre-order walk recording where each reachable comment is rendered.
    let mut visited: HashSet<CommentId> = HashSet::with_capacity(total);
    let mut placement: Vec<(CommentId, Option<CommentId>)> = Vec::with_capacity(total);
    let mut stack: Vec<(CommentId, usize, Option<CommentId>)> =
        roots.iter().map(|&id| (id, 0, None)).collect();

    while let Some((id, depth, rendered_parent)) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        placement.push((id, rendered_parent));

        for &child in children.get(&id).into_iter().flatten() {
            if depth + 1 < MAX_RENDER_DEPTH {
                stack.push((child, depth + 1, Some(id)));
            } else {
                stack.push((child, depth, rendered_parent));
            }
        }
    }

    if placement.len() < total {
        warn!(
            skipped = total - placement.len(),
            "comments unreachable from any root (parent cycle), omitted from render"
        );
    }

    // Children are always placed after their rendered parent, so assembling
    // in reverse finishes every subtree before its parent needs it.
    let mut pending: HashMap<CommentId, Vec<CommentNode>> = HashMap::new();
    let mut forest: Vec<CommentNode> = Vec::new();
    for (id, rendered_parent) in placement.into_iter().rev() {
        let Some(comment) = by_id.remove(&id) else {
            continue;
        };
        let mut replies = pending.remove(&id).unwrap_or_default();
        sort_oldest_first(&mut replies);

        let node = CommentNode { comment, replies };
        match rendered_parent {
            Some(parent) => pending.entry(parent).or_default().push(node),
            None => forest.push(node),
        }
    }

    sort_oldest_first(&mut forest);
    forest
}

fn sort_oldest_first(nodes: &mut [CommentNode]) {
    nodes.sort_by(|a, b| {
        (a.comment.created_at, a.comment.id).cmp(&(b.comment.created_at, b.comment.id))
    });
}

//! # ForumCore
//!
//! The surface the CRUD/API layer talks to. Wires the components over one
//! store and one process-wide response cache, and applies access checks
//! before any write reaches the store.

use std::sync::Arc;

use bytes::Bytes;

use domains::{
    Board, BoardId, CacheBackend, CacheCategory, Comment, CommentId, CommentNode, CounterRef,
    DomainError, FavoriteState, ForumStore, Post, PostId, Principal, RequestIdentity, Result,
    TargetRef, ToggleState, UserId,
};

use crate::access::{self, BoardAccess, PrincipalResolver};
use crate::cache::{CacheKey, CacheScope, CacheTtls, ResponseCache};
use crate::comments::CommentTree;
use crate::counters::{CounterSynchronizer, RepairReport};
use crate::metrics::CoreMetrics;
use crate::posts::PostLifecycle;
use crate::reactions::ReactionStore;

pub struct ForumCore {
    store: Arc<dyn ForumStore>,
    cache: Arc<ResponseCache>,
    resolver: PrincipalResolver,
    boards: BoardAccess,
    counters: Arc<CounterSynchronizer>,
    reactions: ReactionStore,
    comments: CommentTree,
    posts: PostLifecycle,
}

impl ForumCore {
    pub fn new(
        store: Arc<dyn ForumStore>,
        cache_backend: Arc<dyn CacheBackend>,
        ttls: CacheTtls,
        metrics: CoreMetrics,
    ) -> Self {
        let cache = Arc::new(ResponseCache::new(cache_backend, ttls, metrics.clone()));
        let counters = Arc::new(CounterSynchronizer::new(store.clone(), metrics.clone()));
        Self {
            resolver: PrincipalResolver::new(store.clone()),
            boards: BoardAccess::new(store.clone()),
            reactions: ReactionStore::new(
                store.clone(),
                counters.clone(),
                cache.clone(),
                metrics,
            ),
            comments: CommentTree::new(store.clone(), counters.clone(), cache.clone()),
            posts: PostLifecycle::new(store.clone(), cache.clone()),
            counters,
            cache,
            store,
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    // ── Access ──────────────────────────────────────────────────────────────

    pub async fn current_principal(&self, identity: RequestIdentity) -> Principal {
        self.resolver.current_principal(identity).await
    }

    pub fn can_access(&self, principal: &Principal, board: &Board) -> bool {
        access::can_access(principal, board)
    }

    pub async fn visible_boards(&self, principal: &Principal) -> Result<Vec<Board>> {
        self.boards.visible_boards(principal).await
    }

    pub async fn board_access_matrix(&self, principal: &Principal) -> Result<Vec<(Board, bool)>> {
        self.boards.board_access_matrix(principal).await
    }

    pub async fn ensure_board_access(&self, principal: &Principal, board: BoardId) -> Result<Board> {
        self.boards.ensure_board_access(principal, board).await
    }

    // ── Reactions ───────────────────────────────────────────────────────────

    pub async fn toggle_reaction(
        &self,
        principal: &Principal,
        target: TargetRef,
    ) -> Result<ToggleState> {
        let user = require_user(principal)?;
        let post = self.target_post(target).await?;
        self.boards.ensure_board_access(principal, post.board_id).await?;
        self.reactions.toggle(user, target).await
    }

    pub async fn toggle_favorite(
        &self,
        principal: &Principal,
        post: PostId,
    ) -> Result<FavoriteState> {
        let user = require_user(principal)?;
        let loaded = self.fetch_post(post).await?;
        self.boards.ensure_board_access(principal, loaded.board_id).await?;
        self.reactions.toggle_favorite(user, post).await
    }

    pub async fn like_status(&self, principal: &Principal, target: TargetRef) -> Result<bool> {
        self.reactions.like_status(principal, target).await
    }

    pub async fn favorite_status(&self, principal: &Principal, post: PostId) -> Result<bool> {
        self.reactions.favorite_status(principal, post).await
    }

    // ── Comments ────────────────────────────────────────────────────────────

    pub async fn create_comment(
        &self,
        principal: &Principal,
        post: PostId,
        parent: Option<CommentId>,
        content: &str,
    ) -> Result<Comment> {
        let user = require_user(principal)?;
        let loaded = self.fetch_post(post).await?;
        self.boards.ensure_board_access(principal, loaded.board_id).await?;
        self.comments.create_comment(post, parent, user, content).await
    }

    /// Allowed to the comment's author, moderators and administrators.
    pub async fn delete_comment(&self, principal: &Principal, id: CommentId) -> Result<()> {
        require_user(principal)?;
        let comment = self
            .store
            .fetch_comment(id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Comment", id.to_string()))?;
        if !access::can_moderate(principal, comment.user_id) {
            return Err(DomainError::Forbidden("delete this comment"));
        }
        self.comments.delete_comment(id).await
    }

    pub async fn render_comment_tree(
        &self,
        principal: &Principal,
        post: PostId,
    ) -> Result<Vec<CommentNode>> {
        let loaded = self.fetch_post(post).await?;
        self.boards.ensure_board_access(principal, loaded.board_id).await?;
        self.comments.render_tree(post).await
    }

    // ── Posts ───────────────────────────────────────────────────────────────

    pub async fn publish_post(
        &self,
        principal: &Principal,
        board: BoardId,
        title: &str,
        content: &str,
    ) -> Result<Post> {
        let user = require_user(principal)?;
        self.boards.ensure_board_access(principal, board).await?;
        self.posts.publish_post(board, user, title, content).await
    }

    /// Allowed to the post's author, moderators and administrators.
    pub async fn delete_post(&self, principal: &Principal, id: PostId) -> Result<()> {
        require_user(principal)?;
        let post = self.fetch_post(id).await?;
        if !access::can_moderate(principal, post.author_id) {
            return Err(DomainError::Forbidden("delete this post"));
        }
        self.posts.delete_post(id).await
    }

    /// Administrators only.
    pub async fn toggle_pin(&self, principal: &Principal, id: PostId) -> Result<bool> {
        require_admin(principal, "pin posts")?;
        self.posts.toggle_pin(id).await
    }

    /// Administrators only.
    pub async fn toggle_feature(&self, principal: &Principal, id: PostId) -> Result<bool> {
        require_admin(principal, "feature posts")?;
        self.posts.toggle_feature(id).await
    }

    // ── Counters ────────────────────────────────────────────────────────────

    pub async fn resync_counter(&self, counter: CounterRef) -> Result<u64> {
        self.counters.resync(counter).await
    }

    pub async fn repair_counters(&self) -> Result<RepairReport> {
        self.counters.repair_all().await
    }

    // ── Cache ───────────────────────────────────────────────────────────────

    pub async fn cache_get(&self, key: &CacheKey) -> Option<Bytes> {
        self.cache.get(key).await
    }

    pub async fn cache_put(&self, key: &CacheKey, payload: Bytes) {
        self.cache.put(key, payload).await
    }

    pub async fn cache_invalidate(
        &self,
        category: CacheCategory,
        scope: Option<CacheScope>,
    ) -> Result<u64> {
        self.cache.invalidate(category, scope).await
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    async fn fetch_post(&self, id: PostId) -> Result<Post> {
        self.store
            .fetch_post(id)
            .await?
            .ok_or_else(|| DomainError::NotFound("Post", id.to_string()))
    }

    async fn target_post(&self, target: TargetRef) -> Result<Post> {
        match target {
            TargetRef::Post(id) => self.fetch_post(id).await,
            TargetRef::Comment(id) => {
                let comment = self
                    .store
                    .fetch_comment(id)
                    .await?
                    .ok_or_else(|| DomainError::NotFound("Comment", id.to_string()))?;
                self.fetch_post(comment.post_id).await
            }
        }
    }
}

fn require_user(principal: &Principal) -> Result<UserId> {
    principal.user_id().ok_or(DomainError::Unauthenticated)
}

fn require_admin(principal: &Principal, action: &'static str) -> Result<()> {
    require_user(principal)?;
    if principal.is_admin() {
        Ok(())
    } else {
        Err(DomainError::Forbidden(action))
    }
}

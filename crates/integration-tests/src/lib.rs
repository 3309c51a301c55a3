//! Shared fixture for the behavioural tests: a [`ForumCore`] wired to the
//! in-memory store and cache, plus helpers to plant boards, posts and
//! principals.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use prometheus_client::encoding::text::encode;
use prometheus_client::registry::Registry;

use domains::{
    AccessPolicy, Board, BoardId, CommentId, ForumReader, GroupId, Post, PostId, Principal,
    RequestIdentity, Role, UserId,
};
use services::{CacheTtls, CoreMetrics, ForumCore};
use storage_adapters::{InMemoryForumStore, MemoryCache};

pub struct Forum {
    pub store: Arc<InMemoryForumStore>,
    pub cache: Arc<MemoryCache>,
    pub core: Arc<ForumCore>,
    registry: Registry,
}

impl Default for Forum {
    fn default() -> Self {
        Self::new()
    }
}

impl Forum {
    pub fn new() -> Self {
        Self::with_cache(MemoryCache::new(), CacheTtls::default())
    }

    pub fn with_cache(cache: MemoryCache, ttls: CacheTtls) -> Self {
        let store = Arc::new(InMemoryForumStore::new());
        let cache = Arc::new(cache);
        let metrics = CoreMetrics::default();
        let mut registry = Registry::default();
        metrics.register(&mut registry);

        let core = Arc::new(ForumCore::new(
            store.clone(),
            cache.clone(),
            ttls,
            metrics,
        ));
        Self {
            store,
            cache,
            core,
            registry,
        }
    }

    /// Text exposition of the core's metrics.
    pub fn metrics_text(&self) -> String {
        let mut out = String::new();
        encode(&mut out, &self.registry).expect("metrics encode");
        out
    }

    pub async fn board(&self, policy: AccessPolicy) -> Board {
        self.board_with(policy, &[], &[]).await
    }

    pub async fn board_with(
        &self,
        policy: AccessPolicy,
        groups: &[GroupId],
        users: &[UserId],
    ) -> Board {
        let id = BoardId::generate();
        let board = Board {
            id,
            name: format!("board-{id}"),
            access_policy: policy,
            allowed_groups: groups.iter().copied().collect::<HashSet<_>>(),
            allowed_users: users.iter().copied().collect::<HashSet<_>>(),
            order: 0,
        };
        self.store.seed_board(board.clone()).await;
        board
    }

    pub async fn post(&self, board: BoardId) -> Post {
        let post = Post {
            id: PostId::generate(),
            board_id: board,
            author_id: UserId::generate(),
            title: "Opening post".into(),
            content: "Hello board".into(),
            likes_count: 0,
            comments_count: 0,
            is_pinned: false,
            is_featured: false,
            created_at: Utc::now(),
        };
        self.store.seed_post(post.clone()).await;
        post
    }

    /// A public board with one post on it.
    pub async fn public_post(&self) -> Post {
        let board = self.board(AccessPolicy::Public).await;
        self.post(board.id).await
    }

    pub async fn member(&self) -> Principal {
        self.principal(UserId::generate(), Role::Member, false).await
    }

    pub async fn admin(&self) -> Principal {
        self.principal(UserId::generate(), Role::Admin, false).await
    }

    pub async fn principal(&self, id: UserId, role: Role, is_superuser: bool) -> Principal {
        self.core
            .current_principal(RequestIdentity::User {
                id,
                role,
                is_superuser,
            })
            .await
    }

    pub async fn reload_post(&self, id: PostId) -> Post {
        self.store
            .fetch_post(id)
            .await
            .expect("store read")
            .expect("post exists")
    }

    pub async fn comment_likes(&self, id: CommentId) -> u64 {
        self.store
            .fetch_comment(id)
            .await
            .expect("store read")
            .expect("comment exists")
            .likes_count
    }
}

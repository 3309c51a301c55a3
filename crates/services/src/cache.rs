//! # Response cache
//!
//! Read-through cache for rendered views. Keys are derived from the request
//! identity and laid out as `{category}:{scope}:{digest}` so that mutations
//! can drop a whole category, or a category scoped to one board or post, by
//! prefix.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use dashmap::DashSet;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use domains::{
    BoardId, CacheBackend, CacheCategory, CacheError, DomainError, Post, PostId, Principal, UserId,
};

use crate::metrics::{CategoryLabels, CoreMetrics};

/// Time-to-live per view family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub home_posts: Duration,
    pub board_posts: Duration,
    pub post_detail: Duration,
    pub user_profile: Duration,
}

impl CacheTtls {
    pub fn for_category(&self, category: CacheCategory) -> Duration {
        match category {
            CacheCategory::HomePosts => self.home_posts,
            CacheCategory::BoardPosts => self.board_posts,
            CacheCategory::PostDetail => self.post_detail,
            CacheCategory::UserProfile => self.user_profile,
        }
    }
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            home_posts: Duration::from_secs(5 * 60),
            board_posts: Duration::from_secs(3 * 60),
            post_detail: Duration::from_secs(10 * 60),
            user_profile: Duration::from_secs(30 * 60),
        }
    }
}

/// Which slice of a category a cached view belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheScope {
    All,
    Board(BoardId),
    Post(PostId),
    User(UserId),
}

impl fmt::Display for CacheScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Board(id) => fmt::Display::fmt(id, f),
            Self::Post(id) => fmt::Display::fmt(id, f),
            Self::User(id) => fmt::Display::fmt(id, f),
        }
    }
}

/// The parts of a request that select a cached view.
#[derive(Debug, Clone)]
pub struct CacheRequest<'a> {
    /// Stable name of the handler serving the view.
    pub endpoint: &'a str,
    pub path: &'a str,
    pub query: &'a [(String, String)],
    pub principal: &'a Principal,
}

impl CacheRequest<'_> {
    /// Hex digest of the request parts. Every part is length-prefixed so
    /// values containing `&`, `=` or newlines cannot alias another request.
    /// Query order and trailing slashes do not change it.
    fn digest(&self) -> String {
        let mut query: Vec<&(String, String)> = self.query.iter().collect();
        query.sort();

        let mut hasher = Sha256::new();
        let mut feed = |part: &[u8]| {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part);
        };
        feed(self.endpoint.as_bytes());
        feed(normalize_path(self.path).as_bytes());
        feed(&(query.len() as u64).to_le_bytes());
        for (k, v) in query {
            feed(k.as_bytes());
            feed(v.as_bytes());
        }
        feed(self.principal.cache_identity().as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    format!("/{}", segments.join("/"))
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    category: CacheCategory,
    key: String,
}

impl CacheKey {
    pub fn derive(category: CacheCategory, scope: CacheScope, request: &CacheRequest<'_>) -> Self {
        let digest = request.digest();
        Self {
            category,
            key: format!("{}:{}:{}", category.as_str(), scope, digest),
        }
    }

    pub fn category(&self) -> CacheCategory {
        self.category
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Prefix matching every key of `category`, optionally narrowed to a scope.
pub fn invalidation_prefix(category: CacheCategory, scope: Option<CacheScope>) -> String {
    match scope {
        Some(scope) => format!("{}:{}:", category.as_str(), scope),
        None => format!("{}:", category.as_str()),
    }
}

/// Result of invalidating the views touched by one mutation.
#[derive(Debug, Default)]
pub struct InvalidationSummary {
    pub removed: u64,
    pub failures: Vec<DomainError>,
}

/// Process-wide response cache. Share it behind an `Arc`.
pub struct ResponseCache {
    backend: Arc<dyn CacheBackend>,
    ttls: CacheTtls,
    metrics: CoreMetrics,
    unsupported_logged: DashSet<CacheCategory>,
}

impl ResponseCache {
    pub fn new(backend: Arc<dyn CacheBackend>, ttls: CacheTtls, metrics: CoreMetrics) -> Self {
        Self {
            backend,
            ttls,
            metrics,
            unsupported_logged: DashSet::new(),
        }
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    /// Backend errors are logged and read as a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<Bytes> {
        let labels = CategoryLabels::from(key.category());
        match self.backend.get(key.as_str()).await {
            Ok(Some(payload)) => {
                self.metrics.cache_hits.get_or_create(&labels).inc();
                debug!(%key, "cache hit");
                Some(payload)
            }
            Ok(None) => {
                self.metrics.cache_misses.get_or_create(&labels).inc();
                debug!(%key, "cache miss");
                None
            }
            Err(err) => {
                self.metrics.cache_misses.get_or_create(&labels).inc();
                warn!(%key, backend = self.backend.name(), error = %err, "cache read failed");
                None
            }
        }
    }

    /// Stores `payload` with the TTL configured for the key's category.
    pub async fn put(&self, key: &CacheKey, payload: Bytes) {
        let ttl = self.ttls.for_category(key.category());
        self.put_with_ttl(key, payload, ttl).await;
    }

    pub async fn put_with_ttl(&self, key: &CacheKey, payload: Bytes, ttl: Duration) {
        if let Err(err) = self.backend.put(key.as_str(), payload, ttl).await {
            warn!(%key, backend = self.backend.name(), error = %err, "cache write failed");
        }
    }

    /// Serves the cached view or computes, stores and returns a fresh one.
    pub async fn get_or_compute<F, Fut, E>(&self, key: &CacheKey, compute: F) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(hit);
        }
        let fresh = compute().await?;
        self.put(key, fresh.clone()).await;
        Ok(fresh)
    }

    /// Drops every entry of `category` (or of one scope within it).
    ///
    /// Backends without prefix deletion yield `CacheInvalidationUnsupported`;
    /// the warning is logged once per category and the entries age out by TTL.
    pub async fn invalidate(
        &self,
        category: CacheCategory,
        scope: Option<CacheScope>,
    ) -> Result<u64, DomainError> {
        let prefix = invalidation_prefix(category, scope);
        let labels = CategoryLabels::from(category);
        match self.backend.delete_prefix(&prefix).await {
            Ok(removed) => {
                self.metrics.cache_invalidations.get_or_create(&labels).inc();
                debug!(%prefix, removed, "cache entries invalidated");
                Ok(removed)
            }
            Err(CacheError::PatternUnsupported) => {
                self.metrics
                    .cache_invalidations_unsupported
                    .get_or_create(&labels)
                    .inc();
                if self.unsupported_logged.insert(category) {
                    warn!(
                        %category,
                        backend = self.backend.name(),
                        ttl_secs = self.ttls.for_category(category).as_secs(),
                        "cache backend cannot delete by pattern, entries expire by TTL"
                    );
                } else {
                    debug!(%prefix, "pattern invalidation skipped");
                }
                Err(DomainError::CacheInvalidationUnsupported(category))
            }
            Err(err) => {
                warn!(%prefix, backend = self.backend.name(), error = %err, "cache invalidation failed");
                Err(err.into())
            }
        }
    }

    /// Invalidates what a change to `post` makes stale: the home feed, the
    /// feed of its board and its own detail view.
    pub async fn invalidate_post_views(&self, post: &Post) -> InvalidationSummary {
        let targets = [
            (CacheCategory::HomePosts, None),
            (CacheCategory::BoardPosts, Some(CacheScope::Board(post.board_id))),
            (CacheCategory::PostDetail, Some(CacheScope::Post(post.id))),
        ];
        self.invalidate_all(&targets).await
    }

    /// Invalidates the detail view of one post only.
    pub async fn invalidate_post_detail(&self, post: PostId) -> InvalidationSummary {
        self.invalidate_all(&[(CacheCategory::PostDetail, Some(CacheScope::Post(post)))])
            .await
    }

    async fn invalidate_all(
        &self,
        targets: &[(CacheCategory, Option<CacheScope>)],
    ) -> InvalidationSummary {
        let mut summary = InvalidationSummary::default();
        for &(category, scope) in targets {
            match self.invalidate(category, scope).await {
                Ok(removed) => summary.removed += removed,
                Err(err) => summary.failures.push(err),
            }
        }
        summary
    }
}

//! # Errors
//!
//! Centralized error handling for the forum engagement core.
//! Adapters report `StorageError` / `CacheError`; services surface `DomainError`.

use thiserror::Error;

use crate::models::{BoardId, CacheCategory, CommentId, CounterRef, PostId, TargetRef, UserId};

/// Failures reported by a persistence adapter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// A unique constraint rejected the write (a concurrent racer got there first).
    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    /// A row the write depends on does not exist.
    #[error("{0} not found with ID {1}")]
    NotFound(&'static str, String),

    /// Infrastructure failure (connection lost, statement timeout, ...).
    #[error("database error: {0}")]
    Database(String),
}

/// Failures reported by a cache backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// The backend can only delete exact keys.
    #[error("cache backend does not support pattern deletion")]
    PatternUnsupported,

    #[error("cache backend error: {0}")]
    Backend(String),
}

/// The primary error type for all core operations.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Resource not found (e.g., Board, Post, Comment)
    #[error("{0} not found with ID {1}")]
    NotFound(&'static str, String),

    /// Access evaluation returned false for the board.
    #[error("access to board {0} denied")]
    PolicyDenied(BoardId),

    /// The operation needs an authenticated principal.
    #[error("authentication required")]
    Unauthenticated,

    /// The principal lacks the role or authorship the operation requires.
    #[error("not permitted to {0}")]
    Forbidden(&'static str),

    /// A concurrent toggle inserted the same reaction first.
    #[error("user {user} already reacted to {target}")]
    DuplicateReaction { user: UserId, target: TargetRef },

    /// A concurrent toggle inserted the same favorite first.
    #[error("user {user} already favorited post {post}")]
    DuplicateFavorite { user: UserId, post: PostId },

    /// A reply's parent lives under another post.
    #[error("parent comment {parent} does not belong to post {post}")]
    CrossPostParent { parent: CommentId, post: PostId },

    /// Input rejected before any write (e.g., empty comment body).
    #[error("validation error: {0}")]
    Validation(String),

    /// Recomputing or persisting a denormalized counter failed.
    #[error("failed to resync {counter}: {source}")]
    CounterResyncFailed {
        counter: CounterRef,
        #[source]
        source: StorageError,
    },

    /// The cache backend cannot delete by pattern; entries expire by TTL instead.
    #[error("cache invalidation unsupported for category {0}")]
    CacheInvalidationUnsupported(CacheCategory),

    /// The cache backend failed; the cache is advisory so this is never fatal.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Infrastructure failure outside of counter maintenance.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DomainError {
    /// Whether the caller may simply re-query and carry on.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::DuplicateReaction { .. } | Self::DuplicateFavorite { .. }
        )
    }
}

/// A specialized Result type for core logic.
pub type Result<T> = std::result::Result<T, DomainError>;

//! # Ports
//!
//! Contracts the core consumes from the surrounding CRUD layer. Any adapter
//! must implement these traits to be wired into the services.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::{CacheError, StorageError};
use crate::models::{
    Board, BoardId, Comment, CommentId, CounterRef, Favorite, FavoriteId, GroupId, Post, PostId,
    Reaction, ReactionId, TargetRef, UserId,
};

/// Read accessors that run outside any transaction.
#[async_trait]
pub trait ForumReader: Send + Sync {
    async fn fetch_board(&self, id: BoardId) -> Result<Option<Board>, StorageError>;
    /// All boards ordered by `(order, id)`.
    async fn list_boards(&self) -> Result<Vec<Board>, StorageError>;
    async fn fetch_post(&self, id: PostId) -> Result<Option<Post>, StorageError>;
    async fn fetch_comment(&self, id: CommentId) -> Result<Option<Comment>, StorageError>;
    /// Every comment of the post, in no particular order.
    async fn list_post_comments(&self, post: PostId) -> Result<Vec<Comment>, StorageError>;
    async fn list_principal_groups(&self, user: UserId) -> Result<HashSet<GroupId>, StorageError>;
    async fn find_reaction(
        &self,
        user: UserId,
        target: TargetRef,
    ) -> Result<Option<Reaction>, StorageError>;
    async fn find_favorite(
        &self,
        user: UserId,
        post: PostId,
    ) -> Result<Option<Favorite>, StorageError>;
    async fn list_post_ids(&self) -> Result<Vec<PostId>, StorageError>;
    async fn list_comment_ids(&self) -> Result<Vec<CommentId>, StorageError>;
}

/// A store whose mutations run inside transactions the core controls.
#[async_trait]
pub trait ForumStore: ForumReader {
    /// Opens a transaction. Dropping it without `commit` rolls it back.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError>;
}

/// Row mutation primitives scoped to one transaction.
#[async_trait]
pub trait StoreTransaction: Send {
    async fn fetch_post(&mut self, id: PostId) -> Result<Option<Post>, StorageError>;
    async fn fetch_comment(&mut self, id: CommentId) -> Result<Option<Comment>, StorageError>;
    /// Loads the post and holds a row lock on it until the transaction ends.
    async fn lock_post(&mut self, id: PostId) -> Result<Option<Post>, StorageError>;

    /// Returns the reaction for `(user, target)` and holds a row lock on it
    /// until the transaction ends.
    async fn lock_reaction(
        &mut self,
        user: UserId,
        target: TargetRef,
    ) -> Result<Option<Reaction>, StorageError>;
    /// Fails with [`StorageError::UniqueViolation`] if `(user, target)` exists.
    async fn insert_reaction(&mut self, reaction: &Reaction) -> Result<(), StorageError>;
    async fn delete_reaction(&mut self, id: ReactionId) -> Result<(), StorageError>;
    async fn delete_reactions_for(&mut self, target: TargetRef) -> Result<u64, StorageError>;
    async fn count_reactions(&mut self, target: TargetRef) -> Result<u64, StorageError>;

    async fn lock_favorite(
        &mut self,
        user: UserId,
        post: PostId,
    ) -> Result<Option<Favorite>, StorageError>;
    async fn insert_favorite(&mut self, favorite: &Favorite) -> Result<(), StorageError>;
    async fn delete_favorite(&mut self, id: FavoriteId) -> Result<(), StorageError>;

    async fn insert_post(&mut self, post: &Post) -> Result<(), StorageError>;
    async fn update_post_flags(
        &mut self,
        id: PostId,
        is_pinned: bool,
        is_featured: bool,
    ) -> Result<(), StorageError>;
    /// Removes the post together with its comments and favorites. Reactions
    /// are polymorphic and must be removed by the caller.
    async fn delete_post(&mut self, id: PostId) -> Result<(), StorageError>;

    async fn insert_comment(&mut self, comment: &Comment) -> Result<(), StorageError>;
    async fn list_post_comment_ids(&mut self, post: PostId)
        -> Result<Vec<CommentId>, StorageError>;
    /// Clears `parent_id` on every direct reply of `parent`.
    async fn detach_replies(&mut self, parent: CommentId) -> Result<u64, StorageError>;
    async fn delete_comment(&mut self, id: CommentId) -> Result<(), StorageError>;
    async fn count_comments(&mut self, post: PostId) -> Result<u64, StorageError>;

    /// Row-locks the post or comment carrying `counter`, so that a count
    /// taken afterwards sees every write committed by earlier lock holders.
    /// Fails with [`StorageError::NotFound`] when the row is gone.
    async fn lock_counter_owner(&mut self, counter: CounterRef) -> Result<(), StorageError>;

    /// Overwrites a denormalized counter column.
    async fn store_counter(&mut self, counter: CounterRef, value: u64)
        -> Result<(), StorageError>;

    async fn commit(&mut self) -> Result<(), StorageError>;
}

/// Key/value backend for rendered responses.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Short backend label for logs.
    fn name(&self) -> &'static str;
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;
    async fn put(&self, key: &str, payload: Bytes, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
    /// Deletes every key starting with `prefix`, returning how many went.
    /// Backends limited to exact keys return [`CacheError::PatternUnsupported`].
    async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
}

#[cfg(any(test, feature = "testing"))]
pub mod mocks {
    //! mockall doubles for the ports above.

    use super::*;
    use mockall::mock;

    mock! {
        pub Store {}

        #[async_trait]
        impl ForumReader for Store {
            async fn fetch_board(&self, id: BoardId) -> Result<Option<Board>, StorageError>;
            async fn list_boards(&self) -> Result<Vec<Board>, StorageError>;
            async fn fetch_post(&self, id: PostId) -> Result<Option<Post>, StorageError>;
            async fn fetch_comment(&self, id: CommentId) -> Result<Option<Comment>, StorageError>;
            async fn list_post_comments(&self, post: PostId) -> Result<Vec<Comment>, StorageError>;
            async fn list_principal_groups(&self, user: UserId) -> Result<HashSet<GroupId>, StorageError>;
            async fn find_reaction(&self, user: UserId, target: TargetRef) -> Result<Option<Reaction>, StorageError>;
            async fn find_favorite(&self, user: UserId, post: PostId) -> Result<Option<Favorite>, StorageError>;
            async fn list_post_ids(&self) -> Result<Vec<PostId>, StorageError>;
            async fn list_comment_ids(&self) -> Result<Vec<CommentId>, StorageError>;
        }

        #[async_trait]
        impl ForumStore for Store {
            async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError>;
        }
    }

    mock! {
        pub Tx {}

        #[async_trait]
        impl StoreTransaction for Tx {
            async fn fetch_post(&mut self, id: PostId) -> Result<Option<Post>, StorageError>;
            async fn fetch_comment(&mut self, id: CommentId) -> Result<Option<Comment>, StorageError>;
            async fn lock_post(&mut self, id: PostId) -> Result<Option<Post>, StorageError>;
            async fn lock_reaction(&mut self, user: UserId, target: TargetRef) -> Result<Option<Reaction>, StorageError>;
            async fn insert_reaction(&mut self, reaction: &Reaction) -> Result<(), StorageError>;
            async fn delete_reaction(&mut self, id: ReactionId) -> Result<(), StorageError>;
            async fn delete_reactions_for(&mut self, target: TargetRef) -> Result<u64, StorageError>;
            async fn count_reactions(&mut self, target: TargetRef) -> Result<u64, StorageError>;
            async fn lock_favorite(&mut self, user: UserId, post: PostId) -> Result<Option<Favorite>, StorageError>;
            async fn insert_favorite(&mut self, favorite: &Favorite) -> Result<(), StorageError>;
            async fn delete_favorite(&mut self, id: FavoriteId) -> Result<(), StorageError>;
            async fn insert_post(&mut self, post: &Post) -> Result<(), StorageError>;
            async fn update_post_flags(&mut self, id: PostId, is_pinned: bool, is_featured: bool) -> Result<(), StorageError>;
            async fn delete_post(&mut self, id: PostId) -> Result<(), StorageError>;
            async fn insert_comment(&mut self, comment: &Comment) -> Result<(), StorageError>;
            async fn list_post_comment_ids(&mut self, post: PostId) -> Result<Vec<CommentId>, StorageError>;
            async fn detach_replies(&mut self, parent: CommentId) -> Result<u64, StorageError>;
            async fn delete_comment(&mut self, id: CommentId) -> Result<(), StorageError>;
            async fn count_comments(&mut self, post: PostId) -> Result<u64, StorageError>;
            async fn lock_counter_owner(&mut self, counter: CounterRef) -> Result<(), StorageError>;
            async fn store_counter(&mut self, counter: CounterRef, value: u64) -> Result<(), StorageError>;
            async fn commit(&mut self) -> Result<(), StorageError>;
        }
    }

    mock! {
        pub Cache {}

        #[async_trait]
        impl CacheBackend for Cache {
            fn name(&self) -> &'static str;
            async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;
            async fn put(&self, key: &str, payload: Bytes, ttl: Duration) -> Result<(), CacheError>;
            async fn delete(&self, key: &str) -> Result<(), CacheError>;
            async fn delete_prefix(&self, prefix: &str) -> Result<u64, CacheError>;
        }
    }
}

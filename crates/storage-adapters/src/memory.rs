//! # In-memory forum store
//!
//! Tables live behind one async mutex. A transaction holds the lock for its
//! whole lifetime and writes in place, keeping an undo log; dropping it
//! without `commit` rolls the writes back. Transactions are therefore fully
//! serialized, which is stronger than the row locks a real database gives
//! the toggles that use this store in tests and single-node setups.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use domains::{
    Board, BoardId, Comment, CommentId, CounterRef, Favorite, FavoriteId, ForumReader, ForumStore,
    GroupId, Post, PostId, Reaction, ReactionId, StorageError, StoreTransaction, TargetRef, UserId,
};

#[derive(Debug, Default)]
struct Tables {
    boards: HashMap<BoardId, Board>,
    posts: HashMap<PostId, Post>,
    comments: HashMap<CommentId, Comment>,
    reactions: HashMap<ReactionId, Reaction>,
    favorites: HashMap<FavoriteId, Favorite>,
    memberships: HashMap<UserId, HashSet<GroupId>>,
}

impl Tables {
    fn reaction_for(&self, user: UserId, target: TargetRef) -> Option<&Reaction> {
        self.reactions
            .values()
            .find(|r| r.user_id == user && r.target == target)
    }

    fn favorite_for(&self, user: UserId, post: PostId) -> Option<&Favorite> {
        self.favorites
            .values()
            .find(|f| f.user_id == user && f.post_id == post)
    }
}

#[derive(Default)]
pub struct InMemoryForumStore {
    tables: Arc<Mutex<Tables>>,
    fail_group_lookups: AtomicBool,
}

impl InMemoryForumStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Seeding ─────────────────────────────────────────────────────────────
    // Direct writes used by the binary's bootstrap and by tests. They skip the
    // transactional path on purpose so malformed rows can be planted.

    pub async fn seed_board(&self, board: Board) {
        self.tables.lock().await.boards.insert(board.id, board);
    }

    pub async fn seed_post(&self, post: Post) {
        self.tables.lock().await.posts.insert(post.id, post);
    }

    /// Stores the comment as given, without checking that its parent exists
    /// or belongs to the same post.
    pub async fn seed_comment(&self, comment: Comment) {
        self.tables.lock().await.comments.insert(comment.id, comment);
    }

    pub async fn seed_reaction(&self, reaction: Reaction) {
        self.tables.lock().await.reactions.insert(reaction.id, reaction);
    }

    pub async fn add_membership(&self, user: UserId, group: GroupId) {
        self.tables
            .lock()
            .await
            .memberships
            .entry(user)
            .or_default()
            .insert(group);
    }

    /// Rewrites a comment's parent pointer, bypassing every check.
    pub async fn set_comment_parent(
        &self,
        id: CommentId,
        parent: Option<CommentId>,
    ) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().await;
        let comment = tables
            .comments
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound("Comment", id.to_string()))?;
        comment.parent_id = parent;
        Ok(())
    }

    /// Overwrites a stored counter with an arbitrary value.
    pub async fn corrupt_counter(&self, counter: CounterRef, value: u64) -> Result<(), StorageError> {
        write_counter(&mut *self.tables.lock().await, counter, value)
    }

    /// Makes `list_principal_groups` fail until reset.
    pub fn fail_group_lookups(&self, fail: bool) {
        self.fail_group_lookups.store(fail, Ordering::SeqCst);
    }

    // ── Inspection ──────────────────────────────────────────────────────────

    pub async fn reaction_rows(&self, target: TargetRef) -> usize {
        self.tables
            .lock()
            .await
            .reactions
            .values()
            .filter(|r| r.target == target)
            .count()
    }

    pub async fn favorite_rows(&self, post: PostId) -> usize {
        self.tables
            .lock()
            .await
            .favorites
            .values()
            .filter(|f| f.post_id == post)
            .count()
    }
}

#[async_trait]
impl ForumReader for InMemoryForumStore {
    async fn fetch_board(&self, id: BoardId) -> Result<Option<Board>, StorageError> {
        Ok(self.tables.lock().await.boards.get(&id).cloned())
    }

    async fn list_boards(&self) -> Result<Vec<Board>, StorageError> {
        let mut boards: Vec<Board> = self.tables.lock().await.boards.values().cloned().collect();
        boards.sort_by(|a, b| (a.order, a.id).cmp(&(b.order, b.id)));
        Ok(boards)
    }

    async fn fetch_post(&self, id: PostId) -> Result<Option<Post>, StorageError> {
        Ok(self.tables.lock().await.posts.get(&id).cloned())
    }

    async fn fetch_comment(&self, id: CommentId) -> Result<Option<Comment>, StorageError> {
        Ok(self.tables.lock().await.comments.get(&id).cloned())
    }

    async fn list_post_comments(&self, post: PostId) -> Result<Vec<Comment>, StorageError> {
        Ok(self
            .tables
            .lock()
            .await
            .comments
            .values()
            .filter(|c| c.post_id == post)
            .cloned()
            .collect())
    }

    async fn list_principal_groups(&self, user: UserId) -> Result<HashSet<GroupId>, StorageError> {
        if self.fail_group_lookups.load(Ordering::SeqCst) {
            return Err(StorageError::Database("group lookup unavailable".into()));
        }
        Ok(self
            .tables
            .lock()
            .await
            .memberships
            .get(&user)
            .cloned()
            .unwrap_or_default())
    }

    async fn find_reaction(
        &self,
        user: UserId,
        target: TargetRef,
    ) -> Result<Option<Reaction>, StorageError> {
        Ok(self.tables.lock().await.reaction_for(user, target).cloned())
    }

    async fn find_favorite(
        &self,
        user: UserId,
        post: PostId,
    ) -> Result<Option<Favorite>, StorageError> {
        Ok(self.tables.lock().await.favorite_for(user, post).cloned())
    }

    async fn list_post_ids(&self) -> Result<Vec<PostId>, StorageError> {
        let mut ids: Vec<PostId> = self.tables.lock().await.posts.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn list_comment_ids(&self) -> Result<Vec<CommentId>, StorageError> {
        let mut ids: Vec<CommentId> = self.tables.lock().await.comments.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}

#[async_trait]
impl ForumStore for InMemoryForumStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
        let guard = self.tables.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            guard: Some(guard),
            undo: Vec::new(),
        }))
    }
}

/// Prior state of a row written by an open transaction.
enum Undo {
    Post(PostId, Option<Post>),
    Comment(CommentId, Option<Comment>),
    Reaction(ReactionId, Option<Reaction>),
    Favorite(FavoriteId, Option<Favorite>),
}

impl Undo {
    fn revert(self, tables: &mut Tables) {
        match self {
            Self::Post(id, prior) => restore(&mut tables.posts, id, prior),
            Self::Comment(id, prior) => restore(&mut tables.comments, id, prior),
            Self::Reaction(id, prior) => restore(&mut tables.reactions, id, prior),
            Self::Favorite(id, prior) => restore(&mut tables.favorites, id, prior),
        }
    }
}

fn restore<K: Eq + Hash, V>(table: &mut HashMap<K, V>, key: K, prior: Option<V>) {
    match prior {
        Some(row) => {
            table.insert(key, row);
        }
        None => {
            table.remove(&key);
        }
    }
}

/// Removes every row matching `doomed`, logging each one.
fn remove_matching<K, V>(
    table: &mut HashMap<K, V>,
    undo: &mut Vec<Undo>,
    record: fn(K, Option<V>) -> Undo,
    doomed: impl Fn(&V) -> bool,
) -> u64
where
    K: Copy + Eq + Hash,
{
    let keys: Vec<K> = table
        .iter()
        .filter(|(_, row)| doomed(row))
        .map(|(key, _)| *key)
        .collect();
    for key in &keys {
        if let Some(row) = table.remove(key) {
            undo.push(record(*key, Some(row)));
        }
    }
    keys.len() as u64
}

/// Transaction over [`InMemoryForumStore`].
///
/// Writes land directly in the locked tables and log the prior state of the
/// row they touch. Dropping the transaction without `commit` replays that
/// log backwards, so opening one costs nothing however large the store is.
pub struct MemoryTransaction {
    guard: Option<OwnedMutexGuard<Tables>>,
    undo: Vec<Undo>,
}

impl MemoryTransaction {
    fn tables(&mut self) -> Result<&mut Tables, StorageError> {
        self.guard.as_deref_mut().ok_or_else(closed)
    }

    fn parts(&mut self) -> Result<(&mut Tables, &mut Vec<Undo>), StorageError> {
        match self.guard.as_deref_mut() {
            Some(tables) => Ok((tables, &mut self.undo)),
            None => Err(closed()),
        }
    }
}

fn closed() -> StorageError {
    StorageError::Database("transaction already committed".into())
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if let Some(mut tables) = self.guard.take() {
            let undone = self.undo.len();
            while let Some(op) = self.undo.pop() {
                op.revert(&mut tables);
            }
            if undone > 0 {
                debug!(undone, "in-memory transaction rolled back");
            }
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn fetch_post(&mut self, id: PostId) -> Result<Option<Post>, StorageError> {
        Ok(self.tables()?.posts.get(&id).cloned())
    }

    async fn fetch_comment(&mut self, id: CommentId) -> Result<Option<Comment>, StorageError> {
        Ok(self.tables()?.comments.get(&id).cloned())
    }

    // The store lock already serializes transactions.
    async fn lock_post(&mut self, id: PostId) -> Result<Option<Post>, StorageError> {
        Ok(self.tables()?.posts.get(&id).cloned())
    }

    async fn lock_reaction(
        &mut self,
        user: UserId,
        target: TargetRef,
    ) -> Result<Option<Reaction>, StorageError> {
        Ok(self.tables()?.reaction_for(user, target).cloned())
    }

    async fn insert_reaction(&mut self, reaction: &Reaction) -> Result<(), StorageError> {
        let (tables, undo) = self.parts()?;
        if tables
            .reaction_for(reaction.user_id, reaction.target)
            .is_some()
        {
            return Err(StorageError::UniqueViolation("likes_user_target_key".into()));
        }
        let prior = tables.reactions.insert(reaction.id, reaction.clone());
        undo.push(Undo::Reaction(reaction.id, prior));
        Ok(())
    }

    async fn delete_reaction(&mut self, id: ReactionId) -> Result<(), StorageError> {
        let (tables, undo) = self.parts()?;
        let prior = tables
            .reactions
            .remove(&id)
            .ok_or_else(|| StorageError::NotFound("Reaction", id.to_string()))?;
        undo.push(Undo::Reaction(id, Some(prior)));
        Ok(())
    }

    async fn delete_reactions_for(&mut self, target: TargetRef) -> Result<u64, StorageError> {
        let (tables, undo) = self.parts()?;
        Ok(remove_matching(&mut tables.reactions, undo, Undo::Reaction, |r| {
            r.target == target
        }))
    }

    async fn count_reactions(&mut self, target: TargetRef) -> Result<u64, StorageError> {
        Ok(self
            .tables()?
            .reactions
            .values()
            .filter(|r| r.target == target)
            .count() as u64)
    }

    async fn lock_favorite(
        &mut self,
        user: UserId,
        post: PostId,
    ) -> Result<Option<Favorite>, StorageError> {
        Ok(self.tables()?.favorite_for(user, post).cloned())
    }

    async fn insert_favorite(&mut self, favorite: &Favorite) -> Result<(), StorageError> {
        let (tables, undo) = self.parts()?;
        if !tables.posts.contains_key(&favorite.post_id) {
            return Err(StorageError::NotFound("Post", favorite.post_id.to_string()));
        }
        if tables
            .favorite_for(favorite.user_id, favorite.post_id)
            .is_some()
        {
            return Err(StorageError::UniqueViolation("favorites_user_post_key".into()));
        }
        let prior = tables.favorites.insert(favorite.id, favorite.clone());
        undo.push(Undo::Favorite(favorite.id, prior));
        Ok(())
    }

    async fn delete_favorite(&mut self, id: FavoriteId) -> Result<(), StorageError> {
        let (tables, undo) = self.parts()?;
        let prior = tables
            .favorites
            .remove(&id)
            .ok_or_else(|| StorageError::NotFound("Favorite", id.to_string()))?;
        undo.push(Undo::Favorite(id, Some(prior)));
        Ok(())
    }

    async fn insert_post(&mut self, post: &Post) -> Result<(), StorageError> {
        let (tables, undo) = self.parts()?;
        if !tables.boards.contains_key(&post.board_id) {
            return Err(StorageError::NotFound("Board", post.board_id.to_string()));
        }
        if tables.posts.contains_key(&post.id) {
            return Err(StorageError::UniqueViolation("posts_pkey".into()));
        }
        tables.posts.insert(post.id, post.clone());
        undo.push(Undo::Post(post.id, None));
        Ok(())
    }

    async fn update_post_flags(
        &mut self,
        id: PostId,
        is_pinned: bool,
        is_featured: bool,
    ) -> Result<(), StorageError> {
        let (tables, undo) = self.parts()?;
        let post = tables
            .posts
            .get_mut(&id)
            .ok_or_else(|| StorageError::NotFound("Post", id.to_string()))?;
        undo.push(Undo::Post(id, Some(post.clone())));
        post.is_pinned = is_pinned;
        post.is_featured = is_featured;
        Ok(())
    }

    async fn delete_post(&mut self, id: PostId) -> Result<(), StorageError> {
        let (tables, undo) = self.parts()?;
        let prior = tables
            .posts
            .remove(&id)
            .ok_or_else(|| StorageError::NotFound("Post", id.to_string()))?;
        undo.push(Undo::Post(id, Some(prior)));
        remove_matching(&mut tables.comments, undo, Undo::Comment, |c| c.post_id == id);
        remove_matching(&mut tables.favorites, undo, Undo::Favorite, |f| f.post_id == id);
        Ok(())
    }

    async fn insert_comment(&mut self, comment: &Comment) -> Result<(), StorageError> {
        let (tables, undo) = self.parts()?;
        if !tables.posts.contains_key(&comment.post_id) {
            return Err(StorageError::NotFound("Post", comment.post_id.to_string()));
        }
        if let Some(parent) = comment.parent_id {
            if !tables.comments.contains_key(&parent) {
                return Err(StorageError::NotFound("Comment", parent.to_string()));
            }
        }
        let prior = tables.comments.insert(comment.id, comment.clone());
        undo.push(Undo::Comment(comment.id, prior));
        Ok(())
    }

    async fn list_post_comment_ids(
        &mut self,
        post: PostId,
    ) -> Result<Vec<CommentId>, StorageError> {
        Ok(self
            .tables()?
            .comments
            .values()
            .filter(|c| c.post_id == post)
            .map(|c| c.id)
            .collect())
    }

    async fn detach_replies(&mut self, parent: CommentId) -> Result<u64, StorageError> {
        let (tables, undo) = self.parts()?;
        let mut detached = 0;
        for comment in tables.comments.values_mut() {
            if comment.parent_id == Some(parent) {
                undo.push(Undo::Comment(comment.id, Some(comment.clone())));
                comment.parent_id = None;
                detached += 1;
            }
        }
        Ok(detached)
    }

    async fn delete_comment(&mut self, id: CommentId) -> Result<(), StorageError> {
        let (tables, undo) = self.parts()?;
        let prior = tables
            .comments
            .remove(&id)
            .ok_or_else(|| StorageError::NotFound("Comment", id.to_string()))?;
        undo.push(Undo::Comment(id, Some(prior)));
        Ok(())
    }

    async fn count_comments(&mut self, post: PostId) -> Result<u64, StorageError> {
        Ok(self
            .tables()?
            .comments
            .values()
            .filter(|c| c.post_id == post)
            .count() as u64)
    }

    async fn lock_counter_owner(&mut self, counter: CounterRef) -> Result<(), StorageError> {
        let tables = self.tables()?;
        let exists = match counter {
            CounterRef::PostLikes(id) | CounterRef::PostComments(id) => {
                tables.posts.contains_key(&id)
            }
            CounterRef::CommentLikes(id) => tables.comments.contains_key(&id),
        };
        if exists {
            Ok(())
        } else {
            Err(owner_missing(counter))
        }
    }

    async fn store_counter(&mut self, counter: CounterRef, value: u64) -> Result<(), StorageError> {
        let (tables, undo) = self.parts()?;
        let prior = match counter {
            CounterRef::PostLikes(id) | CounterRef::PostComments(id) => tables
                .posts
                .get(&id)
                .map(|post| Undo::Post(id, Some(post.clone()))),
            CounterRef::CommentLikes(id) => tables
                .comments
                .get(&id)
                .map(|comment| Undo::Comment(id, Some(comment.clone()))),
        };
        undo.push(prior.ok_or_else(|| owner_missing(counter))?);
        write_counter(tables, counter, value)
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        let tables = self.guard.take().ok_or_else(closed)?;
        self.undo.clear();
        drop(tables);
        debug!("in-memory transaction committed");
        Ok(())
    }
}

fn owner_missing(counter: CounterRef) -> StorageError {
    match counter {
        CounterRef::PostLikes(id) | CounterRef::PostComments(id) => {
            StorageError::NotFound("Post", id.to_string())
        }
        CounterRef::CommentLikes(id) => StorageError::NotFound("Comment", id.to_string()),
    }
}


fn write_counter(tables: &mut Tables, counter: CounterRef, value: u64) -> Result<(), StorageError> {
    match counter {
        CounterRef::PostLikes(id) => {
            tables
                .posts
                .get_mut(&id)
                .ok_or_else(|| StorageError::NotFound("Post", id.to_string()))?
                .likes_count = value;
        }
        CounterRef::PostComments(id) => {
            tables
                .posts
                .get_mut(&id)
                .ok_or_else(|| StorageError::NotFound("Post", id.to_string()))?
                .comments_count = value;
        }
        CounterRef::CommentLikes(id) => {
            tables
                .comments
                .get_mut(&id)
                .ok_or_else(|| StorageError::NotFound("Comment", id.to_string()))?
                .likes_count = value;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use domains::AccessPolicy;

    fn board() -> Board {
        Board {
            id: BoardId::generate(),
            name: "general".into(),
            access_policy: AccessPolicy::Public,
            allowed_groups: HashSet::new(),
            allowed_users: HashSet::new(),
            order: 0,
        }
    }

    fn post(board: BoardId) -> Post {
        Post {
            id: PostId::generate(),
            board_id: board,
            author_id: UserId::generate(),
            title: "hello".into(),
            content: "world".into(),
            likes_count: 0,
            comments_count: 0,
            is_pinned: false,
            is_featured: false,
            created_at: Utc::now(),
        }
    }

    fn reaction(user: UserId, target: TargetRef) -> Reaction {
        Reaction {
            id: ReactionId::generate(),
            user_id: user,
            target,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = InMemoryForumStore::new();
        let b = board();
        let p = post(b.id);
        store.seed_board(b).await;
        store.seed_post(p.clone()).await;

        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_reaction(&reaction(UserId::generate(), TargetRef::Post(p.id)))
                .await
                .unwrap();
            tx.store_counter(CounterRef::PostLikes(p.id), 1).await.unwrap();
        }

        assert_eq!(store.reaction_rows(TargetRef::Post(p.id)).await, 0);
        assert_eq!(store.fetch_post(p.id).await.unwrap().unwrap().likes_count, 0);
    }

    #[tokio::test]
    async fn committed_transaction_is_visible() {
        let store = InMemoryForumStore::new();
        let b = board();
        let p = post(b.id);
        store.seed_board(b).await;
        store.seed_post(p.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_reaction(&reaction(UserId::generate(), TargetRef::Post(p.id)))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        drop(tx);

        assert_eq!(store.reaction_rows(TargetRef::Post(p.id)).await, 1);
    }

    #[tokio::test]
    async fn duplicate_reaction_is_a_unique_violation() {
        let store = InMemoryForumStore::new();
        let user = UserId::generate();
        let target = TargetRef::Post(PostId::generate());

        let mut tx = store.begin().await.unwrap();
        tx.insert_reaction(&reaction(user, target)).await.unwrap();
        let err = tx.insert_reaction(&reaction(user, target)).await.unwrap_err();
        assert!(matches!(err, StorageError::UniqueViolation(_)));
    }

    #[tokio::test]
    async fn commit_twice_is_rejected() {
        let store = InMemoryForumStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.commit().await.unwrap();
        assert!(tx.commit().await.is_err());
        assert!(tx.count_comments(PostId::generate()).await.is_err());
    }

    #[tokio::test]
    async fn delete_post_cascades_comments_and_favorites() {
        let store = InMemoryForumStore::new();
        let b = board();
        let p = post(b.id);
        store.seed_board(b).await;
        store.seed_post(p.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.insert_comment(&Comment {
            id: CommentId::generate(),
            post_id: p.id,
            user_id: UserId::generate(),
            parent_id: None,
            content: "first".into(),
            likes_count: 0,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        tx.insert_favorite(&Favorite {
            id: FavoriteId::generate(),
            user_id: UserId::generate(),
            post_id: p.id,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
        tx.delete_post(p.id).await.unwrap();
        assert_eq!(tx.count_comments(p.id).await.unwrap(), 0);
        tx.commit().await.unwrap();
        drop(tx);

        assert!(store.list_post_comments(p.id).await.unwrap().is_empty());
        assert_eq!(store.favorite_rows(p.id).await, 0);
    }

    #[tokio::test]
    async fn dropped_delete_restores_cascaded_rows() {
        let store = InMemoryForumStore::new();
        let b = board();
        let p = post(b.id);
        store.seed_board(b).await;
        store.seed_post(p.clone()).await;
        let parent = Comment {
            id: CommentId::generate(),
            post_id: p.id,
            user_id: UserId::generate(),
            parent_id: None,
            content: "parent".into(),
            likes_count: 0,
            created_at: Utc::now(),
        };
        let reply = Comment {
            id: CommentId::generate(),
            parent_id: Some(parent.id),
            content: "reply".into(),
            ..parent.clone()
        };
        store.seed_comment(parent.clone()).await;
        store.seed_comment(reply.clone()).await;

        {
            let mut tx = store.begin().await.unwrap();
            assert_eq!(tx.detach_replies(parent.id).await.unwrap(), 1);
            tx.delete_comment(parent.id).await.unwrap();
            tx.store_counter(CounterRef::PostComments(p.id), 1).await.unwrap();
            tx.delete_post(p.id).await.unwrap();
            assert!(tx.fetch_comment(reply.id).await.unwrap().is_none());
        }

        assert_eq!(store.fetch_post(p.id).await.unwrap(), Some(p.clone()));
        assert_eq!(store.fetch_comment(parent.id).await.unwrap(), Some(parent));
        assert_eq!(store.fetch_comment(reply.id).await.unwrap(), Some(reply));
    }

    #[tokio::test]
    async fn counter_owner_lock_reports_missing_rows() {
        let store = InMemoryForumStore::new();
        let b = board();
        let p = post(b.id);
        store.seed_board(b).await;
        store.seed_post(p.clone()).await;

        let mut tx = store.begin().await.unwrap();
        tx.lock_counter_owner(CounterRef::PostLikes(p.id)).await.unwrap();
        let err = tx
            .lock_counter_owner(CounterRef::CommentLikes(CommentId::generate()))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound("Comment", _)));
    }

    #[test]
    fn boards_are_listed_by_order_then_id() {
        let store = InMemoryForumStore::new();
        let mut late = board();
        late.order = 5;
        let mut early = board();
        early.order = 1;
        let (late_id, early_id) = (late.id, early.id);

        let listed = tokio_test::block_on(async {
            store.seed_board(late).await;
            store.seed_board(early).await;
            store.list_boards().await.unwrap()
        });
        let ids: Vec<BoardId> = listed.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![early_id, late_id]);
    }
}

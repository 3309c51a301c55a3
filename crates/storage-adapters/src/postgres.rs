//! # PostgreSQL forum store
//!
//! Maps the relational schema in `migrations/` onto the domain models.
//! `lock_reaction`/`lock_favorite` use `SELECT ... FOR UPDATE`; a racing
//! insert of the same pair is stopped by the unique constraints and surfaces
//! as [`StorageError::UniqueViolation`].
//!
//! Counter owners and posts are locked `FOR NO KEY UPDATE`. That mode does
//! not conflict with the `KEY SHARE` lock a comment insert takes on its post
//! through the foreign key, so inserting then locking cannot deadlock. Under
//! READ COMMITTED the `COUNT(*)` that follows the lock reads a fresh
//! snapshot including every row committed by earlier lock holders.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use tracing::{debug, info};
use uuid::Uuid;

use domains::{
    AccessPolicy, Board, BoardId, Comment, CommentId, CounterRef, Favorite, FavoriteId,
    ForumReader, ForumStore, GroupId, Post, PostId, Reaction, ReactionId, StorageError,
    StoreTransaction, TargetKind, TargetRef, UserId,
};

const POST_COLUMNS: &str = "id, board_id, author_id, title, content, likes_count, comments_count, \
                            is_pinned, is_featured, created_at";
const COMMENT_COLUMNS: &str = "id, post_id, user_id, parent_id, content, likes_count, created_at";
const LIKE_COLUMNS: &str = "id, user_id, target_type, target_id, created_at";
const FAVORITE_COLUMNS: &str = "id, user_id, post_id, created_at";

pub struct PgForumStore {
    pool: PgPool,
}

impl PgForumStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(db_err)?;
        info!(max_connections, "postgres pool ready");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Database(e.to_string()))
    }

    /// Inserts a board together with its allow lists.
    pub async fn insert_board(&self, board: &Board) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query("INSERT INTO boards (id, name, access_type, sort_order) VALUES ($1, $2, $3, $4)")
            .bind(board.id.as_uuid())
            .bind(&board.name)
            .bind(board.access_policy.as_str())
            .bind(board.order)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        for group in &board.allowed_groups {
            sqlx::query("INSERT INTO board_allowed_groups (board_id, group_id) VALUES ($1, $2)")
                .bind(board.id.as_uuid())
                .bind(group.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }
        for user in &board.allowed_users {
            sqlx::query("INSERT INTO board_allowed_users (board_id, user_id) VALUES ($1, $2)")
                .bind(board.id.as_uuid())
                .bind(user.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(db_err)?;
        }

        tx.commit().await.map_err(db_err)
    }

    pub async fn add_membership(&self, user: UserId, group: GroupId) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO user_groups (user_id, group_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user.as_uuid())
        .bind(group.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    /// Loads boards with their allow lists. `None` loads every board.
    async fn load_boards(&self, only: Option<BoardId>) -> Result<Vec<Board>, StorageError> {
        let only = only.map(|id| id.as_uuid());

        let rows = sqlx::query(
            "SELECT id, name, access_type, sort_order FROM boards \
             WHERE ($1::uuid IS NULL OR id = $1) ORDER BY sort_order, id",
        )
        .bind(only)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut groups: HashMap<Uuid, HashSet<GroupId>> = HashMap::new();
        for row in sqlx::query(
            "SELECT board_id, group_id FROM board_allowed_groups WHERE ($1::uuid IS NULL OR board_id = $1)",
        )
        .bind(only)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        {
            groups
                .entry(row.get("board_id"))
                .or_default()
                .insert(GroupId(row.get("group_id")));
        }

        let mut users: HashMap<Uuid, HashSet<UserId>> = HashMap::new();
        for row in sqlx::query(
            "SELECT board_id, user_id FROM board_allowed_users WHERE ($1::uuid IS NULL OR board_id = $1)",
        )
        .bind(only)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?
        {
            users
                .entry(row.get("board_id"))
                .or_default()
                .insert(UserId(row.get("user_id")));
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let id: Uuid = row.get("id");
                Board {
                    id: BoardId(id),
                    name: row.get("name"),
                    access_policy: AccessPolicy::parse(&row.get::<String, _>("access_type")),
                    allowed_groups: groups.remove(&id).unwrap_or_default(),
                    allowed_users: users.remove(&id).unwrap_or_default(),
                    order: row.get("sort_order"),
                }
            })
            .collect())
    }
}

#[async_trait]
impl ForumReader for PgForumStore {
    async fn fetch_board(&self, id: BoardId) -> Result<Option<Board>, StorageError> {
        Ok(self.load_boards(Some(id)).await?.into_iter().next())
    }

    async fn list_boards(&self) -> Result<Vec<Board>, StorageError> {
        self.load_boards(None).await
    }

    async fn fetch_post(&self, id: PostId) -> Result<Option<Post>, StorageError> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(post_from_row))
    }

    async fn fetch_comment(&self, id: CommentId) -> Result<Option<Comment>, StorageError> {
        let row = sqlx::query(&format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(comment_from_row))
    }

    async fn list_post_comments(&self, post: PostId) -> Result<Vec<Comment>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {COMMENT_COLUMNS} FROM comments WHERE post_id = $1"
        ))
        .bind(post.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(rows.iter().map(comment_from_row).collect())
    }

    async fn list_principal_groups(&self, user: UserId) -> Result<HashSet<GroupId>, StorageError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT group_id FROM user_groups WHERE user_id = $1")
            .bind(user.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(ids.into_iter().map(GroupId).collect())
    }

    async fn find_reaction(
        &self,
        user: UserId,
        target: TargetRef,
    ) -> Result<Option<Reaction>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {LIKE_COLUMNS} FROM likes WHERE user_id = $1 AND target_type = $2 AND target_id = $3"
        ))
        .bind(user.as_uuid())
        .bind(target.kind().as_str())
        .bind(target.raw_id())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(reaction_from_row).transpose()
    }

    async fn find_favorite(
        &self,
        user: UserId,
        post: PostId,
    ) -> Result<Option<Favorite>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {FAVORITE_COLUMNS} FROM favorites WHERE user_id = $1 AND post_id = $2"
        ))
        .bind(user.as_uuid())
        .bind(post.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(favorite_from_row))
    }

    async fn list_post_ids(&self) -> Result<Vec<PostId>, StorageError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM posts ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(ids.into_iter().map(PostId).collect())
    }

    async fn list_comment_ids(&self) -> Result<Vec<CommentId>, StorageError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM comments ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(ids.into_iter().map(CommentId).collect())
    }
}

#[async_trait]
impl ForumStore for PgForumStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StorageError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PgTransaction { tx: Some(tx) }))
    }
}

/// A database transaction. Dropping it before `commit` rolls back.
pub struct PgTransaction {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTransaction {
    fn conn(&mut self) -> Result<&mut PgConnection, StorageError> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(StorageError::Database("transaction already committed".into())),
        }
    }

    async fn execute(&mut self, query: &str, id: Uuid) -> Result<u64, StorageError> {
        let done = sqlx::query(query)
            .bind(id)
            .execute(self.conn()?)
            .await
            .map_err(db_err)?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl StoreTransaction for PgTransaction {
    async fn fetch_post(&mut self, id: PostId) -> Result<Option<Post>, StorageError> {
        let row = sqlx::query(&format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(self.conn()?)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(post_from_row))
    }

    async fn fetch_comment(&mut self, id: CommentId) -> Result<Option<Comment>, StorageError> {
        let row = sqlx::query(&format!("SELECT {COMMENT_COLUMNS} FROM comments WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(self.conn()?)
            .await
            .map_err(db_err)?;
        Ok(row.as_ref().map(comment_from_row))
    }

    async fn lock_post(&mut self, id: PostId) -> Result<Option<Post>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM posts WHERE id = $1 FOR NO KEY UPDATE"
        ))
        .bind(id.as_uuid())
        .fetch_optional(self.conn()?)
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(post_from_row))
    }

    async fn lock_reaction(
        &mut self,
        user: UserId,
        target: TargetRef,
    ) -> Result<Option<Reaction>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {LIKE_COLUMNS} FROM likes \
             WHERE user_id = $1 AND target_type = $2 AND target_id = $3 FOR UPDATE"
        ))
        .bind(user.as_uuid())
        .bind(target.kind().as_str())
        .bind(target.raw_id())
        .fetch_optional(self.conn()?)
        .await
        .map_err(db_err)?;
        row.as_ref().map(reaction_from_row).transpose()
    }

    async fn insert_reaction(&mut self, reaction: &Reaction) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO likes (id, user_id, target_type, target_id, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(reaction.id.as_uuid())
        .bind(reaction.user_id.as_uuid())
        .bind(reaction.target.kind().as_str())
        .bind(reaction.target.raw_id())
        .bind(reaction.created_at)
        .execute(self.conn()?)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_reaction(&mut self, id: ReactionId) -> Result<(), StorageError> {
        match self.execute("DELETE FROM likes WHERE id = $1", id.as_uuid()).await? {
            0 => Err(StorageError::NotFound("Reaction", id.to_string())),
            _ => Ok(()),
        }
    }

    async fn delete_reactions_for(&mut self, target: TargetRef) -> Result<u64, StorageError> {
        let done = sqlx::query("DELETE FROM likes WHERE target_type = $1 AND target_id = $2")
            .bind(target.kind().as_str())
            .bind(target.raw_id())
            .execute(self.conn()?)
            .await
            .map_err(db_err)?;
        Ok(done.rows_affected())
    }

    async fn count_reactions(&mut self, target: TargetRef) -> Result<u64, StorageError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE target_type = $1 AND target_id = $2")
                .bind(target.kind().as_str())
                .bind(target.raw_id())
                .fetch_one(self.conn()?)
                .await
                .map_err(db_err)?;
        Ok(to_count(count))
    }

    async fn lock_favorite(
        &mut self,
        user: UserId,
        post: PostId,
    ) -> Result<Option<Favorite>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {FAVORITE_COLUMNS} FROM favorites WHERE user_id = $1 AND post_id = $2 FOR UPDATE"
        ))
        .bind(user.as_uuid())
        .bind(post.as_uuid())
        .fetch_optional(self.conn()?)
        .await
        .map_err(db_err)?;
        Ok(row.as_ref().map(favorite_from_row))
    }

    async fn insert_favorite(&mut self, favorite: &Favorite) -> Result<(), StorageError> {
        sqlx::query("INSERT INTO favorites (id, user_id, post_id, created_at) VALUES ($1, $2, $3, $4)")
            .bind(favorite.id.as_uuid())
            .bind(favorite.user_id.as_uuid())
            .bind(favorite.post_id.as_uuid())
            .bind(favorite.created_at)
            .execute(self.conn()?)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn delete_favorite(&mut self, id: FavoriteId) -> Result<(), StorageError> {
        match self.execute("DELETE FROM favorites WHERE id = $1", id.as_uuid()).await? {
            0 => Err(StorageError::NotFound("Favorite", id.to_string())),
            _ => Ok(()),
        }
    }

    async fn insert_post(&mut self, post: &Post) -> Result<(), StorageError> {
        sqlx::query(&format!(
            "INSERT INTO posts ({POST_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(post.id.as_uuid())
        .bind(post.board_id.as_uuid())
        .bind(post.author_id.as_uuid())
        .bind(&post.title)
        .bind(&post.content)
        .bind(to_column(post.likes_count))
        .bind(to_column(post.comments_count))
        .bind(post.is_pinned)
        .bind(post.is_featured)
        .bind(post.created_at)
        .execute(self.conn()?)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn update_post_flags(
        &mut self,
        id: PostId,
        is_pinned: bool,
        is_featured: bool,
    ) -> Result<(), StorageError> {
        let done = sqlx::query("UPDATE posts SET is_pinned = $2, is_featured = $3 WHERE id = $1")
            .bind(id.as_uuid())
            .bind(is_pinned)
            .bind(is_featured)
            .execute(self.conn()?)
            .await
            .map_err(db_err)?;
        match done.rows_affected() {
            0 => Err(StorageError::NotFound("Post", id.to_string())),
            _ => Ok(()),
        }
    }

    async fn delete_post(&mut self, id: PostId) -> Result<(), StorageError> {
        // comments and favorites go with it through ON DELETE CASCADE
        match self.execute("DELETE FROM posts WHERE id = $1", id.as_uuid()).await? {
            0 => Err(StorageError::NotFound("Post", id.to_string())),
            _ => Ok(()),
        }
    }

    async fn insert_comment(&mut self, comment: &Comment) -> Result<(), StorageError> {
        sqlx::query(&format!(
            "INSERT INTO comments ({COMMENT_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7)"
        ))
        .bind(comment.id.as_uuid())
        .bind(comment.post_id.as_uuid())
        .bind(comment.user_id.as_uuid())
        .bind(comment.parent_id.map(|p| p.as_uuid()))
        .bind(&comment.content)
        .bind(to_column(comment.likes_count))
        .bind(comment.created_at)
        .execute(self.conn()?)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn list_post_comment_ids(
        &mut self,
        post: PostId,
    ) -> Result<Vec<CommentId>, StorageError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM comments WHERE post_id = $1")
            .bind(post.as_uuid())
            .fetch_all(self.conn()?)
            .await
            .map_err(db_err)?;
        Ok(ids.into_iter().map(CommentId).collect())
    }

    async fn detach_replies(&mut self, parent: CommentId) -> Result<u64, StorageError> {
        self.execute(
            "UPDATE comments SET parent_id = NULL WHERE parent_id = $1",
            parent.as_uuid(),
        )
        .await
    }

    async fn delete_comment(&mut self, id: CommentId) -> Result<(), StorageError> {
        match self.execute("DELETE FROM comments WHERE id = $1", id.as_uuid()).await? {
            0 => Err(StorageError::NotFound("Comment", id.to_string())),
            _ => Ok(()),
        }
    }

    async fn count_comments(&mut self, post: PostId) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE post_id = $1")
            .bind(post.as_uuid())
            .fetch_one(self.conn()?)
            .await
            .map_err(db_err)?;
        Ok(to_count(count))
    }

    async fn lock_counter_owner(&mut self, counter: CounterRef) -> Result<(), StorageError> {
        let (sql, entity, id) = match counter {
            CounterRef::PostLikes(id) | CounterRef::PostComments(id) => (
                "SELECT 1 FROM posts WHERE id = $1 FOR NO KEY UPDATE",
                "Post",
                id.as_uuid(),
            ),
            CounterRef::CommentLikes(id) => (
                "SELECT 1 FROM comments WHERE id = $1 FOR NO KEY UPDATE",
                "Comment",
                id.as_uuid(),
            ),
        };
        let locked: Option<i32> = sqlx::query_scalar(sql)
            .bind(id)
            .fetch_optional(self.conn()?)
            .await
            .map_err(db_err)?;
        match locked {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound(entity, id.to_string())),
        }
    }

    async fn store_counter(&mut self, counter: CounterRef, value: u64) -> Result<(), StorageError> {
        let (sql, entity, id) = match counter {
            CounterRef::PostLikes(id) => {
                ("UPDATE posts SET likes_count = $2 WHERE id = $1", "Post", id.as_uuid())
            }
            CounterRef::PostComments(id) => {
                ("UPDATE posts SET comments_count = $2 WHERE id = $1", "Post", id.as_uuid())
            }
            CounterRef::CommentLikes(id) => {
                ("UPDATE comments SET likes_count = $2 WHERE id = $1", "Comment", id.as_uuid())
            }
        };
        let done = sqlx::query(sql)
            .bind(id)
            .bind(to_column(value))
            .execute(self.conn()?)
            .await
            .map_err(db_err)?;
        match done.rows_affected() {
            0 => Err(StorageError::NotFound(entity, id.to_string())),
            _ => Ok(()),
        }
    }

    async fn commit(&mut self) -> Result<(), StorageError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StorageError::Database("transaction already committed".into()))?;
        tx.commit().await.map_err(db_err)?;
        debug!("postgres transaction committed");
        Ok(())
    }
}

// ── Row mapping ─────────────────────────────────────────────────────────────

fn post_from_row(row: &PgRow) -> Post {
    Post {
        id: PostId(row.get("id")),
        board_id: BoardId(row.get("board_id")),
        author_id: UserId(row.get("author_id")),
        title: row.get("title"),
        content: row.get("content"),
        likes_count: to_count(row.get("likes_count")),
        comments_count: to_count(row.get("comments_count")),
        is_pinned: row.get("is_pinned"),
        is_featured: row.get("is_featured"),
        created_at: row.get("created_at"),
    }
}

fn comment_from_row(row: &PgRow) -> Comment {
    Comment {
        id: CommentId(row.get("id")),
        post_id: PostId(row.get("post_id")),
        user_id: UserId(row.get("user_id")),
        parent_id: row.get::<Option<Uuid>, _>("parent_id").map(CommentId),
        content: row.get("content"),
        likes_count: to_count(row.get("likes_count")),
        created_at: row.get("created_at"),
    }
}

fn reaction_from_row(row: &PgRow) -> Result<Reaction, StorageError> {
    let kind = match row.get::<String, _>("target_type").as_str() {
        "post" => TargetKind::Post,
        "comment" => TargetKind::Comment,
        other => {
            return Err(StorageError::Database(format!(
                "unknown like target type {other:?}"
            )))
        }
    };
    Ok(Reaction {
        id: ReactionId(row.get("id")),
        user_id: UserId(row.get("user_id")),
        target: TargetRef::from_parts(kind, row.get("target_id")),
        created_at: row.get("created_at"),
    })
}

fn favorite_from_row(row: &PgRow) -> Favorite {
    Favorite {
        id: FavoriteId(row.get("id")),
        user_id: UserId(row.get("user_id")),
        post_id: PostId(row.get("post_id")),
        created_at: row.get("created_at"),
    }
}

fn to_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn to_column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn db_err(err: sqlx::Error) -> StorageError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return StorageError::UniqueViolation(db.constraint().unwrap_or("unique").to_string());
        }
        if db.is_foreign_key_violation() {
            return StorageError::NotFound(
                "Referenced row",
                db.constraint().unwrap_or("foreign key").to_string(),
            );
        }
    }
    StorageError::Database(err.to_string())
}

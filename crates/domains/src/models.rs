//! # Domain Models
//!
//! These structs represent the entities of the forum engagement core.
//! Identifiers are UUID newtypes so a post id can never be passed where a
//! comment id is expected.

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Allocates a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }
    };
}

id_type!(BoardId);
id_type!(PostId);
id_type!(CommentId);
id_type!(UserId);
id_type!(GroupId);
id_type!(ReactionId);
id_type!(FavoriteId);

// ── Boards & access ─────────────────────────────────────────────────────────

/// Who may see a board's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessPolicy {
    Public,
    Registered,
    Groups,
    Users,
    /// A stored value this build does not recognise. Always denied.
    #[serde(other)]
    Unknown,
}

impl AccessPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Registered => "registered",
            Self::Groups => "groups",
            Self::Users => "users",
            Self::Unknown => "unknown",
        }
    }

    /// Parses a stored policy column. Unrecognised values map to `Unknown`
    /// so that evaluation fails closed instead of erroring.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "public" => Self::Public,
            "registered" => Self::Registered,
            "groups" => Self::Groups,
            "users" => Self::Users,
            _ => Self::Unknown,
        }
    }
}

/// A forum board and its visibility rules.
///
/// `allowed_groups` only matters under [`AccessPolicy::Groups`] and
/// `allowed_users` only under [`AccessPolicy::Users`]; an empty set admits
/// nobody from that category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    pub id: BoardId,
    pub name: String,
    pub access_policy: AccessPolicy,
    pub allowed_groups: HashSet<GroupId>,
    pub allowed_users: HashSet<UserId>,
    /// Lower values sort first.
    pub order: i32,
}

// ── Principals ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Member,
    Moderator,
    Admin,
}

/// Caller identity as handed over by the authentication layer, before any
/// group lookup has happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestIdentity {
    Anonymous,
    User {
        id: UserId,
        role: Role,
        is_superuser: bool,
    },
}

/// An authenticated user with the memberships fetched for this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: UserId,
    pub role: Role,
    pub is_superuser: bool,
    /// `None` when membership could not be resolved for this principal.
    pub groups: Option<HashSet<GroupId>>,
}

/// The acting identity of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Anonymous,
    User(AuthenticatedUser),
}

impl Principal {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User(_))
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::Anonymous => None,
            Self::User(user) => Some(user.id),
        }
    }

    pub fn is_admin(&self) -> bool {
        match self {
            Self::Anonymous => false,
            Self::User(user) => user.is_superuser || user.role == Role::Admin,
        }
    }

    /// Identity segment used when deriving cache keys.
    pub fn cache_identity(&self) -> String {
        match self {
            Self::Anonymous => "anonymous".to_string(),
            Self::User(user) => user.id.to_string(),
        }
    }
}

// ── Posts & comments ────────────────────────────────────────────────────────

/// A post. `likes_count` and `comments_count` are denormalized counters
/// owned by the counter synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub board_id: BoardId,
    pub author_id: UserId,
    pub title: String,
    pub content: String,
    pub likes_count: u64,
    pub comments_count: u64,
    pub is_pinned: bool,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub user_id: UserId,
    /// Weak reference to a comment of the same post.
    pub parent_id: Option<CommentId>,
    pub content: String,
    pub likes_count: u64,
    pub created_at: DateTime<Utc>,
}

/// A rendered comment with its replies, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of comments in this subtree, the node included.
    pub fn size(&self) -> usize {
        1 + self.replies.iter().map(CommentNode::size).sum::<usize>()
    }
}

// ── Reactions ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Post,
    Comment,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }
}

/// What a reaction points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum TargetRef {
    Post(PostId),
    Comment(CommentId),
}

impl TargetRef {
    pub fn kind(&self) -> TargetKind {
        match self {
            Self::Post(_) => TargetKind::Post,
            Self::Comment(_) => TargetKind::Comment,
        }
    }

    /// Raw id as stored in the `target_id` column.
    pub fn raw_id(&self) -> Uuid {
        match self {
            Self::Post(id) => id.0,
            Self::Comment(id) => id.0,
        }
    }

    pub fn from_parts(kind: TargetKind, id: Uuid) -> Self {
        match kind {
            TargetKind::Post => Self::Post(PostId(id)),
            TargetKind::Comment => Self::Comment(CommentId(id)),
        }
    }

    /// The like counter kept on the target row.
    pub fn likes_counter(&self) -> CounterRef {
        match *self {
            Self::Post(id) => CounterRef::PostLikes(id),
            Self::Comment(id) => CounterRef::CommentLikes(id),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.raw_id())
    }
}

/// A like. At most one per `(user_id, target)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reaction {
    pub id: ReactionId,
    pub user_id: UserId,
    pub target: TargetRef,
    pub created_at: DateTime<Utc>,
}

/// A bookmarked post. At most one per `(user_id, post_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Favorite {
    pub id: FavoriteId,
    pub user_id: UserId,
    pub post_id: PostId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleState {
    Liked,
    Unliked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteState {
    Favorited,
    Unfavorited,
}

// ── Counters ────────────────────────────────────────────────────────────────

/// A denormalized counter and the row that carries it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CounterRef {
    PostLikes(PostId),
    CommentLikes(CommentId),
    PostComments(PostId),
}

impl fmt::Display for CounterRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PostLikes(id) => write!(f, "post {id} likes"),
            Self::CommentLikes(id) => write!(f, "comment {id} likes"),
            Self::PostComments(id) => write!(f, "post {id} comments"),
        }
    }
}

// ── Cache ───────────────────────────────────────────────────────────────────

/// Logical view families of the response cache. Each has its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    HomePosts,
    BoardPosts,
    PostDetail,
    UserProfile,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 4] = [
        Self::HomePosts,
        Self::BoardPosts,
        Self::PostDetail,
        Self::UserProfile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HomePosts => "home_posts",
            Self::BoardPosts => "board_posts",
            Self::PostDetail => "post_detail",
            Self::UserProfile => "user_profile",
        }
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

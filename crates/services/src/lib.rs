//! forum-board/crates/services/src/lib.rs
//!
//! Content-access and engagement-consistency layer: board visibility,
//! reaction toggles, denormalized counters, the comment tree and the
//! response cache.

pub mod access;
pub mod cache;
pub mod comments;
pub mod counters;
pub mod engagement;
pub mod metrics;
pub mod posts;
pub mod reactions;

pub use access::{can_access, can_moderate, BoardAccess, PrincipalResolver};
pub use cache::{CacheKey, CacheRequest, CacheScope, CacheTtls, InvalidationSummary, ResponseCache};
pub use comments::{build_forest, CommentTree, MAX_RENDER_DEPTH};
pub use counters::{CounterSynchronizer, RepairReport};
pub use engagement::ForumCore;
pub use metrics::CoreMetrics;
pub use posts::PostLifecycle;
pub use reactions::ReactionStore;

//! forum-board/crates/storage-adapters/src/lib.rs
//!
//! Implementations of the `domains` ports: forum stores and response cache
//! backends. Heavy backends sit behind cargo features so a deployment only
//! compiles what it runs.

pub mod cache;
pub mod memory;
#[cfg(feature = "db-postgres")]
pub mod postgres;

pub use cache::MemoryCache;
#[cfg(feature = "redis")]
pub use cache::RedisCache;
pub use memory::InMemoryForumStore;
#[cfg(feature = "db-postgres")]
pub use postgres::PgForumStore;

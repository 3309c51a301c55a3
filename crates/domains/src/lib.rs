//! forum-board/crates/domains/src/lib.rs
//!
//! Domain models, error taxonomy and port traits of the forum engagement core.
//! Nothing in this crate performs I/O.

pub mod errors;
pub mod models;
pub mod ports;

// Re-exporting for easier access in other crates
pub use errors::*;
pub use models::*;
pub use ports::*;

//! Local build-store handling for Stevedore.
//!
//! The build engine owns the content of its image store; this crate only
//! decides where that store lives (`StoreLayout`, with the same rootless-aware
//! defaults the engine uses) and holds it open for the lifetime of a backend
//! (`BuildStore`), releasing it exactly once on `close`.

pub mod handle;
pub mod layout;

pub use handle::BuildStore;
pub use layout::{current_uid, is_rootless, StoreEnv, StoreLayout};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("lock acquisition failed: {0}")]
    LockFailed(String),
    #[error("build store has been closed")]
    Closed,
    #[error("cannot determine store location: {0}")]
    Location(String),
}

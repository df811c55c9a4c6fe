//! Builder facade for Stevedore.
//!
//! This crate ties the artifact manifest, the build backends and the metadata
//! normalizer together into the `Builder`, the API an orchestrator calls to build
//! (and optionally push) one artifact, list supported platforms, and fetch the
//! canonical config of an image. It also provides Dockerfile path resolution,
//! dependency listing over a pluggable walker, and build state tracking.

pub mod builder;
pub mod concurrency;
pub mod deps;
pub mod dockerfile;
pub mod lifecycle;

pub use builder::{Builder, BuilderConfig};
pub use concurrency::install_signal_handler;
pub use deps::{dependencies, DependencyWalker, WalkedSources};
pub use dockerfile::resolve_dockerfile;
pub use lifecycle::{validate_transition, BuildState};

use stevedore_runtime::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Runtime(#[from] RuntimeError),
    #[error("manifest error: {0}")]
    Manifest(#[from] stevedore_schema::ManifestError),
    #[error("listing dependencies: {0}")]
    Dependencies(String),
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Failure category, independent of which layer raised the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Config,
    NotFound,
    Build,
    Push,
    Inspect,
    Conversion,
    Cancelled,
    Other,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Config(_) | CoreError::Manifest(_) => ErrorKind::Config,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Runtime(e) => match e {
                RuntimeError::Config(_) | RuntimeError::BackendUnavailable(_) => ErrorKind::Config,
                RuntimeError::NotFound(_) => ErrorKind::NotFound,
                RuntimeError::Build { .. } => ErrorKind::Build,
                RuntimeError::Push { .. } => ErrorKind::Push,
                RuntimeError::Inspect { .. } => ErrorKind::Inspect,
                RuntimeError::Conversion { .. } => ErrorKind::Conversion,
                RuntimeError::Cancelled(_) => ErrorKind::Cancelled,
                RuntimeError::Io(_) | RuntimeError::Store(_) | RuntimeError::StoreClosed => {
                    ErrorKind::Other
                }
            },
            CoreError::Dependencies(_)
            | CoreError::InvalidTransition { .. }
            | CoreError::Io(_)
            | CoreError::Signal(_) => ErrorKind::Other,
        }
    }
}

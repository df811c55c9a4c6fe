//! Build backends for Stevedore.
//!
//! This crate implements the build-backend layer: the pluggable `BuildBackend`
//! trait, the `buildah` CLI backend operating on a `BuildStore`, an in-memory
//! `MockBackend` for tests and dry runs, pure compression/format resolution,
//! explicit engine configuration (`EngineConfig`), cooperative cancellation
//! (`CancelToken`), and prerequisite checking.

pub mod backend;
pub mod buildah;
pub mod cancel;
pub mod config;
pub mod mock;
pub mod options;
pub mod prereq;

mod process;

pub use backend::{select_backend, BuildBackend, BuildResult};
pub use buildah::BuildahBackend;
pub use cancel::CancelToken;
pub use config::EngineConfig;
pub use mock::{MockBackend, MockCall, MockOp};
pub use options::{
    effective_dockerfile, resolve_compression, resolve_format, BuildOptions, Compression,
    Isolation, ManifestType,
};
pub use prereq::{check_buildah_prereqs, format_missing, MissingPrereq};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(#[from] stevedore_store::StoreError),
    #[error("backend '{0}' is not available on this system")]
    BackendUnavailable(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("building image {image} in workspace {workspace}: {reason}")]
    Build {
        image: String,
        workspace: String,
        reason: String,
    },
    #[error("pushing image {image}: {reason}")]
    Push { image: String, reason: String },
    #[error("inspecting image {image}: {reason}")]
    Inspect { image: String, reason: String },
    #[error("converting image config of {image}: {source}")]
    Conversion {
        image: String,
        #[source]
        source: stevedore_schema::ConversionError,
    },
    #[error("{0} cancelled")]
    Cancelled(String),
    #[error("build store has been closed")]
    StoreClosed,
}

impl RuntimeError {
    /// Map store errors so that use-after-close surfaces as `StoreClosed`.
    pub(crate) fn from_store(e: stevedore_store::StoreError) -> Self {
        match e {
            stevedore_store::StoreError::Closed => Self::StoreClosed,
            other => Self::Store(other),
        }
    }
}

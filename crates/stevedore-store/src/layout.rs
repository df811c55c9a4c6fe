use crate::StoreError;
use std::fs;
use std::path::{Path, PathBuf};

const ROOTFUL_GRAPH_ROOT: &str = "/var/lib/containers/storage";
const ROOTFUL_RUN_ROOT: &str = "/run/containers/storage";
const LOCK_FILE: &str = "stevedore.lock";

/// Process environment consulted when picking default store locations.
#[derive(Debug, Clone, Default)]
pub struct StoreEnv {
    pub home: Option<PathBuf>,
    pub xdg_data_home: Option<PathBuf>,
    pub xdg_runtime_dir: Option<PathBuf>,
}

impl StoreEnv {
    pub fn from_process() -> Self {
        let var = |name: &str| {
            std::env::var_os(name)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        Self {
            home: var("HOME"),
            xdg_data_home: var("XDG_DATA_HOME"),
            xdg_runtime_dir: var("XDG_RUNTIME_DIR"),
        }
    }
}

/// Directory layout of the engine's local image store.
///
/// `graph_root` holds images and layers; `run_root` holds transient state
/// (locks, mounts). Both are passed to the engine so it operates on exactly
/// the store this handle describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreLayout {
    graph_root: PathBuf,
    run_root: PathBuf,
}

impl StoreLayout {
    pub fn new(graph_root: impl Into<PathBuf>, run_root: impl Into<PathBuf>) -> Self {
        Self {
            graph_root: graph_root.into(),
            run_root: run_root.into(),
        }
    }

    /// Default store options, matching the engine's own defaults.
    ///
    /// Privileged processes use the system-wide store. Rootless processes use
    /// `$XDG_DATA_HOME/containers/storage` (falling back to
    /// `~/.local/share/containers/storage`) and a per-user run root.
    pub fn default_for(rootless: bool, uid: u32, env: &StoreEnv) -> Result<Self, StoreError> {
        if !rootless {
            return Ok(Self::new(ROOTFUL_GRAPH_ROOT, ROOTFUL_RUN_ROOT));
        }

        let data_home = match (&env.xdg_data_home, &env.home) {
            (Some(xdg), _) => xdg.clone(),
            (None, Some(home)) => home.join(".local/share"),
            (None, None) => {
                return Err(StoreError::Location(
                    "neither XDG_DATA_HOME nor HOME is set".to_owned(),
                ))
            }
        };
        let graph_root = data_home.join("containers").join("storage");

        let run_root = match &env.xdg_runtime_dir {
            Some(dir) => dir.join("containers"),
            None => std::env::temp_dir()
                .join(format!("containers-user-{uid}"))
                .join("containers"),
        };

        Ok(Self {
            graph_root,
            run_root,
        })
    }

    /// Defaults for the current process.
    pub fn detect() -> Result<Self, StoreError> {
        Self::default_for(is_rootless(), current_uid(), &StoreEnv::from_process())
    }

    #[inline]
    pub fn graph_root(&self) -> &Path {
        &self.graph_root
    }

    #[inline]
    pub fn run_root(&self) -> &Path {
        &self.run_root
    }

    #[inline]
    pub fn lock_file(&self) -> PathBuf {
        self.run_root.join(LOCK_FILE)
    }

    pub fn initialize(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.graph_root)?;
        fs::create_dir_all(&self.run_root)?;
        Ok(())
    }
}

/// Safe wrapper around libc::geteuid().
#[allow(unsafe_code)]
pub fn current_uid() -> u32 {
    // SAFETY: geteuid() is always safe to call and has no failure mode.
    unsafe { libc::geteuid() }
}

pub fn is_rootless() -> bool {
    current_uid() != 0
}

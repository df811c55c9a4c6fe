//! Build options handed to a backend, and the pure name → constant
//! resolution for compression algorithms and output formats.

use crate::RuntimeError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use stevedore_schema::Platform;

pub const OCI_V1_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const DOCKER_V2_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json";

pub const DEFAULT_DOCKERFILE: &str = "Dockerfile";

/// Layer compression applied by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    Uncompressed,
    Bzip2,
    Gzip,
    Xz,
    Zstd,
}

impl Compression {
    pub fn as_str(self) -> &'static str {
        match self {
            Compression::Uncompressed => "uncompressed",
            Compression::Bzip2 => "bzip2",
            Compression::Gzip => "gzip",
            Compression::Xz => "xz",
            Compression::Zstd => "zstd",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve a compression name. The empty string selects gzip.
pub fn resolve_compression(name: &str) -> Result<Compression, RuntimeError> {
    match name {
        "" | "gzip" => Ok(Compression::Gzip),
        "zstd" => Ok(Compression::Zstd),
        "xz" => Ok(Compression::Xz),
        "bzip2" => Ok(Compression::Bzip2),
        "uncompressed" => Ok(Compression::Uncompressed),
        other => Err(RuntimeError::Config(format!(
            "unknown compression algorithm: \"{other}\""
        ))),
    }
}

/// Manifest type the engine writes for the built image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManifestType {
    OciV1,
    DockerV2,
}

impl ManifestType {
    pub fn media_type(self) -> &'static str {
        match self {
            ManifestType::OciV1 => OCI_V1_MANIFEST,
            ManifestType::DockerV2 => DOCKER_V2_MANIFEST,
        }
    }

    /// The engine's short name for the format (`--format` value).
    pub fn format_name(self) -> &'static str {
        match self {
            ManifestType::OciV1 => "oci",
            ManifestType::DockerV2 => "docker",
        }
    }
}

/// Resolve an output format name. The empty string selects OCI.
pub fn resolve_format(name: &str) -> Result<ManifestType, RuntimeError> {
    match name {
        "" | "oci" => Ok(ManifestType::OciV1),
        "docker" => Ok(ManifestType::DockerV2),
        other => Err(RuntimeError::Config(format!(
            "unrecognized image type \"{other}\""
        ))),
    }
}

/// How the engine isolates `RUN` instructions.
///
/// `Default` lets the engine pick; in unprivileged environments that avoids
/// device-node creation, which namespace isolation would require.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Isolation {
    #[default]
    Default,
    Oci,
    Rootless,
    Chroot,
}

impl Isolation {
    /// Value for `--isolation`, or `None` to leave the engine default.
    pub fn flag_value(self) -> Option<&'static str> {
        match self {
            Isolation::Default => None,
            Isolation::Oci => Some("oci"),
            Isolation::Rootless => Some("rootless"),
            Isolation::Chroot => Some("chroot"),
        }
    }
}

/// Everything a backend needs to build one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOptions {
    pub context_dir: PathBuf,
    /// Name the built image is stored under.
    pub output: String,
    pub additional_tags: Vec<String>,
    pub build_args: BTreeMap<String, Option<String>>,
    pub target: String,
    pub no_cache: bool,
    pub squash: bool,
    pub secrets: Vec<String>,
    pub add_host: Vec<String>,
    pub format: ManifestType,
    pub compression: Compression,
    pub platforms: Vec<Platform>,
    pub all_platforms: bool,
    pub jobs: Option<u32>,
    pub isolation: Isolation,
}

impl BuildOptions {
    pub fn new(context_dir: impl Into<PathBuf>, output: &str) -> Self {
        Self {
            context_dir: context_dir.into(),
            output: output.to_owned(),
            additional_tags: Vec::new(),
            build_args: BTreeMap::new(),
            target: String::new(),
            no_cache: false,
            squash: false,
            secrets: Vec::new(),
            add_host: Vec::new(),
            format: ManifestType::OciV1,
            compression: Compression::Gzip,
            platforms: Vec::new(),
            all_platforms: false,
            jobs: None,
            isolation: Isolation::Default,
        }
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` into the
/// preceding component. The filesystem is not consulted.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = matches!(
                    out.components().next_back(),
                    Some(Component::Normal(_))
                ) && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The Dockerfile a build uses: `dockerfile` joined onto `context_dir` when
/// given, `<context_dir>/Dockerfile` otherwise.
pub fn effective_dockerfile(context_dir: &Path, dockerfile: &str) -> PathBuf {
    let name = if dockerfile.trim().is_empty() {
        DEFAULT_DOCKERFILE
    } else {
        dockerfile
    };
    normalize_path(&context_dir.join(name))
}

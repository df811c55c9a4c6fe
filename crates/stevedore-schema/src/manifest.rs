use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse manifest: {0}")]
    ParseToml(#[from] toml::de::Error),
    #[error("manifest declares no artifacts")]
    NoArtifacts,
    #[error("artifact #{0}: image must not be empty")]
    EmptyImage(usize),
    #[error("artifact '{image}': build arg '{name}' is declared in both build_args and env_build_args")]
    DuplicateBuildArg { image: String, name: String },
    #[error("artifact '{image}': build arg name must not be empty")]
    EmptyBuildArg { image: String },
}

/// Top-level `stevedore.toml` document.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArtifactManifest {
    #[serde(default)]
    pub artifacts: Vec<ArtifactSection>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ArtifactSection {
    pub image: String,
    #[serde(default = "default_workspace")]
    pub workspace: String,
    #[serde(default)]
    pub buildah: BuildahSection,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct BuildahSection {
    #[serde(default)]
    pub dockerfile: String,
    #[serde(default)]
    pub build_args: BTreeMap<String, String>,
    /// Build args passed by name only; the engine reads their value from its environment.
    #[serde(default)]
    pub env_build_args: Vec<String>,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub no_cache: bool,
    #[serde(default)]
    pub squash: bool,
    #[serde(default)]
    pub secrets: Vec<String>,
    #[serde(default)]
    pub add_host: Vec<String>,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub compression: String,
}

fn default_workspace() -> String {
    ".".to_owned()
}

/// A fully resolved artifact, ready to hand to a builder.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactSpec {
    pub image_name: String,
    pub workspace: PathBuf,
    pub buildah: BuildahArtifact,
}

impl ArtifactSpec {
    pub fn new(workspace: impl Into<PathBuf>, image_name: &str) -> Self {
        Self {
            image_name: image_name.to_owned(),
            workspace: workspace.into(),
            buildah: BuildahArtifact::default(),
        }
    }
}

/// Buildah-specific artifact options. Empty strings mean "use the default"
/// (`Dockerfile`, OCI format, gzip compression).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BuildahArtifact {
    pub dockerfile_path: String,
    /// `None` values are passed by name so the engine takes them from its environment.
    pub build_args: BTreeMap<String, Option<String>>,
    pub target: String,
    pub no_cache: bool,
    pub squash: bool,
    pub secrets: Vec<String>,
    pub add_host: Vec<String>,
    pub format: String,
    pub compression: String,
}

impl ArtifactManifest {
    /// Resolve every artifact section. Relative workspaces are taken relative
    /// to `base_dir` (normally the directory holding the manifest).
    pub fn artifacts(&self, base_dir: &Path) -> Result<Vec<ArtifactSpec>, ManifestError> {
        if self.artifacts.is_empty() {
            return Err(ManifestError::NoArtifacts);
        }
        self.artifacts
            .iter()
            .enumerate()
            .map(|(i, section)| section.resolve(i, base_dir))
            .collect()
    }
}

impl ArtifactSection {
    fn resolve(&self, index: usize, base_dir: &Path) -> Result<ArtifactSpec, ManifestError> {
        let image_name = self.image.trim().to_owned();
        if image_name.is_empty() {
            return Err(ManifestError::EmptyImage(index));
        }

        let mut build_args: BTreeMap<String, Option<String>> = BTreeMap::new();
        for (name, value) in &self.buildah.build_args {
            let name = name.trim();
            if name.is_empty() {
                return Err(ManifestError::EmptyBuildArg { image: image_name });
            }
            build_args.insert(name.to_owned(), Some(value.clone()));
        }
        for name in &self.buildah.env_build_args {
            let name = name.trim();
            if name.is_empty() {
                return Err(ManifestError::EmptyBuildArg { image: image_name });
            }
            if build_args.insert(name.to_owned(), None).is_some() {
                return Err(ManifestError::DuplicateBuildArg {
                    image: image_name,
                    name: name.to_owned(),
                });
            }
        }

        let workspace = Path::new(self.workspace.trim());
        let workspace = if workspace.is_absolute() {
            workspace.to_path_buf()
        } else {
            base_dir.join(workspace)
        };

        let b = &self.buildah;
        Ok(ArtifactSpec {
            image_name,
            workspace,
            buildah: BuildahArtifact {
                dockerfile_path: b.dockerfile.trim().to_owned(),
                build_args,
                target: b.target.trim().to_owned(),
                no_cache: b.no_cache,
                squash: b.squash,
                secrets: b.secrets.clone(),
                add_host: b.add_host.clone(),
                format: b.format.trim().to_lowercase(),
                compression: b.compression.trim().to_lowercase(),
            },
        })
    }
}

pub fn parse_manifest_str(input: &str) -> Result<ArtifactManifest, ManifestError> {
    Ok(toml::from_str(input)?)
}

pub fn parse_manifest_file(path: impl AsRef<Path>) -> Result<ArtifactManifest, ManifestError> {
    let content = fs::read_to_string(path)?;
    parse_manifest_str(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_manifest() {
        let input = r#"
[[artifacts]]
image = "registry.example.com/app"
workspace = "services/app"

[artifacts.buildah]
dockerfile = "Containerfile"
target = "runtime"
no_cache = true
squash = true
secrets = ["id=token,src=token.txt"]
add_host = ["db:10.0.0.2"]
format = "Docker"
compression = "zstd"
build_args = { VERSION = "1.2" }
env_build_args = ["HTTP_PROXY"]

[[artifacts]]
image = "registry.example.com/worker"
"#;
        let manifest = parse_manifest_str(input).expect("should parse");
        let specs = manifest.artifacts(Path::new("/repo")).unwrap();
        assert_eq!(specs.len(), 2);

        let app = &specs[0];
        assert_eq!(app.image_name, "registry.example.com/app");
        assert_eq!(app.workspace, PathBuf::from("/repo/services/app"));
        assert_eq!(app.buildah.dockerfile_path, "Containerfile");
        assert_eq!(app.buildah.target, "runtime");
        assert!(app.buildah.no_cache);
        assert!(app.buildah.squash);
        assert_eq!(app.buildah.format, "docker");
        assert_eq!(app.buildah.compression, "zstd");
        assert_eq!(app.buildah.build_args["VERSION"], Some("1.2".to_owned()));
        assert_eq!(app.buildah.build_args["HTTP_PROXY"], None);

        let worker = &specs[1];
        assert_eq!(worker.workspace, PathBuf::from("/repo/."));
        assert_eq!(worker.buildah, BuildahArtifact::default());
    }

    #[test]
    fn absolute_workspace_is_kept() {
        let manifest = parse_manifest_str(
            r#"
[[artifacts]]
image = "app"
workspace = "/ws"
"#,
        )
        .unwrap();
        let specs = manifest.artifacts(Path::new("/elsewhere")).unwrap();
        assert_eq!(specs[0].workspace, PathBuf::from("/ws"));
    }

    #[test]
    fn rejects_unknown_fields() {
        let input = r#"
[[artifacts]]
image = "app"
[artifacts.buildah]
isolation = "chroot"
"#;
        assert!(parse_manifest_str(input).is_err());
    }

    #[test]
    fn rejects_empty_manifest_and_image() {
        let manifest = parse_manifest_str("").unwrap();
        assert!(matches!(
            manifest.artifacts(Path::new(".")),
            Err(ManifestError::NoArtifacts)
        ));

        let manifest = parse_manifest_str("[[artifacts]]\nimage = \"  \"\n").unwrap();
        assert!(matches!(
            manifest.artifacts(Path::new(".")),
            Err(ManifestError::EmptyImage(0))
        ));
    }

    #[test]
    fn rejects_duplicate_build_arg() {
        let manifest = parse_manifest_str(
            r#"
[[artifacts]]
image = "app"
[artifacts.buildah]
build_args = { PROXY = "x" }
env_build_args = ["PROXY"]
"#,
        )
        .unwrap();
        let err = manifest.artifacts(Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("PROXY"));
    }

    #[test]
    fn parse_manifest_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stevedore.toml");
        fs::write(&path, "[[artifacts]]\nimage = \"app:latest\"\n").unwrap();
        let manifest = parse_manifest_file(&path).unwrap();
        assert_eq!(manifest.artifacts[0].image, "app:latest");
        assert_eq!(manifest.artifacts[0].workspace, ".");
    }
}

use crate::CoreError;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use stevedore_runtime::options::normalize_path;
use stevedore_schema::ArtifactSpec;

/// Source files a Dockerfile's copy instructions pull in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkedSources {
    /// Workspace-relative files referenced by `COPY`/`ADD`.
    pub files: Vec<PathBuf>,
    /// Patterns from the workspace's `.dockerignore`.
    pub excludes: Vec<String>,
}

/// Reads a Dockerfile and walks the workspace for the files it copies.
pub trait DependencyWalker {
    fn walk(
        &self,
        workspace: &Path,
        dockerfile: &Path,
        build_args: &BTreeMap<String, String>,
    ) -> Result<WalkedSources, CoreError>;
}

/// Workspace-relative dependencies of an artifact, sorted and deduplicated.
///
/// The Dockerfile is always listed, even when `.dockerignore` excludes it;
/// `.dockerignore` itself never is.
pub fn dependencies(
    spec: &ArtifactSpec,
    walker: &dyn DependencyWalker,
) -> Result<Vec<PathBuf>, CoreError> {
    let workspace = &spec.workspace;
    let dockerfile_name = if spec.buildah.dockerfile_path.is_empty() {
        "Dockerfile"
    } else {
        spec.buildah.dockerfile_path.as_str()
    };
    let dockerfile = normalize_path(Path::new(dockerfile_name));

    // Name-only args have no value to substitute; they expand to empty.
    let build_args: BTreeMap<String, String> = spec
        .buildah
        .build_args
        .iter()
        .map(|(k, v)| (k.clone(), v.clone().unwrap_or_default()))
        .collect();

    let walked = walker.walk(workspace, &workspace.join(&dockerfile), &build_args)?;

    let mut files: BTreeSet<PathBuf> = walked
        .files
        .iter()
        .map(|f| normalize_path(f.strip_prefix(workspace).unwrap_or(f)))
        .filter(|f| !walked.excludes.iter().any(|p| excluded_by(f, p)))
        .collect();
    files.insert(
        dockerfile
            .strip_prefix(workspace)
            .map(Path::to_path_buf)
            .unwrap_or(dockerfile),
    );
    files.remove(Path::new(".dockerignore"));

    Ok(files.into_iter().collect())
}

/// Match a workspace-relative path against one `.dockerignore` pattern.
///
/// Supports plain paths (which also exclude everything below them) and
/// `*.ext` suffix patterns. Negations are not applied.
fn excluded_by(path: &Path, pattern: &str) -> bool {
    let pattern = pattern.trim();
    if pattern.is_empty() || pattern.starts_with('#') || pattern.starts_with('!') {
        return false;
    }
    if let Some(suffix) = pattern.strip_prefix('*') {
        if !suffix.contains(['*', '/']) {
            return path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().ends_with(suffix));
        }
        return false;
    }
    let pattern = normalize_path(Path::new(pattern.trim_end_matches('/')));
    path.starts_with(&pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct FixedWalker {
        files: Vec<&'static str>,
        seen: RefCell<Option<(PathBuf, BTreeMap<String, String>)>>,
    }

    impl FixedWalker {
        fn new(files: Vec<&'static str>) -> Self {
            Self {
                files,
                seen: RefCell::new(None),
            }
        }
    }

    impl DependencyWalker for FixedWalker {
        fn walk(
            &self,
            _workspace: &Path,
            dockerfile: &Path,
            build_args: &BTreeMap<String, String>,
        ) -> Result<WalkedSources, CoreError> {
            *self.seen.borrow_mut() = Some((dockerfile.to_path_buf(), build_args.clone()));
            Ok(WalkedSources {
                files: self.files.iter().map(PathBuf::from).collect(),
                excludes: vec!["*.log".to_owned()],
            })
        }
    }

    struct FailingWalker;

    impl DependencyWalker for FailingWalker {
        fn walk(
            &self,
            _: &Path,
            _: &Path,
            _: &BTreeMap<String, String>,
        ) -> Result<WalkedSources, CoreError> {
            Err(CoreError::Dependencies("unterminated COPY".to_owned()))
        }
    }

    #[test]
    fn includes_dockerfile_and_drops_dockerignore() {
        let spec = ArtifactSpec::new("/ws", "app");
        let walker = FixedWalker::new(vec![
            "src/main.rs",
            ".dockerignore",
            "./src/main.rs",
            "Cargo.toml",
            "debug.log",
        ]);
        let deps = dependencies(&spec, &walker).unwrap();
        assert_eq!(
            deps,
            vec![
                PathBuf::from("Cargo.toml"),
                PathBuf::from("Dockerfile"),
                PathBuf::from("src/main.rs"),
            ]
        );
    }

    #[test]
    fn passes_resolved_dockerfile_and_args() {
        let mut spec = ArtifactSpec::new("/ws", "app");
        spec.buildah.dockerfile_path = "./docker/Containerfile".to_owned();
        spec.buildah.build_args.insert("VERSION".to_owned(), Some("1".to_owned()));
        spec.buildah.build_args.insert("PROXY".to_owned(), None);
        let walker = FixedWalker::new(vec!["/ws/assets/logo.png"]);

        let deps = dependencies(&spec, &walker).unwrap();
        assert_eq!(
            deps,
            vec![
                PathBuf::from("assets/logo.png"),
                PathBuf::from("docker/Containerfile"),
            ]
        );

        let (dockerfile, args) = walker.seen.borrow().clone().unwrap();
        assert_eq!(dockerfile, PathBuf::from("/ws/docker/Containerfile"));
        assert_eq!(args["VERSION"], "1");
        assert_eq!(args["PROXY"], "");
    }

    #[test]
    fn exclude_patterns() {
        assert!(excluded_by(Path::new("target/debug/app"), "target/"));
        assert!(excluded_by(Path::new("logs/a.log"), "*.log"));
        assert!(excluded_by(Path::new("secret.env"), "./secret.env"));
        assert!(!excluded_by(Path::new("targets/x"), "target"));
        assert!(!excluded_by(Path::new("keep.log"), "!keep.log"));
        assert!(!excluded_by(Path::new("a/b.txt"), "# comment"));
    }

    #[test]
    fn walker_errors_propagate() {
        let spec = ArtifactSpec::new("/ws", "app");
        assert!(matches!(
            dependencies(&spec, &FailingWalker),
            Err(CoreError::Dependencies(_))
        ));
    }
}

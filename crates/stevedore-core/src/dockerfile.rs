use crate::CoreError;
use std::path::{Path, PathBuf};
use stevedore_runtime::effective_dockerfile;

/// Resolve the Dockerfile for an artifact and make sure it exists.
///
/// An empty `dockerfile` means `Dockerfile` in the workspace. Relative paths
/// are joined onto the workspace; the result is lexically normalized.
pub fn resolve_dockerfile(workspace: &Path, dockerfile: &str) -> Result<PathBuf, CoreError> {
    let path = effective_dockerfile(workspace, dockerfile);
    if !path.is_file() {
        return Err(CoreError::NotFound(format!(
            "Dockerfile {} does not exist",
            path.display()
        )));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn empty_path_defaults_to_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM scratch\n").unwrap();
        let path = resolve_dockerfile(dir.path(), "").unwrap();
        assert_eq!(path, dir.path().join("Dockerfile"));
    }

    #[test]
    fn explicit_path_is_joined_and_normalized() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("build")).unwrap();
        fs::write(dir.path().join("build/Containerfile"), "FROM scratch\n").unwrap();
        let path = resolve_dockerfile(dir.path(), "./build/../build/Containerfile").unwrap();
        assert_eq!(path, dir.path().join("build/Containerfile"));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_dockerfile(dir.path(), "Containerfile").unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert!(err.to_string().contains("Containerfile"));
    }

    #[test]
    fn directory_is_not_a_dockerfile() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("Dockerfile")).unwrap();
        assert!(matches!(
            resolve_dockerfile(dir.path(), ""),
            Err(CoreError::NotFound(_))
        ));
    }
}

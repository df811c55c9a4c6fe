use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Barrier};
use std::thread;
use stevedore_core::{Builder, BuilderConfig, ErrorKind};
use stevedore_runtime::{select_backend, CancelToken, EngineConfig, MockBackend, MockCall};
use stevedore_schema::{parse_manifest_file, PlatformSet};

fn write_project(dir: &Path, manifest: &str) -> PathBuf {
    for sub in ["app", "worker"] {
        fs::create_dir_all(dir.join(sub)).unwrap();
        fs::write(dir.join(sub).join("Dockerfile"), "FROM scratch\nCOPY . /\n").unwrap();
    }
    fs::write(dir.join("worker/Containerfile"), "FROM scratch\n").unwrap();
    let path = dir.join("stevedore.toml");
    fs::write(&path, manifest).unwrap();
    path
}

const TWO_ARTIFACTS: &str = r#"
[[artifacts]]
image = "registry.example.com/app:latest"
workspace = "app"

[artifacts.buildah]
format = "docker"
build_args = { VERSION = "1.0" }

[[artifacts]]
image = "registry.example.com/worker:latest"
workspace = "worker"

[artifacts.buildah]
dockerfile = "Containerfile"
compression = "zstd"
env_build_args = ["HTTP_PROXY"]
"#;

#[test]
fn manifest_artifacts_build_in_order() {
    let project = tempfile::tempdir().unwrap();
    let manifest_path = write_project(project.path(), TWO_ARTIFACTS);
    let specs = parse_manifest_file(&manifest_path)
        .unwrap()
        .artifacts(project.path())
        .unwrap();

    let mock = Arc::new(MockBackend::new());
    let builder = Builder::new(Box::new(Arc::clone(&mock)), BuilderConfig::default());

    let mut refs = Vec::new();
    for spec in &specs {
        let mut out = Vec::new();
        let r = builder
            .build(spec, "", &PlatformSet::new(), &mut out, &CancelToken::new())
            .unwrap();
        refs.push(r);
    }

    assert!(refs[0].starts_with("registry.example.com/app:latest@sha256:"));
    assert!(refs[1].starts_with("registry.example.com/worker:latest@sha256:"));

    let dockerfiles: Vec<PathBuf> = mock
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            MockCall::Build { dockerfile, .. } => Some(dockerfile),
            _ => None,
        })
        .collect();
    assert_eq!(
        dockerfiles,
        vec![
            project.path().join("app/Dockerfile"),
            project.path().join("worker/Containerfile"),
        ]
    );
}

#[test]
fn rebuild_produces_identical_reference() {
    let project = tempfile::tempdir().unwrap();
    let manifest_path = write_project(project.path(), TWO_ARTIFACTS);
    let specs = parse_manifest_file(&manifest_path)
        .unwrap()
        .artifacts(project.path())
        .unwrap();

    let build_once = || {
        let backend = select_backend("mock", &EngineConfig::default()).unwrap();
        let builder = Builder::new(backend, BuilderConfig { push: true, jobs: None });
        let mut out = Vec::new();
        let r = builder
            .build(&specs[0], "", &PlatformSet::all(), &mut out, &CancelToken::new())
            .unwrap();
        builder.close().unwrap();
        r
    };

    assert_eq!(build_once(), build_once());
}

#[test]
fn cancelled_build_fails_with_cancelled_kind() {
    let project = tempfile::tempdir().unwrap();
    let manifest_path = write_project(project.path(), TWO_ARTIFACTS);
    let specs = parse_manifest_file(&manifest_path)
        .unwrap()
        .artifacts(project.path())
        .unwrap();

    let builder = Builder::new(Box::new(MockBackend::new()), BuilderConfig::default());
    let token = CancelToken::new();
    token.cancel();
    let mut out = Vec::new();
    let err = builder
        .build(&specs[0], "", &PlatformSet::new(), &mut out, &token)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn closed_backend_rejects_builds() {
    let project = tempfile::tempdir().unwrap();
    let manifest_path = write_project(project.path(), TWO_ARTIFACTS);
    let specs = parse_manifest_file(&manifest_path)
        .unwrap()
        .artifacts(project.path())
        .unwrap();

    let builder = Builder::new(Box::new(MockBackend::new()), BuilderConfig::default());
    builder.close().unwrap();
    builder.close().unwrap();
    let mut out = Vec::new();
    let err = builder
        .build(&specs[0], "", &PlatformSet::new(), &mut out, &CancelToken::new())
        .unwrap_err();
    assert!(err.to_string().contains("closed"));
}

#[test]
fn concurrent_builders_share_one_backend() {
    let project = tempfile::tempdir().unwrap();
    let manifest_path = write_project(project.path(), TWO_ARTIFACTS);
    let specs = parse_manifest_file(&manifest_path)
        .unwrap()
        .artifacts(project.path())
        .unwrap();

    let mock = Arc::new(MockBackend::new());
    let barrier = Arc::new(Barrier::new(4));
    let handles: Vec<_> = (0..4)
        .map(|i| {
            let mock = Arc::clone(&mock);
            let barrier = Arc::clone(&barrier);
            let spec = specs[i % 2].clone();
            thread::spawn(move || {
                let builder = Builder::new(Box::new(mock), BuilderConfig::default());
                barrier.wait();
                let mut out = Vec::new();
                builder
                    .build(&spec, "", &PlatformSet::new(), &mut out, &CancelToken::new())
                    .unwrap()
            })
        })
        .collect();

    let refs: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(refs[0], refs[2]);
    assert_eq!(refs[1], refs[3]);
    assert_ne!(refs[0], refs[1]);
    assert_eq!(mock.calls().len(), 4);
}

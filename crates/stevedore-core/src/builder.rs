use crate::dockerfile::resolve_dockerfile;
use crate::lifecycle::{validate_transition, BuildState};
use crate::CoreError;
use std::io::Write;
use std::path::{Path, PathBuf};
use stevedore_runtime::options::normalize_path;
use stevedore_runtime::{
    resolve_compression, resolve_format, BuildBackend, BuildOptions, CancelToken, Isolation,
    RuntimeError,
};
use stevedore_schema::{ArtifactSpec, CanonicalImageConfig, PlatformMatcher, PlatformSet};
use tracing::{info, trace, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuilderConfig {
    /// Push each image after building it.
    pub push: bool,
    /// Parallel stage jobs handed to the engine.
    pub jobs: Option<u32>,
}

/// Builds artifacts through a [`BuildBackend`].
///
/// One artifact is built per call. Calls share nothing but the backend and
/// the configuration, so one builder may serve concurrent builds.
pub struct Builder {
    backend: Box<dyn BuildBackend>,
    config: BuilderConfig,
}

impl Builder {
    pub fn new(backend: Box<dyn BuildBackend>, config: BuilderConfig) -> Self {
        Self {
            backend,
            config,
        }
    }

    pub fn backend(&self) -> &dyn BuildBackend {
        self.backend.as_ref()
    }

    pub fn config(&self) -> BuilderConfig {
        self.config
    }

    /// Build `spec`, tag it with `tag`, and push it when configured to.
    ///
    /// Returns the fully qualified reference (`name@digest`) of the built
    /// image, or of the pushed image when pushing is enabled.
    pub fn build(
        &self,
        spec: &ArtifactSpec,
        tag: &str,
        platforms: &PlatformSet,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<String, CoreError> {
        let mut state = BuildState::Idle;
        self.build_tracked(spec, tag, platforms, out, cancel, &mut state)
    }

    /// [`build`](Self::build), recording this call's lifecycle in `state`.
    fn build_tracked(
        &self,
        spec: &ArtifactSpec,
        tag: &str,
        platforms: &PlatformSet,
        out: &mut dyn Write,
        cancel: &CancelToken,
        state: &mut BuildState,
    ) -> Result<String, CoreError> {
        let result = self.run(spec, tag, platforms, out, cancel, state);
        if result.is_err() {
            if let Err(t) = advance(state, BuildState::Failed) {
                warn!("{t}");
            }
        }
        result
    }

    fn run(
        &self,
        spec: &ArtifactSpec,
        tag: &str,
        platforms: &PlatformSet,
        out: &mut dyn Write,
        cancel: &CancelToken,
        state: &mut BuildState,
    ) -> Result<String, CoreError> {
        let image = spec.image_name.as_str();
        let artifact = &spec.buildah;

        let dockerfile = resolve_dockerfile(&spec.workspace, &artifact.dockerfile_path)
            .map_err(|e| match e {
                CoreError::NotFound(msg) => {
                    CoreError::NotFound(format!("Dockerfile for image {image}: {msg}"))
                }
                other => other,
            })?;
        let dockerfile = dockerfile.to_str().ok_or_else(|| {
            CoreError::Config(format!(
                "Dockerfile path {} for image {image} is not valid UTF-8",
                dockerfile.display()
            ))
        })?;

        let format = resolve_format(&artifact.format).map_err(|e| stage("buildah format", e))?;
        let compression =
            resolve_compression(&artifact.compression).map_err(|e| stage("buildah compression", e))?;

        let context_dir = absolute(&spec.workspace).map_err(|e| {
            CoreError::Config(format!(
                "getting absolute path of context for image {image}: {e}"
            ))
        })?;

        let options = BuildOptions {
            context_dir: context_dir.clone(),
            output: image.to_owned(),
            additional_tags: if tag.is_empty() {
                Vec::new()
            } else {
                vec![tag.to_owned()]
            },
            build_args: artifact.build_args.clone(),
            target: artifact.target.clone(),
            no_cache: artifact.no_cache,
            squash: artifact.squash,
            secrets: artifact.secrets.clone(),
            add_host: artifact.add_host.clone(),
            format,
            compression,
            platforms: platforms.platforms().to_vec(),
            all_platforms: platforms.is_all(),
            jobs: self.config.jobs,
            isolation: Isolation::Default,
        };

        advance(state, BuildState::Building)?;
        let built = self
            .backend
            .build(dockerfile, &context_dir, &options, out, cancel)?;
        trace!("built image {image} with id {}", built.id);

        let reference = if self.config.push {
            advance(state, BuildState::Pushing)?;
            if artifact.compression.is_empty() {
                self.backend.push(built.id.as_str(), image, out, cancel)?
            } else {
                self.backend
                    .push_compressed(built.id.as_str(), image, compression, out, cancel)?
            }
        } else {
            built.reference
        };

        advance(state, BuildState::Done)?;
        info!("{image}: {reference}");
        Ok(reference.to_string())
    }

    /// Every platform is accepted; the engine decides what it can build.
    pub fn supported_platforms(&self) -> PlatformMatcher {
        PlatformMatcher::All
    }

    pub fn get_image_config(&self, image: &str) -> Result<CanonicalImageConfig, CoreError> {
        Ok(self.backend.image_config(image)?)
    }

    pub fn close(&self) -> Result<(), CoreError> {
        Ok(self.backend.close()?)
    }
}

fn advance(state: &mut BuildState, to: BuildState) -> Result<(), CoreError> {
    validate_transition(*state, to)?;
    trace!("builder state {state} -> {to}");
    *state = to;
    Ok(())
}

/// Prefix a resolution error with the stage that produced it, keeping its kind.
fn stage(name: &str, err: RuntimeError) -> CoreError {
    match err {
        RuntimeError::Config(msg) => CoreError::Config(format!("{name}: {msg}")),
        other => CoreError::Runtime(other),
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize_path(path));
    }
    Ok(normalize_path(&std::env::current_dir()?.join(path)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use std::fs;
    use std::sync::Arc;
    use stevedore_runtime::{Compression, ManifestType, MockBackend, MockCall};
    use stevedore_runtime::mock::MockOp;
    use stevedore_schema::Platform;

    struct Fixture {
        _dir: tempfile::TempDir,
        workspace: PathBuf,
        mock: Arc<MockBackend>,
    }

    fn fixture(mock: MockBackend) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("ws");
        fs::create_dir(&workspace).unwrap();
        fs::write(workspace.join("Dockerfile"), "FROM scratch\n").unwrap();
        Fixture {
            _dir: dir,
            workspace,
            mock: Arc::new(mock),
        }
    }

    fn builder(f: &Fixture, push: bool) -> Builder {
        Builder::new(
            Box::new(Arc::clone(&f.mock)),
            BuilderConfig { push, jobs: Some(2) },
        )
    }

    fn build(b: &Builder, spec: &ArtifactSpec) -> Result<String, CoreError> {
        let mut out = Vec::new();
        b.build(spec, "app:v1", &PlatformSet::new(), &mut out, &CancelToken::new())
    }

    fn tracked(b: &Builder, spec: &ArtifactSpec) -> (Result<String, CoreError>, BuildState) {
        let mut out = Vec::new();
        let mut state = BuildState::Idle;
        let result = b.build_tracked(
            spec,
            "app:v1",
            &PlatformSet::new(),
            &mut out,
            &CancelToken::new(),
            &mut state,
        );
        (result, state)
    }

    #[test]
    fn build_without_push() {
        let f = fixture(MockBackend::new());
        let b = builder(&f, false);
        let spec = ArtifactSpec::new(&f.workspace, "app:latest");

        let (reference, state) = tracked(&b, &spec);
        let reference = reference.unwrap();
        assert!(reference.starts_with("app:latest@sha256:"), "{reference}");
        assert_eq!(state, BuildState::Done);

        let calls = f.mock.calls();
        assert_eq!(calls.len(), 1);
        match &calls[0] {
            MockCall::Build { dockerfile, options } => {
                assert_eq!(dockerfile, &f.workspace.join("Dockerfile"));
                assert_eq!(options.context_dir, f.workspace);
                assert_eq!(options.output, "app:latest");
                assert_eq!(options.additional_tags, vec!["app:v1".to_owned()]);
                assert_eq!(options.format, ManifestType::OciV1);
                assert_eq!(options.compression, Compression::Gzip);
                assert_eq!(options.jobs, Some(2));
                assert_eq!(options.isolation, Isolation::Default);
            }
            other => panic!("unexpected call {other:?}"),
        }
    }

    #[test]
    fn build_with_push_returns_pushed_reference() {
        let f = fixture(MockBackend::new());
        let b = builder(&f, true);
        let spec = ArtifactSpec::new(&f.workspace, "app:latest");

        let (reference, state) = tracked(&b, &spec);
        let reference = reference.unwrap();
        assert_eq!(state, BuildState::Done);
        let calls = f.mock.calls();
        assert_eq!(calls.len(), 2);
        let built_id = {
            let mut out = Vec::new();
            let MockCall::Build { dockerfile, options } = &calls[0] else {
                panic!("expected build first");
            };
            MockBackend::new()
                .build(dockerfile.to_str().unwrap(), &f.workspace, options, &mut out, &CancelToken::new())
                .unwrap()
                .id
        };
        match &calls[1] {
            MockCall::Push {
                image_id,
                image_name,
                compression,
            } => {
                assert_eq!(image_id, built_id.as_str());
                assert_eq!(image_name, "app:latest");
                assert_eq!(*compression, None);
            }
            other => panic!("unexpected call {other:?}"),
        }

        let mut out = Vec::new();
        let pushed = MockBackend::new()
            .push(built_id.as_str(), "app:latest", &mut out, &CancelToken::new())
            .unwrap();
        assert_eq!(reference, pushed.to_string());
    }

    #[test]
    fn unknown_compression_fails_before_backend() {
        let f = fixture(MockBackend::new());
        let b = builder(&f, false);
        let mut spec = ArtifactSpec::new(&f.workspace, "app:latest");
        spec.buildah.compression = "unknown".to_owned();

        let (result, state) = tracked(&b, &spec);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("unknown"));
        assert!(err.to_string().contains("buildah compression"));
        assert!(f.mock.calls().is_empty());
        assert_eq!(state, BuildState::Failed);
    }

    #[test]
    fn unknown_format_is_config_error() {
        let f = fixture(MockBackend::new());
        let b = builder(&f, false);
        let mut spec = ArtifactSpec::new(&f.workspace, "app");
        spec.buildah.format = "v2s1".to_owned();
        let err = build(&b, &spec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("buildah format"));
    }

    #[test]
    fn missing_dockerfile_is_not_found() {
        let f = fixture(MockBackend::new());
        let b = builder(&f, false);
        let mut spec = ArtifactSpec::new(&f.workspace, "app");
        spec.buildah.dockerfile_path = "Containerfile".to_owned();
        let err = build(&b, &spec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.to_string().contains("app"));
        assert!(f.mock.calls().is_empty());
    }

    #[test]
    fn platforms_and_options_pass_through() {
        let f = fixture(MockBackend::new());
        let b = builder(&f, false);
        let mut spec = ArtifactSpec::new(&f.workspace, "app");
        spec.buildah.format = "docker".to_owned();
        spec.buildah.compression = "zstd".to_owned();
        spec.buildah.target = "runtime".to_owned();
        spec.buildah.squash = true;
        spec.buildah.secrets = vec!["id=tok".to_owned()];
        spec.buildah.build_args.insert("PROXY".to_owned(), None);

        let platforms = PlatformSet::new()
            .with(Platform::new("linux", "amd64", ""))
            .with(Platform::new("linux", "arm64", "v8"));
        let mut out = Vec::new();
        b.build(&spec, "", &platforms, &mut out, &CancelToken::new()).unwrap();

        let MockCall::Build { options, .. } = &f.mock.calls()[0] else {
            panic!("expected build");
        };
        assert_eq!(options.platforms, platforms.platforms());
        assert!(!options.all_platforms);
        assert!(options.additional_tags.is_empty());
        assert_eq!(options.format, ManifestType::DockerV2);
        assert_eq!(options.compression, Compression::Zstd);
        assert_eq!(options.target, "runtime");
        assert!(options.squash);
        assert_eq!(options.secrets, vec!["id=tok".to_owned()]);
        assert_eq!(options.build_args["PROXY"], None);
    }

    #[test]
    fn push_uses_artifact_compression() {
        let f = fixture(MockBackend::new());
        let b = builder(&f, true);
        let mut spec = ArtifactSpec::new(&f.workspace, "app");
        spec.buildah.compression = "zstd".to_owned();
        build(&b, &spec).unwrap();

        let calls = f.mock.calls();
        let Some(MockCall::Push { compression, .. }) = calls.last() else {
            panic!("expected push last, got {calls:?}");
        };
        assert_eq!(*compression, Some(Compression::Zstd));
    }

    #[test]
    fn backend_build_failure_keeps_kind() {
        let f = fixture(MockBackend::new().failing(MockOp::Build, "exit status 1"));
        let b = builder(&f, true);
        let spec = ArtifactSpec::new(&f.workspace, "app");
        let (result, state) = tracked(&b, &spec);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::Build);
        assert_eq!(state, BuildState::Failed);
        assert!(!f.mock.calls().iter().any(|c| matches!(c, MockCall::Push { .. })));
    }

    #[test]
    fn push_failure_keeps_kind() {
        let f = fixture(MockBackend::new().failing(MockOp::Push, "denied"));
        let b = builder(&f, true);
        let spec = ArtifactSpec::new(&f.workspace, "app");
        let err = build(&b, &spec).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Push);
    }

    /// Delays builds of one image so calls overlap.
    struct Delayed {
        inner: MockBackend,
        slow_image: &'static str,
    }

    impl BuildBackend for Delayed {
        fn name(&self) -> &str {
            "delayed"
        }

        fn available(&self) -> bool {
            true
        }

        fn build(
            &self,
            dockerfile: &str,
            context_dir: &Path,
            options: &BuildOptions,
            out: &mut dyn Write,
            cancel: &CancelToken,
        ) -> Result<stevedore_runtime::BuildResult, RuntimeError> {
            if options.output == self.slow_image {
                std::thread::sleep(std::time::Duration::from_millis(400));
            }
            self.inner.build(dockerfile, context_dir, options, out, cancel)
        }

        fn push(
            &self,
            image_id: &str,
            image_name: &str,
            out: &mut dyn Write,
            cancel: &CancelToken,
        ) -> Result<stevedore_schema::CanonicalReference, RuntimeError> {
            self.inner.push(image_id, image_name, out, cancel)
        }

        fn inspect(&self, image_name: &str) -> Result<stevedore_schema::ImageDescriptor, RuntimeError> {
            self.inner.inspect(image_name)
        }

        fn close(&self) -> Result<(), RuntimeError> {
            self.inner.close()
        }
    }

    #[test]
    fn overlapping_builds_on_one_builder_both_succeed() {
        let f = fixture(MockBackend::new());
        let backend = Delayed {
            inner: MockBackend::new(),
            slow_image: "slow",
        };
        let b = Arc::new(Builder::new(
            Box::new(backend),
            BuilderConfig { push: true, jobs: None },
        ));

        let slow = {
            let b = Arc::clone(&b);
            let spec = ArtifactSpec::new(&f.workspace, "slow");
            std::thread::spawn(move || build(&b, &spec))
        };
        std::thread::sleep(std::time::Duration::from_millis(100));
        let fast = build(&b, &ArtifactSpec::new(&f.workspace, "fast"));
        let slow = slow.join().unwrap();

        assert!(fast.unwrap().starts_with("fast@sha256:"));
        assert!(slow.unwrap().starts_with("slow@sha256:"));
    }

    #[test]
    fn relative_workspace_becomes_absolute() {
        let f = fixture(MockBackend::new());
        let b = builder(&f, false);
        let cwd = std::env::current_dir().unwrap();
        let rel = pathdiff(&f.workspace, &cwd);
        let spec = ArtifactSpec::new(rel, "app");
        build(&b, &spec).unwrap();
        let MockCall::Build { options, .. } = &f.mock.calls()[0] else {
            panic!("expected build");
        };
        assert!(options.context_dir.is_absolute());
        assert_eq!(options.context_dir, f.workspace);
    }

    /// `target` relative to `base`, both absolute.
    fn pathdiff(target: &Path, base: &Path) -> PathBuf {
        let t: Vec<_> = target.components().collect();
        let b: Vec<_> = base.components().collect();
        let common = t.iter().zip(&b).take_while(|(x, y)| x == y).count();
        let mut rel = PathBuf::new();
        for _ in common..b.len() {
            rel.push("..");
        }
        for c in &t[common..] {
            rel.push(c.as_os_str());
        }
        rel
    }

    #[test]
    fn supported_platforms_is_all() {
        let f = fixture(MockBackend::new());
        assert!(builder(&f, false).supported_platforms().is_all());
    }

    #[test]
    fn get_image_config_delegates() {
        let f = fixture(MockBackend::new().strict());
        let b = builder(&f, false);
        let err = b.get_image_config("ghost").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let f = fixture(MockBackend::new());
        let config = builder(&f, false).get_image_config("app:latest").unwrap();
        assert_eq!(config.os, "linux");
    }
}

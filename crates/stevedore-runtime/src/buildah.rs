use crate::backend::{BuildBackend, BuildResult};
use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::options::{effective_dockerfile, resolve_compression, BuildOptions, Compression};
use crate::process::{run_capture, run_streaming};
use crate::RuntimeError;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use stevedore_schema::{CanonicalReference, Digest, ImageDescriptor, ImageId, TransportRef};
use stevedore_store::{BuildStore, StoreLayout};
use tracing::{debug, info, warn};

/// Backend driving the `buildah` command-line tool.
///
/// Every invocation is pinned to the store opened at construction time via
/// `--root`/`--runroot`, so the backend never touches a store other than the
/// one it holds a lock on.
pub struct BuildahBackend {
    config: EngineConfig,
    store: BuildStore,
    push_compression: Compression,
}

impl BuildahBackend {
    pub fn new(config: EngineConfig) -> Result<Self, RuntimeError> {
        let push_compression = resolve_compression(&config.default_compression)?;
        let layout = match (&config.graph_root, &config.run_root) {
            (Some(graph), Some(run)) => StoreLayout::new(graph, run),
            (graph, run) => {
                let detected = StoreLayout::detect()?;
                StoreLayout::new(
                    graph.as_deref().unwrap_or(detected.graph_root()),
                    run.as_deref().unwrap_or(detected.run_root()),
                )
            }
        };
        let store = BuildStore::open(layout)?;
        Ok(Self {
            config,
            store,
            push_compression,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn command(&self) -> Result<Command, RuntimeError> {
        let layout = self.store.layout().map_err(RuntimeError::from_store)?;
        let mut cmd = Command::new(&self.config.buildah_bin);
        cmd.arg("--root")
            .arg(layout.graph_root())
            .arg("--runroot")
            .arg(layout.run_root())
            .envs(&self.config.env);
        Ok(cmd)
    }

    /// Manifest digest of a locally stored image. `None` when the engine
    /// succeeds but has not recorded one.
    fn image_digest(&self, image_id: &str) -> Result<Option<Digest>, RuntimeError> {
        let mut cmd = self.command()?;
        cmd.args(["inspect", "--type", "image", "--format", "{{.FromImageDigest}}", image_id]);
        let captured = run_capture(&mut cmd)?;
        if !captured.status.success() {
            return Err(RuntimeError::Inspect {
                image: image_id.to_owned(),
                reason: captured.stderr.trim().to_owned(),
            });
        }
        let raw = captured.stdout.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<Digest>().map(Some).map_err(|e| RuntimeError::Inspect {
            image: image_id.to_owned(),
            reason: format!("engine reported malformed digest: {e}"),
        })
    }

    fn inspect_local(&self, image: &str) -> Result<Lookup, RuntimeError> {
        let mut cmd = self.command()?;
        cmd.args(["inspect", "--type", "image", image]);
        let captured = run_capture(&mut cmd)?;
        if captured.status.success() {
            return Ok(Lookup::Found(captured.stdout));
        }
        if is_image_unknown(&captured.stderr) {
            return Ok(Lookup::Unknown);
        }
        Ok(Lookup::Failed(captured.stderr.trim().to_owned()))
    }

    fn pull_missing(&self, image: &str) -> Result<(), RuntimeError> {
        let mut cmd = self.command()?;
        cmd.args(["pull", "--quiet", "--policy", "missing", image]);
        let captured = run_capture(&mut cmd)?;
        if captured.status.success() {
            debug!("pulled {image}: {}", captured.stdout.trim());
            Ok(())
        } else {
            Err(RuntimeError::NotFound(format!(
                "image {image} was not found locally and pulling it failed: {}",
                captured.stderr.trim()
            )))
        }
    }

    fn push_as(
        &self,
        image_id: &str,
        image_name: &str,
        compression: Compression,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<CanonicalReference, RuntimeError> {
        let push_err = |reason: String| RuntimeError::Push {
            image: image_name.to_owned(),
            reason,
        };

        let dest: TransportRef = image_name
            .parse()
            .map_err(|e| push_err(format!("parsing image name: {e}")))?;
        let scratch = tempfile::tempdir()?;
        let digestfile = scratch.path().join("digest");

        let mut cmd = self.command()?;
        cmd.args(push_arguments(image_id, &dest, compression, &digestfile));
        let streamed = run_streaming(&mut cmd, out, cancel).map_err(|e| e.into_runtime("push"))?;
        if !streamed.status.success() {
            return Err(push_err(streamed.failure_reason()));
        }

        let digest: Digest = fs::read_to_string(&digestfile)
            .map_err(|e| push_err(format!("reading pushed digest: {e}")))?
            .trim()
            .parse()
            .map_err(|e| push_err(format!("engine reported malformed digest: {e}")))?;

        info!("pushed {dest}@{digest}");
        Ok(CanonicalReference::new(dest.name(), digest))
    }
}

/// Outcome of a local-store lookup.
enum Lookup {
    Found(String),
    Unknown,
    Failed(String),
}

/// Whether engine stderr reports that an image is absent from the store.
pub(crate) fn is_image_unknown(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    ["image not known", "no such image", "image not found", "unable to find"]
        .iter()
        .any(|needle| stderr.contains(needle))
}

/// Arguments for `buildah build`, excluding the global store flags.
pub(crate) fn build_arguments(dockerfile: &Path, options: &BuildOptions, iidfile: &Path) -> Vec<String> {
    let mut args = vec![
        "build".to_owned(),
        "--file".to_owned(),
        dockerfile.display().to_string(),
        "--iidfile".to_owned(),
        iidfile.display().to_string(),
        "--format".to_owned(),
        options.format.format_name().to_owned(),
    ];

    if !options.output.is_empty() {
        args.push("--tag".to_owned());
        args.push(options.output.clone());
    }
    for tag in &options.additional_tags {
        if !tag.is_empty() && *tag != options.output {
            args.push("--tag".to_owned());
            args.push(tag.clone());
        }
    }
    if !options.target.is_empty() {
        args.push("--target".to_owned());
        args.push(options.target.clone());
    }
    for (name, value) in &options.build_args {
        args.push("--build-arg".to_owned());
        args.push(match value {
            Some(v) => format!("{name}={v}"),
            None => name.clone(),
        });
    }
    if options.no_cache {
        args.push("--no-cache".to_owned());
    }
    if options.squash {
        args.push("--squash".to_owned());
    }
    for secret in &options.secrets {
        args.push("--secret".to_owned());
        args.push(secret.clone());
    }
    for host in &options.add_host {
        args.push("--add-host".to_owned());
        args.push(host.clone());
    }
    if options.all_platforms {
        args.push("--all-platforms".to_owned());
    } else if !options.platforms.is_empty() {
        let list: Vec<String> = options.platforms.iter().map(ToString::to_string).collect();
        args.push("--platform".to_owned());
        args.push(list.join(","));
    }
    if let Some(jobs) = options.jobs {
        args.push(format!("--jobs={jobs}"));
    }
    if let Some(isolation) = options.isolation.flag_value() {
        args.push(format!("--isolation={isolation}"));
    }
    let disable = options.compression == Compression::Uncompressed;
    args.push(format!("--disable-compression={disable}"));

    args.push(options.context_dir.display().to_string());
    args
}

/// Arguments for `buildah push`, excluding the global store flags.
pub(crate) fn push_arguments(
    image_id: &str,
    dest: &TransportRef,
    compression: Compression,
    digestfile: &Path,
) -> Vec<String> {
    let mut args = vec![
        "push".to_owned(),
        "--digestfile".to_owned(),
        digestfile.display().to_string(),
    ];
    match compression {
        Compression::Gzip | Compression::Zstd => {
            args.push("--compression-format".to_owned());
            args.push(compression.as_str().to_owned());
        }
        Compression::Uncompressed => args.push("--disable-compression".to_owned()),
        Compression::Xz | Compression::Bzip2 => {
            warn!("push compression {compression} is not supported by the engine, using its default");
        }
    }
    args.push(image_id.to_owned());
    args.push(dest.to_string());
    args
}

impl BuildBackend for BuildahBackend {
    fn name(&self) -> &'static str {
        "buildah"
    }

    fn available(&self) -> bool {
        Command::new(&self.config.buildah_bin)
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn build(
        &self,
        dockerfile: &str,
        context_dir: &Path,
        options: &BuildOptions,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<BuildResult, RuntimeError> {
        let build_err = |reason: String| RuntimeError::Build {
            image: options.output.clone(),
            workspace: context_dir.display().to_string(),
            reason,
        };

        let dockerfile = effective_dockerfile(context_dir, dockerfile);
        let scratch = tempfile::tempdir()?;
        let iidfile = scratch.path().join("iid");

        let mut cmd = self.command()?;
        cmd.args(build_arguments(&dockerfile, options, &iidfile));
        let streamed = run_streaming(&mut cmd, out, cancel).map_err(|e| e.into_runtime("build"))?;
        if !streamed.status.success() {
            return Err(build_err(streamed.failure_reason()));
        }

        let raw_id = fs::read_to_string(&iidfile)
            .map_err(|e| build_err(format!("reading image id: {e}")))?;
        let id = raw_id.trim();
        let id = id.strip_prefix("sha256:").unwrap_or(id);
        if id.is_empty() {
            return Err(build_err("engine reported an empty image id".to_owned()));
        }

        let digest = match self.image_digest(id) {
            Ok(Some(d)) => d,
            Ok(None) => Digest::new("sha256", id).map_err(|e| build_err(e.to_string()))?,
            Err(RuntimeError::Inspect { reason, .. }) => {
                return Err(build_err(format!("reading image digest: {reason}")))
            }
            Err(e) => return Err(e),
        };

        let id = ImageId::new(id);
        info!("built image {} with id {}", options.output, id.short());
        Ok(BuildResult {
            id,
            reference: CanonicalReference::new(options.output.clone(), digest),
        })
    }

    fn push(
        &self,
        image_id: &str,
        image_name: &str,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<CanonicalReference, RuntimeError> {
        self.push_as(image_id, image_name, self.push_compression, out, cancel)
    }

    fn push_compressed(
        &self,
        image_id: &str,
        image_name: &str,
        compression: Compression,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<CanonicalReference, RuntimeError> {
        self.push_as(image_id, image_name, compression, out, cancel)
    }

    fn inspect(&self, image_name: &str) -> Result<ImageDescriptor, RuntimeError> {
        let inspect_err = |reason: String| RuntimeError::Inspect {
            image: image_name.to_owned(),
            reason,
        };

        let raw = match self.inspect_local(image_name)? {
            Lookup::Found(raw) => raw,
            Lookup::Unknown => {
                debug!("{image_name} not in local store, pulling");
                self.pull_missing(image_name)?;
                match self.inspect_local(image_name)? {
                    Lookup::Found(raw) => raw,
                    Lookup::Unknown => {
                        return Err(RuntimeError::NotFound(format!(
                            "image {image_name} is still unknown after pulling"
                        )))
                    }
                    Lookup::Failed(reason) => return Err(inspect_err(reason)),
                }
            }
            Lookup::Failed(reason) => return Err(inspect_err(reason)),
        };

        ImageDescriptor::from_inspect_json(&raw)
            .map_err(|e| inspect_err(format!("parsing engine output: {e}")))
    }

    fn close(&self) -> Result<(), RuntimeError> {
        self.store.close()?;
        Ok(())
    }
}

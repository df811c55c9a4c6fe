use crate::backend::{BuildBackend, BuildResult};
use crate::cancel::CancelToken;
use crate::options::{effective_dockerfile, BuildOptions, Compression};
use crate::RuntimeError;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use stevedore_schema::{
    CanonicalReference, DescriptorHistory, DescriptorRootFs, Digest, ImageDescriptor, ImageId,
    TransportRef,
};

/// A call observed by [`MockBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Build {
        dockerfile: PathBuf,
        options: BuildOptions,
    },
    /// `compression` is set only when the caller asked for one explicitly.
    Push {
        image_id: String,
        image_name: String,
        compression: Option<Compression>,
    },
    Inspect {
        image_name: String,
    },
    Close,
}

/// Which operation an injected failure applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    Build,
    Push,
    Inspect,
}

#[derive(Default)]
struct MockState {
    calls: Vec<MockCall>,
    images: HashMap<String, ImageDescriptor>,
    failures: HashMap<MockOp, String>,
    closed: bool,
}

/// In-memory backend. Ids and digests are derived from the inputs with
/// blake3, so identical builds yield identical references.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
    strict: bool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the descriptor `inspect` returns for `image_name`.
    #[must_use]
    pub fn with_image(self, image_name: &str, descriptor: ImageDescriptor) -> Self {
        self.lock().images.insert(image_name.to_owned(), descriptor);
        self
    }

    /// Make every `op` call fail with `reason`.
    #[must_use]
    pub fn failing(self, op: MockOp, reason: &str) -> Self {
        self.lock().failures.insert(op, reason.to_owned());
        self
    }

    /// Only registered images can be inspected; anything else is `NotFound`.
    #[must_use]
    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Record `call` and check whether it may proceed.
    fn begin(&self, call: MockCall, op: MockOp) -> Result<MutexGuard<'_, MockState>, Refusal> {
        let mut state = self.lock();
        if state.closed {
            return Err(Refusal::Closed);
        }
        state.calls.push(call);
        if let Some(reason) = state.failures.get(&op).cloned() {
            return Err(Refusal::Injected(reason));
        }
        Ok(state)
    }

    fn push_as(
        &self,
        image_id: &str,
        image_name: &str,
        compression: Option<Compression>,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<CanonicalReference, RuntimeError> {
        let push_err = |reason: String| RuntimeError::Push {
            image: image_name.to_owned(),
            reason,
        };
        let call = MockCall::Push {
            image_id: image_id.to_owned(),
            image_name: image_name.to_owned(),
            compression,
        };
        let _state = self
            .begin(call, MockOp::Push)
            .map_err(|r| r.into_error(push_err))?;
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled("push".to_owned()));
        }

        let dest: TransportRef = image_name
            .parse()
            .map_err(|e| push_err(format!("parsing image name: {e}")))?;
        let digest = mock_digest(&format!("mock-push:{image_id}:{dest}"))?;
        writeln!(out, "mock: pushed {dest}")?;
        Ok(CanonicalReference::new(dest.name(), digest))
    }
}

enum Refusal {
    Closed,
    Injected(String),
}

impl Refusal {
    fn into_error(self, injected: impl FnOnce(String) -> RuntimeError) -> RuntimeError {
        match self {
            Refusal::Closed => RuntimeError::StoreClosed,
            Refusal::Injected(reason) => injected(reason),
        }
    }
}

fn mock_digest(seed: &str) -> Result<Digest, RuntimeError> {
    let hex = blake3::hash(seed.as_bytes()).to_hex();
    Digest::new("sha256", hex.as_str()).map_err(|e| RuntimeError::Config(e.to_string()))
}

/// Deterministic descriptor for an unregistered image.
fn synthesize(image_name: &str) -> Result<ImageDescriptor, RuntimeError> {
    let created = Utc
        .timestamp_opt(1_700_000_000, 0)
        .single()
        .ok_or_else(|| RuntimeError::Config("mock timestamp out of range".to_owned()))?;
    let layer = mock_digest(&format!("mock-layer:{image_name}"))?;
    Ok(ImageDescriptor {
        created: Some(created),
        author: "stevedore-mock".to_owned(),
        architecture: "amd64".to_owned(),
        os: "linux".to_owned(),
        rootfs: Some(DescriptorRootFs {
            fs_type: "layers".to_owned(),
            diff_ids: vec![layer.to_string()],
        }),
        history: vec![DescriptorHistory {
            created: Some(created),
            created_by: format!("mock build of {image_name}"),
            ..DescriptorHistory::default()
        }],
        ..ImageDescriptor::default()
    })
}

impl BuildBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
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
    ) -> Result<BuildResult, RuntimeError> {
        let dockerfile = effective_dockerfile(context_dir, dockerfile);
        let call = MockCall::Build {
            dockerfile: dockerfile.clone(),
            options: options.clone(),
        };
        let _state = self.begin(call, MockOp::Build).map_err(|r| {
            r.into_error(|reason| RuntimeError::Build {
                image: options.output.clone(),
                workspace: context_dir.display().to_string(),
                reason,
            })
        })?;
        if cancel.is_cancelled() {
            return Err(RuntimeError::Cancelled("build".to_owned()));
        }

        let seed = format!(
            "mock-build:{}:{}:{:?}",
            dockerfile.display(),
            options.output,
            options.build_args
        );
        let id = ImageId::new(blake3::hash(seed.as_bytes()).to_hex().as_str());
        let digest = mock_digest(&format!("mock-manifest:{id}"))?;
        writeln!(out, "mock: built {} ({})", options.output, id.short())?;

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
        self.push_as(image_id, image_name, None, out, cancel)
    }

    fn push_compressed(
        &self,
        image_id: &str,
        image_name: &str,
        compression: Compression,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<CanonicalReference, RuntimeError> {
        self.push_as(image_id, image_name, Some(compression), out, cancel)
    }

    fn inspect(&self, image_name: &str) -> Result<ImageDescriptor, RuntimeError> {
        let call = MockCall::Inspect {
            image_name: image_name.to_owned(),
        };
        let state = self.begin(call, MockOp::Inspect).map_err(|r| {
            r.into_error(|reason| RuntimeError::Inspect {
                image: image_name.to_owned(),
                reason,
            })
        })?;

        if let Some(descriptor) = state.images.get(image_name) {
            return Ok(descriptor.clone());
        }
        if self.strict {
            return Err(RuntimeError::NotFound(format!(
                "image {image_name} was not found locally and pulling it failed"
            )));
        }
        synthesize(image_name)
    }

    fn close(&self) -> Result<(), RuntimeError> {
        let mut state = self.lock();
        if !state.closed {
            state.calls.push(MockCall::Close);
            state.closed = true;
        }
        Ok(())
    }
}

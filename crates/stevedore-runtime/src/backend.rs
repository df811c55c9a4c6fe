use crate::cancel::CancelToken;
use crate::config::EngineConfig;
use crate::options::{BuildOptions, Compression};
use crate::RuntimeError;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use stevedore_schema::{normalize, CanonicalImageConfig, CanonicalReference, ImageDescriptor, ImageId};

/// Outcome of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildResult {
    /// Engine-local image id.
    pub id: ImageId,
    pub reference: CanonicalReference,
}

pub trait BuildBackend: Send + Sync {
    fn name(&self) -> &str;

    fn available(&self) -> bool;

    /// Build one image. `dockerfile` may be empty, in which case
    /// `<context_dir>/Dockerfile` is used. Progress text goes to `out`.
    fn build(
        &self,
        dockerfile: &str,
        context_dir: &Path,
        options: &BuildOptions,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<BuildResult, RuntimeError>;

    /// Push a built image. A bare `image_name` is pushed over `docker://`.
    fn push(
        &self,
        image_id: &str,
        image_name: &str,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<CanonicalReference, RuntimeError>;

    /// Push with an explicit layer compression instead of the backend default.
    fn push_compressed(
        &self,
        image_id: &str,
        image_name: &str,
        _compression: Compression,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<CanonicalReference, RuntimeError> {
        self.push(image_id, image_name, out, cancel)
    }

    /// Engine-native description of an image, pulling it once if it is not
    /// present locally.
    fn inspect(&self, image_name: &str) -> Result<ImageDescriptor, RuntimeError>;

    fn image_config(&self, image_name: &str) -> Result<CanonicalImageConfig, RuntimeError> {
        let descriptor = self.inspect(image_name)?;
        normalize(&descriptor).map_err(|source| RuntimeError::Conversion {
            image: image_name.to_owned(),
            source,
        })
    }

    /// Release backend resources. Closing twice is a no-op.
    fn close(&self) -> Result<(), RuntimeError>;
}

impl<T: BuildBackend + ?Sized> BuildBackend for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn available(&self) -> bool {
        (**self).available()
    }

    fn build(
        &self,
        dockerfile: &str,
        context_dir: &Path,
        options: &BuildOptions,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<BuildResult, RuntimeError> {
        (**self).build(dockerfile, context_dir, options, out, cancel)
    }

    fn push(
        &self,
        image_id: &str,
        image_name: &str,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<CanonicalReference, RuntimeError> {
        (**self).push(image_id, image_name, out, cancel)
    }

    fn push_compressed(
        &self,
        image_id: &str,
        image_name: &str,
        compression: Compression,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<CanonicalReference, RuntimeError> {
        (**self).push_compressed(image_id, image_name, compression, out, cancel)
    }

    fn inspect(&self, image_name: &str) -> Result<ImageDescriptor, RuntimeError> {
        (**self).inspect(image_name)
    }

    fn image_config(&self, image_name: &str) -> Result<CanonicalImageConfig, RuntimeError> {
        (**self).image_config(image_name)
    }

    fn close(&self) -> Result<(), RuntimeError> {
        (**self).close()
    }
}

pub fn select_backend(
    name: &str,
    config: &EngineConfig,
) -> Result<Box<dyn BuildBackend>, RuntimeError> {
    match name {
        "buildah" => Ok(Box::new(crate::buildah::BuildahBackend::new(
            config.clone(),
        )?)),
        "mock" => Ok(Box::new(crate::mock::MockBackend::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}

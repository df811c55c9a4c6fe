//! Data model and metadata normalization for Stevedore.
//!
//! This crate defines the schema layer: the TOML artifact manifest
//! (`ArtifactManifest` / `ArtifactSpec`), target platforms (`PlatformSet`),
//! content digests and image references, the engine-native image document
//! (`ImageDescriptor`), the engine-agnostic registry config
//! (`CanonicalImageConfig`), and the pure mapping between the two (`normalize`).

pub mod config;
pub mod descriptor;
pub mod digest;
pub mod manifest;
pub mod normalize;
pub mod platform;
pub mod reference;
pub mod types;

mod serde_util;

pub use config::{CanonicalImageConfig, ContainerConfig, Hash, History, RootFs};
pub use descriptor::{DescriptorHistory, DescriptorRootFs, ImageDescriptor, RuntimeConfig};
pub use digest::{Digest, DigestError};
pub use manifest::{
    parse_manifest_file, parse_manifest_str, ArtifactManifest, ArtifactSection, ArtifactSpec,
    BuildahArtifact, BuildahSection, ManifestError,
};
pub use normalize::{normalize, ConversionError};
pub use platform::{Platform, PlatformError, PlatformMatcher, PlatformSet};
pub use reference::{CanonicalReference, ReferenceError, Transport, TransportRef};
pub use types::ImageId;

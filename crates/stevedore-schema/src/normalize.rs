use crate::config::{CanonicalImageConfig, ContainerConfig, History, RootFs};
use crate::descriptor::{DescriptorHistory, DescriptorRootFs, ImageDescriptor, RuntimeConfig};
use crate::digest::Digest;
use thiserror::Error;

/// Failure to map an engine-native descriptor onto the canonical schema.
/// The variant names the sub-structure that could not be mapped.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("image creation timestamp is missing")]
    Created,
    #[error("history entry {index}: {reason}")]
    History { index: usize, reason: String },
    #[error("root filesystem: {0}")]
    RootFs(String),
}

/// Map an engine-native image document onto the canonical image config.
///
/// History and layer order are preserved. Missing runtime-config fields become
/// empty values; a missing creation timestamp (on the image or on any history
/// entry) or a missing/malformed root filesystem aborts the whole conversion.
pub fn normalize(descriptor: &ImageDescriptor) -> Result<CanonicalImageConfig, ConversionError> {
    let created = descriptor.created.ok_or(ConversionError::Created)?;
    let history = convert_history(&descriptor.history)?;
    let rootfs = convert_rootfs(descriptor.rootfs.as_ref())?;
    let config = convert_config(descriptor.config.as_ref());

    Ok(CanonicalImageConfig {
        architecture: descriptor.architecture.clone(),
        author: descriptor.author.clone(),
        created,
        os: descriptor.os.clone(),
        variant: descriptor.variant.clone(),
        config,
        history,
        rootfs,
    })
}

fn convert_history(entries: &[DescriptorHistory]) -> Result<Vec<History>, ConversionError> {
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let created = entry.created.ok_or_else(|| ConversionError::History {
                index,
                reason: "created timestamp is missing".to_owned(),
            })?;
            Ok(History {
                author: entry.author.clone(),
                created,
                created_by: entry.created_by.clone(),
                comment: entry.comment.clone(),
                empty_layer: entry.empty_layer,
            })
        })
        .collect()
}

fn convert_rootfs(rootfs: Option<&DescriptorRootFs>) -> Result<RootFs, ConversionError> {
    let rootfs = rootfs.ok_or_else(|| ConversionError::RootFs("missing".to_owned()))?;
    let layers = rootfs
        .diff_ids
        .iter()
        .enumerate()
        .map(|(i, raw)| {
            raw.parse::<Digest>()
                .map_err(|e| ConversionError::RootFs(format!("layer {i}: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RootFs {
        fs_type: rootfs.fs_type.clone(),
        layers,
    })
}

fn convert_config(config: Option<&RuntimeConfig>) -> ContainerConfig {
    let Some(config) = config else {
        return ContainerConfig::default();
    };

    ContainerConfig {
        entrypoint: config.entrypoint.clone(),
        cmd: config.cmd.clone(),
        env: config.env.clone(),
        working_dir: config.working_dir.clone(),
        exposed_ports: config.exposed_ports.clone(),
        volumes: config.volumes.clone(),
        labels: config.labels.clone(),
        stop_signal: config.stop_signal.clone(),
        user: config.user.clone(),
    }
}

use super::{json_pretty, spin_fail, spin_ok, spinner, style_reference, Failure, EXIT_SUCCESS};
use std::io::{self, Write};
use std::path::Path;
use stevedore_core::{Builder, BuilderConfig};
use stevedore_runtime::{BuildBackend, CancelToken};
use stevedore_schema::{parse_manifest_file, PlatformSet};

pub struct BuildRequest<'a> {
    pub manifest: &'a Path,
    pub tag: Option<&'a str>,
    pub platforms: &'a [String],
    pub all_platforms: bool,
    pub push: bool,
    pub jobs: Option<u32>,
}

pub fn run(
    backend: Box<dyn BuildBackend>,
    request: &BuildRequest<'_>,
    cancel: &CancelToken,
    verbose: bool,
    json: bool,
) -> Result<u8, Failure> {
    let manifest = parse_manifest_file(request.manifest)?;
    let base_dir = match request.manifest.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let specs = manifest.artifacts(base_dir)?;

    let mut platforms =
        PlatformSet::parse_list(request.platforms).map_err(|e| Failure::config(e.to_string()))?;
    platforms.set_all(request.all_platforms);

    let builder = Builder::new(
        backend,
        BuilderConfig {
            push: request.push,
            jobs: request.jobs,
        },
    );
    let tag = request.tag.unwrap_or("");

    // Engine output is only shown with --verbose; otherwise failures carry its tail.
    let mut sink: Box<dyn Write> = if verbose && !json {
        Box::new(io::stderr())
    } else {
        Box::new(io::sink())
    };

    let mut built = Vec::with_capacity(specs.len());
    for spec in &specs {
        let pb = (!json && !verbose).then(|| spinner(&format!("building {}...", spec.image_name)));
        match builder.build(spec, tag, &platforms, sink.as_mut(), cancel) {
            Ok(reference) => {
                if let Some(ref pb) = pb {
                    let verb = if request.push { "pushed" } else { "built" };
                    spin_ok(pb, &format!("{verb} {}", spec.image_name));
                }
                built.push((spec.image_name.clone(), reference));
            }
            Err(e) => {
                if let Some(ref pb) = pb {
                    spin_fail(pb, &format!("{} failed", spec.image_name));
                }
                if let Err(close_err) = builder.close() {
                    tracing::warn!("closing backend after failed build: {close_err}");
                }
                return Err(e.into());
            }
        }
    }
    builder.close()?;

    if json {
        let payload = serde_json::json!({
            "pushed": request.push,
            "artifacts": built.iter().map(|(image, reference)| serde_json::json!({
                "image": image,
                "reference": reference,
            })).collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for (_, reference) in &built {
            println!("{}", style_reference(reference));
        }
    }
    Ok(EXIT_SUCCESS)
}

use super::{json_pretty, spin_fail, spin_ok, spinner, style_reference, Failure, EXIT_SUCCESS};
use std::io;
use stevedore_runtime::{BuildBackend, CancelToken};

pub fn run(
    backend: &dyn BuildBackend,
    image_id: &str,
    image: &str,
    cancel: &CancelToken,
    json: bool,
) -> Result<u8, Failure> {
    let pb = (!json).then(|| spinner(&format!("pushing {image}...")));
    let result = backend.push(image_id, image, &mut io::sink(), cancel);
    let closed = backend.close();
    let reference = match result {
        Ok(r) => {
            if let Some(ref pb) = pb {
                spin_ok(pb, &format!("pushed {image}"));
            }
            r
        }
        Err(e) => {
            if let Some(ref pb) = pb {
                spin_fail(pb, "push failed");
            }
            return Err(e.into());
        }
    };
    closed?;

    if json {
        let payload = serde_json::json!({
            "image_id": image_id,
            "reference": reference.to_string(),
            "digest": reference.digest().to_string(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{}", style_reference(&reference.to_string()));
    }
    Ok(EXIT_SUCCESS)
}

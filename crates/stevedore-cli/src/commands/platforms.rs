use super::{json_pretty, Failure, EXIT_SUCCESS};
use stevedore_core::Builder;
use stevedore_schema::PlatformMatcher;

pub fn run(builder: &Builder, json: bool) -> Result<u8, Failure> {
    let matcher = builder.supported_platforms();
    builder.close()?;
    if json {
        let payload = match &matcher {
            PlatformMatcher::All => serde_json::json!({ "all": true, "platforms": [] }),
            PlatformMatcher::Only(list) => serde_json::json!({
                "all": false,
                "platforms": list.iter().map(ToString::to_string).collect::<Vec<_>>(),
            }),
        };
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{matcher}");
    }
    Ok(EXIT_SUCCESS)
}

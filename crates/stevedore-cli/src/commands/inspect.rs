use super::{json_pretty, Failure, EXIT_SUCCESS};
use stevedore_core::Builder;
use stevedore_schema::CanonicalImageConfig;

pub fn run(builder: &Builder, image: &str, json: bool) -> Result<u8, Failure> {
    let result = builder.get_image_config(image);
    builder.close()?;
    let config = result?;
    if json {
        println!("{}", json_pretty(&config)?);
    } else {
        print_summary(image, &config);
    }
    Ok(EXIT_SUCCESS)
}

fn print_summary(image: &str, config: &CanonicalImageConfig) {
    let platform = if config.variant.is_empty() {
        format!("{}/{}", config.os, config.architecture)
    } else {
        format!("{}/{}/{}", config.os, config.architecture, config.variant)
    };
    let or_none = |v: &[String]| {
        if v.is_empty() {
            "(none)".to_owned()
        } else {
            v.join(" ")
        }
    };

    println!("image:       {image}");
    println!("platform:    {platform}");
    println!("created:     {}", config.created.to_rfc3339());
    if !config.author.is_empty() {
        println!("author:      {}", config.author);
    }
    println!("entrypoint:  {}", or_none(&config.config.entrypoint));
    println!("cmd:         {}", or_none(&config.config.cmd));
    if !config.config.working_dir.is_empty() {
        println!("workdir:     {}", config.config.working_dir);
    }
    if !config.config.user.is_empty() {
        println!("user:        {}", config.config.user);
    }
    println!("layers:      {}", config.rootfs.layers.len());
    println!("history:     {}", config.history.len());
    for (key, value) in &config.config.labels {
        println!("label:       {key}={value}");
    }
}

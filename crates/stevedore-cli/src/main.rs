mod commands;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use commands::{Failure, EXIT_FAILURE};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use stevedore_core::{install_signal_handler, Builder, BuilderConfig};
use stevedore_runtime::{
    check_buildah_prereqs, format_missing, select_backend, BuildBackend, CancelToken, EngineConfig,
};

#[derive(Debug, Parser)]
#[command(
    name = "stevedore",
    version,
    about = "Build container images with buildah and report their canonical config"
)]
struct Cli {
    /// Engine config file (defaults to ~/.config/stevedore/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Build backend: buildah or mock.
    #[arg(long, env = "STEVEDORE_BACKEND", default_value = "buildah", global = true)]
    backend: String,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable verbose (debug) logging and show engine output.
    #[arg(short, long, default_value_t = false, global = true)]
    verbose: bool,

    /// Enable trace-level logging (more detailed than --verbose).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Build every artifact of a manifest, in order.
    Build {
        /// Path to the artifact manifest.
        #[arg(default_value = "stevedore.toml")]
        manifest: PathBuf,
        /// Extra tag applied to every built image.
        #[arg(long)]
        tag: Option<String>,
        /// Target platform as os/arch[/variant]; repeatable or comma-separated.
        #[arg(long = "platform", value_delimiter = ',')]
        platforms: Vec<String>,
        /// Build for every platform the base images provide.
        #[arg(long, default_value_t = false)]
        all_platforms: bool,
        /// Push each image after it is built.
        #[arg(long, default_value_t = false)]
        push: bool,
        /// Number of stages the engine may build in parallel.
        #[arg(long)]
        jobs: Option<u32>,
    },
    /// Push a locally built image.
    Push {
        /// Engine image id.
        image_id: String,
        /// Destination, optionally transport-qualified (docker://, oci:, ...).
        image: String,
    },
    /// Show the canonical config of an image, pulling it if missing.
    Inspect {
        /// Image reference.
        image: String,
    },
    /// List the platforms the builder can target.
    Platforms,
    /// Check the engine, config and store.
    Doctor,
    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse();

    let default_level = if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("STEVEDORE_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .init();

    let json_output = cli.json;
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::Doctor => commands::doctor::run(config_path, &cli.backend, json_output),
        Commands::Platforms => open_backend(&cli.backend, config_path).and_then(|backend| {
            let builder = Builder::new(backend, BuilderConfig::default());
            commands::platforms::run(&builder, json_output)
        }),
        Commands::Inspect { image } => open_backend(&cli.backend, config_path).and_then(|backend| {
            let builder = Builder::new(backend, BuilderConfig::default());
            commands::inspect::run(&builder, &image, json_output)
        }),
        Commands::Push { image_id, image } => {
            with_cancellation(&cli.backend, config_path, |backend, cancel| {
                commands::push::run(backend.as_ref(), &image_id, &image, cancel, json_output)
            })
        }
        Commands::Build {
            manifest,
            tag,
            platforms,
            all_platforms,
            push,
            jobs,
        } => with_cancellation(&cli.backend, config_path, |backend, cancel| {
            let request = commands::build::BuildRequest {
                manifest: &manifest,
                tag: tag.as_deref(),
                platforms: &platforms,
                all_platforms,
                push,
                jobs,
            };
            commands::build::run(backend, &request, cancel, cli.verbose, json_output)
        }),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(failure) => {
            eprintln!("error: {failure}");
            ExitCode::from(failure.code)
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Failure> {
    let config = match path {
        Some(p) => EngineConfig::load(p)?,
        None => EngineConfig::load_default()?,
    };
    Ok(config)
}

fn open_backend(name: &str, config_path: Option<&Path>) -> Result<Box<dyn BuildBackend>, Failure> {
    let config = load_config(config_path)?;
    if name == "buildah" && std::env::var("STEVEDORE_SKIP_PREREQS").as_deref() != Ok("1") {
        let missing = check_buildah_prereqs(&config);
        if !missing.is_empty() {
            return Err(Failure::new(EXIT_FAILURE, format_missing(&missing)));
        }
    }
    Ok(select_backend(name, &config)?)
}

/// Open the backend and route Ctrl-C to a fresh cancel token for `f`.
fn with_cancellation<F>(name: &str, config_path: Option<&Path>, f: F) -> Result<u8, Failure>
where
    F: FnOnce(Box<dyn BuildBackend>, &CancelToken) -> Result<u8, Failure>,
{
    let backend = open_backend(name, config_path)?;
    let cancel = CancelToken::new();
    install_signal_handler(cancel.clone())?;
    f(backend, &cancel)
}

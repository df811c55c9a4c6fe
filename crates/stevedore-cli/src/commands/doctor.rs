use super::{Failure, EXIT_FAILURE, EXIT_SUCCESS};
use std::path::{Path, PathBuf};
use stevedore_runtime::{check_buildah_prereqs, format_missing, EngineConfig};
use stevedore_store::{is_rootless, StoreLayout};

pub fn run(config_path: Option<&Path>, backend: &str, json_output: bool) -> Result<u8, Failure> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    let config = check_config(config_path, &mut checks, &mut all_pass);

    match backend {
        "buildah" => check_prereqs(&config, &mut checks, &mut all_pass),
        "mock" => checks.push(Check::info(
            "backend",
            "Mock backend selected, no engine prerequisites",
        )),
        other => {
            all_pass = false;
            checks.push(Check::fail(
                "backend",
                &format!("Unknown backend '{other}' (expected buildah or mock)"),
            ));
        }
    }

    check_store(&config, &mut checks, &mut all_pass);

    print_results(&checks, all_pass, json_output)
}

fn check_config(path: Option<&Path>, checks: &mut Vec<Check>, all_pass: &mut bool) -> EngineConfig {
    let path: Option<PathBuf> = path
        .map(Path::to_path_buf)
        .or_else(|| stevedore_runtime::config::default_config_path().ok());
    let Some(path) = path else {
        checks.push(Check::info(
            "config",
            "No config location (HOME unset), using defaults",
        ));
        return EngineConfig::default();
    };

    if !path.exists() {
        checks.push(Check::info(
            "config",
            &format!("No config at {}, using defaults", path.display()),
        ));
        return EngineConfig::default();
    }

    match EngineConfig::load(&path) {
        Ok(config) => {
            checks.push(Check::pass(
                "config",
                &format!("Config loaded from {}", path.display()),
            ));
            config
        }
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("config", &format!("Invalid config: {e}")));
            EngineConfig::default()
        }
    }
}

fn check_prereqs(config: &EngineConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let missing = check_buildah_prereqs(config);
    if missing.is_empty() {
        checks.push(Check::pass(
            "buildah_prereqs",
            &format!("{} and its prerequisites are available", config.buildah_bin),
        ));
    } else {
        *all_pass = false;
        checks.push(Check::fail(
            "buildah_prereqs",
            &format!("Missing prerequisites: {}", format_missing(&missing)),
        ));
    }

    if let Err(e) = stevedore_runtime::resolve_compression(&config.default_compression) {
        *all_pass = false;
        checks.push(Check::fail(
            "default_compression",
            &format!("Invalid default_compression: {e}"),
        ));
    }
}

fn check_store(config: &EngineConfig, checks: &mut Vec<Check>, all_pass: &mut bool) {
    let layout = match (&config.graph_root, &config.run_root) {
        (Some(graph), Some(run)) => Ok(StoreLayout::new(graph, run)),
        (graph, run) => StoreLayout::detect().map(|detected| {
            StoreLayout::new(
                graph.as_deref().unwrap_or(detected.graph_root()),
                run.as_deref().unwrap_or(detected.run_root()),
            )
        }),
    };

    let layout = match layout {
        Ok(l) => l,
        Err(e) => {
            *all_pass = false;
            checks.push(Check::fail("store", &format!("Cannot locate store: {e}")));
            return;
        }
    };

    let mode = if is_rootless() { "rootless" } else { "rootful" };
    checks.push(Check::info("store_mode", &format!("Running {mode}")));
    if layout.graph_root().exists() {
        checks.push(Check::pass(
            "graph_root",
            &format!("Graph root: {}", layout.graph_root().display()),
        ));
    } else {
        checks.push(Check::info(
            "graph_root",
            &format!(
                "Graph root {} not created yet (will be created on first build)",
                layout.graph_root().display()
            ),
        ));
    }
    checks.push(Check::info(
        "run_root",
        &format!("Run root: {}", layout.run_root().display()),
    ));
}

fn print_results(checks: &[Check], all_pass: bool, json_output: bool) -> Result<u8, Failure> {
    if json_output {
        let json = serde_json::json!({
            "healthy": all_pass,
            "checks": checks.iter().map(|c| serde_json::json!({
                "name": c.name,
                "status": c.status,
                "message": c.message,
            })).collect::<Vec<_>>(),
        });
        println!("{}", super::json_pretty(&json)?);
    } else {
        println!("Stevedore Doctor\n");
        for check in checks {
            let icon = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                _ => "ℹ",
            };
            println!("  {icon} {}", check.message);
        }
        println!();
        if all_pass {
            println!("All checks passed.");
        } else {
            println!("Some checks failed. See above for details.");
        }
    }
    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}

struct Check {
    name: String,
    status: &'static str,
    message: String,
}

impl Check {
    fn new(name: &str, status: &'static str, message: &str) -> Self {
        Self {
            name: name.to_owned(),
            status,
            message: message.to_owned(),
        }
    }

    fn pass(name: &str, message: &str) -> Self {
        Self::new(name, "pass", message)
    }

    fn fail(name: &str, message: &str) -> Self {
        Self::new(name, "fail", message)
    }

    fn info(name: &str, message: &str) -> Self {
        Self::new(name, "info", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_config_file_fails_check() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "no_such_key = true\n").unwrap();
        let mut checks = Vec::new();
        let mut all_pass = true;
        let config = check_config(Some(&path), &mut checks, &mut all_pass);
        assert!(!all_pass);
        assert_eq!(checks[0].status, "fail");
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn absent_config_file_is_informational() {
        let dir = tempfile::tempdir().unwrap();
        let mut checks = Vec::new();
        let mut all_pass = true;
        check_config(Some(&dir.path().join("missing.toml")), &mut checks, &mut all_pass);
        assert!(all_pass);
        assert_eq!(checks[0].status, "info");
    }

    #[test]
    fn store_overrides_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            EngineConfig::default().with_store(dir.path().join("graph"), dir.path().join("run"));
        let mut checks = Vec::new();
        let mut all_pass = true;
        check_store(&config, &mut checks, &mut all_pass);
        assert!(all_pass);
        let run_root = checks.iter().find(|c| c.name == "run_root").unwrap();
        assert!(run_root.message.contains("run"));
    }
}

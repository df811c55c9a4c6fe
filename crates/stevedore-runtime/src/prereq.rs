use crate::config::EngineConfig;
use std::fmt;
use std::path::Path;
use std::process::Command;

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: String,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn command_works(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn user_namespaces_work() -> bool {
    command_works("unshare", &["--user", "--map-root-user", "--fork", "true"])
}

/// Check everything the buildah backend needs on this host.
/// Returns an empty list when all prerequisites are met.
pub fn check_buildah_prereqs(config: &EngineConfig) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_works(&config.buildah_bin, &["--version"]) {
        missing.push(MissingPrereq {
            name: config.buildah_bin.clone(),
            purpose: "building and pushing container images",
            install_hint: "zypper install buildah | apt install buildah | dnf install buildah | pacman -S buildah",
        });
    }

    if stevedore_store::is_rootless() {
        if !user_namespaces_work() {
            missing.push(MissingPrereq {
                name: "user namespaces".to_owned(),
                purpose: "rootless builds",
                install_hint:
                    "enable CONFIG_USER_NS=y in kernel, or: sysctl kernel.unprivileged_userns_clone=1",
            });
        }
        if !Path::new("/etc/subuid").exists() {
            missing.push(MissingPrereq {
                name: "/etc/subuid".to_owned(),
                purpose: "subordinate uid ranges for rootless image layers",
                install_hint: "usermod --add-subuids 100000-165535 --add-subgids 100000-165535 $USER",
            });
        }
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nStevedore drives buildah to build images; install the items above and retry.");
    msg
}

pub mod build;
pub mod completions;
pub mod doctor;
pub mod inspect;
pub mod platforms;
pub mod push;

use indicatif::{ProgressBar, ProgressStyle};
use std::fmt;
use std::time::Duration;
use stevedore_core::{CoreError, ErrorKind};
use stevedore_runtime::RuntimeError;
use stevedore_schema::ManifestError;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_NOT_FOUND: u8 = 3;
pub const EXIT_ENGINE_ERROR: u8 = 4;
pub const EXIT_CONVERSION_ERROR: u8 = 5;

pub fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::Config => EXIT_CONFIG_ERROR,
        ErrorKind::NotFound => EXIT_NOT_FOUND,
        ErrorKind::Build | ErrorKind::Push | ErrorKind::Inspect => EXIT_ENGINE_ERROR,
        ErrorKind::Conversion => EXIT_CONVERSION_ERROR,
        ErrorKind::Cancelled | ErrorKind::Other => EXIT_FAILURE,
    }
}

/// A command failure: the message printed to stderr and the exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub code: u8,
    pub message: String,
}

impl Failure {
    pub fn new(code: u8, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(EXIT_FAILURE, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(EXIT_CONFIG_ERROR, message)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<CoreError> for Failure {
    fn from(e: CoreError) -> Self {
        Self::new(exit_code(e.kind()), e.to_string())
    }
}

impl From<RuntimeError> for Failure {
    fn from(e: RuntimeError) -> Self {
        CoreError::from(e).into()
    }
}

impl From<ManifestError> for Failure {
    fn from(e: ManifestError) -> Self {
        CoreError::from(e).into()
    }
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, Failure> {
    serde_json::to_string_pretty(value)
        .map_err(|e| Failure::other(format!("JSON serialization failed: {e}")))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

/// Dim the digest part of a `name@digest` reference.
pub fn style_reference(reference: &str) -> String {
    use console::Style;
    match reference.split_once('@') {
        Some((name, digest)) => format!(
            "{}@{}",
            Style::new().bold().apply_to(name),
            Style::new().dim().apply_to(digest)
        ),
        None => reference.to_owned(),
    }
}

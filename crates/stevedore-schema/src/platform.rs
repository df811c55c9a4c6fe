use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("invalid platform '{0}', expected '<os>/<arch>[/<variant>]'")]
    Invalid(String),
}

/// An (OS, architecture, variant) triple such as `linux/arm64/v8`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub variant: String,
}

impl Platform {
    pub fn new(os: &str, architecture: &str, variant: &str) -> Self {
        Self {
            os: os.to_owned(),
            architecture: architecture.to_owned(),
            variant: variant.to_owned(),
        }
    }
}

impl FromStr for Platform {
    type Err = PlatformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        let valid = |p: &&str| !p.is_empty() && !p.contains(char::is_whitespace);
        match parts.as_slice() {
            [os, arch] if valid(os) && valid(arch) => Ok(Self::new(os, arch, "")),
            [os, arch, variant] if valid(os) && valid(arch) && valid(variant) => {
                Ok(Self::new(os, arch, variant))
            }
            _ => Err(PlatformError::Invalid(s.to_owned())),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.variant.is_empty() {
            write!(f, "{}/{}", self.os, self.architecture)
        } else {
            write!(f, "{}/{}/{}", self.os, self.architecture, self.variant)
        }
    }
}

/// The platforms an orchestrator asks a build for.
///
/// When `all` is set the explicit triples are still carried, but it is up to
/// the backend to ignore them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformSet {
    platforms: Vec<Platform>,
    all: bool,
}

impl PlatformSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A set requesting every platform the base images provide.
    pub fn all() -> Self {
        Self {
            platforms: Vec::new(),
            all: true,
        }
    }

    #[must_use]
    pub fn with(mut self, platform: Platform) -> Self {
        self.insert(platform);
        self
    }

    /// Insert a platform, keeping first-seen order and dropping duplicates.
    pub fn insert(&mut self, platform: Platform) {
        if !self.platforms.contains(&platform) {
            self.platforms.push(platform);
        }
    }

    pub fn set_all(&mut self, all: bool) {
        self.all = all;
    }

    pub fn parse_list<S: AsRef<str>>(items: &[S]) -> Result<Self, PlatformError> {
        let mut set = Self::new();
        for item in items {
            // `--platform linux/amd64,linux/arm64` is accepted as well as repeated flags.
            for part in item.as_ref().split(',').filter(|p| !p.trim().is_empty()) {
                set.insert(part.parse()?);
            }
        }
        Ok(set)
    }

    pub fn platforms(&self) -> &[Platform] {
        &self.platforms
    }

    pub fn is_all(&self) -> bool {
        self.all
    }

    pub fn is_empty(&self) -> bool {
        !self.all && self.platforms.is_empty()
    }
}

/// The platforms a builder is able to target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformMatcher {
    All,
    Only(Vec<Platform>),
}

impl PlatformMatcher {
    pub fn matches(&self, platform: &Platform) -> bool {
        match self {
            Self::All => true,
            Self::Only(list) => list.contains(platform),
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

impl fmt::Display for PlatformMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("all"),
            Self::Only(list) => {
                let names: Vec<String> = list.iter().map(ToString::to_string).collect();
                f.write_str(&names.join(","))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_and_three_part_platforms() {
        let p: Platform = "linux/amd64".parse().unwrap();
        assert_eq!(p, Platform::new("linux", "amd64", ""));
        assert_eq!(p.to_string(), "linux/amd64");

        let p: Platform = "linux/arm64/v8".parse().unwrap();
        assert_eq!(p.variant, "v8");
        assert_eq!(p.to_string(), "linux/arm64/v8");
    }

    #[test]
    fn rejects_malformed_platforms() {
        for bad in ["linux", "linux/", "/amd64", "linux/arm/v7/extra", "linux/a md64", ""] {
            assert!(bad.parse::<Platform>().is_err(), "{bad} should not parse");
        }
    }

    #[test]
    fn set_deduplicates_in_order() {
        let set = PlatformSet::parse_list(&["linux/arm64,linux/amd64", "linux/arm64"]).unwrap();
        let names: Vec<String> = set.platforms().iter().map(ToString::to_string).collect();
        assert_eq!(names, vec!["linux/arm64", "linux/amd64"]);
        assert!(!set.is_all());
    }

    #[test]
    fn all_set_is_not_empty() {
        assert!(PlatformSet::new().is_empty());
        assert!(!PlatformSet::all().is_empty());
        assert!(PlatformSet::all().is_all());
    }

    #[test]
    fn matcher_all_matches_anything() {
        let p = Platform::new("windows", "amd64", "");
        assert!(PlatformMatcher::All.matches(&p));
        assert!(!PlatformMatcher::Only(vec![Platform::new("linux", "amd64", "")]).matches(&p));
        assert_eq!(PlatformMatcher::All.to_string(), "all");
    }
}

//! Image references: digest-qualified results of a build or push, and the
//! transport-qualified destinations a push is sent to.

use crate::digest::Digest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("empty image reference")]
    Empty,
    #[error("invalid image reference '{0}': contains whitespace")]
    Whitespace(String),
    #[error("invalid image reference '{reference}' for transport {transport}: {reason}")]
    Transport {
        reference: String,
        transport: String,
        reason: String,
    },
}

/// An image name pinned to a content digest. Immutable and resolvable anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalReference {
    name: String,
    digest: Digest,
}

impl CanonicalReference {
    pub fn new(name: impl Into<String>, digest: Digest) -> Self {
        Self {
            name: name.into(),
            digest,
        }
    }

    /// The image name without the digest, as requested by the caller.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }
}

impl fmt::Display for CanonicalReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.digest)
    }
}

/// Transports understood by the build engine's image-copy machinery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Docker,
    DockerDaemon,
    DockerArchive,
    ContainersStorage,
    Oci,
    OciArchive,
    Dir,
}

impl Transport {
    const ALL: [Transport; 7] = [
        Transport::Docker,
        Transport::DockerDaemon,
        Transport::DockerArchive,
        Transport::ContainersStorage,
        Transport::Oci,
        Transport::OciArchive,
        Transport::Dir,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Transport::Docker => "docker",
            Transport::DockerDaemon => "docker-daemon",
            Transport::DockerArchive => "docker-archive",
            Transport::ContainersStorage => "containers-storage",
            Transport::Oci => "oci",
            Transport::OciArchive => "oci-archive",
            Transport::Dir => "dir",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == prefix)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A push destination such as `docker://registry.example.com/app:1.0`.
///
/// A name without a recognised transport prefix is taken to be a registry
/// reference (`docker://`), so plain artifact image names can be pushed as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransportRef {
    transport: Transport,
    name: String,
}

impl TransportRef {
    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// The transport-specific part, e.g. `registry.example.com/app:1.0`.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for TransportRef {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(ReferenceError::Empty);
        }
        if s.contains(char::is_whitespace) {
            return Err(ReferenceError::Whitespace(s.to_owned()));
        }

        let (transport, name) = match s.split_once(':') {
            Some((prefix, rest)) => match Transport::from_prefix(prefix) {
                Some(Transport::Docker) => {
                    let Some(name) = rest.strip_prefix("//") else {
                        return Err(ReferenceError::Transport {
                            reference: s.to_owned(),
                            transport: Transport::Docker.to_string(),
                            reason: "reference does not start with '//'".to_owned(),
                        });
                    };
                    (Transport::Docker, name)
                }
                Some(t) => (t, rest),
                None => (Transport::Docker, s),
            },
            None => (Transport::Docker, s),
        };

        if name.is_empty() {
            return Err(ReferenceError::Transport {
                reference: s.to_owned(),
                transport: transport.to_string(),
                reason: "empty name".to_owned(),
            });
        }

        Ok(Self {
            transport,
            name: name.to_owned(),
        })
    }
}

impl fmt::Display for TransportRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.transport {
            Transport::Docker => write!(f, "docker://{}", self.name),
            t => write!(f, "{t}:{}", self.name),
        }
    }
}

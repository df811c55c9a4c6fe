use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DigestError {
    #[error("digest '{0}' is missing the '<algorithm>:' prefix")]
    MissingAlgorithm(String),
    #[error("digest '{0}' has an invalid algorithm")]
    InvalidAlgorithm(String),
    #[error("digest '{digest}' has an invalid encoded part: {reason}")]
    InvalidEncoding { digest: String, reason: String },
}

/// A content digest of the form `<algorithm>:<hex>`, e.g. `sha256:e3b0c4...`.
///
/// Parsing validates the algorithm component. The sha2 family requires a
/// lowercase hex encoding of the exact length; other algorithms accept any
/// encoding drawn from `[a-zA-Z0-9=_-]`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest {
    algorithm: String,
    encoded: String,
}

impl Digest {
    pub fn new(algorithm: &str, encoded: &str) -> Result<Self, DigestError> {
        format!("{algorithm}:{encoded}").parse()
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn encoded(&self) -> &str {
        &self.encoded
    }
}

fn expected_hex_len(algorithm: &str) -> Option<usize> {
    match algorithm {
        "sha256" => Some(64),
        "sha384" => Some(96),
        "sha512" => Some(128),
        _ => None,
    }
}

fn valid_algorithm(algorithm: &str) -> bool {
    // [a-z0-9]+([+._-][a-z0-9]+)*
    !algorithm.is_empty()
        && algorithm
            .split(['+', '.', '_', '-'])
            .all(|part| {
                !part.is_empty()
                    && part
                        .bytes()
                        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit())
            })
}

impl FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((algorithm, encoded)) = s.split_once(':') else {
            return Err(DigestError::MissingAlgorithm(s.to_owned()));
        };
        if !valid_algorithm(algorithm) {
            return Err(DigestError::InvalidAlgorithm(s.to_owned()));
        }
        if encoded.is_empty() {
            return Err(DigestError::InvalidEncoding {
                digest: s.to_owned(),
                reason: "empty".to_owned(),
            });
        }
        match expected_hex_len(algorithm) {
            Some(len) => {
                if !encoded
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
                {
                    return Err(DigestError::InvalidEncoding {
                        digest: s.to_owned(),
                        reason: "not lowercase hex".to_owned(),
                    });
                }
                if encoded.len() != len {
                    return Err(DigestError::InvalidEncoding {
                        digest: s.to_owned(),
                        reason: format!("expected {len} hex characters, got {}", encoded.len()),
                    });
                }
            }
            None => {
                if !encoded
                    .bytes()
                    .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'=' | b'_' | b'-'))
                {
                    return Err(DigestError::InvalidEncoding {
                        digest: s.to_owned(),
                        reason: "invalid character".to_owned(),
                    });
                }
            }
        }
        Ok(Self {
            algorithm: algorithm.to_owned(),
            encoded: encoded.to_owned(),
        })
    }
}

impl TryFrom<String> for Digest {
    type Error = DigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Digest> for String {
    fn from(d: Digest) -> Self {
        d.to_string()
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.encoded)
    }
}

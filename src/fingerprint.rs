//! Package fingerprints and subresource-integrity verification
//!
//! A fingerprint is the identity of one resolved package artifact. It is
//! computed strictly after resolution: an unresolved version range is a
//! caller bug, not something to guess at.

use crate::error::{PackratError, PackratResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Immutable identity of one resolved package artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageFingerprint {
    pub name: String,
    pub version: String,
    pub integrity: String,
    pub resolved_url: String,
}

impl PackageFingerprint {
    /// Compute a fingerprint for an exact, resolved package version
    pub fn compute(
        name: &str,
        version: &str,
        integrity: &str,
        resolved_url: &str,
    ) -> PackratResult<Self> {
        let invalid = |reason: &str| PackratError::InvalidPackageSpec {
            name: name.to_string(),
            version: version.to_string(),
            reason: reason.to_string(),
        };

        if name.trim().is_empty() {
            return Err(invalid("package name is empty"));
        }
        if semver::Version::parse(version).is_err() {
            return Err(invalid("version is not an exact resolved version"));
        }
        if integrity.trim().is_empty() {
            return Err(invalid("integrity hash is missing"));
        }

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            integrity: integrity.to_string(),
            resolved_url: resolved_url.to_string(),
        })
    }

    /// Stable cache key: hex SHA-256 of `name|version|integrity`
    pub fn key(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.name.as_bytes());
        hasher.update(b"|");
        hasher.update(self.version.as_bytes());
        hasher.update(b"|");
        hasher.update(self.integrity.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Two-character shard prefix bounding directory fan-out
    pub fn shard(&self) -> String {
        self.key()[..2].to_string()
    }

    /// `name@version`
    pub fn spec(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

impl fmt::Display for PackageFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// Digest algorithms that can appear in an SRI string, weakest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Algorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "sha1" => Some(Self::Sha1),
            "sha256" => Some(Self::Sha256),
            "sha384" => Some(Self::Sha384),
            "sha512" => Some(Self::Sha512),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
            Self::Sha384 => "sha384",
            Self::Sha512 => "sha512",
        }
    }
}

/// Parsed subresource-integrity value (`sha512-<base64>`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Integrity {
    pub algorithm: Algorithm,
    pub digest: Vec<u8>,
}

impl Integrity {
    /// Parse an SRI string; with several hashes the strongest one wins
    pub fn parse(sri: &str) -> PackratResult<Self> {
        sri.split_whitespace()
            .filter_map(|part| {
                let (algo, b64) = part.split_once('-')?;
                let algorithm = Algorithm::parse(algo)?;
                // Options after '?' are allowed by the SRI grammar
                let b64 = b64.split('?').next().unwrap_or(b64);
                let digest = BASE64.decode(b64).ok()?;
                Some(Self { algorithm, digest })
            })
            .max_by_key(|i| i.algorithm)
            .ok_or_else(|| PackratError::InvalidIntegrity(sri.to_string()))
    }

    /// Whether the stack can compute this digest
    pub fn is_verifiable(&self) -> bool {
        self.algorithm != Algorithm::Sha1
    }

    /// Digest a file with this integrity's algorithm and render it as SRI
    pub fn digest_file(&self, path: &Path) -> io::Result<String> {
        let file = File::open(path)?;
        let digest = match self.algorithm {
            Algorithm::Sha256 => stream_digest::<Sha256>(file)?,
            Algorithm::Sha384 => stream_digest::<Sha384>(file)?,
            Algorithm::Sha512 | Algorithm::Sha1 => stream_digest::<Sha512>(file)?,
        };
        Ok(format!("{}-{}", self.algorithm.as_str(), BASE64.encode(digest)))
    }

    /// Check a file against this integrity value
    ///
    /// Returns the computed SRI string on mismatch.
    pub fn verify_file(&self, path: &Path) -> io::Result<Result<(), String>> {
        if !self.is_verifiable() {
            debug!("sha1 integrity cannot be verified, accepting {}", path.display());
            return Ok(Ok(()));
        }
        let actual = self.digest_file(path)?;
        if actual == self.to_string() {
            Ok(Ok(()))
        } else {
            Ok(Err(actual))
        }
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.algorithm.as_str(), BASE64.encode(&self.digest))
    }
}

/// Incremental hasher that renders SRI strings; used while streaming downloads
pub enum IntegrityHasher {
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl IntegrityHasher {
    pub fn for_integrity(integrity: &Integrity) -> Option<Self> {
        match integrity.algorithm {
            Algorithm::Sha1 => None,
            Algorithm::Sha256 => Some(Self::Sha256(Sha256::new())),
            Algorithm::Sha384 => Some(Self::Sha384(Sha384::new())),
            Algorithm::Sha512 => Some(Self::Sha512(Sha512::new())),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Sha384(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    pub fn finish(self) -> String {
        let (algo, digest) = match self {
            Self::Sha256(h) => ("sha256", h.finalize().to_vec()),
            Self::Sha384(h) => ("sha384", h.finalize().to_vec()),
            Self::Sha512(h) => ("sha512", h.finalize().to_vec()),
        };
        format!("{}-{}", algo, BASE64.encode(digest))
    }
}

fn stream_digest<D: Digest>(mut reader: impl Read) -> io::Result<Vec<u8>> {
    let mut hasher = D::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_vec())
}

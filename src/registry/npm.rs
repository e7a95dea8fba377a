//! npm registry client

use crate::config::InstallConfig;
use crate::error::{PackratError, PackratResult};
use crate::fingerprint::{Integrity, IntegrityHasher, PackageFingerprint};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Package documents of popular packages run to tens of megabytes
const MAX_DOCUMENT_BYTES: u64 = 128 * 1024 * 1024;

/// Source of package tarballs on a cache miss
#[async_trait]
pub trait PackageFetcher: Send + Sync {
    /// Download the tarball for `fp` into `dest`; returns the byte count
    ///
    /// The bytes must match the fingerprint's integrity.
    async fn fetch(&self, fp: &PackageFingerprint, dest: &Path) -> PackratResult<u64>;
}

/// One hit from the registry search endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Latest published version of a package
#[derive(Debug, Clone)]
pub struct PublishedVersion {
    pub name: String,
    pub version: String,
    pub tarball: String,
    pub integrity: Option<String>,
}

/// HTTP client for an npm-compatible registry
#[derive(Clone)]
pub struct NpmRegistry {
    base_url: String,
    agent: ureq::Agent,
}

impl NpmRegistry {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn from_config(config: &InstallConfig) -> Self {
        Self::new(&config.registry, Duration::from_secs(config.fetch_timeout_secs))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Tarball URL: the lockfile's `resolved` value, or the registry's
    /// conventional `<name>/-/<basename>-<version>.tgz`
    pub fn tarball_url(&self, fp: &PackageFingerprint) -> String {
        if fp.resolved_url.starts_with("http://") || fp.resolved_url.starts_with("https://") {
            return fp.resolved_url.clone();
        }
        let basename = fp.name.rsplit('/').next().unwrap_or(&fp.name);
        format!("{}/{}/-/{}-{}.tgz", self.base_url, fp.name, basename, fp.version)
    }

    /// Search packages carrying `keyword`, filtered by `term`
    pub async fn search(&self, term: &str, keyword: &str) -> PackratResult<Vec<SearchHit>> {
        let text = if term.trim().is_empty() {
            format!("keywords:{}", keyword)
        } else {
            format!("keywords:{} {}", keyword, term.trim())
        };
        let url = format!(
            "{}/-/v1/search?text={}&size=25",
            self.base_url,
            encode_query(&text)
        );

        #[derive(Deserialize)]
        struct SearchResponse {
            objects: Vec<SearchObject>,
        }
        #[derive(Deserialize)]
        struct SearchObject {
            package: SearchHit,
        }

        let body = self.get_text(url.clone()).await?;
        let parsed: SearchResponse = serde_json::from_str(&body).map_err(|e| PackratError::Registry {
            url,
            reason: format!("unexpected search response: {}", e),
        })?;
        Ok(parsed.objects.into_iter().map(|o| o.package).collect())
    }

    /// Resolve the `latest` dist-tag of a package
    pub async fn latest(&self, name: &str) -> PackratResult<PublishedVersion> {
        #[derive(Deserialize)]
        struct Packument {
            #[serde(rename = "dist-tags", default)]
            dist_tags: BTreeMap<String, String>,
            #[serde(default)]
            versions: BTreeMap<String, VersionMeta>,
        }
        #[derive(Deserialize)]
        struct VersionMeta {
            dist: Dist,
        }
        #[derive(Deserialize)]
        struct Dist {
            tarball: String,
            integrity: Option<String>,
        }

        let url = format!("{}/{}", self.base_url, name.replace('/', "%2f"));
        let body = self.get_text(url.clone()).await?;
        let mut packument: Packument = serde_json::from_str(&body).map_err(|e| PackratError::Registry {
            url: url.clone(),
            reason: format!("unexpected package document: {}", e),
        })?;

        let version = packument
            .dist_tags
            .get("latest")
            .cloned()
            .ok_or_else(|| PackratError::Registry {
                url: url.clone(),
                reason: "no latest dist-tag".to_string(),
            })?;
        let meta = packument
            .versions
            .remove(&version)
            .ok_or_else(|| PackratError::Registry {
                url,
                reason: format!("latest version {} is not published", version),
            })?;

        Ok(PublishedVersion {
            name: name.to_string(),
            version,
            tarball: meta.dist.tarball,
            integrity: meta.dist.integrity,
        })
    }

    /// Download an arbitrary URL into `dest`, verifying `integrity` if given
    pub async fn download(&self, url: &str, integrity: Option<&str>, dest: &Path) -> PackratResult<u64> {
        let integrity = integrity.map(Integrity::parse).transpose()?;
        let agent = self.agent.clone();
        let url = url.to_string();
        let dest = dest.to_path_buf();

        tokio::task::spawn_blocking(move || download_blocking(&agent, &url, integrity.as_ref(), &dest))
            .await
            .map_err(|e| PackratError::Internal(format!("download task failed: {}", e)))?
    }

    async fn get_text(&self, url: String) -> PackratResult<String> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || {
            let mut response = agent.get(&url).call().map_err(|e| PackratError::Registry {
                url: url.clone(),
                reason: e.to_string(),
            })?;
            response
                .body_mut()
                .with_config()
                .limit(MAX_DOCUMENT_BYTES)
                .read_to_string()
                .map_err(|e| PackratError::Registry {
                    url,
                    reason: e.to_string(),
                })
        })
        .await
        .map_err(|e| PackratError::Internal(format!("registry task failed: {}", e)))?
    }
}

#[async_trait]
impl PackageFetcher for NpmRegistry {
    async fn fetch(&self, fp: &PackageFingerprint, dest: &Path) -> PackratResult<u64> {
        let url = self.tarball_url(fp);
        debug!("Fetching {} from {}", fp.spec(), url);
        self.download(&url, Some(&fp.integrity), dest)
            .await
            .map_err(|e| match e {
                PackratError::IntegrityMismatch { expected, actual, .. } => {
                    PackratError::IntegrityMismatch {
                        name: fp.spec(),
                        expected,
                        actual,
                    }
                }
                other => other,
            })
    }
}

/// Stream a response body to disk while hashing it
fn download_blocking(
    agent: &ureq::Agent,
    url: &str,
    integrity: Option<&Integrity>,
    dest: &Path,
) -> PackratResult<u64> {
    let registry_err = |reason: String| PackratError::Registry {
        url: url.to_string(),
        reason,
    };

    let response = agent.get(url).call().map_err(|e| registry_err(e.to_string()))?;
    let mut reader = response.into_body().into_reader();

    let file = File::create(dest).map_err(|e| PackratError::io(format!("creating {}", dest.display()), e))?;
    let mut writer = BufWriter::new(file);
    let mut hasher = integrity.and_then(IntegrityHasher::for_integrity);
    let mut buf = vec![0u8; 64 * 1024];
    let mut total = 0u64;

    let result = (|| {
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(registry_err(format!("reading body: {}", e))),
            };
            if let Some(h) = hasher.as_mut() {
                h.update(&buf[..n]);
            }
            writer
                .write_all(&buf[..n])
                .map_err(|e| PackratError::io(format!("writing {}", dest.display()), e))?;
            total += n as u64;
        }
        writer
            .flush()
            .map_err(|e| PackratError::io(format!("writing {}", dest.display()), e))?;
        Ok(())
    })();

    if let Err(e) = result {
        let _ = std::fs::remove_file(dest);
        return Err(e);
    }

    if let (Some(hasher), Some(expected)) = (hasher, integrity) {
        let actual = hasher.finish();
        if actual != expected.to_string() {
            let _ = std::fs::remove_file(dest);
            return Err(PackratError::IntegrityMismatch {
                name: url.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
    }
    Ok(total)
}

/// Minimal percent-encoding for a search query
fn encode_query(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for b in text.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b':' => out.push(b as char),
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Where `npm pack`-style downloads for plugins land
pub fn plugin_tarball_path(dir: &Path, name: &str, version: &str) -> PathBuf {
    dir.join(format!("{}-{}.tgz", name.replace('/', "-").trim_start_matches('@'), version))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> NpmRegistry {
        NpmRegistry::new("https://registry.example.com/", Duration::from_secs(5))
    }

    #[test]
    fn conventional_tarball_urls() {
        let r = registry();
        let plain = PackageFingerprint::compute("left-pad", "1.3.0", "sha512-x", "").unwrap();
        assert_eq!(
            r.tarball_url(&plain),
            "https://registry.example.com/left-pad/-/left-pad-1.3.0.tgz"
        );

        let scoped = PackageFingerprint::compute("@babel/core", "7.24.0", "sha512-x", "").unwrap();
        assert_eq!(
            r.tarball_url(&scoped),
            "https://registry.example.com/@babel/core/-/core-7.24.0.tgz"
        );
    }

    #[test]
    fn resolved_url_wins() {
        let fp = PackageFingerprint::compute(
            "lodash",
            "4.17.21",
            "sha512-x",
            "https://mirror.internal/lodash-4.17.21.tgz",
        )
        .unwrap();
        assert_eq!(registry().tarball_url(&fp), "https://mirror.internal/lodash-4.17.21.tgz");
    }

    #[test]
    fn query_encoding() {
        assert_eq!(encode_query("keywords:packrat-plugin slack"), "keywords:packrat-plugin+slack");
        assert_eq!(encode_query("a&b"), "a%26b");
    }

    #[test]
    fn plugin_tarball_names_are_flat() {
        let p = plugin_tarball_path(Path::new("/tmp"), "@acme/notify", "1.0.0");
        assert_eq!(p, PathBuf::from("/tmp/acme-notify-1.0.0.tgz"));
    }
}

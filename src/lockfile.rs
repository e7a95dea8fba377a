//! Lockfile detection, hashing and the resolved dependency set
//!
//! Version resolution happens upstream: the package manager already wrote
//! exact versions, tarball URLs and integrity hashes into the lockfile.
//! This module only reads them back.

use crate::config::PackageManager;
use crate::error::{PackratError, PackratResult};
use crate::fingerprint::PackageFingerprint;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Lockfile formats that can appear in a JavaScript project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockfileKind {
    /// npm (package-lock.json)
    PackageLock,
    /// npm (npm-shrinkwrap.json)
    Shrinkwrap,
    /// Yarn (yarn.lock)
    Yarn,
    /// pnpm (pnpm-lock.yaml)
    Pnpm,
    /// Bun (bun.lockb)
    Bun,
}

impl LockfileKind {
    /// File name in the project root
    pub fn file_name(&self) -> &'static str {
        match self {
            Self::PackageLock => "package-lock.json",
            Self::Shrinkwrap => "npm-shrinkwrap.json",
            Self::Yarn => "yarn.lock",
            Self::Pnpm => "pnpm-lock.yaml",
            Self::Bun => "bun.lockb",
        }
    }

    /// Package manager that wrote this lockfile
    pub fn package_manager(&self) -> PackageManager {
        match self {
            Self::PackageLock | Self::Shrinkwrap => PackageManager::Npm,
            Self::Yarn => PackageManager::Yarn,
            Self::Pnpm => PackageManager::Pnpm,
            Self::Bun => PackageManager::Bun,
        }
    }

    /// Whether packrat can read the resolved set directly
    pub fn is_readable(&self) -> bool {
        matches!(self, Self::PackageLock | Self::Shrinkwrap)
    }

    /// All kinds in detection priority order
    fn all() -> &'static [Self] {
        &[
            Self::Shrinkwrap,
            Self::PackageLock,
            Self::Yarn,
            Self::Pnpm,
            Self::Bun,
        ]
    }
}

impl fmt::Display for LockfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

/// Information about a detected lockfile
#[derive(Debug, Clone)]
pub struct LockfileInfo {
    /// The format of this lockfile
    pub kind: LockfileKind,
    /// Path to the lockfile
    pub path: PathBuf,
    /// SHA256 hash of the lockfile contents (full hex)
    pub hash: String,
}

/// Hash a lockfile's contents using SHA256
fn hash_file_contents(path: &Path) -> PackratResult<String> {
    let contents = fs::read(path).map_err(|e| PackratError::Io {
        context: format!("reading lockfile {}", path.display()),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    hasher.update(&contents);
    Ok(hex::encode(hasher.finalize()))
}

/// Detect the project's lockfile
///
/// `npm-shrinkwrap.json` takes precedence over `package-lock.json`, as it
/// does for npm itself.
pub fn detect_lockfile(project_dir: &Path) -> PackratResult<LockfileInfo> {
    for kind in LockfileKind::all() {
        let path = project_dir.join(kind.file_name());
        if path.is_file() {
            debug!("Found {} lockfile: {}", kind.package_manager(), path.display());
            let hash = hash_file_contents(&path)?;
            return Ok(LockfileInfo {
                kind: *kind,
                path,
                hash,
            });
        }
    }

    Err(PackratError::LockfileNotFound(project_dir.to_path_buf()))
}

/// Hash identifying the project's resolved dependency set
pub fn manifest_hash(project_dir: &Path) -> PackratResult<String> {
    detect_lockfile(project_dir).map(|info| info.hash)
}

/// One package from the resolved dependency set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub integrity: String,
    pub resolved_url: String,
    /// Install location relative to the project root (`node_modules/a/node_modules/b`)
    pub install_path: PathBuf,
    /// Names of runtime dependencies
    pub dependencies: Vec<String>,
    /// Whether the lockfile marks the package as having install scripts
    pub has_install_script: bool,
}

impl ResolvedPackage {
    /// Fingerprint for this package; fails for unresolved versions
    pub fn fingerprint(&self) -> PackratResult<PackageFingerprint> {
        PackageFingerprint::compute(&self.name, &self.version, &self.integrity, &self.resolved_url)
    }
}

/// The full resolved set read from a lockfile
#[derive(Debug, Clone)]
pub struct ResolvedSet {
    pub lockfile: LockfileInfo,
    pub packages: Vec<ResolvedPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PackageLock {
    #[serde(default)]
    lockfile_version: u32,
    #[serde(default)]
    packages: BTreeMap<String, LockEntry>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockEntry {
    name: Option<String>,
    version: Option<String>,
    resolved: Option<String>,
    integrity: Option<String>,
    #[serde(default)]
    link: bool,
    #[serde(default)]
    dependencies: BTreeMap<String, String>,
    #[serde(default)]
    optional_dependencies: BTreeMap<String, String>,
    #[serde(default)]
    has_install_script: bool,
}

/// Read the resolved dependency set from the project's lockfile
pub fn resolve_packages(project_dir: &Path) -> PackratResult<ResolvedSet> {
    let lockfile = detect_lockfile(project_dir)?;
    if !lockfile.kind.is_readable() {
        return Err(PackratError::UnsupportedLockfile(lockfile.path));
    }

    let content = fs::read_to_string(&lockfile.path)
        .map_err(|e| PackratError::io(format!("reading {}", lockfile.path.display()), e))?;
    let packages = parse_package_lock(&content)?;

    debug!(
        "Resolved {} packages from {}",
        packages.len(),
        lockfile.path.display()
    );
    Ok(ResolvedSet { lockfile, packages })
}

/// Parse the `packages` map of a v2/v3 package-lock
pub fn parse_package_lock(content: &str) -> PackratResult<Vec<ResolvedPackage>> {
    let lock: PackageLock = serde_json::from_str(content)
        .map_err(|e| PackratError::Resolution(format!("invalid package-lock.json: {}", e)))?;

    if lock.lockfile_version < 2 {
        return Err(PackratError::Resolution(format!(
            "lockfileVersion {} has no packages map; regenerate with npm 7 or newer",
            lock.lockfile_version
        )));
    }

    let mut packages = Vec::new();
    let mut problems = Vec::new();

    for (path, entry) in lock.packages {
        // "" is the root project; entries outside node_modules are workspaces
        if path.is_empty() || !path.starts_with("node_modules/") || entry.link {
            continue;
        }

        let name = entry
            .name
            .clone()
            .unwrap_or_else(|| package_name_from_path(&path).to_string());

        let (Some(version), Some(integrity)) = (entry.version, entry.integrity) else {
            problems.push(format!("{} is missing version or integrity", path));
            continue;
        };

        let resolved_url = entry.resolved.unwrap_or_default();
        let mut dependencies: Vec<String> = entry
            .dependencies
            .into_keys()
            .chain(entry.optional_dependencies.into_keys())
            .collect();
        dependencies.sort();
        dependencies.dedup();

        packages.push(ResolvedPackage {
            name,
            version,
            integrity,
            resolved_url,
            install_path: PathBuf::from(&path),
            dependencies,
            has_install_script: entry.has_install_script,
        });
    }

    if !problems.is_empty() {
        return Err(PackratError::Resolution(problems.join("; ")));
    }

    packages.sort_by(|a, b| a.install_path.cmp(&b.install_path));
    Ok(packages)
}

/// Package name from its install path (`node_modules/@scope/name` -> `@scope/name`)
fn package_name_from_path(path: &str) -> &str {
    match path.rfind("node_modules/") {
        Some(idx) => &path[idx + "node_modules/".len()..],
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const LOCK: &str = r#"{
      "name": "demo",
      "lockfileVersion": 3,
      "packages": {
        "": { "name": "demo", "dependencies": { "lodash": "^4.17.21" } },
        "node_modules/lodash": {
          "version": "4.17.21",
          "resolved": "https://registry.npmjs.org/lodash/-/lodash-4.17.21.tgz",
          "integrity": "sha512-lodash"
        },
        "node_modules/@scope/util": {
          "version": "1.0.0",
          "resolved": "https://registry.npmjs.org/@scope/util/-/util-1.0.0.tgz",
          "integrity": "sha512-util",
          "dependencies": { "lodash": "^4.0.0" },
          "hasInstallScript": true
        },
        "node_modules/local-thing": { "resolved": "packages/thing", "link": true }
      }
    }"#;

    #[test]
    fn hash_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.lock");
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(b"test content").unwrap();

        let hash1 = hash_file_contents(&path).unwrap();
        let hash2 = hash_file_contents(&path).unwrap();

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn hash_different_content() {
        let dir = TempDir::new().unwrap();

        let path1 = dir.path().join("test1.lock");
        fs::write(&path1, b"content 1").unwrap();

        let path2 = dir.path().join("test2.lock");
        fs::write(&path2, b"content 2").unwrap();

        assert_ne!(
            hash_file_contents(&path1).unwrap(),
            hash_file_contents(&path2).unwrap()
        );
    }

    #[test]
    fn detect_npm_lockfile() {
        let dir = TempDir::new().unwrap();
        let lockfile = dir.path().join("package-lock.json");
        fs::write(&lockfile, r#"{"name": "test"}"#).unwrap();

        let info = detect_lockfile(dir.path()).unwrap();

        assert_eq!(info.kind, LockfileKind::PackageLock);
        assert_eq!(info.path, lockfile);
    }

    #[test]
    fn shrinkwrap_takes_precedence() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("package-lock.json"), "{}").unwrap();
        fs::write(dir.path().join("npm-shrinkwrap.json"), "{}").unwrap();

        let info = detect_lockfile(dir.path()).unwrap();
        assert_eq!(info.kind, LockfileKind::Shrinkwrap);
    }

    #[test]
    fn detect_empty_dir() {
        let dir = TempDir::new().unwrap();
        let err = detect_lockfile(dir.path()).unwrap_err();
        assert!(matches!(err, PackratError::LockfileNotFound(_)));
    }

    #[test]
    fn yarn_lock_is_unsupported_for_direct_reads() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("yarn.lock"), "# yarn lockfile v1\n").unwrap();

        let err = resolve_packages(dir.path()).unwrap_err();
        assert!(matches!(err, PackratError::UnsupportedLockfile(_)));
        assert_eq!(LockfileKind::Yarn.package_manager(), PackageManager::Yarn);
    }

    #[test]
    fn parse_packages_map() {
        let packages = parse_package_lock(LOCK).unwrap();

        assert_eq!(packages.len(), 2);
        // sorted by install path
        assert_eq!(packages[0].name, "@scope/util");
        assert_eq!(packages[0].dependencies, vec!["lodash".to_string()]);
        assert!(packages[0].has_install_script);
        assert_eq!(packages[1].name, "lodash");
        assert_eq!(packages[1].install_path, PathBuf::from("node_modules/lodash"));
    }

    #[test]
    fn nested_install_paths_keep_leaf_name() {
        assert_eq!(package_name_from_path("node_modules/a/node_modules/b"), "b");
        assert_eq!(package_name_from_path("node_modules/@s/x"), "@s/x");
    }

    #[test]
    fn missing_integrity_is_a_resolution_error() {
        let lock = r#"{"lockfileVersion": 3, "packages": {
            "node_modules/x": { "version": "1.0.0" }
        }}"#;
        let err = parse_package_lock(lock).unwrap_err();
        assert!(matches!(err, PackratError::Resolution(_)));
    }

    #[test]
    fn v1_lockfile_rejected() {
        let err = parse_package_lock(r#"{"lockfileVersion": 1, "dependencies": {}}"#).unwrap_err();
        assert!(matches!(err, PackratError::Resolution(_)));
    }
}

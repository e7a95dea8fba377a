//! Lifecycle scripts and executable links
//!
//! Extraction is order-free, but `preinstall`/`install`/`postinstall` may
//! require their dependencies on disk and built, so scripts run one package
//! at a time in dependency order.

use crate::error::{PackratError, PackratResult};
use crate::lockfile::ResolvedPackage;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Scripts npm runs on install, in order
pub const LIFECYCLE_EVENTS: [&str; 3] = ["preinstall", "install", "postinstall"];

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    scripts: BTreeMap<String, String>,
    #[serde(default)]
    bin: Option<BinField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BinField {
    Single(String),
    Map(BTreeMap<String, String>),
}

/// Indices of `packages` in an order where dependencies come first
///
/// Kahn's algorithm over the nested-`node_modules` resolution of each
/// package's dependencies. Ties and cycles are broken by install-path
/// order, so the result is deterministic.
pub fn lifecycle_order(packages: &[ResolvedPackage]) -> Vec<usize> {
    let by_path: HashMap<&Path, usize> = packages
        .iter()
        .enumerate()
        .map(|(i, p)| (p.install_path.as_path(), i))
        .collect();

    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); packages.len()];
    let mut in_degree = vec![0usize; packages.len()];
    for (idx, pkg) in packages.iter().enumerate() {
        let deps: BTreeSet<usize> = pkg
            .dependencies
            .iter()
            .filter_map(|dep| resolve_dependency(&pkg.install_path, dep, &by_path))
            .filter(|&d| d != idx)
            .collect();
        for dep in deps {
            dependents[dep].push(idx);
            in_degree[idx] += 1;
        }
    }

    // Ordering key is install path, so keep (path, index) in the ready set
    let key = |i: usize| (packages[i].install_path.clone(), i);
    let mut ready: BTreeSet<(PathBuf, usize)> = (0..packages.len())
        .filter(|&i| in_degree[i] == 0)
        .map(key)
        .collect();
    let mut done = vec![false; packages.len()];
    let mut order = Vec::with_capacity(packages.len());

    while order.len() < packages.len() {
        let next = match ready.pop_first() {
            Some((_, i)) => i,
            None => {
                // Cycle: release the first remaining package by path
                let Some(i) = (0..packages.len())
                    .filter(|&i| !done[i])
                    .min_by(|&a, &b| packages[a].install_path.cmp(&packages[b].install_path))
                else {
                    break;
                };
                debug!("Breaking dependency cycle at {}", packages[i].install_path.display());
                i
            }
        };
        if done[next] {
            continue;
        }
        done[next] = true;
        order.push(next);

        for &d in &dependents[next] {
            if done[d] {
                continue;
            }
            in_degree[d] = in_degree[d].saturating_sub(1);
            if in_degree[d] == 0 {
                ready.insert(key(d));
            }
        }
    }
    order
}

/// Node's lookup: the nearest `node_modules/<dep>` walking up from the
/// dependent's own directory
fn resolve_dependency(from: &Path, dep: &str, by_path: &HashMap<&Path, usize>) -> Option<usize> {
    from.ancestors()
        .map(|dir| dir.join("node_modules").join(dep))
        .find_map(|candidate| by_path.get(candidate.as_path()).copied())
}

fn read_package_json(dir: &Path) -> PackageJson {
    std::fs::read(dir.join("package.json"))
        .ok()
        .and_then(|b| serde_json::from_slice(&b).ok())
        .unwrap_or_default()
}

/// Run the install lifecycle scripts of one package
///
/// Returns how many scripts ran. The first failing script stops the rest.
pub async fn run_lifecycle_scripts(project: &Path, modules_dir: &str, pkg: &ResolvedPackage) -> PackratResult<usize> {
    let dir = project.join(&pkg.install_path);
    let manifest = read_package_json(&dir);

    let mut ran = 0;
    for event in LIFECYCLE_EVENTS {
        let Some(script) = manifest.scripts.get(event) else {
            continue;
        };
        info!("Running {} script of {}@{}", event, pkg.name, pkg.version);

        let bin_dir = project.join(modules_dir).join(".bin");
        let path = match std::env::var_os("PATH") {
            Some(existing) => {
                let mut paths = vec![bin_dir];
                paths.extend(std::env::split_paths(&existing));
                std::env::join_paths(paths).unwrap_or(existing)
            }
            None => bin_dir.into_os_string(),
        };

        let status = Command::new("sh")
            .arg("-c")
            .arg(script)
            .current_dir(&dir)
            .env("PATH", path)
            .env("npm_lifecycle_event", event)
            .env("npm_package_name", &pkg.name)
            .env("npm_package_version", &pkg.version)
            .env("INIT_CWD", project)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| PackratError::command_failed(script.clone(), e))?;

        if !status.success() {
            return Err(PackratError::LifecycleScript {
                package: format!("{}@{}", pkg.name, pkg.version),
                script: event.to_string(),
                code: status.code().unwrap_or(-1),
            });
        }
        ran += 1;
    }
    Ok(ran)
}

/// Link a package's executables into the `.bin` of the `node_modules` that
/// contains it
pub fn link_bins(project: &Path, pkg: &ResolvedPackage) -> PackratResult<usize> {
    let dir = project.join(&pkg.install_path);
    let bins: BTreeMap<String, String> = match read_package_json(&dir).bin {
        None => return Ok(0),
        Some(BinField::Single(target)) => {
            let name = pkg.name.rsplit('/').next().unwrap_or(&pkg.name).to_string();
            BTreeMap::from([(name, target)])
        }
        Some(BinField::Map(map)) => map,
    };

    // node_modules/@scope/name -> node_modules
    let depth = pkg.name.split('/').count();
    let Some(modules) = pkg.install_path.ancestors().nth(depth) else {
        return Ok(0);
    };
    let bin_dir = project.join(modules).join(".bin");
    std::fs::create_dir_all(&bin_dir)
        .map_err(|e| PackratError::io(format!("creating {}", bin_dir.display()), e))?;

    let mut linked = 0;
    for (name, target) in bins {
        if name.contains('/') || name.contains("..") {
            warn!("Ignoring suspicious bin name {} in {}", name, pkg.name);
            continue;
        }
        let link = bin_dir.join(&name);
        let relative = Path::new("..").join(&pkg.name).join(target.trim_start_matches("./"));
        let _ = std::fs::remove_file(&link);
        link_executable(&relative, &link, &dir.join(target.trim_start_matches("./")))?;
        linked += 1;
    }
    Ok(linked)
}

#[cfg(unix)]
fn link_executable(relative: &Path, link: &Path, target: &Path) -> PackratResult<()> {
    use std::os::unix::fs::PermissionsExt;
    std::os::unix::fs::symlink(relative, link)
        .map_err(|e| PackratError::io(format!("linking {}", link.display()), e))?;
    if let Ok(meta) = std::fs::metadata(target) {
        let mut perms = meta.permissions();
        perms.set_mode(perms.mode() | 0o111);
        let _ = std::fs::set_permissions(target, perms);
    }
    Ok(())
}

#[cfg(not(unix))]
fn link_executable(_relative: &Path, link: &Path, target: &Path) -> PackratResult<()> {
    std::fs::copy(target, link)
        .map(|_| ())
        .map_err(|e| PackratError::io(format!("copying {}", link.display()), e))
}

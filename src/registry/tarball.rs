//! npm package tarball extraction

use crate::error::{PackratError, PackratResult};
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, EntryType};
use tracing::debug;

/// Nested dependencies live here; extraction never replaces it
const NESTED_MODULES: &str = "node_modules";

/// Extract a package tarball into `target`, replacing the previous content
///
/// The leading `package/` directory is stripped. Entries that would land
/// outside `target` are refused. Files are unpacked into a sibling staging
/// directory and moved into place only once the whole archive is read, so a
/// failed extraction leaves the previous content untouched. An existing
/// `node_modules/` under `target` (nested dependencies) is kept.
pub fn extract_tarball(archive: &Path, target: &Path) -> PackratResult<u64> {
    let extract_err = |reason: String| PackratError::Extract {
        path: archive.to_path_buf(),
        reason,
    };

    let parent = target
        .parent()
        .ok_or_else(|| extract_err(format!("{} has no parent directory", target.display())))?;
    fs::create_dir_all(parent)
        .map_err(|e| PackratError::io(format!("creating {}", parent.display()), e))?;

    let staging = staging_dir(target);
    fs::create_dir_all(&staging)
        .map_err(|e| PackratError::io(format!("creating {}", staging.display()), e))?;

    let unpacked = match unpack_into(archive, &staging) {
        Ok(n) => n,
        Err(e) => {
            let _ = fs::remove_dir_all(&staging);
            return Err(match e {
                UnpackError::Io(context, source) => PackratError::io(context, source),
                UnpackError::Invalid(reason) => extract_err(reason),
            });
        }
    };

    if let Err(e) = swap_into_place(&staging, target) {
        let _ = fs::remove_dir_all(&staging);
        return Err(PackratError::io(format!("moving package into {}", target.display()), e));
    }

    debug!("Extracted {} entries into {}", unpacked, target.display());
    Ok(unpacked)
}

enum UnpackError {
    Io(String, io::Error),
    Invalid(String),
}

fn unpack_into(archive: &Path, staging: &Path) -> Result<u64, UnpackError> {
    let file = File::open(archive)
        .map_err(|e| UnpackError::Io(format!("opening {}", archive.display()), e))?;
    let mut tar = Archive::new(GzDecoder::new(BufReader::new(file)));

    let mut count = 0;
    let entries = tar
        .entries()
        .map_err(|e| UnpackError::Invalid(format!("not a gzip tarball: {}", e)))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| UnpackError::Invalid(format!("corrupt entry: {}", e)))?;
        let kind = entry.header().entry_type();
        if !matches!(
            kind,
            EntryType::Regular | EntryType::Directory | EntryType::Symlink | EntryType::Continuous
        ) {
            continue;
        }

        let raw = entry
            .path()
            .map_err(|e| UnpackError::Invalid(format!("bad entry path: {}", e)))?
            .into_owned();
        let Some(relative) = strip_package_root(&raw)? else {
            continue;
        };
        let dest = staging.join(&relative);

        if kind == EntryType::Directory {
            fs::create_dir_all(&dest)
                .map_err(|e| UnpackError::Io(format!("creating {}", dest.display()), e))?;
            continue;
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| UnpackError::Io(format!("creating {}", parent.display()), e))?;
        }
        if kind == EntryType::Symlink {
            check_link_target(&relative, entry.link_name().ok().flatten().as_deref())?;
        }

        entry
            .unpack(&dest)
            .map_err(|e| UnpackError::Io(format!("writing {}", dest.display()), e))?;
        #[cfg(unix)]
        {
            if kind != EntryType::Symlink {
                ensure_readable(&dest)
                    .map_err(|e| UnpackError::Io(format!("chmod {}", dest.display()), e))?;
            }
        }
        count += 1;
    }
    Ok(count)
}

/// Drop the first path component and refuse anything that is not a plain
/// relative path
fn strip_package_root(raw: &Path) -> Result<Option<PathBuf>, UnpackError> {
    let mut components = raw.components();
    match components.next() {
        Some(Component::Normal(_)) => {}
        Some(Component::CurDir) => return strip_package_root(components.as_path()),
        None => return Ok(None),
        Some(_) => {
            return Err(UnpackError::Invalid(format!(
                "entry {} escapes the package",
                raw.display()
            )))
        }
    }

    let mut out = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => {
                return Err(UnpackError::Invalid(format!(
                    "entry {} escapes the package",
                    raw.display()
                )))
            }
        }
    }
    Ok(if out.as_os_str().is_empty() { None } else { Some(out) })
}

/// A symlink may point anywhere inside the package, never above it
fn check_link_target(entry: &Path, link: Option<&Path>) -> Result<(), UnpackError> {
    let Some(link) = link else {
        return Err(UnpackError::Invalid(format!("symlink {} has no target", entry.display())));
    };
    if link.is_absolute() {
        return Err(UnpackError::Invalid(format!(
            "symlink {} points to absolute path {}",
            entry.display(),
            link.display()
        )));
    }

    let mut depth = entry.components().count() as i64 - 1;
    for component in link.components() {
        match component {
            Component::ParentDir => depth -= 1,
            Component::Normal(_) => depth += 1,
            _ => {}
        }
        if depth < 0 {
            return Err(UnpackError::Invalid(format!(
                "symlink {} escapes the package",
                entry.display()
            )));
        }
    }
    Ok(())
}

/// Some published tarballs carry modes like 0o000; make files usable
#[cfg(unix)]
fn ensure_readable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut perms = fs::metadata(path)?.permissions();
    let mode = perms.mode();
    if mode & 0o644 != 0o644 {
        perms.set_mode(mode | 0o644);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

fn staging_dir(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{}.packrat-tmp-{}", name, uuid::Uuid::new_v4()))
}

fn swap_into_place(staging: &Path, target: &Path) -> io::Result<()> {
    match fs::symlink_metadata(target) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
        Ok(meta) if !meta.is_dir() => fs::remove_file(target)?,
        Ok(_) => return merge_into(staging, target),
    }

    match fs::rename(staging, target) {
        Ok(()) => Ok(()),
        // A nested dependency created the directory first
        Err(_) if target.is_dir() => merge_into(staging, target),
        Err(e) => Err(e),
    }
}

/// Replace everything in `target` except its nested `node_modules`
fn merge_into(staging: &Path, target: &Path) -> io::Result<()> {
    for entry in fs::read_dir(target)? {
        let entry = entry?;
        if entry.file_name() == NESTED_MODULES {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            fs::remove_dir_all(&path)?;
        } else {
            fs::remove_file(&path)?;
        }
    }

    for entry in fs::read_dir(staging)? {
        let entry = entry?;
        let dest = target.join(entry.file_name());
        if entry.file_name() == NESTED_MODULES && dest.exists() {
            continue;
        }
        fs::rename(entry.path(), &dest)?;
    }
    fs::remove_dir_all(staging)
}

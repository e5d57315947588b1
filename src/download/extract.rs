//! Archive extraction for fetched release assets
//!
//! Handles gzip-compressed tar archives (with the conventional top-level
//! wrapper directory stripped) and zip archives.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use log::trace;
use tar::{Archive, EntryType};

use crate::error::{FetchError, IoContext, Result};

/// Suffix that selects the strip-and-replay tar path.
pub const TAR_GZ_SUFFIX: &str = ".tar.gz";

/// Strip the wrapper segment from a raw tar entry name.
///
/// `pkg-v1/bin/tool` becomes `bin/tool`. Returns `None` for the wrapper
/// directory itself. A top-level entry without a separator is kept as-is,
/// unless it is a directory.
fn strip_wrapper(raw: &str, is_dir: bool) -> Option<&str> {
    match raw.split_once('/') {
        Some((_, rest)) if rest.trim_end_matches('/').is_empty() => None,
        Some((_, rest)) => Some(rest),
        None if is_dir => None,
        None => Some(raw),
    }
}

/// Join a relative archive path onto `dest`, rejecting anything that escapes it.
fn safe_join(dest: &Path, relative: &str, archive: &Path) -> Result<PathBuf> {
    let mut target = dest.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => target.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(FetchError::Archive {
                    path: archive.to_path_buf(),
                    reason: format!("entry {relative} escapes the destination"),
                });
            }
        }
    }
    Ok(target)
}

/// Reject a symlink target that is absolute or climbs above `dest`, given the
/// link's own stripped path.
fn check_link_target(relative: &str, link: &Path, archive: &Path) -> Result<()> {
    let escape = || FetchError::Archive {
        path: archive.to_path_buf(),
        reason: format!("symlink {relative} -> {} escapes the destination", link.display()),
    };

    let mut depth = Path::new(relative)
        .components()
        .filter(|c| matches!(c, Component::Normal(_)))
        .count()
        .saturating_sub(1);
    for component in link.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::ParentDir => depth = depth.checked_sub(1).ok_or_else(escape)?,
            Component::RootDir | Component::Prefix(_) => return Err(escape()),
        }
    }
    Ok(())
}

/// Fail if an existing component of `target` below `dest` is a symlink, so
/// no entry is ever written through a link. `include_last` also checks the
/// final component.
fn reject_symlinked_path(
    dest: &Path,
    target: &Path,
    include_last: bool,
    archive: &Path,
) -> Result<()> {
    let Ok(relative) = target.strip_prefix(dest) else {
        return Ok(());
    };
    let components: Vec<_> = relative.components().collect();
    let checked = if include_last {
        components.len()
    } else {
        components.len().saturating_sub(1)
    };

    let mut current = dest.to_path_buf();
    for component in &components[..checked] {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(FetchError::Archive {
                    path: archive.to_path_buf(),
                    reason: format!(
                        "entry {} would be written through symlink {}",
                        target.display(),
                        current.display()
                    ),
                });
            }
            Ok(_) => {}
            // Nothing below a missing component can be a link yet.
            Err(_) => break,
        }
    }
    Ok(())
}

fn archive_err(archive: &Path, what: &str, e: impl std::fmt::Display) -> FetchError {
    FetchError::Archive {
        path: archive.to_path_buf(),
        reason: format!("{what}: {e}"),
    }
}

#[cfg(unix)]
fn create_dir_with_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(mode).create(path)
}

#[cfg(not(unix))]
fn create_dir_with_mode(path: &Path, _mode: u32) -> io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(unix)]
fn create_file_with_mode(path: &Path, mode: u32) -> io::Result<File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(mode)
        .open(path)
}

#[cfg(not(unix))]
fn create_file_with_mode(path: &Path, _mode: u32) -> io::Result<File> {
    OpenOptions::new().create(true).write(true).truncate(true).open(path)
}

#[cfg(unix)]
fn create_symlink(link_target: &Path, path: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(link_target, path)
}

#[cfg(windows)]
fn create_symlink(link_target: &Path, path: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(link_target, path)
}

/// Extract a `.tar.gz` archive into `dest`, stripping the top-level directory.
///
/// Directories and regular files keep their recorded permission bits. A
/// symlink that already exists is left alone. Symlinks pointing outside `dest`
/// and entries that would be written through a symlink are rejected.
/// Extraction stops at the first
/// error and does not roll back entries already written.
///
/// Returns the number of entries written.
pub fn extract_tar_gz_stripped(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path)
        .io_context(|| format!("failed to open downloaded file {}", archive_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    let entries = archive
        .entries()
        .map_err(|e| archive_err(archive_path, "failed to read tar header", e))?;

    let mut written = 0;
    for entry in entries {
        let mut entry = entry.map_err(|e| archive_err(archive_path, "failed to read tar header", e))?;
        let entry_type = entry.header().entry_type();
        let raw = String::from_utf8_lossy(&entry.path_bytes()).into_owned();

        let Some(name) = strip_wrapper(&raw, entry_type.is_dir()) else {
            continue;
        };
        let target = safe_join(dest, name, archive_path)?;
        let mode = entry.header().mode().unwrap_or(0o755);
        trace!("extracting {raw} -> {}", target.display());

        match entry_type {
            EntryType::Directory => {
                reject_symlinked_path(dest, &target, true, archive_path)?;
                create_dir_with_mode(&target, mode)
                    .io_context(|| format!("failed to create directory {}", target.display()))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                reject_symlinked_path(dest, &target, true, archive_path)?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).io_context(|| {
                        format!("failed to create parent directory {}", parent.display())
                    })?;
                }
                let mut out = create_file_with_mode(&target, mode)
                    .io_context(|| format!("failed to create file {}", target.display()))?;
                io::copy(&mut entry, &mut out)
                    .io_context(|| format!("failed to write file {}", target.display()))?;
            }
            EntryType::Symlink => {
                let link = entry
                    .link_name()
                    .map_err(|e| archive_err(archive_path, "failed to read symlink target", e))?
                    .ok_or_else(|| archive_err(archive_path, "symlink without target", &raw))?;
                check_link_target(name, &link, archive_path)?;
                reject_symlinked_path(dest, &target, false, archive_path)?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).io_context(|| {
                        format!("failed to create parent directory {}", parent.display())
                    })?;
                }

                match create_symlink(&link, &target) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                        trace!("symlink {} already exists", target.display());
                    }
                    Err(e) => {
                        return Err(FetchError::io(
                            format!("failed to create symlink {}", target.display()),
                            e,
                        ));
                    }
                }
            }
            other => {
                trace!("skipping {raw} ({other:?})");
                continue;
            }
        }
        written += 1;
    }

    Ok(written)
}

/// Extract every entry of a `.zip` archive into `dest`.
///
/// Entry paths are sanitised; entries that would land outside `dest` are
/// skipped. Unix modes are restored where recorded.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(archive_path)
        .io_context(|| format!("failed to open downloaded file {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| archive_err(archive_path, "failed to read ZIP archive", e))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| archive_err(archive_path, &format!("failed to read ZIP entry {i}"), e))?;

        let Some(relative) = file.enclosed_name() else {
            trace!("skipping unsafe ZIP entry {}", file.name());
            continue;
        };
        let outpath = dest.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&outpath)
                .io_context(|| format!("failed to create directory {}", outpath.display()))?;
        } else {
            if let Some(parent) = outpath.parent() {
                fs::create_dir_all(parent).io_context(|| {
                    format!("failed to create parent directory {}", parent.display())
                })?;
            }
            let mut out = File::create(&outpath)
                .io_context(|| format!("failed to create file {}", outpath.display()))?;
            io::copy(&mut file, &mut out)
                .io_context(|| format!("failed to write file {}", outpath.display()))?;

            #[cfg(unix)]
            if let Some(mode) = file.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))
                    .io_context(|| format!("failed to set permissions on {}", outpath.display()))?;
            }
        }
        written += 1;
    }

    Ok(written)
}

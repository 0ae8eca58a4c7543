//! # Reduction pipeline
//!
//! Shrinks a bundle in place: nested archives are unpacked next to themselves,
//! edited, and repacked over the original path; loose files are removed by exact
//! path or single-`*` wildcard. Targets that do not exist are skipped.

mod platform_libs;
mod profile;

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::archive::{self, normalize_entry_name, ArchiveKind};
use crate::config::{PackConfig, Platform};
use crate::error::{PackError, Result};
use crate::fs_utils::delete_tree;
use crate::fsx as fs;
use crate::walk;

pub use platform_libs::{foreign_extensions, remove_platform_libs, strip_platform_libs};
pub use profile::{ReduceRule, ReductionProfile, RemoveRule};

/// Runs the minimize profile named in `config` against `root`. Does nothing when no
/// profile is configured or the name cannot be resolved.
pub fn minimize_jre(root: &Path, config: &PackConfig) -> Result<()> {
    let Some(name) = config.minimize_jre.as_deref() else {
        return Ok(());
    };
    info!("Minimizing JRE ...");
    match ReductionProfile::load(name)? {
        Some(profile) => {
            debug!(profile = name, "removing files and directories in profile");
            minimize(root, &profile, config.platform)
        }
        None => Ok(()),
    }
}

/// Applies every `reduce` rule, then every `remove` rule matching `platform`.
pub fn minimize(root: &Path, profile: &ReductionProfile, platform: Platform) -> Result<()> {
    for rule in &profile.reduce {
        apply_reduce_rule(root, rule)?;
    }
    for rule in profile.remove.iter().filter(|r| r.applies_to(platform)) {
        for pattern in &rule.paths {
            remove_file_wildcard(root, pattern)?;
        }
    }
    Ok(())
}

fn apply_reduce_rule(root: &Path, rule: &ReduceRule) -> Result<()> {
    let target = resolve_under(root, &rule.archive)?;
    let meta = match fs::symlink_metadata(&target) {
        Ok(meta) => meta,
        Err(_) => {
            warn!(path = %target.display(), "no file or directory found, skipping");
            return Ok(());
        }
    };
    if meta.is_dir() {
        return delete_sub_paths(&target, &rule.paths);
    }

    let work_dir = working_dir_for(&target);
    let kind = repack_kind(&target)?;
    debug!(archive = %target.display(), "unpacking");
    delete_tree(&work_dir)?;
    archive::extract(&target, &work_dir)?;
    delete_sub_paths(&work_dir, &rule.paths)?;
    debug!(archive = %target.display(), "repacking");
    repack(&target, &work_dir, kind)
}

/// `jre/lib/rt.jar` unpacks into `jre/lib/rt`.
fn working_dir_for(archive: &Path) -> PathBuf {
    if archive.extension().is_some() {
        archive.with_extension("")
    } else {
        let mut name = archive.as_os_str().to_owned();
        name.push(".unpacked");
        PathBuf::from(name)
    }
}

fn delete_sub_paths(base: &Path, paths: &[String]) -> Result<()> {
    for sub in paths {
        remove_path(&resolve_under(base, sub)?)?;
    }
    Ok(())
}

/// Container kind to write back: the sniffed kind of the original, else the one
/// its extension implies, else ZIP.
pub(crate) fn repack_kind(path: &Path) -> Result<ArchiveKind> {
    Ok(match ArchiveKind::detect(path)? {
        Some(kind @ (ArchiveKind::Zip | ArchiveKind::Jar | ArchiveKind::Tar)) => kind,
        _ => ArchiveKind::from_extension(path).unwrap_or(ArchiveKind::Zip),
    })
}

/// Packs `work_dir` over `archive` and deletes `work_dir`. The original stays in
/// place until the new archive is complete.
pub(crate) fn repack(archive: &Path, work_dir: &Path, kind: ArchiveKind) -> Result<()> {
    let before = fs::metadata(archive).map(|m| m.len()).unwrap_or(0);
    archive::create(kind, work_dir, archive)?;
    delete_tree(work_dir)?;
    let after = fs::metadata(archive).map(|m| m.len()).unwrap_or(0);
    debug!(
        archive = %archive.display(),
        "{} kb -> {} kb",
        before / 1024,
        after / 1024
    );
    Ok(())
}

/// Deletes `root/pattern`. With one `*` in the last component, every direct child
/// of the pattern's directory whose name matches the text around the `*` is
/// deleted instead. Returns the number of paths removed.
pub fn remove_file_wildcard(root: &Path, pattern: &str) -> Result<usize> {
    let Some((before, suffix)) = pattern.split_once('*') else {
        return Ok(usize::from(remove_path(&resolve_under(root, pattern)?)?));
    };
    let (dir_part, prefix) = match before.rfind('/') {
        Some(i) => (&before[..i], &before[i + 1..]),
        None => ("", before),
    };
    let dir = resolve_under(root, dir_part)?;
    let children = walk::children(&dir)?;
    if children.is_empty() {
        debug!(pattern, "no matching files found");
        return Ok(0);
    }
    let mut removed = 0;
    for child in children {
        let name = child
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let matches = name.len() >= prefix.len() + suffix.len()
            && name.starts_with(prefix)
            && name.ends_with(suffix);
        if matches && remove_path(&child.path)? {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Deletes a file, link or directory tree. Returns `false` if nothing was there.
fn remove_path(path: &Path) -> Result<bool> {
    if fs::symlink_metadata(path).is_err() {
        debug!(path = %path.display(), "no file or directory found");
        return Ok(false);
    }
    debug!(path = %path.display(), "removing");
    delete_tree(path)?;
    Ok(true)
}

/// Joins a profile-relative path onto `base`, refusing paths that climb out.
fn resolve_under(base: &Path, relative: &str) -> Result<PathBuf> {
    normalize_entry_name(relative)
        .map(|rel| base.join(rel))
        .ok_or_else(|| PackError::PathEscape {
            entry: relative.to_string(),
            target: base.to_path_buf(),
        })
}

//! Strips native libraries built for other platforms out of classpath jars.

use std::path::Path;

use tracing::{debug, info, warn};

use super::{repack, repack_kind};
use crate::archive;
use crate::config::{PackConfig, Platform};
use crate::error::{IoContext, Result};
use crate::fs_utils::{copy_file_with_attributes, delete_tree};
use crate::fsx as fs;
use crate::output::BundleOutput;
use crate::permissions::EntryKind;
use crate::walk::{self, WalkOrder};

const SIDECARS: [&str; 3] = ["", ".git", ".sha1"];

/// Library extensions, with their `.git`/`.sha1` sidecars, that can never load on
/// `platform`.
pub fn foreign_extensions(platform: Platform) -> Vec<String> {
    Platform::ALL
        .into_iter()
        .filter(|other| *other != platform)
        .map(Platform::native_lib_extension)
        .flat_map(|ext| SIDECARS.iter().map(move |sidecar| format!("{ext}{sidecar}")))
        .collect()
}

/// For every entry of `config.remove_platform_libs`, unpacks the copy in the
/// resources folder (or edits it in place if it is a directory), deletes foreign
/// libraries, and repacks it.
///
/// `filter` is consulted first and wins over the extension rules. When
/// `platform_libs_out_dir` is set, libraries for the target platform are moved
/// there, relative to the executable folder.
pub fn remove_platform_libs(
    output: &BundleOutput,
    config: &PackConfig,
    filter: &dyn Fn(&Path) -> bool,
) -> Result<()> {
    if config.remove_platform_libs.is_empty() {
        return Ok(());
    }
    let libs_out = match &config.platform_libs_out_dir {
        Some(dir) => {
            let dir = output.executable_folder.join(dir);
            fs::create_dir_all(&dir).at(&dir)?;
            Some(dir)
        }
        None => None,
    };
    info!("Removing foreign platform libs ...");

    for classpath in &config.remove_platform_libs {
        let Some(name) = Path::new(classpath).file_name() else {
            warn!(classpath = %classpath, "classpath entry has no file name, skipping");
            continue;
        };
        let jar = output.resources_folder.join(name);
        let meta = match fs::metadata(&jar) {
            Ok(meta) => meta,
            Err(_) => {
                warn!(jar = %jar.display(), "classpath entry not found in bundle, skipping");
                continue;
            }
        };

        if meta.is_dir() {
            debug!(jar = %jar.display(), "jar is a directory");
            strip_platform_libs(&jar, config.platform, libs_out.as_deref(), filter)?;
            continue;
        }

        let mut work_name = name.to_owned();
        work_name.push(".tmp");
        let work_dir = output.resources_folder.join(work_name);
        let kind = repack_kind(&jar)?;
        debug!(jar = %jar.display(), "unpacking");
        delete_tree(&work_dir)?;
        archive::extract(&jar, &work_dir)?;
        strip_platform_libs(&work_dir, config.platform, libs_out.as_deref(), filter)?;
        debug!(jar = %jar.display(), "repacking");
        repack(&jar, &work_dir, kind)?;
    }
    Ok(())
}

/// Deletes foreign libraries anywhere below `dir` and returns how many files were
/// removed or moved out.
pub fn strip_platform_libs(
    dir: &Path,
    platform: Platform,
    libs_out: Option<&Path>,
    filter: &dyn Fn(&Path) -> bool,
) -> Result<usize> {
    let foreign = foreign_extensions(platform);
    let native = platform.native_lib_extension();

    let files: Vec<_> = walk::walk(dir, WalkOrder::PreOrder)
        .filter(|e| !matches!(e, Ok(entry) if entry.kind == EntryKind::Directory))
        .collect::<Result<_>>()?;

    let mut touched = 0;
    for entry in files {
        let path = entry.path;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if filter(&path) {
            debug!(path = %path.display(), "removing (filtered)");
            fs::remove_file(&path).at(&path)?;
        } else if foreign.iter().any(|ext| name.ends_with(ext.as_str())) {
            debug!(path = %path.display(), "removing");
            fs::remove_file(&path).at(&path)?;
        } else if let Some(out) = libs_out.filter(|_| name.ends_with(native)) {
            debug!(path = %path.display(), "extracting");
            copy_file_with_attributes(&path, &out.join(&name))?;
            fs::remove_file(&path).at(&path)?;
        } else {
            continue;
        }
        touched += 1;
    }
    Ok(touched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn natives_tree(root: &Path) {
        let natives = root.join("natives");
        std::fs::create_dir_all(&natives).unwrap();
        for name in ["win64.dll", "linux64.so", "mac64.dylib", "mac64.dylib.sha1", "readme.txt"] {
            std::fs::write(natives.join(name), name).unwrap();
        }
    }

    #[test]
    fn foreign_extension_table() {
        let linux = foreign_extensions(Platform::Linux64);
        assert!(linux.contains(&".dll".to_string()));
        assert!(linux.contains(&".dylib.sha1".to_string()));
        assert!(!linux.iter().any(|e| e.starts_with(".so")));
        let windows = foreign_extensions(Platform::Windows64);
        assert!(windows.contains(&".so.git".to_string()));
        assert_eq!(windows.len(), 6);
    }

    #[test]
    fn strips_foreign_and_keeps_native() {
        let dir = tempdir().unwrap();
        natives_tree(dir.path());
        let natives = dir.path().join("natives");
        let removed = strip_platform_libs(&natives, Platform::Linux64, None, &|_| false).unwrap();
        assert_eq!(removed, 3);
        assert!(natives.join("linux64.so").exists());
        assert!(natives.join("readme.txt").exists());
        assert!(!natives.join("win64.dll").exists());
    }

    #[test]
    fn filter_runs_first_and_natives_move_out() {
        let dir = tempdir().unwrap();
        natives_tree(dir.path());
        let out = dir.path().join("libs");
        std::fs::create_dir_all(&out).unwrap();
        let filter = |p: &Path| p.file_name().map_or(false, |n| n == "readme.txt");
        strip_platform_libs(&dir.path().join("natives"), Platform::MacOS, Some(&out), &filter).unwrap();
        let natives = dir.path().join("natives");
        assert!(!natives.join("readme.txt").exists());
        assert!(!natives.join("mac64.dylib").exists());
        assert_eq!(std::fs::read(out.join("mac64.dylib")).unwrap(), b"mac64.dylib");
        assert!(!natives.join("linux64.so").exists());
    }

    #[test]
    fn nested_directories_are_scanned() {
        let dir = tempdir().unwrap();
        natives_tree(dir.path());
        let removed = strip_platform_libs(dir.path(), Platform::Linux64, None, &|_| false).unwrap();
        assert_eq!(removed, 3);
        let natives = dir.path().join("natives");
        assert!(natives.join("linux64.so").exists());
        assert!(!natives.join("win64.dll").exists());
        assert!(!natives.join("mac64.dylib.sha1").exists());
    }
}

//! # Bundle orchestration
//!
//! [`Packer::pack`] lays out the distributable: launcher and classpath first, then
//! the launcher config, the (minimized) JRE, extra resources, and finally the
//! foreign-library sweep over selected classpath jars.
//!
//! The output folder must be absent or empty when a run starts. A failed run is
//! thrown away as a whole rather than resumed.

mod fetch;
mod launcher_config;

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::archive;
use crate::config::{PackConfig, Platform};
use crate::error::{IoContext, PackError, Result};
use crate::fs_utils::{copy_file_with_attributes, copy_tree, delete_tree, set_executable};
use crate::fsx as fs;
use crate::output::BundleOutput;
use crate::reduce;
use crate::walk::{self, WalkOrder};

pub use fetch::{CurlFetcher, JdkFetcher};
pub use launcher_config::{LaunchConfig, LAUNCHER_CONFIG_FILE};

const INFO_PLIST: &str = include_str!("../../resources/Info.plist");

/// Name of the folder holding the launcher binaries next to the `packr` executable
/// when no launcher directory is configured.
pub const DEFAULT_LAUNCHER_DIR: &str = "launchers";

type FileFilter = Box<dyn Fn(&Path) -> bool>;

pub struct Packer {
    fetcher: Box<dyn JdkFetcher>,
    remove_platform_libs_filter: FileFilter,
}

impl Default for Packer {
    fn default() -> Self {
        Self {
            fetcher: Box::new(CurlFetcher),
            remove_platform_libs_filter: Box::new(|_| false),
        }
    }
}

impl Packer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the collaborator used for `http(s)://` JDK locations.
    pub fn with_fetcher(mut self, fetcher: impl JdkFetcher + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    /// Extra files to delete while stripping platform libraries. Checked before
    /// the extension rules.
    pub fn with_remove_platform_libs_filter(mut self, filter: impl Fn(&Path) -> bool + 'static) -> Self {
        self.remove_platform_libs_filter = Box::new(filter);
        self
    }

    /// Builds the bundle described by `config` and returns its folder layout.
    pub fn pack(&self, config: &PackConfig) -> Result<BundleOutput> {
        config.validate()?;

        let output = BundleOutput::flat(&config.output_dir);
        verify_empty_or_create_output_folder(&output.executable_folder)?;

        let output = build_mac_bundle(config, output)?;
        copy_executable_and_classpath(config, &output)?;
        LaunchConfig::from_config(config).write_to(&output.resources_folder)?;
        self.copy_and_minimize_jre(config, &output)?;
        copy_resources(config, &output)?;
        reduce::remove_platform_libs(&output, config, &*self.remove_platform_libs_filter)?;

        info!(output = %config.output_dir.display(), "bundle complete");
        Ok(output)
    }

    fn copy_and_minimize_jre(&self, config: &PackConfig, output: &BundleOutput) -> Result<()> {
        let cache = config.cache_jre.as_deref();
        let mut use_cache = false;
        if let Some(cache) = cache {
            match fs::metadata(cache) {
                Ok(meta) if meta.is_dir() => use_cache = !walk::children(cache)?.is_empty(),
                Ok(_) => {
                    return Err(PackError::config(format!(
                        "{} must be a directory",
                        cache.display()
                    )))
                }
                Err(_) => {}
            }
        }
        let storage = cache.unwrap_or(&output.resources_folder).to_path_buf();

        if use_cache {
            info!("Using cached JRE in '{}' ...", storage.display());
        } else {
            fs::create_dir_all(&storage).at(&storage)?;
            let remote = config.is_remote_jdk();
            let jdk = if remote {
                let dest = storage.join("jdk.zip");
                info!("Downloading JDK from '{}' ...", config.jdk);
                self.fetcher.fetch(&config.jdk, &dest)?;
                dest
            } else {
                PathBuf::from(&config.jdk)
            };

            info!("Unpacking JRE ...");
            let tmp = storage.join("tmp");
            delete_tree(&tmp)?;
            fs::create_dir_all(&tmp).at(&tmp)?;
            if jdk.is_dir() {
                copy_tree(&jdk, &tmp)?;
            } else {
                archive::extract(&jdk, &tmp)?;
            }

            let jre = find_jvm_base_dir(&tmp)?.ok_or_else(|| PackError::JreNotFound(tmp.clone()))?;
            copy_tree(&jre, &storage.join("jre"))?;
            delete_tree(&tmp)?;
            if remote {
                fs::remove_file(&jdk).at(&jdk)?;
            }

            reduce::minimize_jre(&storage, config)?;
        }

        if cache.is_some() {
            copy_tree(&storage, &output.resources_folder)?;
        }
        Ok(())
    }
}

/// The output folder must not exist, or be an empty directory.
pub fn verify_empty_or_create_output_folder(path: &Path) -> Result<()> {
    if let Ok(meta) = fs::metadata(path) {
        if !meta.is_dir() {
            return Err(PackError::OutputFolder {
                path: path.to_path_buf(),
                reason: "is not a directory.",
            });
        }
        let mut entries = fs::read_dir(path).at(path)?;
        if entries.next().is_some() {
            return Err(PackError::OutputFolder {
                path: path.to_path_buf(),
                reason: "is not empty.",
            });
        }
    }
    fs::create_dir_all(path).at(path)
}

fn build_mac_bundle(config: &PackConfig, output: BundleOutput) -> Result<BundleOutput> {
    if config.platform != Platform::MacOS {
        return Ok(output);
    }
    let root = &output.executable_folder;
    let contents = root.join("Contents");
    fs::create_dir_all(&contents).at(&contents)?;

    let identifier = config
        .bundle_identifier
        .as_deref()
        .unwrap_or_else(|| config.default_bundle_identifier());
    let plist = INFO_PLIST
        .replace("${executable}", &config.executable)
        .replace("${bundleIdentifier}", identifier);
    let plist_path = contents.join("Info.plist");
    fs::write(&plist_path, plist).at(&plist_path)?;

    let executable_folder = contents.join("MacOS");
    fs::create_dir_all(&executable_folder).at(&executable_folder)?;
    let resources_folder = contents.join("Resources");
    fs::create_dir_all(&resources_folder).at(&resources_folder)?;

    if let Some(icon) = config.icon_resource.as_deref() {
        if icon.exists() {
            copy_file_with_attributes(icon, &resources_folder.join("icons.icns"))?;
        } else {
            warn!(icon = %icon.display(), "icon not found");
        }
    }
    Ok(BundleOutput::new(executable_folder, resources_folder))
}

fn launcher_dir(config: &PackConfig) -> Result<PathBuf> {
    if let Some(dir) = &config.launcher_dir {
        return Ok(dir.clone());
    }
    let exe = std::env::current_exe().at(Path::new("packr"))?;
    Ok(exe
        .parent()
        .map(|p| p.join(DEFAULT_LAUNCHER_DIR))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LAUNCHER_DIR)))
}

fn copy_executable_and_classpath(config: &PackConfig, output: &BundleOutput) -> Result<()> {
    let launcher = launcher_dir(config)?.join(config.platform.launcher_name());
    if !launcher.is_file() {
        return Err(PackError::MissingResource(launcher));
    }
    info!("Copying executable ...");
    let exe_name = format!("{}{}", config.executable, config.platform.executable_extension());
    let exe = output.executable_folder.join(exe_name);
    fs::copy(&launcher, &exe).at(&launcher)?;
    set_executable(&exe);

    info!("Copying classpath(s) ...");
    for entry in &config.classpath {
        let src = Path::new(entry);
        let Some(name) = src.file_name() else {
            warn!(classpath = %entry, "classpath entry has no file name");
            continue;
        };
        let dst = output.resources_folder.join(name);
        if src.is_file() {
            copy_file_with_attributes(src, &dst)?;
        } else if src.is_dir() {
            copy_tree(src, &dst)?;
        } else {
            warn!(classpath = %src.display(), "classpath not found");
        }
    }
    Ok(())
}

fn copy_resources(config: &PackConfig, output: &BundleOutput) -> Result<()> {
    if config.resources.is_empty() {
        return Ok(());
    }
    info!("Copying resources ...");
    for resource in &config.resources {
        let meta = fs::metadata(resource).map_err(|_| PackError::MissingResource(resource.clone()))?;
        let Some(name) = resource.file_name() else {
            return Err(PackError::MissingResource(resource.clone()));
        };
        let dst = output.resources_folder.join(name);
        if meta.is_dir() {
            copy_tree(resource, &dst)?;
        } else {
            copy_file_with_attributes(resource, &dst)?;
        }
    }
    Ok(())
}

/// Finds the JVM shared library (`jvm.dll`, `libjvm.*`) below `search` and returns
/// the parent of the closest enclosing `lib` or `bin` directory.
pub fn find_jvm_base_dir(search: &Path) -> Result<Option<PathBuf>> {
    for entry in walk::walk(search, WalkOrder::PreOrder) {
        let entry = entry?;
        if entry.kind == crate::permissions::EntryKind::Directory {
            continue;
        }
        let name = entry
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !(name.eq_ignore_ascii_case("jvm.dll") || name.starts_with("libjvm")) {
            continue;
        }
        let mut dir = entry.path.parent();
        while let Some(current) = dir {
            if current == search {
                break;
            }
            let is_lib_or_bin = current
                .file_name()
                .map(|n| {
                    let n = n.to_string_lossy();
                    n.eq_ignore_ascii_case("lib") || n.eq_ignore_ascii_case("bin")
                })
                .unwrap_or(false);
            if is_lib_or_bin {
                return Ok(current.parent().map(Path::to_path_buf));
            }
            dir = current.parent();
        }
        return Ok(None);
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn output_folder_must_be_empty_directory() {
        let dir = tempdir().unwrap();
        let fresh = dir.path().join("fresh/nested");
        verify_empty_or_create_output_folder(&fresh).unwrap();
        assert!(fresh.is_dir());

        std::fs::write(fresh.join("stale"), b"x").unwrap();
        let err = verify_empty_or_create_output_folder(&fresh).unwrap_err();
        assert!(err.to_string().ends_with("is not empty."), "{err}");

        let file = dir.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        let err = verify_empty_or_create_output_folder(&file).unwrap_err();
        assert!(err.to_string().ends_with("is not a directory."), "{err}");
    }

    #[test]
    fn jvm_base_dir_is_parent_of_lib_or_bin() {
        let dir = tempdir().unwrap();
        let server = dir.path().join("jdk-17/lib/server");
        std::fs::create_dir_all(&server).unwrap();
        std::fs::write(server.join("libjvm.so"), b"").unwrap();
        assert_eq!(
            find_jvm_base_dir(dir.path()).unwrap(),
            Some(dir.path().join("jdk-17"))
        );
    }

    #[test]
    fn windows_jvm_dll_is_found_case_insensitively() {
        let dir = tempdir().unwrap();
        let server = dir.path().join("jre/BIN/server");
        std::fs::create_dir_all(&server).unwrap();
        std::fs::write(server.join("JVM.DLL"), b"").unwrap();
        assert_eq!(find_jvm_base_dir(dir.path()).unwrap(), Some(dir.path().join("jre")));
    }

    #[test]
    fn no_jvm_library_yields_none() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("jdk/lib")).unwrap();
        std::fs::write(dir.path().join("jdk/lib/rt.jar"), b"").unwrap();
        assert_eq!(find_jvm_base_dir(dir.path()).unwrap(), None);
    }
}

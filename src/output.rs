//! Folder layout of a bundle.

use std::path::{Path, PathBuf};

/// Where the launcher and the bundled files go. On macOS the two differ because
/// of the `.app` layout (`Contents/MacOS` and `Contents/Resources`); elsewhere
/// both are the output root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleOutput {
    pub executable_folder: PathBuf,
    pub resources_folder: PathBuf,
}

impl BundleOutput {
    pub fn new(executable_folder: impl Into<PathBuf>, resources_folder: impl Into<PathBuf>) -> Self {
        Self {
            executable_folder: executable_folder.into(),
            resources_folder: resources_folder.into(),
        }
    }

    /// Layout where launcher and resources share `root`.
    pub fn flat(root: &Path) -> Self {
        Self::new(root, root)
    }
}

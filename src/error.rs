use std::io;
use std::path::{Path, PathBuf};

/// The primary error type for all operations in the `packr` crate.
///
/// Lookups that are allowed to miss (a reduce rule naming an absent archive, an
/// empty JRE cache, ...) never produce one of these; they are logged and skipped.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    /// A required configuration value is missing or invalid.
    #[error("{0}")]
    Config(String),

    /// The output folder exists but cannot be used for a reproducible build.
    #[error("Output directory \"{}\" {reason}", .path.display())]
    OutputFolder { path: PathBuf, reason: &'static str },

    /// An archive entry resolves outside of the extraction directory.
    #[error("archive entry '{entry}' escapes target directory '{}'", .target.display())]
    PathEscape { entry: String, target: PathBuf },

    /// The archive could not be recognised or is structurally corrupt.
    #[error("invalid archive '{}': {reason}", .path.display())]
    Format { path: PathBuf, reason: String },

    /// The container was recognised but there is no extractor for it.
    #[error("unsupported archive '{}': {kind}", .path.display())]
    UnsupportedFormat { path: PathBuf, kind: String },

    /// A declared resource or classpath entry does not exist.
    #[error("Resource '{}' doesn't exist", .0.display())]
    MissingResource(PathBuf),

    /// No JVM shared library was found in the unpacked JDK.
    #[error("Couldn't find JRE in JDK, see '{}'", .0.display())]
    JreNotFound(PathBuf),

    /// Downloading a remote JDK failed.
    #[error("failed to fetch '{url}': {reason}")]
    Fetch { url: String, reason: String },

    /// An I/O error occurred, typically while reading or writing a file.
    /// Includes the path where the error happened.
    #[error("I/O error on path '{}': {source}", .path.display())]
    Io { source: io::Error, path: PathBuf },

    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
}

pub type Result<T> = std::result::Result<T, PackError>;

impl PackError {
    pub fn config(msg: impl Into<String>) -> Self {
        PackError::Config(msg.into())
    }

    pub fn format(path: &Path, reason: impl Into<String>) -> Self {
        PackError::Format {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// True for validation failures the CLI reports without a cause chain.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PackError::Config(_) | PackError::OutputFolder { .. } | PackError::MissingResource(_)
        )
    }
}

/// Attaches a path to a bare `io::Error`.
pub trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| PackError::Io {
            source,
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_context_keeps_path() {
        let err = Err::<(), _>(io::Error::new(io::ErrorKind::NotFound, "gone"))
            .at(Path::new("/tmp/missing.jar"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("/tmp/missing.jar"), "{msg}");
        assert!(!err.is_validation());
    }

    #[test]
    fn output_folder_messages() {
        let err = PackError::OutputFolder {
            path: PathBuf::from("out"),
            reason: "is not empty.",
        };
        assert_eq!(err.to_string(), "Output directory \"out\" is not empty.");
        assert!(err.is_validation());
    }
}

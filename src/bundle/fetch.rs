//! Remote JDK download.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::{PackError, Result};

/// Downloads a JDK archive to a local file.
pub trait JdkFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Shells out to `curl -fL`. No retries.
#[derive(Debug, Default, Clone, Copy)]
pub struct CurlFetcher;

impl JdkFetcher for CurlFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        debug!(url, dest = %dest.display(), "running curl");
        let status = Command::new("curl")
            .arg("-fL")
            .arg("--silent")
            .arg("--show-error")
            .arg("-o")
            .arg(dest)
            .arg(url)
            .status()
            .map_err(|e| PackError::Fetch {
                url: url.to_string(),
                reason: format!("failed to run curl: {e}"),
            })?;
        if !status.success() {
            return Err(PackError::Fetch {
                url: url.to_string(),
                reason: format!("curl failed with status: {status}"),
            });
        }
        Ok(())
    }
}

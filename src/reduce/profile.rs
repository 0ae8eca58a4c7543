//! Minimize profiles: which nested archive entries to cut and which files to drop.

use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Platform;
use crate::error::{IoContext, Result};

const SOFT: &str = include_str!("../../resources/minimize/soft.json");
const HARD: &str = include_str!("../../resources/minimize/hard.json");

/// A parsed minimize profile. Read-only once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReductionProfile {
    #[serde(default)]
    pub reduce: Vec<ReduceRule>,
    #[serde(default)]
    pub remove: Vec<RemoveRule>,
}

/// Sub-paths to delete from the archive (or directory) at `archive`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReduceRule {
    pub archive: String,
    #[serde(default)]
    pub paths: Vec<String>,
}

/// Paths to delete when the target platform matches `platform`. A path may hold
/// one `*` wildcard in its last component.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoveRule {
    pub platform: String,
    #[serde(default)]
    pub paths: Vec<String>,
}

impl RemoveRule {
    /// `"*"` matches every platform; anything else is a substring of the platform
    /// descriptor (`"windows"` matches `windows64`).
    pub fn applies_to(&self, platform: Platform) -> bool {
        self.platform == "*" || platform.desc().contains(self.platform.as_str())
    }
}

impl ReductionProfile {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).at(path)?;
        Self::from_json_str(&text)
    }

    /// Profiles compiled into the binary.
    pub fn builtin(name: &str) -> Option<Result<Self>> {
        let text = match name {
            "soft" => SOFT,
            "hard" => HARD,
            _ => return None,
        };
        Some(Self::from_json_str(text))
    }

    /// Resolves `name` as a file on disk first, then as a built-in profile. An
    /// unknown name is logged and yields `None`.
    pub fn load(name: &str) -> Result<Option<Self>> {
        let path = Path::new(name);
        if path.is_file() {
            debug!(profile = %path.display(), "loading minimize profile from file");
            return Self::from_file(path).map(Some);
        }
        match Self::builtin(name) {
            Some(profile) => profile.map(Some),
            None => {
                warn!(profile = name, "no minimize profile found");
                Ok(None)
            }
        }
    }
}

//! The `config.json` read by the native launcher at startup.

use std::path::Path;

use serde::Serialize;

use crate::config::PackConfig;
use crate::error::{IoContext, Result};

pub const LAUNCHER_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfig {
    /// File names only; the launcher resolves them against its resources folder.
    pub class_path: Vec<String>,
    pub main_class: String,
    pub use_zgc_if_supported_os: bool,
    /// Every argument carries exactly one leading dash.
    pub vm_args: Vec<String>,
}

impl LaunchConfig {
    pub fn from_config(config: &PackConfig) -> Self {
        let class_path = config
            .classpath
            .iter()
            .map(|entry| {
                Path::new(entry)
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| entry.clone())
            })
            .collect();
        let vm_args = config
            .vm_args
            .iter()
            .map(|arg| {
                if arg.starts_with('-') {
                    arg.clone()
                } else {
                    format!("-{arg}")
                }
            })
            .collect();
        Self {
            class_path,
            main_class: config.main_class.clone(),
            use_zgc_if_supported_os: config.use_zgc_if_supported_os,
            vm_args,
        }
    }

    pub fn write_to(&self, resources_folder: &Path) -> Result<()> {
        let path = resources_folder.join(LAUNCHER_CONFIG_FILE);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).at(&path)
    }
}

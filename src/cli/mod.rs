use clap::Parser;
use std::path::PathBuf;

use crate::config::{PackConfig, PartialConfig, Platform};
use crate::error::Result;

/// Bundles a Java application with a trimmed JRE and a native launcher.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON configuration file. Command-line flags override its values.
    pub config: Option<PathBuf>,

    /// Target platform: windows64, linux64 or mac.
    #[arg(long)]
    pub platform: Option<Platform>,

    /// JDK to bundle: a directory, an archive, or an http(s) URL.
    #[arg(long)]
    pub jdk: Option<String>,

    /// Name of the native launcher, without extension.
    #[arg(long)]
    pub executable: Option<String>,

    /// Jar files or class directories to put on the classpath.
    #[arg(long, num_args = 1..)]
    pub classpath: Vec<String>,

    /// Fully qualified name of the main class.
    #[arg(long)]
    pub mainclass: Option<String>,

    /// Extra JVM argument, with or without the leading dash. Repeatable.
    #[arg(long, allow_hyphen_values = true)]
    pub vmargs: Vec<String>,

    /// Minimize profile: `soft`, `hard`, or a path to a JSON profile.
    #[arg(long)]
    pub minimizejre: Option<String>,

    /// Directory to cache the extracted and minimized JRE in.
    #[arg(long)]
    pub cachejre: Option<PathBuf>,

    /// Extra files or directories copied next to the classpath.
    #[arg(long, num_args = 1..)]
    pub resources: Vec<PathBuf>,

    /// Output folder. Must not exist or be empty.
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Classpath entries to strip of native libraries for other platforms.
    #[arg(long, num_args = 1..)]
    pub removelibs: Vec<String>,

    /// Folder, relative to the executable, where target platform libraries are moved.
    #[arg(long)]
    pub libs: Option<PathBuf>,

    /// macOS icon (.icns).
    #[arg(long)]
    pub icon: Option<PathBuf>,

    /// macOS bundle identifier. Defaults to the main class package.
    #[arg(long)]
    pub bundle: Option<String>,

    /// Let the launcher enable ZGC where the OS supports it.
    #[arg(long = "useZgcIfSupportedOs")]
    pub use_zgc_if_supported_os: bool,

    /// Directory containing the prebuilt launcher binaries.
    #[arg(long)]
    pub launcher_dir: Option<PathBuf>,

    /// Log every file touched during reduction.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Command-line values only, without the config file.
    pub fn into_partial(self) -> PartialConfig {
        PartialConfig {
            platform: self.platform,
            jdk: self.jdk,
            executable: self.executable,
            classpath: self.classpath,
            remove_platform_libs: self.removelibs,
            main_class: self.mainclass,
            vm_args: self.vmargs,
            minimize_jre: self.minimizejre,
            cache_jre: self.cachejre,
            resources: self.resources,
            output_dir: self.output,
            platform_libs_out_dir: self.libs,
            icon_resource: self.icon,
            bundle_identifier: self.bundle,
            use_zgc_if_supported_os: self.use_zgc_if_supported_os,
            launcher_dir: self.launcher_dir,
        }
    }

    /// Reads the config file, if any, and overlays the command-line values.
    pub fn load_config(mut self) -> Result<PackConfig> {
        let base = match self.config.take() {
            Some(path) => PartialConfig::from_json_file(&path)?,
            None => PartialConfig::default(),
        };
        base.merge(self.into_partial()).into_config()
    }
}

pub fn parse() -> Args {
    Args::parse()
}

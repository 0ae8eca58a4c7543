//! Pack configuration: an optional JSON file overlaid with command-line values.
//!
//! Both sources produce a [`PartialConfig`]. Command-line values are merged on top
//! (scalars replace, lists append without duplicates) and the result is turned
//! into an immutable [`PackConfig`] once every required value is present.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::{IoContext, PackError, Result};

/// Target platform of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    Windows64,
    Linux64,
    MacOS,
}

impl Platform {
    pub const ALL: [Platform; 3] = [Platform::Windows64, Platform::Linux64, Platform::MacOS];

    /// Short descriptor used in config files and minimize profiles.
    pub fn desc(self) -> &'static str {
        match self {
            Platform::Windows64 => "windows64",
            Platform::Linux64 => "linux64",
            Platform::MacOS => "mac",
        }
    }

    /// Extension of the platform's own shared libraries.
    pub fn native_lib_extension(self) -> &'static str {
        match self {
            Platform::Windows64 => ".dll",
            Platform::Linux64 => ".so",
            Platform::MacOS => ".dylib",
        }
    }

    /// File name of the native launcher shipped for this platform.
    pub fn launcher_name(self) -> &'static str {
        match self {
            Platform::Windows64 => "packr-windows-x64.exe",
            Platform::Linux64 => "packr-linux-x64",
            Platform::MacOS => "packr-mac",
        }
    }

    /// Suffix appended to the configured executable name.
    pub fn executable_extension(self) -> &'static str {
        match self {
            Platform::Windows64 => ".exe",
            Platform::Linux64 | Platform::MacOS => "",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.desc())
    }
}

impl FromStr for Platform {
    type Err = PackError;

    fn from_str(s: &str) -> Result<Self> {
        Platform::ALL
            .into_iter()
            .find(|p| p.desc().eq_ignore_ascii_case(s))
            .ok_or_else(|| PackError::config(format!("Invalid platform '{s}'")))
    }
}

/// Keys of the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    platform: Option<String>,
    jdk: Option<String>,
    executable: Option<String>,
    classpath: Option<Vec<String>>,
    removelibs: Option<Vec<String>>,
    mainclass: Option<String>,
    vmargs: Option<Vec<String>>,
    minimizejre: Option<String>,
    cachejre: Option<PathBuf>,
    resources: Option<Vec<PathBuf>>,
    output: Option<PathBuf>,
    libs: Option<PathBuf>,
    icon: Option<PathBuf>,
    bundle: Option<String>,
    #[serde(rename = "useZgcIfSupportedOs")]
    use_zgc_if_supported_os: Option<bool>,
    launcher: Option<PathBuf>,
}

/// Configuration values that may still be incomplete.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialConfig {
    pub platform: Option<Platform>,
    pub jdk: Option<String>,
    pub executable: Option<String>,
    pub classpath: Vec<String>,
    pub remove_platform_libs: Vec<String>,
    pub main_class: Option<String>,
    pub vm_args: Vec<String>,
    pub minimize_jre: Option<String>,
    pub cache_jre: Option<PathBuf>,
    pub resources: Vec<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub platform_libs_out_dir: Option<PathBuf>,
    pub icon_resource: Option<PathBuf>,
    pub bundle_identifier: Option<String>,
    pub use_zgc_if_supported_os: bool,
    pub launcher_dir: Option<PathBuf>,
}

impl PartialConfig {
    /// Reads a JSON config file. One leading dash is stripped from every `vmargs`
    /// entry; the launcher config writer puts it back.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).at(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(text)?;
        let platform = file.platform.as_deref().map(str::parse).transpose()?;
        let vm_args = file
            .vmargs
            .unwrap_or_default()
            .into_iter()
            .map(|arg| arg.strip_prefix('-').map(str::to_string).unwrap_or(arg))
            .collect();
        Ok(Self {
            platform,
            jdk: file.jdk,
            executable: file.executable,
            classpath: file.classpath.unwrap_or_default(),
            remove_platform_libs: file.removelibs.unwrap_or_default(),
            main_class: file.mainclass,
            vm_args,
            minimize_jre: file.minimizejre,
            cache_jre: file.cachejre,
            resources: file.resources.unwrap_or_default(),
            output_dir: file.output,
            platform_libs_out_dir: file.libs,
            icon_resource: file.icon,
            bundle_identifier: file.bundle,
            use_zgc_if_supported_os: file.use_zgc_if_supported_os.unwrap_or(false),
            launcher_dir: file.launcher,
        })
    }

    /// Overlays `overrides` on `self`.
    pub fn merge(self, overrides: PartialConfig) -> PartialConfig {
        PartialConfig {
            platform: overrides.platform.or(self.platform),
            jdk: overrides.jdk.or(self.jdk),
            executable: overrides.executable.or(self.executable),
            classpath: append_unique(self.classpath, overrides.classpath),
            remove_platform_libs: append_unique(self.remove_platform_libs, overrides.remove_platform_libs),
            main_class: overrides.main_class.or(self.main_class),
            vm_args: append_unique(self.vm_args, overrides.vm_args),
            minimize_jre: overrides.minimize_jre.or(self.minimize_jre),
            cache_jre: overrides.cache_jre.or(self.cache_jre),
            resources: append_unique(self.resources, overrides.resources),
            output_dir: overrides.output_dir.or(self.output_dir),
            platform_libs_out_dir: overrides.platform_libs_out_dir.or(self.platform_libs_out_dir),
            icon_resource: overrides.icon_resource.or(self.icon_resource),
            bundle_identifier: overrides.bundle_identifier.or(self.bundle_identifier),
            use_zgc_if_supported_os: self.use_zgc_if_supported_os || overrides.use_zgc_if_supported_os,
            launcher_dir: overrides.launcher_dir.or(self.launcher_dir),
        }
    }

    /// Checks that every required value is present and builds the final config.
    pub fn into_config(self) -> Result<PackConfig> {
        let config = PackConfig {
            platform: required(self.platform, "platform")?,
            jdk: required(self.jdk, "JDK")?,
            executable: required(self.executable, "executable name")?,
            classpath: self.classpath,
            remove_platform_libs: self.remove_platform_libs,
            main_class: required(self.main_class, "main class")?,
            vm_args: self.vm_args,
            minimize_jre: self.minimize_jre,
            cache_jre: self.cache_jre,
            resources: self.resources,
            output_dir: required(self.output_dir, "output folder")?,
            platform_libs_out_dir: self.platform_libs_out_dir,
            icon_resource: self.icon_resource,
            bundle_identifier: self.bundle_identifier,
            use_zgc_if_supported_os: self.use_zgc_if_supported_os,
            launcher_dir: self.launcher_dir,
        };
        config.validate()?;
        Ok(config)
    }
}

fn required<T>(value: Option<T>, name: &str) -> Result<T> {
    value.ok_or_else(|| missing(name))
}

fn missing(name: &str) -> PackError {
    PackError::config(format!(
        "No {name} specified. Please check your commandline or configuration."
    ))
}

fn append_unique<T: PartialEq>(mut list: Vec<T>, extra: Vec<T>) -> Vec<T> {
    for item in extra {
        if !list.contains(&item) {
            list.push(item);
        }
    }
    list
}

/// Complete, read-only configuration for one pack run.
#[derive(Debug, Clone, PartialEq)]
pub struct PackConfig {
    pub platform: Platform,
    /// Directory, archive file or `http(s)://` URL of the JDK to bundle.
    pub jdk: String,
    /// Launcher name without platform extension.
    pub executable: String,
    pub classpath: Vec<String>,
    /// Classpath entries to strip of foreign native libraries.
    pub remove_platform_libs: Vec<String>,
    pub main_class: String,
    pub vm_args: Vec<String>,
    /// Built-in profile name (`soft`, `hard`) or path to a profile file.
    pub minimize_jre: Option<String>,
    pub cache_jre: Option<PathBuf>,
    pub resources: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// Where native libraries for the target platform are moved, relative to the
    /// executable folder.
    pub platform_libs_out_dir: Option<PathBuf>,
    pub icon_resource: Option<PathBuf>,
    pub bundle_identifier: Option<String>,
    pub use_zgc_if_supported_os: bool,
    /// Directory holding the prebuilt launcher binaries.
    pub launcher_dir: Option<PathBuf>,
}

impl PackConfig {
    /// A config with the required values set and everything else empty.
    pub fn new(
        platform: Platform,
        jdk: impl Into<String>,
        executable: impl Into<String>,
        classpath: Vec<String>,
        main_class: impl Into<String>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        PackConfig {
            platform,
            jdk: jdk.into(),
            executable: executable.into(),
            classpath,
            remove_platform_libs: Vec::new(),
            main_class: main_class.into(),
            vm_args: Vec::new(),
            minimize_jre: None,
            cache_jre: None,
            resources: Vec::new(),
            output_dir: output_dir.into(),
            platform_libs_out_dir: None,
            icon_resource: None,
            bundle_identifier: None,
            use_zgc_if_supported_os: false,
            launcher_dir: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (value, name) in [
            (self.jdk.as_str(), "JDK"),
            (self.executable.as_str(), "executable name"),
            (self.main_class.as_str(), "main class"),
        ] {
            if value.trim().is_empty() {
                return Err(missing(name));
            }
        }
        if self.output_dir.as_os_str().is_empty() {
            return Err(missing("output folder"));
        }
        if self.output_dir == Path::new(".") {
            return Err(PackError::config(
                "Output directory equals working directory, aborting",
            ));
        }
        if self.output_dir == Path::new("/") {
            return Err(PackError::config("Output directory points to root folder."));
        }
        if self.classpath.is_empty() {
            return Err(PackError::config(
                "Empty class path. Please check your commandline or configuration.",
            ));
        }
        Ok(())
    }

    /// Package part of the main class, used as the default bundle identifier.
    pub fn default_bundle_identifier(&self) -> &str {
        self.main_class
            .rsplit_once('.')
            .map(|(package, _)| package)
            .unwrap_or(&self.main_class)
    }

    pub fn is_remote_jdk(&self) -> bool {
        self.jdk.starts_with("http://") || self.jdk.starts_with("https://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "platform": "Linux64",
        "jdk": "/opt/jdk.tar.gz",
        "executable": "myapp",
        "classpath": ["app.jar"],
        "removelibs": ["app.jar"],
        "mainclass": "com.example.Main",
        "vmargs": ["-Xmx1G", "Dfoo=bar"],
        "minimizejre": "soft",
        "output": "out",
        "useZgcIfSupportedOs": true
    }"#;

    fn sample() -> PackConfig {
        PackConfig::new(Platform::Linux64, "jdk", "app", vec!["a.jar".into()], "a.B", "out")
    }

    #[test]
    fn platform_parsing_is_case_insensitive() {
        assert_eq!("MAC".parse::<Platform>().unwrap(), Platform::MacOS);
        assert_eq!("windows64".parse::<Platform>().unwrap(), Platform::Windows64);
        let err = "amiga".parse::<Platform>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid platform 'amiga'");
    }

    #[test]
    fn json_file_values_are_read() {
        let partial = PartialConfig::from_json_str(SAMPLE).unwrap();
        assert_eq!(partial.platform, Some(Platform::Linux64));
        assert_eq!(partial.vm_args, vec!["Xmx1G", "Dfoo=bar"]);
        assert!(partial.use_zgc_if_supported_os);
        let config = partial.into_config().unwrap();
        assert_eq!(config.main_class, "com.example.Main");
        assert_eq!(config.output_dir, PathBuf::from("out"));
    }

    #[test]
    fn command_line_overrides_scalars_and_appends_lists() {
        let file = PartialConfig::from_json_str(SAMPLE).unwrap();
        let cli = PartialConfig {
            executable: Some("other".into()),
            classpath: vec!["app.jar".into(), "lib.jar".into()],
            vm_args: vec!["Xss4m".into()],
            ..PartialConfig::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.executable.as_deref(), Some("other"));
        assert_eq!(merged.jdk.as_deref(), Some("/opt/jdk.tar.gz"));
        assert_eq!(merged.classpath, vec!["app.jar", "lib.jar"]);
        assert_eq!(merged.vm_args, vec!["Xmx1G", "Dfoo=bar", "Xss4m"]);
    }

    #[test]
    fn missing_values_are_reported_by_name() {
        let err = PartialConfig::default().into_config().unwrap_err();
        assert_eq!(
            err.to_string(),
            "No platform specified. Please check your commandline or configuration."
        );
        assert!(err.is_validation());
    }

    #[test]
    fn validation_rules() {
        assert!(sample().validate().is_ok());

        let mut config = sample();
        config.classpath.clear();
        assert!(config.validate().unwrap_err().to_string().starts_with("Empty class path"));

        let mut config = sample();
        config.output_dir = PathBuf::from(".");
        assert!(config.validate().is_err());

        let mut config = sample();
        config.output_dir = PathBuf::from("/");
        assert!(config.validate().is_err());
    }

    #[test]
    fn bundle_identifier_defaults_to_package() {
        let mut config = sample();
        config.main_class = "com.example.game.Launcher".into();
        assert_eq!(config.default_bundle_identifier(), "com.example.game");
        config.main_class = "Main".into();
        assert_eq!(config.default_bundle_identifier(), "Main");
    }

    #[test]
    fn remote_jdk_detection() {
        let mut config = sample();
        assert!(!config.is_remote_jdk());
        config.jdk = "https://example.com/jdk.zip".into();
        assert!(config.is_remote_jdk());
    }
}

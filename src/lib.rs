//! # Packr Core Library
//!
//! This crate bundles a Java application, a trimmed JRE and a native launcher into
//! a self-contained folder (or a macOS `.app`).
//!
//! It is designed to be used by the `packr` command-line application, but its public
//! API can also drive a bundle build programmatically.
//!
//! ## Key Modules
//!
//! - [`archive`]: ZIP, JAR and TAR extraction and creation with permissions, links
//!   and timestamps preserved.
//! - [`reduce`]: The minimize pipeline (reduce rules, wildcard removal, foreign
//!   native library stripping).
//! - [`bundle`]: The [`bundle::Packer`] orchestrating a full build.
//! - [`config`]: Configuration loading and validation.
//!
//! ## Examples
//!
//! ```no_run
//! use packr::bundle::Packer;
//! use packr::config::{PackConfig, Platform};
//!
//! let config = PackConfig::new(
//!     Platform::Linux64,
//!     "/opt/jdk-17",
//!     "myapp",
//!     vec!["build/libs/myapp.jar".into()],
//!     "com.example.Main",
//!     "out-linux",
//! );
//! Packer::new().pack(&config)?;
//! # Ok::<(), packr::error::PackError>(())
//! ```

pub mod archive;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod error;
pub use error::{PackError, Result};

pub mod fs_utils;
pub mod output;
pub mod permissions;
pub mod reduce;
pub mod walk;

// Cross-platform filesystem wrapper
pub mod fsx;

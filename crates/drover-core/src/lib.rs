//! Core library for drover.
//!
//! Drives a set of independently versioned modules through a release:
//! branching, merging, translation sync, changelog generation, tagging,
//! pushing and packaging.
//!
//! # Modules
//!
//! - [`changelog`] - Commit classification and changelog rendering
//! - [`config`] - Configuration loading and management
//! - [`error`] - Configuration error types and result aliases
//! - [`git`] - Repository adapter trait, `git` implementation and mock
//! - [`module`] - Modules, the installer project, and module discovery
//! - [`steps`] - Release steps and the release/publish composites
//! - [`tools`] - External tool lookup and invocation
//! - [`version`] - Release version parsing and derivation
//!
//! # Quick Start
//!
//! ```no_run
//! use drover_core::changelog::{Changelog, ChangelogFormat};
//! use drover_core::module::{ModuleFilter, Project, ProjectLayout};
//! use drover_core::version::ReleaseVersion;
//!
//! let dir = camino::Utf8Path::new("/srv/release-4.1.1");
//! let project = Project::open(dir, &ProjectLayout::default()).expect("project");
//! let modules = project.discover_modules(&ModuleFilter::default()).expect("modules");
//! let from = ReleaseVersion::parse("4.1.1").and_then(|v| v.prior_version()).expect("version");
//!
//! let report = Changelog::new(modules, from)
//!     .render(ChangelogFormat::Grouped)
//!     .expect("changelog");
//! println!("{}", report.markdown);
//! ```
#![deny(unsafe_code)]

pub mod changelog;

pub mod config;

pub mod error;

pub mod git;

pub mod module;

pub mod steps;

pub mod tools;

pub mod version;

pub use config::{Config, ConfigLoader, LogLevel};

pub use error::{ConfigError, ConfigResult};

pub use version::ReleaseVersion;

// Re-export semver so downstream crates don't need a direct dependency.
pub use semver;

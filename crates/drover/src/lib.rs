//! Library interface for the `drover` CLI.
//!
//! This crate exposes the CLI's argument parser and command structure as a library,
//! primarily for documentation generation and testing. The actual entry point is
//! in `main.rs`.
//!
//! # Structure
//!
//! - [`Cli`] - The root argument parser (clap derive)
//! - [`Commands`] - Available subcommands
//! - [`commands`] - Command implementations

pub mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

/// Color output preference.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect terminal capabilities automatically.
    #[default]
    Auto,
    /// Always emit colors.
    Always,
    /// Never emit colors.
    Never,
}

impl ColorChoice {
    /// Configure global color output based on this choice.
    ///
    /// Call this once at startup to set the color mode.
    pub fn apply(self) {
        match self {
            Self::Auto => {} // owo-colors auto-detects by default
            Self::Always => owo_colors::set_override(true),
            Self::Never => owo_colors::set_override(false),
        }
    }
}

const ENV_HELP: &str = "\
ENVIRONMENT VARIABLES:
    RUST_LOG                Log filter (e.g., debug, drover=trace)
    DROVER_LOG_PATH         Explicit log file path
    DROVER_LOG_DIR          Log directory
    DROVER_RELEASE_PATH     Base directory for release-<version> checkouts
";

/// Command-line interface definition for drover.
#[derive(Parser)]
#[command(name = "drover")]
#[command(about = "Drive a set of modules through a coordinated release", long_about = None)]
#[command(version)]
#[command(after_long_help = ENV_HELP)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run as if started in DIR
    #[arg(short = 'C', long, global = true)]
    pub chdir: Option<PathBuf>,

    /// Only print errors (suppresses warnings/info)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More detail (repeatable; e.g. -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Colorize output
    #[arg(long, global = true, value_enum, default_value_t)]
    pub color: ColorChoice,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available subcommands for the CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Run every release step in order: create, branch, translate, test, changelog
    Release(commands::release::ReleaseArgs),

    /// Install the project for a release
    #[command(name = "release:create")]
    ReleaseCreate(commands::release::CreateArgs),

    /// Switch every module to a release branch
    #[command(name = "release:branch")]
    ReleaseBranch(commands::release::BranchArgs),

    /// Sync translations for the release modules
    #[command(name = "release:translate")]
    ReleaseTranslate(commands::release::VersionArgs),

    /// Run the project test suite
    #[command(name = "release:test")]
    ReleaseTest(commands::release::TestArgs),

    /// Generate the release changelog
    #[command(name = "release:changelog")]
    ReleaseChangelog(commands::release::ChangelogArgs),

    /// Tag every release module
    #[command(name = "release:tag")]
    ReleaseTag(commands::release::VersionArgs),

    /// Push every release module with its tags
    #[command(name = "release:push")]
    ReleasePush(commands::release::VersionArgs),

    /// Tag, push and upload a prepared release
    #[command(name = "release:publish")]
    ReleasePublish(commands::release::PublishArgs),

    /// Build the release archives
    #[command(name = "release:archive")]
    ReleaseArchive(commands::release::VersionArgs),

    /// Upload the release archives
    #[command(name = "release:upload")]
    ReleaseUpload(commands::release::UploadArgs),

    /// Check out a branch on a set of modules
    #[command(name = "branch:checkout")]
    BranchCheckout(commands::branch::CheckoutArgs),

    /// Merge one branch into another on a set of modules
    #[command(name = "branch:merge")]
    BranchMerge(commands::branch::MergeArgs),

    /// Push the current branch of a set of modules
    #[command(name = "branch:push")]
    BranchPush(commands::branch::PushArgs),

    /// Sync translations for a set of modules
    #[command(name = "module:translate")]
    ModuleTranslate(commands::module::TranslateArgs),

    /// Tag one module and publish a GitHub release with its changelog
    #[command(name = "module:tag")]
    ModuleTag(commands::module::TagArgs),

    /// Diagnose configuration and environment
    Doctor(commands::doctor::DoctorArgs),

    /// Show package, configuration and project information
    Info(commands::info::InfoArgs),
}

impl Commands {
    /// Name as typed on the command line, for log spans.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Release(_) => "release",
            Self::ReleaseCreate(_) => "release:create",
            Self::ReleaseBranch(_) => "release:branch",
            Self::ReleaseTranslate(_) => "release:translate",
            Self::ReleaseTest(_) => "release:test",
            Self::ReleaseChangelog(_) => "release:changelog",
            Self::ReleaseTag(_) => "release:tag",
            Self::ReleasePush(_) => "release:push",
            Self::ReleasePublish(_) => "release:publish",
            Self::ReleaseArchive(_) => "release:archive",
            Self::ReleaseUpload(_) => "release:upload",
            Self::BranchCheckout(_) => "branch:checkout",
            Self::BranchMerge(_) => "branch:merge",
            Self::BranchPush(_) => "branch:push",
            Self::ModuleTranslate(_) => "module:translate",
            Self::ModuleTag(_) => "module:tag",
            Self::Doctor(_) => "doctor",
            Self::Info(_) => "info",
        }
    }
}

/// Returns the clap command for documentation generation
pub fn command() -> clap::Command {
    Cli::command()
}

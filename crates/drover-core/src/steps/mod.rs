//! Release steps.
//!
//! Each step is a named unit of work that runs over a module set, one module
//! at a time. Steps report progress through a [`StepEvent`] callback so the
//! CLI can render it; per-module problems become [`StepWarning`]s and never
//! abort the remaining modules. Only the conditions listed on [`StepError`]
//! halt a run.
//!
//! # Composites
//!
//! - [`release`]: create project, branch, translate, test, changelog.
//! - [`publish`]: tag, push, upload.
//!
//! Both run their steps in a fixed order; a later step only starts once the
//! one before it has finished.

mod archive;
mod branch;
mod module_tag;
mod project;
mod release;
mod translations;

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use semver::Version;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::changelog::{ChangelogError, ChangelogFormat, ChangelogReport, LineTemplate};
use crate::config::Config;
use crate::error::ConfigResult;
use crate::git::GitError;
use crate::module::{ModuleError, ModuleFilter, ModuleResult, Project, ProjectLayout};
use crate::tools::ToolError;
use crate::version::{ReleaseVersion, VersionError};

pub use archive::{build_archive, upload_archive, ArchiveOptions, UploadOptions};
pub use branch::{
    checkout_branch, create_branch, merge_branch, push_branch, ConflictResolution, MergeConflict,
    MergeOptions, MergeReport,
};
pub use module_tag::{tag_annotated_module, ModuleRelease, ModuleTagOptions};
pub use project::{create_project, parse_available_versions, pick_best_version, run_tests};
pub use release::{build_changelog, push_release, tag_modules};
pub use translations::{
    generate_javascript, update_translations, TranslationOptions, TX_BINARY,
};

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

/// Conditions that halt a step, and with it any composite it belongs to.
#[derive(Error, Debug)]
pub enum StepError {
    /// None of the composer constraints derived from the version exist.
    #[error("no installable version of {package} for {version} (tried {})", .candidates.join(", "))]
    NoInstallableVersion {
        /// Package that was queried.
        package: String,
        /// Requested release.
        version: ReleaseVersion,
        /// Constraints that were looked for.
        candidates: Vec<String>,
    },

    /// `composer show` output had no `versions :` line.
    #[error("could not parse available versions of {package}")]
    UnparseableVersions {
        /// Package that was queried.
        package: String,
    },

    /// The test command exited unsuccessfully.
    #[error("tests failed: {message}")]
    TestsFailed {
        /// Command output or exit status.
        message: String,
    },

    /// A module could not be pushed.
    #[error("failed to push {module}: {source}")]
    Push {
        /// Module name.
        module: String,
        /// Underlying git failure.
        source: GitError,
    },

    /// A required tool is not installed.
    #[error("{tool} is not installed or not on PATH")]
    ToolMissing {
        /// Binary name.
        tool: String,
    },

    /// A required tool is older than the configured minimum.
    #[error("{tool} {found} is too old; {minimum} or later is required")]
    ToolTooOld {
        /// Binary name.
        tool: String,
        /// Installed version.
        found: Version,
        /// Required version.
        minimum: Version,
    },

    /// The operator stopped the run at a merge conflict.
    #[error("{step} aborted with {} module(s) needing manual resolution", .conflicts.len())]
    Aborted {
        /// Step that was running.
        step: StepName,
        /// Conflicts collected up to and including the aborting one.
        conflicts: Vec<MergeConflict>,
    },

    /// The operator declined to continue.
    #[error("{step} cancelled")]
    Cancelled {
        /// Step that was running.
        step: StepName,
    },

    /// A git operation that the step cannot skip failed.
    #[error("{step} failed for {module}: {source}")]
    Git {
        /// Step that was running.
        step: StepName,
        /// Module name.
        module: String,
        /// Underlying git failure.
        source: GitError,
    },

    /// The module has no GitHub remote to release against.
    #[error("{module} has no GitHub remote")]
    NoGithubRemote {
        /// Module name.
        module: String,
    },

    /// Filesystem failure.
    #[error("{path}: {source}")]
    Io {
        /// Path being read or written.
        path: Utf8PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Any other external tool failure.
    #[error(transparent)]
    Tool(ToolError),

    /// Module graph error.
    #[error(transparent)]
    Module(#[from] ModuleError),

    /// Changelog error.
    #[error(transparent)]
    Changelog(#[from] ChangelogError),

    /// Version error.
    #[error(transparent)]
    Version(#[from] VersionError),
}

impl From<ToolError> for StepError {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::Missing { tool } => Self::ToolMissing { tool },
            ToolError::TooOld {
                tool,
                found,
                minimum,
            } => Self::ToolTooOld {
                tool,
                found,
                minimum,
            },
            other => Self::Tool(other),
        }
    }
}

impl StepError {
    pub(crate) fn io(path: &Utf8Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result alias for step operations.
pub type StepResult<T> = Result<T, StepError>;

// ──────────────────────────────────────────────
// Steps and events
// ──────────────────────────────────────────────

/// Every step the pipeline knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    /// Install the project with composer.
    CreateProject,
    /// Create or switch to the release branch.
    Branch,
    /// Fetch and check out an existing branch.
    Checkout,
    /// Merge one branch into another.
    Merge,
    /// Sync translations.
    Translations,
    /// Run the test suite.
    Test,
    /// Build the changelog.
    Changelog,
    /// Tag every module.
    Tag,
    /// Push branches (and tags).
    Push,
    /// Package the release archives.
    Archive,
    /// Upload the release archives.
    Upload,
    /// Tag one module and publish a GitHub release.
    ModuleTag,
}

impl fmt::Display for StepName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreateProject => "create-project",
            Self::Branch => "branch",
            Self::Checkout => "checkout",
            Self::Merge => "merge",
            Self::Translations => "translations",
            Self::Test => "test",
            Self::Changelog => "changelog",
            Self::Tag => "tag",
            Self::Push => "push",
            Self::Archive => "archive",
            Self::Upload => "upload",
            Self::ModuleTag => "module-tag",
        })
    }
}

/// Progress notifications for the CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepEvent {
    /// A step has started.
    Started(StepName),
    /// Something happened to one module.
    Module {
        /// Running step.
        step: StepName,
        /// Module name.
        module: String,
        /// What happened.
        message: String,
    },
    /// A module (or the step as a whole) was skipped or degraded.
    Warning {
        /// Running step.
        step: StepName,
        /// Module name, when the warning is about one.
        module: Option<String>,
        /// What went wrong.
        message: String,
    },
    /// A step has finished.
    Completed(StepName, StepOutcome),
}

/// Outcome of a single step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum StepOutcome {
    /// The step ran.
    Success {
        /// Summary of what happened.
        message: String,
    },
    /// The step had nothing to do.
    Skipped {
        /// Why.
        reason: String,
    },
}

/// A per-module problem that did not stop the step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepWarning {
    /// Step that produced it.
    pub step: StepName,
    /// Module name, when the warning is about one.
    pub module: Option<String>,
    /// What went wrong.
    pub message: String,
}

/// What a step did.
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    /// Which step.
    pub step: StepName,
    /// How it ended.
    pub outcome: StepOutcome,
    /// Per-module warnings.
    pub warnings: Vec<StepWarning>,
}

/// Event sink shared by all steps.
pub type EventSink<'a> = &'a mut dyn FnMut(StepEvent);

/// Tracks one running step: logs, forwards events, gathers warnings.
pub(crate) struct Progress<'a> {
    step: StepName,
    on_event: &'a mut dyn FnMut(StepEvent),
    warnings: Vec<StepWarning>,
}

impl<'a> Progress<'a> {
    pub(crate) fn start(step: StepName, on_event: &'a mut dyn FnMut(StepEvent)) -> Self {
        info!(%step, "step started");
        on_event(StepEvent::Started(step));
        Self {
            step,
            on_event,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn module(&mut self, module: &str, message: impl Into<String>) {
        let message = message.into();
        info!(step = %self.step, module, "{message}");
        (self.on_event)(StepEvent::Module {
            step: self.step,
            module: module.to_string(),
            message,
        });
    }

    pub(crate) fn warn(&mut self, module: Option<&str>, message: impl Into<String>) {
        let message = message.into();
        warn!(step = %self.step, module, "{message}");
        self.warnings.push(StepWarning {
            step: self.step,
            module: module.map(str::to_string),
            message: message.clone(),
        });
        (self.on_event)(StepEvent::Warning {
            step: self.step,
            module: module.map(str::to_string),
            message,
        });
    }

    pub(crate) fn success(self, message: impl Into<String>) -> StepReport {
        self.finish(StepOutcome::Success {
            message: message.into(),
        })
    }

    pub(crate) fn skipped(self, reason: impl Into<String>) -> StepReport {
        self.finish(StepOutcome::Skipped {
            reason: reason.into(),
        })
    }

    fn finish(self, outcome: StepOutcome) -> StepReport {
        info!(step = %self.step, ?outcome, "step completed");
        (self.on_event)(StepEvent::Completed(self.step, outcome.clone()));
        StepReport {
            step: self.step,
            outcome,
            warnings: self.warnings,
        }
    }
}

// ──────────────────────────────────────────────
// Settings
// ──────────────────────────────────────────────

/// Everything the release composite needs, validated up front.
#[derive(Debug, Clone)]
pub struct ReleaseSettings {
    /// Version being released.
    pub version: ReleaseVersion,
    /// Lower bound for the changelog; derived from `version` when `None`.
    pub from: Option<ReleaseVersion>,
    /// Project directory.
    pub directory: Utf8PathBuf,
    /// Installer package.
    pub package: String,
    /// Remote for fetches, pushes and links.
    pub remote: String,
    /// Where modules live inside the project.
    pub layout: ProjectLayout,
    /// Release branch to create; `None` leaves branches alone.
    pub branch: Option<String>,
    /// Skip the test step.
    pub skip_tests: bool,
    /// Shell command for the test suite.
    pub test_command: String,
    /// Composer binary.
    pub composer: String,
    /// Translation sync settings.
    pub translations: TranslationOptions,
    /// Changelog line templates.
    pub template: LineTemplate,
    /// Changelog layout.
    pub format: ChangelogFormat,
}

impl ReleaseSettings {
    /// Settings for releasing `version` into `directory`, defaults from `config`.
    pub fn from_config(
        config: &Config,
        version: ReleaseVersion,
        directory: Utf8PathBuf,
    ) -> ConfigResult<Self> {
        Ok(Self {
            version,
            from: None,
            directory,
            package: config.package(),
            remote: config.remote(),
            layout: config.project_layout(),
            branch: None,
            skip_tests: false,
            test_command: config.test_command(),
            composer: config.composer_command(),
            translations: TranslationOptions::from_config(config)?,
            template: config.line_template(),
            format: ChangelogFormat::Grouped,
        })
    }

    /// The changelog lower bound, explicit or derived.
    pub fn from_version(&self) -> StepResult<ReleaseVersion> {
        match &self.from {
            Some(from) => Ok(from.clone()),
            None => Ok(self.version.prior_version()?),
        }
    }
}

/// Opens the project once it exists on disk.
pub type ProjectOpener<'a> = &'a dyn Fn(&Utf8Path) -> ModuleResult<Project>;

// ──────────────────────────────────────────────
// Composites
// ──────────────────────────────────────────────

/// Result of the release composite.
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseOutcome {
    /// Released version.
    pub version: ReleaseVersion,
    /// Changelog lower bound.
    pub from: ReleaseVersion,
    /// Report of every step that ran, in order.
    pub steps: Vec<StepReport>,
    /// The generated changelog.
    pub changelog: ChangelogReport,
}

/// Prepare a release: create the project, branch, translate, test, and
/// build the changelog.
///
/// The module set is read after the project exists, since discovery needs
/// the installed manifests.
#[instrument(skip_all, fields(version = %settings.version, dir = %settings.directory))]
pub fn release(
    settings: &ReleaseSettings,
    filter: &ModuleFilter,
    open_project: ProjectOpener<'_>,
    on_event: EventSink<'_>,
) -> StepResult<ReleaseOutcome> {
    let from = settings.from_version()?;
    let mut steps = Vec::new();

    steps.push(create_project(
        &settings.directory,
        &settings.version,
        &settings.package,
        &settings.composer,
        on_event,
    )?);

    let project = open_project(&settings.directory)?;
    let modules = project.discover_modules(filter)?;

    steps.push(create_branch(
        &modules,
        settings.branch.as_deref(),
        &settings.remote,
        on_event,
    )?);
    steps.push(update_translations(
        &project,
        &modules,
        filter.is_explicit(),
        &settings.translations,
        on_event,
    )?);

    if settings.skip_tests {
        let progress = Progress::start(StepName::Test, on_event);
        steps.push(progress.skipped("--skip-tests flag"));
    } else {
        steps.push(run_tests(&settings.directory, &settings.test_command, on_event)?);
    }

    let changelog = build_changelog(
        &modules,
        &from,
        &settings.remote,
        &settings.template,
        settings.format,
        on_event,
    )?;

    Ok(ReleaseOutcome {
        version: settings.version.clone(),
        from,
        steps,
        changelog,
    })
}

/// Result of the publish composite.
#[derive(Debug, Clone, Serialize)]
pub struct PublishOutcome {
    /// Published version.
    pub version: ReleaseVersion,
    /// Report of every step that ran, in order.
    pub steps: Vec<StepReport>,
}

/// Publish a prepared release: tag, push, upload.
#[instrument(skip_all, fields(version = %version))]
pub fn publish(
    project: &Project,
    filter: &ModuleFilter,
    version: &ReleaseVersion,
    remote: &str,
    upload: &UploadOptions,
    on_event: EventSink<'_>,
) -> StepResult<PublishOutcome> {
    let modules = project.discover_modules(filter)?;
    let steps = vec![
        tag_modules(&modules, version, on_event)?,
        push_release(&modules, remote, on_event)?,
        upload_archive(project.directory(), version, upload, on_event)?,
    ];
    Ok(PublishOutcome {
        version: version.clone(),
        steps,
    })
}

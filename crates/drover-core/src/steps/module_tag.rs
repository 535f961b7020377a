//! Single-module release: notes, push, GitHub release.

use serde::Serialize;
use tracing::{debug, instrument};

use super::{EventSink, Progress, StepError, StepName, StepResult};
use crate::changelog::{Changelog, ChangelogFormat, LineTemplate};
use crate::module::Module;
use crate::tools;
use crate::version::ReleaseVersion;

/// Settings for releasing one module.
#[derive(Debug, Clone)]
pub struct ModuleTagOptions {
    /// Version to tag.
    pub version: ReleaseVersion,
    /// Lower bound for the release notes.
    pub from: ReleaseVersion,
    /// Release title; the version when `None`.
    pub message: Option<String>,
    /// Remote to push to and read the GitHub slug from.
    pub remote: String,
    /// Note line template.
    pub template: LineTemplate,
    /// GitHub CLI binary.
    pub gh: String,
}

/// A published module release.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleRelease {
    /// Module name.
    pub module: String,
    /// `owner/repo` on GitHub.
    pub repository: String,
    /// Tag created by the release.
    pub tag: String,
    /// Commit the tag points at.
    pub target: String,
    /// Release title.
    pub title: String,
    /// Whether it was flagged as a pre-release.
    pub prerelease: bool,
    /// Release notes.
    pub notes: String,
    /// Release URL reported by `gh`.
    pub url: Option<String>,
}

/// Build release notes for `module`, confirm them, push, and publish a
/// GitHub release pointing at HEAD.
///
/// `confirm` sees the notes and returns whether to go ahead.
#[instrument(skip_all, fields(module = %module.name(), version = %options.version))]
pub fn tag_annotated_module(
    module: &Module,
    options: &ModuleTagOptions,
    confirm: &mut dyn FnMut(&str) -> bool,
    on_event: EventSink<'_>,
) -> StepResult<ModuleRelease> {
    let mut progress = Progress::start(StepName::ModuleTag, on_event);
    let name = module.name();
    let git_err = |source| StepError::Git {
        step: StepName::ModuleTag,
        module: name.to_string(),
        source,
    };

    let repository = module
        .github_slug(&options.remote)
        .map_err(git_err)?
        .ok_or_else(|| StepError::NoGithubRemote {
            module: name.to_string(),
        })?;

    let report = Changelog::new(vec![module], options.from.clone())
        .with_remote(options.remote.as_str())
        .with_template(options.template.clone())
        .render(ChangelogFormat::Flat)?;
    for warning in &report.warnings {
        progress.warn(Some(&warning.module), warning.message.clone());
    }
    progress.module(name, format!("{} change(s) since {}", report.item_count, options.from));

    if !confirm(&report.markdown) {
        progress.skipped("release cancelled");
        return Err(StepError::Cancelled {
            step: StepName::ModuleTag,
        });
    }

    tools::require_tool(&options.gh, None)?;

    module
        .repo()
        .push(&options.remote, true)
        .map_err(|source| StepError::Push {
            module: name.to_string(),
            source,
        })?;
    progress.module(name, format!("pushed to {}", options.remote));

    let target = module.repo().head_commit_hash().map_err(git_err)?;
    let tag = options.version.to_string();
    let title = options.message.clone().unwrap_or_else(|| tag.clone());
    let prerelease = options.version.is_prerelease();

    let mut args = vec![
        "release",
        "create",
        tag.as_str(),
        "--repo",
        repository.as_str(),
        "--target",
        target.as_str(),
        "--title",
        title.as_str(),
        "--notes-file",
        "-",
    ];
    if prerelease {
        args.push("--prerelease");
    }
    debug!(?args, "creating GitHub release");
    let output = tools::run_with_input(
        &options.gh,
        &args,
        Some(module.directory()),
        Some(&report.markdown),
    )?;
    let url = Some(output.trim().to_string()).filter(|u| !u.is_empty());

    progress.module(
        name,
        format!("released {tag}{}", url.as_deref().map(|u| format!(" at {u}")).unwrap_or_default()),
    );
    progress.success(format!("{repository} {tag}"));

    Ok(ModuleRelease {
        module: name.to_string(),
        repository,
        tag,
        target,
        title,
        prerelease,
        notes: report.markdown,
        url,
    })
}
